//! Record source client
//!
//! Records come from a paginated REST API. [`RecordSource`] fetches one page;
//! [`RecordSourceClient`] walks the cursor, tolerates page failures by
//! returning what it already has, and caches complete listings per
//! (base, collection, view) for `cache_ttl`.

use crate::cache::TtlCache;
use crate::config::{RunContext, SourceConfig};
use crate::error::{Error, Result};
use crate::types::{RawRecord, SourceRecord};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One page of the record listing
#[derive(Clone, Debug, Default, Deserialize)]
pub struct RecordPage {
    /// Records on this page
    #[serde(default)]
    pub records: Vec<RawRecord>,
    /// Cursor for the next page; absent on the last page
    #[serde(default)]
    pub offset: Option<String>,
}

/// Paged access to the inventory listing
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Fetch the page at `cursor` (`None` for the first page)
    async fn fetch_page(&self, ctx: &RunContext, cursor: Option<&str>) -> Result<RecordPage>;
}

/// Airtable-style REST source: `GET {api_base}/{source_id}/{collection_id}?view=..&offset=..`
pub struct AirtableSource {
    http_client: reqwest::Client,
    api_base: String,
}

impl AirtableSource {
    /// Create a source client
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl RecordSource for AirtableSource {
    async fn fetch_page(&self, ctx: &RunContext, cursor: Option<&str>) -> Result<RecordPage> {
        let url = format!("{}/{}/{}", self.api_base, ctx.source_id, ctx.collection_id);

        let mut request = self
            .http_client
            .get(&url)
            .bearer_auth(&ctx.token)
            .query(&[("view", ctx.view_id.as_str())]);
        if let Some(cursor) = cursor {
            request = request.query(&[("offset", cursor)]);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Source(format!(
                "record source returned HTTP {}: {}",
                status.as_u16(),
                url
            )));
        }

        Ok(response.json::<RecordPage>().await?)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct ListingKey {
    source_id: String,
    collection_id: String,
    view_id: String,
}

impl ListingKey {
    fn of(ctx: &RunContext) -> Self {
        Self {
            source_id: ctx.source_id.clone(),
            collection_id: ctx.collection_id.clone(),
            view_id: ctx.view_id.clone(),
        }
    }
}

/// Cursor-walking, caching front end of a [`RecordSource`]
///
/// Clones share the cache, so concurrent runs against the same listing within
/// the TTL window hit the network once.
#[derive(Clone)]
pub struct RecordSourceClient {
    source: Arc<dyn RecordSource>,
    cache: TtlCache<ListingKey, Arc<Vec<SourceRecord>>>,
    config: SourceConfig,
}

impl RecordSourceClient {
    /// Wrap a page source
    pub fn new(source: Arc<dyn RecordSource>, config: SourceConfig) -> Self {
        Self {
            source,
            cache: TtlCache::new(),
            config,
        }
    }

    /// Every record of the run's listing, in source order
    ///
    /// A failing page ends paging: the records gathered so far are returned
    /// and nothing is cached. Paging also stops after `max_pages` pages.
    pub async fn fetch(&self, ctx: &RunContext) -> Arc<Vec<SourceRecord>> {
        let key = ListingKey::of(ctx);
        if let Some(records) = self.cache.get(&key).await {
            debug!(
                collection = %ctx.collection_id,
                records = records.len(),
                "record listing served from cache"
            );
            return records;
        }

        let mut records = Vec::new();
        let mut cursor: Option<String> = None;
        let mut complete = true;
        let mut pages = 0;

        loop {
            if pages >= self.config.max_pages {
                warn!(
                    collection = %ctx.collection_id,
                    max_pages = self.config.max_pages,
                    "page limit reached, listing truncated"
                );
                break;
            }

            match self.source.fetch_page(ctx, cursor.as_deref()).await {
                Ok(page) => {
                    pages += 1;
                    records.extend(page.records.into_iter().map(SourceRecord::from_raw));
                    match page.offset {
                        Some(next) if !next.is_empty() => cursor = Some(next),
                        _ => break,
                    }
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        collection = %ctx.collection_id,
                        page = pages + 1,
                        fetched = records.len(),
                        "record page fetch failed, returning partial listing"
                    );
                    complete = false;
                    break;
                }
            }
        }

        let records = Arc::new(records);
        if complete {
            self.cache
                .insert(key, Arc::clone(&records), self.config.cache_ttl)
                .await;
        }
        info!(
            collection = %ctx.collection_id,
            records = records.len(),
            pages,
            complete,
            "record listing fetched"
        );
        records
    }

    /// Forget the cached listing for the run's (base, collection, view)
    pub async fn invalidate(&self, ctx: &RunContext) -> bool {
        self.cache.invalidate(&ListingKey::of(ctx)).await
    }
}
