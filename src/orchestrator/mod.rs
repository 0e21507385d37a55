//! Export run orchestration -- one run from record fetch to persisted export.
//!
//! Split into focused submodules:
//! - [`orchestration`] - Run lifecycle, status transitions, cleanup
//! - [`batching`] - Per-batch image fan-out, upload indexing, record mapping
//! - [`finalization`] - CSV assembly, persistence and site hand-off

mod batching;
mod finalization;
mod orchestration;


use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::export::{ExportSink, FileExportSink, SiteUploader};
use crate::images::{HttpImageSource, ImagePipeline, ImageSource};
use crate::source::{AirtableSource, RecordSource, RecordSourceClient};
use crate::status::{MemoryStatusStore, RedisStatusStore, StatusReporter, StatusStore};
use crate::types::TaskStatus;
use crate::upload::{FtpConnector, StoreConnector};

/// Parameters of one export run
#[derive(Clone, Debug, PartialEq)]
pub struct RunRequest {
    /// Business event the export belongs to
    pub event_id: String,
    /// Warehouse profile name, resolved through [`Config::run_context`]
    pub warehouse: String,
    /// Price applied to every row; derived per record when absent
    pub starting_price: Option<f64>,
    /// Key under which the run's status is published
    pub run_id: String,
}

/// What happened to the export after it was persisted
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SiteUpload {
    /// No site uploader is configured
    Skipped,
    /// The site confirmed the import
    Done,
    /// The site hand-off failed; the export itself is intact
    Failed(String),
}

/// Counts gathered over a successful run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunReport {
    /// Data rows in the export
    pub rows: usize,
    /// Records left out of the export
    pub failures: usize,
    /// Images re-hosted
    pub images_uploaded: usize,
    /// Images whose slot stayed empty
    pub images_failed: usize,
    /// Outcome of the site hand-off
    pub site_upload: SiteUpload,
}

impl RunReport {
    /// Message published with the COMPLETED status
    pub fn summary(&self) -> String {
        let mut message = format!(
            "export ready: {} rows, {} failed records, {} images uploaded, {} images failed",
            self.rows, self.failures, self.images_uploaded, self.images_failed
        );
        if let SiteUpload::Failed(reason) = &self.site_upload {
            message.push_str(&format!("; site upload failed: {reason}"));
        }
        message
    }
}

/// External systems a run talks to
pub struct Collaborators {
    /// Paged inventory records
    pub records: Arc<dyn RecordSource>,
    /// Image downloads
    pub images: Arc<dyn ImageSource>,
    /// Remote file store sessions
    pub store: Arc<dyn StoreConnector>,
    /// Run status persistence
    pub status: Arc<dyn StatusStore>,
    /// Export persistence
    pub exports: Arc<dyn ExportSink>,
    /// Optional hand-off to the listing site
    pub site_uploader: Option<Arc<dyn SiteUploader>>,
}

/// Drives export runs
///
/// Cheap to clone; clones share the record cache and status guard, so one
/// orchestrator can serve concurrent runs for different warehouses.
#[derive(Clone)]
pub struct Orchestrator {
    config: Arc<Config>,
    records: RecordSourceClient,
    images: ImagePipeline,
    connector: Arc<dyn StoreConnector>,
    status: Arc<StatusReporter>,
    exports: Arc<dyn ExportSink>,
    site_uploader: Option<Arc<dyn SiteUploader>>,
}

impl Orchestrator {
    /// Orchestrator over explicit collaborators
    pub fn new(config: Config, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;

        let Collaborators {
            records,
            images,
            store,
            status,
            exports,
            site_uploader,
        } = collaborators;

        Ok(Self {
            records: RecordSourceClient::new(records, config.source.clone()),
            images: ImagePipeline::new(images, config.images.clone()),
            connector: store,
            status: Arc::new(StatusReporter::new(status, config.status.ttl)),
            exports,
            site_uploader,
            config: Arc::new(config),
        })
    }

    /// Production wiring: REST record source, HTTP images, FTP store, Redis
    /// (or in-memory) status store and file exports
    pub fn from_config(config: Config) -> Result<Self> {
        let status: Arc<dyn StatusStore> = match &config.status.redis_url {
            Some(url) => Arc::new(RedisStatusStore::new(url)?),
            None => Arc::new(MemoryStatusStore::new()),
        };

        let collaborators = Collaborators {
            records: Arc::new(AirtableSource::new(&config.source)?),
            images: Arc::new(HttpImageSource::new(&config.images)?),
            store: Arc::new(FtpConnector::new(&config.upload)),
            status,
            exports: Arc::new(FileExportSink::new(config.export.output_dir.clone())),
            site_uploader: None,
        };
        Self::new(config, collaborators)
    }

    /// Hand finished exports to the listing site
    pub fn with_site_uploader(mut self, uploader: Arc<dyn SiteUploader>) -> Self {
        self.site_uploader = Some(uploader);
        self
    }

    /// Shared configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Latest published status of a run
    pub async fn status(&self, run_id: &str) -> Result<Option<TaskStatus>> {
        self.status.get(run_id).await
    }

    /// Drop cached records for a warehouse so the next run refetches them
    pub async fn invalidate_records(&self, warehouse: &str) -> Result<bool> {
        let run = self.config.run_context(warehouse)?;
        Ok(self.records.invalidate(&run).await)
    }
}
