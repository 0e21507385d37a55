//! Image pipeline: download, validate, normalize
//!
//! Every image slot of a record goes through [`ImagePipeline::prepare`]:
//! the bytes are fetched from an [`ImageSource`], checked against the
//! corruption threshold, then normalized on the blocking pool into a single
//! JPEG rendition. Failures come back as [`ImageError`] values for the caller
//! to record; nothing here aborts a batch.

mod http;
mod normalize;

pub use http::HttpImageSource;
pub use normalize::normalize;

use crate::config::ImageConfig;
use crate::error::ImageError;
use crate::types::{ImageAsset, ImageRef, RecordId};
use async_trait::async_trait;
use std::sync::Arc;

/// Where original image bytes come from
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Download an image, rejecting non-success statuses and non-image payloads
    async fn download(&self, url: &str) -> Result<Vec<u8>, ImageError>;
}

/// Download + normalization stages for one run
#[derive(Clone)]
pub struct ImagePipeline {
    source: Arc<dyn ImageSource>,
    config: ImageConfig,
}

impl ImagePipeline {
    /// Create a pipeline over an image source
    pub fn new(source: Arc<dyn ImageSource>, config: ImageConfig) -> Self {
        Self { source, config }
    }

    /// Download with validation
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, ImageError> {
        let bytes = self.source.download(url).await?;
        if bytes.len() < self.config.min_bytes {
            return Err(ImageError::TooSmall {
                len: bytes.len(),
                min: self.config.min_bytes,
            });
        }
        Ok(bytes)
    }

    /// Fetch and normalize one image into an asset ready for upload
    pub async fn prepare(
        &self,
        record_id: &RecordId,
        lot_number: &str,
        image: &ImageRef,
    ) -> Result<ImageAsset, ImageError> {
        let raw = self.fetch(&image.url).await?;

        let config = self.config.clone();
        let bytes = tokio::task::spawn_blocking(move || normalize(&raw, &config))
            .await
            .map_err(|e| ImageError::Normalize(format!("normalize task failed: {e}")))??;

        tracing::debug!(
            record_id = %record_id,
            slot = %image.slot,
            bytes = bytes.len(),
            "image normalized"
        );

        Ok(ImageAsset {
            record_id: record_id.clone(),
            lot_number: lot_number.to_string(),
            slot: image.slot,
            bytes,
        })
    }
}
