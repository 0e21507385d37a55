//! Batch processing -- image re-hosting fan-out, upload indexing and record mapping.

use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::images::ImagePipeline;
use crate::mapper::{MapContext, map_record};
use crate::types::{ImageRef, MappingFailure, OutputRow, RecordId, Slot, SourceRecord, UploadResult};
use crate::upload::UploadPool;

use super::orchestration::check_cancelled;

/// Resolved image URLs per record, slot-ordered
pub(super) type UploadIndex = HashMap<RecordId, BTreeMap<Slot, String>>;

pub(super) struct ProcessBatchParams<'a> {
    pub(super) batch: &'a [SourceRecord],
    pub(super) images: &'a ImagePipeline,
    pub(super) pool: &'a UploadPool,
    pub(super) ctx: &'a MapContext<'a>,
    pub(super) concurrency: usize,
    pub(super) cancel: &'a CancellationToken,
}

/// Result of one batch
#[derive(Debug, Default)]
pub(super) struct BatchOutcome {
    pub(super) rows: Vec<OutputRow>,
    pub(super) failures: Vec<MappingFailure>,
    pub(super) images_uploaded: usize,
    pub(super) images_failed: usize,
}

/// Re-host every image of the batch, then map every record of the batch.
///
/// All image work is joined before mapping starts. The stop signal is checked
/// between the two stages.
pub(super) async fn process_batch(params: ProcessBatchParams<'_>) -> Result<BatchOutcome> {
    let ProcessBatchParams {
        batch,
        images,
        pool,
        ctx,
        concurrency,
        cancel,
    } = params;

    let uploads = rehost_images(batch, images, pool, concurrency).await;
    let images_uploaded = uploads.iter().filter(|u| u.url.is_some()).count();
    let images_failed = uploads.len() - images_uploaded;

    check_cancelled(cancel)?;

    let index = index_uploads(uploads);
    let (rows, failures) = map_batch(batch, &index, ctx);

    Ok(BatchOutcome {
        rows,
        failures,
        images_uploaded,
        images_failed,
    })
}

/// Download, normalize and upload every image reference in the batch, at most
/// `concurrency` at a time. Completion order is arbitrary.
pub(super) async fn rehost_images(
    batch: &[SourceRecord],
    images: &ImagePipeline,
    pool: &UploadPool,
    concurrency: usize,
) -> Vec<UploadResult> {
    let jobs = batch.iter().flat_map(|record| {
        let lot = record.lot_number().unwrap_or_default();
        record
            .images
            .iter()
            .map(move |image| (&record.id, lot.clone(), image))
    });

    stream::iter(jobs)
        .map(|(record_id, lot, image)| rehost_image(images, pool, record_id, lot, image))
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await
}

async fn rehost_image(
    images: &ImagePipeline,
    pool: &UploadPool,
    record_id: &RecordId,
    lot: String,
    image: &ImageRef,
) -> UploadResult {
    let url = match images.prepare(record_id, &lot, image).await {
        Ok(asset) => {
            let file_name = asset.file_name();
            match pool.upload(&file_name, asset.bytes).await {
                Ok(url) => Some(url),
                Err(e) => {
                    tracing::warn!(
                        record_id = %record_id,
                        slot = %image.slot,
                        file = %file_name,
                        error = %e,
                        "image upload failed"
                    );
                    None
                }
            }
        }
        Err(e) => {
            tracing::warn!(
                record_id = %record_id,
                slot = %image.slot,
                url = %image.url,
                error = %e,
                "image rejected"
            );
            None
        }
    };

    UploadResult {
        record_id: record_id.clone(),
        slot: image.slot,
        url,
        completed_at: Utc::now(),
    }
}

/// Index successful uploads by record and slot.
///
/// When the same (record, slot) resolved more than once, the latest
/// completion wins; ties keep the later entry in `uploads`.
pub(super) fn index_uploads(uploads: Vec<UploadResult>) -> UploadIndex {
    let mut successes: Vec<_> = uploads
        .into_iter()
        .filter_map(|u| u.url.map(|url| (u.completed_at, u.record_id, u.slot, url)))
        .collect();
    successes.sort_by_key(|(completed_at, ..)| *completed_at);

    let mut index = UploadIndex::new();
    for (_, record_id, slot, url) in successes {
        index.entry(record_id).or_default().insert(slot, url);
    }
    index
}

/// Map each record in batch order
pub(super) fn map_batch(
    batch: &[SourceRecord],
    index: &UploadIndex,
    ctx: &MapContext<'_>,
) -> (Vec<OutputRow>, Vec<MappingFailure>) {
    let mut rows = Vec::with_capacity(batch.len());
    let mut failures = Vec::new();

    for record in batch {
        match map_record(record, index.get(&record.id), ctx) {
            Ok(row) => rows.push(row),
            Err(failure) => {
                tracing::warn!(
                    record_id = %failure.record_id,
                    lot_number = %failure.lot_number,
                    "{}",
                    failure.message
                );
                failures.push(failure);
            }
        }
    }

    (rows, failures)
}
