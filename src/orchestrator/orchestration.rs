//! Run lifecycle -- status transitions around one export run.

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::error::{Error, Result};
use crate::mapper::MapContext;
use crate::rate_limiter::RateLimiter;
use crate::types::{MappingFailure, OutputRow, Stage};
use crate::upload::UploadPool;

use super::batching::{ProcessBatchParams, process_batch};
use super::finalization::{FinalizeParams, finalize_export};
use super::{Orchestrator, RunReport, RunRequest};

/// Message published when a run is stopped through its cancellation token
pub(super) const STOPPED_MESSAGE: &str = "stopped";

/// Rows and failures accumulated across batches
#[derive(Default)]
pub(super) struct RunTotals {
    pub(super) rows: Vec<OutputRow>,
    pub(super) failures: Vec<MappingFailure>,
    pub(super) images_uploaded: usize,
    pub(super) images_failed: usize,
}

impl Orchestrator {
    /// Run one export to completion.
    ///
    /// Returns nothing; the outcome is observable through the status store
    /// (`COMPLETED` or `ERROR`) and the export sink. Cancelling `cancel` stops
    /// the run at the next batch boundary; in-flight image work finishes first.
    ///
    /// Phases:
    /// 1. Publish STARTED and resolve the warehouse profile
    /// 2. Fetch records (cached per warehouse)
    /// 3. Process batches strictly one after another
    /// 4. Assemble, sanitize and persist the export
    /// 5. Close the upload pool, whatever happened
    pub async fn run(&self, request: RunRequest, cancel: CancellationToken) {
        let span = tracing::info_span!(
            "export_run",
            run_id = %request.run_id,
            event_id = %request.event_id,
            warehouse = %request.warehouse,
        );
        self.run_inner(request, cancel).instrument(span).await
    }

    async fn run_inner(&self, request: RunRequest, cancel: CancellationToken) {
        let run_id = request.run_id.clone();
        self.status
            .set_status(&run_id, Stage::Started, "fetching records", Some(0))
            .await;

        let limiter = RateLimiter::new(
            self.config.rate_limit.permits,
            self.config.rate_limit.interval,
        );
        let pool = UploadPool::new(self.connector.clone(), self.config.upload.clone(), limiter);

        let outcome = AssertUnwindSafe(self.execute(&request, &pool, &cancel))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(Error::Other("export run panicked".into())));

        // Cleanup runs on every path
        pool.close().await;

        match outcome {
            Ok(report) => {
                tracing::info!(
                    rows = report.rows,
                    failures = report.failures,
                    images_uploaded = report.images_uploaded,
                    images_failed = report.images_failed,
                    "export run completed"
                );
                self.status
                    .set_status(&run_id, Stage::Completed, report.summary(), Some(100))
                    .await;
            }
            Err(Error::Cancelled) => {
                tracing::warn!("export run stopped before completion");
                self.status
                    .set_status(&run_id, Stage::Error, STOPPED_MESSAGE, None)
                    .await;
            }
            Err(e) => {
                tracing::error!(error = %e, "export run failed");
                self.status
                    .set_status(&run_id, Stage::Error, e.to_string(), None)
                    .await;
            }
        }
    }

    /// Everything between STARTED and the terminal status
    pub(super) async fn execute(
        &self,
        request: &RunRequest,
        pool: &UploadPool,
        cancel: &CancellationToken,
    ) -> Result<RunReport> {
        let run = self.config.run_context(&request.warehouse)?;
        check_cancelled(cancel)?;

        let records = self.records.fetch(&run).await;
        let batch_size = self.config.pipeline.batch_size.max(1);
        let total_batches = records.len().div_ceil(batch_size);
        tracing::info!(
            records = records.len(),
            batches = total_batches,
            warehouse = %run.name,
            "records fetched"
        );

        let ctx = MapContext {
            event_id: &request.event_id,
            run: &run,
            starting_price: request.starting_price,
        };
        let mut totals = RunTotals::default();

        for (index, batch) in records.chunks(batch_size).enumerate() {
            check_cancelled(cancel)?;

            let outcome = process_batch(ProcessBatchParams {
                batch,
                images: &self.images,
                pool,
                ctx: &ctx,
                concurrency: self.config.pipeline.task_concurrency.max(1),
                cancel,
            })
            .await?;

            tracing::debug!(
                batch = index + 1,
                rows = outcome.rows.len(),
                failures = outcome.failures.len(),
                "batch processed"
            );
            totals.images_uploaded += outcome.images_uploaded;
            totals.images_failed += outcome.images_failed;
            totals.rows.extend(outcome.rows);
            totals.failures.extend(outcome.failures);

            let done = index + 1;
            self.status
                .set_status(
                    &request.run_id,
                    Stage::InProgress,
                    format!("processed batch {done}/{total_batches}"),
                    Some(progress_percent(done, total_batches)),
                )
                .await;
        }

        check_cancelled(cancel)?;

        finalize_export(FinalizeParams {
            request,
            totals,
            exports: self.exports.as_ref(),
            site_uploader: self.site_uploader.as_deref(),
        })
        .await
    }
}

pub(super) fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}

/// Whole-percent progress after `done` of `total` batches
pub(super) fn progress_percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done.min(total) * 100) / total) as u8
}
