//! Export finalization -- assemble, sanitize, persist and hand off.

use chrono::Utc;

use crate::error::Result;
use crate::export::{ExportArtifact, ExportSink, SiteUploader, assemble, sanitize};

use super::orchestration::RunTotals;
use super::{RunReport, RunRequest, SiteUpload};

pub(super) struct FinalizeParams<'a> {
    pub(super) request: &'a RunRequest,
    pub(super) totals: RunTotals,
    pub(super) exports: &'a dyn ExportSink,
    pub(super) site_uploader: Option<&'a dyn SiteUploader>,
}

/// Build the export from every batch's rows and persist it.
///
/// A failed site hand-off does not fail the run: the export is already
/// persisted, and the failure is carried in the report.
pub(super) async fn finalize_export(params: FinalizeParams<'_>) -> Result<RunReport> {
    let FinalizeParams {
        request,
        totals,
        exports,
        site_uploader,
    } = params;
    let RunTotals {
        rows,
        failures,
        images_uploaded,
        images_failed,
    } = totals;

    let csv = sanitize(&assemble(&rows)?)?;
    let artifact = ExportArtifact {
        event_id: request.event_id.clone(),
        run_id: request.run_id.clone(),
        csv,
        failures,
        created_at: Utc::now(),
    };
    exports.persist(&artifact).await?;

    let site_upload = match site_uploader {
        None => SiteUpload::Skipped,
        Some(uploader) => match uploader.upload(&artifact.event_id, &artifact.csv).await {
            Ok(()) => {
                tracing::info!(event_id = %artifact.event_id, "export accepted by listing site");
                SiteUpload::Done
            }
            Err(e) => {
                tracing::error!(event_id = %artifact.event_id, error = %e, "site upload failed");
                SiteUpload::Failed(e.to_string())
            }
        },
    };

    Ok(RunReport {
        rows: rows.len(),
        failures: artifact.failures.len(),
        images_uploaded,
        images_failed,
        site_upload,
    })
}
