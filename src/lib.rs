//! # auction-export
//!
//! Batch pipeline that turns warehouse inventory records into a fixed-schema
//! auction import CSV, re-hosting every product image on the way.
//!
//! ## Design Philosophy
//!
//! auction-export is designed to be:
//! - **Library-first** - No CLI or UI; the task queue that triggers runs lives elsewhere
//! - **Explicitly configured** - The warehouse profile is a value passed into each run
//! - **Fault-contained** - A bad image or record never fails the run
//! - **Observable by status** - Runs publish their stage and progress under their run id
//!
//! ## Quick Start
//!
//! ```no_run
//! use auction_export::{Config, Orchestrator, RunRequest};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_json_file("auction-export.json")?;
//!     let orchestrator = Orchestrator::from_config(config)?;
//!
//!     let request = RunRequest {
//!         event_id: "EV-2041".to_string(),
//!         warehouse: "Maule Warehouse".to_string(),
//!         starting_price: None,
//!         run_id: "run-7f3a".to_string(),
//!     };
//!     orchestrator.run(request, CancellationToken::new()).await;
//!
//!     if let Some(status) = orchestrator.status("run-7f3a").await? {
//!         println!("{}: {}", status.stage, status.message);
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// TTL cache with get-or-fetch semantics
pub mod cache;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// CSV assembly, sanitization and export sinks
pub mod export;
/// Image download, validation and normalization
pub mod images;
/// Record to output-row mapping
pub mod mapper;
/// Export run orchestration
pub mod orchestrator;
/// Token bucket rate limiting
pub mod rate_limiter;
/// Retry logic with exponential backoff
pub mod retry;
/// Paged record source and its cached client
pub mod source;
/// Run status reporting
pub mod status;
/// Core data types
pub mod types;
/// Remote file store upload pool
pub mod upload;

use tokio_util::sync::CancellationToken;

// Re-export commonly used types
pub use config::{Config, RunContext};
pub use error::{Error, ImageError, MappingError, Result};
pub use export::{ExportArtifact, ExportSink, FileExportSink, SiteUploader};
pub use images::{HttpImageSource, ImagePipeline, ImageSource};
pub use orchestrator::{Collaborators, Orchestrator, RunReport, RunRequest, SiteUpload};
pub use source::{AirtableSource, RecordSource, RecordSourceClient};
pub use status::{MemoryStatusStore, RedisStatusStore, StatusReporter, StatusStore};
pub use types::{
    COLUMNS, ImageRef, MappingFailure, OutputRow, RecordId, Slot, SourceRecord, Stage, TaskStatus,
    UploadResult,
};
pub use upload::{FtpConnector, StoreConnector, StoreSession, UploadPool};

/// Run one export, stopping it cooperatively on a termination signal.
///
/// The stop takes effect at the next batch boundary and the run ends in
/// `ERROR` with a "stopped" message; work already in flight finishes first.
///
/// # Example
///
/// ```no_run
/// use auction_export::{Config, Orchestrator, RunRequest, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let orchestrator = Orchestrator::from_config(Config::from_json_file("auction-export.json")?)?;
///     let request = RunRequest {
///         event_id: "EV-2041".to_string(),
///         warehouse: "Maule Warehouse".to_string(),
///         starting_price: Some(1.0),
///         run_id: "run-7f3a".to_string(),
///     };
///
///     run_with_shutdown(&orchestrator, request).await;
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(orchestrator: &Orchestrator, request: RunRequest) {
    let cancel = CancellationToken::new();
    let watcher = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            tokio::select! {
                _ = wait_for_signal() => cancel.cancel(),
                _ = cancel.cancelled() => {}
            }
        }
    });

    orchestrator.run(request, cancel.clone()).await;

    // Release the signal watcher once the run is over
    cancel.cancel();
    if let Err(e) = watcher.await {
        tracing::error!(error = %e, "signal watcher panicked");
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Signal registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, stopping export run");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT, stopping export run");
                }
            }
        }
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register signal handlers, using ctrl_c fallback");
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received Ctrl+C, stopping export run");
            } else {
                // Nothing can stop the run; wait for it to finish on its own
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C, stopping export run");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
            std::future::pending::<()>().await;
        }
    }
}
