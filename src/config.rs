//! Configuration types for auction-export
//!
//! A [`Config`] is loaded once and shared immutably (behind an `Arc`) by every
//! component. The warehouse-specific part of a run is resolved up front into a
//! [`RunContext`] value and passed explicitly into each call, so concurrent runs
//! for different warehouses never observe each other's settings.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::Path, path::PathBuf, time::Duration};

/// Record source (REST API) settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourceConfig {
    /// API base URL (default: "https://api.airtable.com/v0")
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// How long fetched record lists stay cached (default: 1 hour)
    #[serde(default = "default_cache_ttl", with = "duration_serde")]
    pub cache_ttl: Duration,

    /// Upper bound on pages fetched per collection (default: 15)
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,

    /// Per-request timeout (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub timeout: Duration,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            cache_ttl: default_cache_ttl(),
            max_pages: default_max_pages(),
            timeout: default_request_timeout(),
        }
    }
}

/// Image download and normalization settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Payloads shorter than this are treated as corrupted (default: 1000 bytes)
    #[serde(default = "default_min_bytes")]
    pub min_bytes: usize,

    /// Images wider than this are downscaled proportionally (default: 1024)
    #[serde(default = "default_max_width")]
    pub max_width: u32,

    /// Declared resolution written into re-encoded images (default: 72)
    #[serde(default = "default_max_dpi")]
    pub max_dpi: u16,

    /// JPEG quality for re-encoding, 1-100 (default: 85)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// Per-download timeout (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub timeout: Duration,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            min_bytes: default_min_bytes(),
            max_width: default_max_width(),
            max_dpi: default_max_dpi(),
            jpeg_quality: default_jpeg_quality(),
            timeout: default_request_timeout(),
        }
    }
}

/// Retry configuration for transient upload failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first try (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 10 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Remote file store (FTP) settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadConfig {
    /// FTP server hostname
    #[serde(default = "default_ftp_host")]
    pub host: String,

    /// FTP server port (default: 21)
    #[serde(default = "default_ftp_port")]
    pub port: u16,

    /// FTP username
    #[serde(default)]
    pub username: String,

    /// FTP password
    #[serde(default)]
    pub password: String,

    /// Directory uploads are written into
    #[serde(default = "default_remote_dir")]
    pub remote_dir: String,

    /// Public URL prefix that serves `remote_dir`
    #[serde(default)]
    pub public_base_url: String,

    /// Number of concurrent store sessions (default: 5)
    #[serde(default = "default_connections")]
    pub connections: usize,

    /// Retry policy applied to every upload
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            host: default_ftp_host(),
            port: default_ftp_port(),
            username: String::new(),
            password: String::new(),
            remote_dir: default_remote_dir(),
            public_base_url: String::new(),
            connections: default_connections(),
            retry: RetryConfig::default(),
        }
    }
}

/// Upload rate limit: `permits` upload attempts per `interval`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Permits granted per interval (default: 5)
    #[serde(default = "default_permits")]
    pub permits: u64,

    /// Replenish interval (default: 1 second)
    #[serde(default = "default_interval", with = "duration_serde")]
    pub interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            permits: default_permits(),
            interval: default_interval(),
        }
    }
}

/// Batch and task concurrency settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Records per batch; batches run strictly one after another (default: 50)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Simultaneous per-image / per-record tasks (default: 10)
    #[serde(default = "default_task_concurrency")]
    pub task_concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            task_concurrency: default_task_concurrency(),
        }
    }
}

/// Task status store settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusConfig {
    /// Redis connection URL; `None` keeps statuses in process memory
    #[serde(default)]
    pub redis_url: Option<String>,

    /// How long a status stays queryable (default: 24 hours)
    #[serde(default = "default_status_ttl", with = "duration_serde")]
    pub ttl: Duration,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            ttl: default_status_ttl(),
        }
    }
}

/// Export persistence settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Directory finished exports are written to (default: "./exports")
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
        }
    }
}

/// Per-warehouse run profile
///
/// Selected by name at the start of a run and then treated as read-only.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunContext {
    /// Warehouse display name
    #[serde(default)]
    pub name: String,

    /// Record source base identifier
    pub source_id: String,

    /// Record source table / collection identifier
    pub collection_id: String,

    /// Record source view identifier
    pub view_id: String,

    /// Bearer token for the record source
    pub token: String,

    /// Region code written into every row
    #[serde(default)]
    pub region: String,

    /// Text prepended to every title (e.g. "OFFSITE ")
    #[serde(default)]
    pub title_prefix: Option<String>,

    /// Seller name written into every row
    #[serde(default = "default_seller")]
    pub seller: String,

    /// Value of the `Source` column
    #[serde(default = "default_listing_source")]
    pub listing_source: String,

    /// Value of the `PickupDetails` column
    #[serde(default)]
    pub pickup_details: String,

    /// Append " NOTES: ..." to subtitles
    #[serde(default)]
    pub subtitle_notes: bool,
}

/// Main configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Record source settings
    #[serde(default)]
    pub source: SourceConfig,

    /// Image pipeline settings
    #[serde(default)]
    pub images: ImageConfig,

    /// Remote file store settings
    #[serde(default)]
    pub upload: UploadConfig,

    /// Upload rate limit
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Batching and concurrency
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Status store settings
    #[serde(default)]
    pub status: StatusConfig,

    /// Export persistence
    #[serde(default)]
    pub export: ExportConfig,

    /// Warehouse profiles keyed by name
    #[serde(default)]
    pub warehouses: HashMap<String, RunContext>,
}

impl Config {
    /// Load configuration from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        tracing::debug!(path = %path.display(), warehouses = config.warehouses.len(), "configuration loaded");
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        match url::Url::parse(&self.source.api_base) {
            Ok(base) if matches!(base.scheme(), "http" | "https") => {}
            Ok(base) => {
                return Err(Error::config(
                    format!("unsupported api_base scheme '{}'", base.scheme()),
                    "source.api_base",
                ));
            }
            Err(e) => {
                return Err(Error::config(
                    format!("invalid api_base '{}': {e}", self.source.api_base),
                    "source.api_base",
                ));
            }
        }
        if self.pipeline.batch_size == 0 {
            return Err(Error::config("batch_size must be at least 1", "pipeline.batch_size"));
        }
        if self.pipeline.task_concurrency == 0 {
            return Err(Error::config(
                "task_concurrency must be at least 1",
                "pipeline.task_concurrency",
            ));
        }
        if self.upload.connections == 0 {
            return Err(Error::config("connections must be at least 1", "upload.connections"));
        }
        if self.rate_limit.permits == 0 || self.rate_limit.interval.is_zero() {
            return Err(Error::config(
                "rate limit needs a non-zero permit count and interval",
                "rate_limit",
            ));
        }
        Ok(())
    }

    /// Resolve the run profile for a warehouse
    pub fn run_context(&self, warehouse: &str) -> Result<RunContext> {
        let mut ctx = self.warehouses.get(warehouse).cloned().ok_or_else(|| {
            Error::config(format!("unknown warehouse '{warehouse}'"), "warehouses")
        })?;
        if ctx.name.is_empty() {
            ctx.name = warehouse.to_string();
        }
        Ok(ctx)
    }
}

fn default_api_base() -> String {
    "https://api.airtable.com/v0".to_string()
}

fn default_cache_ttl() -> Duration {
    Duration::from_secs(3600)
}

fn default_max_pages() -> usize {
    15
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_min_bytes() -> usize {
    1000
}

fn default_max_width() -> u32 {
    1024
}

fn default_max_dpi() -> u16 {
    72
}

fn default_jpeg_quality() -> u8 {
    85
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(10)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

fn default_ftp_host() -> String {
    "localhost".to_string()
}

fn default_ftp_port() -> u16 {
    21
}

fn default_remote_dir() -> String {
    "/public_html/images".to_string()
}

fn default_connections() -> usize {
    5
}

fn default_permits() -> u64 {
    5
}

fn default_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_batch_size() -> usize {
    50
}

fn default_task_concurrency() -> usize {
    10
}

fn default_status_ttl() -> Duration {
    Duration::from_secs(24 * 3600)
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./exports")
}

fn default_seller() -> String {
    "702Auctions".to_string()
}

fn default_listing_source() -> String {
    "AMZ FC".to_string()
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
