//! Error types for auction-export
//!
//! The pipeline distinguishes between contained failures (one image, one
//! record) and run-level failures. Contained failures are carried as values
//! ([`ImageError`], [`MappingError`]) and reported alongside successes; only
//! [`Error`] values that escape the orchestrator end a run in the ERROR stage.

use thiserror::Error;

/// Result type alias for auction-export operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for auction-export
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "warehouses")
        key: Option<String>,
    },

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// CSV encoding or parsing error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Image download or normalization failure
    #[error("image error: {0}")]
    Image(#[from] ImageError),

    /// Remote file store (FTP) protocol or connection error
    #[error("file store error: {0}")]
    FileStore(String),

    /// Status store error
    #[error("status store error: {0}")]
    StatusStore(#[from] redis::RedisError),

    /// Record source returned something unusable
    #[error("record source error: {0}")]
    Source(String),

    /// A single record could not be mapped
    #[error("mapping error: {0}")]
    Mapping(#[from] MappingError),

    /// The run was stopped before completion
    #[error("run stopped before completion")]
    Cancelled,

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a configuration error tied to a key
    pub fn config(message: impl Into<String>, key: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }
}

/// Reasons an image slot stays unresolved
#[derive(Debug, Error)]
pub enum ImageError {
    /// The image host answered with a non-success status
    #[error("download returned HTTP {status}")]
    HttpStatus {
        /// HTTP status code returned by the image host
        status: u16,
    },

    /// The response is not an image
    #[error("unsupported content type: {content_type}")]
    ContentType {
        /// The offending content type (or disposition extension)
        content_type: String,
    },

    /// Payload is too small to be a real image
    #[error("payload of {len} bytes is below the {min} byte threshold, likely corrupted")]
    TooSmall {
        /// Received payload length in bytes
        len: usize,
        /// Configured corruption threshold
        min: usize,
    },

    /// Transport failure while downloading
    #[error("download failed: {0}")]
    Download(String),

    /// Decoding or re-encoding failed
    #[error("normalization failed: {0}")]
    Normalize(String),
}

impl From<image::ImageError> for ImageError {
    fn from(e: image::ImageError) -> Self {
        ImageError::Normalize(e.to_string())
    }
}

/// Per-record mapping errors
#[derive(Debug, Error)]
pub enum MappingError {
    /// A field the output schema cannot do without is absent or blank
    #[error("missing required field '{field}'")]
    MissingField {
        /// Source field name
        field: &'static str,
    },

    /// A field is present but holds an unusable value
    #[error("invalid value for field '{field}': {reason}")]
    InvalidField {
        /// Source field name
        field: &'static str,
        /// Why the value was rejected
        reason: String,
    },
}
