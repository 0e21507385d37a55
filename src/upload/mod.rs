//! Upload pool for the remote file store
//!
//! [`UploadPool::upload`] pushes one normalized image to the store and returns
//! its public URL. Three limits apply to every attempt, acquired in this order
//! before any network call:
//!
//! 1. the shared [`RateLimiter`] (attempts per interval)
//! 2. the connection cap (`connections` sessions at most)
//! 3. a pooled session, or a freshly connected one
//!
//! Attempts are wrapped in [`with_retry`]; a session that saw an error is
//! discarded rather than returned to the pool.

mod ftp;

pub use ftp::{FtpConnector, FtpSession};

use crate::config::UploadConfig;
use crate::error::{Error, Result};
use crate::rate_limiter::RateLimiter;
use crate::retry::with_retry;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, warn};

/// Opens sessions to the remote file store
#[async_trait]
pub trait StoreConnector: Send + Sync {
    /// Connect and authenticate a new session
    async fn connect(&self) -> Result<Box<dyn StoreSession>>;
}

/// One open connection to the remote file store
#[async_trait]
pub trait StoreSession: Send {
    /// Create a directory; may fail if it already exists
    async fn make_dir(&mut self, dir: &str) -> Result<()>;

    /// Write `bytes` to `path`, replacing any existing file
    async fn put(&mut self, path: &str, bytes: Vec<u8>) -> Result<()>;

    /// Close the session politely
    async fn quit(&mut self) -> Result<()>;
}

/// Whether a make-directory failure just means the directory is there already
pub fn is_already_exists(error: &Error) -> bool {
    match error {
        Error::FileStore(msg) => {
            let msg = msg.to_lowercase();
            msg.contains("550") || msg.contains("exists")
        }
        _ => false,
    }
}

/// Public URL for an uploaded file: `base + "/" + file_name`, `https://` when
/// the base carries no scheme
pub fn public_url(base: &str, file_name: &str) -> String {
    let base = base.trim_end_matches('/');
    if base.contains("://") {
        format!("{base}/{file_name}")
    } else {
        format!("https://{base}/{file_name}")
    }
}

/// Bounded set of store sessions shared by a whole run
pub struct UploadPool {
    connector: Arc<dyn StoreConnector>,
    config: UploadConfig,
    limiter: RateLimiter,
    connections: Arc<Semaphore>,
    idle: Mutex<Vec<Box<dyn StoreSession>>>,
    closed: AtomicBool,
}

impl UploadPool {
    /// Create a pool; sessions are opened lazily
    pub fn new(connector: Arc<dyn StoreConnector>, config: UploadConfig, limiter: RateLimiter) -> Self {
        let connections = Arc::new(Semaphore::new(config.connections.max(1)));
        Self {
            connector,
            config,
            limiter,
            connections,
            idle: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Upload one file into the configured directory, returning its public URL
    ///
    /// Transient failures are retried per the upload retry policy; the last
    /// error is returned once attempts run out.
    pub async fn upload(&self, file_name: &str, bytes: Vec<u8>) -> Result<String> {
        let dir = self.config.remote_dir.trim_end_matches('/').to_string();
        let path = format!("{dir}/{file_name}");

        with_retry(&self.config.retry, || self.attempt(&dir, &path, bytes.clone())).await?;

        let url = public_url(&self.config.public_base_url, file_name);
        debug!(file = file_name, url = %url, "upload complete");
        Ok(url)
    }

    async fn attempt(&self, dir: &str, path: &str, bytes: Vec<u8>) -> Result<()> {
        if self.is_closed() {
            return Err(Error::FileStore("upload pool is shut down".into()));
        }

        self.limiter.acquire().await;
        let _permit = self
            .connections
            .acquire()
            .await
            .map_err(|_| Error::FileStore("upload pool is shut down".into()))?;

        let mut session = match self.idle.lock().await.pop() {
            Some(session) => session,
            None => self.connector.connect().await?,
        };

        let result = async {
            match session.make_dir(dir).await {
                Err(e) if !is_already_exists(&e) => return Err(e),
                _ => {}
            }
            session.put(path, bytes).await
        }
        .await;

        match result {
            Ok(()) if !self.is_closed() => {
                self.idle.lock().await.push(session);
                Ok(())
            }
            Ok(()) => {
                let _ = session.quit().await;
                Ok(())
            }
            Err(e) => {
                // Session state is unknown after a failure
                let _ = session.quit().await;
                Err(e)
            }
        }
    }

    /// Whether [`close`](Self::close) has run
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of sessions parked in the pool
    pub async fn idle_sessions(&self) -> usize {
        self.idle.lock().await.len()
    }

    /// Tear down every pooled session; later calls are no-ops
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.connections.close();

        let sessions: Vec<_> = self.idle.lock().await.drain(..).collect();
        let count = sessions.len();
        for mut session in sessions {
            if let Err(e) = session.quit().await {
                warn!(error = %e, "failed to close store session");
            }
        }
        info!(sessions = count, "upload pool closed");
    }
}
