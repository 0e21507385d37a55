//! Task status reporting
//!
//! Each run publishes its latest [`TaskStatus`] to a [`StatusStore`] under its
//! run id, with a fixed expiry. Only the latest status is kept. The
//! [`StatusReporter`] refuses writes that would move a run backwards or touch
//! it after COMPLETED/ERROR, so a stale progress update can never mask the
//! final outcome.

use crate::error::Result;
use crate::types::{Stage, TaskStatus};
use async_trait::async_trait;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Keyed storage for run statuses
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Replace the status of `status.run_id`, expiring after `ttl`
    async fn put(&self, status: &TaskStatus, ttl: Duration) -> Result<()>;

    /// Latest status of a run, if it has not expired
    async fn get(&self, run_id: &str) -> Result<Option<TaskStatus>>;
}

fn status_key(run_id: &str) -> String {
    format!("task:{run_id}")
}

/// Statuses as JSON strings in Redis, written with `SET .. EX`
pub struct RedisStatusStore {
    client: redis::Client,
}

impl RedisStatusStore {
    /// Store backed by the Redis instance at `url`
    pub fn new(url: &str) -> Result<Self> {
        Ok(Self {
            client: redis::Client::open(url)?,
        })
    }
}

#[async_trait]
impl StatusStore for RedisStatusStore {
    async fn put(&self, status: &TaskStatus, ttl: Duration) -> Result<()> {
        let json = serde_json::to_string(status)?;
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: () = conn
            .set_ex(status_key(&status.run_id), json, ttl.as_secs().max(1))
            .await?;
        Ok(())
    }

    async fn get(&self, run_id: &str) -> Result<Option<TaskStatus>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let raw: Option<String> = conn.get(status_key(run_id)).await?;
        raw.map(|json| serde_json::from_str(&json).map_err(Into::into))
            .transpose()
    }
}

/// Process-local store, for deployments without Redis
#[derive(Default)]
pub struct MemoryStatusStore {
    entries: Mutex<HashMap<String, (TaskStatus, Instant)>>,
}

impl MemoryStatusStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StatusStore for MemoryStatusStore {
    async fn put(&self, status: &TaskStatus, ttl: Duration) -> Result<()> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, (_, expires_at)| *expires_at > now);
        entries.insert(status.run_id.clone(), (status.clone(), now + ttl));
        Ok(())
    }

    async fn get(&self, run_id: &str) -> Result<Option<TaskStatus>> {
        let entries = self.entries.lock().await;
        Ok(entries
            .get(run_id)
            .filter(|(_, expires_at)| *expires_at > Instant::now())
            .map(|(status, _)| status.clone()))
    }
}

/// Last stage published for one run; the lock orders that run's writes
type RunGuard = Arc<Mutex<Option<Stage>>>;

/// Guards stage transitions and publishes statuses
///
/// Writes for one run are serialized; writes for different runs never wait on
/// each other. A run's guard is dropped once it has been idle for the status
/// TTL, after which the store itself has forgotten the run too.
pub struct StatusReporter {
    store: Arc<dyn StatusStore>,
    ttl: Duration,
    runs: StdMutex<HashMap<String, (RunGuard, Instant)>>,
}

impl StatusReporter {
    /// Reporter writing to `store` with the given expiry
    pub fn new(store: Arc<dyn StatusStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            runs: StdMutex::new(HashMap::new()),
        }
    }

    /// Guard for `run_id`, pruning guards idle for longer than the TTL
    fn guard(&self, run_id: &str) -> RunGuard {
        let now = Instant::now();
        let mut runs = self.runs.lock().unwrap_or_else(PoisonError::into_inner);
        runs.retain(|_, (_, touched)| now.duration_since(*touched) < self.ttl);

        let (guard, touched) = runs
            .entry(run_id.to_string())
            .or_insert_with(|| (Arc::new(Mutex::new(None)), now));
        *touched = now;
        Arc::clone(guard)
    }

    #[cfg(test)]
    fn tracked_runs(&self) -> usize {
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Publish a new status for `run_id`
    ///
    /// Returns `false` when the write was refused because it would move the
    /// run backwards or past a terminal stage. Store failures are logged and
    /// do not fail the run.
    pub async fn set_status(
        &self,
        run_id: &str,
        stage: Stage,
        message: impl Into<String>,
        progress: Option<u8>,
    ) -> bool {
        let message = message.into();
        let guard = self.guard(run_id);
        let mut last = guard.lock().await;

        let current = match *last {
            Some(stage) => Some(stage),
            None => match self.store.get(run_id).await {
                Ok(existing) => existing.map(|s| s.stage),
                Err(e) => {
                    warn!(run_id, error = %e, "could not read existing status");
                    None
                }
            },
        };

        if let Some(current) = current
            && !current.can_transition_to(stage)
        {
            debug!(run_id, from = %current, to = %stage, "status write refused");
            return false;
        }

        let status = TaskStatus {
            run_id: run_id.to_string(),
            stage,
            message,
            timestamp: chrono::Utc::now().timestamp(),
            progress: progress.map(|p| p.min(100)),
        };

        if let Err(e) = self.store.put(&status, self.ttl).await {
            warn!(run_id, stage = %stage, error = %e, "failed to publish status");
        }
        debug!(run_id, stage = %stage, message = %status.message, progress = ?status.progress, "status updated");

        *last = Some(stage);
        true
    }

    /// Latest stored status of a run
    pub async fn get(&self, run_id: &str) -> Result<Option<TaskStatus>> {
        self.store.get(run_id).await
    }
}
