//! In-memory collaborators that record what the pipeline did to them

use async_trait::async_trait;
use auction_export::{Error, ImageError, ImageSource, Result, SiteUploader, StoreConnector, StoreSession};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Tracks how many operations run at once and the highest value seen
#[derive(Debug, Default)]
pub struct Gauge {
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    pub fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    pub fn exit(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// File store keeping uploads in memory
#[derive(Default)]
pub struct RecordingStore {
    pub files: Mutex<Vec<(String, usize)>>,
    pub dirs: Mutex<Vec<String>>,
    pub connects: AtomicUsize,
    pub quits: AtomicUsize,
    pub uploads: Gauge,
    /// Time each `put` takes
    pub put_delay: Duration,
    /// Cancelled once this many files were stored
    pub stop_after: Option<(usize, CancellationToken)>,
}

impl RecordingStore {
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.files.lock().unwrap().iter().map(|(p, _)| p.clone()).collect();
        paths.sort();
        paths
    }
}

pub struct RecordingSession(Arc<RecordingStore>);

/// Connector handing out sessions on a shared [`RecordingStore`]
pub struct RecordingConnector(pub Arc<RecordingStore>);

#[async_trait]
impl StoreConnector for RecordingConnector {
    async fn connect(&self) -> Result<Box<dyn StoreSession>> {
        self.0.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(RecordingSession(Arc::clone(&self.0))))
    }
}

#[async_trait]
impl StoreSession for RecordingSession {
    async fn make_dir(&mut self, dir: &str) -> Result<()> {
        let mut dirs = self.0.dirs.lock().unwrap();
        if dirs.iter().any(|d| d == dir) {
            return Err(Error::FileStore(format!("550 {dir}: File exists")));
        }
        dirs.push(dir.to_string());
        Ok(())
    }

    async fn put(&mut self, path: &str, bytes: Vec<u8>) -> Result<()> {
        self.0.uploads.enter();
        if !self.0.put_delay.is_zero() {
            tokio::time::sleep(self.0.put_delay).await;
        }
        let stored = {
            let mut files = self.0.files.lock().unwrap();
            files.push((path.to_string(), bytes.len()));
            files.len()
        };
        self.0.uploads.exit();

        if let Some((limit, token)) = &self.0.stop_after
            && stored >= *limit
        {
            token.cancel();
        }
        Ok(())
    }

    async fn quit(&mut self) -> Result<()> {
        self.0.quits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Wraps an image source and measures download concurrency
pub struct GaugedImages<S> {
    pub inner: S,
    pub downloads: Arc<Gauge>,
    pub delay: Duration,
}

#[async_trait]
impl<S: ImageSource> ImageSource for GaugedImages<S> {
    async fn download(&self, url: &str) -> std::result::Result<Vec<u8>, ImageError> {
        self.downloads.enter();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let result = self.inner.download(url).await;
        self.downloads.exit();
        result
    }
}

/// Site uploader that remembers what it was handed
#[derive(Default)]
pub struct RecordingSite {
    pub uploads: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl SiteUploader for RecordingSite {
    async fn upload(&self, event_id: &str, csv: &str) -> Result<()> {
        self.uploads
            .lock()
            .unwrap()
            .push((event_id.to_string(), csv.to_string()));
        Ok(())
    }
}
