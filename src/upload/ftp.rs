use super::{StoreConnector, StoreSession};
use crate::config::UploadConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::io::Cursor;
use suppaftp::types::FileType;
use suppaftp::{FtpStream, Mode};
use tracing::debug;

/// Opens logged-in, passive, binary-mode FTP sessions
pub struct FtpConnector {
    host: String,
    port: u16,
    username: String,
    password: String,
}

impl FtpConnector {
    /// Connector for the configured server and credentials
    pub fn new(config: &UploadConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            username: config.username.clone(),
            password: config.password.clone(),
        }
    }
}

fn ftp_error(context: &str, e: impl std::fmt::Display) -> Error {
    Error::FileStore(format!("{context}: {e}"))
}

#[async_trait]
impl StoreConnector for FtpConnector {
    async fn connect(&self) -> Result<Box<dyn StoreSession>> {
        let addr = format!("{}:{}", self.host, self.port);
        let username = self.username.clone();
        let password = self.password.clone();

        debug!(server = %addr, "Connecting to FTP server");

        // suppaftp's FtpStream is blocking
        let stream = tokio::task::spawn_blocking(move || {
            let mut ftp = FtpStream::connect(&addr).map_err(|e| ftp_error("connection failed", e))?;
            ftp.login(&username, &password)
                .map_err(|e| ftp_error("login failed", e))?;
            ftp.set_mode(Mode::Passive);
            ftp.transfer_type(FileType::Binary)
                .map_err(|e| ftp_error("failed to set binary mode", e))?;
            Ok::<_, Error>(ftp)
        })
        .await
        .map_err(|e| ftp_error("ftp task failed", e))??;

        Ok(Box::new(FtpSession {
            stream: Some(stream),
        }))
    }
}

/// One logged-in FTP control connection
pub struct FtpSession {
    stream: Option<FtpStream>,
}

impl FtpSession {
    /// Run a blocking operation on the stream, handing it back afterwards
    async fn with_stream<T, F>(&mut self, op: F) -> Result<T>
    where
        F: FnOnce(&mut FtpStream) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let mut stream = self
            .stream
            .take()
            .ok_or_else(|| Error::FileStore("session already closed".into()))?;

        let (stream, result) = tokio::task::spawn_blocking(move || {
            let result = op(&mut stream);
            (stream, result)
        })
        .await
        .map_err(|e| ftp_error("ftp task failed", e))?;

        self.stream = Some(stream);
        result
    }
}

#[async_trait]
impl StoreSession for FtpSession {
    async fn make_dir(&mut self, dir: &str) -> Result<()> {
        let dir = dir.to_string();
        self.with_stream(move |ftp| {
            ftp.mkdir(&dir)
                .map_err(|e| ftp_error(&format!("mkdir '{dir}' failed"), e))
        })
        .await
    }

    async fn put(&mut self, path: &str, bytes: Vec<u8>) -> Result<()> {
        let path = path.to_string();
        self.with_stream(move |ftp| {
            let mut reader = Cursor::new(bytes);
            ftp.put_file(&path, &mut reader)
                .map_err(|e| ftp_error(&format!("upload of '{path}' failed"), e))?;
            Ok(())
        })
        .await
    }

    async fn quit(&mut self) -> Result<()> {
        if self.stream.is_none() {
            return Ok(());
        }
        let result = self
            .with_stream(|ftp| ftp.quit().map_err(|e| ftp_error("quit failed", e)))
            .await;
        self.stream = None;
        result
    }
}
