//! FTP remote source
//!
//! `suppaftp`'s blocking client driven from `spawn_blocking`, one session per poll tick.
//! Sessions use Extended Passive Mode (EPSV) for NAT/container friendliness and binary
//! transfers. No timeouts are set on the control or data channel: a server that stops
//! responding stalls the tick that is talking to it.
//!
//! ```rust,ignore
//! use ferry_ingest::config::FtpConfig;
//! use ferry_ingest::remote::{FtpSource, RemoteSource};
//!
//! let source = FtpSource::new(FtpConfig::default());
//! let mut session = source.connect().await?;
//! let names = session.list().await?;
//! session.close().await;
//! ```

use async_trait::async_trait;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use suppaftp::FtpStream;
use tracing::{debug, info, warn};

use super::{RemoteError, RemoteSession, RemoteSource};
use crate::config::FtpConfig;

/// Opens FTP sessions against one configured server
#[derive(Debug, Clone)]
pub struct FtpSource {
    config: FtpConfig,
}

impl FtpSource {
    pub fn new(config: FtpConfig) -> Self {
        Self { config }
    }

    fn connect_sync(config: &FtpConfig) -> Result<FtpStream, RemoteError> {
        let address = config.address();
        debug!(address = %address, "Connecting to FTP server");

        let mut stream = FtpStream::connect(&address).map_err(|e| RemoteError::Connect {
            address: address.clone(),
            reason: e.to_string(),
        })?;

        stream.set_mode(suppaftp::Mode::ExtendedPassive);

        debug!(username = %config.username, "Logging in");
        if let Err(e) = stream.login(&config.username, &config.password) {
            quit_quietly(&mut stream);
            return Err(RemoteError::Auth {
                username: config.username.clone(),
                reason: e.to_string(),
            });
        }

        let prepared = stream
            .transfer_type(suppaftp::types::FileType::Binary)
            .and_then(|_| stream.cwd(&config.remote_dir));
        if let Err(e) = prepared {
            quit_quietly(&mut stream);
            return Err(RemoteError::Connect {
                address,
                reason: format!("session setup failed: {e}"),
            });
        }

        Ok(stream)
    }
}

#[async_trait]
impl RemoteSource for FtpSource {
    async fn connect(&self) -> Result<Box<dyn RemoteSession>, RemoteError> {
        let config = self.config.clone();
        let stream = tokio::task::spawn_blocking(move || Self::connect_sync(&config))
            .await
            .map_err(|e| RemoteError::Task(format!("FTP connect task panicked: {e}")))??;

        info!(source = %self.describe(), "FTP session opened");
        Ok(Box::new(FtpSession {
            stream: Some(stream),
        }))
    }

    fn describe(&self) -> String {
        format!(
            "ftp://{}@{}:{}{}",
            self.config.username, self.config.host, self.config.port, self.config.remote_dir
        )
    }
}

/// One logged-in FTP control connection.
///
/// The stream is moved into each blocking task and handed back when it finishes; `None`
/// means the session was closed or a task died holding it.
pub struct FtpSession {
    stream: Option<FtpStream>,
}

impl FtpSession {
    async fn with_stream<T, F>(&mut self, op: F) -> Result<T, RemoteError>
    where
        T: Send + 'static,
        F: FnOnce(&mut FtpStream) -> Result<T, RemoteError> + Send + 'static,
    {
        let mut stream = self.stream.take().ok_or(RemoteError::Closed)?;
        let (stream, result) = tokio::task::spawn_blocking(move || {
            let result = op(&mut stream);
            (stream, result)
        })
        .await
        .map_err(|e| RemoteError::Task(format!("FTP task panicked: {e}")))?;
        self.stream = Some(stream);
        result
    }
}

#[async_trait]
impl RemoteSession for FtpSession {
    async fn list(&mut self) -> Result<Vec<String>, RemoteError> {
        let names = self
            .with_stream(|stream| {
                stream
                    .nlst(None)
                    .map_err(|e| RemoteError::List(e.to_string()))
            })
            .await?;
        debug!(entries = names.len(), "Listed remote directory");
        Ok(names)
    }

    async fn fetch(&mut self, name: &str, dest: &Path) -> Result<u64, RemoteError> {
        let name = name.to_string();
        let dest = dest.to_path_buf();
        self.with_stream(move |stream| retr_to_file(stream, &name, &dest))
            .await
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = tokio::task::spawn_blocking(move || quit_quietly(&mut stream)).await;
            debug!("FTP session closed");
        }
    }
}

fn retr_to_file(stream: &mut FtpStream, name: &str, dest: &Path) -> Result<u64, RemoteError> {
    let local_err = |source: io::Error| RemoteError::LocalWrite {
        path: dest.display().to_string(),
        source,
    };
    let fetch_err = |reason: String| RemoteError::Fetch {
        name: name.to_string(),
        reason,
    };

    // Opened before RETR: once the data channel is open, every exit has to go through
    // finalize_retr_stream or the control connection falls out of step.
    let file = File::create(dest).map_err(local_err)?;
    let mut writer = BufWriter::new(file);

    let mut data = stream
        .retr_as_stream(name)
        .map_err(|e| fetch_err(e.to_string()))?;

    let copied = io::copy(&mut data, &mut writer);

    let finalized = stream.finalize_retr_stream(data);

    let bytes = copied.map_err(|e| fetch_err(format!("transfer interrupted: {e}")))?;
    finalized.map_err(|e| fetch_err(e.to_string()))?;
    writer
        .flush()
        .and_then(|_| writer.get_ref().sync_all())
        .map_err(local_err)?;

    debug!(file = %name, bytes, "Downloaded remote file");
    Ok(bytes)
}

fn quit_quietly(stream: &mut FtpStream) {
    if let Err(e) = stream.quit() {
        warn!(error = %e, "Failed to quit FTP session gracefully");
    }
}
