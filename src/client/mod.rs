//! Remote file server clients
//!
//! The pipeline talks to the server through [`ProtocolClient`], which has one
//! implementation per supported protocol:
//! - [`FtpClient`] drives a blocking `suppaftp` session from `spawn_blocking`
//! - [`SftpClient`] uses `russh` and `russh-sftp` natively
//!
//! A [`Connector`] picks the implementation once per tick from the configured
//! [`ProtocolKind`](crate::config::ProtocolKind).

use crate::config::{Config, ProtocolKind};
use crate::error::{Error, Result};
use crate::types::RemoteFileRef;
use async_trait::async_trait;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

mod ftp;
mod sftp;

pub use ftp::FtpClient;
pub use sftp::SftpClient;

/// Connection to a remote file server
///
/// Every method is awaited sequentially by a single tick. `list` and `fetch`
/// report a missing directory or file as an empty result rather than an error.
#[async_trait]
pub trait ProtocolClient: Send {
    /// Open and authenticate the session
    ///
    /// # Errors
    /// Returns [`Error::Connection`] if the handshake or authentication fails.
    async fn connect(&mut self) -> Result<()>;

    /// List the files of a remote directory (empty string = login directory)
    async fn list(&mut self, remote_dir: &str) -> Result<Vec<RemoteFileRef>>;

    /// Download `remote_dir/name` into `local_dir/name`
    ///
    /// Returns the number of bytes written, or `None` if the file does not exist.
    async fn fetch(&mut self, remote_dir: &str, name: &str, local_dir: &Path)
    -> Result<Option<u64>>;

    /// Remove `remote_dir/name` from the server
    async fn delete(&mut self, remote_dir: &str, name: &str) -> Result<()>;

    /// Close the session; safe to call when not connected
    async fn disconnect(&mut self) -> Result<()>;

    /// `host:port` label of the server, for logs and error context
    fn server(&self) -> &str;
}

/// Creates a client for a configuration
pub trait Connector: Send + Sync {
    /// Build an unconnected client for `config`
    fn client(&self, config: &Arc<Config>) -> Box<dyn ProtocolClient>;
}

/// Default connector selecting FTP or SFTP from `serverType`
#[derive(Clone, Copy, Debug, Default)]
pub struct ProtocolConnector;

impl Connector for ProtocolConnector {
    fn client(&self, config: &Arc<Config>) -> Box<dyn ProtocolClient> {
        match config.protocol {
            ProtocolKind::Ftp => Box::new(FtpClient::new(config.clone())),
            ProtocolKind::Sftp => Box::new(SftpClient::new(config.clone())),
        }
    }
}

/// Run `fut` with a deadline, mapping expiry to [`Error::Timeout`]
pub(crate) async fn with_timeout<T, F>(
    server: &str,
    operation: &'static str,
    after: Duration,
    fut: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout {
            server: server.to_string(),
            operation,
            after,
        }),
    }
}

/// Write a downloaded file into the local directory, returning its size
pub(crate) async fn write_local(local_dir: &Path, name: &str, bytes: &[u8]) -> Result<u64> {
    let path = local_dir.join(name);
    tokio::fs::write(&path, bytes).await.map_err(|e| {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to write '{}': {}", path.display(), e),
        ))
    })?;
    Ok(bytes.len() as u64)
}
