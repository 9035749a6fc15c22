//! FTP client built on a blocking `suppaftp` session

use super::{ProtocolClient, with_timeout, write_local};
use crate::config::{Config, EMPTY_PASSWORD_PLACEHOLDER};
use crate::error::{Error, Result};
use crate::types::RemoteFileRef;
use crate::utils::{base_name, remote_path};
use async_trait::async_trait;
use std::io::Read;
use std::net::ToSocketAddrs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use suppaftp::types::{FileType, FormatControl};
use suppaftp::{FtpError, FtpResult, FtpStream, Mode, Status};
use tracing::{debug, info};

/// FTP implementation of [`ProtocolClient`]
///
/// The blocking control connection is moved into `spawn_blocking` for each
/// command and handed back afterwards, so the async tick never blocks a
/// runtime worker. A command that times out takes the connection with it and
/// leaves the client disconnected.
pub struct FtpClient {
    config: Arc<Config>,
    server: String,
    stream: Option<FtpStream>,
}

impl FtpClient {
    /// Create an unconnected client
    pub fn new(config: Arc<Config>) -> Self {
        let server = config.address();
        Self {
            config,
            server,
            stream: None,
        }
    }

    /// Run one blocking command against the control connection
    ///
    /// The outer `Result` carries timeouts and task failures, the inner one the
    /// FTP reply so callers can tell "file not found" apart from real errors.
    async fn command<T, F>(&mut self, operation: &'static str, op: F) -> Result<FtpResult<T>>
    where
        T: Send + 'static,
        F: FnOnce(&mut FtpStream) -> FtpResult<T> + Send + 'static,
    {
        let mut stream = self.stream.take().ok_or_else(|| Error::Protocol {
            server: self.server.clone(),
            operation,
            reason: "not connected".to_string(),
        })?;

        let task = tokio::task::spawn_blocking(move || {
            let result = op(&mut stream);
            (stream, result)
        });

        let (stream, result) = with_timeout(
            &self.server,
            operation,
            self.config.operation_timeout,
            async {
                task.await
                    .map_err(|e| Error::Other(format!("ftp {} task failed: {}", operation, e)))
            },
        )
        .await?;

        self.stream = Some(stream);
        Ok(result)
    }

    fn protocol_error(&self, operation: &'static str, error: FtpError) -> Error {
        Error::Protocol {
            server: self.server.clone(),
            operation,
            reason: error.to_string(),
        }
    }
}

/// Replies that mean the requested path does not exist
fn is_not_found(error: &FtpError) -> bool {
    match error {
        FtpError::UnexpectedResponse(response) => matches!(
            response.status,
            Status::FileUnavailable | Status::RequestFileActionIgnored
        ),
        _ => false,
    }
}

/// Result of a download capped at `maxPayloadBytes`
enum Download {
    Complete(Vec<u8>),
    TooLarge(u64),
}

/// Download `path`, giving up once more than `limit` bytes arrive (blocking)
///
/// A size reported by `SIZE` is checked before the transfer starts. Servers
/// without `SIZE` are bounded while streaming instead.
fn retrieve_bounded(stream: &mut FtpStream, path: &str, limit: u64) -> FtpResult<Download> {
    if let Ok(size) = stream.size(path)
        && size as u64 > limit
    {
        return Ok(Download::TooLarge(size as u64));
    }

    let mut data = stream.retr_as_stream(path)?;
    let mut bytes = Vec::new();
    let read = (&mut data)
        .take(limit.saturating_add(1))
        .read_to_end(&mut bytes);
    let finished = stream.finalize_retr_stream(data);
    read.map_err(FtpError::ConnectionError)?;

    if bytes.len() as u64 > limit {
        // The server may answer the early close with 426; the file is refused either way
        return Ok(Download::TooLarge(bytes.len() as u64));
    }
    finished?;
    Ok(Download::Complete(bytes))
}

/// Resolve, connect, log in and configure a session (blocking)
fn open_session(
    server: &str,
    host: &str,
    port: u16,
    user: &str,
    password: &str,
    file_type: FileType,
    connect_timeout: Duration,
) -> Result<FtpStream> {
    let addr = (host, port)
        .to_socket_addrs()
        .map_err(|e| Error::Connection {
            server: server.to_string(),
            reason: format!("cannot resolve host: {}", e),
        })?
        .next()
        .ok_or_else(|| Error::Connection {
            server: server.to_string(),
            reason: "host resolved to no address".to_string(),
        })?;

    let mut stream =
        FtpStream::connect_timeout(addr, connect_timeout).map_err(|e| Error::Connection {
            server: server.to_string(),
            reason: e.to_string(),
        })?;

    if let Err(e) = stream.login(user, password) {
        // Best effort: the server already refused us
        stream.quit().ok();
        return Err(Error::Connection {
            server: server.to_string(),
            reason: format!("login rejected: {}", e),
        });
    }

    stream.set_mode(Mode::Passive);
    stream
        .transfer_type(file_type)
        .map_err(|e| Error::Connection {
            server: server.to_string(),
            reason: format!("cannot set transfer type: {}", e),
        })?;

    Ok(stream)
}

#[async_trait]
impl ProtocolClient for FtpClient {
    async fn connect(&mut self) -> Result<()> {
        let server = self.server.clone();
        let host = self.config.server.clone();
        let port = self.config.port();
        let user = self.config.user.clone();
        let password = if self.config.password.is_empty() {
            EMPTY_PASSWORD_PLACEHOLDER.to_string()
        } else {
            self.config.password.clone()
        };
        let file_type = if self.config.binary_transfer {
            FileType::Binary
        } else {
            FileType::Ascii(FormatControl::Default)
        };
        let connect_timeout = self.config.connect_timeout;

        debug!(server = %server, user = %user, "Connecting to FTP server");

        let task_server = server.clone();
        let task = tokio::task::spawn_blocking(move || {
            open_session(
                &task_server,
                &host,
                port,
                &user,
                &password,
                file_type,
                connect_timeout,
            )
        });

        let stream = with_timeout(&server, "connect", connect_timeout, async {
            task.await
                .map_err(|e| Error::Other(format!("ftp connect task failed: {}", e)))?
        })
        .await?;

        self.stream = Some(stream);
        info!(server = %server, "Connected to FTP server");
        Ok(())
    }

    async fn list(&mut self, remote_dir: &str) -> Result<Vec<RemoteFileRef>> {
        let dir = remote_dir.to_string();
        let reply = self
            .command("list", move |stream| {
                stream.nlst(if dir.is_empty() { None } else { Some(dir.as_str()) })
            })
            .await?;

        match reply {
            Ok(names) => Ok(names
                .iter()
                .map(|name| base_name(name.trim_end()))
                .filter(|name| !name.is_empty() && *name != "." && *name != "..")
                .map(|name| RemoteFileRef::file(name, None))
                .collect()),
            Err(e) if is_not_found(&e) => {
                debug!(server = %self.server, dir = %remote_dir, "Remote directory not found or empty");
                Ok(Vec::new())
            }
            Err(e) => Err(self.protocol_error("list", e)),
        }
    }

    async fn fetch(
        &mut self,
        remote_dir: &str,
        name: &str,
        local_dir: &Path,
    ) -> Result<Option<u64>> {
        let path = remote_path(remote_dir, name);
        let limit = self.config.max_payload_bytes;
        let reply = self
            .command("fetch", move |stream| retrieve_bounded(stream, &path, limit))
            .await?;

        match reply {
            Ok(Download::Complete(bytes)) => write_local(local_dir, name, &bytes).await.map(Some),
            Ok(Download::TooLarge(size)) => Err(Error::PayloadTooLarge {
                file: name.to_string(),
                size,
                limit,
            }),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(self.protocol_error("fetch", e)),
        }
    }

    async fn delete(&mut self, remote_dir: &str, name: &str) -> Result<()> {
        let path = remote_path(remote_dir, name);
        let target = path.clone();
        let reply = self.command("delete", move |stream| stream.rm(&target)).await?;

        match reply {
            Ok(()) => Ok(()),
            Err(e) if is_not_found(&e) => Err(Error::RemoteNotFound {
                server: self.server.clone(),
                path,
            }),
            Err(e) => Err(self.protocol_error("delete", e)),
        }
    }

    async fn disconnect(&mut self) -> Result<()> {
        if self.stream.is_none() {
            return Ok(());
        }

        let reply = self.command("disconnect", |stream| stream.quit()).await;
        // The session is finished whatever QUIT answered
        self.stream = None;

        match reply? {
            Ok(()) => {
                debug!(server = %self.server, "Disconnected from FTP server");
                Ok(())
            }
            Err(e) => Err(self.protocol_error("disconnect", e)),
        }
    }

    fn server(&self) -> &str {
        &self.server
    }
}
