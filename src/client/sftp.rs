//! SFTP client over `russh` and `russh-sftp`

use super::{ProtocolClient, with_timeout, write_local};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::types::RemoteFileRef;
use crate::utils::remote_path;
use async_trait::async_trait;
use russh::client::{self, Handle};
use russh_keys::key::PublicKey;
use russh_sftp::client::SftpSession;
use russh_sftp::client::error::Error as SftpError;
use russh_sftp::protocol::StatusCode;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Host key verification for one connection
pub(crate) struct HostKeyPolicy {
    host: String,
    port: u16,
    strict: bool,
    known_hosts: Option<PathBuf>,
}

impl HostKeyPolicy {
    fn from_config(config: &Config) -> Self {
        Self {
            host: config.server.clone(),
            port: config.port(),
            strict: config.strict_host_key_checking,
            known_hosts: config.known_hosts_path.clone(),
        }
    }
}

/// Decide whether to trust a server key given the known_hosts lookup result
///
/// A changed key is always refused. An unknown host is only accepted when
/// strict checking is off.
fn accept_host_key(strict: bool, lookup: std::result::Result<bool, String>) -> bool {
    match lookup {
        Ok(true) => true,
        Ok(false) => !strict,
        Err(_) => false,
    }
}

#[async_trait]
impl client::Handler for HostKeyPolicy {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        let lookup = match &self.known_hosts {
            Some(path) => {
                russh_keys::check_known_hosts_path(&self.host, self.port, server_public_key, path)
            }
            None => russh_keys::check_known_hosts(&self.host, self.port, server_public_key),
        }
        .map_err(|e| e.to_string());

        if let Err(reason) = &lookup {
            warn!(host = %self.host, port = self.port, reason = %reason, "Host key verification failed");
        } else if lookup == Ok(false) && !self.strict {
            warn!(host = %self.host, port = self.port, "Accepting unknown host key (strict checking disabled)");
        }

        Ok(accept_host_key(self.strict, lookup))
    }
}

/// SFTP implementation of [`ProtocolClient`]
pub struct SftpClient {
    config: Arc<Config>,
    server: String,
    session: Option<(Handle<HostKeyPolicy>, SftpSession)>,
}

impl SftpClient {
    /// Create an unconnected client
    pub fn new(config: Arc<Config>) -> Self {
        let server = config.address();
        Self {
            config,
            server,
            session: None,
        }
    }

    fn sftp(&self, operation: &'static str) -> Result<&SftpSession> {
        self.session
            .as_ref()
            .map(|(_, sftp)| sftp)
            .ok_or_else(|| Error::Protocol {
                server: self.server.clone(),
                operation,
                reason: "not connected".to_string(),
            })
    }

    fn protocol_error(&self, operation: &'static str, error: SftpError) -> Error {
        Error::Protocol {
            server: self.server.clone(),
            operation,
            reason: error.to_string(),
        }
    }

    fn connection_error(&self, reason: impl std::fmt::Display) -> Error {
        Error::Connection {
            server: self.server.clone(),
            reason: reason.to_string(),
        }
    }

    /// Open the SSH session, authenticate and start the sftp subsystem
    async fn open_session(&self) -> Result<(Handle<HostKeyPolicy>, SftpSession)> {
        let ssh_config = Arc::new(client::Config {
            inactivity_timeout: Some(self.config.operation_timeout),
            ..Default::default()
        });
        let handler = HostKeyPolicy::from_config(&self.config);

        let mut handle = client::connect(
            ssh_config,
            (self.config.server.as_str(), self.config.port()),
            handler,
        )
        .await
        .map_err(|e| self.connection_error(e))?;

        if !self.authenticate(&mut handle).await? {
            handle
                .disconnect(russh::Disconnect::ByApplication, "", "English")
                .await
                .ok();
            return Err(self.connection_error(format!(
                "authentication rejected for user '{}'",
                self.config.user
            )));
        }

        let channel = handle
            .channel_open_session()
            .await
            .map_err(|e| self.connection_error(e))?;
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| self.connection_error(e))?;
        let sftp = SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| self.connection_error(e))?;

        Ok((handle, sftp))
    }

    /// Key first when one is configured, then password
    async fn authenticate(&self, handle: &mut Handle<HostKeyPolicy>) -> Result<bool> {
        let user = self.config.user.as_str();

        if let Some(key_path) = self.config.private_key() {
            let key = russh_keys::load_secret_key(
                key_path,
                self.config.private_key_passphrase.as_deref(),
            )
            .map_err(|e| {
                self.connection_error(format!(
                    "cannot load private key '{}': {}",
                    key_path.display(),
                    e
                ))
            })?;

            let accepted = handle
                .authenticate_publickey(user, Arc::new(key))
                .await
                .map_err(|e| self.connection_error(e))?;
            if accepted {
                return Ok(true);
            }
            debug!(server = %self.server, user = %user, "Public key rejected");
        }

        if self.config.password.is_empty() {
            return Ok(false);
        }

        handle
            .authenticate_password(user, &self.config.password)
            .await
            .map_err(|e| self.connection_error(e))
    }
}

/// SFTP status that means the path does not exist
fn is_no_such_file(error: &SftpError) -> bool {
    matches!(error, SftpError::Status(status) if status.status_code == StatusCode::NoSuchFile)
}

/// Directory argument for `read_dir`; the login directory is `.`
fn listing_dir(remote_dir: &str) -> &str {
    if remote_dir.is_empty() { "." } else { remote_dir }
}

#[async_trait]
impl ProtocolClient for SftpClient {
    async fn connect(&mut self) -> Result<()> {
        debug!(server = %self.server, user = %self.config.user, "Connecting to SFTP server");

        let session = with_timeout(
            &self.server,
            "connect",
            self.config.connect_timeout,
            self.open_session(),
        )
        .await?;

        self.session = Some(session);
        info!(server = %self.server, "Connected to SFTP server");
        Ok(())
    }

    async fn list(&mut self, remote_dir: &str) -> Result<Vec<RemoteFileRef>> {
        let sftp = self.sftp("list")?;
        let dir = listing_dir(remote_dir).to_string();

        let reply = with_timeout(&self.server, "list", self.config.operation_timeout, async {
            Ok(sftp.read_dir(dir).await)
        })
        .await?;

        match reply {
            Ok(entries) => Ok(entries
                .map(|entry| {
                    let metadata = entry.metadata();
                    RemoteFileRef {
                        name: entry.file_name(),
                        size: metadata.size,
                        is_dir: metadata.is_dir(),
                    }
                })
                .filter(|file| file.name != "." && file.name != "..")
                .collect()),
            Err(e) if is_no_such_file(&e) => {
                debug!(server = %self.server, dir = %remote_dir, "Remote directory not found");
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
        let sftp = self.sftp("fetch")?;
        let path = remote_path(remote_dir, name);

        let reply = with_timeout(&self.server, "fetch", self.config.operation_timeout, async {
            Ok(sftp.read(path).await)
        })
        .await?;

        match reply {
            Ok(bytes) => write_local(local_dir, name, &bytes).await.map(Some),
            Err(e) if is_no_such_file(&e) => Ok(None),
            Err(e) => Err(self.protocol_error("fetch", e)),
        }
    }

    async fn delete(&mut self, remote_dir: &str, name: &str) -> Result<()> {
        let sftp = self.sftp("delete")?;
        let path = remote_path(remote_dir, name);

        let reply = with_timeout(&self.server, "delete", self.config.operation_timeout, async {
            Ok(sftp.remove_file(path.clone()).await)
        })
        .await?;

        match reply {
            Ok(()) => Ok(()),
            Err(e) if is_no_such_file(&e) => Err(Error::RemoteNotFound {
                server: self.server.clone(),
                path,
            }),
            Err(e) => Err(self.protocol_error("delete", e)),
        }
    }

    async fn disconnect(&mut self) -> Result<()> {
        let Some((handle, sftp)) = self.session.take() else {
            return Ok(());
        };

        if let Err(e) = sftp.close().await {
            debug!(server = %self.server, error = %e, "Closing sftp channel failed");
        }
        handle
            .disconnect(russh::Disconnect::ByApplication, "", "English")
            .await
            .map_err(|e| Error::Protocol {
                server: self.server.clone(),
                operation: "disconnect",
                reason: e.to_string(),
            })?;

        debug!(server = %self.server, "Disconnected from SFTP server");
        Ok(())
    }

    fn server(&self) -> &str {
        &self.server
    }
}
