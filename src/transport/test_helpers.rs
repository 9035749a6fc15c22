//! Shared test doubles: an in-memory file server and a recording sink.

use crate::client::{Connector, ProtocolClient, write_local};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::sink::Sink;
use crate::types::RemoteFileRef;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Remote files keyed by full path (`in/file1.txt`) plus call counters
#[derive(Default)]
pub(crate) struct MemoryServer {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    pub(crate) reject_login: AtomicBool,
    pub(crate) fail_deletes: AtomicBool,
    /// Number of upcoming fetches that abort mid-transfer
    pub(crate) fail_fetches: AtomicUsize,
    /// Report downloads as done without writing the local copy
    pub(crate) skip_local_write: AtomicBool,
    fetch_delay: Mutex<Duration>,
    pub(crate) connects: AtomicUsize,
    pub(crate) disconnects: AtomicUsize,
    pub(crate) fetches: AtomicUsize,
    active: AtomicUsize,
    pub(crate) max_active: AtomicUsize,
}

impl MemoryServer {
    pub(crate) fn with_files(files: &[(&str, &[u8])]) -> Arc<Self> {
        let server = Self::default();
        {
            let mut map = server.files.lock().unwrap();
            for (path, content) in files {
                map.insert(path.to_string(), content.to_vec());
            }
        }
        Arc::new(server)
    }

    pub(crate) fn remote_paths(&self) -> Vec<String> {
        self.files.lock().unwrap().keys().cloned().collect()
    }

    pub(crate) fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap() = delay;
    }

    pub(crate) fn connector(self: &Arc<Self>) -> Arc<MemoryConnector> {
        Arc::new(MemoryConnector {
            server: self.clone(),
        })
    }
}

pub(crate) struct MemoryConnector {
    server: Arc<MemoryServer>,
}

impl Connector for MemoryConnector {
    fn client(&self, config: &Arc<Config>) -> Box<dyn ProtocolClient> {
        Box::new(MemoryClient {
            server: self.server.clone(),
            label: config.address(),
            connected: false,
        })
    }
}

struct MemoryClient {
    server: Arc<MemoryServer>,
    label: String,
    connected: bool,
}

impl MemoryClient {
    fn ensure_connected(&self, operation: &'static str) -> Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(Error::Protocol {
                server: self.label.clone(),
                operation,
                reason: "not connected".into(),
            })
        }
    }
}

#[async_trait]
impl ProtocolClient for MemoryClient {
    async fn connect(&mut self) -> Result<()> {
        self.server.connects.fetch_add(1, Ordering::SeqCst);
        if self.server.reject_login.load(Ordering::SeqCst) {
            return Err(Error::Connection {
                server: self.label.clone(),
                reason: "login rejected: 530 Login incorrect".into(),
            });
        }
        let active = self.server.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.server.max_active.fetch_max(active, Ordering::SeqCst);
        self.connected = true;
        Ok(())
    }

    async fn list(&mut self, remote_dir: &str) -> Result<Vec<RemoteFileRef>> {
        self.ensure_connected("list")?;
        let files = self.server.files.lock().unwrap();
        Ok(files
            .iter()
            .filter_map(|(path, content)| {
                let name = path.strip_prefix(remote_dir)?;
                (!name.contains('/')).then(|| RemoteFileRef::file(name, Some(content.len() as u64)))
            })
            .collect())
    }

    async fn fetch(
        &mut self,
        remote_dir: &str,
        name: &str,
        local_dir: &Path,
    ) -> Result<Option<u64>> {
        self.ensure_connected("fetch")?;
        self.server.fetches.fetch_add(1, Ordering::SeqCst);
        let abort = self
            .server
            .fail_fetches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();

        let delay = *self.server.fetch_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if abort {
            return Err(Error::Protocol {
                server: self.label.clone(),
                operation: "fetch",
                reason: "426 Connection closed; transfer aborted".into(),
            });
        }

        let content = self
            .server
            .files
            .lock()
            .unwrap()
            .get(&format!("{}{}", remote_dir, name))
            .cloned();
        match content {
            Some(bytes) if self.server.skip_local_write.load(Ordering::SeqCst) => {
                Ok(Some(bytes.len() as u64))
            }
            Some(bytes) => write_local(local_dir, name, &bytes).await.map(Some),
            None => Ok(None),
        }
    }

    async fn delete(&mut self, remote_dir: &str, name: &str) -> Result<()> {
        self.ensure_connected("delete")?;
        let path = format!("{}{}", remote_dir, name);
        if self.server.fail_deletes.load(Ordering::SeqCst) {
            return Err(Error::Protocol {
                server: self.label.clone(),
                operation: "delete",
                reason: "550 Permission denied".into(),
            });
        }
        match self.server.files.lock().unwrap().remove(&path) {
            Some(_) => Ok(()),
            None => Err(Error::RemoteNotFound {
                server: self.label.clone(),
                path,
            }),
        }
    }

    async fn disconnect(&mut self) -> Result<()> {
        if self.connected {
            self.connected = false;
            self.server.active.fetch_sub(1, Ordering::SeqCst);
        }
        self.server.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn server(&self) -> &str {
        &self.label
    }
}

/// Sink that records every delivery
#[derive(Default)]
pub(crate) struct RecordingSink {
    deliveries: Mutex<Vec<(String, Vec<u8>)>>,
}

impl RecordingSink {
    pub(crate) fn deliveries(&self) -> Vec<(String, Vec<u8>)> {
        self.deliveries.lock().unwrap().clone()
    }
}

impl Sink for RecordingSink {
    fn receive(&self, payload: Vec<u8>, context: &str) {
        self.deliveries
            .lock()
            .unwrap()
            .push((context.to_string(), payload));
    }
}

/// Normalized config pointing at `in/` with downloads under `local`
pub(crate) fn test_config(local: &Path, file_name: &str, skip: usize) -> Config {
    let json = serde_json::json!({
        "serverType": "ftp",
        "server": "files.test",
        "user": "ingest",
        "password": "secret",
        "serverFolder": "in",
        "fileName": file_name,
        "localFolder": local,
        "frequency": 1,
        "numberOfLinesToSkip": skip,
    });
    serde_json::from_value::<Config>(json).unwrap().normalized()
}

/// Poll `check` until it holds or two seconds pass
pub(crate) async fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
