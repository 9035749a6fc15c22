//! One poll cycle: connect, list, select, download, transform, deliver, clean up
//!
//! A [`Pipeline`] is built once per activation from an immutable, normalized
//! [`Config`]. Each call to [`Pipeline::run_tick`] opens a fresh client,
//! processes every selected file in listing order and always disconnects.
//!
//! Ticks are serialized by a tick guard: a tick fired while the previous one
//! is still running is skipped, so two ticks never touch the same remote
//! directory at once. The transport hands every pipeline it builds the same
//! guard ([`Pipeline::with_tick_guard`]), so a tick left running by a stopped
//! activation also blocks the ticks of the next one.

use crate::client::{Connector, ProtocolClient};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::selector::FileSelector;
use crate::sink::Sink;
use crate::transform::skip_lines;
use crate::types::{Event, RemoteFileRef, TickOutcome, TickReport};
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, warn};

/// Per-activation tick runner
pub struct Pipeline {
    config: Arc<Config>,
    connector: Arc<dyn Connector>,
    sink: Arc<dyn Sink>,
    selector: FileSelector,
    /// Held for the duration of a tick
    guard: Arc<Mutex<()>>,
    event_tx: broadcast::Sender<Event>,
}

impl Pipeline {
    /// Create a pipeline, normalizing the configured directories and file name
    ///
    /// # Errors
    /// Returns [`Error::Config`] if the file name pattern is not a valid glob.
    pub fn new(
        config: Arc<Config>,
        connector: Arc<dyn Connector>,
        sink: Arc<dyn Sink>,
        event_tx: broadcast::Sender<Event>,
    ) -> Result<Self> {
        let config = Arc::new(Config::clone(&config).normalized());
        let selector = FileSelector::new(&config.file_name)?;
        Ok(Self {
            config,
            connector,
            sink,
            selector,
            guard: Arc::new(Mutex::new(())),
            event_tx,
        })
    }

    /// Serialize ticks with every other pipeline holding `guard`
    pub fn with_tick_guard(mut self, guard: Arc<Mutex<()>>) -> Self {
        self.guard = guard;
        self
    }

    /// Configuration this pipeline runs with
    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    fn emit_event(&self, event: Event) {
        // No receivers is fine, the event is just dropped
        self.event_tx.send(event).ok();
    }

    /// Run one poll cycle
    ///
    /// Returns [`TickOutcome::Skipped`] without touching the server when
    /// another tick is still in progress.
    ///
    /// # Errors
    /// Any error that escapes a tick is fatal to it; see
    /// [`Error::class`](crate::Error::class) for how the transport reacts.
    pub async fn run_tick(&self) -> Result<TickOutcome> {
        let Ok(_running) = self.guard.try_lock() else {
            warn!(server = %self.config.address(), "Previous tick still running, skipping this one");
            self.emit_event(Event::TickSkipped);
            return Ok(TickOutcome::Skipped);
        };

        self.emit_event(Event::TickStarted);

        let mut client = self.connector.client(&self.config);
        let result = match client.connect().await {
            Ok(()) => self.run_session(client.as_mut()).await,
            Err(e) => Err(e),
        };

        // Disconnect errors must not mask the tick's own failure
        if let Err(e) = client.disconnect().await {
            warn!(server = %client.server(), error = %e, "Disconnect failed");
        }

        let report = result?;
        if !report.retrieved.is_empty() {
            info!(
                server = %client.server(),
                files = report.retrieved.len(),
                bytes = report.bytes_delivered,
                "Tick delivered files"
            );
        }
        self.emit_event(Event::TickCompleted {
            retrieved: report.retrieved.clone(),
        });
        Ok(TickOutcome::Completed(report))
    }

    async fn run_session(&self, client: &mut dyn ProtocolClient) -> Result<TickReport> {
        let mut report = TickReport::default();

        let listing = client.list(&self.config.server_folder).await?;
        let selected = self.selector.select(listing);
        if selected.is_empty() {
            debug!(
                server = %client.server(),
                dir = %self.config.server_folder,
                selector = %self.selector,
                "No matching files"
            );
            return Ok(report);
        }

        tokio::fs::create_dir_all(&self.config.local_folder)
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create local folder '{}': {}",
                        self.config.local_folder.display(),
                        e
                    ),
                ))
            })?;

        for file in selected {
            self.deliver(client, &file, &mut report).await?;
        }

        Ok(report)
    }

    /// Fetch, transform, hand to the sink and clean up one file
    async fn deliver(
        &self,
        client: &mut dyn ProtocolClient,
        file: &RemoteFileRef,
        report: &mut TickReport,
    ) -> Result<()> {
        let limit = self.config.max_payload_bytes;
        let remote_dir = self.config.server_folder.as_str();
        let local_dir = self.config.local_folder.as_path();
        let local_path = local_dir.join(&file.name);

        if let Some(size) = file.size.filter(|size| *size > limit) {
            return Err(Error::PayloadTooLarge {
                file: file.name.clone(),
                size,
                limit,
            });
        }

        let Some(written) = client.fetch(remote_dir, &file.name, local_dir).await? else {
            debug!(file = %file.name, "File disappeared before download");
            return Ok(());
        };

        if written > limit {
            tokio::fs::remove_file(&local_path).await.ok();
            return Err(Error::PayloadTooLarge {
                file: file.name.clone(),
                size: written,
                limit,
            });
        }

        let data = match tokio::fs::read(&local_path).await {
            Ok(data) => data,
            Err(e) => {
                tokio::fs::remove_file(&local_path).await.ok();
                return Err(Error::Io(std::io::Error::new(
                    e.kind(),
                    format!("Failed to read '{}': {}", local_path.display(), e),
                )));
            }
        };

        let skip = self.config.number_of_lines_to_skip;
        let stripped = skip_lines(data, skip);
        if stripped.under_supplied(skip) {
            warn!(
                file = %file.name,
                requested = skip,
                "File has fewer lines than numberOfLinesToSkip, delivering it unchanged"
            );
        }

        let bytes = stripped.payload.len() as u64;
        self.sink.receive(stripped.payload, &file.name);
        debug!(file = %file.name, bytes, "Delivered file to sink");

        report.retrieved.push(file.name.clone());
        report.bytes_delivered += bytes;
        self.emit_event(Event::FileDelivered {
            name: file.name.clone(),
            bytes,
        });

        if let Err(e) = client.delete(remote_dir, &file.name).await {
            warn!(file = %file.name, error = %e, "Failed to delete remote file after delivery");
            report.cleanup_failures += 1;
        }

        if let Err(e) = tokio::fs::remove_file(&local_path).await {
            let e = Error::Cleanup {
                path: local_path.clone(),
                reason: e.to_string(),
            };
            warn!(error = %e, "Failed to delete local copy after delivery");
            report.cleanup_failures += 1;
        }

        Ok(())
    }
}
