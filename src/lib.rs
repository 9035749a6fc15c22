//! # ftp-inbound
//!
//! Polling FTP/SFTP inbound transport for event-processing pipelines.
//!
//! On every tick the transport connects to a remote file server, picks the
//! files matching a configured name or glob, downloads them, strips a number
//! of leading header lines and hands the remaining bytes to a [`Sink`]. Once
//! delivered, both the remote file and the local copy are deleted.
//!
//! ## Features
//!
//! - **FTP and SFTP** - passive-mode FTP via `suppaftp`, SFTP with password or
//!   private key via `russh`
//! - **Exact or glob selection** - `export.csv` or `*.txt`
//! - **Header stripping** - drop the first N lines of every file
//! - **Run state machine** - STOPPED/STARTING/STARTED/STOPPING/ERROR with
//!   re-entrant `start()` ignored
//! - **Event-driven** - subscribe to state changes and deliveries
//!
//! Delivery is at-most-once per tick and best-effort; nothing is persisted
//! across restarts.
//!
//! ## Quick Start
//!
//! ```no_run
//! use ftp_inbound::{ChannelSink, Config, InboundTransport, run_until_signal};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_json_str(r#"{
//!         "serverType": "sftp",
//!         "server": "files.example.com",
//!         "user": "ingest",
//!         "privateKey": "/etc/ingest/id_ed25519",
//!         "serverFolder": "/exports",
//!         "fileName": "*.csv",
//!         "frequency": 60,
//!         "numberOfLinesToSkip": 1
//!     }"#)?;
//!
//!     let (sink, mut deliveries) = ChannelSink::new();
//!     let transport = InboundTransport::new(config, Arc::new(sink));
//!
//!     // Subscribe to events
//!     let mut events = transport.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     tokio::spawn(async move {
//!         while let Some(delivery) = deliveries.recv().await {
//!             println!("{}: {} bytes", delivery.context, delivery.payload.len());
//!         }
//!     });
//!
//!     transport.start();
//!     run_until_signal(&transport).await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// FTP and SFTP clients
pub mod client;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Per-tick poll cycle
pub mod pipeline;
/// Fixed-period tick scheduler
pub mod scheduler;
/// Remote file selection
pub mod selector;
/// Payload consumers
pub mod sink;
/// Header line stripping
pub mod transform;
/// Transport lifecycle and run state
pub mod transport;
/// Core types and events
pub mod types;
/// Path helpers
pub mod utils;

// Re-export commonly used types
pub use client::{Connector, FtpClient, ProtocolClient, ProtocolConnector, SftpClient};
pub use config::{Config, ProtocolKind, ScheduleAnchor};
pub use error::{Error, ErrorClass, Result};
pub use pipeline::Pipeline;
pub use scheduler::{ScheduleHandle, Scheduler};
pub use selector::FileSelector;
pub use sink::{ChannelSink, Delivery, Sink};
pub use transport::InboundTransport;
pub use types::{Event, RemoteFileRef, RunState, TickOutcome, TickReport};

/// Run until a termination signal arrives, then stop the transport.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// A tick already in progress is allowed to finish in the background.
pub async fn run_until_signal(transport: &InboundTransport) {
    wait_for_signal().await;
    transport.stop();
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            sigint.recv().await;
            tracing::info!("Received SIGINT signal (Ctrl+C)");
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            sigterm.recv().await;
            tracing::info!("Received SIGTERM signal");
        }
        (Err(term), Err(int)) => {
            tracing::error!(
                sigterm_error = %term,
                sigint_error = %int,
                "Could not register any signal handlers, using ctrl_c fallback"
            );
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
