//! Core types for ftp-inbound

use serde::{Deserialize, Serialize};

/// Lifecycle state of an inbound transport
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    /// Not running (initial and terminal state)
    #[default]
    Stopped,
    /// Worker is loading configuration
    Starting,
    /// Scheduler is armed and ticks are firing
    Started,
    /// Shutdown in progress
    Stopping,
    /// A fatal failure halted the transport; a manual restart is required
    Error,
}

impl RunState {
    /// Whether `start()` must be ignored in this state
    pub fn is_active(self) -> bool {
        matches!(
            self,
            RunState::Starting | RunState::Started | RunState::Stopping
        )
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunState::Stopped => "STOPPED",
            RunState::Starting => "STARTING",
            RunState::Started => "STARTED",
            RunState::Stopping => "STOPPING",
            RunState::Error => "ERROR",
        };
        write!(f, "{}", s)
    }
}

/// A file entry returned by a remote directory listing
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFileRef {
    /// File name, without directory
    pub name: String,
    /// Size in bytes, when the protocol reports it
    pub size: Option<u64>,
    /// Whether the entry is a directory
    pub is_dir: bool,
}

impl RemoteFileRef {
    /// Create a regular file entry
    pub fn file(name: impl Into<String>, size: Option<u64>) -> Self {
        Self {
            name: name.into(),
            size,
            is_dir: false,
        }
    }
}

/// Summary of one completed tick
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickReport {
    /// Names of the files that were downloaded and delivered, in order
    pub retrieved: Vec<String>,
    /// Total payload bytes handed to the sink
    pub bytes_delivered: u64,
    /// Cleanup steps that failed and were only logged
    pub cleanup_failures: usize,
}

/// Result of asking the pipeline to run a tick
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// The tick ran to completion
    Completed(TickReport),
    /// Another tick was still running, so this one was skipped
    Skipped,
}

/// Events emitted by the transport
///
/// Subscribe with [`InboundTransport::subscribe`](crate::InboundTransport::subscribe).
/// Events are informational; nothing in the transport waits on them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// The run state changed
    StateChanged {
        /// Previous state
        from: RunState,
        /// New state
        to: RunState,
    },

    /// A scheduled tick began
    TickStarted,

    /// A scheduled tick was skipped because the previous one is still running
    TickSkipped,

    /// One file was delivered to the sink
    FileDelivered {
        /// Remote file name
        name: String,
        /// Bytes handed to the sink after line stripping
        bytes: u64,
    },

    /// A tick finished
    TickCompleted {
        /// Files delivered during the tick
        retrieved: Vec<String>,
    },

    /// A fatal error halted the transport
    TickFailed {
        /// Machine-readable error code
        code: String,
        /// Human-readable error message
        message: String,
    },
}
