//! Inbound transport lifecycle
//!
//! [`InboundTransport`] owns the run state machine and wires the scheduler to
//! the per-tick [`Pipeline`]:
//!
//! ```text
//!            start()                 worker: load config, arm scheduler
//! STOPPED ───────────▶ STARTING ───────────────────────────────▶ STARTED
//!    ▲                    │ load/arm failure                        │ fatal tick
//!    │ stop()             ▼                                         ▼
//!    └──── STOPPING ◀── ERROR ◀─────────────────────────────────────┘
//! ```
//!
//! `start()` is ignored while the transport is STARTING, STARTED or STOPPING.
//! Configuration is read when a worker starts; [`InboundTransport::reconfigure`]
//! only affects the next `start()`.

use crate::client::{Connector, ProtocolConnector};
use crate::config::Config;
use crate::error::{Error, ErrorClass};
use crate::pipeline::Pipeline;
use crate::scheduler::ScheduleHandle;
use crate::sink::Sink;
use crate::types::{Event, RunState, TickOutcome};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;

mod lifecycle;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

/// Polling FTP/SFTP inbound transport
///
/// Cheap to clone; clones share the same state, scheduler and event channel.
///
/// # Example
///
/// ```no_run
/// use ftp_inbound::{ChannelSink, Config, InboundTransport};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Config::from_json_str(r#"{
///     "serverType": "ftp",
///     "server": "ftp.example.com",
///     "user": "ingest",
///     "password": "secret",
///     "serverFolder": "exports",
///     "fileName": "*.txt",
///     "frequency": 30,
///     "numberOfLinesToSkip": 1
/// }"#)?;
///
/// let (sink, mut deliveries) = ChannelSink::new();
/// let transport = InboundTransport::new(config, Arc::new(sink));
/// transport.start();
///
/// while let Some(delivery) = deliveries.recv().await {
///     println!("{}: {} bytes", delivery.context, delivery.payload.len());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct InboundTransport {
    inner: Arc<Inner>,
}

pub(crate) struct Inner {
    state: Mutex<RunState>,
    /// Bumped by every `start()`; ticks and workers of older activations
    /// must not touch the state
    generation: AtomicU64,
    schedule: Mutex<Option<ScheduleHandle>>,
    /// Shared by the pipelines of all activations
    tick_guard: Arc<tokio::sync::Mutex<()>>,
    config: Mutex<Config>,
    connector: Arc<dyn Connector>,
    sink: Arc<dyn Sink>,
    event_tx: broadcast::Sender<Event>,
}

/// Lock a std mutex, recovering the data if a panicking holder poisoned it
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl InboundTransport {
    /// Create a stopped transport using the FTP/SFTP client for `serverType`
    pub fn new(config: Config, sink: Arc<dyn Sink>) -> Self {
        Self::with_connector(config, sink, Arc::new(ProtocolConnector))
    }

    /// Create a stopped transport with a custom client factory
    pub fn with_connector(
        config: Config,
        sink: Arc<dyn Sink>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let (event_tx, _rx) = broadcast::channel(1000);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(RunState::Stopped),
                generation: AtomicU64::new(0),
                schedule: Mutex::new(None),
                tick_guard: Arc::new(tokio::sync::Mutex::new(())),
                config: Mutex::new(config),
                connector,
                sink,
                event_tx,
            }),
        }
    }

    /// Current run state
    pub fn state(&self) -> RunState {
        *lock(&self.inner.state)
    }

    /// Subscribe to transport events
    ///
    /// Receivers that fall behind lose the oldest events (`RecvError::Lagged`).
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.inner.event_tx.subscribe()
    }

    /// Replace the configuration used by the next `start()`
    ///
    /// A running transport keeps its current configuration until restarted.
    pub fn reconfigure(&self, config: Config) {
        *lock(&self.inner.config) = config;
        tracing::info!(state = %self.state(), "Configuration replaced, applies on next start");
    }

    /// Validation hook for the host framework; performs no checks
    ///
    /// Configuration problems surface when the worker loads the configuration
    /// in `start()`, which then moves the transport to ERROR.
    pub fn validate(&self) {
        tracing::debug!("Validation skipped for inbound transport");
    }
}

impl Inner {
    fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }

    /// Set the state, emitting `StateChanged` when it differs
    fn set_state(&self, to: RunState) -> RunState {
        let from = std::mem::replace(&mut *lock(&self.state), to);
        if from != to {
            tracing::debug!(%from, %to, "Run state changed");
            self.emit_event(Event::StateChanged { from, to });
        }
        from
    }

    /// Whether `generation` is the latest activation and the state is `expected`
    fn is_current(&self, generation: u64, expected: RunState) -> bool {
        let state = lock(&self.state);
        *state == expected && self.generation.load(Ordering::SeqCst) == generation
    }

    /// Set `to` only if `generation` is the latest activation and the
    /// current state is `expected`
    fn transition(&self, generation: u64, expected: RunState, to: RunState) -> bool {
        let changed = {
            let mut state = lock(&self.state);
            if *state == expected && self.generation.load(Ordering::SeqCst) == generation {
                *state = to;
                true
            } else {
                false
            }
        };
        if changed {
            tracing::debug!(from = %expected, %to, "Run state changed");
            self.emit_event(Event::StateChanged { from: expected, to });
        }
        changed
    }

    fn build_pipeline(&self) -> crate::Result<Pipeline> {
        let config = lock(&self.config).clone().normalized();
        config.validate()?;
        let pipeline = Pipeline::new(
            Arc::new(config),
            self.connector.clone(),
            self.sink.clone(),
            self.event_tx.clone(),
        )?;
        Ok(pipeline.with_tick_guard(self.tick_guard.clone()))
    }

    /// Scheduled entry point of every tick
    async fn on_tick(self: Arc<Self>, pipeline: Arc<Pipeline>, generation: u64) {
        match pipeline.run_tick().await {
            Ok(TickOutcome::Completed(report)) => {
                if report.cleanup_failures > 0 {
                    tracing::warn!(
                        failures = report.cleanup_failures,
                        "Tick completed with cleanup failures"
                    );
                }
            }
            Ok(TickOutcome::Skipped) => {}
            Err(e) => self.handle_tick_error(&e, generation),
        }
    }

    fn handle_tick_error(&self, error: &Error, generation: u64) {
        match error.class() {
            ErrorClass::Benign => tracing::debug!(error = %error, "Tick ended early"),
            ErrorClass::Recoverable => tracing::warn!(error = %error, "Tick hit a recoverable error"),
            ErrorClass::TickFatal | ErrorClass::TransportFatal => {
                if !self.is_current(generation, RunState::Started) {
                    // In-flight tick outlived stop(); the state belongs to a later activation
                    tracing::warn!(error = %error, "Tick failed after the transport was stopped");
                    return;
                }
                self.fail(error);
            }
        }
    }
}
