//! Start and stop coordination.

use super::{InboundTransport, Inner, lock};
use crate::error::Error;
use crate::scheduler::Scheduler;
use crate::types::{Event, RunState};
use std::sync::Arc;
use std::sync::atomic::Ordering;

impl InboundTransport {
    /// Start polling
    ///
    /// Ignored (returns `false`) while the transport is STARTING, STARTED or
    /// STOPPING. Otherwise the state becomes STARTING and a worker task loads
    /// the configuration, moves to STARTED and arms the scheduler. If loading
    /// fails the transport ends in ERROR.
    ///
    /// Must be called from within a Tokio runtime; outside one the transport
    /// goes straight to ERROR.
    pub fn start(&self) -> bool {
        let (from, generation) = {
            let mut state = lock(&self.inner.state);
            let current = *state;
            if current.is_active() {
                tracing::debug!(state = %current, "Start ignored, transport already active");
                return false;
            }
            let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
            (std::mem::replace(&mut *state, RunState::Starting), generation)
        };
        self.inner.emit_event(Event::StateChanged {
            from,
            to: RunState::Starting,
        });

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                self.inner
                    .fail(&Error::Other(format!("cannot start outside a tokio runtime: {}", e)));
                return false;
            }
        };

        let inner = self.inner.clone();
        runtime.spawn(async move { inner.activate(generation) });
        true
    }

    /// Stop polling
    ///
    /// Cancels future ticks and sets STOPPED. A tick that is already running
    /// is not interrupted.
    pub fn stop(&self) {
        self.inner.stop();
    }
}

impl Inner {
    /// Worker body: load configuration, go STARTED, arm the scheduler
    fn activate(self: Arc<Self>, generation: u64) {
        let prepared = self.build_pipeline().and_then(|pipeline| {
            let config = pipeline.config().clone();
            let scheduler = Scheduler::new(config.frequency, config.schedule_anchor)?;
            Ok((Arc::new(pipeline), scheduler))
        });
        let (pipeline, scheduler) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                if self.is_current(generation, RunState::Starting) {
                    self.fail(&e);
                } else {
                    tracing::warn!(error = %e, "Superseded start failed to load configuration");
                }
                return;
            }
        };

        if !self.transition(generation, RunState::Starting, RunState::Started) {
            tracing::debug!("Transport stopped while starting, not arming scheduler");
            return;
        }

        let config = pipeline.config().clone();
        tracing::info!(
            server = %config.address(),
            protocol = %config.protocol,
            folder = %config.server_folder,
            file = %config.file_name,
            frequency_secs = config.frequency.as_secs(),
            "Inbound transport started"
        );

        // Ticks hold only a weak reference so dropping the transport ends the schedule
        let weak = Arc::downgrade(&self);
        let handle = scheduler.arm(move || {
            let inner = weak.upgrade();
            let pipeline = pipeline.clone();
            async move {
                if let Some(inner) = inner {
                    inner.on_tick(pipeline, generation).await;
                }
            }
        });

        let mut slot = lock(&self.schedule);
        if self.is_current(generation, RunState::Started) {
            if let Some(previous) = slot.replace(handle) {
                previous.cancel();
            }
        } else {
            handle.cancel();
        }
    }

    pub(super) fn stop(&self) {
        self.set_state(RunState::Stopping);

        let handle = lock(&self.schedule).take();
        if let Some(handle) = handle {
            handle.cancel();
            tracing::debug!("Scheduler cancelled");
        }

        self.set_state(RunState::Stopped);
        tracing::info!("Inbound transport stopped");
    }

    /// Stop and park the transport in ERROR
    pub(super) fn fail(&self, error: &Error) {
        tracing::error!(
            code = error.error_code(),
            error = %error,
            "Inbound transport failed, stopping"
        );
        self.emit_event(Event::TickFailed {
            code: error.error_code().to_string(),
            message: error.to_string(),
        });
        self.stop();
        self.set_state(RunState::Error);
    }
}
