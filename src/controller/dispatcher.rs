//! Rate limited, coalescing state dispatch
//!
//! Mutations only raise a [`DirtyFlag`]. The dispatcher looks at the flag once
//! per period and issues at most one send per tick, so a burst of stick
//! movement turns into a steady stream of reports instead of one send per
//! event.

use chrono::Local;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::state::{send_state, ControllerState, SharedState};
use crate::transport::TransportError;

/// "State changed since the last send"
///
/// Raised by the translator, read-and-cleared by the dispatcher. Both live
/// on the same single threaded scheduler, so a plain `Cell` is enough.
#[derive(Clone, Debug, Default)]
pub struct DirtyFlag(Rc<Cell<bool>>);

impl DirtyFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.set(true);
    }

    /// Returns whether the flag was raised and clears it
    pub fn take(&self) -> bool {
        self.0.replace(false)
    }

    pub fn is_raised(&self) -> bool {
        self.0.get()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Nothing changed since the last send
    Idle,
    Sent,
    /// Flag was raised but no controller state is attached anymore
    Detached,
    /// The send failed for a reason other than a lost connection
    Failed,
    Disconnected,
}

pub struct StateDispatcher {
    state: Weak<RefCell<ControllerState>>,
    dirty: DirtyFlag,
    period: Duration,
    stats_interval: Duration,
}

impl StateDispatcher {
    pub fn new(
        state: &SharedState,
        dirty: DirtyFlag,
        period: Duration,
        stats_interval: Duration,
    ) -> Self {
        Self {
            state: Rc::downgrade(state),
            dirty,
            period,
            stats_interval,
        }
    }

    /// One dispatch cycle
    ///
    /// The flag is cleared before the send is awaited; a mutation landing
    /// while the send is in flight raises it again for the next tick.
    pub async fn tick(&self) -> TickOutcome {
        if !self.dirty.take() {
            return TickOutcome::Idle;
        }
        // No attached state: the change is dropped silently
        let Some(state) = self.state.upgrade() else {
            return TickOutcome::Detached;
        };

        debug!("Sending state");
        match send_state(&state).await {
            Ok(()) => TickOutcome::Sent,
            Err(TransportError::NotConnected) => TickOutcome::Disconnected,
            Err(e) => {
                warn!("Failed to send controller state: {}", e);
                TickOutcome::Failed
            }
        }
    }

    /// Ticks until the session ends; a lost connection ends the session
    pub async fn run(self, session: CancellationToken) {
        info!(
            "Starting state dispatcher with {:.2} ms period",
            self.period.as_secs_f64() * 1000.0
        );

        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut ticks: u64 = 0;
        let mut sends: u64 = 0;
        let mut last_stats_time = Local::now();

        loop {
            tokio::select! {
                _ = session.cancelled() => {
                    debug!("Session ended, dispatcher stops");
                    return;
                }
                _ = interval.tick() => {}
            }

            ticks += 1;
            match self.tick().await {
                TickOutcome::Sent => sends += 1,
                TickOutcome::Disconnected => {
                    info!("Connection was lost.");
                    session.cancel();
                    return;
                }
                TickOutcome::Idle | TickOutcome::Detached | TickOutcome::Failed => {}
            }

            let now = Local::now();
            let elapsed = now - last_stats_time;
            if elapsed.to_std().unwrap_or_default() >= self.stats_interval {
                info!(
                    "Dispatcher stats: {} sends in {} ticks over {} seconds",
                    sends,
                    ticks,
                    elapsed.num_seconds()
                );
                ticks = 0;
                sends = 0;
                last_stats_time = now;
            }
        }
    }
}
