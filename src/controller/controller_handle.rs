//! Controller Handle - wiring of the gamepad pipeline
//!
//! Starts the three stages that feed the controller state from a gamepad:
//! the blocking event bridge, the translator and the dispatcher. Both async
//! stages are spawned with `spawn_local`, so [`ControllerHandle::spawn`] must
//! run inside a [`tokio::task::LocalSet`].

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::dispatcher::{DirtyFlag, StateDispatcher};
use super::event_collector::{CollectorError, CollectorSettings, EventBridge, EventSource};
use super::event_translator::GamepadEventTranslator;
use crate::config::AppConfig;
use crate::state::SharedState;

/// Configuration for the complete gamepad pipeline
#[derive(Clone, Debug)]
pub struct ControllerSettings {
    /// Capacity of the queue between the poll thread and the translator
    pub queue_capacity: usize,
    pub dispatch_period: Duration,
    pub stats_interval: Duration,
    pub collector: CollectorSettings,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 1000,
            dispatch_period: Duration::from_secs(1) / 120,
            stats_interval: Duration::from_secs(30),
            collector: CollectorSettings::default(),
        }
    }
}

impl From<&AppConfig> for ControllerSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            queue_capacity: config.gamepad.queue_capacity,
            dispatch_period: config.dispatch.period(),
            stats_interval: Duration::from_secs(config.dispatch.stats_interval_secs),
            collector: CollectorSettings {
                joystick_deadzone: config.gamepad.joystick_deadzone,
                gamepad_index: config.gamepad.gamepad_index,
            },
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("Collector error: {0}")]
    CollectorError(#[from] CollectorError),
}

/// Keeps the running pipeline together
///
/// The stages are fire-and-forget: nothing joins them when the session ends,
/// the poll thread in particular runs until the process exits.
pub struct ControllerHandle {
    bridge: EventBridge,
    dispatcher: JoinHandle<()>,
}

impl ControllerHandle {
    pub async fn spawn<S, F>(
        settings: ControllerSettings,
        source: F,
        state: &SharedState,
        session: CancellationToken,
    ) -> Result<Self, ControllerError>
    where
        S: EventSource,
        F: FnOnce() -> Result<S, CollectorError> + Send + 'static,
    {
        info!("Initializing gamepad pipeline with settings: {:?}", settings);

        let (event_sender, event_receiver) = mpsc::channel(settings.queue_capacity);
        debug!(
            "Created event channel with buffer capacity {}",
            settings.queue_capacity
        );
        let dirty = DirtyFlag::new();

        let bridge = EventBridge::start(source, event_sender).await?;

        let translator = GamepadEventTranslator::new(state, dirty.clone());
        tokio::task::spawn_local(translator.run(event_receiver));

        let dispatcher = StateDispatcher::new(
            state,
            dirty,
            settings.dispatch_period,
            settings.stats_interval,
        );
        let dispatcher = tokio::task::spawn_local(dispatcher.run(session));

        info!("Gamepad pipeline initialized successfully");
        Ok(Self { bridge, dispatcher })
    }

    pub fn is_polling(&self) -> bool {
        self.bridge.is_running()
    }

    pub fn is_dispatching(&self) -> bool {
        !self.dispatcher.is_finished()
    }
}
