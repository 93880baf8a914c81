//! Gamepad event collection and the bridge into the scheduler
//!
//! The gilrs poll blocks, so it runs on its own OS thread. Every converted
//! event is handed to the cooperative side through a bounded tokio channel;
//! that enqueue is the only cross-thread hand-off in the pipeline. The poll
//! thread has no shutdown path and lives as long as the process.

use gilrs::{Axis, Button, Event, EventType, Gamepad, GamepadId, Gilrs};
use statum::{machine, state};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

const ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// Gamepad input in the SDL joystick layout
///
/// Axis and button indices follow the usual SDL numbering (left stick 0/1,
/// left trigger 2, right stick 3/4, right trigger 5). Axis values keep the
/// gilrs orientation: positive is right and up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawInputEvent {
    AxisMotion { axis: u8, value: f32 },
    ButtonDown { index: u8 },
    ButtonUp { index: u8 },
    HatMotion { x: i8, y: i8 },
}

#[derive(Clone, Debug, Default)]
pub struct CollectorSettings {
    pub joystick_deadzone: f32,
    pub gamepad_index: Option<usize>,
}

#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("Failed to initialize collector: {0}")]
    InitializationError(String),

    #[error("Failed to collect events: {0}")]
    EventCollectionError(String),

    #[error("Event source closed")]
    SourceClosed,
}

/// A blocking producer of gamepad events
pub trait EventSource {
    /// Blocks until the next relevant event is available
    fn wait_event(&mut self) -> Result<RawInputEvent, CollectorError>;
}

#[state]
#[derive(Debug, Clone)]
pub enum CollectionState {
    Initializing,
    Collecting,
}

#[machine]
#[derive(Debug)]
pub struct EventCollector<S: CollectionState> {
    gilrs: Gilrs,

    // Only events of this pad are forwarded when set
    active_gamepad: Option<GamepadId>,

    settings: CollectorSettings,

    // D-pad buttons folded into one hat vector
    hat: (i8, i8),
}

impl EventCollector<Initializing> {
    pub fn create(settings: CollectorSettings) -> Result<Self, CollectorError> {
        debug!("Creating Event Collector with settings: {:?}", settings);

        info!("Initializing gilrs controller interface");
        let gilrs = match Gilrs::new() {
            Ok(g) => g,
            Err(e) => {
                error!("Failed to initialize gilrs: {}", e);
                return Err(CollectorError::InitializationError(e.to_string()));
            }
        };

        Ok(Self::new(gilrs, None, settings, (0, 0)))
    }

    /// Enumerates the connected pads once and moves to the collecting state
    pub fn initialize(mut self) -> Result<EventCollector<Collecting>, CollectorError> {
        let gamepads: Vec<(GamepadId, Gamepad<'_>)> = self.gilrs.gamepads().collect();

        if gamepads.is_empty() {
            warn!("No gamepad connected, waiting for one to appear");
        }
        for (idx, (id, gamepad)) in gamepads.iter().enumerate() {
            info!(
                "Detected joystick [{}] ID: {}, Name: {}, UUID: {:?}",
                idx,
                id,
                gamepad.name(),
                gamepad.uuid()
            );
        }

        if let Some(index) = self.settings.gamepad_index {
            let (id, gamepad) = gamepads.get(index).ok_or_else(|| {
                CollectorError::InitializationError(format!(
                    "gamepad index {} requested but only {} connected",
                    index,
                    gamepads.len()
                ))
            })?;
            info!("Selected gamepad: {} ({})", gamepad.name(), id);
            self.active_gamepad = Some(*id);
        }

        info!("Event Collector initialized, transitioning to Collecting state");
        Ok(self.transition())
    }
}

impl EventCollector<Collecting> {
    fn convert_gilrs_event(&mut self, event: EventType) -> Option<RawInputEvent> {
        match event {
            EventType::AxisChanged(axis, value, _) => self.convert_axis(axis, value),
            EventType::ButtonPressed(button, _) => self.convert_button(button, true),
            EventType::ButtonReleased(button, _) => self.convert_button(button, false),
            EventType::Connected => {
                info!("Controller connected event detected");
                None
            }
            EventType::Disconnected => {
                warn!("Controller disconnected event detected");
                None
            }
            _ => {
                debug!("Unhandled event type: {:?}", event);
                None
            }
        }
    }

    fn convert_axis(&mut self, axis: Axis, value: f32) -> Option<RawInputEvent> {
        let deadzone = self.settings.joystick_deadzone;
        let (index, value) = match axis {
            Axis::LeftStickX => (0, apply_deadzone(value, deadzone)),
            Axis::LeftStickY => (1, apply_deadzone(value, deadzone)),
            Axis::LeftZ => (2, value),
            Axis::RightStickX => (3, apply_deadzone(value, deadzone)),
            Axis::RightStickY => (4, apply_deadzone(value, deadzone)),
            Axis::RightZ => (5, value),
            Axis::DPadX => {
                self.hat.0 = value.round().clamp(-1.0, 1.0) as i8;
                return Some(self.hat_event());
            }
            Axis::DPadY => {
                self.hat.1 = value.round().clamp(-1.0, 1.0) as i8;
                return Some(self.hat_event());
            }
            _ => {
                debug!("Ignoring unsupported axis: {:?}", axis);
                return None;
            }
        };
        Some(RawInputEvent::AxisMotion { axis: index, value })
    }

    fn convert_button(&mut self, button: Button, pressed: bool) -> Option<RawInputEvent> {
        let hat = match button {
            Button::DPadUp => Some((None, Some(1))),
            Button::DPadDown => Some((None, Some(-1))),
            Button::DPadLeft => Some((Some(-1), None)),
            Button::DPadRight => Some((Some(1), None)),
            _ => None,
        };
        if let Some((x, y)) = hat {
            if let Some(x) = x {
                self.hat.0 = if pressed { x } else if self.hat.0 == x { 0 } else { self.hat.0 };
            }
            if let Some(y) = y {
                self.hat.1 = if pressed { y } else if self.hat.1 == y { 0 } else { self.hat.1 };
            }
            return Some(self.hat_event());
        }

        let index = button_index(button)?;
        Some(if pressed {
            RawInputEvent::ButtonDown { index }
        } else {
            RawInputEvent::ButtonUp { index }
        })
    }

    fn hat_event(&self) -> RawInputEvent {
        RawInputEvent::HatMotion {
            x: self.hat.0,
            y: self.hat.1,
        }
    }
}

impl EventSource for EventCollector<Collecting> {
    fn wait_event(&mut self) -> Result<RawInputEvent, CollectorError> {
        loop {
            let Some(Event { id, event, .. }) = self.gilrs.next_event_blocking(None) else {
                return Err(CollectorError::EventCollectionError(
                    "gamepad backend returned no event".to_string(),
                ));
            };
            if let Some(active_id) = self.active_gamepad {
                if id != active_id {
                    debug!("Skipping event from non-active gamepad: {:?}", id);
                    continue;
                }
            }
            if let Some(raw_event) = self.convert_gilrs_event(event) {
                return Ok(raw_event);
            }
        }
    }
}

/// Owner of the blocking poll thread
///
/// Constructed once at startup. There is no stop operation: the thread ends
/// only when its source closes or the queue's receiving side is dropped.
pub struct EventBridge {
    thread: JoinHandle<()>,
}

impl EventBridge {
    /// Starts the poll thread and waits until `factory` produced the source
    ///
    /// The source is built on the poll thread itself, so it does not need to
    /// be `Send`.
    pub async fn start<S, F>(
        factory: F,
        sender: mpsc::Sender<RawInputEvent>,
    ) -> Result<Self, CollectorError>
    where
        S: EventSource,
        F: FnOnce() -> Result<S, CollectorError> + Send + 'static,
    {
        let (ready_tx, ready_rx) = oneshot::channel();
        let thread = std::thread::Builder::new()
            .name("gamepad-poll".to_string())
            .spawn(move || match factory() {
                Ok(source) => {
                    let _ = ready_tx.send(Ok(()));
                    run_poll_loop(source, sender);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(|e| CollectorError::InitializationError(e.to_string()))?;

        ready_rx.await.map_err(|_| {
            CollectorError::InitializationError("poll thread exited during startup".to_string())
        })??;

        info!("Event bridge started");
        Ok(Self { thread })
    }

    pub fn is_running(&self) -> bool {
        !self.thread.is_finished()
    }
}

fn run_poll_loop<S: EventSource>(mut source: S, sender: mpsc::Sender<RawInputEvent>) {
    info!("Begin gamepad polling");
    let mut forwarded: u64 = 0;

    loop {
        match source.wait_event() {
            Ok(event) => {
                debug!("Captured event: {:?}", event);
                if sender.blocking_send(event).is_err() {
                    info!(
                        "Event queue closed, stopping gamepad polling after {} events",
                        forwarded
                    );
                    return;
                }
                forwarded += 1;
            }
            Err(CollectorError::SourceClosed) => {
                info!("Event source closed after {} events", forwarded);
                return;
            }
            Err(e) => {
                error!("Error collecting event: {}", e);
                std::thread::sleep(ERROR_BACKOFF);
            }
        }
    }
}

fn button_index(button: Button) -> Option<u8> {
    match button {
        Button::South => Some(0),
        Button::East => Some(1),
        Button::West => Some(2),
        Button::North => Some(3),
        Button::LeftTrigger => Some(4),
        Button::RightTrigger => Some(5),
        Button::LeftTrigger2 => Some(6),
        Button::RightTrigger2 => Some(7),
        Button::Select => Some(8),
        Button::Start => Some(9),
        Button::Mode => Some(10),
        Button::LeftThumb => Some(11),
        Button::RightThumb => Some(12),
        _ => None,
    }
}

fn apply_deadzone(value: f32, deadzone: f32) -> f32 {
    if deadzone <= 0.0 {
        return value;
    }
    if value.abs() < deadzone {
        0.0
    } else {
        // Rescale the value to the range outside the deadzone
        value.signum() * (value.abs() - deadzone) / (1.0 - deadzone)
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::collections::VecDeque;

    /// Replays a fixed list of events, then reports the source as closed
    pub struct ScriptedSource {
        events: VecDeque<Result<RawInputEvent, CollectorError>>,
    }

    impl ScriptedSource {
        pub fn new(events: impl IntoIterator<Item = RawInputEvent>) -> Self {
            Self {
                events: events.into_iter().map(Ok).collect(),
            }
        }

        pub fn with_results(
            events: impl IntoIterator<Item = Result<RawInputEvent, CollectorError>>,
        ) -> Self {
            Self {
                events: events.into_iter().collect(),
            }
        }
    }

    impl EventSource for ScriptedSource {
        fn wait_event(&mut self) -> Result<RawInputEvent, CollectorError> {
            self.events
                .pop_front()
                .unwrap_or(Err(CollectorError::SourceClosed))
        }
    }
}
