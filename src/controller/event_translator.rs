//! Translation of raw gamepad events into controller state mutations
//!
//! The translator is the single consumer of the event queue. Every event that
//! mutates the state raises the shared [`DirtyFlag`]; the dispatcher later
//! coalesces those mutations into one send.
//!
//! Hat vectors other than neutral and the four cardinal directions (e.g.
//! diagonals) are dropped without raising the flag.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::dispatcher::DirtyFlag;
use super::event_collector::RawInputEvent;
use crate::state::{Button, ControllerState, SharedState, StateError};

/// Gamepad button index to controller button, by position in the SDL layout
pub const BUTTON_MAP: [(u8, Button); 13] = [
    (0, Button::B),       // cross
    (1, Button::A),       // circle
    (2, Button::Y),       // square
    (3, Button::X),       // triangle
    (4, Button::L),       // l1
    (5, Button::R),       // r1
    (6, Button::Zl),      // l2
    (7, Button::Zr),      // r2
    (8, Button::Minus),   // share
    (9, Button::Plus),    // options
    (10, Button::Home),   // ps
    (11, Button::LStick), // l3
    (12, Button::RStick), // r3
];

const DPAD: [Button; 4] = [Button::Left, Button::Right, Button::Up, Button::Down];

pub fn mapped_button(index: u8) -> Option<Button> {
    BUTTON_MAP
        .iter()
        .find(|(i, _)| *i == index)
        .map(|(_, button)| *button)
}

#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    #[error("Controller state is no longer attached")]
    Detached,

    #[error(transparent)]
    State(#[from] StateError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Translation {
    Applied,
    Ignored,
}

pub struct GamepadEventTranslator {
    state: Weak<RefCell<ControllerState>>,
    dirty: DirtyFlag,
}

impl GamepadEventTranslator {
    pub fn new(state: &SharedState, dirty: DirtyFlag) -> Self {
        Self {
            state: Rc::downgrade(state),
            dirty,
        }
    }

    pub fn translate(&self, event: &RawInputEvent) -> Result<Translation, TranslateError> {
        let state = self.state.upgrade().ok_or(TranslateError::Detached)?;
        let translation = apply_event(&mut state.borrow_mut(), event)?;
        if translation == Translation::Applied {
            self.dirty.raise();
        }
        Ok(translation)
    }

    /// Drains the queue until the bridge side is gone
    pub async fn run(self, mut receiver: mpsc::Receiver<RawInputEvent>) {
        info!("Gamepad event translator started");
        let mut translated: u64 = 0;

        while let Some(event) = receiver.recv().await {
            match self.translate(&event) {
                Ok(Translation::Applied) => {
                    translated += 1;
                    debug!("Applied gamepad event {:?}", event);
                }
                Ok(Translation::Ignored) => debug!("Ignored gamepad event {:?}", event),
                Err(e) => error!("Error in gamepad handling for {:?}: {}", event, e),
            }
        }

        warn!(
            "Event queue closed, translator stopped after {} events",
            translated
        );
    }
}

fn apply_event(
    state: &mut ControllerState,
    event: &RawInputEvent,
) -> Result<Translation, StateError> {
    match *event {
        RawInputEvent::AxisMotion { axis, value } => match axis {
            0 => state.l_stick.set_h_float(value)?,
            1 => state.l_stick.set_v_float(value)?,
            3 => state.r_stick.set_h_float(value)?,
            4 => state.r_stick.set_v_float(value)?,
            // 2 and 5 are the analog triggers, not wired
            _ => return Ok(Translation::Ignored),
        },
        RawInputEvent::ButtonDown { index } => {
            if let Some(button) = mapped_button(index) {
                state.button_state.set(button, true)?;
            }
        }
        RawInputEvent::ButtonUp { index } => {
            if let Some(button) = mapped_button(index) {
                state.button_state.set(button, false)?;
            }
        }
        RawInputEvent::HatMotion { x, y } => {
            let pressed = match (x, y) {
                (0, 0) => None,
                (1, 0) => Some(Button::Right),
                (-1, 0) => Some(Button::Left),
                (0, 1) => Some(Button::Up),
                (0, -1) => Some(Button::Down),
                _ => return Ok(Translation::Ignored),
            };
            for button in DPAD {
                state.button_state.set(button, pressed == Some(button))?;
            }
        }
    }
    Ok(Translation::Applied)
}
