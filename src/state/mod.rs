//! Controller state shared by the gamepad pipeline and the console
//!
//! The state is owned by the session and lives inside the single cooperative
//! scheduler, so it is shared as `Rc<RefCell<ControllerState>>`. Borrows are
//! never held across an `.await`: [`send_state`] snapshots the state into an
//! [`InputReport`] first and only then hands it to the transport.

pub mod stick;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::transport::{Transport, TransportError};
pub use stick::StickState;

pub type SharedState = Rc<RefCell<ControllerState>>;

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Unknown button \"{0}\"")]
    UnknownButton(String),

    #[error("Button {button} is not available on {kind}")]
    ButtonUnavailable { button: Button, kind: ControllerKind },

    #[error("Stick value {0} is outside of 0..=4095")]
    StickOutOfRange(i64),

    #[error("Axis value {0} is not a finite number")]
    InvalidAxisValue(f32),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Every button a Switch controller can report
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Button {
    Y,
    X,
    B,
    A,
    R,
    Zr,
    Minus,
    Plus,
    RStick,
    LStick,
    Home,
    Capture,
    Down,
    Up,
    Right,
    Left,
    L,
    Zl,
    Sr,
    Sl,
}

impl Button {
    pub fn name(&self) -> &'static str {
        match self {
            Button::Y => "y",
            Button::X => "x",
            Button::B => "b",
            Button::A => "a",
            Button::R => "r",
            Button::Zr => "zr",
            Button::Minus => "minus",
            Button::Plus => "plus",
            Button::RStick => "r_stick",
            Button::LStick => "l_stick",
            Button::Home => "home",
            Button::Capture => "capture",
            Button::Down => "down",
            Button::Up => "up",
            Button::Right => "right",
            Button::Left => "left",
            Button::L => "l",
            Button::Zl => "zl",
            Button::Sr => "sr",
            Button::Sl => "sl",
        }
    }
}

impl fmt::Display for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Button {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let button = match s {
            "y" => Button::Y,
            "x" => Button::X,
            "b" => Button::B,
            "a" => Button::A,
            "r" => Button::R,
            "zr" => Button::Zr,
            "minus" => Button::Minus,
            "plus" => Button::Plus,
            "r_stick" => Button::RStick,
            "l_stick" => Button::LStick,
            "home" => Button::Home,
            "capture" => Button::Capture,
            "down" => Button::Down,
            "up" => Button::Up,
            "right" => Button::Right,
            "left" => Button::Left,
            "l" => Button::L,
            "zl" => Button::Zl,
            "sr" => Button::Sr,
            "sl" => Button::Sl,
            other => return Err(StateError::UnknownButton(other.to_string())),
        };
        Ok(button)
    }
}

/// Which controller the session emulates; decides the available buttons
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerKind {
    #[default]
    ProController,
    JoyconL,
    JoyconR,
}

impl ControllerKind {
    pub fn buttons(&self) -> &'static [Button] {
        use Button::*;
        match self {
            ControllerKind::ProController => &[
                Y, X, B, A, R, Zr, Minus, Plus, RStick, LStick, Home, Capture, Down, Up, Right,
                Left, L, Zl,
            ],
            ControllerKind::JoyconL => &[
                Minus, LStick, Capture, Down, Up, Right, Left, Sr, Sl, L, Zl,
            ],
            ControllerKind::JoyconR => &[Y, X, B, A, Sr, Sl, R, Zr, Plus, RStick, Home],
        }
    }
}

impl fmt::Display for ControllerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerKind::ProController => write!(f, "Pro Controller"),
            ControllerKind::JoyconL => write!(f, "Joy-Con (L)"),
            ControllerKind::JoyconR => write!(f, "Joy-Con (R)"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ButtonState {
    kind: ControllerKind,
    pressed: BTreeSet<Button>,
}

impl ButtonState {
    pub fn new(kind: ControllerKind) -> Self {
        Self {
            kind,
            pressed: BTreeSet::new(),
        }
    }

    pub fn set(&mut self, button: Button, pushed: bool) -> Result<(), StateError> {
        if !self.kind.buttons().contains(&button) {
            return Err(StateError::ButtonUnavailable {
                button,
                kind: self.kind,
            });
        }
        if pushed {
            self.pressed.insert(button);
        } else {
            self.pressed.remove(&button);
        }
        Ok(())
    }

    pub fn set_button(&mut self, name: &str, pushed: bool) -> Result<(), StateError> {
        self.set(name.parse()?, pushed)
    }

    pub fn get(&self, button: Button) -> bool {
        self.pressed.contains(&button)
    }

    /// Resolves `name` to a button only if the current controller kind has it
    pub fn available(&self, name: &str) -> Option<Button> {
        name.parse::<Button>()
            .ok()
            .filter(|button| self.kind.buttons().contains(button))
    }

    pub fn available_buttons(&self) -> impl Iterator<Item = &'static str> {
        self.kind.buttons().iter().map(Button::name)
    }

    pub fn pressed(&self) -> impl Iterator<Item = Button> + '_ {
        self.pressed.iter().copied()
    }
}

/// Snapshot of the controller state handed to a transport
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct InputReport {
    pub controller: ControllerKind,
    pub buttons: Vec<&'static str>,
    pub left_stick: StickState,
    pub right_stick: StickState,
    pub timestamp: DateTime<Local>,
}

pub struct ControllerState {
    pub button_state: ButtonState,
    pub l_stick: StickState,
    pub r_stick: StickState,
    transport: Rc<dyn Transport>,
}

impl ControllerState {
    pub fn new(kind: ControllerKind, transport: Rc<dyn Transport>) -> Self {
        Self {
            button_state: ButtonState::new(kind),
            l_stick: StickState::default(),
            r_stick: StickState::default(),
            transport,
        }
    }

    pub fn into_shared(self) -> SharedState {
        Rc::new(RefCell::new(self))
    }

    pub fn kind(&self) -> ControllerKind {
        self.button_state.kind
    }

    pub fn report(&self) -> InputReport {
        InputReport {
            controller: self.kind(),
            buttons: self.button_state.pressed().map(|b| b.name()).collect(),
            left_stick: self.l_stick,
            right_stick: self.r_stick,
            timestamp: Local::now(),
        }
    }

    pub fn transport(&self) -> Rc<dyn Transport> {
        self.transport.clone()
    }
}

/// Sends the current state through the session transport
pub async fn send_state(state: &SharedState) -> Result<(), TransportError> {
    let (report, transport) = {
        let state = state.borrow();
        (state.report(), state.transport())
    };
    debug!("Sending state through {}: {:?}", transport.name(), report.buttons);
    transport.send(&report).await
}

/// Presses all `buttons` at once, holds them for `hold`, then releases them
///
/// Two sends are issued for the whole set, one for the press and one for
/// the release. Availability is checked for every button before anything is
/// pressed.
pub async fn button_push(
    state: &SharedState,
    buttons: &[Button],
    hold: Duration,
) -> Result<(), StateError> {
    {
        let mut state = state.borrow_mut();
        let kind = state.kind();
        if let Some(&button) = buttons.iter().find(|b| !kind.buttons().contains(b)) {
            return Err(StateError::ButtonUnavailable { button, kind });
        }
        for &button in buttons {
            state.button_state.set(button, true)?;
        }
    }
    if let Err(e) = send_state(state).await {
        // Never leave the buttons held after a press that did not go out
        release(state, buttons)?;
        return Err(e.into());
    }

    tokio::time::sleep(hold).await;

    release(state, buttons)?;
    send_state(state).await?;
    Ok(())
}

fn release(state: &SharedState, buttons: &[Button]) -> Result<(), StateError> {
    let mut state = state.borrow_mut();
    for &button in buttons {
        state.button_state.set(button, false)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::RecordingTransport;

    fn shared(kind: ControllerKind) -> (SharedState, Rc<RecordingTransport>) {
        let transport = Rc::new(RecordingTransport::default());
        let state = ControllerState::new(kind, transport.clone()).into_shared();
        (state, transport)
    }

    #[test]
    fn button_names_round_trip_through_from_str() {
        for &button in ControllerKind::ProController.buttons() {
            assert_eq!(button.name().parse::<Button>().unwrap(), button);
        }
        assert!(matches!(
            "zzz".parse::<Button>(),
            Err(StateError::UnknownButton(name)) if name == "zzz"
        ));
    }

    #[test]
    fn set_button_respects_controller_kind() {
        let mut buttons = ButtonState::new(ControllerKind::JoyconL);
        buttons.set_button("l", true).unwrap();
        assert!(buttons.get(Button::L));
        assert!(matches!(
            buttons.set_button("a", true),
            Err(StateError::ButtonUnavailable { button: Button::A, .. })
        ));
        assert!(buttons.available("a").is_none());
        assert_eq!(buttons.available("sl"), Some(Button::Sl));
    }

    #[test]
    fn report_lists_pressed_buttons() {
        let (state, _) = shared(ControllerKind::ProController);
        state.borrow_mut().button_state.set(Button::A, true).unwrap();
        state.borrow_mut().l_stick.set_up();
        let report = state.borrow().report();
        assert_eq!(report.buttons, vec!["a"]);
        assert_eq!(report.left_stick.v(), stick::STICK_MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn button_push_presses_then_releases_in_two_sends() {
        let (state, transport) = shared(ControllerKind::ProController);
        button_push(
            &state,
            &[Button::Left, Button::Right, Button::B],
            Duration::from_millis(100),
        )
        .await
        .unwrap();

        let sent = transport.reports();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].buttons, vec!["b", "right", "left"]);
        assert!(sent[1].buttons.is_empty());
    }

    #[tokio::test]
    async fn button_push_rejects_unavailable_buttons_before_pressing() {
        let (state, transport) = shared(ControllerKind::JoyconR);
        let result = button_push(&state, &[Button::A, Button::Zl], Duration::ZERO).await;
        assert!(matches!(result, Err(StateError::ButtonUnavailable { .. })));
        assert!(!state.borrow().button_state.get(Button::A));
        assert!(transport.reports().is_empty());
    }

    /// Fails its first send, then behaves
    #[derive(Default)]
    struct FailOnceTransport {
        failed: std::cell::Cell<bool>,
    }

    #[async_trait::async_trait(?Send)]
    impl Transport for FailOnceTransport {
        async fn send(&self, _report: &InputReport) -> Result<(), TransportError> {
            if self.failed.replace(true) {
                Ok(())
            } else {
                Err(TransportError::Publish("transient".to_string()))
            }
        }

        fn name(&self) -> &str {
            "fail-once"
        }
    }

    #[tokio::test]
    async fn failed_press_send_releases_the_buttons() {
        let state = ControllerState::new(
            ControllerKind::ProController,
            Rc::new(FailOnceTransport::default()),
        )
        .into_shared();

        let result = button_push(&state, &[Button::A], Duration::from_millis(100)).await;
        assert!(matches!(
            result,
            Err(StateError::Transport(TransportError::Publish(_)))
        ));
        assert_eq!(state.borrow().button_state.pressed().count(), 0);
    }

    #[tokio::test]
    async fn send_state_surfaces_not_connected() {
        let (state, transport) = shared(ControllerKind::ProController);
        transport.disconnect();
        assert!(matches!(
            send_state(&state).await,
            Err(TransportError::NotConnected)
        ));
    }
}
