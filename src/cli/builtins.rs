//! Commands available in every session

use std::fmt::Write as _;

use super::parser::{CHAIN_DELIMITER, TERMINATOR};
use super::registry::{Arity, Builtin, CommandEntry, CommandError, CommandHandler, CommandRegistry};
use crate::state::{Button, ControllerState, StickState};

pub(super) fn entries() -> Vec<CommandEntry> {
    let builtin = |name: &str, builtin, arity, description: &str| CommandEntry {
        name: name.to_string(),
        arity,
        description: Some(description.to_string()),
        handler: CommandHandler::Builtin(builtin),
    };
    vec![
        builtin(
            "help",
            Builtin::Help,
            Arity::exactly(0),
            "help - Lists the button names and all commands.",
        ),
        builtin(
            "stick",
            Builtin::Stick,
            Arity::range(2, 3),
            "stick <side> <direction> [value] - Sets a stick position.\n  \
             side: 'l', 'left' for the left stick; 'r', 'right' for the right stick\n  \
             direction: 'center', 'up', 'down', 'left', 'right';\n  \
             'h', 'horizontal' or 'v', 'vertical' to set the axis to value (0-4095)",
        ),
        builtin(
            "hold",
            Builtin::Hold,
            Arity::at_least(1),
            "hold <buttons...> - Presses the buttons until they are released.",
        ),
        builtin(
            "release",
            Builtin::Release,
            Arity::at_least(1),
            "release <buttons...> - Releases held buttons.",
        ),
        builtin(
            "state",
            Builtin::State,
            Arity::exactly(0),
            "state - Shows pressed buttons and stick positions.",
        ),
    ]
}

pub fn help(registry: &CommandRegistry, state: &ControllerState) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Button commands:");
    let buttons: Vec<&str> = state.button_state.available_buttons().collect();
    let _ = writeln!(out, "{}", buttons.join(", "));
    let _ = writeln!(out);
    let _ = writeln!(out, "Commands:");
    for entry in registry.entries() {
        if let Some(description) = &entry.description {
            let _ = writeln!(out, "{}", description);
        }
    }
    let _ = writeln!(out, "Commands can be chained using \"{}\"", CHAIN_DELIMITER);
    let _ = write!(out, "Type \"{}\" to close.", TERMINATOR);
    out
}

pub fn stick(state: &mut ControllerState, args: &[String]) -> Result<String, CommandError> {
    let (side, direction, value) = match args {
        [side, direction] => (side.as_str(), direction.as_str(), None),
        [side, direction, value] => (side.as_str(), direction.as_str(), Some(value.as_str())),
        _ => {
            return Err(CommandError::InvalidArgument(
                "stick expects a side, a direction and an optional value".to_string(),
            ))
        }
    };

    let (label, stick) = match side {
        "l" | "left" => ("Left stick", &mut state.l_stick),
        "r" | "right" => ("Right stick", &mut state.r_stick),
        _ => {
            return Err(CommandError::InvalidArgument(
                "Value of side must be \"l\", \"left\" or \"r\", \"right\"".to_string(),
            ))
        }
    };
    set_stick(stick, direction, value)?;
    Ok(format!("{} was set to ({}, {}).", label, stick.h(), stick.v()))
}

fn set_stick(stick: &mut StickState, direction: &str, value: Option<&str>) -> Result<(), CommandError> {
    match direction {
        "center" => stick.set_center(),
        "up" => stick.set_up(),
        "down" => stick.set_down(),
        "left" => stick.set_left(),
        "right" => stick.set_right(),
        "h" | "horizontal" => stick.set_h(parse_stick_value(value)?)?,
        "v" | "vertical" => stick.set_v(parse_stick_value(value)?)?,
        other => {
            return Err(CommandError::InvalidArgument(format!(
                "Unexpected argument \"{}\"",
                other
            )))
        }
    }
    Ok(())
}

fn parse_stick_value(value: Option<&str>) -> Result<i64, CommandError> {
    let value = value.ok_or_else(|| CommandError::InvalidArgument("Missing value".to_string()))?;
    value
        .parse()
        .map_err(|_| CommandError::InvalidArgument(format!("Unexpected stick value \"{}\"", value)))
}

/// Sets every named button to `pushed`; nothing changes if one name is invalid
pub fn set_buttons(
    state: &mut ControllerState,
    names: &[String],
    pushed: bool,
) -> Result<(), CommandError> {
    let buttons = names
        .iter()
        .map(|name| {
            state.button_state.available(name).ok_or_else(|| {
                CommandError::InvalidArgument(format!(
                    "Unknown button \"{}\" for {}",
                    name,
                    state.kind()
                ))
            })
        })
        .collect::<Result<Vec<Button>, _>>()?;
    for button in buttons {
        state.button_state.set(button, pushed)?;
    }
    Ok(())
}

pub fn show_state(state: &ControllerState) -> String {
    let pressed: Vec<&str> = state.button_state.pressed().map(|b| b.name()).collect();
    format!(
        "{} buttons: [{}] left stick: ({}, {}) right stick: ({}, {})",
        state.kind(),
        pressed.join(", "),
        state.l_stick.h(),
        state.l_stick.v(),
        state.r_stick.h(),
        state.r_stick.v()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::stick::{STICK_CENTER, STICK_MAX};
    use crate::state::ControllerKind;
    use crate::transport::testing::RecordingTransport;
    use std::rc::Rc;

    fn state() -> ControllerState {
        ControllerState::new(
            ControllerKind::ProController,
            Rc::new(RecordingTransport::default()),
        )
    }

    fn args(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn stick_directions_and_raw_values() {
        let mut state = state();
        let out = stick(&mut state, &args(&["l", "up"])).unwrap();
        assert_eq!(out, format!("Left stick was set to ({}, {}).", STICK_CENTER, STICK_MAX));

        stick(&mut state, &args(&["right", "horizontal", "100"])).unwrap();
        assert_eq!(state.r_stick.h(), 100);
    }

    #[test]
    fn stick_argument_errors_leave_state_untouched() {
        let mut state = state();
        let before = (state.l_stick, state.r_stick);
        for bad in [
            vec!["l", "h"],
            vec!["l", "v", "abc"],
            vec!["l", "sideways"],
            vec!["l", "h", "5000"],
            vec!["middle", "up"],
        ] {
            let result = stick(&mut state, &args(&bad));
            assert!(result.is_err(), "{:?}", bad);
        }
        assert_eq!((state.l_stick, state.r_stick), before);
    }

    #[test]
    fn stick_error_messages() {
        let mut state = state();
        let err = stick(&mut state, &args(&["l", "h"])).unwrap_err();
        assert_eq!(err.to_string(), "Missing value");
        let err = stick(&mut state, &args(&["l", "v", "abc"])).unwrap_err();
        assert_eq!(err.to_string(), "Unexpected stick value \"abc\"");
        let err = stick(&mut state, &args(&["l", "sideways"])).unwrap_err();
        assert_eq!(err.to_string(), "Unexpected argument \"sideways\"");
    }

    #[test]
    fn set_buttons_is_all_or_nothing() {
        let mut state = state();
        assert!(set_buttons(&mut state, &args(&["a", "nope"]), true).is_err());
        assert!(!state.button_state.get(Button::A));

        set_buttons(&mut state, &args(&["a", "zr"]), true).unwrap();
        assert!(state.button_state.get(Button::A));
        assert!(state.button_state.get(Button::Zr));
        set_buttons(&mut state, &args(&["a"]), false).unwrap();
        assert!(!state.button_state.get(Button::A));
    }

    #[test]
    fn help_lists_buttons_and_descriptions() {
        let registry = CommandRegistry::with_builtins();
        let text = help(&registry, &state());
        assert!(text.starts_with("Button commands:\ny, x, b, a"));
        assert!(text.contains("stick <side> <direction> [value]"));
        assert!(text.ends_with("Type \"exit\" to close."));
    }
}
