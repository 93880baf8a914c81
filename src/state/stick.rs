use serde::Serialize;

use super::StateError;

/// Largest raw value of a 12 bit stick axis.
pub const STICK_MAX: u16 = 0x0FFF;
/// Raw value of a centered stick axis.
pub const STICK_CENTER: u16 = 0x0800;

/// Raw position of one analog stick
///
/// Both axes are 12 bit values. Horizontal grows to the right, vertical grows
/// upwards, so `set_up` pushes `v` to [`STICK_MAX`] and `set_down` to zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct StickState {
    h: u16,
    v: u16,
}

impl Default for StickState {
    fn default() -> Self {
        Self {
            h: STICK_CENTER,
            v: STICK_CENTER,
        }
    }
}

impl StickState {
    pub fn h(&self) -> u16 {
        self.h
    }

    pub fn v(&self) -> u16 {
        self.v
    }

    pub fn set_h(&mut self, value: i64) -> Result<(), StateError> {
        self.h = to_raw(value)?;
        Ok(())
    }

    pub fn set_v(&mut self, value: i64) -> Result<(), StateError> {
        self.v = to_raw(value)?;
        Ok(())
    }

    /// Sets the horizontal axis from a normalized gamepad value, -1.0 is full left
    pub fn set_h_float(&mut self, value: f32) -> Result<(), StateError> {
        self.h = float_to_raw(value)?;
        Ok(())
    }

    /// Sets the vertical axis from a normalized gamepad value, -1.0 is full down
    pub fn set_v_float(&mut self, value: f32) -> Result<(), StateError> {
        self.v = float_to_raw(value)?;
        Ok(())
    }

    pub fn set_center(&mut self) {
        self.h = STICK_CENTER;
        self.v = STICK_CENTER;
    }

    pub fn set_up(&mut self) {
        self.h = STICK_CENTER;
        self.v = STICK_MAX;
    }

    pub fn set_down(&mut self) {
        self.h = STICK_CENTER;
        self.v = 0;
    }

    pub fn set_left(&mut self) {
        self.h = 0;
        self.v = STICK_CENTER;
    }

    pub fn set_right(&mut self) {
        self.h = STICK_MAX;
        self.v = STICK_CENTER;
    }
}

fn to_raw(value: i64) -> Result<u16, StateError> {
    if (0..=i64::from(STICK_MAX)).contains(&value) {
        Ok(value as u16)
    } else {
        Err(StateError::StickOutOfRange(value))
    }
}

fn float_to_raw(value: f32) -> Result<u16, StateError> {
    if !value.is_finite() {
        return Err(StateError::InvalidAxisValue(value));
    }
    let normalized = (value.clamp(-1.0, 1.0) + 1.0) / 2.0;
    Ok((normalized * f32::from(STICK_MAX)).round() as u16)
}
