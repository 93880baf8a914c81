//! Gamepad pipeline feeding the controller state
//!
//! 1. [`event_collector`] - blocking gamepad poll bridged onto a queue
//! 2. [`event_translator`] - queue consumer mutating the controller state
//! 3. [`dispatcher`] - periodic, coalesced send of the state
//! 4. [`controller_handle`] - wiring and lifecycle
//!
//! # Architecture
//!
//! ```text
//!  poll thread              single threaded scheduler
//! ┌───────────┐  mpsc   ┌────────────┐ dirty ┌────────────┐
//! │ gilrs poll│ ──────► │ translator │ ────► │ dispatcher │ ──► Transport
//! └───────────┘         └────────────┘       └────────────┘
//! ```

pub mod controller_handle;
pub mod dispatcher;
pub mod event_collector;
pub mod event_translator;

pub use controller_handle::{ControllerError, ControllerHandle, ControllerSettings};
pub use event_collector::{CollectorError, EventCollector, RawInputEvent};
