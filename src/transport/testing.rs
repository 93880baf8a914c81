use async_trait::async_trait;
use std::cell::{Cell, RefCell};

use super::{Transport, TransportError};
use crate::state::InputReport;

/// Records sent reports; can be switched into the "not connected" state
#[derive(Debug)]
pub struct RecordingTransport {
    reports: RefCell<Vec<InputReport>>,
    connected: Cell<bool>,
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self {
            reports: RefCell::new(Vec::new()),
            connected: Cell::new(true),
        }
    }
}

impl RecordingTransport {
    pub fn reports(&self) -> Vec<InputReport> {
        self.reports.borrow().clone()
    }

    pub fn sends(&self) -> usize {
        self.reports.borrow().len()
    }

    pub fn disconnect(&self) {
        self.connected.set(false);
    }
}

#[async_trait(?Send)]
impl Transport for RecordingTransport {
    async fn send(&self, report: &InputReport) -> Result<(), TransportError> {
        if !self.connected.get() {
            return Err(TransportError::NotConnected);
        }
        self.reports.borrow_mut().push(report.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}
