use async_trait::async_trait;
use std::cell::Cell;
use tracing::info;

use super::{Transport, TransportError};
use crate::state::InputReport;

/// Dry run transport: every report is written to the log instead of a device
#[derive(Debug, Default)]
pub struct LogTransport {
    sent: Cell<u64>,
}

impl LogTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> u64 {
        self.sent.get()
    }
}

#[async_trait(?Send)]
impl Transport for LogTransport {
    async fn send(&self, report: &InputReport) -> Result<(), TransportError> {
        self.sent.set(self.sent.get() + 1);
        info!(
            "[{}] {} buttons:{:?} L:({},{}) R:({},{})",
            self.sent.get(),
            report.controller,
            report.buttons,
            report.left_stick.h(),
            report.left_stick.v(),
            report.right_stick.h(),
            report.right_stick.v()
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}
