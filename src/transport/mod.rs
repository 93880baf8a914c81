//! Outbound delivery of controller state
//!
//! A [`Transport`] receives one [`InputReport`] per send. Implementations
//! run inside the session's single threaded scheduler and therefore do not
//! need to be `Send`.
//!
//! ```text
//! ControllerState ──report()──► Transport::send ──► log / MQTT broker
//! ```

pub mod log_transport;
pub mod mqtt;
#[cfg(test)]
pub mod testing;

use async_trait::async_trait;
use std::time::Duration;

use crate::state::InputReport;
pub use log_transport::LogTransport;
pub use mqtt::MqttTransport;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The link to the receiving side is gone; the session has to end
    #[error("Not connected")]
    NotConnected,

    #[error("Connection attempt timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("Failed to encode report: {0}")]
    Encode(String),

    #[error("Failed to publish report: {0}")]
    Publish(String),
}

#[async_trait(?Send)]
pub trait Transport {
    /// Delivers one snapshot of the controller state
    async fn send(&self, report: &InputReport) -> Result<(), TransportError>;

    fn name(&self) -> &str;
}
