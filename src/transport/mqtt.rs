//! MQTT transport
//!
//! Publishes every report as JSON to one topic. The rumqttc event loop is
//! driven by its own task which mirrors the broker link into a
//! [`ConnectionState`] watch channel; `send` consults it and answers
//! [`TransportError::NotConnected`] once the link is gone.

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{Transport, TransportError};
use crate::config::MqttConfig;
use crate::state::InputReport;

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Connecting,
    Connected,
    Failed,
    Disconnected,
}

pub struct MqttTransport {
    client: AsyncClient,
    topic: String,
    status: watch::Receiver<ConnectionState>,
    event_loop: JoinHandle<()>,
}

impl MqttTransport {
    /// Connects to the broker and waits for its CONNACK
    pub async fn connect(config: &MqttConfig) -> Result<Self, TransportError> {
        info!(
            "Connecting to MQTT broker {}:{} as {}",
            config.host, config.port, config.client_id
        );
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
        if let Some(user) = &config.username {
            options.set_credentials(user, config.password.clone().unwrap_or_default());
        }

        let (client, event_loop) = AsyncClient::new(options, 100);
        let (status_tx, mut status) = watch::channel(ConnectionState::Connecting);
        let event_loop = tokio::spawn(drive_event_loop(event_loop, status_tx));

        let timeout = Duration::from_secs(config.connect_timeout_secs);
        let outcome = tokio::time::timeout(
            timeout,
            status.wait_for(|state| *state != ConnectionState::Connecting),
        )
        .await
        .map(|result| result.map(|state| *state));
        let state = match outcome {
            Ok(Ok(state)) => state,
            Ok(Err(_)) => ConnectionState::Failed,
            Err(_) => {
                event_loop.abort();
                return Err(TransportError::ConnectTimeout(timeout));
            }
        };
        if state != ConnectionState::Connected {
            error!("MQTT broker refused or dropped the connection");
            return Err(TransportError::NotConnected);
        }

        info!("MQTT transport ready, publishing to {}", config.topic);
        Ok(Self {
            client,
            topic: config.topic.clone(),
            status,
            event_loop,
        })
    }

    pub fn state(&self) -> ConnectionState {
        *self.status.borrow()
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        self.event_loop.abort();
    }
}

#[async_trait(?Send)]
impl Transport for MqttTransport {
    async fn send(&self, report: &InputReport) -> Result<(), TransportError> {
        if self.state() != ConnectionState::Connected {
            return Err(TransportError::NotConnected);
        }
        let payload =
            serde_json::to_vec(report).map_err(|e| TransportError::Encode(e.to_string()))?;
        self.client
            .publish(self.topic.clone(), QoS::AtMostOnce, false, payload)
            .await
            .map_err(|e| TransportError::Publish(e.to_string()))
    }

    fn name(&self) -> &str {
        "mqtt"
    }
}

// Runs until the link fails; a lost link is final for the session.
async fn drive_event_loop(mut event_loop: EventLoop, status: watch::Sender<ConnectionState>) {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                info!("MQTT connection acknowledged: {:?}", ack.code);
                status.send_replace(ConnectionState::Connected);
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                warn!("MQTT broker closed the connection");
                status.send_replace(ConnectionState::Disconnected);
                return;
            }
            Ok(event) => debug!("MQTT event: {:?}", event),
            Err(e) => {
                let next = match *status.borrow() {
                    ConnectionState::Connected => ConnectionState::Disconnected,
                    _ => ConnectionState::Failed,
                };
                error!("MQTT connection error: {}", e);
                status.send_replace(next);
                return;
            }
        }
    }
}
