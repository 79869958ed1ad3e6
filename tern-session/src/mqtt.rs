//! [`Transport`] over the `tern-client` MQTT client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tern_client::{
    BrokerAddress, ClientError, ConnectOptions, DisconnectReason, Event, MqttClient,
};
use tern_core::qos::QoS;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::transport::{Listener, OpenOptions, Transport, TransportError, TransportEvent, TransportHandle};

impl From<ClientError> for TransportError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::ConnectionRefused(code) => TransportError::Refused(code.to_string()),
            ClientError::Timeout => TransportError::Timeout,
            ClientError::InvalidTopic(e) => TransportError::InvalidTopic(e.to_string()),
            ClientError::Disconnected => TransportError::Closed,
            other => TransportError::Failed(other.to_string()),
        }
    }
}

/// Opens plain TCP MQTT connections.
#[derive(Debug, Clone)]
pub struct MqttTransport {
    operation_timeout: Duration,
}

impl Default for MqttTransport {
    fn default() -> Self {
        MqttTransport {
            operation_timeout: Duration::from_secs(10),
        }
    }
}

impl MqttTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound on waiting for a SUBACK, PUBACK or PUBCOMP.
    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }
}

#[async_trait]
impl Transport for MqttTransport {
    type Handle = MqttHandle;

    async fn open(
        &self,
        address: &BrokerAddress,
        client_id: &str,
        options: &OpenOptions,
    ) -> Result<MqttHandle, TransportError> {
        let connect_options = ConnectOptions::with_address(address.clone())
            .client_id(client_id)
            .clean_session(options.clean_session)
            .keep_alive(options.keep_alive)
            .connect_timeout(options.connect_timeout)
            .operation_timeout(self.operation_timeout);

        let client = MqttClient::connect(connect_options).await?;

        Ok(MqttHandle {
            client: Arc::new(client),
            forwarder: None,
        })
    }
}

/// A connected [`MqttClient`].
///
/// Inbound events are pumped from the client into the registered listener
/// by a forwarding task that lives as long as the handle.
pub struct MqttHandle {
    client: Arc<MqttClient>,
    forwarder: Option<JoinHandle<()>>,
}

impl MqttHandle {
    fn stop_forwarding(&mut self) {
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
    }
}

async fn forward(client: Arc<MqttClient>, listener: Listener) {
    while let Some(event) = client.recv().await {
        let event = match event {
            Event::Message { topic, payload, .. } => TransportEvent::Message { topic, payload },
            Event::Disconnected {
                reason: DisconnectReason::ClientInitiated,
            } => break,
            Event::Disconnected { reason } => {
                let _ = listener
                    .deliver(TransportEvent::ConnectionLost {
                        cause: reason.to_string(),
                    })
                    .await;
                break;
            }
        };

        if !listener.deliver(event).await {
            break;
        }
    }

    debug!("Event forwarding for `{}` stopped", client.client_id());
}

#[async_trait]
impl TransportHandle for MqttHandle {
    fn register_listener(&mut self, listener: Listener) {
        self.stop_forwarding();
        self.forwarder = Some(tokio::spawn(forward(self.client.clone(), listener)));
    }

    async fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<QoS, TransportError> {
        let results = self.client.subscribe(&[(topic, qos)]).await?;

        results
            .first()
            .and_then(|result| result.granted())
            .ok_or_else(|| TransportError::Rejected(format!("subscription to `{}` refused", topic)))
    }

    async fn publish(
        &mut self,
        topic: &str,
        payload: Bytes,
        qos: QoS,
        retained: bool,
    ) -> Result<(), TransportError> {
        self.client
            .publish_with_retain(topic, payload, qos, retained)
            .await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.stop_forwarding();
        self.client.disconnect().await?;
        Ok(())
    }
}

impl Drop for MqttHandle {
    fn drop(&mut self) {
        self.stop_forwarding();
    }
}
