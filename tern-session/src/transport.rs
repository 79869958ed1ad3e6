//! The capability a session needs from a broker connection.
//!
//! A [`Transport`] opens connections; each open connection is a
//! [`TransportHandle`] owned by exactly one session. Inbound traffic flows
//! back to the session through the [`Listener`] registered on the handle.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tern_client::BrokerAddress;
use tern_core::qos::QoS;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection refused: {0}")]
    Refused(String),

    #[error("connection failed: {0}")]
    Failed(String),

    #[error("timed out waiting for the broker")]
    Timeout,

    #[error("invalid topic: {0}")]
    InvalidTopic(String),

    #[error("rejected by broker: {0}")]
    Rejected(String),

    #[error("connection closed")]
    Closed,
}

/// Connection settings passed to [`Transport::open`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenOptions {
    pub clean_session: bool,
    pub keep_alive: u16,
    pub connect_timeout: Duration,
}

/// Asynchronous notifications from an open connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Message { topic: String, payload: Bytes },
    ConnectionLost { cause: String },
}

#[derive(Debug)]
pub(crate) struct TaggedEvent {
    pub epoch: u64,
    pub event: TransportEvent,
}

/// Delivers events into the session that registered it.
///
/// Every listener is bound to one connection. Once the session has released
/// that connection, its events are dropped on arrival.
#[derive(Debug, Clone)]
pub struct Listener {
    epoch: u64,
    tx: mpsc::Sender<TaggedEvent>,
}

impl Listener {
    pub(crate) fn new(epoch: u64, tx: mpsc::Sender<TaggedEvent>) -> Self {
        Listener { epoch, tx }
    }

    /// Returns false once the session is gone.
    pub async fn deliver(&self, event: TransportEvent) -> bool {
        self.tx
            .send(TaggedEvent {
                epoch: self.epoch,
                event,
            })
            .await
            .is_ok()
    }
}

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    type Handle: TransportHandle;

    /// Open a connection and complete the broker handshake.
    async fn open(
        &self,
        address: &BrokerAddress,
        client_id: &str,
        options: &OpenOptions,
    ) -> Result<Self::Handle, TransportError>;
}

#[async_trait]
pub trait TransportHandle: Send + 'static {
    /// Start delivering inbound events to `listener`, replacing any earlier one.
    fn register_listener(&mut self, listener: Listener);

    /// Subscribe to a single filter. Returns the QoS granted by the broker.
    async fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<QoS, TransportError>;

    async fn publish(
        &mut self,
        topic: &str,
        payload: Bytes,
        qos: QoS,
        retained: bool,
    ) -> Result<(), TransportError>;

    /// Shut the connection down. The handle is dropped afterwards either way.
    async fn close(&mut self) -> Result<(), TransportError>;
}
