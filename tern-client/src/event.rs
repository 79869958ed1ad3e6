use std::fmt;

use bytes::Bytes;
use tern_core::{qos::QoS, return_code::SubscribeReturnCode};

/// Events received from the MQTT broker.
#[derive(Debug, Clone)]
pub enum Event {
    /// A message was received on a subscribed topic.
    Message {
        topic: String,
        payload: Bytes,
        qos: QoS,
        retain: bool,
    },

    /// The client was disconnected from the broker.
    Disconnected { reason: DisconnectReason },
}

/// Reason for disconnection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Client initiated disconnect.
    ClientInitiated,

    /// Server closed the connection.
    ServerInitiated,

    /// Connection lost (network error).
    ConnectionLost(String),

    /// No PINGRESP arrived within the keep-alive period.
    KeepAliveTimeout,

    /// Protocol error.
    ProtocolError(String),
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::ClientInitiated => write!(f, "disconnected by client"),
            DisconnectReason::ServerInitiated => write!(f, "connection closed by broker"),
            DisconnectReason::ConnectionLost(cause) => write!(f, "connection lost: {}", cause),
            DisconnectReason::KeepAliveTimeout => write!(f, "keep-alive timeout"),
            DisconnectReason::ProtocolError(cause) => write!(f, "protocol error: {}", cause),
        }
    }
}

/// Result of a subscription request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeResult {
    pub topic: String,
    pub requested: QoS,
    pub return_code: SubscribeReturnCode,
}

impl SubscribeResult {
    pub fn is_success(&self) -> bool {
        matches!(self.return_code, SubscribeReturnCode::Granted(_))
    }

    /// QoS granted by the broker, which may be lower than requested.
    pub fn granted(&self) -> Option<QoS> {
        match self.return_code {
            SubscribeReturnCode::Granted(qos) => Some(qos),
            SubscribeReturnCode::Failure => None,
        }
    }
}
