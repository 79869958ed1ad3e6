use tern_core::{return_code::ConnectReturnCode, topic::TopicError};
use thiserror::Error;

/// Errors that can occur in the MQTT client.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection refused: {0}")]
    ConnectionRefused(ConnectReturnCode),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Packet error: {0}")]
    Packet(#[from] tern_core::error::Error),

    #[error("Timeout")]
    Timeout,

    #[error("Client disconnected")]
    Disconnected,

    #[error("Invalid topic: {0}")]
    InvalidTopic(#[from] TopicError),

    #[error("Invalid client id: {0}")]
    InvalidClientId(String),

    #[error("Invalid broker address: {0}")]
    InvalidAddress(#[from] crate::address::AddressError),
}

pub type Result<T> = std::result::Result<T, ClientError>;
