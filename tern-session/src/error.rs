use std::time::Duration;

use tern_client::AddressError;
use tern_core::topic::TopicError;
use thiserror::Error;

/// Why a connect attempt did not produce a connection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    #[error("invalid broker address: {0}")]
    InvalidAddress(#[from] AddressError),

    #[error("already connected")]
    AlreadyConnected,

    #[error("a connect attempt is already in progress")]
    InProgress,

    #[error("broker refused the connection: {0}")]
    Refused(String),

    #[error("{0}")]
    Transport(String),

    #[error("no confirmation from broker within {0:?}")]
    Timeout(Duration),

    #[error("connect attempt aborted by disconnect")]
    Aborted,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubscribeError {
    #[error("not connected")]
    NotConnected,

    #[error("invalid topic filter: {0}")]
    InvalidFilter(#[from] TopicError),

    #[error("broker rejected the subscription: {0}")]
    Rejected(String),

    #[error("{0}")]
    Transport(String),
}

/// Errors returned by [`Session`](crate::Session) operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("connection failed: {0}")]
    Connection(#[from] ConnectError),

    #[error("subscription failed: {0}")]
    Subscription(#[from] SubscribeError),

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("not connected")]
    NotConnected,

    #[error("failed to close connection: {0}")]
    TransportClose(String),

    #[error("session has shut down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, SessionError>;
