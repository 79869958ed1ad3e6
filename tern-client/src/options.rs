use std::time::Duration;

use tern_core::codec::MAX_STRING_LENGTH;
use tern_core::protocol::ProtocolVersion;

use crate::address::BrokerAddress;
use crate::error::{ClientError, Result};

/// Options for connecting to an MQTT broker.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub(crate) address: BrokerAddress,
    pub(crate) client_id: String,
    pub(crate) keep_alive: u16,
    pub(crate) clean_session: bool,
    pub(crate) protocol_version: ProtocolVersion,
    pub(crate) protocol_fallback: bool,
    pub(crate) connect_timeout: Duration,
    pub(crate) operation_timeout: Duration,
}

impl ConnectOptions {
    /// Create new connection options for the given host and port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self::with_address(BrokerAddress::new(host, port))
    }

    /// Create new connection options for a parsed broker address.
    pub fn with_address(address: BrokerAddress) -> Self {
        Self {
            address,
            client_id: String::new(),
            keep_alive: 60,
            clean_session: true,
            protocol_version: ProtocolVersion::V3_1_1,
            protocol_fallback: true,
            connect_timeout: Duration::from_secs(30),
            operation_timeout: Duration::from_secs(10),
        }
    }

    pub fn address(&self) -> &BrokerAddress {
        &self.address
    }

    /// Set the client ID. An empty ID asks the broker to assign one, which
    /// 3.1.1 only allows together with a clean session.
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    /// Set the keep-alive interval in seconds. Zero disables keep-alive.
    pub fn keep_alive(mut self, seconds: u16) -> Self {
        self.keep_alive = seconds;
        self
    }

    /// Set the clean session flag. If true, the broker discards any state it
    /// kept for this client ID.
    pub fn clean_session(mut self, clean: bool) -> Self {
        self.clean_session = clean;
        self
    }

    /// Set the MQTT protocol version to start the handshake with.
    pub fn protocol_version(mut self, version: ProtocolVersion) -> Self {
        self.protocol_version = version;
        self
    }

    /// Retry with the next older protocol version when the broker answers
    /// "unacceptable protocol version".
    pub fn protocol_fallback(mut self, enabled: bool) -> Self {
        self.protocol_fallback = enabled;
        self
    }

    /// Bound on TCP connect plus CONNACK, per attempted protocol version.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Bound on waiting for a SUBACK, PUBACK or PUBCOMP.
    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Check the options against what a CONNECT packet can carry.
    pub fn validate(&self) -> Result<()> {
        if self.client_id.len() > MAX_STRING_LENGTH {
            return Err(ClientError::InvalidClientId(format!(
                "{} bytes exceeds the maximum of {}",
                self.client_id.len(),
                MAX_STRING_LENGTH
            )));
        }

        if self.client_id.is_empty() && !self.clean_session {
            return Err(ClientError::InvalidClientId(
                "an empty client id requires a clean session".into(),
            ));
        }

        Ok(())
    }
}
