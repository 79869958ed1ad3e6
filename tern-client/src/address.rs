//! Scheme-qualified broker addresses (`tcp://host:port`).

use std::{fmt, str::FromStr};

use thiserror::Error;

pub const DEFAULT_PORT: u16 = 1883;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("missing scheme in `{0}`, expected tcp://host:port")]
    MissingScheme(String),

    #[error("unsupported scheme `{0}`")]
    UnsupportedScheme(String),

    #[error("missing host")]
    MissingHost,

    #[error("invalid port `{0}`")]
    InvalidPort(String),

    #[error("unexpected path `{0}`")]
    UnexpectedPath(String),
}

/// A broker endpoint. Only plain TCP is supported.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BrokerAddress {
    host: String,
    port: u16,
}

impl BrokerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        BrokerAddress {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port`, as accepted by `TcpStream::connect`.
    pub fn socket_addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for BrokerAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (scheme, rest) = s
            .split_once("://")
            .ok_or_else(|| AddressError::MissingScheme(s.to_string()))?;

        match scheme.to_ascii_lowercase().as_str() {
            "tcp" | "mqtt" => {}
            _ => return Err(AddressError::UnsupportedScheme(scheme.to_string())),
        }

        let authority = match rest.split_once('/') {
            Some((authority, "")) => authority,
            Some((_, path)) => return Err(AddressError::UnexpectedPath(path.to_string())),
            None => rest,
        };

        let (host, port) = if let Some(bracketed) = authority.strip_prefix('[') {
            let (host, tail) = bracketed
                .split_once(']')
                .ok_or(AddressError::MissingHost)?;
            match tail.strip_prefix(':') {
                Some(port) => (host, Some(port)),
                None if tail.is_empty() => (host, None),
                None => return Err(AddressError::InvalidPort(tail.to_string())),
            }
        } else {
            match authority.split_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (authority, None),
            }
        };

        if host.is_empty() {
            return Err(AddressError::MissingHost);
        }

        let port = match port {
            None => DEFAULT_PORT,
            Some(raw) => match raw.parse::<u16>() {
                Ok(port) if port != 0 => port,
                _ => return Err(AddressError::InvalidPort(raw.to_string())),
            },
        };

        Ok(BrokerAddress::new(host, port))
    }
}

impl fmt::Display for BrokerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tcp://{}", self.socket_addr())
    }
}
