//! Return codes carried by MQTT 3.x acknowledgement packets.

use core::fmt;

use crate::{error::Error, qos::QoS};

/// CONNACK return code.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum ConnectReturnCode {
    #[default]
    Accepted = 0x00,
    UnacceptableProtocolVersion = 0x01,
    IdentifierRejected = 0x02,
    ServerUnavailable = 0x03,
    BadUsernameOrPassword = 0x04,
    NotAuthorized = 0x05,
}

impl ConnectReturnCode {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ConnectReturnCode::Accepted)
    }
}

impl TryFrom<u8> for ConnectReturnCode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use ConnectReturnCode::*;

        let code = match value {
            0x00 => Accepted,
            0x01 => UnacceptableProtocolVersion,
            0x02 => IdentifierRejected,
            0x03 => ServerUnavailable,
            0x04 => BadUsernameOrPassword,
            0x05 => NotAuthorized,
            _ => return Err(Error::ProtocolError("unknown CONNACK return code")),
        };

        Ok(code)
    }
}

impl fmt::Display for ConnectReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ConnectReturnCode::*;

        let msg = match self {
            Accepted => "Connection accepted",
            UnacceptableProtocolVersion => "Unacceptable protocol version",
            IdentifierRejected => "Identifier rejected",
            ServerUnavailable => "Server unavailable",
            BadUsernameOrPassword => "Bad user name or password",
            NotAuthorized => "Not authorized",
        };

        write!(f, "{}", msg)
    }
}

/// Per-filter SUBACK return code.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SubscribeReturnCode {
    Granted(QoS),
    Failure,
}

impl SubscribeReturnCode {
    const FAILURE: u8 = 0x80;

    pub fn to_byte(self) -> u8 {
        match self {
            SubscribeReturnCode::Granted(qos) => qos as u8,
            SubscribeReturnCode::Failure => Self::FAILURE,
        }
    }
}

impl TryFrom<u8> for SubscribeReturnCode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if value == Self::FAILURE {
            return Ok(SubscribeReturnCode::Failure);
        }

        QoS::try_from(value)
            .map(SubscribeReturnCode::Granted)
            .map_err(|_| Error::ProtocolError("unknown SUBACK return code"))
    }
}
