//! MQTT protocol version handling.

use core::fmt;

/// MQTT protocol version spoken on a connection.
///
/// Only the 3.x family is supported. A client starts with 3.1.1 and may fall
/// back to 3.1 when the broker refuses the newer level.
#[repr(u8)]
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub enum ProtocolVersion {
    /// MQTT 3.1 - Protocol name "MQIsdp", level 3
    V3_1 = 3,
    /// MQTT 3.1.1 - Protocol name "MQTT", level 4
    #[default]
    V3_1_1 = 4,
}

impl ProtocolVersion {
    /// Returns the protocol name string for this version.
    pub fn protocol_name(&self) -> &'static str {
        match self {
            ProtocolVersion::V3_1 => "MQIsdp",
            ProtocolVersion::V3_1_1 => "MQTT",
        }
    }

    /// Returns the protocol level byte for this version.
    pub fn protocol_level(&self) -> u8 {
        *self as u8
    }

    /// The older version to retry with after the broker rejected this one.
    pub fn fallback(&self) -> Option<ProtocolVersion> {
        match self {
            ProtocolVersion::V3_1_1 => Some(ProtocolVersion::V3_1),
            ProtocolVersion::V3_1 => None,
        }
    }

    /// Attempts to determine the protocol version from protocol name and level.
    pub fn from_name_and_level(name: &str, level: u8) -> Option<ProtocolVersion> {
        match (name, level) {
            ("MQIsdp", 3) => Some(ProtocolVersion::V3_1),
            ("MQTT", 4) => Some(ProtocolVersion::V3_1_1),
            _ => None,
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolVersion::V3_1 => write!(f, "MQTT 3.1"),
            ProtocolVersion::V3_1_1 => write!(f, "MQTT 3.1.1"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_version_from_name_and_level() {
        assert_eq!(
            ProtocolVersion::from_name_and_level("MQIsdp", 3),
            Some(ProtocolVersion::V3_1)
        );
        assert_eq!(
            ProtocolVersion::from_name_and_level("MQTT", 4),
            Some(ProtocolVersion::V3_1_1)
        );
        assert_eq!(ProtocolVersion::from_name_and_level("MQTT", 5), None);
        assert_eq!(ProtocolVersion::from_name_and_level("MQIsdp", 4), None);
    }

    #[test]
    fn test_fallback_chain() {
        assert_eq!(ProtocolVersion::default(), ProtocolVersion::V3_1_1);
        assert_eq!(
            ProtocolVersion::V3_1_1.fallback(),
            Some(ProtocolVersion::V3_1)
        );
        assert_eq!(ProtocolVersion::V3_1.fallback(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(ProtocolVersion::V3_1.to_string(), "MQTT 3.1");
        assert_eq!(ProtocolVersion::V3_1_1.to_string(), "MQTT 3.1.1");
    }
}
