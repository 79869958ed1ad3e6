use bytes::{Buf, BytesMut};

use tern_core::{
    codec::{Decoder, Encoder},
    error::Error,
    protocol::ProtocolVersion,
};

use crate::{FixedHeader, PacketType};

const CLEAN_SESSION: u8 = 0b0000_0010;
const RESERVED: u8 = 0b0000_0001;
// will flag, will QoS, will retain, password, user name
const UNSUPPORTED: u8 = 0b1111_1100;

/// CONNECT as sent by this client: no will message and no credentials.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct ConnectPacket {
    pub protocol_version: ProtocolVersion,
    pub clean_session: bool,
    pub keep_alive: u16,
    pub client_id: String,
}

impl ConnectPacket {
    fn flags(&self) -> u8 {
        if self.clean_session {
            CLEAN_SESSION
        } else {
            0
        }
    }
}

impl Encoder for ConnectPacket {
    fn encode(&self, buffer: &mut BytesMut) {
        let protocol_name = self.protocol_version.protocol_name();
        let protocol_level = self.protocol_version.protocol_level();

        let mut remaining_len = 0;
        remaining_len += protocol_name.encoded_size();
        remaining_len += protocol_level.encoded_size();
        remaining_len += self.flags().encoded_size();
        remaining_len += self.keep_alive.encoded_size();
        remaining_len += self.client_id.encoded_size();

        FixedHeader::encode(PacketType::Connect, 0, remaining_len, buffer);

        // Variable header
        protocol_name.encode(buffer);
        protocol_level.encode(buffer);
        self.flags().encode(buffer);
        self.keep_alive.encode(buffer);

        // Payload
        self.client_id.encode(buffer);
    }
}

impl Decoder for ConnectPacket {
    fn decode<T: Buf>(buffer: &mut T) -> crate::Result<Self> {
        FixedHeader::decode(buffer)?;

        let protocol_name = String::decode(buffer)?;
        let protocol_level = u8::decode(buffer)?;
        let protocol_version = ProtocolVersion::from_name_and_level(&protocol_name, protocol_level)
            .ok_or(Error::ProtocolError("unsupported protocol version"))?;

        let flags = u8::decode(buffer)?;
        if flags & RESERVED != 0 {
            return Err(Error::MalformedPacket("reserved connect flag is set"));
        }
        if flags & UNSUPPORTED != 0 {
            return Err(Error::ProtocolError("will and credentials are not supported"));
        }

        let keep_alive = u16::decode(buffer)?;
        let client_id = String::decode(buffer)?;

        Ok(ConnectPacket {
            protocol_version,
            clean_session: flags & CLEAN_SESSION != 0,
            keep_alive,
            client_id,
        })
    }
}
