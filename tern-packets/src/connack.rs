use bytes::{Buf, BytesMut};

use tern_core::{
    codec::{Decoder, Encoder},
    error::Error,
    return_code::ConnectReturnCode,
};

use crate::{FixedHeader, PacketType};

#[derive(Default, Debug, PartialEq, Eq, Clone, Copy)]
pub struct ConnAckPacket {
    pub session_present: bool,
    pub return_code: ConnectReturnCode,
}

impl Encoder for ConnAckPacket {
    fn encode(&self, buffer: &mut BytesMut) {
        FixedHeader::encode(PacketType::ConnAck, 0, 2, buffer);

        (self.session_present as u8).encode(buffer);
        (self.return_code as u8).encode(buffer);
    }
}

impl Decoder for ConnAckPacket {
    fn decode<T: Buf>(buffer: &mut T) -> crate::Result<Self> {
        let header = FixedHeader::decode(buffer)?;

        if header.remaining_len != 2 {
            return Err(Error::MalformedPacket("CONNACK must be two bytes"));
        }

        let flags = u8::decode(buffer)?;
        if flags & 0b1111_1110 != 0 {
            return Err(Error::MalformedPacket("reserved CONNACK flags are set"));
        }

        let return_code = ConnectReturnCode::try_from(u8::decode(buffer)?)?;

        Ok(ConnAckPacket {
            session_present: flags & 0b0000_0001 != 0,
            return_code,
        })
    }
}
