use bytes::{Buf, Bytes, BytesMut};

use tern_core::{
    codec::{Decoder, Encoder},
    error::Error,
    qos::QoS,
};

use crate::{FixedHeader, PacketType};

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct PublishPacket {
    pub dup: bool,
    pub qos: QoS,
    pub retain: bool,
    pub topic_name: String,
    /// Present only for QoS 1 and 2.
    pub packet_id: Option<u16>,
    pub payload: Bytes,
}

impl PublishPacket {
    fn flags(&self) -> u8 {
        let mut flags = (self.qos as u8) << 1;

        if self.dup {
            flags |= 0b1000;
        }

        if self.retain {
            flags |= 0b0001;
        }

        flags
    }
}

impl Encoder for PublishPacket {
    fn encode(&self, buffer: &mut BytesMut) {
        let mut remaining_len = 0;
        remaining_len += self.topic_name.encoded_size();
        remaining_len += self.packet_id.encoded_size();
        remaining_len += self.payload.len();

        FixedHeader::encode(PacketType::Publish, self.flags(), remaining_len, buffer);

        self.topic_name.encode(buffer);
        self.packet_id.encode(buffer);
        // The payload is not length-prefixed, it runs to the end of the packet.
        buffer.extend_from_slice(&self.payload);
    }
}

impl Decoder for PublishPacket {
    fn decode<T: Buf>(buffer: &mut T) -> crate::Result<Self> {
        let header = FixedHeader::decode(buffer)?;
        let start = buffer.remaining();

        let qos = QoS::try_from((header.flags & 0b0110) >> 1)?;
        let topic_name = String::decode(buffer)?;

        let packet_id = match qos {
            QoS::AtMostOnce => None,
            _ => match u16::decode(buffer)? {
                0 => return Err(Error::MalformedPacket("packet identifier cannot be zero")),
                id => Some(id),
            },
        };

        let consumed = start - buffer.remaining();
        let payload_len = header
            .remaining_len
            .checked_sub(consumed)
            .ok_or(Error::MalformedPacket("publish header exceeds remaining length"))?;

        Ok(PublishPacket {
            dup: header.flags & 0b1000 != 0,
            qos,
            retain: header.flags & 0b0001 != 0,
            topic_name,
            packet_id,
            payload: buffer.copy_to_bytes(payload_len),
        })
    }
}
