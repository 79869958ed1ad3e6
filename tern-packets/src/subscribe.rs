use bytes::{Buf, BytesMut};

use tern_core::{
    codec::{Decoder, Encoder},
    error::Error,
    qos::QoS,
};

use crate::{FixedHeader, PacketType};

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct SubscribeFilter {
    pub topic_filter: String,
    pub qos: QoS,
}

impl Encoder for SubscribeFilter {
    fn encode(&self, buffer: &mut BytesMut) {
        self.topic_filter.encode(buffer);
        (self.qos as u8).encode(buffer);
    }

    fn encoded_size(&self) -> usize {
        self.topic_filter.encoded_size() + 1
    }
}

impl Decoder for SubscribeFilter {
    fn decode<T: Buf>(buffer: &mut T) -> crate::Result<Self> {
        let topic_filter = String::decode(buffer)?;
        let options = u8::decode(buffer)?;

        if options & 0b1111_1100 != 0 {
            return Err(Error::MalformedPacket("reserved subscription option bits set"));
        }

        Ok(SubscribeFilter {
            topic_filter,
            qos: QoS::try_from(options)?,
        })
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct SubscribePacket {
    pub packet_id: u16,
    pub filters: Vec<SubscribeFilter>,
}

const SUBSCRIBE_FLAGS: u8 = 0b0010;

impl Encoder for SubscribePacket {
    fn encode(&self, buffer: &mut BytesMut) {
        let remaining_len = self.packet_id.encoded_size() + self.filters.encoded_size();

        FixedHeader::encode(PacketType::Subscribe, SUBSCRIBE_FLAGS, remaining_len, buffer);

        self.packet_id.encode(buffer);
        self.filters.encode(buffer);
    }
}

impl Decoder for SubscribePacket {
    fn decode<T: Buf>(buffer: &mut T) -> crate::Result<Self> {
        let header = FixedHeader::decode(buffer)?;

        if header.flags != SUBSCRIBE_FLAGS {
            return Err(Error::MalformedPacket("invalid fixed header flags"));
        }

        let next_packet = buffer.remaining() - header.remaining_len;
        let packet_id = u16::decode(buffer)?;

        let mut filters = Vec::new();
        while buffer.remaining() > next_packet {
            filters.push(SubscribeFilter::decode(buffer)?);
        }

        if filters.is_empty() {
            return Err(Error::ProtocolError("SUBSCRIBE without topic filters"));
        }

        Ok(SubscribePacket { packet_id, filters })
    }
}
