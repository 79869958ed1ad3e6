use bytes::{Buf, BytesMut};

use tern_core::{
    codec::{Decoder, Encoder},
    error::Error,
    return_code::SubscribeReturnCode,
};

use crate::{FixedHeader, PacketType};

/// SUBACK: one return code per filter, in request order.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct SubAckPacket {
    pub packet_id: u16,
    pub return_codes: Vec<SubscribeReturnCode>,
}

impl Encoder for SubAckPacket {
    fn encode(&self, buffer: &mut BytesMut) {
        let remaining_len = self.packet_id.encoded_size() + self.return_codes.len();

        FixedHeader::encode(PacketType::SubAck, 0, remaining_len, buffer);

        self.packet_id.encode(buffer);
        for code in &self.return_codes {
            code.to_byte().encode(buffer);
        }
    }
}

impl Decoder for SubAckPacket {
    fn decode<T: Buf>(buffer: &mut T) -> crate::Result<Self> {
        let header = FixedHeader::decode(buffer)?;

        if header.remaining_len < 3 {
            return Err(Error::MalformedPacket("SUBACK without return codes"));
        }

        let packet_id = u16::decode(buffer)?;
        let return_codes = (2..header.remaining_len)
            .map(|_| SubscribeReturnCode::try_from(buffer.get_u8()))
            .collect::<crate::Result<Vec<_>>>()?;

        Ok(SubAckPacket {
            packet_id,
            return_codes,
        })
    }
}
