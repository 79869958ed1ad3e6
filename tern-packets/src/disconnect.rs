use bytes::{Buf, BytesMut};

use tern_core::{
    codec::{Decoder, Encoder},
    error::Error,
};

use crate::{FixedHeader, PacketType};

/// In 3.x a DISCONNECT is only ever sent by the client and has no body.
#[derive(PartialEq, Eq, Debug, Clone, Copy, Default)]
pub struct DisconnectPacket {}

impl Encoder for DisconnectPacket {
    fn encode(&self, buffer: &mut BytesMut) {
        FixedHeader::encode(PacketType::Disconnect, 0, 0, buffer);
    }
}

impl Decoder for DisconnectPacket {
    fn decode<T: Buf>(buffer: &mut T) -> crate::Result<Self> {
        let header = FixedHeader::decode(buffer)?;

        if header.remaining_len != 0 {
            return Err(Error::MalformedPacket("disconnect carries no body"));
        }

        Ok(DisconnectPacket {})
    }
}

#[cfg(test)]
mod tests {
    use bytes::{Bytes, BytesMut};

    use crate::disconnect::*;

    #[test]
    fn test_disconnect_packet_encode_decode() {
        let expected = vec![0xe0, 0x00];

        let mut encoded = BytesMut::new();
        DisconnectPacket {}.encode(&mut encoded);
        assert_eq!(encoded.to_vec(), expected);

        let mut bytes = Bytes::from(expected);
        assert!(DisconnectPacket::decode(&mut bytes).is_ok());
    }
}
