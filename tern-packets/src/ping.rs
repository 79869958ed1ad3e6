use bytes::{Buf, BytesMut};

use tern_core::{
    codec::{Decoder, Encoder},
    error::Error,
};

use crate::{FixedHeader, PacketType};

fn decode_empty<T: Buf>(buffer: &mut T) -> crate::Result<()> {
    let header = FixedHeader::decode(buffer)?;

    if header.flags != 0 || header.remaining_len != 0 {
        return Err(Error::MalformedPacket("ping packets carry no body"));
    }

    Ok(())
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub struct PingReqPacket {}

impl Encoder for PingReqPacket {
    fn encode(&self, buffer: &mut BytesMut) {
        FixedHeader::encode(PacketType::PingReq, 0, 0, buffer);
    }
}

impl Decoder for PingReqPacket {
    fn decode<T: Buf>(buffer: &mut T) -> crate::Result<Self> {
        decode_empty(buffer)?;
        Ok(Self {})
    }
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub struct PingRespPacket {}

impl Encoder for PingRespPacket {
    fn encode(&self, buffer: &mut BytesMut) {
        FixedHeader::encode(PacketType::PingResp, 0, 0, buffer);
    }
}

impl Decoder for PingRespPacket {
    fn decode<T: Buf>(buffer: &mut T) -> crate::Result<Self> {
        decode_empty(buffer)?;
        Ok(Self {})
    }
}
