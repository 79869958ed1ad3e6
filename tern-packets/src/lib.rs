pub mod ack;
pub mod connack;
pub mod connect;
pub mod disconnect;
pub mod ping;
pub mod publish;
pub mod suback;
pub mod subscribe;

use bytes::{Buf, BufMut, BytesMut};

use tern_core::{
    codec::{Decoder, Encoder, VariableByteInteger},
    error::Error,
    Result,
};

use crate::{
    ack::{PubAckPacket, PubCompPacket, PubRecPacket, PubRelPacket},
    connack::ConnAckPacket,
    connect::ConnectPacket,
    disconnect::DisconnectPacket,
    ping::{PingReqPacket, PingRespPacket},
    publish::PublishPacket,
    suback::SubAckPacket,
    subscribe::SubscribePacket,
};

#[derive(PartialEq, Eq, Debug, Clone)]
pub enum ControlPacket {
    Connect(ConnectPacket),
    ConnAck(ConnAckPacket),
    Publish(PublishPacket),
    PubAck(PubAckPacket),
    PubRec(PubRecPacket),
    PubRel(PubRelPacket),
    PubComp(PubCompPacket),
    Subscribe(SubscribePacket),
    SubAck(SubAckPacket),
    PingReq(PingReqPacket),
    PingResp(PingRespPacket),
    Disconnect(DisconnectPacket),
}

#[repr(u8)]
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum PacketType {
    Connect = 0x01,
    ConnAck,
    Publish,
    PubAck,
    PubRec,
    PubRel,
    PubComp,
    Subscribe,
    SubAck,
    Unsubscribe,
    UnsubAck,
    PingReq,
    PingResp,
    Disconnect,
}

impl TryFrom<u8> for PacketType {
    type Error = Error;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        use PacketType::*;

        let res = match value {
            0x01 => Connect,
            0x02 => ConnAck,
            0x03 => Publish,
            0x04 => PubAck,
            0x05 => PubRec,
            0x06 => PubRel,
            0x07 => PubComp,
            0x08 => Subscribe,
            0x09 => SubAck,
            0x0a => Unsubscribe,
            0x0b => UnsubAck,
            0x0c => PingReq,
            0x0d => PingResp,
            0x0e => Disconnect,
            _ => return Err(Error::MalformedPacket("unknown packet type")),
        };

        Ok(res)
    }
}

/// Fixed header of every control packet: type nibble, flag nibble, remaining length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FixedHeader {
    pub flags: u8,
    pub remaining_len: usize,
}

impl FixedHeader {
    pub(crate) fn encode(packet_type: PacketType, flags: u8, remaining_len: usize, buffer: &mut BytesMut) {
        buffer.put_u8(((packet_type as u8) << 4) | (flags & 0x0f));
        VariableByteInteger(remaining_len as u32).encode(buffer);
    }

    pub(crate) fn decode<T: Buf>(buffer: &mut T) -> Result<Self> {
        let first = u8::decode(buffer)?;
        let remaining_len = VariableByteInteger::decode(buffer)?.0 as usize;

        if buffer.remaining() < remaining_len {
            return Err(Error::PacketIncomplete);
        }

        Ok(FixedHeader {
            flags: first & 0x0f,
            remaining_len,
        })
    }
}

impl ControlPacket {
    /// Returns the total length of the first packet in `src`, or
    /// `Error::PacketIncomplete` if it has not fully arrived yet.
    pub fn check(src: &[u8]) -> Result<usize> {
        let mut peeker = src;

        if peeker.is_empty() {
            return Err(Error::PacketIncomplete);
        }
        peeker.advance(1);

        let remaining_len = VariableByteInteger::decode(&mut peeker)?;
        let frame_len = 1 + remaining_len.encoded_size() + remaining_len.0 as usize;

        if src.len() >= frame_len {
            return Ok(frame_len);
        }

        Err(Error::PacketIncomplete)
    }

    /// Parses exactly one packet from the front of `src`.
    pub fn parse<T: Buf>(src: &mut T) -> Result<ControlPacket> {
        use ControlPacket::*;

        if !src.has_remaining() {
            return Err(Error::PacketIncomplete);
        }

        let packet_type = PacketType::try_from(src.chunk()[0] >> 4)?;

        let packet = match packet_type {
            PacketType::Connect => Connect(ConnectPacket::decode(src)?),
            PacketType::ConnAck => ConnAck(ConnAckPacket::decode(src)?),
            PacketType::Publish => Publish(PublishPacket::decode(src)?),
            PacketType::PubAck => PubAck(PubAckPacket::decode(src)?),
            PacketType::PubRec => PubRec(PubRecPacket::decode(src)?),
            PacketType::PubRel => PubRel(PubRelPacket::decode(src)?),
            PacketType::PubComp => PubComp(PubCompPacket::decode(src)?),
            PacketType::Subscribe => Subscribe(SubscribePacket::decode(src)?),
            PacketType::SubAck => SubAck(SubAckPacket::decode(src)?),
            PacketType::PingReq => PingReq(PingReqPacket::decode(src)?),
            PacketType::PingResp => PingResp(PingRespPacket::decode(src)?),
            PacketType::Disconnect => Disconnect(DisconnectPacket::decode(src)?),
            PacketType::Unsubscribe | PacketType::UnsubAck => {
                return Err(Error::ProtocolError("unsubscribe is not supported"))
            }
        };

        Ok(packet)
    }
}

impl Encoder for ControlPacket {
    fn encode(&self, buffer: &mut BytesMut) {
        use ControlPacket::*;

        match self {
            Connect(p) => p.encode(buffer),
            ConnAck(p) => p.encode(buffer),
            Publish(p) => p.encode(buffer),
            PubAck(p) => p.encode(buffer),
            PubRec(p) => p.encode(buffer),
            PubRel(p) => p.encode(buffer),
            PubComp(p) => p.encode(buffer),
            Subscribe(p) => p.encode(buffer),
            SubAck(p) => p.encode(buffer),
            PingReq(p) => p.encode(buffer),
            PingResp(p) => p.encode(buffer),
            Disconnect(p) => p.encode(buffer),
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[test]
    fn test_check_incomplete_frames() {
        assert!(ControlPacket::check(&[]).is_err());
        assert!(ControlPacket::check(&[0x30]).is_err());
        assert!(ControlPacket::check(&[0x30, 0x05, 0x00]).is_err());
    }

    #[test]
    fn test_check_returns_first_frame_length() -> Result<()> {
        // PINGRESP followed by the start of another packet
        let src = [0xd0, 0x00, 0x30, 0x10];
        assert_eq!(ControlPacket::check(&src)?, 2);

        Ok(())
    }

    #[test]
    fn test_parse_dispatches_on_type() -> Result<()> {
        let mut src = Bytes::from(vec![0xd0, 0x00]);
        assert_eq!(
            ControlPacket::parse(&mut src)?,
            ControlPacket::PingResp(PingRespPacket {})
        );

        let mut src = Bytes::from(vec![0x40, 0x02, 0x00, 0x07]);
        assert_eq!(
            ControlPacket::parse(&mut src)?,
            ControlPacket::PubAck(PubAckPacket { packet_id: 7 })
        );

        Ok(())
    }

    #[test]
    fn test_parse_rejects_reserved_type() {
        let mut src = Bytes::from(vec![0xf0, 0x00]);
        assert!(matches!(
            ControlPacket::parse(&mut src),
            Err(Error::MalformedPacket(_))
        ));
    }
}
