//! The four packets that carry nothing but a packet identifier.

use bytes::{Buf, BytesMut};

use tern_core::{
    codec::{Decoder, Encoder},
    error::Error,
};

use crate::{FixedHeader, PacketType};

const ACK_REMAINING_LEN: usize = 2;

fn encode_ack(packet_type: PacketType, flags: u8, packet_id: u16, buffer: &mut BytesMut) {
    FixedHeader::encode(packet_type, flags, ACK_REMAINING_LEN, buffer);
    packet_id.encode(buffer);
}

fn decode_ack<T: Buf>(buffer: &mut T, expected_flags: u8) -> crate::Result<u16> {
    let header = FixedHeader::decode(buffer)?;

    if header.flags != expected_flags {
        return Err(Error::MalformedPacket("invalid fixed header flags"));
    }

    if header.remaining_len != ACK_REMAINING_LEN {
        return Err(Error::MalformedPacket("acknowledgement must be two bytes"));
    }

    u16::decode(buffer)
}

/// QoS 1 acknowledgement.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub struct PubAckPacket {
    pub packet_id: u16,
}

impl Encoder for PubAckPacket {
    fn encode(&self, buffer: &mut BytesMut) {
        encode_ack(PacketType::PubAck, 0, self.packet_id, buffer);
    }
}

impl Decoder for PubAckPacket {
    fn decode<T: Buf>(buffer: &mut T) -> crate::Result<Self> {
        let packet_id = decode_ack(buffer, 0)?;
        Ok(PubAckPacket { packet_id })
    }
}

/// QoS 2, first acknowledgement (publish received).
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub struct PubRecPacket {
    pub packet_id: u16,
}

impl Encoder for PubRecPacket {
    fn encode(&self, buffer: &mut BytesMut) {
        encode_ack(PacketType::PubRec, 0, self.packet_id, buffer);
    }
}

impl Decoder for PubRecPacket {
    fn decode<T: Buf>(buffer: &mut T) -> crate::Result<Self> {
        let packet_id = decode_ack(buffer, 0)?;
        Ok(PubRecPacket { packet_id })
    }
}

/// QoS 2, release. The only acknowledgement with reserved flags set.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub struct PubRelPacket {
    pub packet_id: u16,
}

const PUBREL_FLAGS: u8 = 0b0010;

impl Encoder for PubRelPacket {
    fn encode(&self, buffer: &mut BytesMut) {
        encode_ack(PacketType::PubRel, PUBREL_FLAGS, self.packet_id, buffer);
    }
}

impl Decoder for PubRelPacket {
    fn decode<T: Buf>(buffer: &mut T) -> crate::Result<Self> {
        let packet_id = decode_ack(buffer, PUBREL_FLAGS)?;
        Ok(PubRelPacket { packet_id })
    }
}

/// QoS 2, completion.
#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub struct PubCompPacket {
    pub packet_id: u16,
}

impl Encoder for PubCompPacket {
    fn encode(&self, buffer: &mut BytesMut) {
        encode_ack(PacketType::PubComp, 0, self.packet_id, buffer);
    }
}

impl Decoder for PubCompPacket {
    fn decode<T: Buf>(buffer: &mut T) -> crate::Result<Self> {
        let packet_id = decode_ack(buffer, 0)?;
        Ok(PubCompPacket { packet_id })
    }
}
