use std::mem;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::Error;

/// Largest value the remaining length field can carry (four encoded bytes).
pub const MAX_REMAINING_LENGTH: u32 = 268_435_455;

/// Largest UTF-8 string the two byte length prefix can describe.
pub const MAX_STRING_LENGTH: usize = u16::MAX as usize;

pub trait Decoder {
    fn decode<T>(buffer: &mut T) -> crate::Result<Self>
    where
        Self: Sized,
        T: Buf;
}

pub trait Encoder {
    fn encode(&self, buffer: &mut BytesMut);
    fn encoded_size(&self) -> usize {
        mem::size_of_val(self)
    }
}

/// The MQTT "remaining length" integer: seven bits per byte, high bit set on
/// every byte but the last.
#[derive(PartialEq, Eq, Debug, Default, Clone, Copy)]
pub struct VariableByteInteger(pub u32);

impl Encoder for VariableByteInteger {
    fn encode(&self, buffer: &mut BytesMut) {
        let mut x = self.0;

        loop {
            let mut byte = (x % 128) as u8;
            x /= 128;

            if x > 0 {
                byte |= 0b1000_0000;
            }

            buffer.put_u8(byte);

            if x == 0 {
                break;
            }
        }
    }

    fn encoded_size(&self) -> usize {
        match self.0 {
            0..=127 => 1,
            128..=16_383 => 2,
            16_384..=2_097_151 => 3,
            _ => 4,
        }
    }
}

impl Decoder for VariableByteInteger {
    fn decode<T: Buf>(buffer: &mut T) -> crate::Result<Self> {
        let mut value: u32 = 0;

        for shift in (0..4).map(|i| i * 7) {
            if !buffer.has_remaining() {
                return Err(Error::PacketIncomplete);
            }

            let byte = buffer.get_u8();
            value |= ((byte & 0b0111_1111) as u32) << shift;

            if byte & 0b1000_0000 == 0 {
                return Ok(VariableByteInteger(value));
            }
        }

        Err(Error::MalformedPacket("remaining length exceeds four bytes"))
    }
}

impl Encoder for String {
    fn encode(&self, buffer: &mut BytesMut) {
        self.as_str().encode(buffer);
    }

    fn encoded_size(&self) -> usize {
        self.as_str().encoded_size()
    }
}

impl Decoder for String {
    fn decode<T: Buf>(buffer: &mut T) -> crate::Result<Self> {
        let raw = Bytes::decode(buffer)?;

        String::from_utf8(raw.to_vec()).map_err(|_| Error::MalformedPacket("string is not UTF-8"))
    }
}

impl Encoder for &str {
    fn encode(&self, buffer: &mut BytesMut) {
        buffer.put_u16(self.len() as u16);
        buffer.put(self.as_bytes());
    }

    fn encoded_size(&self) -> usize {
        self.len() + mem::size_of::<u16>()
    }
}

impl Encoder for u8 {
    fn encode(&self, buffer: &mut BytesMut) {
        buffer.put_u8(*self);
    }
}

impl Decoder for u8 {
    fn decode<T: Buf>(buffer: &mut T) -> crate::Result<Self> {
        if !buffer.has_remaining() {
            return Err(Error::PacketIncomplete);
        }

        Ok(buffer.get_u8())
    }
}

impl Encoder for u16 {
    fn encode(&self, buffer: &mut BytesMut) {
        buffer.put_u16(*self);
    }
}

impl Decoder for u16 {
    fn decode<T: Buf>(buffer: &mut T) -> crate::Result<Self> {
        if buffer.remaining() < 2 {
            return Err(Error::PacketIncomplete);
        }

        Ok(buffer.get_u16())
    }
}

/// Length-prefixed binary data.
impl Encoder for Bytes {
    fn encode(&self, buffer: &mut BytesMut) {
        buffer.put_u16(self.len() as u16);
        buffer.extend_from_slice(self);
    }

    fn encoded_size(&self) -> usize {
        mem::size_of::<u16>() + self.len()
    }
}

impl Decoder for Bytes {
    fn decode<T: Buf>(buffer: &mut T) -> crate::Result<Self> {
        let length = u16::decode(buffer)? as usize;

        if buffer.remaining() < length {
            return Err(Error::MalformedPacket("length prefix exceeds packet"));
        }

        Ok(buffer.copy_to_bytes(length))
    }
}

impl<T> Encoder for Option<T>
where
    T: Encoder,
{
    fn encode(&self, buffer: &mut BytesMut) {
        if let Some(v) = self {
            v.encode(buffer);
        }
    }

    fn encoded_size(&self) -> usize {
        self.as_ref().map_or(0, Encoder::encoded_size)
    }
}

impl<T> Encoder for Vec<T>
where
    T: Encoder,
{
    fn encode(&self, buffer: &mut BytesMut) {
        for e in self {
            e.encode(buffer);
        }
    }

    fn encoded_size(&self) -> usize {
        self.iter().map(Encoder::encoded_size).sum()
    }
}

#[cfg(test)]
mod tests {
    use crate::{codec::*, error::Error};

    #[test]
    fn test_var_int_encode_decode() -> crate::Result<()> {
        let mut encoded = BytesMut::new();

        VariableByteInteger(325).encode(&mut encoded);
        assert_eq!(encoded, Bytes::from(vec![0xc5, 0x02]));

        let decoded = VariableByteInteger::decode(&mut encoded)?;
        assert_eq!(decoded.0, 325);

        Ok(())
    }

    #[test]
    fn test_var_int_boundaries() -> crate::Result<()> {
        for (value, size) in [(0, 1), (127, 1), (128, 2), (16_383, 2), (16_384, 3)] {
            let mut encoded = BytesMut::new();
            VariableByteInteger(value).encode(&mut encoded);
            assert_eq!(encoded.len(), size);
            assert_eq!(VariableByteInteger(value).encoded_size(), size);
        }

        let mut max = Bytes::from(vec![0xff, 0xff, 0xff, 0x7f]);
        assert_eq!(
            VariableByteInteger::decode(&mut max)?.0,
            MAX_REMAINING_LENGTH
        );

        Ok(())
    }

    #[test]
    fn test_var_int_too_long() {
        let mut encoded = Bytes::from(vec![0xc5, 0xc5, 0xc5, 0xc5, 0x02]);

        assert!(matches!(
            VariableByteInteger::decode(&mut encoded),
            Err(Error::MalformedPacket(_))
        ));
    }

    #[test]
    fn test_var_int_incomplete() {
        let mut encoded = Bytes::from(vec![0xc5]);

        assert!(matches!(
            VariableByteInteger::decode(&mut encoded),
            Err(Error::PacketIncomplete)
        ));
    }

    #[test]
    fn test_string_rejects_invalid_utf8() {
        let mut encoded = Bytes::from(vec![0x00, 0x02, 0xc3, 0x28]);

        assert!(matches!(
            String::decode(&mut encoded),
            Err(Error::MalformedPacket(_))
        ));
    }

    #[test]
    fn test_string_encoding() {
        let mut encoded = BytesMut::new();
        "test/res".to_string().encode(&mut encoded);

        assert_eq!(&encoded[..2], &[0x00, 0x08]);
        assert_eq!(&encoded[2..], b"test/res");
    }
}
