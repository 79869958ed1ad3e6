use bytes::BytesMut;
use tern_core::codec::Encoder as _;
use tern_packets::ControlPacket;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::TcpStream,
};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{ClientError, Result};

/// Splits a byte stream into MQTT control packets.
#[derive(Debug, Default, Clone, Copy)]
pub struct MqttCodec;

impl Decoder for MqttCodec {
    type Item = ControlPacket;
    type Error = ClientError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<ControlPacket>> {
        let frame_len = match ControlPacket::check(src) {
            Ok(len) => len,
            Err(e) if e.is_incomplete() => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut frame = src.split_to(frame_len).freeze();
        Ok(Some(ControlPacket::parse(&mut frame)?))
    }
}

impl Encoder<ControlPacket> for MqttCodec {
    type Error = ClientError;

    fn encode(&mut self, packet: ControlPacket, dst: &mut BytesMut) -> Result<()> {
        packet.encode(dst);
        Ok(())
    }
}

/// A connection to an MQTT broker with packet framing.
pub struct Connection<S = TcpStream>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream: S,
    codec: MqttCodec,
    read_buffer: BytesMut,
    write_buffer: BytesMut,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            codec: MqttCodec,
            read_buffer: BytesMut::with_capacity(4096),
            write_buffer: BytesMut::with_capacity(1024),
        }
    }

    /// Write a control packet to the connection.
    pub async fn write_packet(&mut self, packet: ControlPacket) -> Result<()> {
        self.write_buffer.clear();
        self.codec.encode(packet, &mut self.write_buffer)?;
        self.stream.write_all(&self.write_buffer).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Read a control packet from the connection.
    /// Returns None if the peer closed the connection between packets.
    ///
    /// Cancel safe: bytes already read stay buffered for the next call.
    pub async fn read_packet(&mut self) -> Result<Option<ControlPacket>> {
        loop {
            if let Some(packet) = self.codec.decode(&mut self.read_buffer)? {
                return Ok(Some(packet));
            }

            if self.stream.read_buf(&mut self.read_buffer).await? == 0 {
                if self.read_buffer.is_empty() {
                    return Ok(None);
                }

                return Err(ClientError::ConnectionFailed(
                    "connection closed mid-packet".into(),
                ));
            }
        }
    }

    /// Close the write half of the stream.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}
