use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Packet is not complete")]
    PacketIncomplete,

    #[error("Malformed packet: {0}")]
    MalformedPacket(&'static str),

    #[error("Protocol error: {0}")]
    ProtocolError(&'static str),

    #[error("I/O Error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether more bytes may turn this error into a successful decode.
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Error::PacketIncomplete)
    }
}
