/// Errors that can occur in the link layer.
#[derive(Debug, thiserror::Error)]
pub enum MnpError {
    /// The frame CRC does not match its payload.
    #[error("frame checksum mismatch (received {received:#06x}, computed {computed:#06x})")]
    ChecksumMismatch { received: u16, computed: u16 },

    /// A DLE inside the frame was followed by something other than DLE or ETX.
    #[error("invalid escape sequence DLE {0:#04x}")]
    InvalidEscape(u8),

    /// No end marker within the configured maximum frame size.
    #[error("frame too large ({size} bytes, max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// A link packet header is malformed.
    #[error("invalid link header: {0}")]
    InvalidHeader(String),

    /// The packet type byte is not one this link layer speaks.
    #[error("unknown link packet type {0:#04x}")]
    UnknownPacketType(u8),

    /// Data was sent or received before the link was established.
    #[error("link not established")]
    NotLinked,
}

pub type Result<T> = std::result::Result<T, MnpError>;
