/// Errors that can occur while encoding or decoding NSOF.
#[derive(Debug, thiserror::Error)]
pub enum NsofError {
    /// The stream ended in the middle of an object.
    #[error("unexpected end of NSOF data at offset {offset}")]
    UnexpectedEnd { offset: usize },

    /// The root version byte is not one we understand.
    #[error("unsupported NSOF version {0}")]
    UnsupportedVersion(u8),

    /// An object tag outside the known set.
    #[error("unknown NSOF tag {tag} at offset {offset}")]
    UnknownTag { tag: u8, offset: usize },

    /// A precedent refers past the objects seen so far.
    #[error("precedent {index} out of range ({count} objects)")]
    DanglingPrecedent { index: u32, count: u32 },

    /// A frame key is neither a symbol nor a precedent to one.
    #[error("frame key is not a symbol")]
    InvalidFrameKey,

    /// A symbol name is not ASCII.
    #[error("invalid symbol name")]
    InvalidSymbol,

    /// A string is not valid UTF-16.
    #[error("invalid string data")]
    InvalidString,

    /// An integer that doesn't fit a 30-bit immediate.
    #[error("integer {0} out of 30-bit range")]
    IntegerOutOfRange(i32),

    /// A length or count that doesn't fit the wire format.
    #[error("length {0} too large")]
    LengthTooLarge(usize),

    /// Objects nested deeper than [`MAX_DEPTH`](crate::MAX_DEPTH).
    #[error("objects nested deeper than {limit}")]
    TooDeep { limit: usize },
}

pub type Result<T> = std::result::Result<T, NsofError>;
