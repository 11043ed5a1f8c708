use crate::packet::Command;

/// Errors that can occur in the dock layer.
#[derive(Debug, thiserror::Error)]
pub enum DockError {
    /// Link-level error.
    #[error("link error: {0}")]
    Link(#[from] newton_mnp::MnpError),

    /// NSOF payload could not be encoded or decoded.
    #[error("object error: {0}")]
    Object(#[from] newton_nsof::NsofError),

    /// Cipher failure while answering the password challenge.
    #[error("cipher error: {0}")]
    Cipher(#[from] crate::cipher::CipherError),

    /// The packet doesn't start with `newtdock`.
    #[error("invalid dock packet header")]
    InvalidHeader,

    /// The command code is not part of the dock vocabulary.
    #[error("invalid dock command {0:?}")]
    InvalidCommand(String),

    /// Declared packet length exceeds the configured maximum.
    #[error("invalid dock packet length {length} (max {max})")]
    InvalidLength { length: usize, max: usize },

    /// Packet body doesn't match its command's layout.
    #[error("invalid {command} packet: {reason}")]
    InvalidData {
        command: Command,
        reason: &'static str,
    },

    /// The device rejected the which-icons request.
    #[error("which-icons rejected by device (error {0})")]
    WhichIconsRejected(i32),

    /// A password arrived before the device sent its session key.
    #[error("no session key received from device")]
    MissingSessionKey,

    /// The operation needs an established dock session.
    #[error("not connected")]
    NotConnected,

    /// A package load is already in progress.
    #[error("package load already in progress")]
    LoadingPackage,
}

pub type Result<T> = std::result::Result<T, DockError>;
