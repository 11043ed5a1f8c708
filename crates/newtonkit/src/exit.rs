use std::fmt;
use std::io;

use newton_dock::DockError;
use newton_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::NotFound => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Open { source, .. }
        | TransportError::Configure { source, .. }
        | TransportError::Io(source) => io_error(context, source),
        TransportError::UnsupportedBaudRate(_) => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
    }
}

pub fn dock_error(context: &str, err: DockError) -> CliError {
    let code = match &err {
        DockError::Link(_)
        | DockError::Object(_)
        | DockError::InvalidHeader
        | DockError::InvalidCommand(_)
        | DockError::InvalidLength { .. }
        | DockError::InvalidData { .. } => DATA_INVALID,
        DockError::NotConnected | DockError::LoadingPackage => USAGE,
        DockError::WhichIconsRejected(_) | DockError::MissingSessionKey => FAILURE,
        DockError::Cipher(_) => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

/// Whether the session can keep going after `err` surfaced from the wire.
///
/// Malformed input is dropped by the framers, so only handshake failures
/// end the run.
pub fn is_fatal(err: &DockError) -> bool {
    matches!(
        err,
        DockError::WhichIconsRejected(_) | DockError::MissingSessionKey | DockError::Cipher(_)
    )
}
