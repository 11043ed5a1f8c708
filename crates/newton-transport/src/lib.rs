//! Serial line transport for the Newton dock stack.
//!
//! This is the lowest layer of newtonkit. It opens a tty device in raw mode
//! and hands back a [`SerialPort`] that implements `Read + Write`. Everything
//! above it (MNP framing, the dock protocol) is transport-agnostic and only
//! ever sees byte slices.

pub mod error;

#[cfg(unix)]
pub mod serial;

pub use error::{Result, TransportError};

#[cfg(unix)]
pub use serial::{SerialConfig, SerialPort, DEFAULT_BAUD_RATE};
