//! MNP-style link layer for Newton serial connections.
//!
//! The Newton wraps everything it sends over serial in a subset of the MNP
//! error-correction protocol:
//! - [`framer`] turns raw bytes into escaped, CRC-checked frames and back
//! - [`packet`] gives those frames a type (link request, transfer, ack, disconnect)
//! - [`connection`] runs the minimal link session that carries an opaque byte
//!   stream in each direction
//!
//! Nothing here does I/O; callers push bytes in and get frames, packets and
//! events back.

pub mod connection;
pub mod error;
pub mod framer;
pub mod packet;

pub use connection::{LinkConfig, LinkConnection, LinkEvent, LinkState};
pub use error::{MnpError, Result};
pub use framer::{crc16, decode_frame, encode_frame, FramerConfig, LinkFramer, DEFAULT_MAX_FRAME};
pub use packet::{LinkPacket, LinkRequest};
