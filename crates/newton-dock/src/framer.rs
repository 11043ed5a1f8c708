use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::error::{DockError, Result};
use crate::packet::{Command, DockPacket};

/// Every dock packet starts with these 8 bytes.
pub const MAGIC: &[u8; 8] = b"newtdock";

/// Magic (8) + command (4) + length (4).
pub const HEADER_SIZE: usize = 16;

/// Default maximum declared packet length: 16 MiB.
pub const DEFAULT_MAX_LENGTH: usize = 16 * 1024 * 1024;

const BOUNDARY: usize = 4;

fn round_to_boundary(length: usize) -> usize {
    length.div_ceil(BOUNDARY) * BOUNDARY
}

/// Configuration for the command framer.
#[derive(Debug, Clone)]
pub struct PacketConfig {
    /// Maximum declared data length per packet. Default: 16 MiB.
    pub max_length: usize,
}

impl Default for PacketConfig {
    fn default() -> Self {
        Self {
            max_length: DEFAULT_MAX_LENGTH,
        }
    }
}

/// Splits the reassembled link byte stream into dock packets.
///
/// Wire format:
/// ```text
/// ┌────────────┬───────────┬──────────────┬─────────────────────────────┐
/// │ "newtdock" │ command   │ length       │ data, zero padded to a      │
/// │ (8B)       │ (4B ASCII)│ (4B BE)      │ multiple of 4 bytes         │
/// └────────────┴───────────┴──────────────┴─────────────────────────────┘
/// ```
#[derive(Debug, Default)]
pub struct PacketFramer {
    buf: BytesMut,
    config: PacketConfig,
}

impl PacketFramer {
    pub fn new() -> Self {
        Self::with_config(PacketConfig::default())
    }

    pub fn with_config(config: PacketConfig) -> Self {
        Self {
            buf: BytesMut::new(),
            config,
        }
    }

    /// Buffer `data` and pass each complete, decodable packet to `handler`.
    ///
    /// Packets the desktop never receives are consumed and skipped. A bad
    /// header drops everything buffered, since there is no way to find the
    /// next packet boundary.
    pub fn read<F, E>(&mut self, data: &[u8], mut handler: F) -> std::result::Result<(), E>
    where
        F: FnMut(DockPacket) -> std::result::Result<(), E>,
        E: From<DockError>,
    {
        self.buf.extend_from_slice(data);
        while let Some(packet) = self.next_packet()? {
            if let Some(packet) = packet {
                handler(packet)?;
            }
        }
        Ok(())
    }

    /// Decode the next complete packet.
    ///
    /// `Ok(None)` means more data is needed; `Ok(Some(None))` is a packet that
    /// was consumed but not decoded.
    fn next_packet(&mut self) -> Result<Option<Option<DockPacket>>> {
        if self.buf.len() < HEADER_SIZE {
            return Ok(None); // Need more data
        }

        if &self.buf[..8] != MAGIC {
            self.buf.clear();
            return Err(DockError::InvalidHeader);
        }

        let Some(command) = Command::from_code(&self.buf[8..12]) else {
            let code = String::from_utf8_lossy(&self.buf[8..12]).into_owned();
            self.buf.clear();
            return Err(DockError::InvalidCommand(code));
        };

        let length =
            u32::from_be_bytes([self.buf[12], self.buf[13], self.buf[14], self.buf[15]]) as usize;
        if length > self.config.max_length {
            self.buf.clear();
            return Err(DockError::InvalidLength {
                length,
                max: self.config.max_length,
            });
        }

        let total = HEADER_SIZE + round_to_boundary(length);
        if self.buf.len() < total {
            return Ok(None); // Need more data
        }

        let mut frame = self.buf.split_to(total);
        frame.advance(HEADER_SIZE);
        frame.truncate(length);

        if !command.is_decodable() {
            trace!(%command, length, "skipping desktop-only packet");
            return Ok(Some(None));
        }
        let packet = DockPacket::decode(command, &frame)?;
        trace!(%command, length, "dock packet received");
        Ok(Some(packet))
    }

    /// Encode a packet for the link.
    pub fn write(&self, packet: &DockPacket) -> Result<Bytes> {
        let body = packet.encode_body()?;
        let rounded = round_to_boundary(body.len());

        let mut dst = BytesMut::with_capacity(HEADER_SIZE + rounded);
        dst.put_slice(MAGIC);
        dst.put_slice(packet.command().code().as_bytes());
        dst.put_u32(rounded as u32);
        dst.put_slice(&body);
        dst.put_bytes(0, rounded - body.len());
        Ok(dst.freeze())
    }

    /// Bytes buffered towards the next packet.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Drop any partial packet, e.g. after the link went down.
    pub fn reset(&mut self) {
        self.buf.clear();
    }
}
