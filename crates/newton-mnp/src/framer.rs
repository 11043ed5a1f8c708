use bytes::{Buf, BufMut, Bytes, BytesMut};
use crc::{Crc, CRC_16_ARC};

use crate::error::{MnpError, Result};

/// Synchronous idle.
pub const SYN: u8 = 0x16;
/// Data link escape. Doubled when it occurs in a payload.
pub const DLE: u8 = 0x10;
/// Start of text.
pub const STX: u8 = 0x02;
/// End of text.
pub const ETX: u8 = 0x03;

/// Frame start marker: SYN DLE STX.
pub const START_MARKER: [u8; 3] = [SYN, DLE, STX];

/// Frame end marker: DLE ETX. Followed by the CRC.
pub const END_MARKER: [u8; 2] = [DLE, ETX];

const CRC_SIZE: usize = 2;

/// Default maximum unescaped frame payload: 4 KiB.
pub const DEFAULT_MAX_FRAME: usize = 4 * 1024;

const MNP_CRC: Crc<u16> = Crc::<u16>::new(&CRC_16_ARC);

/// CRC-16 as used by MNP (reflected 0x8005, zero init).
pub fn crc16(data: &[u8]) -> u16 {
    MNP_CRC.checksum(data)
}

/// The frame checksum covers the unescaped payload and the trailing ETX.
fn frame_crc(payload: &[u8]) -> u16 {
    let mut digest = MNP_CRC.digest();
    digest.update(payload);
    digest.update(&[ETX]);
    digest.finalize()
}

/// Encode a payload into a link frame.
///
/// Wire format:
/// ```text
/// ┌────────────────┬──────────────────────┬──────────────┬───────────┐
/// │ SYN DLE STX    │ payload, DLE doubled │ DLE ETX      │ CRC-16    │
/// │ 0x16 0x10 0x02 │                      │ 0x10 0x03    │ (2B LE)   │
/// └────────────────┴──────────────────────┴──────────────┴───────────┘
/// ```
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) {
    dst.reserve(START_MARKER.len() + payload.len() + END_MARKER.len() + CRC_SIZE);
    dst.put_slice(&START_MARKER);
    for &byte in payload {
        dst.put_u8(byte);
        if byte == DLE {
            dst.put_u8(DLE);
        }
    }
    dst.put_slice(&END_MARKER);
    dst.put_u16_le(frame_crc(payload));
}

/// Decode one frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// Bytes ahead of the start marker are dropped. On success, or on a checksum
/// or escape error, the frame bytes are consumed so the next call starts
/// looking for the following start marker.
pub fn decode_frame(src: &mut BytesMut, max_frame: usize) -> Result<Option<Bytes>> {
    let Some(start) = find_start(src) else {
        // Hold on to a possibly split start marker.
        let keep = src.len().min(START_MARKER.len() - 1);
        src.advance(src.len() - keep);
        return Ok(None);
    };
    src.advance(start);

    let mut payload = BytesMut::new();
    let mut pos = START_MARKER.len();

    loop {
        if payload.len() > max_frame {
            let size = payload.len();
            src.advance(pos);
            return Err(MnpError::FrameTooLarge {
                size,
                max: max_frame,
            });
        }

        let Some(&byte) = src.get(pos) else {
            return Ok(None); // Need more data
        };
        if byte != DLE {
            payload.put_u8(byte);
            pos += 1;
            continue;
        }

        let Some(&next) = src.get(pos + 1) else {
            return Ok(None); // Need more data
        };
        match next {
            DLE => {
                payload.put_u8(DLE);
                pos += 2;
            }
            ETX => {
                let crc_start = pos + END_MARKER.len();
                if src.len() < crc_start + CRC_SIZE {
                    return Ok(None); // Need more data
                }
                let received = u16::from_le_bytes([src[crc_start], src[crc_start + 1]]);
                src.advance(crc_start + CRC_SIZE);

                let computed = frame_crc(&payload);
                if received != computed {
                    return Err(MnpError::ChecksumMismatch { received, computed });
                }
                return Ok(Some(payload.freeze()));
            }
            other => {
                src.advance(pos + 2);
                return Err(MnpError::InvalidEscape(other));
            }
        }
    }
}

fn find_start(src: &[u8]) -> Option<usize> {
    src.windows(START_MARKER.len())
        .position(|window| window == START_MARKER)
}

/// Configuration for the link framer.
#[derive(Debug, Clone)]
pub struct FramerConfig {
    /// Maximum unescaped payload per frame. Default: 4 KiB.
    pub max_frame_size: usize,
}

impl Default for FramerConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME,
        }
    }
}

/// Streaming frame decoder/encoder.
///
/// Owns the receive buffer; callers push raw bytes as they arrive and get
/// every completed frame payload handed to them in order.
#[derive(Debug, Default)]
pub struct LinkFramer {
    buf: BytesMut,
    config: FramerConfig,
}

impl LinkFramer {
    /// Create a framer with default configuration.
    pub fn new() -> Self {
        Self::with_config(FramerConfig::default())
    }

    /// Create a framer with explicit configuration.
    pub fn with_config(config: FramerConfig) -> Self {
        Self {
            buf: BytesMut::new(),
            config,
        }
    }

    /// Buffer `data` and pass each complete frame payload to `handler`.
    ///
    /// Frames completed before a bad one are delivered; the first framing error
    /// stops processing and is returned.
    pub fn read<F, E>(&mut self, data: &[u8], mut handler: F) -> std::result::Result<(), E>
    where
        F: FnMut(Bytes) -> std::result::Result<(), E>,
        E: From<MnpError>,
    {
        self.buf.extend_from_slice(data);
        while let Some(frame) = decode_frame(&mut self.buf, self.config.max_frame_size)? {
            handler(frame)?;
        }
        Ok(())
    }

    /// Frame a payload for the wire.
    pub fn write(&self, payload: &[u8]) -> Bytes {
        let mut dst = BytesMut::new();
        encode_frame(payload, &mut dst);
        dst.freeze()
    }

    /// Number of bytes buffered but not yet part of a complete frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Current framer configuration.
    pub fn config(&self) -> &FramerConfig {
        &self.config
    }
}
