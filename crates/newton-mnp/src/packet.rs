use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{MnpError, Result};

/// Link request.
pub const TYPE_LR: u8 = 0x01;
/// Link disconnect.
pub const TYPE_LD: u8 = 0x02;
/// Link transfer.
pub const TYPE_LT: u8 = 0x04;
/// Link acknowledgement.
pub const TYPE_LA: u8 = 0x05;

/// Constant parameter 1 and 2 of every link request.
const LR_CONSTANT_PARAMETERS: [u8; 9] = [0x02, 0x01, 0x06, 0x01, 0x00, 0x00, 0x00, 0x00, 0xff];

const PARAM_FRAMING_MODE: u8 = 0x02;
const PARAM_MAX_OUTSTANDING: u8 = 0x03;
const PARAM_MAX_INFO_LENGTH: u8 = 0x04;
const PARAM_DATA_PHASE_OPTIMIZATION: u8 = 0x08;

const FLAG_MAX_INFO_LENGTH_256: u8 = 0x01;
const FLAG_FIXED_FIELD_LT_LA: u8 = 0x02;

/// Disconnect reason sent when the desktop user ends the session.
pub const DISCONNECT_USER: u8 = 0xff;

/// Negotiation parameters carried by a link request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkRequest {
    pub framing_mode: u8,
    pub max_outstanding: u8,
    pub max_info_length: u16,
    /// Sender can handle 256-byte information fields.
    pub max_info_length_256: bool,
    /// Sender uses fixed-field transfer and acknowledgement headers.
    pub fixed_field_lt_la: bool,
}

impl Default for LinkRequest {
    fn default() -> Self {
        Self {
            framing_mode: 0x02,
            max_outstanding: 8,
            max_info_length: 64,
            max_info_length_256: true,
            fixed_field_lt_la: true,
        }
    }
}

impl LinkRequest {
    /// Parse the parameter block that follows the type byte.
    ///
    /// Parameters the link layer doesn't use are skipped. The header length
    /// byte is not checked; devices are known to send an inaccurate one.
    pub fn decode_parameters(data: &[u8]) -> Result<Self> {
        let mut request = Self::default();

        let Some((&constant, mut rest)) = data.split_first() else {
            return Err(MnpError::InvalidHeader("empty link request".into()));
        };
        if constant != LR_CONSTANT_PARAMETERS[0] {
            return Err(MnpError::InvalidHeader(format!(
                "link request constant parameter {constant:#04x}"
            )));
        }

        while let [kind, len, tail @ ..] = rest {
            let len = *len as usize;
            if tail.len() < len {
                return Err(MnpError::InvalidHeader(format!(
                    "link request parameter {kind:#04x} truncated"
                )));
            }
            let (value, next) = tail.split_at(len);
            match (*kind, value) {
                (PARAM_FRAMING_MODE, [mode]) => request.framing_mode = *mode,
                (PARAM_MAX_OUTSTANDING, [count]) => request.max_outstanding = *count,
                (PARAM_MAX_INFO_LENGTH, [lo, hi]) => {
                    request.max_info_length = u16::from_le_bytes([*lo, *hi])
                }
                (PARAM_DATA_PHASE_OPTIMIZATION, [flags]) => {
                    request.max_info_length_256 = flags & FLAG_MAX_INFO_LENGTH_256 != 0;
                    request.fixed_field_lt_la = flags & FLAG_FIXED_FIELD_LT_LA != 0;
                }
                _ => {}
            }
            rest = next;
        }

        Ok(request)
    }

    fn encode_into(&self, dst: &mut BytesMut) {
        let mut flags = 0;
        if self.max_info_length_256 {
            flags |= FLAG_MAX_INFO_LENGTH_256;
        }
        if self.fixed_field_lt_la {
            flags |= FLAG_FIXED_FIELD_LT_LA;
        }

        let start = dst.len();
        dst.put_u8(0); // header length, patched below
        dst.put_u8(TYPE_LR);
        dst.put_slice(&LR_CONSTANT_PARAMETERS);
        dst.put_slice(&[PARAM_FRAMING_MODE, 1, self.framing_mode]);
        dst.put_slice(&[PARAM_MAX_OUTSTANDING, 1, self.max_outstanding]);
        dst.put_slice(&[PARAM_MAX_INFO_LENGTH, 2]);
        dst.put_u16_le(self.max_info_length);
        dst.put_slice(&[PARAM_DATA_PHASE_OPTIMIZATION, 1, flags]);
        dst[start] = (dst.len() - start - 1) as u8;
    }
}

/// A typed link-layer packet: the payload of one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkPacket {
    Request(LinkRequest),
    Disconnect { reason: u8 },
    Transfer { seq: u8, data: Bytes },
    Acknowledgement { seq: u8, credit: u8 },
}

impl LinkPacket {
    /// Decode a frame payload.
    pub fn decode(payload: &Bytes) -> Result<Self> {
        let (header_len, kind) = match payload.as_ref() {
            [len, kind, ..] => (*len as usize, *kind),
            _ => {
                return Err(MnpError::InvalidHeader(format!(
                    "link packet of {} bytes",
                    payload.len()
                )))
            }
        };

        match kind {
            TYPE_LR => Ok(Self::Request(LinkRequest::decode_parameters(&payload[2..])?)),
            TYPE_LD => {
                // Reason is the value of the first parameter, if any.
                let reason = match payload.get(2..) {
                    Some([_, len, reason, ..]) if *len >= 1 => *reason,
                    _ => 0,
                };
                Ok(Self::Disconnect { reason })
            }
            TYPE_LT => {
                let data_start = header_len + 1;
                if header_len < 2 || payload.len() < data_start {
                    return Err(MnpError::InvalidHeader(format!(
                        "link transfer header length {header_len}"
                    )));
                }
                Ok(Self::Transfer {
                    seq: payload[2],
                    data: payload.slice(data_start..),
                })
            }
            TYPE_LA => match payload.as_ref() {
                [_, _, seq, credit, ..] => Ok(Self::Acknowledgement {
                    seq: *seq,
                    credit: *credit,
                }),
                _ => Err(MnpError::InvalidHeader(
                    "link acknowledgement too short".into(),
                )),
            },
            other => Err(MnpError::UnknownPacketType(other)),
        }
    }

    /// Encode into a frame payload.
    pub fn encode(&self) -> Bytes {
        let mut dst = BytesMut::new();
        match self {
            Self::Request(request) => request.encode_into(&mut dst),
            Self::Disconnect { reason } => dst.put_slice(&[4, TYPE_LD, 1, 1, *reason]),
            Self::Transfer { seq, data } => {
                dst.reserve(3 + data.len());
                dst.put_slice(&[2, TYPE_LT, *seq]);
                dst.put_slice(data);
            }
            Self::Acknowledgement { seq, credit } => {
                dst.put_slice(&[3, TYPE_LA, *seq, *credit])
            }
        }
        dst.freeze()
    }

    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Request(_) => "LR",
            Self::Disconnect { .. } => "LD",
            Self::Transfer { .. } => "LT",
            Self::Acknowledgement { .. } => "LA",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framer::tests::{LINK_REQUEST_FRAME, LINK_TRANSFER_FRAME};
    use crate::framer::LinkFramer;

    fn only_frame(wire: &[u8]) -> Bytes {
        let mut frames = Vec::new();
        LinkFramer::new()
            .read(wire, |frame| {
                frames.push(frame);
                Ok::<_, MnpError>(())
            })
            .unwrap();
        assert_eq!(frames.len(), 1);
        frames.remove(0)
    }

    #[test]
    fn device_link_request_decodes() {
        let packet = LinkPacket::decode(&only_frame(&LINK_REQUEST_FRAME)).unwrap();
        let LinkPacket::Request(request) = packet else {
            panic!("expected link request, got {packet:?}");
        };
        assert_eq!(request.framing_mode, 2);
        assert_eq!(request.max_outstanding, 8);
        assert_eq!(request.max_info_length, 64);
        assert!(request.max_info_length_256);
        assert!(request.fixed_field_lt_la);
    }

    #[test]
    fn device_link_transfer_decodes() {
        let packet = LinkPacket::decode(&only_frame(&LINK_TRANSFER_FRAME)).unwrap();
        let LinkPacket::Transfer { seq, data } = packet else {
            panic!("expected link transfer, got {packet:?}");
        };
        assert_eq!(seq, 2);
        assert_eq!(&data[..12], b"newtdockname");
    }

    #[test]
    fn link_request_parameters_reencode() {
        let params = [
            0x02, 0x01, 0x06, 0x01, 0x00, 0x00, 0x00, 0x00, 0xff, 0x02, 0x01, 0x02, 0x03, 0x01,
            0x08, 0x04, 0x02, 0x40, 0x00, 0x08, 0x01, 0x03,
        ];
        let request = LinkRequest::decode_parameters(&params).unwrap();
        let encoded = LinkPacket::Request(request).encode();

        assert_eq!(encoded[0], 0x17);
        assert_eq!(encoded[1], TYPE_LR);
        assert_eq!(&encoded[2..], &params);
    }

    #[test]
    fn unknown_parameters_skipped() {
        let params = [
            0x02, 0x01, 0x06, 0x01, 0x00, 0x00, 0x00, 0x00, 0xff, 0x09, 0x01, 0x01, 0x03, 0x01,
            0x01, 0xc5, 0x02, 0xaa, 0xbb,
        ];
        let request = LinkRequest::decode_parameters(&params).unwrap();
        assert_eq!(request.max_outstanding, 1);
        assert_eq!(request.max_info_length, 64);
    }

    #[test]
    fn truncated_parameter_rejected() {
        let params = [0x02, 0x04, 0x02, 0x40];
        let err = LinkRequest::decode_parameters(&params).unwrap_err();
        assert!(matches!(err, MnpError::InvalidHeader(_)));
    }

    #[test]
    fn transfer_ack_and_disconnect_layouts() {
        let transfer = LinkPacket::Transfer {
            seq: 7,
            data: Bytes::from_static(b"abc"),
        };
        assert_eq!(transfer.encode().as_ref(), &[2, 4, 7, b'a', b'b', b'c']);

        let ack = LinkPacket::Acknowledgement { seq: 7, credit: 8 };
        assert_eq!(ack.encode().as_ref(), &[3, 5, 7, 8]);

        let disconnect = LinkPacket::Disconnect {
            reason: DISCONNECT_USER,
        };
        assert_eq!(disconnect.encode().as_ref(), &[4, 2, 1, 1, 0xff]);
        assert_eq!(LinkPacket::decode(&disconnect.encode()).unwrap(), disconnect);
    }

    #[test]
    fn malformed_packets_rejected() {
        assert!(matches!(
            LinkPacket::decode(&Bytes::from_static(&[])),
            Err(MnpError::InvalidHeader(_))
        ));
        assert!(matches!(
            LinkPacket::decode(&Bytes::from_static(&[3, 5, 1])),
            Err(MnpError::InvalidHeader(_))
        ));
        assert!(matches!(
            LinkPacket::decode(&Bytes::from_static(&[9, 4, 1])),
            Err(MnpError::InvalidHeader(_))
        ));
        assert!(matches!(
            LinkPacket::decode(&Bytes::from_static(&[2, 0x42, 0])),
            Err(MnpError::UnknownPacketType(0x42))
        ));
    }
}
