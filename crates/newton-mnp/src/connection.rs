use bytes::Bytes;
use tracing::{debug, trace};

use crate::error::{MnpError, Result};
use crate::packet::{LinkPacket, LinkRequest, DISCONNECT_USER};

/// Link session settings offered to the device.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Largest information field we accept. Default: 256.
    pub max_info_length: u16,
    /// Transfers we allow the device to have unacknowledged. Default: 8.
    pub max_outstanding: u8,
    /// Credit reported in acknowledgements. Default: 8.
    pub credit: u8,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            max_info_length: 256,
            max_outstanding: 8,
            credit: 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    AwaitingLink,
    Linked,
}

/// Outcome of feeding one packet to the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A packet to frame and send to the device.
    Send(LinkPacket),
    /// The link came up.
    Connected,
    /// In-order payload for the layer above.
    Data(Bytes),
    /// The device dropped the link.
    Disconnected,
}

/// Minimal link session: negotiates, acknowledges every transfer and
/// delivers payloads in sequence order.
#[derive(Debug)]
pub struct LinkConnection {
    config: LinkConfig,
    state: LinkState,
    max_info_length: usize,
    send_seq: u8,
    receive_seq: u8,
    acked_seq: u8,
}

impl Default for LinkConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkConnection {
    pub fn new() -> Self {
        Self::with_config(LinkConfig::default())
    }

    pub fn with_config(config: LinkConfig) -> Self {
        let max_info_length = config.max_info_length as usize;
        Self {
            config,
            state: LinkState::AwaitingLink,
            max_info_length,
            send_seq: 0,
            receive_seq: 0,
            acked_seq: 0,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Negotiated information field size.
    pub fn max_info_length(&self) -> usize {
        self.max_info_length
    }

    /// Transfers sent but not yet acknowledged by the device.
    pub fn unacknowledged(&self) -> u8 {
        self.send_seq.wrapping_sub(self.acked_seq)
    }

    /// Process one packet from the device.
    pub fn read(&mut self, packet: LinkPacket) -> Result<Vec<LinkEvent>> {
        trace!(kind = packet.kind(), state = ?self.state, "link packet received");

        match (self.state, packet) {
            (state, LinkPacket::Request(request)) => {
                let reply = self.negotiate(&request);
                self.state = LinkState::Linked;
                let mut events = vec![LinkEvent::Send(LinkPacket::Request(reply))];
                if state == LinkState::AwaitingLink {
                    debug!(max_info_length = self.max_info_length, "link established");
                    events.push(LinkEvent::Connected);
                } else {
                    debug!("link renegotiated");
                }
                Ok(events)
            }
            (LinkState::Linked, LinkPacket::Transfer { seq, data }) => {
                let expected = self.receive_seq.wrapping_add(1);
                if seq != expected {
                    // Repeat or gap: restate what we have and drop it.
                    trace!(seq, expected, "out of sequence transfer dropped");
                    return Ok(vec![LinkEvent::Send(self.acknowledgement())]);
                }
                self.receive_seq = seq;
                Ok(vec![
                    LinkEvent::Send(self.acknowledgement()),
                    LinkEvent::Data(data),
                ])
            }
            (LinkState::Linked, LinkPacket::Acknowledgement { seq, .. }) => {
                self.acked_seq = seq;
                Ok(Vec::new())
            }
            (LinkState::Linked, LinkPacket::Disconnect { reason }) => {
                debug!(reason, "link disconnected by device");
                self.reset();
                Ok(vec![LinkEvent::Disconnected])
            }
            (LinkState::AwaitingLink, LinkPacket::Disconnect { .. }) => Ok(Vec::new()),
            (LinkState::AwaitingLink, _) => Err(MnpError::NotLinked),
        }
    }

    /// Split `data` into transfer packets for the device.
    pub fn write(&mut self, data: &[u8]) -> Result<Vec<LinkPacket>> {
        if self.state != LinkState::Linked {
            return Err(MnpError::NotLinked);
        }

        let packets = data
            .chunks(self.max_info_length)
            .map(|chunk| {
                self.send_seq = self.send_seq.wrapping_add(1);
                LinkPacket::Transfer {
                    seq: self.send_seq,
                    data: Bytes::copy_from_slice(chunk),
                }
            })
            .collect();
        Ok(packets)
    }

    /// Tear the link down from our side.
    pub fn disconnect(&mut self) -> Option<LinkPacket> {
        if self.state != LinkState::Linked {
            return None;
        }
        debug!("link disconnected locally");
        self.reset();
        Some(LinkPacket::Disconnect {
            reason: DISCONNECT_USER,
        })
    }

    fn negotiate(&mut self, request: &LinkRequest) -> LinkRequest {
        let use_256 = request.max_info_length_256 && self.config.max_info_length >= 256;
        let max_info_length = if use_256 {
            256
        } else {
            request.max_info_length.min(self.config.max_info_length)
        };

        self.max_info_length = max_info_length.max(1) as usize;
        self.send_seq = 0;
        self.receive_seq = 0;
        self.acked_seq = 0;

        LinkRequest {
            framing_mode: request.framing_mode,
            max_outstanding: request.max_outstanding.min(self.config.max_outstanding),
            max_info_length: request.max_info_length.min(self.config.max_info_length),
            max_info_length_256: use_256,
            fixed_field_lt_la: request.fixed_field_lt_la,
        }
    }

    fn acknowledgement(&self) -> LinkPacket {
        LinkPacket::Acknowledgement {
            seq: self.receive_seq,
            credit: self.config.credit,
        }
    }

    fn reset(&mut self) {
        self.state = LinkState::AwaitingLink;
        self.max_info_length = self.config.max_info_length as usize;
        self.send_seq = 0;
        self.receive_seq = 0;
        self.acked_seq = 0;
    }
}
