use bytes::{Bytes, BytesMut};
use newton_dock::{
    DockConfig, DockError, DockEvent, DockHost, DockPacket, DockSession, PacketConfig,
    PacketFramer, Result,
};
use newton_mnp::{
    encode_frame, FramerConfig, LinkConfig, LinkConnection, LinkEvent, LinkFramer, LinkPacket,
    LinkState,
};
use tracing::{debug, trace};

/// Settings for every layer of a [`Pipeline`].
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub framer: FramerConfig,
    pub link: LinkConfig,
    pub packet: PacketConfig,
    pub dock: DockConfig,
}

/// The dock session's host: pushes dock packets down through the link and
/// collects session events.
#[derive(Debug)]
pub struct WireHost {
    link: LinkConnection,
    packets: PacketFramer,
    output: BytesMut,
    events: Vec<DockEvent>,
}

impl WireHost {
    fn new(config: &PipelineConfig) -> Self {
        Self {
            link: LinkConnection::with_config(config.link.clone()),
            packets: PacketFramer::with_config(config.packet.clone()),
            output: BytesMut::new(),
            events: Vec::new(),
        }
    }

    pub fn link(&self) -> &LinkConnection {
        &self.link
    }

    fn send_link(&mut self, packet: &LinkPacket) {
        trace!(kind = packet.kind(), "link packet sent");
        encode_frame(&packet.encode(), &mut self.output);
    }
}

impl DockHost for WireHost {
    fn write(&mut self, packet: &DockPacket) -> Result<()> {
        if self.link.state() != LinkState::Linked {
            trace!(command = %packet.command(), "link down, dock packet dropped");
            return Ok(());
        }
        let bytes = self.packets.write(packet)?;
        for transfer in self.link.write(&bytes)? {
            self.send_link(&transfer);
        }
        Ok(())
    }

    fn notify(&mut self, event: DockEvent) {
        self.events.push(event);
    }
}

/// The whole desktop stack behind one byte-oriented interface.
///
/// ```text
/// serial bytes ─▶ LinkFramer ─▶ LinkConnection ─▶ PacketFramer ─▶ DockSession
///              ◀─ encode_frame ◀─ LinkConnection ◀─ PacketFramer ◀─┘ (WireHost)
/// ```
///
/// Feed device bytes to [`receive`](Pipeline::receive); collect what must go
/// back to the device with [`take_output`](Pipeline::take_output).
#[derive(Debug)]
pub struct Pipeline {
    link_framer: LinkFramer,
    packet_framer: PacketFramer,
    session: DockSession<WireHost>,
}

impl Pipeline {
    pub fn new() -> Result<Self> {
        Self::with_config(PipelineConfig::default())
    }

    pub fn with_config(config: PipelineConfig) -> Result<Self> {
        let host = WireHost::new(&config);
        Ok(Self {
            link_framer: LinkFramer::with_config(config.framer),
            packet_framer: PacketFramer::with_config(config.packet),
            session: DockSession::with_config(host, config.dock)?,
        })
    }

    /// Push bytes read from the device through the stack.
    ///
    /// Every complete frame in `data` is acted on, including frames after a
    /// bad one. The first error is returned.
    pub fn receive(&mut self, data: &[u8]) -> Result<()> {
        let Self {
            link_framer,
            packet_framer,
            session,
        } = self;

        let mut on_frame = |frame: Bytes| handle_frame(session, packet_framer, &frame);
        let mut first_error = None;
        let mut input = data;
        // A failed frame is already consumed, so each retry makes progress.
        while let Err(err) = link_framer.read(input, &mut on_frame) {
            debug!(error = %err, "frame failed, continuing with buffered input");
            first_error.get_or_insert(err);
            input = &[];
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Bytes to write to the device.
    pub fn take_output(&mut self) -> Bytes {
        self.session.host_mut().output.split().freeze()
    }

    /// Session events since the last call.
    pub fn take_events(&mut self) -> Vec<DockEvent> {
        std::mem::take(&mut self.session.host_mut().events)
    }

    pub fn session(&self) -> &DockSession<WireHost> {
        &self.session
    }

    /// Run caller operations (calls, backup, packages) on the dock session.
    pub fn session_mut(&mut self) -> &mut DockSession<WireHost> {
        &mut self.session
    }

    /// End the dock session, then the link.
    pub fn disconnect(&mut self) -> Result<()> {
        self.session.disconnect()?;
        self.packet_framer.reset();
        let host = self.session.host_mut();
        if let Some(packet) = host.link.disconnect() {
            host.send_link(&packet);
        }
        Ok(())
    }
}

fn handle_frame(
    session: &mut DockSession<WireHost>,
    packet_framer: &mut PacketFramer,
    frame: &Bytes,
) -> Result<()> {
    let packet = LinkPacket::decode(frame)?;
    let events = session.host_mut().link.read(packet)?;
    for event in events {
        match event {
            LinkEvent::Send(packet) => session.host_mut().send_link(&packet),
            LinkEvent::Connected => debug!("link up"),
            LinkEvent::Data(data) => {
                packet_framer.read(&data, |packet| session.read(packet))?;
            }
            LinkEvent::Disconnected => {
                packet_framer.reset();
                session.disconnect()?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use newton_dock::SessionState;

    use super::*;

    fn frame(packet: LinkPacket) -> Bytes {
        LinkFramer::new().write(&packet.encode())
    }

    fn link_request() -> Bytes {
        frame(LinkPacket::Request(newton_mnp::LinkRequest::default()))
    }

    #[test]
    fn link_request_is_answered() {
        let mut pipeline = Pipeline::new().unwrap();
        pipeline.receive(&link_request()).unwrap();

        let output = pipeline.take_output();
        assert_eq!(&output[..3], &[0x16, 0x10, 0x02]);
        assert_eq!(output[4], 0x01);
        assert_eq!(pipeline.session().host().link().state(), LinkState::Linked);
        assert!(pipeline.take_events().is_empty());
    }

    #[test]
    fn bad_frame_does_not_stall_following_frame() {
        let mut bad = link_request().to_vec();
        let last = bad.len() - 1;
        bad[last] ^= 0xff;
        let mut wire = bad;
        wire.extend_from_slice(&link_request());

        let mut pipeline = Pipeline::new().unwrap();
        let err = pipeline.receive(&wire).unwrap_err();
        assert!(matches!(
            err,
            DockError::Link(newton_mnp::MnpError::ChecksumMismatch { .. })
        ));
        assert!(!pipeline.take_output().is_empty());
        assert_eq!(pipeline.session().host().link().state(), LinkState::Linked);
    }

    #[test]
    fn dock_packets_dropped_while_unlinked() {
        let mut pipeline = Pipeline::new().unwrap();
        pipeline.disconnect().unwrap();
        assert!(pipeline.take_output().is_empty());
    }

    #[test]
    fn transfer_before_link_is_an_error() {
        let mut pipeline = Pipeline::new().unwrap();
        let err = pipeline
            .receive(&frame(LinkPacket::Transfer {
                seq: 1,
                data: Bytes::from_static(b"x"),
            }))
            .unwrap_err();
        assert!(matches!(
            err,
            DockError::Link(newton_mnp::MnpError::NotLinked)
        ));
    }

    #[test]
    fn link_drop_ends_session() {
        let mut pipeline = Pipeline::new().unwrap();
        pipeline.receive(&link_request()).unwrap();
        let rtdk = PacketFramer::new()
            .write(&DockPacket::RequestToDock {
                protocol_version: 9,
            })
            .unwrap();
        pipeline
            .receive(&frame(LinkPacket::Transfer { seq: 1, data: rtdk }))
            .unwrap();
        assert_eq!(pipeline.session().state(), SessionState::InitiatedDocking);
        pipeline.take_output();

        pipeline
            .receive(&frame(LinkPacket::Disconnect { reason: 0 }))
            .unwrap();
        assert_eq!(pipeline.session().state(), SessionState::Disconnected);
        assert!(pipeline.take_output().is_empty());
    }
}
