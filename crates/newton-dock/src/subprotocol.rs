use tracing::trace;

use crate::error::Result;
use crate::packet::DockPacket;
use crate::session::SessionState;

/// What a sub-protocol may do to the session it runs in.
pub(crate) trait SessionCore {
    fn state(&self) -> SessionState;
    fn set_state(&mut self, state: SessionState);
    fn write(&mut self, packet: &DockPacket) -> Result<()>;
}

/// Handle given to a [`SubProtocol`] for the duration of one call.
pub struct Control<'a> {
    core: &'a mut dyn SessionCore,
}

impl<'a> Control<'a> {
    pub(crate) fn new(core: &'a mut dyn SessionCore) -> Self {
        Self { core }
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.core.state()
    }

    /// Send a packet to the device.
    pub fn write(&mut self, packet: &DockPacket) -> Result<()> {
        self.core.write(packet)
    }

    /// Tell the device the operation is done and return to connected.
    pub fn complete_operation(&mut self) -> Result<()> {
        self.core.write(&DockPacket::OperationDone)?;
        self.core.set_state(SessionState::Connected);
        Ok(())
    }

    /// Acknowledge a cancel from the device and return to connected.
    pub fn acknowledge_operation_canceled(&mut self) -> Result<()> {
        self.core.write(&DockPacket::OperationCanceledAck)?;
        self.core.set_state(SessionState::Connected);
        Ok(())
    }

    /// Tell the device the desktop is driving the next exchange.
    pub fn start_desktop_control(&mut self) -> Result<()> {
        self.core.write(&DockPacket::DesktopInControl)
    }

    /// Return to connected without sending anything.
    pub fn finish(&mut self) {
        self.core.set_state(SessionState::Connected);
    }
}

/// A session operation that takes over the dock conversation for a while:
/// keyboard passthrough, backup or package loading.
///
/// While its state is active, every packet except disconnect is routed to
/// [`read`](SubProtocol::read).
pub trait SubProtocol {
    /// The desktop starts the operation. `payload` carries the package for
    /// package loading.
    fn start(&mut self, control: &mut Control<'_>, payload: Option<&[u8]>) -> Result<()>;

    /// The device asked to start the operation.
    fn handle_request(&mut self, control: &mut Control<'_>) -> Result<()>;

    fn read(&mut self, packet: &DockPacket, control: &mut Control<'_>) -> Result<()>;

    /// The session ended. Drop any in-flight state.
    fn handle_disconnect(&mut self);
}

/// Sub-protocol with no wire behavior of its own.
///
/// Accepts any start, and hands the session back when the device cancels or
/// finishes the operation.
#[derive(Debug, Default)]
pub struct Detached;

impl SubProtocol for Detached {
    fn start(&mut self, _control: &mut Control<'_>, _payload: Option<&[u8]>) -> Result<()> {
        Ok(())
    }

    fn handle_request(&mut self, _control: &mut Control<'_>) -> Result<()> {
        Ok(())
    }

    fn read(&mut self, packet: &DockPacket, control: &mut Control<'_>) -> Result<()> {
        match packet {
            DockPacket::OperationCanceled => control.acknowledge_operation_canceled(),
            DockPacket::OperationDone => {
                control.finish();
                Ok(())
            }
            other => {
                trace!(command = %other.command(), "detached sub-protocol ignoring packet");
                Ok(())
            }
        }
    }

    fn handle_disconnect(&mut self) {}
}

/// The collaborators a session routes its active states to.
pub struct SubProtocols {
    pub keyboard: Box<dyn SubProtocol>,
    pub backup: Box<dyn SubProtocol>,
    pub package: Box<dyn SubProtocol>,
}

impl Default for SubProtocols {
    fn default() -> Self {
        Self {
            keyboard: Box::new(Detached),
            backup: Box::new(Detached),
            package: Box::new(Detached),
        }
    }
}

impl std::fmt::Debug for SubProtocols {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubProtocols").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct FakeCore {
        state: Option<SessionState>,
        written: Vec<DockPacket>,
    }

    impl SessionCore for FakeCore {
        fn state(&self) -> SessionState {
            self.state.unwrap_or(SessionState::BackingUp)
        }

        fn set_state(&mut self, state: SessionState) {
            self.state = Some(state);
        }

        fn write(&mut self, packet: &DockPacket) -> Result<()> {
            self.written.push(packet.clone());
            Ok(())
        }
    }

    #[test]
    fn control_operations_write_and_transition() {
        let mut core = FakeCore::default();
        let mut control = Control::new(&mut core);

        control.start_desktop_control().unwrap();
        assert_eq!(control.state(), SessionState::BackingUp);
        control.complete_operation().unwrap();
        assert_eq!(control.state(), SessionState::Connected);

        assert_eq!(
            core.written,
            vec![DockPacket::DesktopInControl, DockPacket::OperationDone]
        );
    }

    #[test]
    fn detached_acknowledges_cancel() {
        let mut core = FakeCore::default();
        Detached
            .read(&DockPacket::OperationCanceled, &mut Control::new(&mut core))
            .unwrap();
        assert_eq!(core.written, vec![DockPacket::OperationCanceledAck]);
        assert_eq!(core.state, Some(SessionState::Connected));
    }

    #[test]
    fn detached_finishes_silently_on_done() {
        let mut core = FakeCore::default();
        Detached
            .read(&DockPacket::OperationDone, &mut Control::new(&mut core))
            .unwrap();
        assert!(core.written.is_empty());
        assert_eq!(core.state, Some(SessionState::Connected));
    }

    #[test]
    fn detached_ignores_other_packets() {
        let mut core = FakeCore::default();
        Detached
            .read(&DockPacket::Hello, &mut Control::new(&mut core))
            .unwrap();
        assert!(core.written.is_empty());
        assert_eq!(core.state, None);
    }
}
