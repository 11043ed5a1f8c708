use newton_nsof::NewtonObject;
use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::cipher::Des;
use crate::error::{DockError, Result};
use crate::packet::{
    icons, result_code, DesktopInfo, DesktopType, DockPacket, NewtonInfo, SessionKey,
    SessionType,
};
use crate::subprotocol::{Control, SessionCore, SubProtocols};

/// Key the desktop presents in its desktop info.
pub const DESKTOP_KEY: [u8; 8] = [0x64, 0x23, 0xef, 0x02, 0xfb, 0xcd, 0xc5, 0xa5];

/// Key the device's session key is encrypted with to answer the password
/// challenge.
pub const CIPHER_KEY: [u8; 8] = [0xe4, 0x0f, 0x7e, 0x9f, 0x0a, 0x36, 0x2c, 0xfa];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Disconnected,
    InitiatedDocking,
    SentDesktopInfo,
    SentWhichIcons,
    SentSetTimeout,
    Connected,
    KeyboardPassthrough,
    BackingUp,
    LoadingPackage,
}

/// Identity of the docked device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Connection {
    pub info: NewtonInfo,
    pub name: String,
}

/// Notifications from a [`DockSession`] to its host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DockEvent {
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    Connected {
        connection: Connection,
    },
    Disconnected {
        connection: Connection,
    },
    CallResult {
        result: NewtonObject,
    },
}

/// Where a session sends packets and events.
pub trait DockHost {
    fn write(&mut self, packet: &DockPacket) -> Result<()>;
    fn notify(&mut self, event: DockEvent);
}

/// Handshake parameters.
#[derive(Debug, Clone)]
pub struct DockConfig {
    /// Protocol version sent in desktop info. Default: 10.
    pub protocol_version: u32,
    pub desktop_type: DesktopType,
    pub desktop_key: SessionKey,
    /// Desktop applications advertised to the device.
    pub desktop_apps: NewtonObject,
    /// Seconds sent in set-timeout. Default: 60.
    pub timeout_seconds: u32,
    /// Which-icons mask. Default: all.
    pub icon_mask: u32,
    pub cipher_key: [u8; 8],
    /// Result code sent before dropping a session on an out-of-order packet.
    pub sequencing_error_code: i32,
}

impl Default for DockConfig {
    fn default() -> Self {
        Self {
            protocol_version: 10,
            desktop_type: DesktopType::Macintosh,
            desktop_key: SessionKey(DESKTOP_KEY),
            desktop_apps: NewtonObject::PlainArray(vec![NewtonObject::frame([
                ("id", NewtonObject::Integer(2)),
                ("name", NewtonObject::from("Newton Connection Utilities")),
                ("version", NewtonObject::Integer(1)),
            ])]),
            timeout_seconds: 60,
            icon_mask: icons::ALL,
            cipher_key: CIPHER_KEY,
            sequencing_error_code: result_code::DESKTOP_ERROR,
        }
    }
}

struct Core<H> {
    host: H,
    state: SessionState,
}

impl<H: DockHost> SessionCore for Core<H> {
    fn state(&self) -> SessionState {
        self.state
    }

    fn set_state(&mut self, state: SessionState) {
        let from = self.state;
        if from == state {
            return;
        }
        self.state = state;
        debug!(?from, to = ?state, "dock session state changed");
        self.host
            .notify(DockEvent::StateChanged { from, to: state });
    }

    fn write(&mut self, packet: &DockPacket) -> Result<()> {
        trace!(command = %packet.command(), "dock packet sent");
        self.host.write(packet)
    }
}

/// The desktop side of a dock session.
///
/// Feed it decoded packets with [`read`](DockSession::read); it answers
/// through its [`DockHost`].
pub struct DockSession<H> {
    core: Core<H>,
    config: DockConfig,
    cipher: Des,
    session_key: Option<SessionKey>,
    connection: Option<Connection>,
    sub_protocols: SubProtocols,
}

impl<H: DockHost> DockSession<H> {
    pub fn new(host: H) -> Result<Self> {
        Self::with_config(host, DockConfig::default())
    }

    pub fn with_config(host: H, config: DockConfig) -> Result<Self> {
        let cipher = Des::new(&config.cipher_key)?;
        Ok(Self {
            core: Core {
                host,
                state: SessionState::Disconnected,
            },
            config,
            cipher,
            session_key: None,
            connection: None,
            sub_protocols: SubProtocols::default(),
        })
    }

    /// Replace the keyboard, backup and package collaborators.
    pub fn with_sub_protocols(mut self, sub_protocols: SubProtocols) -> Self {
        self.sub_protocols = sub_protocols;
        self
    }

    pub fn state(&self) -> SessionState {
        self.core.state
    }

    /// Any state but disconnected.
    pub fn is_connected(&self) -> bool {
        self.core.state != SessionState::Disconnected
    }

    pub fn connection(&self) -> Option<&Connection> {
        self.connection.as_ref()
    }

    pub fn host(&self) -> &H {
        &self.core.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.core.host
    }

    /// Process one packet from the device.
    pub fn read(&mut self, packet: DockPacket) -> Result<()> {
        if packet == DockPacket::Disconnect {
            return self.disconnect();
        }

        match self.core.state {
            SessionState::Disconnected => {
                if let DockPacket::RequestToDock { protocol_version } = packet {
                    debug!(protocol_version, "device requested docking");
                    self.core.write(&DockPacket::InitiateDocking {
                        session_type: SessionType::NoSession,
                    })?;
                    self.core.set_state(SessionState::InitiatedDocking);
                } else {
                    trace!(command = %packet.command(), "ignoring packet while disconnected");
                }
            }
            SessionState::InitiatedDocking => match packet {
                DockPacket::NewtonName { info, name } => {
                    debug!(%name, "device identified");
                    self.connection = Some(Connection { info, name });
                    let desktop_info = self.desktop_info();
                    self.core.write(&desktop_info)?;
                    self.core.set_state(SessionState::SentDesktopInfo);
                }
                other => self.sequencing_error(other)?,
            },
            SessionState::SentDesktopInfo => match packet {
                DockPacket::NewtonInfo { encrypted_key, .. } => {
                    self.session_key = Some(encrypted_key);
                    self.core.write(&DockPacket::WhichIcons {
                        mask: self.config.icon_mask,
                    })?;
                    self.core.set_state(SessionState::SentWhichIcons);
                }
                other => self.sequencing_error(other)?,
            },
            SessionState::SentWhichIcons => match packet {
                DockPacket::Result { error_code } => {
                    if error_code != result_code::OK {
                        return Err(DockError::WhichIconsRejected(error_code));
                    }
                    self.core.write(&DockPacket::SetTimeout {
                        seconds: self.config.timeout_seconds,
                    })?;
                    self.core.set_state(SessionState::SentSetTimeout);
                }
                other => self.sequencing_error(other)?,
            },
            SessionState::SentSetTimeout => match packet {
                DockPacket::Password { .. } => self.answer_password()?,
                other => self.sequencing_error(other)?,
            },
            SessionState::Connected => self.read_connected(packet)?,
            SessionState::KeyboardPassthrough => {
                let mut control = Control::new(&mut self.core);
                self.sub_protocols.keyboard.read(&packet, &mut control)?;
            }
            SessionState::BackingUp => {
                let mut control = Control::new(&mut self.core);
                self.sub_protocols.backup.read(&packet, &mut control)?;
            }
            SessionState::LoadingPackage => {
                let mut control = Control::new(&mut self.core);
                self.sub_protocols.package.read(&packet, &mut control)?;
            }
        }
        Ok(())
    }

    fn read_connected(&mut self, packet: DockPacket) -> Result<()> {
        match packet {
            DockPacket::OperationCanceled => {
                self.core.write(&DockPacket::OperationCanceledAck)?;
            }
            DockPacket::StartKeyboardPassthrough => {
                self.enter(SessionState::KeyboardPassthrough, |sub, control| {
                    sub.keyboard.handle_request(control)
                })?;
            }
            DockPacket::RequestToSync => {
                self.enter(SessionState::BackingUp, |sub, control| {
                    sub.backup.handle_request(control)
                })?;
            }
            DockPacket::CallResult { result } => {
                self.core.host.notify(DockEvent::CallResult { result });
                Control::new(&mut self.core).complete_operation()?;
            }
            other => {
                trace!(command = %other.command(), "ignoring packet while connected");
            }
        }
        Ok(())
    }

    /// Switch to an active state and let its collaborator start. The state
    /// is set first so the collaborator may finish synchronously; on failure
    /// the session goes back to connected.
    fn enter<F>(&mut self, state: SessionState, start: F) -> Result<()>
    where
        F: FnOnce(&mut SubProtocols, &mut Control<'_>) -> Result<()>,
    {
        self.core.set_state(state);
        let result = start(&mut self.sub_protocols, &mut Control::new(&mut self.core));
        if result.is_err() && self.core.state == state {
            self.core.set_state(SessionState::Connected);
        }
        result
    }

    fn desktop_info(&self) -> DockPacket {
        DockPacket::DesktopInfo(DesktopInfo {
            protocol_version: self.config.protocol_version,
            desktop_type: self.config.desktop_type,
            encrypted_key: self.config.desktop_key,
            session_type: SessionType::SettingUp,
            allow_selective_sync: false,
            desktop_apps: self.config.desktop_apps.clone(),
        })
    }

    fn answer_password(&mut self) -> Result<()> {
        let key = self.session_key.ok_or(DockError::MissingSessionKey)?;
        let encrypted = self.cipher.encrypt(&key.0)?;
        self.core.write(&DockPacket::Password {
            key: SessionKey(encrypted),
        })?;
        self.core.set_state(SessionState::Connected);
        if let Some(connection) = &self.connection {
            debug!(name = %connection.name, "dock session established");
            self.core.host.notify(DockEvent::Connected {
                connection: connection.clone(),
            });
        }
        Ok(())
    }

    fn sequencing_error(&mut self, packet: DockPacket) -> Result<()> {
        if packet == DockPacket::Hello {
            trace!(state = ?self.core.state, "ignoring hello during handshake");
            return Ok(());
        }
        warn!(
            state = ?self.core.state,
            command = %packet.command(),
            "unexpected packet, dropping session"
        );
        self.core.write(&DockPacket::Result {
            error_code: self.config.sequencing_error_code,
        })?;
        self.disconnect()
    }

    /// End the session. Always sends a disconnect to the device.
    pub fn disconnect(&mut self) -> Result<()> {
        self.session_key = None;
        let connection = self.connection.take();

        self.sub_protocols.keyboard.handle_disconnect();
        self.sub_protocols.backup.handle_disconnect();
        self.sub_protocols.package.handle_disconnect();

        self.core.set_state(SessionState::Disconnected);
        let written = self.core.write(&DockPacket::Disconnect);

        if let Some(connection) = connection {
            debug!(name = %connection.name, "dock session ended");
            self.core
                .host
                .notify(DockEvent::Disconnected { connection });
        }
        written
    }

    pub fn start_keyboard_passthrough(&mut self) -> Result<()> {
        match self.core.state {
            SessionState::KeyboardPassthrough => Ok(()),
            SessionState::Connected => {
                self.enter(SessionState::KeyboardPassthrough, |sub, control| {
                    sub.keyboard.start(control, None)
                })
            }
            _ => Err(DockError::NotConnected),
        }
    }

    pub fn start_backup(&mut self) -> Result<()> {
        match self.core.state {
            SessionState::BackingUp => Ok(()),
            SessionState::Connected => self.enter(SessionState::BackingUp, |sub, control| {
                sub.backup.start(control, None)
            }),
            _ => Err(DockError::NotConnected),
        }
    }

    pub fn load_package(&mut self, data: &[u8]) -> Result<()> {
        match self.core.state {
            SessionState::LoadingPackage => Err(DockError::LoadingPackage),
            SessionState::Connected => self.enter(SessionState::LoadingPackage, |sub, control| {
                sub.package.start(control, Some(data))
            }),
            _ => Err(DockError::NotConnected),
        }
    }

    /// Ask the device to call a global function. The answer arrives as a
    /// [`DockEvent::CallResult`].
    pub fn call_global_function(
        &mut self,
        name: &str,
        arguments: Vec<NewtonObject>,
    ) -> Result<()> {
        self.require_connected()?;
        self.core.write(&DockPacket::CallGlobalFunction {
            name: name.to_owned(),
            arguments,
        })
    }

    /// Ask the device to call a method on its root frame.
    pub fn call_root_method(
        &mut self,
        name: &str,
        arguments: Vec<NewtonObject>,
    ) -> Result<()> {
        self.require_connected()?;
        self.core.write(&DockPacket::CallRootMethod {
            name: name.to_owned(),
            arguments,
        })
    }

    fn require_connected(&self) -> Result<()> {
        if self.core.state == SessionState::Connected {
            Ok(())
        } else {
            Err(DockError::NotConnected)
        }
    }
}

impl<H> std::fmt::Debug for DockSession<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DockSession")
            .field("state", &self.core.state)
            .field("connection", &self.connection)
            .field("session_key", &self.session_key)
            .finish_non_exhaustive()
    }
}
