use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use newton_nsof::{decode_root, encode_root, NewtonObject};
use serde::Serialize;

use crate::error::{DockError, Result};

/// Dock result codes.
pub mod result_code {
    pub const OK: i32 = 0;
    /// Generic desktop-side failure.
    pub const DESKTOP_ERROR: i32 = -28028;
    /// Packet not valid in the current protocol state.
    pub const PROTOCOL_ERROR: i32 = -28012;
}

/// Which-icons mask bits.
pub mod icons {
    pub const BACKUP: u32 = 1;
    pub const RESTORE: u32 = 2;
    pub const INSTALL: u32 = 4;
    pub const IMPORT: u32 = 8;
    pub const SYNC: u32 = 16;
    pub const KEYBOARD: u32 = 32;
    pub const ALL: u32 = BACKUP | RESTORE | INSTALL | IMPORT | SYNC | KEYBOARD;
}

/// Dock command codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    RequestToDock,
    InitiateDocking,
    NewtonName,
    DesktopInfo,
    NewtonInfo,
    WhichIcons,
    Result,
    SetTimeout,
    Password,
    Disconnect,
    OperationCanceled,
    OperationCanceledAck,
    StartKeyboardPassthrough,
    RequestToSync,
    CallResult,
    OperationDone,
    CallGlobalFunction,
    CallRootMethod,
    DesktopInControl,
    Hello,
}

impl Command {
    pub const ALL: [Command; 20] = [
        Self::RequestToDock,
        Self::InitiateDocking,
        Self::NewtonName,
        Self::DesktopInfo,
        Self::NewtonInfo,
        Self::WhichIcons,
        Self::Result,
        Self::SetTimeout,
        Self::Password,
        Self::Disconnect,
        Self::OperationCanceled,
        Self::OperationCanceledAck,
        Self::StartKeyboardPassthrough,
        Self::RequestToSync,
        Self::CallResult,
        Self::OperationDone,
        Self::CallGlobalFunction,
        Self::CallRootMethod,
        Self::DesktopInControl,
        Self::Hello,
    ];

    /// Four-character wire code.
    pub fn code(self) -> &'static str {
        match self {
            Self::RequestToDock => "rtdk",
            Self::InitiateDocking => "dock",
            Self::NewtonName => "name",
            Self::DesktopInfo => "dinf",
            Self::NewtonInfo => "ninf",
            Self::WhichIcons => "wicn",
            Self::Result => "dres",
            Self::SetTimeout => "stim",
            Self::Password => "pass",
            Self::Disconnect => "disc",
            Self::OperationCanceled => "opca",
            Self::OperationCanceledAck => "ocaa",
            Self::StartKeyboardPassthrough => "kybd",
            Self::RequestToSync => "ssyn",
            Self::CallResult => "cres",
            Self::OperationDone => "opdn",
            Self::CallGlobalFunction => "cgfn",
            Self::CallRootMethod => "crmf",
            Self::DesktopInControl => "dsnc",
            Self::Hello => "helo",
        }
    }

    pub fn from_code(code: &[u8]) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|command| command.code().as_bytes() == code)
    }

    /// Whether the device sends this command, so we know how to read it.
    pub fn is_decodable(self) -> bool {
        matches!(
            self,
            Self::RequestToDock
                | Self::NewtonName
                | Self::NewtonInfo
                | Self::Result
                | Self::Password
                | Self::Disconnect
                | Self::OperationCanceled
                | Self::OperationCanceledAck
                | Self::StartKeyboardPassthrough
                | Self::RequestToSync
                | Self::CallResult
                | Self::OperationDone
                | Self::Hello
        )
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum SessionType {
    NoSession = 0,
    SettingUp = 1,
    Synchronize = 2,
    Restore = 3,
    LoadPackage = 4,
    TestComm = 5,
    LoadPatch = 6,
    UpdatingStores = 7,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum DesktopType {
    Macintosh = 0,
    Windows = 1,
}

/// 8 bytes of key material exchanged during the handshake.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SessionKey(pub [u8; 8]);

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionKey(<redacted>)")
    }
}

/// Device description sent with the device name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NewtonInfo {
    pub newton_id: u32,
    pub manufacturer: u32,
    pub machine_type: u32,
    pub rom_version: u32,
    pub rom_stage: u32,
    pub ram_size: u32,
    pub screen_height: u32,
    pub screen_width: u32,
    pub patch_version: u32,
    pub nos_version: u32,
    pub internal_store_signature: u32,
    pub screen_resolution_v: u32,
    pub screen_resolution_h: u32,
    pub screen_depth: u32,
}

const NEWTON_INFO_FIELDS: usize = 14;

impl NewtonInfo {
    fn fields(&self) -> [u32; NEWTON_INFO_FIELDS] {
        [
            self.newton_id,
            self.manufacturer,
            self.machine_type,
            self.rom_version,
            self.rom_stage,
            self.ram_size,
            self.screen_height,
            self.screen_width,
            self.patch_version,
            self.nos_version,
            self.internal_store_signature,
            self.screen_resolution_v,
            self.screen_resolution_h,
            self.screen_depth,
        ]
    }

    /// Older systems send fewer fields; missing ones stay zero.
    fn from_fields(values: &[u32]) -> Self {
        let mut fields = [0u32; NEWTON_INFO_FIELDS];
        for (field, value) in fields.iter_mut().zip(values) {
            *field = *value;
        }
        let [
            newton_id,
            manufacturer,
            machine_type,
            rom_version,
            rom_stage,
            ram_size,
            screen_height,
            screen_width,
            patch_version,
            nos_version,
            internal_store_signature,
            screen_resolution_v,
            screen_resolution_h,
            screen_depth,
        ] = fields;
        Self {
            newton_id,
            manufacturer,
            machine_type,
            rom_version,
            rom_stage,
            ram_size,
            screen_height,
            screen_width,
            patch_version,
            nos_version,
            internal_store_signature,
            screen_resolution_v,
            screen_resolution_h,
            screen_depth,
        }
    }
}

/// Desktop description answering the device name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesktopInfo {
    pub protocol_version: u32,
    pub desktop_type: DesktopType,
    pub encrypted_key: SessionKey,
    pub session_type: SessionType,
    pub allow_selective_sync: bool,
    pub desktop_apps: NewtonObject,
}

/// A dock protocol packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DockPacket {
    RequestToDock { protocol_version: u32 },
    InitiateDocking { session_type: SessionType },
    NewtonName { info: NewtonInfo, name: String },
    DesktopInfo(DesktopInfo),
    NewtonInfo { protocol_version: u32, encrypted_key: SessionKey },
    WhichIcons { mask: u32 },
    Result { error_code: i32 },
    SetTimeout { seconds: u32 },
    Password { key: SessionKey },
    Disconnect,
    OperationCanceled,
    OperationCanceledAck,
    StartKeyboardPassthrough,
    RequestToSync,
    CallResult { result: NewtonObject },
    OperationDone,
    CallGlobalFunction { name: String, arguments: Vec<NewtonObject> },
    CallRootMethod { name: String, arguments: Vec<NewtonObject> },
    DesktopInControl,
    Hello,
}

impl DockPacket {
    pub fn command(&self) -> Command {
        match self {
            Self::RequestToDock { .. } => Command::RequestToDock,
            Self::InitiateDocking { .. } => Command::InitiateDocking,
            Self::NewtonName { .. } => Command::NewtonName,
            Self::DesktopInfo(_) => Command::DesktopInfo,
            Self::NewtonInfo { .. } => Command::NewtonInfo,
            Self::WhichIcons { .. } => Command::WhichIcons,
            Self::Result { .. } => Command::Result,
            Self::SetTimeout { .. } => Command::SetTimeout,
            Self::Password { .. } => Command::Password,
            Self::Disconnect => Command::Disconnect,
            Self::OperationCanceled => Command::OperationCanceled,
            Self::OperationCanceledAck => Command::OperationCanceledAck,
            Self::StartKeyboardPassthrough => Command::StartKeyboardPassthrough,
            Self::RequestToSync => Command::RequestToSync,
            Self::CallResult { .. } => Command::CallResult,
            Self::OperationDone => Command::OperationDone,
            Self::CallGlobalFunction { .. } => Command::CallGlobalFunction,
            Self::CallRootMethod { .. } => Command::CallRootMethod,
            Self::DesktopInControl => Command::DesktopInControl,
            Self::Hello => Command::Hello,
        }
    }

    /// Decode a packet body.
    ///
    /// Returns `Ok(None)` for commands only the desktop sends.
    pub fn decode(command: Command, data: &[u8]) -> Result<Option<Self>> {
        let mut body = Body { command, data };
        let packet = match command {
            Command::RequestToDock => Self::RequestToDock {
                protocol_version: body.u32()?,
            },
            Command::NewtonName => body.newton_name()?,
            Command::NewtonInfo => Self::NewtonInfo {
                protocol_version: body.u32()?,
                encrypted_key: body.key()?,
            },
            Command::Result => Self::Result {
                error_code: body.u32()? as i32,
            },
            Command::Password => Self::Password { key: body.key()? },
            Command::CallResult => Self::CallResult {
                result: decode_root(data)?.0,
            },
            Command::Disconnect => Self::Disconnect,
            Command::OperationCanceled => Self::OperationCanceled,
            Command::OperationCanceledAck => Self::OperationCanceledAck,
            Command::StartKeyboardPassthrough => Self::StartKeyboardPassthrough,
            Command::RequestToSync => Self::RequestToSync,
            Command::OperationDone => Self::OperationDone,
            Command::Hello => Self::Hello,
            _ => return Ok(None),
        };
        Ok(Some(packet))
    }

    /// Encode the packet body, without header or padding.
    pub fn encode_body(&self) -> Result<Bytes> {
        let mut dst = BytesMut::new();
        match self {
            Self::RequestToDock { protocol_version } => dst.put_u32(*protocol_version),
            Self::InitiateDocking { session_type } => dst.put_u32(*session_type as u32),
            Self::NewtonName { info, name } => {
                dst.put_u32((NEWTON_INFO_FIELDS * 4) as u32);
                for field in info.fields() {
                    dst.put_u32(field);
                }
                for unit in name.encode_utf16().chain(std::iter::once(0)) {
                    dst.put_u16(unit);
                }
            }
            Self::DesktopInfo(info) => {
                dst.put_u32(info.protocol_version);
                dst.put_u32(info.desktop_type as u32);
                dst.put_slice(&info.encrypted_key.0);
                dst.put_u32(info.session_type as u32);
                dst.put_u32(u32::from(info.allow_selective_sync));
                dst.put_slice(&encode_root(&info.desktop_apps)?);
            }
            Self::NewtonInfo {
                protocol_version,
                encrypted_key,
            } => {
                dst.put_u32(*protocol_version);
                dst.put_slice(&encrypted_key.0);
            }
            Self::WhichIcons { mask } => dst.put_u32(*mask),
            Self::Result { error_code } => dst.put_i32(*error_code),
            Self::SetTimeout { seconds } => dst.put_u32(*seconds),
            Self::Password { key } => dst.put_slice(&key.0),
            Self::CallResult { result } => dst.put_slice(&encode_root(result)?),
            Self::CallGlobalFunction { name, arguments }
            | Self::CallRootMethod { name, arguments } => {
                dst.put_slice(&encode_root(&NewtonObject::symbol(name.as_str()))?);
                dst.put_slice(&encode_root(&NewtonObject::PlainArray(arguments.clone()))?);
            }
            Self::Disconnect
            | Self::OperationCanceled
            | Self::OperationCanceledAck
            | Self::StartKeyboardPassthrough
            | Self::RequestToSync
            | Self::OperationDone
            | Self::DesktopInControl
            | Self::Hello => {}
        }
        Ok(dst.freeze())
    }
}

struct Body<'a> {
    command: Command,
    data: &'a [u8],
}

impl Body<'_> {
    fn invalid(&self, reason: &'static str) -> DockError {
        DockError::InvalidData {
            command: self.command,
            reason,
        }
    }

    fn u32(&mut self) -> Result<u32> {
        if self.data.remaining() < 4 {
            return Err(self.invalid("truncated"));
        }
        Ok(self.data.get_u32())
    }

    fn key(&mut self) -> Result<SessionKey> {
        let mut key = [0u8; 8];
        if self.data.remaining() < key.len() {
            return Err(self.invalid("truncated key"));
        }
        self.data.copy_to_slice(&mut key);
        Ok(SessionKey(key))
    }

    fn newton_name(&mut self) -> Result<DockPacket> {
        let info_len = self.u32()? as usize;
        if self.data.len() < info_len {
            return Err(self.invalid("truncated device info"));
        }
        let data = self.data;
        let (info, name) = data.split_at(info_len);

        let fields: Vec<u32> = info
            .chunks_exact(4)
            .map(|chunk| u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        let units: Vec<u16> = name
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .take_while(|unit| *unit != 0)
            .collect();
        let name = String::from_utf16(&units).map_err(|_| self.invalid("name is not UTF-16"))?;

        Ok(DockPacket::NewtonName {
            info: NewtonInfo::from_fields(&fields),
            name,
        })
    }
}
