//! Desktop side of the Newton dock protocol.
//!
//! Dock packets travel inside the link layer's transfer payloads. This
//! crate splits that byte stream into [`DockPacket`]s, answers the docking
//! handshake and tracks the session through [`DockSession`]:
//!
//! ```text
//! device                         desktop
//!   rtdk ───────────────────────▶
//!        ◀─────────────────────── dock
//!   name ───────────────────────▶
//!        ◀─────────────────────── dinf
//!   ninf ───────────────────────▶
//!        ◀─────────────────────── wicn
//!   dres ───────────────────────▶
//!        ◀─────────────────────── stim
//!   pass ───────────────────────▶
//!        ◀─────────────────────── pass   (connected)
//! ```

pub mod cipher;
pub mod error;
pub mod framer;
pub mod packet;
pub mod session;
pub mod subprotocol;

pub use cipher::{CipherError, Des};
pub use error::{DockError, Result};
pub use framer::{PacketConfig, PacketFramer, DEFAULT_MAX_LENGTH, HEADER_SIZE, MAGIC};
pub use packet::{
    icons, result_code, Command, DesktopInfo, DesktopType, DockPacket, NewtonInfo, SessionKey,
    SessionType,
};
pub use session::{
    Connection, DockConfig, DockEvent, DockHost, DockSession, SessionState, CIPHER_KEY,
    DESKTOP_KEY,
};
pub use subprotocol::{Control, Detached, SubProtocol, SubProtocols};
