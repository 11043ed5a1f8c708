//! Talk to Newton handhelds over their serial dock connection.
//!
//! # Crate Structure
//!
//! - [`transport`]: raw serial line to the device
//! - [`mnp`]: link framing and the link session
//! - [`nsof`]: Newton Streamed Object Format
//! - [`dock`]: dock packets, the docking handshake and session state
//! - [`Pipeline`]: the layers above wired together, bytes in and bytes out

pub mod pipeline;

pub use pipeline::{Pipeline, PipelineConfig, WireHost};

/// Re-export transport types.
pub mod transport {
    pub use newton_transport::*;
}

/// Re-export link layer types.
pub mod mnp {
    pub use newton_mnp::*;
}

/// Re-export object format types.
pub mod nsof {
    pub use newton_nsof::*;
}

/// Re-export dock protocol types.
pub mod dock {
    pub use newton_dock::*;
}
