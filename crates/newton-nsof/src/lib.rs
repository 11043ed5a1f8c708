//! Newton Streamed Object Format.
//!
//! NSOF is how a Newton serializes objects from its object store: frames,
//! arrays, strings, symbols, binaries and immediates. Every stream starts with
//! a version byte followed by a single root object. Objects written earlier in
//! a stream can be referenced again by index ("precedents"), which is how
//! shared structure and repeated symbols are expressed.
//!
//! ```
//! use newton_nsof::{decode_root, encode_root, NewtonObject};
//!
//! let apps = NewtonObject::PlainArray(vec![NewtonObject::frame([
//!     ("id", NewtonObject::from(2)),
//!     ("name", NewtonObject::from("Newton Connection Utilities")),
//!     ("version", NewtonObject::from(1)),
//! ])]);
//!
//! let bytes = encode_root(&apps).unwrap();
//! let (decoded, used) = decode_root(&bytes).unwrap();
//! assert_eq!(decoded, apps);
//! assert_eq!(used, bytes.len());
//! ```

pub mod decode;
pub mod encode;
pub mod error;
pub mod object;
pub mod tag;

pub use decode::decode_root;
pub use encode::encode_root;
pub use error::{NsofError, Result};
pub use object::{NewtonObject, MAX_DEPTH, MAX_INTEGER, MIN_INTEGER};
