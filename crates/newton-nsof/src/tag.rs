//! Wire constants.

/// Version byte written at the start of every root.
pub const VERSION: u8 = 2;

pub const IMMEDIATE: u8 = 0;
pub const CHARACTER: u8 = 1;
pub const UNICODE_CHARACTER: u8 = 2;
pub const BINARY: u8 = 3;
pub const ARRAY: u8 = 4;
pub const PLAIN_ARRAY: u8 = 5;
pub const FRAME: u8 = 6;
pub const SYMBOL: u8 = 7;
pub const STRING: u8 = 8;
pub const PRECEDENT: u8 = 9;
pub const NIL: u8 = 10;
pub const SMALL_RECT: u8 = 11;

/// Immediate reference for `true`.
pub const TRUE_REF: u32 = 0x1a;
