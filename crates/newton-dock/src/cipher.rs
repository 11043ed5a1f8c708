//! DES block cipher, encryption direction only.
//!
//! The dock handshake proves the desktop knows a shared secret by returning
//! the device's challenge encrypted under a fixed key. Round keys are kept in
//! an expanded form where each 6-bit group of the 48-bit subkey sits in the low
//! bits of its own byte, so the S-box inputs can be read off directly.

/// Errors from the cipher.
#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("invalid {what} length {actual}, expected {expected}")]
    InvalidLength {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
}

pub const BLOCK_SIZE: usize = 8;
pub const KEY_SIZE: usize = 8;

const ROTATIONS: [u32; 16] = [1, 1, 2, 2, 2, 2, 2, 2, 1, 2, 2, 2, 2, 2, 2, 1];

/// Source group for each byte of an expanded value.
const GROUP_ORDER: [u32; 8] = [1, 3, 5, 7, 0, 2, 4, 6];

/// Byte of an expanded value holding the input of each S-box.
const S_BOX_BYTE: [u32; 8] = [3, 7, 2, 6, 1, 5, 0, 4];

const INITIAL_PERMUTATION: [u8; 64] = [
    58, 50, 42, 34, 26, 18, 10, 2, 60, 52, 44, 36, 28, 20, 12, 4,
    62, 54, 46, 38, 30, 22, 14, 6, 64, 56, 48, 40, 32, 24, 16, 8,
    57, 49, 41, 33, 25, 17, 9, 1, 59, 51, 43, 35, 27, 19, 11, 3,
    61, 53, 45, 37, 29, 21, 13, 5, 63, 55, 47, 39, 31, 23, 15, 7,
];

const FINAL_PERMUTATION: [u8; 64] = [
    40, 8, 48, 16, 56, 24, 64, 32, 39, 7, 47, 15, 55, 23, 63, 31,
    38, 6, 46, 14, 54, 22, 62, 30, 37, 5, 45, 13, 53, 21, 61, 29,
    36, 4, 44, 12, 52, 20, 60, 28, 35, 3, 43, 11, 51, 19, 59, 27,
    34, 2, 42, 10, 50, 18, 58, 26, 33, 1, 41, 9, 49, 17, 57, 25,
];

const EXPANSION: [u8; 48] = [
    32, 1, 2, 3, 4, 5, 4, 5, 6, 7, 8, 9, 8, 9, 10, 11,
    12, 13, 12, 13, 14, 15, 16, 17, 16, 17, 18, 19, 20, 21, 20, 21,
    22, 23, 24, 25, 24, 25, 26, 27, 28, 29, 28, 29, 30, 31, 32, 1,
];

const PERMUTATION: [u8; 32] = [
    16, 7, 20, 21, 29, 12, 28, 17, 1, 15, 23, 26, 5, 18, 31, 10,
    2, 8, 24, 14, 32, 27, 3, 9, 19, 13, 30, 6, 22, 11, 4, 25,
];

const PERMUTED_CHOICE_1: [u8; 56] = [
    57, 49, 41, 33, 25, 17, 9, 1, 58, 50, 42, 34, 26, 18, 10, 2,
    59, 51, 43, 35, 27, 19, 11, 3, 60, 52, 44, 36, 63, 55, 47, 39,
    31, 23, 15, 7, 62, 54, 46, 38, 30, 22, 14, 6, 61, 53, 45, 37,
    29, 21, 13, 5, 28, 20, 12, 4,
];

const PERMUTED_CHOICE_2: [u8; 48] = [
    14, 17, 11, 24, 1, 5, 3, 28, 15, 6, 21, 10, 23, 19, 12, 4,
    26, 8, 16, 7, 27, 20, 13, 2, 41, 52, 31, 37, 47, 55, 30, 40,
    51, 45, 33, 48, 44, 49, 39, 56, 34, 53, 46, 42, 50, 36, 29, 32,
];

const S_BOXES: [[u8; 64]; 8] = [
    [
        14, 4, 13, 1, 2, 15, 11, 8, 3, 10, 6, 12, 5, 9, 0, 7,
        0, 15, 7, 4, 14, 2, 13, 1, 10, 6, 12, 11, 9, 5, 3, 8,
        4, 1, 14, 8, 13, 6, 2, 11, 15, 12, 9, 7, 3, 10, 5, 0,
        15, 12, 8, 2, 4, 9, 1, 7, 5, 11, 3, 14, 10, 0, 6, 13,
    ],
    [
        15, 1, 8, 14, 6, 11, 3, 4, 9, 7, 2, 13, 12, 0, 5, 10,
        3, 13, 4, 7, 15, 2, 8, 14, 12, 0, 1, 10, 6, 9, 11, 5,
        0, 14, 7, 11, 10, 4, 13, 1, 5, 8, 12, 6, 9, 3, 2, 15,
        13, 8, 10, 1, 3, 15, 4, 2, 11, 6, 7, 12, 0, 5, 14, 9,
    ],
    [
        10, 0, 9, 14, 6, 3, 15, 5, 1, 13, 12, 7, 11, 4, 2, 8,
        13, 7, 0, 9, 3, 4, 6, 10, 2, 8, 5, 14, 12, 11, 15, 1,
        13, 6, 4, 9, 8, 15, 3, 0, 11, 1, 2, 12, 5, 10, 14, 7,
        1, 10, 13, 0, 6, 9, 8, 7, 4, 15, 14, 3, 11, 5, 2, 12,
    ],
    [
        7, 13, 14, 3, 0, 6, 9, 10, 1, 2, 8, 5, 11, 12, 4, 15,
        13, 8, 11, 5, 6, 15, 0, 3, 4, 7, 2, 12, 1, 10, 14, 9,
        10, 6, 9, 0, 12, 11, 7, 13, 15, 1, 3, 14, 5, 2, 8, 4,
        3, 15, 0, 6, 10, 1, 13, 8, 9, 4, 5, 11, 12, 7, 2, 14,
    ],
    [
        2, 12, 4, 1, 7, 10, 11, 6, 8, 5, 3, 15, 13, 0, 14, 9,
        14, 11, 2, 12, 4, 7, 13, 1, 5, 0, 15, 10, 3, 9, 8, 6,
        4, 2, 1, 11, 10, 13, 7, 8, 15, 9, 12, 5, 6, 3, 0, 14,
        11, 8, 12, 7, 1, 14, 2, 13, 6, 15, 0, 9, 10, 4, 5, 3,
    ],
    [
        12, 1, 10, 15, 9, 2, 6, 8, 0, 13, 3, 4, 14, 7, 5, 11,
        10, 15, 4, 2, 7, 12, 9, 5, 6, 1, 13, 14, 0, 11, 3, 8,
        9, 14, 15, 5, 2, 8, 12, 3, 7, 0, 4, 10, 1, 13, 11, 6,
        4, 3, 2, 12, 9, 5, 15, 10, 11, 14, 1, 7, 6, 0, 8, 13,
    ],
    [
        4, 11, 2, 14, 15, 0, 8, 13, 3, 12, 9, 7, 5, 10, 6, 1,
        13, 0, 11, 7, 4, 9, 1, 10, 14, 3, 5, 12, 2, 15, 8, 6,
        1, 4, 11, 13, 12, 3, 7, 14, 10, 15, 6, 8, 0, 5, 9, 2,
        6, 11, 13, 8, 1, 4, 10, 7, 9, 5, 0, 15, 14, 2, 3, 12,
    ],
    [
        13, 2, 8, 4, 6, 15, 11, 1, 10, 9, 3, 14, 5, 0, 12, 7,
        1, 15, 13, 8, 10, 3, 7, 4, 12, 5, 6, 11, 0, 14, 9, 2,
        7, 11, 4, 1, 9, 12, 14, 2, 0, 6, 10, 13, 15, 3, 5, 8,
        2, 1, 14, 7, 4, 10, 8, 13, 15, 12, 9, 0, 3, 5, 6, 11,
    ],
];

/// A DES key schedule.
#[derive(Debug, Clone)]
pub struct Des {
    subkeys: [u64; 16],
}

impl Des {
    /// Derive the round keys from an 8-byte key. Parity bits are ignored.
    pub fn new(key: &[u8]) -> Result<Self, CipherError> {
        let key = block(key, "key")?;
        let permuted = permute(key, 64, &PERMUTED_CHOICE_1);
        let mut left = (permuted >> 28) as u32;
        let mut right = (permuted & 0x0fff_ffff) as u32;

        let mut subkeys = [0u64; 16];
        for (subkey, rotation) in subkeys.iter_mut().zip(ROTATIONS) {
            left = rotate_28(left, rotation);
            right = rotate_28(right, rotation);
            let combined = (u64::from(left) << 28) | u64::from(right);
            *subkey = expand_groups(permute(combined, 56, &PERMUTED_CHOICE_2));
        }
        Ok(Self { subkeys })
    }

    /// Round keys in expanded form.
    pub fn subkeys(&self) -> &[u64; 16] {
        &self.subkeys
    }

    /// Encrypt one 8-byte block.
    pub fn encrypt(&self, input: &[u8]) -> Result<[u8; BLOCK_SIZE], CipherError> {
        let input = block(input, "block")?;
        let permuted = permute(input, 64, &INITIAL_PERMUTATION);
        let mut left = (permuted >> 32) as u32;
        let mut right = permuted as u32;

        for subkey in &self.subkeys {
            let next = left ^ feistel(right, *subkey);
            left = right;
            right = next;
        }

        let preoutput = (u64::from(right) << 32) | u64::from(left);
        Ok(permute(preoutput, 64, &FINAL_PERMUTATION).to_be_bytes())
    }
}

fn block(bytes: &[u8], what: &'static str) -> Result<u64, CipherError> {
    let array: [u8; BLOCK_SIZE] = bytes.try_into().map_err(|_| CipherError::InvalidLength {
        what,
        expected: BLOCK_SIZE,
        actual: bytes.len(),
    })?;
    Ok(u64::from_be_bytes(array))
}

/// Apply a 1-based, most-significant-first permutation table to the low
/// `width` bits of `input`.
fn permute(input: u64, width: u32, table: &[u8]) -> u64 {
    table.iter().fold(0, |out, &position| {
        (out << 1) | ((input >> (width - u32::from(position))) & 1)
    })
}

fn rotate_28(half: u32, by: u32) -> u32 {
    ((half << by) | (half >> (28 - by))) & 0x0fff_ffff
}

/// Spread the eight 6-bit groups of a 48-bit value into separate bytes.
fn expand_groups(value: u64) -> u64 {
    GROUP_ORDER
        .iter()
        .enumerate()
        .fold(0, |out, (byte, &group)| {
            out | (((value >> (6 * group)) & 0xff) << (8 * byte))
        })
}

fn feistel(half: u32, subkey: u64) -> u32 {
    let mixed = expand_groups(permute(u64::from(half), 32, &EXPANSION)) ^ subkey;
    let substituted = S_BOXES
        .iter()
        .zip(S_BOX_BYTE)
        .fold(0u64, |out, (s_box, byte)| {
            let six = ((mixed >> (8 * byte)) & 0x3f) as usize;
            let row = ((six >> 4) & 0x2) | (six & 0x1);
            let column = (six >> 1) & 0xf;
            (out << 4) | u64::from(s_box[row * 16 + column])
        });
    permute(substituted, 32, &PERMUTATION) as u32
}
