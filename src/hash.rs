//! Name hashing for block placement and verification
//!
//! Every packed file is keyed by two independent 64-bit hashes of its logical
//! name: `hash` picks the home slot in the block index and `id` confirms the
//! match. Both come from the same string mixer run with different seeds, so a
//! placement collision almost never doubles as an id collision.
//!
//! The mixer is part of the on-disk format. Changing a single constant here
//! makes every existing cartridge unreadable by name.

use std::path::Path;

/// Seed used by the integer mixer when finishing a string hash
pub const DEFAULT_SEED: u64 = 0xD49E_E70C;

/// Seed for the verification id
pub const ID_SEED: u64 = 0x014F_65CB;

/// Seed for the placement hash
pub const HASH_SEED: u64 = 0xD49E_E70C;

/// Id value reserved for empty index slots
pub const EMPTY_ID: u64 = 0;

// Rotations use a 32-bit width but operate on 64-bit values.
const ROTATE_BITS: u32 = 32;

#[inline]
const fn rotate_left(value: u64, n: u32) -> u64 {
    (value << n) | (value >> (ROTATE_BITS - n))
}

#[inline]
const fn rotate_right(value: u64, n: u32) -> u64 {
    (value >> n) | (value << (ROTATE_BITS - n))
}

/// Thomas Wang style integer mixer
pub const fn mix_u32(seed: u64, value: u32) -> u64 {
    let mut result = value as u64;
    result ^= seed;
    result = (!result).wrapping_add(result << 18);
    result = rotate_right(result, 31);
    result = result.wrapping_mul(21);
    result = rotate_right(result, 11);
    result = result.wrapping_add(result << 6);
    result ^= rotate_right(result, 22);
    result.wrapping_add(seed)
}

/// Hash a byte string with the given seed
pub fn mix(seed: u64, name: &[u8]) -> u64 {
    let folded = name
        .iter()
        .fold(seed, |acc, &byte| rotate_left(acc, 9).wrapping_add(u64::from(byte)));

    // Only the low 32 bits of the fold feed the finaliser.
    mix_u32(DEFAULT_SEED, folded as u32).wrapping_add(seed)
}

/// Verification id for a logical name
pub fn name_id(name: &[u8]) -> u64 {
    mix(ID_SEED, name)
}

/// Placement hash for a logical name
pub fn name_hash(name: &[u8]) -> u64 {
    mix(HASH_SEED, name)
}

/// The `(id, hash)` pair identifying a logical name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NameKey {
    pub id: u64,
    pub hash: u64,
}

impl NameKey {
    pub fn of(name: impl AsRef<[u8]>) -> Self {
        let name = name.as_ref();
        Self {
            id: name_id(name),
            hash: name_hash(name),
        }
    }

    /// Key a path by its raw encoded bytes, exactly as given
    pub fn of_path(path: &Path) -> Self {
        Self::of(path_name(path))
    }

    /// True when the id collides with the empty-slot sentinel
    pub fn is_reserved(&self) -> bool {
        self.id == EMPTY_ID
    }
}

/// Logical name of a path: its platform encoding, unnormalised
pub fn path_name(path: &Path) -> &[u8] {
    path.as_os_str().as_encoded_bytes()
}
