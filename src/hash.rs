//! Key fingerprinting
//!
//! The index is keyed by a 64-bit hash of the key rather than the key itself.
//! The hash function is a capability injected through
//! [`Config`](crate::Config); it must stay the same for the lifetime of a data
//! directory, since snapshots store fingerprints only.

use std::fmt;

use xxhash_rust::xxh3::xxh3_64;

use crate::types::Fingerprint;

/// Produces the 64-bit fingerprint of a key
pub trait KeyHasher: Send + Sync + fmt::Debug {
    fn fingerprint(&self, key: &[u8]) -> Fingerprint;
}

/// XXH3-64 (default)
#[derive(Debug, Default, Clone, Copy)]
pub struct Xxh3Hasher;

impl KeyHasher for Xxh3Hasher {
    fn fingerprint(&self, key: &[u8]) -> Fingerprint {
        xxh3_64(key)
    }
}

/// FNV-1a 64-bit.
///
/// For data directories whose snapshots were written with FNV fingerprints.
#[derive(Debug, Default, Clone, Copy)]
pub struct Fnv1aHasher;

impl Fnv1aHasher {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
}

impl KeyHasher for Fnv1aHasher {
    fn fingerprint(&self, key: &[u8]) -> Fingerprint {
        key.iter().fold(Self::OFFSET_BASIS, |hash, &byte| {
            (hash ^ byte as u64).wrapping_mul(Self::PRIME)
        })
    }
}
