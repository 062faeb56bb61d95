#![forbid(unsafe_code)]
#![warn(clippy::all)]

//! Shared value types for the Murmur anonymous-signaling protocol.
//!
//! Everything in this crate is a plain value: digests, identifiers,
//! and the append-only event model. No I/O, no async.

use serde::{Deserialize, Serialize};
use std::fmt;

mod error;
mod event;

pub use error::{MurmurError, MurmurResult};
pub use event::{GroupAction, GroupEvent, LogEntry, SubmitReceipt};

/// Size of all protocol digests (BN254 scalar, little-endian).
pub const DIGEST_SIZE: usize = 32;

/// Maximum group name length in bytes.
pub const MAX_GROUP_NAME_LEN: usize = 32;

/// An identity commitment: the only identity-derived value that ever
/// enters a group tree.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Commitment(pub [u8; DIGEST_SIZE]);

impl Commitment {
    pub fn from_bytes(bytes: [u8; DIGEST_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> MurmurResult<Self> {
        Ok(Self(decode_digest(s)?))
    }
}

impl fmt::Debug for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Commitment({})", self.to_hex())
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Root of a group's membership tree.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MerkleRoot(pub [u8; DIGEST_SIZE]);

impl MerkleRoot {
    pub fn from_bytes(bytes: [u8; DIGEST_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> MurmurResult<Self> {
        Ok(Self(decode_digest(s)?))
    }
}

impl fmt::Debug for MerkleRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MerkleRoot({})", self.to_hex())
    }
}

impl fmt::Display for MerkleRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Deterministic replay-detection key: `Poseidon(nullifier_secret,
/// external_nullifier)`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NullifierHash(pub [u8; DIGEST_SIZE]);

impl NullifierHash {
    pub fn from_bytes(bytes: [u8; DIGEST_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> MurmurResult<Self> {
        Ok(Self(decode_digest(s)?))
    }
}

impl fmt::Debug for NullifierHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NullifierHash({})", self.to_hex())
    }
}

/// Public context tag scoping what a nullifier hash prevents reuse of.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalNullifier(pub [u8; DIGEST_SIZE]);

impl ExternalNullifier {
    pub fn from_bytes(bytes: [u8; DIGEST_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> MurmurResult<Self> {
        Ok(Self(decode_digest(s)?))
    }
}

impl fmt::Debug for ExternalNullifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExternalNullifier({})", self.to_hex())
    }
}

/// Digest of the signal payload, bound into the proof.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignalHash(pub [u8; DIGEST_SIZE]);

impl SignalHash {
    pub fn from_bytes(bytes: [u8; DIGEST_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for SignalHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SignalHash({})", self.to_hex())
    }
}

/// Log-assigned group identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupId(pub u64);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group#{}", self.0)
    }
}

/// Human-readable group label, bounded to 32 bytes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupName(String);

impl GroupName {
    pub fn new(name: impl Into<String>) -> MurmurResult<Self> {
        let name = name.into();
        if name.is_empty() || name.len() > MAX_GROUP_NAME_LEN {
            return Err(MurmurError::Config(format!(
                "Group name must be 1..={} bytes, got {}",
                MAX_GROUP_NAME_LEN,
                name.len()
            )));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn decode_digest(s: &str) -> MurmurResult<[u8; DIGEST_SIZE]> {
    let bytes = hex::decode(s).map_err(|e| MurmurError::Serialization(e.to_string()))?;
    if bytes.len() != DIGEST_SIZE {
        return Err(MurmurError::Serialization(format!(
            "Expected {} bytes, got {}",
            DIGEST_SIZE,
            bytes.len()
        )));
    }
    let mut arr = [0u8; DIGEST_SIZE];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_hex_roundtrip() {
        let c = Commitment::from_bytes([0xab; 32]);
        assert_eq!(c.to_hex().len(), 64);
        assert_eq!(Commitment::from_hex(&c.to_hex()).unwrap(), c);
    }

    #[test]
    fn test_bad_hex_rejected() {
        assert!(Commitment::from_hex("abcd").is_err());
        assert!(MerkleRoot::from_hex("not hex at all").is_err());
    }

    #[test]
    fn test_group_name_bounds() {
        assert!(GroupName::new("devcon").is_ok());
        assert!(GroupName::new("").is_err());
        assert!(GroupName::new("x".repeat(33)).is_err());
    }

    #[test]
    fn test_group_id_display() {
        assert_eq!(GroupId(7).to_string(), "group#7");
    }
}
