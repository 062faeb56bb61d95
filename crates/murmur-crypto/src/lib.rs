#![deny(unsafe_code)]
#![warn(clippy::all)]

//! Cryptographic core for Murmur: canonical Poseidon hashing, identity
//! commitment derivation, the incremental membership tree, and the
//! Groth16 membership circuit.
//!
//! All commitments, nullifiers, and tree operations go through the
//! canonical Poseidon functions in [`poseidon`] so that native hashing
//! and in-circuit hashing stay byte-for-byte consistent.

pub mod circuit;
pub mod identity;
pub mod merkle;
pub mod poseidon;
pub mod zk;

pub use circuit::MembershipCircuit;
pub use identity::Identity;
pub use merkle::{MerklePath, MerkleTree, DEFAULT_TREE_DEPTH};
pub use poseidon::{
    bytes_to_fr, canonical_config, fr_to_bytes, poseidon_hash1_field, poseidon_hash2_fields,
    poseidon_hash_fields,
};
pub use zk::{MembershipProver, MembershipVerifier, ProofRequest, SignalProof};

/// BLAKE3 digest of arbitrary bytes, the byte-domain companion to the
/// field-domain Poseidon. Used for context tags and signal hashing.
pub fn blake3_hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// Reduce arbitrary bytes to a field element digest: BLAKE3 then mod
/// order. Stable across platforms; used to derive external nullifiers
/// and signal hashes from caller-supplied byte strings.
pub fn hash_to_field_bytes(data: &[u8]) -> [u8; 32] {
    let digest = blake3_hash(data);
    fr_to_bytes(&bytes_to_fr(&digest))
}

/// Constant-time byte comparison for secret material.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_to_field_deterministic() {
        let a = hash_to_field_bytes(b"login");
        let b = hash_to_field_bytes(b"login");
        assert_eq!(a, b);
        assert_ne!(a, hash_to_field_bytes(b"logout"));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }
}
