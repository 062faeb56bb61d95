//! Canonical Poseidon hash for Murmur.
//!
//! One unified Poseidon instance over the BN254 scalar field. All
//! commitments, nullifier hashes, and Merkle node hashes MUST use
//! these functions so that native and in-circuit hashing agree.
//!
//! ## Parameters
//! - Field: BN254 Fr
//! - Width: 3 (rate=2, capacity=1)
//! - Full rounds: 8, partial rounds: 57
//! - S-box: x^5
//! - Round constants: Grain LFSR (arkworks standard)
//!
//! ## Output convention
//! All functions output the first squeezed sponge element, matching
//! arkworks `PoseidonSponge` and its constraint counterpart.

use ark_bn254::Fr;
use ark_crypto_primitives::sponge::{
    poseidon::{find_poseidon_ark_and_mds, PoseidonConfig, PoseidonSponge},
    CryptographicSponge,
};
use ark_ff::PrimeField;
use ark_serialize::CanonicalSerialize;
use std::sync::OnceLock;

static CANONICAL_CONFIG: OnceLock<PoseidonConfig<Fr>> = OnceLock::new();

/// Get the canonical Poseidon configuration.
/// Thread-safe singleton initialization.
pub fn canonical_config() -> &'static PoseidonConfig<Fr> {
    CANONICAL_CONFIG.get_or_init(|| {
        let rate = 2;
        let alpha = 5u64;
        let full_rounds = 8;
        let partial_rounds = 57;
        let field_bits = 254;

        let (ark, mds) = find_poseidon_ark_and_mds::<Fr>(
            field_bits,
            rate,
            full_rounds,
            partial_rounds,
            0, // skip_matrices
        );

        PoseidonConfig {
            full_rounds: full_rounds as usize,
            partial_rounds: partial_rounds as usize,
            alpha,
            ark,
            mds,
            rate,
            capacity: 1,
        }
    })
}

/// Hash a slice of field elements. Returns the first squeezed element.
pub fn poseidon_hash_fields(inputs: &[Fr]) -> Fr {
    let config = canonical_config();
    let mut sponge = PoseidonSponge::new(config);
    for input in inputs {
        sponge.absorb(input);
    }
    let output: Vec<Fr> = sponge.squeeze_field_elements(1);
    output[0]
}

/// Hash two field elements. Primary operation for tree nodes,
/// commitments, and nullifier hashes.
pub fn poseidon_hash2_fields(left: Fr, right: Fr) -> Fr {
    poseidon_hash_fields(&[left, right])
}

/// Hash a single field element. Used for the zero-leaf filler.
pub fn poseidon_hash1_field(input: Fr) -> Fr {
    poseidon_hash_fields(&[input])
}

/// Convert a field element to 32 bytes (compressed little-endian).
pub fn fr_to_bytes(f: &Fr) -> [u8; 32] {
    let mut bytes = [0u8; 32];
    f.serialize_compressed(&mut bytes[..])
        .expect("Fr serialization failed");
    bytes
}

/// Convert 32 bytes to a field element (mod order).
pub fn bytes_to_fr(bytes: &[u8; 32]) -> Fr {
    Fr::from_le_bytes_mod_order(bytes)
}

/// Hash two 32-byte digests.
pub fn poseidon_hash2(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let result = poseidon_hash2_fields(bytes_to_fr(left), bytes_to_fr(right));
    fr_to_bytes(&result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_deterministic() {
        let a = Fr::from(12345u64);
        let b = Fr::from(67890u64);

        let h1 = poseidon_hash2_fields(a, b);
        let h2 = poseidon_hash2_fields(a, b);
        assert_eq!(h1, h2);

        // Order matters
        let h3 = poseidon_hash2_fields(b, a);
        assert_ne!(h1, h3);
    }

    #[test]
    fn test_hash_bytes() {
        let left = [0xaa; 32];
        let right = [0xbb; 32];

        assert_eq!(poseidon_hash2(&left, &right), poseidon_hash2(&left, &right));
        assert_ne!(poseidon_hash2(&left, &right), poseidon_hash2(&right, &left));
    }

    #[test]
    fn test_field_roundtrip() {
        let original = Fr::from(0xdeadbeefu64);
        let bytes = fr_to_bytes(&original);
        assert_eq!(bytes_to_fr(&bytes), original);
    }

    #[test]
    fn test_hash_multiple_inputs() {
        let inputs = vec![Fr::from(1u64), Fr::from(2u64), Fr::from(3u64)];

        let h1 = poseidon_hash_fields(&inputs);
        let h2 = poseidon_hash_fields(&inputs);
        assert_eq!(h1, h2);

        let reversed: Vec<Fr> = inputs.iter().rev().cloned().collect();
        assert_ne!(h1, poseidon_hash_fields(&reversed));
    }
}
