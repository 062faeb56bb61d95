//! Identity generation and commitment derivation.
//!
//! An identity is two independently random secret scalars. The only
//! value derived from them that ever leaves the holder's custody is
//! the Poseidon commitment placed into a group tree.

use crate::poseidon::{bytes_to_fr, fr_to_bytes, poseidon_hash2_fields};
use ark_bn254::Fr;
use murmur_types::{Commitment, ExternalNullifier, MurmurError, MurmurResult, NullifierHash};
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;

/// A member identity: `{secret_key, nullifier_secret}`.
///
/// Never persisted by the core. Secrets are stored in reduced field
/// form so derivations are stable across export/import.
#[derive(Clone)]
pub struct Identity {
    secret_key: [u8; 32],
    nullifier_secret: [u8; 32],
}

impl Identity {
    /// Draw a fresh identity from the OS random source.
    pub fn generate() -> Self {
        let mut rng = OsRng;
        let mut secret_key = [0u8; 32];
        let mut nullifier_secret = [0u8; 32];
        rng.fill_bytes(&mut secret_key);
        rng.fill_bytes(&mut nullifier_secret);

        // Store the reduced form so bytes -> field -> bytes is stable.
        Self {
            secret_key: fr_to_bytes(&bytes_to_fr(&secret_key)),
            nullifier_secret: fr_to_bytes(&bytes_to_fr(&nullifier_secret)),
        }
    }

    pub fn from_secrets(secret_key: [u8; 32], nullifier_secret: [u8; 32]) -> Self {
        Self {
            secret_key: fr_to_bytes(&bytes_to_fr(&secret_key)),
            nullifier_secret: fr_to_bytes(&bytes_to_fr(&nullifier_secret)),
        }
    }

    /// Public commitment: `Poseidon(secret_key, nullifier_secret)`.
    /// Pure and deterministic.
    pub fn commitment(&self) -> Commitment {
        let c = poseidon_hash2_fields(self.secret_key_field(), self.nullifier_secret_field());
        Commitment::from_bytes(fr_to_bytes(&c))
    }

    /// Replay-detection key for a context:
    /// `Poseidon(nullifier_secret, external_nullifier)`.
    pub fn nullifier_hash(&self, external_nullifier: &ExternalNullifier) -> NullifierHash {
        let n = poseidon_hash2_fields(
            self.nullifier_secret_field(),
            bytes_to_fr(external_nullifier.as_bytes()),
        );
        NullifierHash::from_bytes(fr_to_bytes(&n))
    }

    pub fn secret_key_field(&self) -> Fr {
        bytes_to_fr(&self.secret_key)
    }

    pub fn nullifier_secret_field(&self) -> Fr {
        bytes_to_fr(&self.nullifier_secret)
    }

    /// Export as `<secret_key_hex>:<nullifier_secret_hex>`. Caller
    /// custody only; the core never writes this anywhere.
    pub fn export(&self) -> String {
        format!(
            "{}:{}",
            hex::encode(self.secret_key),
            hex::encode(self.nullifier_secret)
        )
    }

    pub fn import(encoded: &str) -> MurmurResult<Self> {
        let (sk_hex, ns_hex) = encoded
            .split_once(':')
            .ok_or_else(|| MurmurError::Crypto("Invalid identity encoding".into()))?;

        let secret_key = decode_scalar(sk_hex)?;
        let nullifier_secret = decode_scalar(ns_hex)?;
        Ok(Self::from_secrets(secret_key, nullifier_secret))
    }
}

fn decode_scalar(s: &str) -> MurmurResult<[u8; 32]> {
    let bytes = hex::decode(s).map_err(|e| MurmurError::Crypto(e.to_string()))?;
    if bytes.len() != 32 {
        return Err(MurmurError::Crypto("Invalid secret length".into()));
    }
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity([REDACTED])")
    }
}

impl Drop for Identity {
    fn drop(&mut self) {
        self.secret_key.iter_mut().for_each(|b| *b = 0);
        self.nullifier_secret.iter_mut().for_each(|b| *b = 0);
    }
}
