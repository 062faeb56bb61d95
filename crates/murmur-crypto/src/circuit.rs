//! Groth16 membership circuit.
//!
//! Proves: "I know `(secret_key, nullifier_secret)` whose commitment
//! is a leaf of the tree with the public root at some index, and
//! `nullifier_hash = Poseidon(nullifier_secret, external_nullifier)`",
//! revealing neither the secrets nor the index.
//!
//! Public input order is fixed and must match verification:
//! `(merkle_root, nullifier_hash, external_nullifier, signal_hash)`.

use ark_bn254::Fr;
use ark_crypto_primitives::sponge::constraints::CryptographicSpongeVar;
use ark_crypto_primitives::sponge::poseidon::constraints::PoseidonSpongeVar;
use ark_r1cs_std::{
    alloc::AllocVar, boolean::Boolean, eq::EqGadget, fields::fp::FpVar, select::CondSelectGadget,
};
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystemRef, SynthesisError};

use crate::poseidon::{canonical_config, poseidon_hash2_fields};

#[derive(Clone)]
pub struct MembershipCircuit {
    depth: usize,
    secret_key: Option<Fr>,
    nullifier_secret: Option<Fr>,
    merkle_path: Vec<Option<Fr>>,
    merkle_indices: Vec<Option<bool>>,
    merkle_root: Option<Fr>,
    nullifier_hash: Option<Fr>,
    external_nullifier: Option<Fr>,
    signal_hash: Option<Fr>,
}

impl MembershipCircuit {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        secret_key: Fr,
        nullifier_secret: Fr,
        merkle_path: Vec<Fr>,
        merkle_indices: Vec<bool>,
        merkle_root: Fr,
        external_nullifier: Fr,
        signal_hash: Fr,
    ) -> Self {
        let nullifier_hash = poseidon_hash2_fields(nullifier_secret, external_nullifier);
        let depth = merkle_path.len();

        Self {
            depth,
            secret_key: Some(secret_key),
            nullifier_secret: Some(nullifier_secret),
            merkle_path: merkle_path.into_iter().map(Some).collect(),
            merkle_indices: merkle_indices.into_iter().map(Some).collect(),
            merkle_root: Some(merkle_root),
            nullifier_hash: Some(nullifier_hash),
            external_nullifier: Some(external_nullifier),
            signal_hash: Some(signal_hash),
        }
    }

    /// Assignment-free instance for key setup. The depth must match
    /// the trees proofs will be generated against.
    pub fn empty(depth: usize) -> Self {
        Self {
            depth,
            secret_key: None,
            nullifier_secret: None,
            merkle_path: vec![None; depth],
            merkle_indices: vec![None; depth],
            merkle_root: None,
            nullifier_hash: None,
            external_nullifier: None,
            signal_hash: None,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }
}

impl ConstraintSynthesizer<Fr> for MembershipCircuit {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        let secret_key = FpVar::new_witness(cs.clone(), || {
            self.secret_key.ok_or(SynthesisError::AssignmentMissing)
        })?;

        let nullifier_secret = FpVar::new_witness(cs.clone(), || {
            self.nullifier_secret
                .ok_or(SynthesisError::AssignmentMissing)
        })?;

        let mut merkle_path = Vec::with_capacity(self.depth);
        for sibling in &self.merkle_path {
            merkle_path.push(FpVar::new_witness(cs.clone(), || {
                sibling.ok_or(SynthesisError::AssignmentMissing)
            })?);
        }

        let mut merkle_indices = Vec::with_capacity(self.depth);
        for bit in &self.merkle_indices {
            merkle_indices.push(Boolean::new_witness(cs.clone(), || {
                bit.ok_or(SynthesisError::AssignmentMissing)
            })?);
        }

        let merkle_root = FpVar::new_input(cs.clone(), || {
            self.merkle_root.ok_or(SynthesisError::AssignmentMissing)
        })?;

        let nullifier_hash = FpVar::new_input(cs.clone(), || {
            self.nullifier_hash.ok_or(SynthesisError::AssignmentMissing)
        })?;

        let external_nullifier = FpVar::new_input(cs.clone(), || {
            self.external_nullifier
                .ok_or(SynthesisError::AssignmentMissing)
        })?;

        let signal_hash = FpVar::new_input(cs.clone(), || {
            self.signal_hash.ok_or(SynthesisError::AssignmentMissing)
        })?;

        // commitment = Poseidon(secret_key, nullifier_secret)
        let commitment =
            poseidon_hash_gadget(cs.clone(), &[secret_key, nullifier_secret.clone()])?;

        // Walk the path; index bits select child order at each level.
        let computed_root =
            merkle_root_gadget(cs.clone(), &commitment, &merkle_path, &merkle_indices)?;
        computed_root.enforce_equal(&merkle_root)?;

        // nullifier_hash = Poseidon(nullifier_secret, external_nullifier)
        let computed_nullifier = poseidon_hash_gadget(
            cs.clone(),
            &[nullifier_secret, external_nullifier.clone()],
        )?;
        computed_nullifier.enforce_equal(&nullifier_hash)?;

        // Bind the signal so the proof cannot be replayed over a
        // different payload.
        let _signal_binding = signal_hash.clone() * signal_hash;

        Ok(())
    }
}

pub fn poseidon_hash_gadget(
    cs: ConstraintSystemRef<Fr>,
    inputs: &[FpVar<Fr>],
) -> Result<FpVar<Fr>, SynthesisError> {
    let config = canonical_config();

    let mut sponge = PoseidonSpongeVar::new(cs, config);
    sponge.absorb(&inputs)?;

    let output = sponge.squeeze_field_elements(1)?;
    Ok(output[0].clone())
}

fn merkle_root_gadget(
    cs: ConstraintSystemRef<Fr>,
    leaf: &FpVar<Fr>,
    path: &[FpVar<Fr>],
    indices: &[Boolean<Fr>],
) -> Result<FpVar<Fr>, SynthesisError> {
    let mut current = leaf.clone();

    for (sibling, is_right) in path.iter().zip(indices.iter()) {
        let left = FpVar::conditionally_select(is_right, sibling, &current)?;
        let right = FpVar::conditionally_select(is_right, &current, sibling)?;

        current = poseidon_hash_gadget(cs.clone(), &[left, right])?;
    }

    Ok(current)
}
