//! Groth16 proving and verification for the membership circuit.
//!
//! The prover side holds the proving key (a circuit artifact fetched
//! or generated out of band); the verifier side holds the processed
//! verifying key. Both carry the tree depth they were set up for.

use ark_bn254::{Bn254, Fr};
use ark_groth16::{Groth16, PreparedVerifyingKey, Proof, ProvingKey, VerifyingKey};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_snark::SNARK;
use ark_std::rand::thread_rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::circuit::MembershipCircuit;
use crate::hash_to_field_bytes;
use crate::identity::Identity;
use crate::merkle::MerklePath;
use crate::poseidon::bytes_to_fr;
use murmur_types::{
    ExternalNullifier, MerkleRoot, MurmurError, MurmurResult, NullifierHash, SignalHash,
};

/// A complete signaling proof: the Groth16 proof plus the public
/// inputs it commits to. Ephemeral; constructed per attempt and
/// consumed once by the verifier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalProof {
    pub merkle_root: MerkleRoot,
    pub nullifier_hash: NullifierHash,
    pub external_nullifier: ExternalNullifier,
    pub signal_hash: SignalHash,
    /// Compressed Groth16 proof.
    pub proof_bytes: Vec<u8>,
}

/// Inputs for one proving run. The path and root must come from the
/// same registry snapshot.
pub struct ProofRequest<'a> {
    pub identity: &'a Identity,
    pub path: MerklePath,
    pub merkle_root: MerkleRoot,
    pub external_nullifier: ExternalNullifier,
    pub signal: Vec<u8>,
}

pub struct MembershipProver {
    proving_key: ProvingKey<Bn254>,
    depth: usize,
}

impl MembershipProver {
    /// Circuit-specific trusted setup. Development convenience; real
    /// deployments load keys produced by `murmur-keygen`.
    pub fn setup(depth: usize) -> MurmurResult<(Self, MembershipVerifier)> {
        let mut rng = thread_rng();
        let circuit = MembershipCircuit::empty(depth);

        let (pk, vk) = Groth16::<Bn254>::circuit_specific_setup(circuit, &mut rng)
            .map_err(|e| MurmurError::Crypto(format!("Key setup failed: {}", e)))?;

        let verifier = MembershipVerifier::from_key(vk)?;
        Ok((Self { proving_key: pk, depth }, verifier))
    }

    pub fn from_key_bytes(bytes: &[u8], depth: usize) -> MurmurResult<Self> {
        let proving_key = ProvingKey::<Bn254>::deserialize_compressed(bytes)
            .map_err(|e| MurmurError::Crypto(format!("Invalid proving key: {}", e)))?;
        Ok(Self { proving_key, depth })
    }

    pub fn key_bytes(&self) -> MurmurResult<Vec<u8>> {
        let mut bytes = Vec::new();
        self.proving_key
            .serialize_compressed(&mut bytes)
            .map_err(|e| MurmurError::Serialization(e.to_string()))?;
        Ok(bytes)
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Generate a membership proof. CPU-heavy, potentially
    /// multi-second; callers run this off the ingestion path.
    pub fn prove(&self, request: ProofRequest<'_>) -> MurmurResult<SignalProof> {
        if request.path.siblings.len() != self.depth {
            return Err(MurmurError::ProofGenerationFailed(format!(
                "Path depth {} does not match circuit depth {}",
                request.path.siblings.len(),
                self.depth
            )));
        }

        let external_nullifier_fr = bytes_to_fr(request.external_nullifier.as_bytes());
        let signal_hash = SignalHash::from_bytes(hash_to_field_bytes(&request.signal));
        let nullifier_hash = request.identity.nullifier_hash(&request.external_nullifier);

        let circuit = MembershipCircuit::new(
            request.identity.secret_key_field(),
            request.identity.nullifier_secret_field(),
            request.path.siblings.clone(),
            request.path.index_bits(),
            bytes_to_fr(request.merkle_root.as_bytes()),
            external_nullifier_fr,
            bytes_to_fr(signal_hash.as_bytes()),
        );

        let mut rng = thread_rng();
        let proof = Groth16::<Bn254>::prove(&self.proving_key, circuit, &mut rng)
            .map_err(|e| MurmurError::ProofGenerationFailed(e.to_string()))?;

        let mut proof_bytes = Vec::new();
        proof
            .serialize_compressed(&mut proof_bytes)
            .map_err(|e| MurmurError::Serialization(e.to_string()))?;

        debug!(root = %request.merkle_root, "Generated membership proof");

        Ok(SignalProof {
            merkle_root: request.merkle_root,
            nullifier_hash,
            external_nullifier: request.external_nullifier,
            signal_hash,
            proof_bytes,
        })
    }
}

pub struct MembershipVerifier {
    verifying_key: VerifyingKey<Bn254>,
    prepared: PreparedVerifyingKey<Bn254>,
}

impl MembershipVerifier {
    pub fn from_key(verifying_key: VerifyingKey<Bn254>) -> MurmurResult<Self> {
        let prepared = Groth16::<Bn254>::process_vk(&verifying_key)
            .map_err(|e| MurmurError::Crypto(format!("VK processing failed: {}", e)))?;
        Ok(Self {
            verifying_key,
            prepared,
        })
    }

    pub fn from_key_bytes(bytes: &[u8]) -> MurmurResult<Self> {
        let vk = VerifyingKey::<Bn254>::deserialize_compressed(bytes)
            .map_err(|e| MurmurError::Crypto(format!("Invalid verifying key: {}", e)))?;
        Self::from_key(vk)
    }

    pub fn key_bytes(&self) -> MurmurResult<Vec<u8>> {
        let mut bytes = Vec::new();
        self.verifying_key
            .serialize_compressed(&mut bytes)
            .map_err(|e| MurmurError::Serialization(e.to_string()))?;
        Ok(bytes)
    }

    /// Check the Groth16 proof against its embedded public inputs.
    /// Malformed proof bytes are an `InvalidProof`, not a crash.
    pub fn verify(&self, proof: &SignalProof) -> MurmurResult<bool> {
        let groth_proof = Proof::<Bn254>::deserialize_compressed(&proof.proof_bytes[..])
            .map_err(|e| MurmurError::InvalidProof(format!("Malformed proof bytes: {}", e)))?;

        let public_inputs: Vec<Fr> = vec![
            bytes_to_fr(proof.merkle_root.as_bytes()),
            bytes_to_fr(proof.nullifier_hash.as_bytes()),
            bytes_to_fr(proof.external_nullifier.as_bytes()),
            bytes_to_fr(proof.signal_hash.as_bytes()),
        ];

        Groth16::<Bn254>::verify_with_processed_vk(&self.prepared, &public_inputs, &groth_proof)
            .map_err(|e| MurmurError::Crypto(format!("Verification error: {}", e)))
    }
}
