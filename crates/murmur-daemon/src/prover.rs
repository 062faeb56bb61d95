//! Proof engine: turns an identity plus a registry snapshot into a
//! signaling proof, off the ingestion path.
//!
//! Proving is CPU-heavy and potentially multi-second, so it runs
//! under `spawn_blocking`. Jobs are independent and cancellable;
//! cancelling discards the result, there is no partial state to roll
//! back.

use crate::registry::GroupSnapshot;
use murmur_crypto::identity::Identity;
use murmur_crypto::zk::{MembershipProver, ProofRequest, SignalProof};
use murmur_types::{ExternalNullifier, MurmurError, MurmurResult};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

pub struct ProofEngine {
    prover: Arc<MembershipProver>,
}

impl ProofEngine {
    pub fn new(prover: Arc<MembershipProver>) -> Self {
        Self { prover }
    }

    /// Generate a membership proof against a snapshot.
    ///
    /// The member lookup happens before any proving work: an identity
    /// whose commitment is not in the snapshot fails fast with
    /// `MemberNotFound`.
    pub async fn generate(
        &self,
        identity: &Identity,
        snapshot: &GroupSnapshot,
        external_nullifier: ExternalNullifier,
        signal: Vec<u8>,
    ) -> MurmurResult<SignalProof> {
        let commitment = identity.commitment();
        let index = snapshot
            .tree
            .index_of_bytes(commitment.as_bytes())
            .ok_or(MurmurError::MemberNotFound)?;

        let path = snapshot.tree.path(index)?;
        let merkle_root = snapshot.root();
        debug!(group = %snapshot.id, index, root = %merkle_root, "Proving membership");

        let prover = Arc::clone(&self.prover);
        let identity = identity.clone();

        tokio::task::spawn_blocking(move || {
            prover.prove(ProofRequest {
                identity: &identity,
                path,
                merkle_root,
                external_nullifier,
                signal,
            })
        })
        .await
        .map_err(|e| MurmurError::ProofGenerationFailed(format!("Proving task failed: {}", e)))?
    }

    /// Dispatch a proof generation as an independently cancellable
    /// unit of work.
    pub fn spawn(
        &self,
        identity: Identity,
        snapshot: GroupSnapshot,
        external_nullifier: ExternalNullifier,
        signal: Vec<u8>,
    ) -> ProofJob {
        let engine = ProofEngine {
            prover: Arc::clone(&self.prover),
        };
        let handle = tokio::spawn(async move {
            engine
                .generate(&identity, &snapshot, external_nullifier, signal)
                .await
        });
        ProofJob { handle }
    }
}

/// Handle to an in-flight proof generation.
pub struct ProofJob {
    handle: JoinHandle<MurmurResult<SignalProof>>,
}

impl ProofJob {
    /// Discard the in-flight work.
    pub fn cancel(&self) {
        self.handle.abort();
    }

    pub async fn join(self) -> MurmurResult<SignalProof> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => {
                Err(MurmurError::ProofGenerationFailed("Job cancelled".into()))
            }
            Err(e) => Err(MurmurError::ProofGenerationFailed(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::GroupRegistry;
    use murmur_crypto::hash_to_field_bytes;
    use murmur_crypto::zk::{MembershipProver, MembershipVerifier};
    use murmur_types::{GroupEvent, GroupId, GroupName, LogEntry};

    const TEST_DEPTH: usize = 4;

    fn setup_engine() -> (ProofEngine, MembershipVerifier) {
        let (prover, verifier) = MembershipProver::setup(TEST_DEPTH).unwrap();
        (ProofEngine::new(Arc::new(prover)), verifier)
    }

    fn registry_with_member(identity: &Identity) -> GroupRegistry {
        let mut registry = GroupRegistry::new(TEST_DEPTH);
        registry
            .apply(&LogEntry {
                sequence: 1,
                event: GroupEvent::GroupCreated {
                    id: GroupId(1),
                    name: GroupName::new("devs").unwrap(),
                },
            })
            .unwrap();
        registry
            .apply(&LogEntry {
                sequence: 2,
                event: GroupEvent::MemberAdded {
                    group_id: GroupId(1),
                    index: 0,
                    commitment: identity.commitment(),
                },
            })
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn test_generate_and_verify() {
        let (engine, verifier) = setup_engine();
        let identity = Identity::generate();
        let registry = registry_with_member(&identity);
        let snapshot = registry.snapshot(GroupId(1)).unwrap();

        let proof = engine
            .generate(
                &identity,
                &snapshot,
                ExternalNullifier::from_bytes(hash_to_field_bytes(b"login")),
                b"login".to_vec(),
            )
            .await
            .unwrap();

        assert_eq!(proof.merkle_root, snapshot.root());
        assert!(verifier.verify(&proof).unwrap());
    }

    #[tokio::test]
    async fn test_member_not_found_before_proving() {
        let (engine, _) = setup_engine();
        let member = Identity::generate();
        let outsider = Identity::generate();
        let registry = registry_with_member(&member);
        let snapshot = registry.snapshot(GroupId(1)).unwrap();

        let err = engine
            .generate(
                &outsider,
                &snapshot,
                ExternalNullifier::from_bytes([0x01; 32]),
                b"login".to_vec(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MurmurError::MemberNotFound));
    }

    #[tokio::test]
    async fn test_cancelled_job_reports_failure() {
        let (engine, _) = setup_engine();
        let identity = Identity::generate();
        let registry = registry_with_member(&identity);
        let snapshot = registry.snapshot(GroupId(1)).unwrap();

        let job = engine.spawn(
            identity,
            snapshot,
            ExternalNullifier::from_bytes([0x01; 32]),
            b"login".to_vec(),
        );
        job.cancel();

        // Either the abort landed first or the proof completed; both
        // are acceptable outcomes, never a hang or panic.
        match job.join().await {
            Ok(_) | Err(MurmurError::ProofGenerationFailed(_)) => {}
            Err(e) => panic!("Unexpected error: {}", e),
        }
    }

    #[tokio::test]
    async fn test_parallel_jobs() {
        let (engine, verifier) = setup_engine();
        let a = Identity::generate();
        let b = Identity::generate();

        let mut registry = GroupRegistry::new(TEST_DEPTH);
        registry
            .apply(&LogEntry {
                sequence: 1,
                event: GroupEvent::GroupCreated {
                    id: GroupId(1),
                    name: GroupName::new("devs").unwrap(),
                },
            })
            .unwrap();
        for (i, identity) in [&a, &b].iter().enumerate() {
            registry
                .apply(&LogEntry {
                    sequence: 2 + i as u64,
                    event: GroupEvent::MemberAdded {
                        group_id: GroupId(1),
                        index: i,
                        commitment: identity.commitment(),
                    },
                })
                .unwrap();
        }
        let snapshot = registry.snapshot(GroupId(1)).unwrap();

        let job_a = engine.spawn(
            a,
            snapshot.clone(),
            ExternalNullifier::from_bytes([0x01; 32]),
            b"one".to_vec(),
        );
        let job_b = engine.spawn(
            b,
            snapshot,
            ExternalNullifier::from_bytes([0x02; 32]),
            b"two".to_vec(),
        );

        let proof_a = job_a.join().await.unwrap();
        let proof_b = job_b.join().await.unwrap();
        assert!(verifier.verify(&proof_a).unwrap());
        assert!(verifier.verify(&proof_b).unwrap());
        assert_ne!(proof_a.nullifier_hash, proof_b.nullifier_hash);
    }
}
