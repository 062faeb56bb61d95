//! Verifier boundary: the single authoritative gate for signal
//! acceptance.
//!
//! Check order matters. The nullifier check runs unconditionally
//! before cryptographic verification: it is the actual double-use
//! guard, and must reject replays even when the attached proof is
//! cryptographically valid. Accepted nullifiers are recorded durably
//! before the accepted report is returned.

use crate::nullifier::BoundedNullifierSet;
use crate::registry::SharedRegistry;
use crate::signal::RejectReason;
use crate::storage::SignalStorage;
use murmur_crypto::zk::{MembershipVerifier, SignalProof};
use murmur_types::{GroupId, MurmurResult};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[derive(Clone, Debug)]
pub struct VerificationReport {
    pub accepted: bool,
    pub reason: Option<RejectReason>,
    pub nullifier_recorded: bool,
}

impl VerificationReport {
    fn rejected(reason: RejectReason) -> Self {
        Self {
            accepted: false,
            reason: Some(reason),
            nullifier_recorded: false,
        }
    }
}

pub struct SignalVerifier {
    registry: SharedRegistry,
    verifier: MembershipVerifier,
    nullifiers: RwLock<BoundedNullifierSet>,
    storage: Arc<SignalStorage>,
}

impl SignalVerifier {
    /// Build a verifier, warm-starting the nullifier cache from the
    /// durable store.
    pub fn new(
        registry: SharedRegistry,
        verifier: MembershipVerifier,
        storage: Arc<SignalStorage>,
    ) -> MurmurResult<Self> {
        let mut set = BoundedNullifierSet::new();
        for (nullifier, scope) in storage.load_nullifiers()? {
            set.insert(nullifier, scope);
        }

        Ok(Self {
            registry,
            verifier,
            nullifiers: RwLock::new(set),
            storage,
        })
    }

    /// Verify a signaling proof for a group.
    ///
    /// Root policy: the proof's root must be the group's current root
    /// or one of its recent historical roots. A proof generated just
    /// before a membership change therefore stays usable for a while;
    /// the nullifier gate is what prevents double use.
    pub async fn verify(
        &self,
        group_id: GroupId,
        proof: &SignalProof,
    ) -> MurmurResult<VerificationReport> {
        // Replay gate first, regardless of cryptographic validity.
        {
            let nullifiers = self.nullifiers.read().await;
            if nullifiers.contains(&proof.nullifier_hash, &proof.external_nullifier) {
                warn!(group = %group_id, "Signal rejected: nullifier already used");
                return Ok(VerificationReport::rejected(
                    RejectReason::NullifierAlreadyUsed,
                ));
            }
        }
        if self
            .storage
            .nullifier_exists(&proof.nullifier_hash, &proof.external_nullifier)?
        {
            warn!(group = %group_id, "Signal rejected: nullifier already recorded");
            return Ok(VerificationReport::rejected(
                RejectReason::NullifierAlreadyUsed,
            ));
        }

        {
            let registry = self.registry.read().await;
            if !registry.is_root_accepted(group_id, &proof.merkle_root)? {
                warn!(group = %group_id, root = %proof.merkle_root, "Signal rejected: stale root");
                return Ok(VerificationReport::rejected(RejectReason::StaleRoot));
            }
        }

        match self.verifier.verify(proof) {
            Ok(true) => {}
            Ok(false) => {
                warn!(group = %group_id, "Signal rejected: invalid proof");
                return Ok(VerificationReport::rejected(RejectReason::InvalidProof));
            }
            Err(e) => {
                // Malformed proof bytes count as an invalid proof, not
                // a verifier fault.
                warn!(group = %group_id, error = %e, "Signal rejected: unverifiable proof");
                return Ok(VerificationReport::rejected(RejectReason::InvalidProof));
            }
        }

        // Record durably before reporting success. A concurrent
        // submission of the same nullifier loses the compare-and-swap
        // and is reported as a replay.
        let recorded = self
            .storage
            .record_nullifier(&proof.nullifier_hash, &proof.external_nullifier)?;
        if !recorded {
            return Ok(VerificationReport::rejected(
                RejectReason::NullifierAlreadyUsed,
            ));
        }
        self.storage.flush()?;

        {
            let mut nullifiers = self.nullifiers.write().await;
            nullifiers.insert(proof.nullifier_hash, proof.external_nullifier);
        }

        debug!(group = %group_id, "Signal accepted, nullifier recorded");
        Ok(VerificationReport {
            accepted: true,
            reason: None,
            nullifier_recorded: true,
        })
    }

    pub async fn nullifier_count(&self) -> usize {
        self.nullifiers.read().await.len()
    }
}
