//! Signaling attempt lifecycle.
//!
//! One attempt walks `Idle -> ProofRequested -> ProofGenerated ->
//! Submitted -> Accepted | Rejected`. Terminal states never transition
//! back: resubmitting identical inputs reproduces the same nullifier
//! hash and is rejected as a replay, so a retry needs a fresh attempt
//! with a different context or signal.

use murmur_types::{ExternalNullifier, GroupId, MurmurError, MurmurResult};
use serde::{Deserialize, Serialize};

/// Machine-readable rejection cause reported alongside the generic
/// "not accepted" outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    NullifierAlreadyUsed,
    StaleRoot,
    InvalidProof,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttemptState {
    Idle,
    ProofRequested,
    ProofGenerated,
    Submitted,
    Accepted,
    Rejected(RejectReason),
}

impl AttemptState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AttemptState::Accepted | AttemptState::Rejected(_))
    }
}

/// State machine for one signaling attempt.
pub struct SignalAttempt {
    group_id: GroupId,
    external_nullifier: ExternalNullifier,
    state: AttemptState,
}

impl SignalAttempt {
    pub fn new(group_id: GroupId, external_nullifier: ExternalNullifier) -> Self {
        Self {
            group_id,
            external_nullifier,
            state: AttemptState::Idle,
        }
    }

    pub fn group_id(&self) -> GroupId {
        self.group_id
    }

    pub fn external_nullifier(&self) -> &ExternalNullifier {
        &self.external_nullifier
    }

    pub fn state(&self) -> &AttemptState {
        &self.state
    }

    pub fn request_proof(&mut self) -> MurmurResult<()> {
        self.transition(AttemptState::Idle, AttemptState::ProofRequested)
    }

    pub fn proof_generated(&mut self) -> MurmurResult<()> {
        self.transition(AttemptState::ProofRequested, AttemptState::ProofGenerated)
    }

    pub fn submitted(&mut self) -> MurmurResult<()> {
        self.transition(AttemptState::ProofGenerated, AttemptState::Submitted)
    }

    pub fn accepted(&mut self) -> MurmurResult<()> {
        self.transition(AttemptState::Submitted, AttemptState::Accepted)
    }

    pub fn rejected(&mut self, reason: RejectReason) -> MurmurResult<()> {
        self.transition(AttemptState::Submitted, AttemptState::Rejected(reason))
    }

    fn transition(&mut self, expected: AttemptState, next: AttemptState) -> MurmurResult<()> {
        if self.state != expected {
            return Err(MurmurError::Internal(format!(
                "Invalid attempt transition from {:?} to {:?}",
                self.state, next
            )));
        }
        self.state = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt() -> SignalAttempt {
        SignalAttempt::new(GroupId(1), ExternalNullifier::from_bytes([0x01; 32]))
    }

    #[test]
    fn test_happy_path() {
        let mut a = attempt();
        a.request_proof().unwrap();
        a.proof_generated().unwrap();
        a.submitted().unwrap();
        a.accepted().unwrap();
        assert!(a.state().is_terminal());
    }

    #[test]
    fn test_rejection_is_terminal() {
        let mut a = attempt();
        a.request_proof().unwrap();
        a.proof_generated().unwrap();
        a.submitted().unwrap();
        a.rejected(RejectReason::NullifierAlreadyUsed).unwrap();

        assert_eq!(
            a.state(),
            &AttemptState::Rejected(RejectReason::NullifierAlreadyUsed)
        );
        // No transition out of a terminal state.
        assert!(a.request_proof().is_err());
        assert!(a.accepted().is_err());
    }

    #[test]
    fn test_out_of_order_transition_rejected() {
        let mut a = attempt();
        assert!(a.submitted().is_err());
        assert!(a.proof_generated().is_err());
    }
}
