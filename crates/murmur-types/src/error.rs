use crate::GroupId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MurmurError {
    #[error("Tree capacity exceeded: {capacity} leaves")]
    CapacityExceeded { capacity: usize },

    #[error("Group already exists: {0}")]
    DuplicateGroup(GroupId),

    #[error("Unknown group: {0}")]
    UnknownGroup(GroupId),

    #[error("Member commitment not found in group tree")]
    MemberNotFound,

    #[error("Event log inconsistent: group {group} declared index {declared}, assigned {assigned}")]
    EventLogInconsistent {
        group: GroupId,
        declared: usize,
        assigned: usize,
    },

    #[error("Proof generation failed: {0}")]
    ProofGenerationFailed(String),

    #[error("Nullifier already used for this context")]
    NullifierAlreadyUsed,

    #[error("Invalid proof: {0}")]
    InvalidProof(String),

    #[error("Transaction reverted: {0}")]
    TransactionReverted(String),

    #[error("Transaction not finalized within {timeout_secs}s")]
    TransactionTimeout { timeout_secs: u64 },

    #[error("Circuit artifact unavailable: {0}")]
    ArtifactUnavailable(String),

    #[error("Event stream disconnected: {0}")]
    EventStreamDisconnected(String),

    #[error("Cryptographic error: {0}")]
    Crypto(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type MurmurResult<T> = Result<T, MurmurError>;
