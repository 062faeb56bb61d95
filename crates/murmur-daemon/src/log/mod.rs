//! External append-only event log boundary.
//!
//! The log is authoritative and totally ordered: registry state is
//! rebuilt from it at any time. Subscriptions are restartable from any
//! previously observed checkpoint.

mod http;
mod memory;

pub use http::HttpEventLog;
pub use memory::MemoryEventLog;

use async_trait::async_trait;
use murmur_types::{GroupAction, LogEntry, MurmurResult, SubmitReceipt};

/// A live, ordered subscription positioned after some checkpoint.
#[async_trait]
pub trait EventSubscription: Send {
    /// Next entry in log order; awaits until one is available. Fails
    /// with `EventStreamDisconnected` when the stream breaks, at which
    /// point the consumer resubscribes from its last applied
    /// checkpoint.
    async fn next_entry(&mut self) -> MurmurResult<LogEntry>;
}

#[async_trait]
pub trait EventLog: Send + Sync {
    /// Entries strictly after `from_sequence`, in order, unbounded
    /// over time.
    async fn subscribe(&self, from_sequence: u64)
        -> MurmurResult<Box<dyn EventSubscription>>;

    /// Submit a state-changing action; resolves once finalized. Fails
    /// with `TransactionReverted` when the ledger rejects it, or
    /// `TransactionTimeout` when finality is not observed in time.
    async fn submit(&self, action: GroupAction) -> MurmurResult<SubmitReceipt>;
}
