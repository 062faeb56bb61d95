//! In-process event log for tests and single-node development.
//!
//! Keeps the total order in memory and assigns sequences, group ids,
//! and member indices the way the external ledger would.

use super::{EventLog, EventSubscription};
use async_trait::async_trait;
use murmur_types::{
    GroupAction, GroupEvent, GroupId, LogEntry, MurmurError, MurmurResult, SubmitReceipt,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

struct Inner {
    entries: Mutex<Vec<LogEntry>>,
    /// Wakes subscribers on append or forced disconnect.
    notify: broadcast::Sender<()>,
    /// Bumped by `disconnect_all`; subscriptions from an older epoch
    /// fail their next read.
    epoch: AtomicU64,
}

#[derive(Clone)]
pub struct MemoryEventLog {
    inner: Arc<Inner>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        let (notify, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(Vec::new()),
                notify,
                epoch: AtomicU64::new(0),
            }),
        }
    }

    /// Snapshot of the full log, for replay tests.
    pub async fn entries(&self) -> Vec<LogEntry> {
        self.inner.entries.lock().await.clone()
    }

    /// Force every active subscription to fail its next read, as a
    /// network drop would. New subscriptions are unaffected.
    pub fn disconnect_all(&self) {
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        let _ = self.inner.notify.send(());
    }
}

impl Default for MemoryEventLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventLog for MemoryEventLog {
    async fn subscribe(
        &self,
        from_sequence: u64,
    ) -> MurmurResult<Box<dyn EventSubscription>> {
        Ok(Box::new(MemorySubscription {
            inner: Arc::clone(&self.inner),
            cursor: from_sequence,
            epoch: self.inner.epoch.load(Ordering::SeqCst),
            rx: self.inner.notify.subscribe(),
        }))
    }

    async fn submit(&self, action: GroupAction) -> MurmurResult<SubmitReceipt> {
        let mut entries = self.inner.entries.lock().await;
        let sequence = entries.len() as u64 + 1;

        let event = match action {
            GroupAction::CreateGroup { name } => {
                let next_id = entries
                    .iter()
                    .filter(|e| matches!(e.event, GroupEvent::GroupCreated { .. }))
                    .count() as u64
                    + 1;
                GroupEvent::GroupCreated {
                    id: GroupId(next_id),
                    name,
                }
            }
            GroupAction::AddMember {
                group_id,
                commitment,
            } => {
                let group_exists = entries.iter().any(|e| {
                    matches!(e.event, GroupEvent::GroupCreated { id, .. } if id == group_id)
                });
                if !group_exists {
                    return Err(MurmurError::TransactionReverted(format!(
                        "{} does not exist",
                        group_id
                    )));
                }

                // The log assigns the index; downstream registries
                // check it against the slot they actually fill.
                let index = entries
                    .iter()
                    .filter(|e| {
                        matches!(e.event, GroupEvent::MemberAdded { group_id: g, .. } if g == group_id)
                    })
                    .count();

                GroupEvent::MemberAdded {
                    group_id,
                    index,
                    commitment,
                }
            }
        };

        let entry = LogEntry {
            sequence,
            event: event.clone(),
        };
        entries.push(entry);
        drop(entries);

        let _ = self.inner.notify.send(());
        Ok(SubmitReceipt { sequence, event })
    }
}

struct MemorySubscription {
    inner: Arc<Inner>,
    cursor: u64,
    epoch: u64,
    rx: broadcast::Receiver<()>,
}

#[async_trait]
impl EventSubscription for MemorySubscription {
    async fn next_entry(&mut self) -> MurmurResult<LogEntry> {
        loop {
            if self.inner.epoch.load(Ordering::SeqCst) != self.epoch {
                return Err(MurmurError::EventStreamDisconnected(
                    "Subscription dropped".into(),
                ));
            }

            {
                let entries = self.inner.entries.lock().await;
                if let Some(entry) = entries.get(self.cursor as usize) {
                    self.cursor += 1;
                    return Ok(entry.clone());
                }
            }

            // Lagged receivers just re-check the shared state.
            let _ = self.rx.recv().await;
        }
    }
}
