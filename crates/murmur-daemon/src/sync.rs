//! EventSync: the registry's single writer.
//!
//! Consumes the external log strictly in arrival order, applies each
//! entry, and advances the durable checkpoint. A dropped stream is
//! recovered locally by resubscribing from the last applied
//! checkpoint with exponential backoff; it only surfaces as an error
//! once the retry budget is exhausted.

use crate::log::EventLog;
use crate::registry::SharedRegistry;
use crate::storage::SignalStorage;
use crate::tasks::CancellationToken;
use murmur_types::{MurmurError, MurmurResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const RESUBSCRIBE_BASE_MS: u64 = 500;
const RESUBSCRIBE_MAX_MS: u64 = 30_000;
const MAX_RESUBSCRIBE_ATTEMPTS: u32 = 10;

pub struct EventSync {
    registry: SharedRegistry,
    log: Arc<dyn EventLog>,
    storage: Arc<SignalStorage>,
}

impl EventSync {
    pub fn new(
        registry: SharedRegistry,
        log: Arc<dyn EventLog>,
        storage: Arc<SignalStorage>,
    ) -> Self {
        Self {
            registry,
            log,
            storage,
        }
    }

    /// Long-lived ingestion loop. Returns cleanly on cancellation,
    /// with an error when the log turns out to be inconsistent or the
    /// stream cannot be recovered.
    pub async fn run(&self, mut cancel: CancellationToken) -> MurmurResult<()> {
        let mut attempts = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }

            let checkpoint = self.storage.checkpoint()?;
            let mut subscription = match self.log.subscribe(checkpoint).await {
                Ok(sub) => {
                    info!(checkpoint, "Subscribed to event log");
                    sub
                }
                Err(e) => {
                    attempts += 1;
                    if attempts > MAX_RESUBSCRIBE_ATTEMPTS {
                        error!("Event log unreachable after {} attempts", attempts - 1);
                        return Err(MurmurError::EventStreamDisconnected(e.to_string()));
                    }
                    self.backoff(attempts, &mut cancel).await;
                    continue;
                }
            };

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("EventSync cancelled");
                        return Ok(());
                    }
                    entry = subscription.next_entry() => match entry {
                        Ok(entry) => {
                            let sequence = entry.sequence;
                            {
                                let mut registry = self.registry.write().await;
                                registry.apply(&entry)?;
                            }
                            self.storage.set_checkpoint(sequence)?;
                            attempts = 0;
                            debug!(sequence, "Applied log entry");
                        }
                        Err(MurmurError::EventStreamDisconnected(reason)) => {
                            warn!(%reason, "Event stream disconnected, resubscribing");
                            attempts += 1;
                            if attempts > MAX_RESUBSCRIBE_ATTEMPTS {
                                error!("Resubscription budget exhausted");
                                return Err(MurmurError::EventStreamDisconnected(reason));
                            }
                            self.backoff(attempts, &mut cancel).await;
                            break;
                        }
                        Err(e) => {
                            error!("Fatal sync error: {}", e);
                            return Err(e);
                        }
                    }
                }
            }
        }
    }

    /// Apply everything currently available, returning once the log
    /// has been idle for `idle`. Used for one-shot catch-up before
    /// reads in short-lived commands.
    pub async fn catch_up(&self, idle: Duration) -> MurmurResult<u64> {
        let checkpoint = self.storage.checkpoint()?;
        let mut subscription = self.log.subscribe(checkpoint).await?;

        loop {
            match tokio::time::timeout(idle, subscription.next_entry()).await {
                Ok(Ok(entry)) => {
                    let sequence = entry.sequence;
                    {
                        let mut registry = self.registry.write().await;
                        registry.apply(&entry)?;
                    }
                    self.storage.set_checkpoint(sequence)?;
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => break,
            }
        }

        self.storage.checkpoint()
    }

    async fn backoff(&self, attempt: u32, cancel: &mut CancellationToken) {
        let delay = (RESUBSCRIBE_BASE_MS * 2u64.saturating_pow(attempt.saturating_sub(1)))
            .min(RESUBSCRIBE_MAX_MS);
        debug!(attempt, delay_ms = delay, "Backing off before resubscribe");
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(Duration::from_millis(delay)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::MemoryEventLog;
    use crate::registry::GroupRegistry;
    use murmur_types::{Commitment, GroupAction, GroupId, GroupName};

    async fn seeded_log() -> MemoryEventLog {
        let log = MemoryEventLog::new();
        log.submit(GroupAction::CreateGroup {
            name: GroupName::new("devs").unwrap(),
        })
        .await
        .unwrap();
        for byte in [0x11u8, 0x22, 0x33] {
            log.submit(GroupAction::AddMember {
                group_id: GroupId(1),
                commitment: Commitment::from_bytes([byte; 32]),
            })
            .await
            .unwrap();
        }
        log
    }

    #[tokio::test]
    async fn test_catch_up_applies_in_order() {
        let log = seeded_log().await;
        let registry = GroupRegistry::shared(4);
        let storage = Arc::new(SignalStorage::in_memory().unwrap());
        let sync = EventSync::new(registry.clone(), Arc::new(log), storage.clone());

        let applied = sync.catch_up(Duration::from_millis(50)).await.unwrap();
        assert_eq!(applied, 4);
        assert_eq!(storage.checkpoint().unwrap(), 4);

        let registry = registry.read().await;
        assert_eq!(registry.snapshot(GroupId(1)).unwrap().member_count(), 3);
    }

    #[tokio::test]
    async fn test_idempotent_reconstruction() {
        // Replaying the same log into two fresh registries yields
        // identical roots for every group.
        let log = Arc::new(seeded_log().await);

        let mut roots = Vec::new();
        for _ in 0..2 {
            let registry = GroupRegistry::shared(4);
            let storage = Arc::new(SignalStorage::in_memory().unwrap());
            let sync = EventSync::new(registry.clone(), log.clone(), storage);
            sync.catch_up(Duration::from_millis(50)).await.unwrap();
            roots.push(registry.read().await.snapshot(GroupId(1)).unwrap().root());
        }
        assert_eq!(roots[0], roots[1]);
    }

    #[tokio::test]
    async fn test_live_sync_and_resubscribe() {
        let log = Arc::new(MemoryEventLog::new());
        let registry = GroupRegistry::shared(4);
        let storage = Arc::new(SignalStorage::in_memory().unwrap());
        let sync = Arc::new(EventSync::new(registry.clone(), log.clone(), storage.clone()));

        let (cancel_tx, cancel) = CancellationToken::new();
        let handle = {
            let sync = sync.clone();
            tokio::spawn(async move { sync.run(cancel).await })
        };

        log.submit(GroupAction::CreateGroup {
            name: GroupName::new("devs").unwrap(),
        })
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(registry.read().await.contains(GroupId(1)));

        // Drop the stream; sync must resubscribe from its checkpoint
        // and keep applying, not reset the registry.
        log.disconnect_all();
        log.submit(GroupAction::AddMember {
            group_id: GroupId(1),
            commitment: Commitment::from_bytes([0x11; 32]),
        })
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(
            registry
                .read()
                .await
                .snapshot(GroupId(1))
                .unwrap()
                .member_count(),
            1
        );

        cancel_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_cancellation_stops_loop() {
        let log = Arc::new(MemoryEventLog::new());
        let registry = GroupRegistry::shared(4);
        let storage = Arc::new(SignalStorage::in_memory().unwrap());
        let sync = Arc::new(EventSync::new(registry, log, storage));

        let (cancel_tx, cancel) = CancellationToken::new();
        let handle = {
            let sync = sync.clone();
            tokio::spawn(async move { sync.run(cancel).await })
        };

        cancel_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }
}
