//! Cancellation plumbing for long-lived background work.

use tokio::sync::watch;

/// Watch-channel backed cancellation token. Cloneable; all clones
/// observe the same cancel signal.
#[derive(Clone)]
pub struct CancellationToken {
    receiver: watch::Receiver<bool>,
}

impl CancellationToken {
    pub fn new() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self { receiver: rx })
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once cancellation is signalled (or the sender side is
    /// gone, which counts as cancelled).
    pub async fn cancelled(&mut self) {
        while !*self.receiver.borrow() {
            if self.receiver.changed().await.is_err() {
                break;
            }
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        let (_, rx) = watch::channel(false);
        Self { receiver: rx }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancel_signal_observed() {
        let (tx, token) = CancellationToken::new();
        assert!(!token.is_cancelled());
        tx.send(true).unwrap();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_dropped_sender_counts_as_cancelled() {
        let (tx, mut token) = CancellationToken::new();
        drop(tx);
        token.cancelled().await;
    }
}
