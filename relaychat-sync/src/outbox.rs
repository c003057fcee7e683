//! Optimistic send tracking: client-minted ids, bounded confirmation
//! timers, and pending/confirmed/failed settlement.

use std::collections::HashMap;
use std::time::Duration;

use relaychat_shared::models::{Message, Timestamp};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Default window a send may stay unconfirmed before it fails.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Tracks optimistic sends awaiting server confirmation.
///
/// `submit` mints the message id and arms a per-send timer; ids whose timer
/// fires are delivered on the expiry receiver handed out by
/// [`SendTracker::new`]. Timers are cancelled on confirmation. An id is
/// settled at most once: whichever of confirmation, synchronous send
/// failure, or expiry comes first wins, and the rest are no-ops.
///
/// Retrying a failed send goes back through `submit`, which mints a fresh
/// id. A failed id is never resent: the original may have succeeded
/// server-side after the client gave up, and reusing it would mask a real
/// duplicate.
#[derive(Debug)]
pub struct SendTracker {
    timeout: Duration,
    pending: HashMap<Uuid, CancellationToken>,
    expiry_tx: mpsc::UnboundedSender<Uuid>,
}

impl SendTracker {
    /// Creates a tracker and the receiver its expiry notices arrive on.
    #[must_use]
    pub fn new(timeout: Duration) -> (Self, mpsc::UnboundedReceiver<Uuid>) {
        let (expiry_tx, expiry_rx) = mpsc::unbounded_channel();
        (
            Self {
                timeout,
                pending: HashMap::new(),
                expiry_tx,
            },
            expiry_rx,
        )
    }

    /// Mints a new pending message and arms its confirmation timer.
    ///
    /// The returned message is ready to insert into the timeline and hand
    /// to the push channel; `created_at` is the local submission time,
    /// provisional until the server confirms.
    pub fn submit(
        &mut self,
        conversation_id: Uuid,
        sender_id: Uuid,
        content: impl Into<String>,
    ) -> Message {
        let message = Message {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id,
            content: content.into(),
            created_at: Timestamp::now(),
        };

        let token = CancellationToken::new();
        self.pending.insert(message.id, token.clone());

        let timeout = self.timeout;
        let expiry_tx = self.expiry_tx.clone();
        let id = message.id;
        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {}
                () = tokio::time::sleep(timeout) => {
                    // Receiver gone means the session was torn down.
                    let _ = expiry_tx.send(id);
                }
            }
        });

        message
    }

    /// Settles a pending send as confirmed, cancelling its timer.
    /// Returns false if the id was not pending.
    pub fn confirm(&mut self, id: Uuid) -> bool {
        match self.pending.remove(&id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Settles a pending send as failed (synchronous send error, or the
    /// expiry notice for it was just received). Returns false if the id
    /// already settled.
    pub fn settle_failed(&mut self, id: Uuid) -> bool {
        match self.pending.remove(&id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Whether `id` is still awaiting confirmation.
    #[must_use]
    pub fn is_pending(&self, id: Uuid) -> bool {
        self.pending.contains_key(&id)
    }

    /// Number of sends awaiting confirmation.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

impl Drop for SendTracker {
    fn drop(&mut self) {
        for token in self.pending.values() {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn timer_fires_after_timeout() {
        let (mut tracker, mut expiry_rx) = SendTracker::new(Duration::from_secs(10));
        let message = tracker.submit(Uuid::new_v4(), Uuid::new_v4(), "hi");
        assert!(tracker.is_pending(message.id));

        tokio::time::sleep(Duration::from_secs(11)).await;
        let expired = expiry_rx.recv().await.unwrap();
        assert_eq!(expired, message.id);

        // The expiry notice itself settles the send.
        assert!(tracker.settle_failed(message.id));
        assert!(!tracker.is_pending(message.id));
    }

    #[tokio::test(start_paused = true)]
    async fn confirmation_cancels_the_timer() {
        let (mut tracker, mut expiry_rx) = SendTracker::new(Duration::from_secs(10));
        let message = tracker.submit(Uuid::new_v4(), Uuid::new_v4(), "hi");

        assert!(tracker.confirm(message.id));
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(expiry_rx.try_recv().is_err());

        // Already settled: the late paths are no-ops.
        assert!(!tracker.confirm(message.id));
        assert!(!tracker.settle_failed(message.id));
    }

    #[tokio::test(start_paused = true)]
    async fn each_submission_mints_a_fresh_id() {
        let (mut tracker, _expiry_rx) = SendTracker::new(DEFAULT_SEND_TIMEOUT);
        let conversation = Uuid::new_v4();
        let sender = Uuid::new_v4();

        let first = tracker.submit(conversation, sender, "hello");
        let retry = tracker.submit(conversation, sender, "hello");
        assert_ne!(first.id, retry.id);
        assert_eq!(tracker.pending_count(), 2);
    }
}
