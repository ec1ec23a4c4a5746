//! Delayed delivery of replies ("typing" pacing).
//!
//! At most one reply is pending per pacer. Scheduling a new reply, or the user sending a new
//! message (`cancel`), drops the pending one before it is delivered.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::shared::Reply;

#[derive(Debug, Clone, Default)]
pub struct TypingPacer {
    generation: Arc<AtomicU64>,
    pending: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl TypingPacer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers `reply` after `reply.delay_ms` unless cancelled first. Must be called inside a
    /// tokio runtime.
    pub fn schedule<F>(&self, reply: Reply, deliver: F)
    where
        F: FnOnce(Reply) + Send + 'static,
    {
        let ticket = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let generation = Arc::clone(&self.generation);
        let delay = Duration::from_millis(reply.delay_ms);

        let handle = tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if generation.load(Ordering::Acquire) == ticket {
                deliver(reply);
            } else {
                tracing::debug!(target: "hearth::pacing", "Superseded reply dropped");
            }
        });

        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = pending.replace(handle) {
            previous.abort();
        }
    }

    /// Drops the pending reply, if any.
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = pending.take() {
            if !handle.is_finished() {
                tracing::debug!(target: "hearth::pacing", "Pending reply cancelled");
            }
            handle.abort();
        }
    }

    /// True while a scheduled reply has not yet been delivered or cancelled.
    pub fn is_pending(&self) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::HandlerId;
    use tokio::sync::mpsc;

    fn reply(text: &str, delay_ms: u64) -> Reply {
        Reply::new(text, None, delay_ms, HandlerId::Adaptive)
    }

    #[tokio::test]
    async fn delivers_after_the_delay() {
        let pacer = TypingPacer::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        pacer.schedule(reply("hello", 20), move |r| {
            let _ = tx.send(r.text);
        });
        assert!(pacer.is_pending());
        assert_eq!(rx.recv().await.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn new_reply_supersedes_the_pending_one() {
        let pacer = TypingPacer::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let first = tx.clone();
        pacer.schedule(reply("first", 5_000), move |r| {
            let _ = first.send(r.text);
        });
        pacer.schedule(reply("second", 10), move |r| {
            let _ = tx.send(r.text);
        });
        assert_eq!(rx.recv().await.as_deref(), Some("second"));
        // Both senders are gone once the aborted task is dropped.
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn cancel_drops_the_pending_reply() {
        let pacer = TypingPacer::new();
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        pacer.schedule(reply("late", 5_000), move |r| {
            let _ = tx.send(r.text);
        });
        pacer.cancel();
        assert_eq!(rx.recv().await, None);
        assert!(!pacer.is_pending());
    }
}
