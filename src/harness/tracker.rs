//! Shared counters and the completion barrier.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use tokio::sync::Notify;

/// Atomic counters shared by every worker.
///
/// Workers only add; the harness reads once after the completion barrier.
#[derive(Debug, Default)]
pub struct Counters {
    bytes: AtomicU64,
    articles_ok: AtomicU64,
    articles_failed: AtomicU64,
}

impl Counters {
    /// Record a successfully fetched article of `bytes` length
    pub fn record_success(&self, bytes: u64) {
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
        self.articles_ok.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an article that could not be fetched
    pub fn record_failure(&self) {
        self.articles_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Total bytes received so far
    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    /// Articles fetched successfully so far
    pub fn articles_ok(&self) -> u64 {
        self.articles_ok.load(Ordering::Relaxed)
    }

    /// Articles that failed so far
    pub fn articles_failed(&self) -> u64 {
        self.articles_failed.load(Ordering::Relaxed)
    }
}

/// Count of dispatched-but-unacknowledged articles with an async wait-for-zero.
#[derive(Debug, Default)]
pub struct PendingWork {
    outstanding: AtomicUsize,
    idle: Notify,
}

impl PendingWork {
    /// Create a tracker with nothing outstanding
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one item about to be dispatched. Call before the item is pushed.
    pub fn add(&self) {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
    }

    /// Acknowledge one item, waking waiters if it was the last.
    pub fn complete(&self) {
        let previous = self
            .outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        match previous {
            Ok(1) => self.idle.notify_waiters(),
            Ok(_) => {}
            Err(_) => tracing::warn!("Completion acknowledged with no outstanding work"),
        }
    }

    /// Number of items still outstanding
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// Wait until no items are outstanding. Returns at once if none are.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            // Register before checking, so a completion in between is not missed
            notified.as_mut().enable();

            if self.outstanding() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Guard that acknowledges one item when dropped, even if the holder panics.
    pub(crate) fn ack_on_drop(self: &Arc<Self>) -> Ack {
        Ack {
            pending: Arc::clone(self),
        }
    }
}

/// Acknowledges one outstanding item on drop.
pub(crate) struct Ack {
    pending: Arc<PendingWork>,
}

impl Drop for Ack {
    fn drop(&mut self) {
        self.pending.complete();
    }
}
