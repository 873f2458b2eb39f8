//! Work queue: unbounded hand-off of message-ids from the harness to workers.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};

use crate::error::{Error, Result};

/// Create a connected sender/receiver pair.
pub(crate) fn work_queue() -> (WorkSender, WorkReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        WorkSender { tx },
        WorkReceiver {
            rx: Arc::new(Mutex::new(rx)),
        },
    )
}

/// Producer side; only the pool pushes.
#[derive(Clone, Debug)]
pub(crate) struct WorkSender {
    tx: mpsc::UnboundedSender<String>,
}

impl WorkSender {
    /// Hand one message-id to whichever worker asks next. Never blocks.
    pub(crate) fn push(&self, message_id: String) -> Result<()> {
        self.tx.send(message_id).map_err(|_| Error::QueueClosed)
    }
}

/// Consumer side, shared by every worker.
///
/// Receivers take turns behind an async mutex, so each id reaches exactly one
/// worker. Both the lock and `recv` are cancel-safe: a worker that abandons
/// `next()` for its shutdown signal never drops an id.
#[derive(Clone, Debug)]
pub(crate) struct WorkReceiver {
    rx: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
}

impl WorkReceiver {
    /// Wait for the next message-id; `None` once every sender is gone and the queue is drained.
    pub(crate) async fn next(&self) -> Option<String> {
        let mut rx = self.rx.lock().await;
        rx.recv().await
    }
}
