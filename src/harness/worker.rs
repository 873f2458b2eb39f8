//! One session draining the shared queue until told to stop.

use std::sync::Arc;

use tokio::sync::oneshot;

use crate::client::{Connector, Session};
use crate::config::{Credentials, RetryConfig};

use super::discovery::establish;
use super::queue::WorkReceiver;
use super::tracker::{Counters, PendingWork};

/// How a worker replaces a session that broke mid-run.
#[derive(Clone)]
pub(crate) struct Reconnect {
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) credentials: Option<Credentials>,
    pub(crate) retry: RetryConfig,
}

/// Owns one session exclusively and fetches one article at a time.
pub(crate) struct Worker {
    pub(crate) index: usize,
    pub(crate) session: Box<dyn Session>,
    pub(crate) queue: WorkReceiver,
    pub(crate) shutdown: oneshot::Receiver<()>,
    pub(crate) counters: Arc<Counters>,
    pub(crate) pending: Arc<PendingWork>,
    pub(crate) reconnect: Reconnect,
}

enum Step {
    Work(String),
    Shutdown,
    QueueClosed,
}

impl Worker {
    /// Consume message-ids until the shutdown signal arrives, then close the session.
    ///
    /// The shutdown signal is checked before the queue on every iteration, so a
    /// worker that has been told to stop never takes another id. A dropped
    /// shutdown sender counts as a signal.
    pub(crate) async fn run(mut self) {
        tracing::debug!(worker = self.index, "Worker started");

        loop {
            let step = tokio::select! {
                biased;
                _ = &mut self.shutdown => Step::Shutdown,
                next = self.queue.next() => match next {
                    Some(message_id) => Step::Work(message_id),
                    None => Step::QueueClosed,
                },
            };

            match step {
                Step::Work(message_id) => self.process(&message_id).await,
                Step::Shutdown => break,
                Step::QueueClosed => {
                    tracing::debug!(worker = self.index, "Work queue closed");
                    break;
                }
            }
        }

        self.session.quit().await;
        tracing::debug!(worker = self.index, "Worker stopped");
    }

    /// Fetch one article and acknowledge it, whatever the outcome.
    async fn process(&mut self, message_id: &str) {
        let _ack = self.pending.ack_on_drop();

        if !self.session.is_healthy() {
            self.replace_session().await;
        }

        match self.session.fetch_article(message_id).await {
            Ok(article) => {
                let bytes = article_bytes(&article);
                self.counters.record_success(bytes);
                tracing::debug!(
                    worker = self.index,
                    message_id,
                    bytes,
                    "Retrieved article"
                );
            }
            Err(e) => {
                self.counters.record_failure();
                tracing::warn!(
                    worker = self.index,
                    message_id,
                    missing = e.is_missing_article(),
                    error = %e,
                    "Article fetch failed"
                );
            }
        }
    }

    /// Swap a broken session for a fresh one. On failure the broken session is
    /// kept, so the next fetch fails fast and is counted.
    async fn replace_session(&mut self) {
        tracing::info!(worker = self.index, "Session unusable, reconnecting");
        let Reconnect {
            connector,
            credentials,
            retry,
        } = &self.reconnect;

        match establish(connector.as_ref(), credentials.as_ref(), retry).await {
            Ok(fresh) => {
                let mut old = std::mem::replace(&mut self.session, fresh);
                old.quit().await;
            }
            Err(e) => {
                tracing::warn!(worker = self.index, error = %e, "Reconnect failed");
            }
        }
    }
}

/// Length of a retrieved article for the byte counter, saturating on targets
/// where `usize` is wider than 64 bits
pub(crate) fn article_bytes(article: &[u8]) -> u64 {
    u64::try_from(article.len()).unwrap_or(u64::MAX)
}
