//! Pool lifecycle: start N workers on one queue and stop them again.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::client::{Connector, Session};
use crate::config::{Config, StartPolicy};
use crate::error::{Error, Result};

use super::discovery::establish;
use super::queue::{WorkSender, work_queue};
use super::tracker::{Counters, PendingWork};
use super::worker::{Reconnect, Worker};

/// Handle to one running worker task.
struct WorkerHandle {
    index: usize,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

/// Fixed set of workers sharing one work queue.
///
/// Workers are never added or removed after [`Pool::start`] returns.
pub struct Pool {
    sender: WorkSender,
    workers: Vec<WorkerHandle>,
    pending: Arc<PendingWork>,
    requested: usize,
    shutdown_timeout: Duration,
    shut_down: bool,
}

impl Pool {
    /// Open `config.benchmark.connections` sessions concurrently and start a worker on each.
    ///
    /// With [`StartPolicy::FailFast`] any failed session aborts the start: sessions that did
    /// open are closed and the error names the first failing index. With
    /// [`StartPolicy::Degrade`] the pool runs on whichever sessions opened, as long as
    /// at least one did.
    pub async fn start(
        connector: Arc<dyn Connector>,
        config: &Config,
        counters: Arc<Counters>,
        pending: Arc<PendingWork>,
    ) -> Result<Self> {
        let requested = config.benchmark.connections;
        let credentials = config.server.credentials();

        tracing::info!(
            connections = requested,
            server = %connector.address(),
            "Starting connections"
        );

        let attempts = futures::future::join_all((0..requested).map(|index| {
            let connector = Arc::clone(&connector);
            let credentials = credentials.clone();
            let retry = config.retry.clone();
            async move {
                let session = establish(connector.as_ref(), credentials.as_ref(), &retry).await;
                (index, session)
            }
        }))
        .await;

        let mut sessions: Vec<(usize, Box<dyn Session>)> = Vec::with_capacity(requested);
        let mut failures: Vec<(usize, Error)> = Vec::new();
        for (index, attempt) in attempts {
            match attempt {
                Ok(session) => sessions.push((index, session)),
                Err(e) => failures.push((index, e)),
            }
        }

        if !failures.is_empty() {
            match config.benchmark.start_policy {
                StartPolicy::FailFast => {
                    for (_, session) in &mut sessions {
                        session.quit().await;
                    }
                    let (index, source) = failures.swap_remove(0);
                    tracing::error!(
                        index,
                        failed = failures.len() + 1,
                        error = %source,
                        "Connection failed to start"
                    );
                    return Err(Error::PoolStart {
                        index,
                        source: Box::new(source),
                    });
                }
                StartPolicy::Degrade => {
                    for (index, e) in &failures {
                        tracing::warn!(index, error = %e, "Connection failed to start, continuing without it");
                    }
                    if sessions.is_empty() {
                        return Err(Error::NoLiveConnections { requested });
                    }
                    tracing::warn!(
                        live = sessions.len(),
                        requested,
                        "Running with a reduced pool"
                    );
                }
            }
        }

        let (sender, receiver) = work_queue();
        let reconnect = Reconnect {
            connector,
            credentials,
            retry: config.retry.clone(),
        };

        let workers = sessions
            .into_iter()
            .map(|(index, session)| {
                let (shutdown_tx, shutdown_rx) = oneshot::channel();
                let worker = Worker {
                    index,
                    session,
                    queue: receiver.clone(),
                    shutdown: shutdown_rx,
                    counters: Arc::clone(&counters),
                    pending: Arc::clone(&pending),
                    reconnect: reconnect.clone(),
                };
                WorkerHandle {
                    index,
                    shutdown: Some(shutdown_tx),
                    task: Some(tokio::spawn(worker.run())),
                }
            })
            .collect();

        Ok(Self {
            sender,
            workers,
            pending,
            requested,
            shutdown_timeout: config.timeouts.shutdown,
            shut_down: false,
        })
    }

    /// Hand one message-id to the workers.
    ///
    /// The item is counted as outstanding before it is pushed, so a worker can
    /// never acknowledge it before the harness has registered it.
    pub fn dispatch(&self, message_id: String) -> Result<()> {
        if self.shut_down {
            return Err(Error::QueueClosed);
        }
        self.pending.add();
        if let Err(e) = self.sender.push(message_id) {
            self.pending.complete();
            return Err(e);
        }
        Ok(())
    }

    /// Number of connections that were asked for
    pub fn requested(&self) -> usize {
        self.requested
    }

    /// Number of workers that started
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Number of worker tasks that have not yet exited
    pub fn live_workers(&self) -> usize {
        self.workers
            .iter()
            .filter(|w| w.task.as_ref().is_some_and(|t| !t.is_finished()))
            .count()
    }

    /// Signal every worker to close its session and wait for them, bounded by the
    /// configured shutdown timeout. Workers still running at the deadline are aborted.
    ///
    /// Calling this more than once is a no-op.
    pub async fn shutdown(&mut self) {
        if self.shut_down {
            tracing::debug!("Pool already shut down");
            return;
        }
        self.shut_down = true;

        for worker in &mut self.workers {
            if let Some(tx) = worker.shutdown.take() {
                // Err means the worker already exited
                let _ = tx.send(());
            }
        }

        let deadline = tokio::time::Instant::now() + self.shutdown_timeout;
        let mut stopped = 0usize;
        for worker in &mut self.workers {
            let Some(mut task) = worker.task.take() else {
                continue;
            };
            match tokio::time::timeout_at(deadline, &mut task).await {
                Ok(Ok(())) => stopped += 1,
                Ok(Err(e)) => {
                    tracing::warn!(worker = worker.index, error = %e, "Worker task ended abnormally");
                }
                Err(_) => {
                    tracing::warn!(
                        worker = worker.index,
                        timeout = ?self.shutdown_timeout,
                        "Worker did not stop in time, aborting"
                    );
                    task.abort();
                    let _ = task.await;
                }
            }
        }

        tracing::info!(stopped, total = self.workers.len(), "Connections closed");
    }
}
