//! Periodic progress logging while articles are outstanding.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use super::report::{format_bitrate, throughput_bps};
use super::tracker::{Counters, PendingWork};

/// Spawn a task that logs bytes received and the running average rate every `interval`.
///
/// Stops when `cancel_token` is cancelled.
pub(crate) fn spawn_progress_reporter(
    interval: Duration,
    start: Instant,
    counters: Arc<Counters>,
    pending: Arc<PendingWork>,
    cancel_token: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // First tick fires immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let bytes = counters.bytes();
                    let rate = throughput_bps(bytes, start.elapsed());
                    tracing::info!(
                        bytes,
                        ok = counters.articles_ok(),
                        failed = counters.articles_failed(),
                        outstanding = pending.outstanding(),
                        rate = %format_bitrate(rate),
                        "Progress"
                    );
                }
                _ = cancel_token.cancelled() => {
                    break;
                }
            }
        }
    })
}
