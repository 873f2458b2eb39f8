//! Throughput harness: a fixed pool of connections draining one work queue.
//!
//! Split into focused submodules:
//! - `discovery` - Session setup and the control-connection range lookup
//! - `queue` - Unbounded multi-consumer hand-off of message-ids
//! - `tracker` - Byte/outcome counters and the completion barrier
//! - `worker` - Per-connection consumption loop
//! - `pool` - Worker start-up, dispatch and bounded shutdown
//! - `progress` - Optional periodic progress logging
//! - `report` - Final report and throughput arithmetic

mod discovery;
mod pool;
mod progress;
mod queue;
mod report;
mod tracker;
mod worker;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

pub use pool::Pool;
pub use report::{SpeedtestReport, format_bitrate, throughput_bps};
pub use tracker::{Counters, PendingWork};

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::client::{Connector, NntpConnector};
use crate::config::Config;
use crate::error::Result;

use discovery::discover_articles;
use progress::spawn_progress_reporter;

/// One configured speedtest against one server.
pub struct Speedtest {
    config: Arc<Config>,
    connector: Arc<dyn Connector>,
}

impl Speedtest {
    /// Create a speedtest that speaks NNTP to the configured server
    pub fn new(config: Config) -> Result<Self> {
        let connector = Arc::new(NntpConnector::from_config(&config));
        Self::with_connector(config, connector)
    }

    /// Create a speedtest over a custom [`Connector`]
    pub fn with_connector(config: Config, connector: Arc<dyn Connector>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            connector,
        })
    }

    /// The configuration this run uses
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run the benchmark to completion.
    ///
    /// Phases:
    /// 1. Discover the article range over a transient control session
    /// 2. Start the pool
    /// 3. Dispatch every message-id and wait for all acknowledgments (timed)
    /// 4. Shut the pool down and build the report
    ///
    /// Setup failures return an error; individual article failures only show
    /// up in the report's counts.
    pub async fn run(&self) -> Result<SpeedtestReport> {
        let started_at = chrono::Utc::now();

        // Phase 1: control connection
        let discovery = discover_articles(self.connector.as_ref(), &self.config).await?;

        // Phase 2: pool
        let counters = Arc::new(Counters::default());
        let pending = Arc::new(PendingWork::new());
        let mut pool = Pool::start(
            Arc::clone(&self.connector),
            &self.config,
            Arc::clone(&counters),
            Arc::clone(&pending),
        )
        .await?;

        // Phase 3: timed dispatch and wait
        let start = Instant::now();
        let progress_cancel = CancellationToken::new();
        let progress_task = self.config.benchmark.progress_interval.map(|interval| {
            spawn_progress_reporter(
                interval,
                start,
                Arc::clone(&counters),
                Arc::clone(&pending),
                progress_cancel.child_token(),
            )
        });

        let mut dispatched: u64 = 0;
        for entry in discovery.entries {
            if let Err(e) = pool.dispatch(entry.message_id) {
                tracing::error!(error = %e, dispatched, "Dispatch failed, abandoning run");
                progress_cancel.cancel();
                pool.shutdown().await;
                return Err(e);
            }
            dispatched += 1;
        }
        tracing::debug!(dispatched, "All articles dispatched");

        pending.wait_idle().await;
        let elapsed = start.elapsed();

        progress_cancel.cancel();
        if let Some(task) = progress_task
            && let Err(e) = task.await
        {
            tracing::warn!(error = %e, "Progress reporter ended abnormally");
        }

        // Phase 4: teardown and report
        let connections_live = pool.size();
        pool.shutdown().await;

        let bytes = counters.bytes();
        let report = SpeedtestReport {
            server: self.connector.address(),
            group: self.config.benchmark.group.clone(),
            range: discovery.range,
            started_at,
            connections_requested: pool.requested(),
            connections_live,
            articles_dispatched: dispatched,
            articles_ok: counters.articles_ok(),
            articles_failed: counters.articles_failed(),
            bytes,
            elapsed,
            bits_per_second: throughput_bps(bytes, elapsed),
        };

        tracing::info!(
            bytes = report.bytes,
            elapsed_secs = report.elapsed.as_secs_f64(),
            ok = report.articles_ok,
            failed = report.articles_failed,
            rate = %format_bitrate(report.bits_per_second),
            "Speedtest complete"
        );
        Ok(report)
    }
}
