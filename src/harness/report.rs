//! Final throughput report.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::types::ArticleRange;

/// Outcome of one speedtest run
#[derive(Clone, Debug, Serialize)]
pub struct SpeedtestReport {
    /// Server that was measured
    pub server: String,
    /// Group the articles came from
    pub group: String,
    /// Article span that was requested (None when zero articles were requested)
    pub range: Option<ArticleRange>,
    /// Wall-clock time the run started
    pub started_at: DateTime<Utc>,
    /// Connections asked for
    pub connections_requested: usize,
    /// Connections that actually carried work
    pub connections_live: usize,
    /// Articles handed to the pool
    pub articles_dispatched: u64,
    /// Articles fetched successfully
    pub articles_ok: u64,
    /// Articles that failed
    pub articles_failed: u64,
    /// Bytes received from successful fetches
    pub bytes: u64,
    /// Time from first dispatch to last acknowledgment
    #[serde(rename = "elapsed_secs", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    /// `bytes * 8 / elapsed`, or 0 when no time elapsed
    pub bits_per_second: f64,
}

impl SpeedtestReport {
    /// Serialize the report as pretty-printed JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl std::fmt::Display for SpeedtestReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Read {} bytes in {:.2} seconds. {}.",
            self.bytes,
            self.elapsed.as_secs_f64(),
            format_bitrate(self.bits_per_second)
        )?;
        if self.articles_failed > 0 {
            write!(
                f,
                " ({} of {} articles failed)",
                self.articles_failed, self.articles_dispatched
            )?;
        }
        if self.connections_live < self.connections_requested {
            write!(
                f,
                " (ran on {} of {} connections)",
                self.connections_live, self.connections_requested
            )?;
        }
        Ok(())
    }
}

/// Throughput in bits per second, 0 if `elapsed` is zero
pub fn throughput_bps(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        bytes as f64 * 8.0 / secs
    } else {
        0.0
    }
}

/// Render a bit rate with a decimal SI unit, e.g. `10.10 Mbit/s`
pub fn format_bitrate(bits_per_second: f64) -> String {
    const UNITS: [&str; 5] = ["bit/s", "kbit/s", "Mbit/s", "Gbit/s", "Tbit/s"];

    let mut value = bits_per_second.max(0.0);
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}

fn serialize_secs<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64())
}
