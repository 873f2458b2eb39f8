//! # usenet-speedtest
//!
//! Measures how fast a Usenet (NNTP) server delivers articles over a fixed
//! number of parallel connections.
//!
//! A run opens one control connection to pick a span of articles from the
//! middle of a group, then hands every message-id in that span to a pool of
//! workers, each owning one connection. The report counts the bytes of every
//! article retrieved and divides by the time from the first dispatch to the
//! last acknowledgment.
//!
//! ## Quick Start
//!
//! ```no_run
//! use usenet_speedtest::{Config, Speedtest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.server.host = "news.example.com".to_string();
//!     config.server.username = Some("user".to_string());
//!     config.server.password = Some("pass".to_string());
//!     config.benchmark.connections = 10;
//!     config.benchmark.articles = 500;
//!
//!     let report = Speedtest::new(config)?.run().await?;
//!     println!("{report}");
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Connector and session abstraction plus the NNTP client
pub mod client;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Worker pool, completion tracking and the run itself
pub mod harness;
/// Article range planning
pub mod range;
/// Retry logic with exponential backoff
pub mod retry;
/// Group, range and overview types
pub mod types;

// Re-export commonly used types
pub use client::{Connector, NntpConnector, NntpSession, Session};
pub use config::{
    BenchmarkConfig, Config, Credentials, RangePolicy, RetryConfig, ServerConfig, StartPolicy,
    TimeoutConfig,
};
pub use error::{Error, Result};
pub use harness::{Pool, Speedtest, SpeedtestReport, format_bitrate, throughput_bps};
pub use types::{ArticleRange, GroupInfo, OverviewEntry};
