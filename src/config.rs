//! Configuration types for usenet-speedtest

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main configuration for a speedtest run
///
/// Every field has a default, so a JSON file only needs to name what it changes:
///
/// ```json
/// { "server": { "host": "news.example.com" }, "benchmark": { "connections": 10 } }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// NNTP server to benchmark
    #[serde(default)]
    pub server: ServerConfig,

    /// What to fetch and over how many connections
    #[serde(default)]
    pub benchmark: BenchmarkConfig,

    /// Network and shutdown timeouts
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Retry policy for opening sessions
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Config {
    /// Load a configuration from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&raw)?;
        Ok(config)
    }

    /// Check the settings that would make a run meaningless
    pub fn validate(&self) -> Result<()> {
        if self.server.host.trim().is_empty() {
            return Err(Error::config("server.host", "server host must not be empty"));
        }
        if self.server.port == 0 {
            return Err(Error::config("server.port", "server port must not be 0"));
        }
        if self.benchmark.connections == 0 {
            return Err(Error::config(
                "benchmark.connections",
                "at least one connection is required",
            ));
        }
        if self.benchmark.group.trim().is_empty() {
            return Err(Error::config("benchmark.group", "group name must not be empty"));
        }
        if self.benchmark.progress_interval == Some(Duration::ZERO) {
            return Err(Error::config(
                "benchmark.progress_interval",
                "progress interval must be at least one second (omit it to disable progress)",
            ));
        }
        if self.timeouts.connect.is_zero() {
            return Err(Error::config("timeouts.connect", "connect timeout must not be 0"));
        }
        if self.timeouts.read.is_zero() {
            return Err(Error::config("timeouts.read", "read timeout must not be 0"));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(Error::config(
                "retry.backoff_multiplier",
                "backoff multiplier must be at least 1.0",
            ));
        }
        Ok(())
    }
}

/// NNTP server configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server hostname
    #[serde(default)]
    pub host: String,

    /// Server port (default: 563, implicit TLS)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Username for authentication
    #[serde(default)]
    pub username: Option<String>,

    /// Password for authentication
    #[serde(default)]
    pub password: Option<String>,

    /// Accept any server certificate, e.g. a self-signed one (default: false)
    #[serde(default)]
    pub allow_insecure_tls: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            username: None,
            password: None,
            allow_insecure_tls: false,
        }
    }
}

impl ServerConfig {
    /// `host:port` string used for dialing and diagnostics
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Credentials to authenticate with, if both username and password are set
    pub fn credentials(&self) -> Option<Credentials> {
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => {
                Some(Credentials {
                    username: user.to_string(),
                    password: pass.to_string(),
                })
            }
            _ => None,
        }
    }
}

/// Username/password pair sent with AUTHINFO
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// AUTHINFO USER argument
    pub username: String,
    /// AUTHINFO PASS argument
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Benchmark shape: group, article count, connection count and edge-case policies
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    /// Number of concurrent connections (default: 1)
    #[serde(default = "default_connections")]
    pub connections: usize,

    /// Number of articles past the group midpoint to fetch (default: 100)
    #[serde(default = "default_articles")]
    pub articles: u64,

    /// Group to read from (default: "alt.binaries.boneless")
    #[serde(default = "default_group")]
    pub group: String,

    /// What to do when the requested span runs past the group's last article
    #[serde(default)]
    pub range_policy: RangePolicy,

    /// What to do when some pool connections fail to come up
    #[serde(default)]
    pub start_policy: StartPolicy,

    /// Log progress at this interval while articles are outstanding (None = off)
    #[serde(default, with = "optional_duration_serde")]
    pub progress_interval: Option<Duration>,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            connections: default_connections(),
            articles: default_articles(),
            group: default_group(),
            range_policy: RangePolicy::default(),
            start_policy: StartPolicy::default(),
            progress_interval: None,
        }
    }
}

/// Handling of a requested span that ends past the group's high-water mark
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangePolicy {
    /// Shorten the span so it ends at the last article (default)
    #[default]
    Clamp,
    /// Refuse to run
    Strict,
}

/// Handling of pool connections that fail to come up
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartPolicy {
    /// Abort the run if any connection fails (default)
    #[default]
    FailFast,
    /// Run with whichever connections came up and report the shortfall
    Degrade,
}

/// Network and shutdown timeouts
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// TCP connect, TLS handshake and greeting (default: 30 seconds)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect: Duration,

    /// Waiting for any single response line or article block (default: 60 seconds)
    #[serde(default = "default_read_timeout", with = "duration_serde")]
    pub read: Duration,

    /// Waiting for all workers to close their sessions (default: 10 seconds)
    #[serde(default = "default_shutdown_timeout", with = "duration_serde")]
    pub shutdown: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: default_connect_timeout(),
            read: default_read_timeout(),
            shutdown: default_shutdown_timeout(),
        }
    }
}

/// Retry configuration for opening sessions
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first try (default: 2)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 10 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

fn default_port() -> u16 {
    563
}

fn default_connections() -> usize {
    1
}

fn default_articles() -> u64 {
    100
}

fn default_group() -> String {
    "alt.binaries.boneless".to_string()
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_read_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_max_attempts() -> u32 {
    2
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(10)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Optional Duration serialization helper
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}
