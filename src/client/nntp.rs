//! Session adapter over [`nntp_rs::NntpClient`].
//!
//! nntp-rs owns the wire: implicit TLS, status lines, dot-unstuffing and
//! overview parsing. This module adds the per-command timeouts from
//! [`TimeoutConfig`](crate::config::TimeoutConfig), the OVER to XOVER fallback
//! and the translation of [`NntpError`] into this crate's [`Error`].

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use nntp_rs::{NntpClient, NntpError};

use super::{Connector, Session};
use crate::config::{Config, Credentials, ServerConfig};
use crate::error::{Error, Result};
use crate::types::{ArticleRange, GroupInfo, OverviewEntry};

/// How long QUIT waits for the server's goodbye before dropping the connection
const QUIT_TIMEOUT: Duration = Duration::from_secs(2);

// Conversion from our ServerConfig to nntp-rs's ServerConfig
impl From<ServerConfig> for nntp_rs::ServerConfig {
    fn from(config: ServerConfig) -> Self {
        nntp_rs::ServerConfig {
            host: config.host,
            port: config.port,
            // nntp-rs 0.3 always negotiates implicit TLS
            tls: true,
            allow_insecure_tls: config.allow_insecure_tls,
            username: config.username.unwrap_or_default(),
            password: config.password.unwrap_or_default(),
        }
    }
}

/// Opens [`NntpSession`]s to one server.
#[derive(Clone, Debug)]
pub struct NntpConnector {
    server: Arc<nntp_rs::ServerConfig>,
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl NntpConnector {
    /// Create a connector for `server`.
    ///
    /// The account in `server` is the one sessions log in with.
    pub fn new(server: ServerConfig, connect_timeout: Duration, read_timeout: Duration) -> Self {
        Self {
            server: Arc::new(server.into()),
            connect_timeout,
            read_timeout,
        }
    }

    /// Create a connector from the server and timeout settings of `config`
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.server.clone(),
            config.timeouts.connect,
            config.timeouts.read,
        )
    }
}

#[async_trait::async_trait]
impl Connector for NntpConnector {
    async fn open(&self) -> Result<Box<dyn Session>> {
        let session = NntpSession::connect(
            Arc::clone(&self.server),
            self.connect_timeout,
            self.read_timeout,
        )
        .await?;
        Ok(Box::new(session))
    }

    fn address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// One NNTP connection.
///
/// A timeout or I/O failure leaves the stream at an unknown position, so the
/// session marks itself broken and refuses further commands.
pub struct NntpSession {
    client: NntpClient,
    read_timeout: Duration,
    broken: bool,
    closed: bool,
    use_xover: bool,
}

impl NntpSession {
    /// Dial the server described by `server`, complete the TLS handshake and read the greeting
    pub async fn connect(
        server: Arc<nntp_rs::ServerConfig>,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self> {
        let address = format!("{}:{}", server.host, server.port);
        let client = tokio::time::timeout(connect_timeout, NntpClient::connect(server))
            .await
            .map_err(|_| Error::timeout(format!("connect to {address}"), connect_timeout))?
            .map_err(|e| match e {
                NntpError::Io(source) => Error::Connect {
                    address: address.clone(),
                    source,
                },
                other => map_nntp_error(other),
            })?;
        tracing::debug!(%address, "Connected");

        Ok(Self {
            client,
            read_timeout,
            broken: false,
            closed: false,
            use_xover: false,
        })
    }

    /// Refuse commands once the stream can no longer be trusted
    fn ready(&self) -> Result<()> {
        if self.broken || self.closed {
            return Err(Error::Protocol(
                "session is no longer usable after an earlier failure".to_string(),
            ));
        }
        Ok(())
    }

    /// Translate the outcome of one timed client call, marking the session
    /// broken when the connection state is unknown.
    fn settle<T>(
        &mut self,
        operation: &str,
        outcome: std::result::Result<nntp_rs::Result<T>, tokio::time::error::Elapsed>,
    ) -> Result<T> {
        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                if desynchronises(&e) {
                    self.broken = true;
                }
                Err(map_nntp_error(e))
            }
            Err(_) => {
                self.broken = true;
                Err(Error::timeout(operation, self.read_timeout))
            }
        }
    }
}

#[async_trait::async_trait]
impl Session for NntpSession {
    async fn authenticate(&mut self, credentials: &Credentials) -> Result<()> {
        self.ready()?;
        tracing::trace!(user = %credentials.username, "Authenticating");
        let outcome = tokio::time::timeout(self.read_timeout, self.client.authenticate()).await;
        self.settle("AUTHINFO response", outcome)
    }

    async fn mode_reader(&mut self) -> Result<()> {
        self.ready()?;
        let outcome = tokio::time::timeout(self.read_timeout, self.client.mode_reader()).await;
        match self.settle("MODE READER response", outcome) {
            Ok(posting) => {
                tracing::trace!(posting, "Reader mode");
                Ok(())
            }
            Err(Error::Nntp { code, message }) => {
                // Reader-only servers reject the command; carry on and let GROUP decide
                tracing::debug!(code, %message, "MODE READER not accepted");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn select_group(&mut self, group: &str) -> Result<GroupInfo> {
        self.ready()?;
        let outcome = tokio::time::timeout(self.read_timeout, self.client.select_group(group)).await;
        let info = self.settle("GROUP response", outcome)?;
        Ok(GroupInfo {
            name: group.to_string(),
            count: info.count,
            low: info.first,
            high: info.last,
        })
    }

    async fn overview(&mut self, range: ArticleRange) -> Result<Vec<OverviewEntry>> {
        self.ready()?;
        let spec = range.to_string();
        if !self.use_xover {
            let outcome = tokio::time::timeout(self.read_timeout, self.client.over(&spec)).await;
            match self.settle("OVER response", outcome) {
                Ok(entries) => return Ok(into_overview(entries)),
                Err(Error::Nntp { code: 500, .. }) => {
                    tracing::debug!("OVER not supported, falling back to XOVER");
                    self.use_xover = true;
                }
                Err(e) => return Err(e),
            }
        }

        let outcome = tokio::time::timeout(self.read_timeout, self.client.fetch_xover(&spec)).await;
        self.settle("XOVER response", outcome).map(into_overview)
    }

    async fn fetch_article(&mut self, message_id: &str) -> Result<Vec<u8>> {
        self.ready()?;
        let id = bracket_message_id(message_id);
        let outcome =
            tokio::time::timeout(self.read_timeout, self.client.fetch_article_binary(&id)).await;
        let response = self.settle("ARTICLE response", outcome)?;
        Ok(response.data)
    }

    fn is_healthy(&self) -> bool {
        !self.broken && !self.closed && !self.client.is_broken()
    }

    async fn quit(&mut self) {
        if self.closed {
            return;
        }
        if self.is_healthy() {
            let wait = QUIT_TIMEOUT.min(self.read_timeout);
            match tokio::time::timeout(wait, self.client.quit()).await {
                Ok(Ok(())) => tracing::trace!("Session closed"),
                Ok(Err(e)) => tracing::debug!(error = %e, "QUIT failed, dropping connection"),
                Err(_) => tracing::debug!("QUIT timed out, dropping connection"),
            }
        }
        self.closed = true;
    }
}

/// Keep entries that name an article; nntp-rs reports unparsable numbers as 0
fn into_overview(entries: Vec<nntp_rs::XoverEntry>) -> Vec<OverviewEntry> {
    entries
        .into_iter()
        .filter(|entry| !entry.message_id.is_empty())
        .map(|entry| OverviewEntry {
            number: entry.article_number,
            message_id: entry.message_id,
            bytes: u64::try_from(entry.bytes).unwrap_or(u64::MAX),
        })
        .collect()
}

/// Translate an nntp-rs error, keeping the status code where the server gave one
pub(crate) fn map_nntp_error(err: NntpError) -> Error {
    match err {
        NntpError::Io(e) => Error::Io(e),
        NntpError::Timeout => Error::Io(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "server did not answer in time",
        )),
        NntpError::Protocol { code, message } => Error::Nntp { code, message },
        NntpError::AuthFailed(message) => Error::Auth(message),
        NntpError::NoSuchGroup(group) => Error::Nntp {
            code: 411,
            message: format!("no such group {group}"),
        },
        NntpError::NoSuchArticle(id) => Error::Nntp {
            code: 430,
            message: format!("no such article {id}"),
        },
        NntpError::NoGroupSelected => Error::Nntp {
            code: 412,
            message: "no group selected".to_string(),
        },
        NntpError::ConnectionClosed => Error::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "server closed the connection",
        )),
        other => Error::Protocol(other.to_string()),
    }
}

/// Whether a failed command may have left unread data on the stream
fn desynchronises(err: &NntpError) -> bool {
    matches!(
        err,
        NntpError::Io(_)
            | NntpError::Timeout
            | NntpError::ConnectionClosed
            | NntpError::InvalidResponse(_)
            | NntpError::Tls(_)
    )
}

/// Wrap a message-id in angle brackets if it is not already
fn bracket_message_id(message_id: &str) -> Cow<'_, str> {
    if message_id.starts_with('<') {
        Cow::Borrowed(message_id)
    } else {
        Cow::Owned(format!("<{message_id}>"))
    }
}
