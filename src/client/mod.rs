//! Article retrieval client
//!
//! The harness only talks to the server through [`Connector`] and [`Session`],
//! so tests can drive the pool with scripted sessions. [`NntpConnector`] is the
//! production implementation, a thin adapter over `nntp_rs::NntpClient`.

mod nntp;

pub use nntp::{NntpConnector, NntpSession};

use crate::config::Credentials;
use crate::error::Result;
use crate::types::{ArticleRange, GroupInfo, OverviewEntry};

/// Opens new sessions to the server under test.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    /// Dial the server and complete the greeting.
    async fn open(&self) -> Result<Box<dyn Session>>;

    /// `host:port` (or another label) used in diagnostics.
    fn address(&self) -> String;
}

/// One stateful connection, owned exclusively by a single task.
#[async_trait::async_trait]
pub trait Session: Send {
    /// Log in with the given credentials.
    async fn authenticate(&mut self, credentials: &Credentials) -> Result<()>;

    /// Switch the server into reader mode before issuing reader commands.
    async fn mode_reader(&mut self) -> Result<()> {
        Ok(())
    }

    /// Select a group and return its bounds.
    async fn select_group(&mut self, group: &str) -> Result<GroupInfo>;

    /// Fetch overview lines for the articles in `range` of the selected group.
    async fn overview(&mut self, range: ArticleRange) -> Result<Vec<OverviewEntry>>;

    /// Retrieve one full article by message-id.
    async fn fetch_article(&mut self, message_id: &str) -> Result<Vec<u8>>;

    /// Whether the session can still carry commands.
    ///
    /// A session that lost its stream or fell out of step with the server
    /// reports `false`; the owner should replace it.
    fn is_healthy(&self) -> bool {
        true
    }

    /// Say goodbye and close the connection. Best effort; safe to call twice.
    async fn quit(&mut self);
}
