//! Session setup and article discovery over the control connection.

use crate::client::{Connector, Session};
use crate::config::{Config, Credentials, RetryConfig};
use crate::error::Result;
use crate::range::plan_range;
use crate::retry::with_retry;
use crate::types::{ArticleRange, GroupInfo, OverviewEntry};

/// Open a session and bring it to the ready state: connect, authenticate if
/// credentials are given, then MODE READER. Transient failures are retried.
pub(crate) async fn establish(
    connector: &dyn Connector,
    credentials: Option<&Credentials>,
    retry: &RetryConfig,
) -> Result<Box<dyn Session>> {
    with_retry(retry, move || async move {
        let mut session = connector.open().await?;
        let ready = async {
            if let Some(credentials) = credentials {
                session.authenticate(credentials).await?;
            }
            session.mode_reader().await
        }
        .await;

        match ready {
            Ok(()) => Ok(session),
            Err(e) => {
                session.quit().await;
                Err(e)
            }
        }
    })
    .await
}

/// What the control connection learned before the timed phase.
#[derive(Debug)]
pub(crate) struct Discovery {
    pub(crate) group: GroupInfo,
    pub(crate) range: Option<ArticleRange>,
    pub(crate) entries: Vec<OverviewEntry>,
}

/// Select the group, plan the range and fetch its overview over a transient session.
///
/// The session is closed before returning, on success or failure.
pub(crate) async fn discover_articles(
    connector: &dyn Connector,
    config: &Config,
) -> Result<Discovery> {
    let credentials = config.server.credentials();
    let mut session = establish(connector, credentials.as_ref(), &config.retry).await?;

    let result = read_range(session.as_mut(), config).await;
    session.quit().await;

    let discovery = result?;
    tracing::info!(
        group = %discovery.group.name,
        low = discovery.group.low,
        high = discovery.group.high,
        range = ?discovery.range,
        articles = discovery.entries.len(),
        "Discovered articles"
    );
    Ok(discovery)
}

async fn read_range(session: &mut dyn Session, config: &Config) -> Result<Discovery> {
    let group = session.select_group(&config.benchmark.group).await?;
    let range = plan_range(
        &group,
        config.benchmark.articles,
        config.benchmark.range_policy,
    )?;

    let Some(range) = range else {
        return Ok(Discovery {
            group,
            range: None,
            entries: Vec::new(),
        });
    };

    let mut entries = session.overview(range).await?;
    let before = entries.len();
    entries.retain(|entry| range.contains(entry.number));
    if entries.len() < before {
        tracing::warn!(
            dropped = before - entries.len(),
            %range,
            "Server returned overview entries outside the requested range"
        );
    }

    Ok(Discovery {
        group,
        range: Some(range),
        entries,
    })
}
