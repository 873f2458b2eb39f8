//! Scripted connector and sessions for driving the harness without a server.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::client::{Connector, Session};
use crate::config::{Config, Credentials};
use crate::error::{Error, Result};
use crate::types::{ArticleRange, GroupInfo, OverviewEntry};

/// What the fake server holds and how it misbehaves.
pub(crate) struct MockScript {
    pub(crate) group: GroupInfo,
    /// Every article in the group, in number order
    pub(crate) entries: Vec<OverviewEntry>,
    /// Payload length for articles without an entry in `sizes`
    pub(crate) article_size: usize,
    pub(crate) sizes: HashMap<String, usize>,
    /// Message-ids answered with 430
    pub(crate) missing: HashSet<String>,
    pub(crate) fail_all_fetches: bool,
    /// Open attempts (0-based, in call order) refused with 502
    pub(crate) refuse_opens: HashSet<usize>,
    pub(crate) fetch_delay: Option<Duration>,
    /// Sessions report unhealthy after this many fetches
    pub(crate) break_after: Option<usize>,
    /// Overview ignores the requested range and returns everything
    pub(crate) overview_ignores_range: bool,
}

impl MockScript {
    /// A group of `count` articles numbered `low..` with `article_size`-byte bodies.
    pub(crate) fn group(low: u64, count: u64, article_size: usize) -> Self {
        let entries = (low..low + count)
            .map(|number| OverviewEntry {
                number,
                message_id: format!("<{number}@mock>"),
                bytes: article_size as u64,
            })
            .collect();
        Self {
            group: GroupInfo {
                name: "alt.binaries.test".to_string(),
                count,
                low,
                high: (low + count).saturating_sub(1),
            },
            entries,
            article_size,
            sizes: HashMap::new(),
            missing: HashSet::new(),
            fail_all_fetches: false,
            refuse_opens: HashSet::new(),
            fetch_delay: None,
            break_after: None,
            overview_ignores_range: false,
        }
    }
}

/// Counters the tests assert on.
#[derive(Default)]
pub(crate) struct MockStats {
    pub(crate) opens: AtomicUsize,
    pub(crate) auths: AtomicUsize,
    pub(crate) quits: AtomicUsize,
    pub(crate) double_quits: AtomicUsize,
    pub(crate) live_sessions: AtomicUsize,
    pub(crate) fetches_after_quit: AtomicUsize,
    pub(crate) overview_ranges: Mutex<Vec<ArticleRange>>,
    pub(crate) fetched: Mutex<Vec<String>>,
}

/// Connector handing out [`MockSession`]s that share one script.
#[derive(Clone)]
pub(crate) struct MockConnector {
    pub(crate) script: Arc<MockScript>,
    pub(crate) stats: Arc<MockStats>,
}

impl MockConnector {
    pub(crate) fn new(script: MockScript) -> Self {
        Self {
            script: Arc::new(script),
            stats: Arc::new(MockStats::default()),
        }
    }

    pub(crate) fn opens(&self) -> usize {
        self.stats.opens.load(Ordering::SeqCst)
    }

    pub(crate) fn live_sessions(&self) -> usize {
        self.stats.live_sessions.load(Ordering::SeqCst)
    }

    pub(crate) fn fetched(&self) -> Vec<String> {
        self.stats.fetched.lock().unwrap().clone()
    }

    pub(crate) fn overview_ranges(&self) -> Vec<ArticleRange> {
        self.stats.overview_ranges.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Connector for MockConnector {
    async fn open(&self) -> Result<Box<dyn Session>> {
        let attempt = self.stats.opens.fetch_add(1, Ordering::SeqCst);
        if self.script.refuse_opens.contains(&attempt) {
            return Err(Error::Nntp {
                code: 502,
                message: format!("connection {attempt} refused"),
            });
        }
        self.stats.live_sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSession {
            script: Arc::clone(&self.script),
            stats: Arc::clone(&self.stats),
            fetches: 0,
            closed: false,
        }))
    }

    fn address(&self) -> String {
        "mock:119".to_string()
    }
}

pub(crate) struct MockSession {
    script: Arc<MockScript>,
    stats: Arc<MockStats>,
    fetches: usize,
    closed: bool,
}

#[async_trait::async_trait]
impl Session for MockSession {
    async fn authenticate(&mut self, _credentials: &Credentials) -> Result<()> {
        self.stats.auths.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn select_group(&mut self, group: &str) -> Result<GroupInfo> {
        Ok(GroupInfo {
            name: group.to_string(),
            ..self.script.group.clone()
        })
    }

    async fn overview(&mut self, range: ArticleRange) -> Result<Vec<OverviewEntry>> {
        self.stats.overview_ranges.lock().unwrap().push(range);
        Ok(self
            .script
            .entries
            .iter()
            .filter(|e| self.script.overview_ignores_range || range.contains(e.number))
            .cloned()
            .collect())
    }

    async fn fetch_article(&mut self, message_id: &str) -> Result<Vec<u8>> {
        if self.closed {
            self.stats.fetches_after_quit.fetch_add(1, Ordering::SeqCst);
            return Err(Error::Protocol("session closed".to_string()));
        }
        if let Some(delay) = self.script.fetch_delay {
            tokio::time::sleep(delay).await;
        }
        self.fetches += 1;
        self.stats
            .fetched
            .lock()
            .unwrap()
            .push(message_id.to_string());

        if self.script.fail_all_fetches || self.script.missing.contains(message_id) {
            return Err(Error::Nntp {
                code: 430,
                message: "No such article".to_string(),
            });
        }
        let size = self
            .script
            .sizes
            .get(message_id)
            .copied()
            .unwrap_or(self.script.article_size);
        Ok(vec![b'x'; size])
    }

    fn is_healthy(&self) -> bool {
        !self.closed
            && self
                .script
                .break_after
                .is_none_or(|limit| self.fetches < limit)
    }

    async fn quit(&mut self) {
        if self.closed {
            self.stats.double_quits.fetch_add(1, Ordering::SeqCst);
            return;
        }
        self.closed = true;
        self.stats.quits.fetch_add(1, Ordering::SeqCst);
        self.stats.live_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Config for `connections` workers with retries and timeouts sized for tests.
pub(crate) fn fast_config(connections: usize, articles: u64) -> Config {
    let mut config = Config::default();
    config.server.host = "mock".to_string();
    config.benchmark.connections = connections;
    config.benchmark.articles = articles;
    config.timeouts.shutdown = Duration::from_secs(5);
    config.retry.max_attempts = 0;
    config.retry.initial_delay = Duration::from_millis(1);
    config.retry.max_delay = Duration::from_millis(5);
    config.retry.jitter = false;
    config
}
