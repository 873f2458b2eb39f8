//! Core types shared by the client and the harness

use serde::{Deserialize, Serialize};

/// Result of selecting a group: estimated article count and number bounds
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInfo {
    /// Group name as echoed by the server
    pub name: String,
    /// Estimated number of articles
    pub count: u64,
    /// Lowest article number
    pub low: u64,
    /// Highest article number
    pub high: u64,
}

impl GroupInfo {
    /// Whether the group has no articles to read
    pub fn is_empty(&self) -> bool {
        self.count == 0 || self.high < self.low
    }
}

/// Inclusive span of article numbers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRange {
    /// First article number
    pub start: u64,
    /// Last article number (inclusive)
    pub end: u64,
}

impl ArticleRange {
    /// Whether `number` lies inside the span
    pub fn contains(&self, number: u64) -> bool {
        self.start <= number && number <= self.end
    }

    /// Number of article numbers covered
    pub fn article_count(&self) -> u64 {
        self.end.saturating_sub(self.start).saturating_add(1)
    }
}

impl std::fmt::Display for ArticleRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// One line of overview data: the identity and size of an article
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverviewEntry {
    /// Article number within the group
    pub number: u64,
    /// Message-ID, including angle brackets
    pub message_id: String,
    /// Size hint in bytes (0 if the server did not report one)
    pub bytes: u64,
}
