//! Choosing which articles a run fetches
//!
//! The run starts at the midpoint of the group so it reads articles that are
//! old enough to be fully propagated but not so old they have expired, then
//! walks forward by the requested count.

use crate::config::RangePolicy;
use crate::error::{Error, Result};
use crate::types::{ArticleRange, GroupInfo};

/// Compute the article span to fetch from `group`.
///
/// `start = low + (high - low) / 2` and `end = start + articles`. When `end`
/// runs past `high` the policy decides between clamping and failing. A request
/// for zero articles returns `Ok(None)`.
pub fn plan_range(
    group: &GroupInfo,
    articles: u64,
    policy: RangePolicy,
) -> Result<Option<ArticleRange>> {
    if group.is_empty() {
        return Err(Error::EmptyGroup(group.name.clone()));
    }
    if articles == 0 {
        return Ok(None);
    }

    let start = group.low + (group.high - group.low) / 2;
    let requested_end = start.saturating_add(articles);

    let end = if requested_end > group.high {
        match policy {
            RangePolicy::Clamp => {
                tracing::debug!(
                    requested_end,
                    high = group.high,
                    "Requested range runs past the last article, clamping"
                );
                group.high
            }
            RangePolicy::Strict => {
                return Err(Error::RangeExceedsGroup {
                    end: requested_end,
                    high: group.high,
                });
            }
        }
    } else {
        requested_end
    };

    Ok(Some(ArticleRange { start, end }))
}
