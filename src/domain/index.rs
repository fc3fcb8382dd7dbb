//! Index listing types.

use serde::{Deserialize, Serialize};

/// Size and health figures for one index.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IndexStats {
    pub doc_count: u64,
    pub store_size_bytes: u64,
    /// Backend health colour (`green`, `yellow`, `red`).
    pub health: String,
}

/// One entry of an index listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSummary {
    pub name: String,
    #[serde(flatten)]
    pub stats: IndexStats,
}

impl IndexSummary {
    #[must_use]
    pub fn new(name: impl Into<String>, stats: IndexStats) -> Self {
        Self {
            name: name.into(),
            stats,
        }
    }
}

/// Sums the stats of every listed index, or `None` for an empty listing.
///
/// Health is the worst colour seen.
#[must_use]
pub fn aggregate_stats(indices: &[IndexSummary]) -> Option<IndexStats> {
    fn rank(health: &str) -> u8 {
        match health {
            "red" => 3,
            "yellow" => 2,
            "green" => 1,
            _ => 0,
        }
    }

    indices.iter().map(|i| &i.stats).fold(None, |acc, stats| {
        let mut total = acc.unwrap_or_default();
        total.doc_count += stats.doc_count;
        total.store_size_bytes += stats.store_size_bytes;
        if rank(&stats.health) > rank(&total.health) {
            total.health.clone_from(&stats.health);
        }
        Some(total)
    })
}
