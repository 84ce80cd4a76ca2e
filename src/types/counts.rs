use serde::{Deserialize, Serialize};

use super::view::RECENT_LIMIT;

/// Row counts for the fixed navigation buckets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketCounts {
    pub all: u64,
    pub favorites: u64,
    pub recent: u64,
    pub trash: u64,
}

impl BucketCounts {
    /// Builds the tuple from the three queried counts. `recent` is derived.
    pub fn from_queried(all: u64, favorites: u64, trash: u64) -> Self {
        Self {
            all,
            favorites,
            recent: all.min(RECENT_LIMIT as u64),
            trash,
        }
    }
}
