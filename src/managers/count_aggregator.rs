//! Bucket counts for navigation, independent of the rendered view.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::gateway::RemoteBookmarkGateway;
use crate::managers::identity::Identity;
use crate::types::counts::BucketCounts;
use crate::types::errors::SyncError;
use crate::types::view::Bucket;

#[derive(Default)]
struct CountState {
    counts: BucketCounts,
    /// Generation of the most recently started refresh.
    started: u64,
    /// Generation whose result is currently shown.
    applied: u64,
}

/// Keeps the all/favorites/recent/trash tuple current.
///
/// A refresh replaces the whole tuple or nothing: if any count query fails
/// the previous counts stay in place.
pub struct CountAggregator {
    gateway: Arc<dyn RemoteBookmarkGateway>,
    identity: Identity,
    state: Mutex<CountState>,
}

impl CountAggregator {
    pub fn new(gateway: Arc<dyn RemoteBookmarkGateway>, identity: Identity) -> Self {
        Self {
            gateway,
            identity,
            state: Mutex::new(CountState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, CountState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn counts(&self) -> BucketCounts {
        self.state().counts
    }

    /// Refreshes counts for the signed-in user.
    pub async fn refresh(&self) -> Result<BucketCounts, SyncError> {
        let user_id = self.identity.require()?;
        self.refresh_counts(&user_id).await
    }

    /// Issues the count queries concurrently and swaps in the new tuple.
    ///
    /// A refresh that finishes after a newer one has already been applied is
    /// discarded; the newer counts are returned instead.
    pub async fn refresh_counts(&self, user_id: &str) -> Result<BucketCounts, SyncError> {
        let generation = {
            let mut state = self.state();
            state.started += 1;
            state.started
        };

        let all_filter = Bucket::All.filter();
        let favorites_filter = Bucket::Favorites.filter();
        let trash_filter = Bucket::Trash.filter();
        let result = tokio::try_join!(
            self.gateway.count_bookmarks(user_id, &all_filter),
            self.gateway.count_bookmarks(user_id, &favorites_filter),
            self.gateway.count_bookmarks(user_id, &trash_filter),
        );

        let (all, favorites, trash) = match result {
            Ok(counts) => counts,
            Err(e) => {
                warn!(user_id, error = %e, "count refresh failed, keeping previous counts");
                return Err(e.into());
            }
        };

        let fresh = BucketCounts::from_queried(all, favorites, trash);
        let mut state = self.state();
        if generation < state.applied {
            debug!(generation, applied = state.applied, "discarding stale count refresh");
            return Ok(state.counts);
        }
        state.counts = fresh;
        state.applied = generation;
        Ok(fresh)
    }

    /// Forgets counts, e.g. on sign-out.
    ///
    /// Claims a fresh generation so refreshes still in flight are discarded
    /// when they land.
    pub fn reset(&self) {
        let mut state = self.state();
        state.started += 1;
        state.applied = state.started;
        state.counts = BucketCounts::default();
    }
}
