//! Bookmark Projection.
//!
//! Owns the in-memory list of bookmarks for the active [`ViewSpec`] and keeps
//! it consistent with the remote store. Reads are generation-tagged so only
//! the most recently requested load is ever applied. Mutations are applied
//! optimistically; a failed favorite toggle is rolled back exactly, while a
//! failed trash transition reloads the whole view instead.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use crate::gateway::RemoteBookmarkGateway;
use crate::managers::count_aggregator::CountAggregator;
use crate::managers::identity::Identity;
use crate::services::validation;
use crate::types::bookmark::{Bookmark, BookmarkPatch, NewBookmark};
use crate::types::errors::SyncError;
use crate::types::view::{Bucket, ViewSpec};

/// Snapshot of what the consumer renders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectionState {
    pub items: Vec<Bookmark>,
    pub loading: bool,
    pub error: Option<SyncError>,
}

/// Result of a load request that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    /// The response was applied; holds the number of rows.
    Applied(usize),
    /// A newer load was requested before this one returned.
    Superseded,
}

/// Row removed from the favorites view by an unfavorite that has not settled yet.
struct StashedRow {
    index: usize,
    bookmark: Bookmark,
    generation: u64,
}

/// In-flight favorite toggles for one bookmark.
struct ToggleLedger {
    pending: u32,
    /// Last value the gateway accepted (the pre-toggle value until one succeeds).
    confirmed: bool,
    stash: Option<StashedRow>,
}

struct Inner {
    view: ViewSpec,
    generation: u64,
    state: ProjectionState,
    toggles: HashMap<String, ToggleLedger>,
}

enum TrashOp {
    Trash,
    Restore,
    Purge,
}

impl TrashOp {
    fn label(&self) -> &'static str {
        match self {
            TrashOp::Trash => "move to trash",
            TrashOp::Restore => "restore from trash",
            TrashOp::Purge => "permanent delete",
        }
    }
}

pub struct BookmarkProjection {
    gateway: Arc<dyn RemoteBookmarkGateway>,
    identity: Identity,
    counts: Option<Arc<CountAggregator>>,
    inner: Mutex<Inner>,
}

impl BookmarkProjection {
    pub fn new(gateway: Arc<dyn RemoteBookmarkGateway>, identity: Identity) -> Self {
        Self {
            gateway,
            identity,
            counts: None,
            inner: Mutex::new(Inner {
                view: ViewSpec::default(),
                generation: 0,
                state: ProjectionState::default(),
                toggles: HashMap::new(),
            }),
        }
    }

    /// Refreshes `counts` after every mutation that can change bucket membership.
    pub fn with_counts(mut self, counts: Arc<CountAggregator>) -> Self {
        self.counts = Some(counts);
        self
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64
    }

    pub fn view(&self) -> ViewSpec {
        self.inner().view.clone()
    }

    pub fn state(&self) -> ProjectionState {
        self.inner().state.clone()
    }

    /// Rows in store order for the active bucket.
    pub fn items(&self) -> Vec<Bookmark> {
        self.inner().state.items.clone()
    }

    /// Rows after the view's client-side search and sort.
    pub fn visible_items(&self) -> Vec<Bookmark> {
        let inner = self.inner();
        inner.view.apply(&inner.state.items)
    }

    pub fn is_loading(&self) -> bool {
        self.inner().state.loading
    }

    pub fn error(&self) -> Option<SyncError> {
        self.inner().state.error.clone()
    }

    /// Loads `view`, replacing the current items.
    ///
    /// The last requested view wins: a response that arrives after a newer
    /// load was started is discarded and reported as [`LoadStatus::Superseded`].
    pub async fn load(&self, view: ViewSpec) -> Result<LoadStatus, SyncError> {
        let generation = {
            let mut inner = self.inner();
            inner.generation += 1;
            inner.view = view.clone();
            inner.state.loading = true;
            inner.generation
        };

        let result = match self.identity.require() {
            Ok(user_id) => self
                .gateway
                .select_bookmarks(&user_id, &view.bucket.query())
                .await
                .map_err(SyncError::from),
            Err(e) => Err(e),
        };
        self.finish_load(generation, result)
    }

    fn finish_load(
        &self,
        generation: u64,
        result: Result<Vec<Bookmark>, SyncError>,
    ) -> Result<LoadStatus, SyncError> {
        let mut inner = self.inner();
        if generation != inner.generation {
            debug!(generation, current = inner.generation, "discarding stale load");
            return Ok(LoadStatus::Superseded);
        }
        inner.state.loading = false;
        match result {
            Ok(items) => {
                let count = items.len();
                inner.state.items = items;
                inner.state.error = None;
                Ok(LoadStatus::Applied(count))
            }
            Err(e) => {
                warn!(bucket = %inner.view.bucket, error = %e, "load failed");
                inner.state.items.clear();
                inner.state.error = Some(e.clone());
                Err(e)
            }
        }
    }

    /// Reloads the active view.
    pub async fn refetch(&self) -> Result<LoadStatus, SyncError> {
        let view = self.view();
        self.load(view).await
    }

    /// Switches to `view`. Only search or sort changed: no read is issued.
    pub async fn select(&self, view: ViewSpec) -> Result<LoadStatus, SyncError> {
        {
            let mut inner = self.inner();
            let reusable = inner.view.same_source(&view)
                && inner.generation > 0
                && !inner.state.loading
                && inner.state.error.is_none();
            if reusable {
                inner.view = view;
                return Ok(LoadStatus::Applied(inner.state.items.len()));
            }
        }
        self.load(view).await
    }

    /// Drops all local state and invalidates in-flight loads.
    pub fn reset(&self) {
        let mut inner = self.inner();
        inner.generation += 1;
        inner.state = ProjectionState::default();
        inner.toggles.clear();
    }

    async fn refresh_counts(&self) {
        if let Some(counts) = &self.counts {
            if let Err(e) = counts.refresh().await {
                warn!(error = %e, "count refresh after mutation failed");
            }
        }
    }

    /// Validates and inserts a bookmark. When the new row belongs to the
    /// active view it is prepended immediately rather than waiting for a reload.
    pub async fn add_bookmark(
        &self,
        title: &str,
        url: &str,
        collection_id: Option<&str>,
    ) -> Result<Bookmark, SyncError> {
        let (title, url) = validation::validate_bookmark(title, url)?;
        let user_id = self.identity.require()?;

        let created = self
            .gateway
            .insert_bookmark(NewBookmark {
                user_id,
                title,
                url,
                collection_id: collection_id.map(str::to_string),
            })
            .await?;

        {
            let mut inner = self.inner();
            let visible = inner.view.bucket.admits_new(&created);
            let present = inner.state.items.iter().any(|b| b.id == created.id);
            if visible && !present {
                inner.state.items.insert(0, created.clone());
            }
        }
        info!(id = %created.id, "bookmark added");
        self.refresh_counts().await;
        Ok(created)
    }

    /// Flips `is_favorite` locally, then confirms with the gateway.
    ///
    /// Returns the value this call requested. On failure the flip is undone;
    /// with several toggles in flight for the same row, the row settles on
    /// the last value the gateway accepted once all of them have returned.
    pub async fn toggle_favorite(&self, id: &str) -> Result<bool, SyncError> {
        let user_id = self.identity.require()?;

        let target = {
            let mut guard = self.inner();
            let inner = &mut *guard;
            let index = inner
                .state
                .items
                .iter()
                .position(|b| b.id == id)
                .ok_or_else(|| SyncError::NotFound(id.to_string()))?;

            let current = inner.state.items[index].is_favorite;
            let target = !current;
            let ledger = inner
                .toggles
                .entry(id.to_string())
                .or_insert(ToggleLedger {
                    pending: 0,
                    confirmed: current,
                    stash: None,
                });
            ledger.pending += 1;

            BookmarkPatch::favorite(target).apply_to(&mut inner.state.items[index]);
            if inner.view.bucket == Bucket::Favorites && !target {
                let mut removed = inner.state.items.remove(index);
                if ledger.stash.is_none() {
                    BookmarkPatch::favorite(current).apply_to(&mut removed);
                    ledger.stash = Some(StashedRow {
                        index,
                        bookmark: removed,
                        generation: inner.generation,
                    });
                }
            }
            target
        };

        let result = self
            .gateway
            .update_bookmark(&user_id, id, BookmarkPatch::favorite(target))
            .await;
        self.settle_toggle(id, target, result.is_ok());

        match result {
            Ok(()) => {
                self.refresh_counts().await;
                Ok(target)
            }
            Err(e) => {
                warn!(id, error = %e, "favorite toggle rejected");
                Err(e.into())
            }
        }
    }

    fn settle_toggle(&self, id: &str, target: bool, accepted: bool) {
        let mut guard = self.inner();
        let inner = &mut *guard;
        let ledger = match inner.toggles.get_mut(id) {
            Some(ledger) => ledger,
            // Cleared by reset() while in flight.
            None => return,
        };
        ledger.pending = ledger.pending.saturating_sub(1);
        if accepted {
            ledger.confirmed = target;
        }
        if ledger.pending > 0 {
            return;
        }
        let ledger = match inner.toggles.remove(id) {
            Some(ledger) => ledger,
            None => return,
        };

        let settled = ledger.confirmed;
        if settled != target {
            info!(id, restored = settled, "rolling back optimistic favorite toggle");
        }
        let in_favorites = inner.view.bucket == Bucket::Favorites;
        match inner.state.items.iter().position(|b| b.id == id) {
            Some(index) => {
                BookmarkPatch::favorite(settled).apply_to(&mut inner.state.items[index]);
                if in_favorites && !settled {
                    inner.state.items.remove(index);
                }
            }
            None => {
                if let Some(stash) = ledger.stash {
                    if in_favorites && settled && stash.generation == inner.generation {
                        let at = stash.index.min(inner.state.items.len());
                        inner.state.items.insert(at, stash.bookmark);
                    }
                }
            }
        }
    }

    pub async fn move_to_trash(&self, id: &str) -> Result<(), SyncError> {
        self.trash_transition(id, TrashOp::Trash).await
    }

    pub async fn restore_from_trash(&self, id: &str) -> Result<(), SyncError> {
        self.trash_transition(id, TrashOp::Restore).await
    }

    /// Destroys a trashed row for good.
    pub async fn permanent_delete(&self, id: &str) -> Result<(), SyncError> {
        self.trash_transition(id, TrashOp::Purge).await
    }

    /// None of these operations can keep the row in its current view, so it
    /// is removed locally first. On failure the view is reloaded rather than
    /// reconstructed.
    async fn trash_transition(&self, id: &str, op: TrashOp) -> Result<(), SyncError> {
        let user_id = self.identity.require()?;

        {
            let mut inner = self.inner();
            inner.state.items.retain(|b| b.id != id);
        }

        let result = match op {
            TrashOp::Trash => {
                self.gateway
                    .update_bookmark(&user_id, id, BookmarkPatch::trash(Self::now()))
                    .await
            }
            TrashOp::Restore => {
                self.gateway
                    .update_bookmark(&user_id, id, BookmarkPatch::restore())
                    .await
            }
            TrashOp::Purge => self.gateway.delete_bookmark(&user_id, id).await,
        };

        match result {
            Ok(()) => {
                debug!(id, op = op.label(), "trash transition confirmed");
                self.refresh_counts().await;
                Ok(())
            }
            Err(e) => {
                warn!(id, op = op.label(), error = %e, "trash transition failed, reloading view");
                if let Err(reload) = self.refetch().await {
                    warn!(error = %reload, "reload after failed trash transition also failed");
                }
                Err(e.into())
            }
        }
    }

    /// Assigns the row to `collection_id` (or unassigns it), then reloads the
    /// active view whatever the outcome.
    pub async fn move_to_collection(
        &self,
        id: &str,
        collection_id: Option<&str>,
    ) -> Result<(), SyncError> {
        let user_id = self.identity.require()?;
        let result = self
            .gateway
            .update_bookmark(&user_id, id, BookmarkPatch::move_to(collection_id))
            .await;
        if let Err(e) = self.refetch().await {
            warn!(error = %e, "reload after collection move failed");
        }
        result.map_err(SyncError::from)
    }
}
