//! App Core.
//!
//! Wires the identity, the view projection, bucket counts, collections and
//! the change-feed supervisor for one signed-in user. Reconciliation
//! requests from the supervisor are queued on a channel and drained by a
//! driver task, which coalesces bursts into a single pass.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::gateway::{ChangeFeed, CollectionGateway, RemoteBookmarkGateway};
use crate::managers::collection_directory::CollectionDirectory;
use crate::managers::count_aggregator::CountAggregator;
use crate::managers::identity::Identity;
use crate::managers::projection::BookmarkProjection;
use crate::services::change_feed_supervisor::{ChangeFeedSupervisor, ReconcileCallback};
use crate::types::errors::SyncError;
use crate::types::feed::ReconcileTrigger;
use crate::types::settings::SyncSettings;
use crate::types::view::{Bucket, ViewSpec};

/// The pieces a reconciliation pass refreshes.
#[derive(Clone)]
struct Reconciler {
    projection: Arc<BookmarkProjection>,
    counts: Arc<CountAggregator>,
    collections: Arc<CollectionDirectory>,
}

impl Reconciler {
    /// Refreshes all three concurrently. Every part runs even if another
    /// fails; the first failure is returned.
    async fn run(&self) -> Result<(), SyncError> {
        let (loaded, counted, listed) = tokio::join!(
            self.projection.refetch(),
            self.counts.refresh(),
            self.collections.refresh(),
        );
        if let Err(e) = &loaded {
            warn!(error = %e, "reconcile: projection reload failed");
        }
        if let Err(e) = &counted {
            warn!(error = %e, "reconcile: count refresh failed");
        }
        if let Err(e) = &listed {
            warn!(error = %e, "reconcile: collection refresh failed");
        }
        loaded?;
        counted?;
        listed?;
        Ok(())
    }
}

async fn drive(mut rx: mpsc::UnboundedReceiver<ReconcileTrigger>, reconciler: Reconciler) {
    while let Some(trigger) = rx.recv().await {
        let mut coalesced = 1;
        while rx.try_recv().is_ok() {
            coalesced += 1;
        }
        debug!(?trigger, coalesced, "reconciling");
        // Failures are logged by the reconciler; the next trigger retries.
        let _ = reconciler.run().await;
    }
}

/// Central struct holding the synchronization core for one session.
pub struct SyncApp {
    pub identity: Identity,
    pub projection: Arc<BookmarkProjection>,
    pub counts: Arc<CountAggregator>,
    pub collections: Arc<CollectionDirectory>,
    supervisor: ChangeFeedSupervisor,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl SyncApp {
    /// Builds the core over a gateway that serves bookmarks, collections and the change feed.
    pub fn new<G>(gateway: Arc<G>, settings: &SyncSettings) -> Self
    where
        G: RemoteBookmarkGateway + CollectionGateway + ChangeFeed + 'static,
    {
        Self::with_parts(gateway.clone(), gateway.clone(), gateway, settings)
    }

    pub fn with_parts(
        bookmarks: Arc<dyn RemoteBookmarkGateway>,
        collections: Arc<dyn CollectionGateway>,
        feed: Arc<dyn ChangeFeed>,
        settings: &SyncSettings,
    ) -> Self {
        let identity = Identity::new();
        let counts = Arc::new(CountAggregator::new(bookmarks.clone(), identity.clone()));
        let projection = Arc::new(
            BookmarkProjection::new(bookmarks.clone(), identity.clone()).with_counts(counts.clone()),
        );
        let collections = Arc::new(CollectionDirectory::new(
            collections,
            bookmarks,
            identity.clone(),
        ));
        Self {
            identity,
            projection,
            counts,
            collections,
            supervisor: ChangeFeedSupervisor::from_settings(feed, settings),
            driver: Mutex::new(None),
        }
    }

    fn driver(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.driver.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reconciler(&self) -> Reconciler {
        Reconciler {
            projection: self.projection.clone(),
            counts: self.counts.clone(),
            collections: self.collections.clone(),
        }
    }

    pub fn supervisor(&self) -> &ChangeFeedSupervisor {
        &self.supervisor
    }

    /// Starts a session for `user_id`: opens the change feed and performs the
    /// initial load of the active view, counts and collections.
    ///
    /// A change feed that cannot be opened is not fatal; the supervisor
    /// degrades to polling. Switching to a different user drops everything
    /// held for the previous one before the first load.
    pub async fn sign_in(&self, user_id: &str) -> Result<(), SyncError> {
        self.stop_driver();
        if self.identity.current().as_deref() != Some(user_id) {
            self.projection.reset();
            self.counts.reset();
            self.collections.clear();
        }
        self.identity.sign_in(user_id);

        let (tx, rx) = mpsc::unbounded_channel();
        *self.driver() = Some(tokio::spawn(drive(rx, self.reconciler())));

        let callback: ReconcileCallback = Arc::new(move |trigger| {
            let _ = tx.send(trigger);
        });
        if let Err(e) = self.supervisor.activate(user_id, callback).await {
            warn!(user_id, error = %e, "change feed unavailable, running on polling");
        }

        info!(user_id, "session started");
        self.reconcile().await
    }

    /// Ends the session: closes the feed, stops the driver and clears local state.
    pub fn sign_out(&self) {
        self.supervisor.deactivate();
        self.stop_driver();
        self.identity.sign_out();
        self.projection.reset();
        self.counts.reset();
        self.collections.clear();
        info!("session ended");
    }

    fn stop_driver(&self) {
        if let Some(driver) = self.driver().take() {
            driver.abort();
        }
    }

    /// One full reconciliation pass.
    pub async fn reconcile(&self) -> Result<(), SyncError> {
        self.reconciler().run().await
    }

    /// Forwards tab visibility to the supervisor.
    pub fn set_visibility(&self, visible: bool) {
        self.supervisor.set_visibility(visible);
    }

    /// Deletes a collection, leaving the view if it was showing that collection.
    pub async fn delete_collection(&self, id: &str) -> Result<u64, SyncError> {
        let moved = self.collections.delete(id).await?;
        let view = self.projection.view();
        let result = if view.bucket == Bucket::Collection(id.to_string()) {
            self.projection.load(ViewSpec::bucket(Bucket::All)).await
        } else {
            self.projection.refetch().await
        };
        if let Err(e) = result {
            warn!(error = %e, "reload after collection delete failed");
        }
        Ok(moved)
    }
}

impl Drop for SyncApp {
    fn drop(&mut self) {
        self.supervisor.deactivate();
        self.stop_driver();
    }
}
