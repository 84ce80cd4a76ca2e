//! Collection Directory.
//!
//! CRUD over a user's named collections plus per-collection counts. The
//! cached list is ordered by `position`; new collections append after the
//! current maximum.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::gateway::{CollectionGateway, RemoteBookmarkGateway};
use crate::managers::identity::Identity;
use crate::services::validation;
use crate::types::bookmark::{Collection, CollectionPatch, NewCollection};
use crate::types::errors::SyncError;
use crate::types::view::Bucket;

pub struct CollectionDirectory {
    collections: Arc<dyn CollectionGateway>,
    bookmarks: Arc<dyn RemoteBookmarkGateway>,
    identity: Identity,
    cached: Mutex<Vec<Collection>>,
}

impl CollectionDirectory {
    pub fn new(
        collections: Arc<dyn CollectionGateway>,
        bookmarks: Arc<dyn RemoteBookmarkGateway>,
        identity: Identity,
    ) -> Self {
        Self {
            collections,
            bookmarks,
            identity,
            cached: Mutex::new(Vec::new()),
        }
    }

    fn cached(&self) -> MutexGuard<'_, Vec<Collection>> {
        self.cached.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Collections from the last refresh, ordered by position.
    pub fn list(&self) -> Vec<Collection> {
        self.cached().clone()
    }

    pub fn get(&self, id: &str) -> Option<Collection> {
        self.cached().iter().find(|c| c.id == id).cloned()
    }

    /// Re-reads the user's collections.
    pub async fn refresh(&self) -> Result<Vec<Collection>, SyncError> {
        let user_id = self.identity.require()?;
        let mut fresh = self.collections.select_collections(&user_id).await?;
        fresh.sort_by_key(|c| c.position);
        *self.cached() = fresh.clone();
        Ok(fresh)
    }

    pub fn clear(&self) {
        self.cached().clear();
    }

    /// Creates a collection at the end of the user's ordering.
    ///
    /// Fails with [`SyncError::DuplicateName`] if the user already has a
    /// collection with this name.
    pub async fn create(&self, name: &str) -> Result<Collection, SyncError> {
        let name = validation::validate_collection_name(name)?;
        let user_id = self.identity.require()?;

        let existing = self.refresh().await?;
        if existing.iter().any(|c| c.name == name) {
            return Err(SyncError::DuplicateName(name));
        }
        let position = existing.iter().map(|c| c.position).max().map_or(0, |p| p + 1);

        let created = self
            .collections
            .insert_collection(NewCollection {
                user_id,
                name,
                position,
            })
            .await?;
        info!(id = %created.id, name = %created.name, position, "collection created");
        self.refresh().await?;
        Ok(created)
    }

    pub async fn rename(&self, id: &str, name: &str) -> Result<(), SyncError> {
        let name = validation::validate_collection_name(name)?;
        let user_id = self.identity.require()?;

        let existing = self.refresh().await?;
        if !existing.iter().any(|c| c.id == id) {
            return Err(SyncError::NotFound(id.to_string()));
        }
        if existing.iter().any(|c| c.id != id && c.name == name) {
            return Err(SyncError::DuplicateName(name));
        }

        self.collections
            .update_collection(
                &user_id,
                id,
                CollectionPatch {
                    name: Some(name),
                    position: None,
                },
            )
            .await?;
        self.refresh().await?;
        Ok(())
    }

    /// Deletes a collection without deleting its bookmarks.
    ///
    /// Members are moved to "unassigned" first and the collection row is
    /// removed only after that succeeded. Returns the number of bookmarks moved.
    pub async fn delete(&self, id: &str) -> Result<u64, SyncError> {
        let user_id = self.identity.require()?;

        let moved = self.bookmarks.reassign_collection(&user_id, id, None).await?;
        debug!(collection = id, moved, "collection members unassigned");

        self.collections.delete_collection(&user_id, id).await?;
        info!(collection = id, moved, "collection deleted");

        self.cached().retain(|c| c.id != id);
        Ok(moved)
    }

    /// Number of non-deleted bookmarks in the collection.
    pub async fn count_for(&self, collection_id: &str) -> Result<u64, SyncError> {
        let user_id = self.identity.require()?;
        let filter = Bucket::Collection(collection_id.to_string()).filter();
        Ok(self.bookmarks.count_bookmarks(&user_id, &filter).await?)
    }

    /// Counts for every cached collection, keyed by collection id.
    pub async fn counts(&self) -> Result<HashMap<String, u64>, SyncError> {
        let ids: Vec<String> = self.list().into_iter().map(|c| c.id).collect();
        let mut counts = HashMap::with_capacity(ids.len());
        for id in ids {
            let count = self.count_for(&id).await?;
            counts.insert(id, count);
        }
        Ok(counts)
    }
}
