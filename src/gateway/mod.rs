//! Contracts for the remote store the synchronization core talks to.
//!
//! Persistence, authentication and row-level authorization live behind these
//! traits. [`local::LocalGateway`] is a SQLite-backed implementation used by
//! the demo binary and the tests.

use std::sync::Arc;

use async_trait::async_trait;

use crate::types::bookmark::{
    Bookmark, BookmarkPatch, Collection, CollectionPatch, NewBookmark, NewCollection,
};
use crate::types::errors::GatewayError;
use crate::types::feed::FeedEvent;
use crate::types::view::{BookmarkFilter, BookmarkQuery};

pub mod local;

/// Filtered reads, single-row mutations and counts over bookmark rows.
///
/// Every call is scoped to `user_id`; rows owned by other users are invisible.
#[async_trait]
pub trait RemoteBookmarkGateway: Send + Sync {
    /// Rows matching the query, ordered by `created_at` descending.
    async fn select_bookmarks(
        &self,
        user_id: &str,
        query: &BookmarkQuery,
    ) -> Result<Vec<Bookmark>, GatewayError>;

    async fn insert_bookmark(&self, new: NewBookmark) -> Result<Bookmark, GatewayError>;

    /// Fails with [`GatewayError::NotFound`] when no row matched.
    async fn update_bookmark(
        &self,
        user_id: &str,
        id: &str,
        patch: BookmarkPatch,
    ) -> Result<(), GatewayError>;

    /// Moves every row in collection `from` to `to`. Returns the number of rows changed.
    async fn reassign_collection(
        &self,
        user_id: &str,
        from: &str,
        to: Option<&str>,
    ) -> Result<u64, GatewayError>;

    /// Permanently removes a trashed row.
    async fn delete_bookmark(&self, user_id: &str, id: &str) -> Result<(), GatewayError>;

    async fn count_bookmarks(
        &self,
        user_id: &str,
        filter: &BookmarkFilter,
    ) -> Result<u64, GatewayError>;
}

/// CRUD over collection rows.
#[async_trait]
pub trait CollectionGateway: Send + Sync {
    /// All collections of the user, ordered by `position`.
    async fn select_collections(&self, user_id: &str) -> Result<Vec<Collection>, GatewayError>;

    async fn insert_collection(&self, new: NewCollection) -> Result<Collection, GatewayError>;

    async fn update_collection(
        &self,
        user_id: &str,
        id: &str,
        patch: CollectionPatch,
    ) -> Result<(), GatewayError>;

    async fn delete_collection(&self, user_id: &str, id: &str) -> Result<(), GatewayError>;
}

/// Receives status transitions and change batches from a subscription.
pub type FeedSink = Arc<dyn Fn(FeedEvent) + Send + Sync>;

/// An open change-feed subscription.
pub trait SubscriptionHandle: Send {
    /// Closes the subscription. Calling it again is a no-op.
    fn unsubscribe(&mut self);
}

/// Push notifications about a user's rows.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Opens a subscription scoped to `user_id`. The sink may be invoked
    /// before this returns.
    async fn subscribe(
        &self,
        user_id: &str,
        sink: FeedSink,
    ) -> Result<Box<dyn SubscriptionHandle>, GatewayError>;
}
