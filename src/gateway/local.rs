//! SQLite-backed gateway with an in-process change feed.
//!
//! Implements [`RemoteBookmarkGateway`], [`CollectionGateway`] and
//! [`ChangeFeed`] on top of [`Database`]. Every statement is scoped to the
//! calling user, and every successful write is broadcast to that user's
//! subscribers after the connection lock has been released.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use rusqlite::{params, params_from_iter, types::Value, Connection};
use tracing::debug;
use uuid::Uuid;

use super::{ChangeFeed, CollectionGateway, FeedSink, RemoteBookmarkGateway, SubscriptionHandle};
use crate::database::Database;
use crate::types::bookmark::{
    Bookmark, BookmarkPatch, Collection, CollectionPatch, NewBookmark, NewCollection,
};
use crate::types::errors::GatewayError;
use crate::types::feed::{ChangeEvent, ChangeKind, ChangeTable, ChannelStatus, FeedEvent};
use crate::types::view::{BookmarkFilter, BookmarkQuery};

const BOOKMARK_COLUMNS: &str = "id, user_id, collection_id, title, url, is_favorite, \
     is_deleted, deleted_at, created_at, updated_at";

struct Subscriber {
    id: u64,
    user_id: String,
    sink: FeedSink,
}

type Registry = Arc<Mutex<Vec<Subscriber>>>;

fn lock_registry(registry: &Mutex<Vec<Subscriber>>) -> MutexGuard<'_, Vec<Subscriber>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Local stand-in for the managed remote store.
pub struct LocalGateway {
    db: Mutex<Database>,
    last_timestamp: Mutex<i64>,
    subscribers: Registry,
    next_subscriber_id: AtomicU64,
}

impl LocalGateway {
    pub fn new(db: Database) -> Self {
        Self {
            db: Mutex::new(db),
            last_timestamp: Mutex::new(0),
            subscribers: Arc::new(Mutex::new(Vec::new())),
            next_subscriber_id: AtomicU64::new(1),
        }
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GatewayError> {
        Ok(Self::new(Database::open(path)?))
    }

    pub fn open_in_memory() -> Result<Self, GatewayError> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    /// Current time in Unix milliseconds, strictly increasing per gateway so
    /// `created_at` ordering is total.
    pub fn now(&self) -> i64 {
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64;
        let mut last = self
            .last_timestamp
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *last = wall.max(*last + 1);
        *last
    }

    fn conn(&self) -> Result<MutexGuard<'_, Database>, GatewayError> {
        self.db
            .lock()
            .map_err(|e| GatewayError::Store(format!("database lock poisoned: {}", e)))
    }

    /// Number of open subscriptions for `user_id`.
    pub fn subscriber_count(&self, user_id: &str) -> usize {
        lock_registry(&self.subscribers)
            .iter()
            .filter(|s| s.user_id == user_id)
            .count()
    }

    /// Pushes a status transition to every subscriber of `user_id`, as the
    /// remote store does when the channel errors or closes.
    pub fn interrupt_feed(&self, user_id: &str, status: ChannelStatus) {
        self.emit(user_id, FeedEvent::Status(status));
    }

    fn emit(&self, user_id: &str, event: FeedEvent) {
        let sinks: Vec<FeedSink> = lock_registry(&self.subscribers)
            .iter()
            .filter(|s| s.user_id == user_id)
            .map(|s| s.sink.clone())
            .collect();
        for sink in sinks {
            sink(event.clone());
        }
    }

    fn emit_change(&self, user_id: &str, table: ChangeTable, kind: ChangeKind, row_id: &str) {
        self.emit(
            user_id,
            FeedEvent::Changes(vec![ChangeEvent {
                table,
                kind,
                row_id: row_id.to_string(),
            }]),
        );
    }

    fn row_to_bookmark(row: &rusqlite::Row) -> rusqlite::Result<Bookmark> {
        Ok(Bookmark {
            id: row.get(0)?,
            user_id: row.get(1)?,
            collection_id: row.get(2)?,
            title: row.get(3)?,
            url: row.get(4)?,
            is_favorite: row.get(5)?,
            is_deleted: row.get(6)?,
            deleted_at: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    fn row_to_collection(row: &rusqlite::Row) -> rusqlite::Result<Collection> {
        Ok(Collection {
            id: row.get(0)?,
            user_id: row.get(1)?,
            name: row.get(2)?,
            position: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    /// Builds the `WHERE` clause and parameters for a filter.
    fn where_clause(user_id: &str, filter: &BookmarkFilter) -> (String, Vec<Value>) {
        let mut clause = String::from("user_id = ? AND is_deleted = ?");
        let mut values = vec![
            Value::Text(user_id.to_string()),
            Value::Integer(filter.is_deleted as i64),
        ];
        if let Some(fav) = filter.is_favorite {
            clause.push_str(" AND is_favorite = ?");
            values.push(Value::Integer(fav as i64));
        }
        if let Some(cid) = &filter.collection_id {
            clause.push_str(" AND collection_id = ?");
            values.push(Value::Text(cid.clone()));
        }
        (clause, values)
    }

    fn collection_owned(conn: &Connection, user_id: &str, id: &str) -> Result<bool, GatewayError> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM collections WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn is_unique_violation(e: &rusqlite::Error) -> bool {
        matches!(
            e,
            rusqlite::Error::SqliteFailure(err, _)
                if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
        )
    }
}

#[async_trait]
impl RemoteBookmarkGateway for LocalGateway {
    async fn select_bookmarks(
        &self,
        user_id: &str,
        query: &BookmarkQuery,
    ) -> Result<Vec<Bookmark>, GatewayError> {
        let (clause, mut values) = Self::where_clause(user_id, &query.filter);
        let mut sql = format!(
            "SELECT {} FROM bookmarks WHERE {} ORDER BY created_at DESC, id DESC",
            BOOKMARK_COLUMNS, clause
        );
        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            values.push(Value::Integer(limit as i64));
        }

        let db = self.conn()?;
        let mut stmt = db.connection().prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values), Self::row_to_bookmark)?;
        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    async fn insert_bookmark(&self, new: NewBookmark) -> Result<Bookmark, GatewayError> {
        let now = self.now();
        let bookmark = Bookmark {
            id: Uuid::new_v4().to_string(),
            user_id: new.user_id,
            collection_id: new.collection_id,
            title: new.title,
            url: new.url,
            is_favorite: false,
            is_deleted: false,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };
        {
            let db = self.conn()?;
            let conn = db.connection();
            if let Some(cid) = &bookmark.collection_id {
                if !Self::collection_owned(conn, &bookmark.user_id, cid)? {
                    return Err(GatewayError::NotFound(format!("collection {}", cid)));
                }
            }
            conn.execute(
                "INSERT INTO bookmarks (id, user_id, collection_id, title, url, is_favorite, is_deleted, deleted_at, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, 0, NULL, ?6, ?7)",
                params![
                    bookmark.id,
                    bookmark.user_id,
                    bookmark.collection_id,
                    bookmark.title,
                    bookmark.url,
                    bookmark.created_at,
                    bookmark.updated_at
                ],
            )?;
        }
        self.emit_change(&bookmark.user_id, ChangeTable::Bookmarks, ChangeKind::Insert, &bookmark.id);
        Ok(bookmark)
    }

    async fn update_bookmark(
        &self,
        user_id: &str,
        id: &str,
        patch: BookmarkPatch,
    ) -> Result<(), GatewayError> {
        if patch.is_empty() {
            return Ok(());
        }
        let now = self.now();
        let mut sets = vec!["updated_at = ?".to_string()];
        let mut values = vec![Value::Integer(now)];
        if let Some(fav) = patch.is_favorite {
            sets.push("is_favorite = ?".into());
            values.push(Value::Integer(fav as i64));
        }
        if let Some(deleted) = patch.is_deleted {
            sets.push("is_deleted = ?".into());
            values.push(Value::Integer(deleted as i64));
        }
        if let Some(deleted_at) = patch.deleted_at {
            sets.push("deleted_at = ?".into());
            values.push(deleted_at.map_or(Value::Null, Value::Integer));
        }
        if let Some(collection_id) = &patch.collection_id {
            sets.push("collection_id = ?".into());
            values.push(collection_id.clone().map_or(Value::Null, Value::Text));
        }
        values.push(Value::Text(id.to_string()));
        values.push(Value::Text(user_id.to_string()));

        let affected = {
            let db = self.conn()?;
            let conn = db.connection();
            if let Some(Some(cid)) = &patch.collection_id {
                if !Self::collection_owned(conn, user_id, cid)? {
                    return Err(GatewayError::NotFound(format!("collection {}", cid)));
                }
            }
            let sql = format!(
                "UPDATE bookmarks SET {} WHERE id = ? AND user_id = ?",
                sets.join(", ")
            );
            conn.execute(&sql, params_from_iter(values))?
        };

        if affected == 0 {
            return Err(GatewayError::NotFound(id.to_string()));
        }
        self.emit_change(user_id, ChangeTable::Bookmarks, ChangeKind::Update, id);
        Ok(())
    }

    async fn reassign_collection(
        &self,
        user_id: &str,
        from: &str,
        to: Option<&str>,
    ) -> Result<u64, GatewayError> {
        let now = self.now();
        let affected = {
            let db = self.conn()?;
            let conn = db.connection();
            if let Some(target) = to {
                if !Self::collection_owned(conn, user_id, target)? {
                    return Err(GatewayError::NotFound(format!("collection {}", target)));
                }
            }
            conn.execute(
                "UPDATE bookmarks SET collection_id = ?1, updated_at = ?2 WHERE collection_id = ?3 AND user_id = ?4",
                params![to, now, from, user_id],
            )?
        };
        debug!(collection = from, moved = affected, "reassigned collection members");
        if affected > 0 {
            self.emit_change(user_id, ChangeTable::Bookmarks, ChangeKind::Update, from);
        }
        Ok(affected as u64)
    }

    async fn delete_bookmark(&self, user_id: &str, id: &str) -> Result<(), GatewayError> {
        let affected = {
            let db = self.conn()?;
            db.connection().execute(
                "DELETE FROM bookmarks WHERE id = ?1 AND user_id = ?2 AND is_deleted = 1",
                params![id, user_id],
            )?
        };
        if affected == 0 {
            return Err(GatewayError::NotFound(id.to_string()));
        }
        self.emit_change(user_id, ChangeTable::Bookmarks, ChangeKind::Delete, id);
        Ok(())
    }

    async fn count_bookmarks(
        &self,
        user_id: &str,
        filter: &BookmarkFilter,
    ) -> Result<u64, GatewayError> {
        let (clause, values) = Self::where_clause(user_id, filter);
        let sql = format!("SELECT COUNT(*) FROM bookmarks WHERE {}", clause);
        let db = self.conn()?;
        let count: i64 = db
            .connection()
            .query_row(&sql, params_from_iter(values), |row| row.get(0))?;
        Ok(count as u64)
    }
}

#[async_trait]
impl CollectionGateway for LocalGateway {
    async fn select_collections(&self, user_id: &str) -> Result<Vec<Collection>, GatewayError> {
        let db = self.conn()?;
        let mut stmt = db.connection().prepare(
            "SELECT id, user_id, name, position, created_at FROM collections \
             WHERE user_id = ?1 ORDER BY position, created_at",
        )?;
        let rows = stmt.query_map(params![user_id], Self::row_to_collection)?;
        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    async fn insert_collection(&self, new: NewCollection) -> Result<Collection, GatewayError> {
        let collection = Collection {
            id: Uuid::new_v4().to_string(),
            user_id: new.user_id,
            name: new.name,
            position: new.position,
            created_at: self.now(),
        };
        {
            let db = self.conn()?;
            db.connection()
                .execute(
                    "INSERT INTO collections (id, user_id, name, position, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        collection.id,
                        collection.user_id,
                        collection.name,
                        collection.position,
                        collection.created_at
                    ],
                )
                .map_err(|e| {
                    if Self::is_unique_violation(&e) {
                        GatewayError::Conflict(collection.name.clone())
                    } else {
                        GatewayError::from(e)
                    }
                })?;
        }
        self.emit_change(&collection.user_id, ChangeTable::Collections, ChangeKind::Insert, &collection.id);
        Ok(collection)
    }

    async fn update_collection(
        &self,
        user_id: &str,
        id: &str,
        patch: CollectionPatch,
    ) -> Result<(), GatewayError> {
        let mut sets = Vec::new();
        let mut values = Vec::new();
        if let Some(name) = &patch.name {
            sets.push("name = ?");
            values.push(Value::Text(name.clone()));
        }
        if let Some(position) = patch.position {
            sets.push("position = ?");
            values.push(Value::Integer(position as i64));
        }
        if sets.is_empty() {
            return Ok(());
        }
        values.push(Value::Text(id.to_string()));
        values.push(Value::Text(user_id.to_string()));

        let affected = {
            let db = self.conn()?;
            let sql = format!(
                "UPDATE collections SET {} WHERE id = ? AND user_id = ?",
                sets.join(", ")
            );
            db.connection()
                .execute(&sql, params_from_iter(values))
                .map_err(|e| {
                    if Self::is_unique_violation(&e) {
                        GatewayError::Conflict(patch.name.clone().unwrap_or_default())
                    } else {
                        GatewayError::from(e)
                    }
                })?
        };
        if affected == 0 {
            return Err(GatewayError::NotFound(id.to_string()));
        }
        self.emit_change(user_id, ChangeTable::Collections, ChangeKind::Update, id);
        Ok(())
    }

    /// Fails on the foreign key while any bookmark still references the collection.
    async fn delete_collection(&self, user_id: &str, id: &str) -> Result<(), GatewayError> {
        let affected = {
            let db = self.conn()?;
            db.connection().execute(
                "DELETE FROM collections WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
            )?
        };
        if affected == 0 {
            return Err(GatewayError::NotFound(id.to_string()));
        }
        self.emit_change(user_id, ChangeTable::Collections, ChangeKind::Delete, id);
        Ok(())
    }
}

/// Handle returned by [`LocalGateway::subscribe`].
pub struct LocalSubscription {
    id: u64,
    registry: Weak<Mutex<Vec<Subscriber>>>,
    open: bool,
}

impl SubscriptionHandle for LocalSubscription {
    fn unsubscribe(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        if let Some(registry) = self.registry.upgrade() {
            lock_registry(&registry).retain(|s| s.id != self.id);
        }
    }
}

impl Drop for LocalSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[async_trait]
impl ChangeFeed for LocalGateway {
    async fn subscribe(
        &self,
        user_id: &str,
        sink: FeedSink,
    ) -> Result<Box<dyn SubscriptionHandle>, GatewayError> {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        lock_registry(&self.subscribers).push(Subscriber {
            id,
            user_id: user_id.to_string(),
            sink: sink.clone(),
        });
        debug!(user_id, subscription = id, "change feed subscribed");
        sink(FeedEvent::Status(ChannelStatus::Subscribed));
        Ok(Box::new(LocalSubscription {
            id,
            registry: Arc::downgrade(&self.subscribers),
            open: true,
        }))
    }
}
