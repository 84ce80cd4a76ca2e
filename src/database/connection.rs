//! The single SQLite handle behind [`LocalGateway`](crate::gateway::local::LocalGateway).
//!
//! Bookmarks reference collections through a foreign key, and the
//! `ON DELETE` behaviour of that key is only enforced when SQLite's
//! `foreign_keys` pragma is on. The pragma is per connection, so it is
//! applied here every time a handle is opened, before migrations run.

use std::path::Path;

use rusqlite::Connection;
use tracing::debug;

use super::migrations;

/// A bookmark store handle with foreign keys enforced and the schema at
/// [`migrations::CURRENT_SCHEMA_VERSION`].
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Opens (or creates) the bookmark store at `path`.
    ///
    /// # Errors
    /// Returns `rusqlite::Error` if the file cannot be opened or the schema
    /// cannot be brought up to date.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, rusqlite::Error> {
        let path = path.as_ref();
        debug!(path = %path.display(), "opening bookmark store");
        Self::prepare(Connection::open(path)?)
    }

    /// Opens a throwaway store that lives as long as the returned value.
    pub fn open_in_memory() -> Result<Self, rusqlite::Error> {
        Self::prepare(Connection::open_in_memory()?)
    }

    fn prepare(conn: Connection) -> Result<Self, rusqlite::Error> {
        conn.pragma_update(None, "foreign_keys", true)?;
        migrations::run_all(&conn)?;
        let db = Self { conn };
        debug!(schema_version = db.schema_version(), "bookmark store ready");
        Ok(db)
    }

    /// Whether SQLite is enforcing foreign keys on this handle.
    pub fn foreign_keys_enabled(&self) -> Result<bool, rusqlite::Error> {
        self.conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get::<_, i64>(0))
            .map(|on| on == 1)
    }

    pub fn schema_version(&self) -> i32 {
        migrations::get_schema_version(&self.conn)
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}
