//! Unit tests for the Linkshelf database layer (connection + migrations).

use linkshelf::database::migrations::{get_schema_version, CURRENT_SCHEMA_VERSION};
use linkshelf::database::Database;
use rusqlite::params;

fn insert_bookmark(
    db: &Database,
    id: &str,
    is_deleted: bool,
    deleted_at: Option<i64>,
    collection_id: Option<&str>,
) -> rusqlite::Result<usize> {
    db.connection().execute(
        "INSERT INTO bookmarks (id, user_id, collection_id, title, url, is_deleted, deleted_at, created_at, updated_at)
         VALUES (?1, 'u1', ?2, 'Title', 'https://example.com', ?3, ?4, 1, 1)",
        params![id, collection_id, is_deleted, deleted_at],
    )
}

#[test]
fn test_open_in_memory_succeeds() {
    let db = Database::open_in_memory();
    assert!(db.is_ok(), "open_in_memory should succeed");
}

#[test]
fn test_migrations_create_all_tables() {
    let db = Database::open_in_memory().expect("open_in_memory failed");
    let conn = db.connection();

    for table in &["collections", "bookmarks", "schema_version"] {
        let exists: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name=?1",
                [table],
                |row| row.get(0),
            )
            .unwrap_or(false);
        assert!(exists, "Table '{}' should exist after migrations", table);
    }
}

#[test]
fn test_migrations_create_indexes() {
    let db = Database::open_in_memory().expect("open_in_memory failed");
    let conn = db.connection();

    let expected_indexes = [
        "idx_bookmarks_user_deleted",
        "idx_bookmarks_collection",
        "idx_collections_user_position",
    ];

    for index in &expected_indexes {
        let exists: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='index' AND name=?1",
                [index],
                |row| row.get(0),
            )
            .unwrap_or(false);
        assert!(exists, "Index '{}' should exist after migrations", index);
    }
}

#[test]
fn test_schema_version_is_current() {
    let db = Database::open_in_memory().expect("open_in_memory failed");
    assert_eq!(get_schema_version(db.connection()), CURRENT_SCHEMA_VERSION);
    assert_eq!(db.schema_version(), CURRENT_SCHEMA_VERSION);
}

#[test]
fn test_foreign_keys_enforced_on_every_open() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("linkshelf.db");

    assert!(Database::open_in_memory().unwrap().foreign_keys_enabled().unwrap());
    assert!(Database::open(&path).unwrap().foreign_keys_enabled().unwrap());

    let reopened = Database::open(&path).expect("reopen");
    assert!(reopened.foreign_keys_enabled().unwrap());
    assert!(insert_bookmark(&reopened, "orphan", false, None, Some("missing")).is_err());
}

#[test]
fn test_reopen_file_database_is_idempotent() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("linkshelf.db");

    {
        let db = Database::open(&path).expect("first open");
        insert_bookmark(&db, "b1", false, None, None).expect("insert");
    }

    let db = Database::open(&path).expect("second open");
    let versions: i64 = db
        .connection()
        .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
        .unwrap();
    assert_eq!(versions, CURRENT_SCHEMA_VERSION as i64);
    let rows: i64 = db
        .connection()
        .query_row("SELECT COUNT(*) FROM bookmarks", [], |row| row.get(0))
        .unwrap();
    assert_eq!(rows, 1);
}

#[test]
fn test_trash_state_must_be_consistent() {
    let db = Database::open_in_memory().expect("open_in_memory failed");

    assert!(insert_bookmark(&db, "live", false, None, None).is_ok());
    assert!(insert_bookmark(&db, "trashed", true, Some(5), None).is_ok());
    assert!(insert_bookmark(&db, "deleted-no-time", true, None, None).is_err());
    assert!(insert_bookmark(&db, "live-with-time", false, Some(5), None).is_err());
}

#[test]
fn test_bookmark_collection_must_exist() {
    let db = Database::open_in_memory().expect("open_in_memory failed");

    assert!(insert_bookmark(&db, "orphan", false, None, Some("missing")).is_err());

    db.connection()
        .execute(
            "INSERT INTO collections (id, user_id, name, position, created_at) VALUES ('c1', 'u1', 'Reading', 0, 1)",
            [],
        )
        .unwrap();
    assert!(insert_bookmark(&db, "member", false, None, Some("c1")).is_ok());
}

#[test]
fn test_collection_names_unique_per_user() {
    let db = Database::open_in_memory().expect("open_in_memory failed");
    let conn = db.connection();
    let insert = "INSERT INTO collections (id, user_id, name, position, created_at) VALUES (?1, ?2, ?3, 0, 1)";

    assert!(conn.execute(insert, params!["c1", "u1", "Reading"]).is_ok());
    assert!(conn.execute(insert, params!["c2", "u1", "Reading"]).is_err());
    assert!(conn.execute(insert, params!["c3", "u2", "Reading"]).is_ok());
}

#[test]
fn test_collection_name_length_checked() {
    let db = Database::open_in_memory().expect("open_in_memory failed");
    let conn = db.connection();
    let insert = "INSERT INTO collections (id, user_id, name, position, created_at) VALUES (?1, 'u1', ?2, 0, 1)";

    assert!(conn.execute(insert, params!["c1", ""]).is_err());
    assert!(conn.execute(insert, params!["c2", "x".repeat(51)]).is_err());
    assert!(conn.execute(insert, params!["c3", "x".repeat(50)]).is_ok());
}
