// SQLite storage behind the local gateway.
// Connection management and versioned schema migrations.

pub mod connection;
pub mod migrations;

pub use connection::Database;
