// Database module
// SQLite keeps connection and sync bookkeeping, LanceDB keeps the embedded records

pub mod lancedb;
pub mod sqlite;

pub use sqlite::*;
