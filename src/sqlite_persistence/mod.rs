mod versioned_schema;

pub use versioned_schema::{open_versioned, Column, SqlType, Table, VersionedSchema};

/// Offset applied to `PRAGMA user_version` so a foreign SQLite file is never
/// mistaken for one of ours.
pub const BASE_DB_VERSION: usize = 31_000;
