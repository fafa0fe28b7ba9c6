//! Starlinx storage crate - storage target resolution, schema management,
//! dual-sink writes and read/export access.
//!
//! Every registration is appended to a CSV file (primary) and then inserted,
//! best effort, into SQLite or PostgreSQL depending on the connection string.

pub mod export;
pub mod file_sink;
pub mod postgres;
pub mod schema;
pub mod sink;
pub mod sqlite;
pub mod store;
pub mod target;

pub use export::{Export, ExportFormat};
pub use file_sink::{CsvDump, FileSink};
pub use schema::{Dialect, SchemaManager, SchemaStatus};
pub use sink::DatabaseSink;
pub use store::{DatabaseWrite, RecordOutcome, RegistrationStore, RowCount};
pub use target::{resolve_storage_target, Driver, StorageTarget, DEFAULT_SQLITE_PATH};
