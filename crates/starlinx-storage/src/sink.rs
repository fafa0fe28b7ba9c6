//! Database sink dispatch.
//!
//! `DatabaseSink` is built once from the resolved `StorageTarget`; every
//! operation matches on the variant instead of probing the engine.

use std::time::Duration;

use tracing::warn;

use starlinx_core::config::StorageConfig;
use starlinx_core::error::{Result, StarlinxError};
use starlinx_core::types::Registration;

use crate::postgres::PostgresSink;
use crate::schema::Dialect;
use crate::sqlite::SqliteSink;
use crate::target::{Driver, StorageTarget};

/// The secondary (best-effort) sink.
#[derive(Debug)]
pub enum DatabaseSink {
    Sqlite(SqliteSink),
    Postgres(PostgresSink),
    /// Unsupported scheme or unusable URL. Operations return `Config`.
    Unavailable { driver: Driver, reason: String },
}

impl DatabaseSink {
    /// Build the sink for a target. Never fails and never connects.
    pub fn open(target: &StorageTarget, config: &StorageConfig) -> Self {
        let timeout = Duration::from_secs(config.connect_timeout_secs);
        match target {
            StorageTarget::Sqlite { path } => DatabaseSink::Sqlite(SqliteSink::new(path, timeout)),
            StorageTarget::Postgres { url } => {
                match PostgresSink::new(url, timeout, config.pool_max_size) {
                    Ok(sink) => DatabaseSink::Postgres(sink),
                    Err(e) => {
                        warn!(error = %e, "postgres sink unavailable");
                        DatabaseSink::Unavailable {
                            driver: Driver::Postgres,
                            reason: e.to_string(),
                        }
                    }
                }
            }
            StorageTarget::Unsupported { raw } => DatabaseSink::Unavailable {
                driver: Driver::Unsupported,
                reason: format!(
                    "unsupported driver in connection string '{}'",
                    scheme_of(raw)
                ),
            },
        }
    }

    pub fn driver(&self) -> Driver {
        match self {
            DatabaseSink::Sqlite(_) => Driver::Sqlite,
            DatabaseSink::Postgres(_) => Driver::Postgres,
            DatabaseSink::Unavailable { driver, .. } => *driver,
        }
    }

    /// SQL dialect of the sink, or the reason no dialect applies.
    pub fn dialect(&self) -> Result<Dialect> {
        match self {
            DatabaseSink::Sqlite(_) => Ok(Dialect::Sqlite),
            DatabaseSink::Postgres(_) => Ok(Dialect::Postgres),
            DatabaseSink::Unavailable { reason, .. } => Err(StarlinxError::Config(reason.clone())),
        }
    }

    pub async fn execute_ddl(&self, sql: &str) -> Result<()> {
        match self {
            DatabaseSink::Sqlite(db) => db.execute_batch(sql),
            DatabaseSink::Postgres(db) => db.execute_ddl(sql).await,
            DatabaseSink::Unavailable { reason, .. } => Err(StarlinxError::Config(reason.clone())),
        }
    }

    pub async fn insert(&self, table: &str, registration: &Registration) -> Result<()> {
        match self {
            DatabaseSink::Sqlite(db) => db.insert(table, registration),
            DatabaseSink::Postgres(db) => db.insert(table, registration).await,
            DatabaseSink::Unavailable { reason, .. } => Err(StarlinxError::Config(reason.clone())),
        }
    }

    pub async fn table_exists(&self, table: &str) -> Result<bool> {
        match self {
            DatabaseSink::Sqlite(db) => db.table_exists(table),
            DatabaseSink::Postgres(db) => db.table_exists(table).await,
            DatabaseSink::Unavailable { reason, .. } => Err(StarlinxError::Config(reason.clone())),
        }
    }

    pub async fn count(&self, table: &str) -> Result<u64> {
        match self {
            DatabaseSink::Sqlite(db) => db.count(table),
            DatabaseSink::Postgres(db) => db.count(table).await,
            DatabaseSink::Unavailable { reason, .. } => Err(StarlinxError::Config(reason.clone())),
        }
    }
}

/// Scheme part of a connection string, without credentials.
fn scheme_of(raw: &str) -> &str {
    raw.split_once(':').map(|(scheme, _)| scheme).unwrap_or(raw)
}
