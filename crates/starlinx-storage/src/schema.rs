//! Registration table schema.
//!
//! One `CREATE TABLE IF NOT EXISTS` per dialect. The manager remembers the
//! outcome so a failure at startup is reported later instead of aborting.
//! The write path skips the DDL once `Ready`; explicit checks always run it.

use std::sync::Mutex;

use serde::Serialize;
use tracing::{info, warn};

use starlinx_core::error::Result;

use crate::sink::DatabaseSink;

/// SQL dialect, derived from the sink variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Postgres,
}

/// DDL for the registrations table in the given dialect.
pub fn create_table_sql(dialect: Dialect, table: &str) -> String {
    match dialect {
        Dialect::Sqlite => format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at      TEXT NOT NULL,
                name            TEXT NOT NULL,
                document        TEXT NOT NULL,
                phone           TEXT NOT NULL,
                email           TEXT,
                city            TEXT,
                vehicle_type    TEXT,
                client_ip       TEXT
            );"
        ),
        Dialect::Postgres => format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id              SERIAL PRIMARY KEY,
                created_at      TIMESTAMP NOT NULL DEFAULT NOW(),
                name            TEXT NOT NULL,
                document        TEXT NOT NULL,
                phone           TEXT NOT NULL,
                email           TEXT,
                city            TEXT,
                vehicle_type    TEXT,
                client_ip       TEXT
            );"
        ),
    }
}

/// Last known state of the registrations table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SchemaStatus {
    /// Not attempted yet.
    Pending,
    Ready,
    /// Last attempt failed; retried on the next write or explicit check.
    Failed { reason: String },
}

/// Idempotent, concurrency-safe schema creation.
pub struct SchemaManager {
    table: String,
    status: Mutex<SchemaStatus>,
    /// Serializes concurrent ensures within the process.
    gate: tokio::sync::Mutex<()>,
}

impl SchemaManager {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            status: Mutex::new(SchemaStatus::Pending),
            gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn status(&self) -> SchemaStatus {
        self.status
            .lock()
            .map(|s| s.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }

    fn set_status(&self, status: SchemaStatus) {
        match self.status.lock() {
            Ok(mut guard) => *guard = status,
            Err(e) => *e.into_inner() = status,
        }
    }

    /// Forget a previous success, e.g. after the table was found missing.
    pub fn invalidate(&self) {
        self.set_status(SchemaStatus::Pending);
    }

    /// Create the table if needed. Returns immediately once `Ready`.
    pub async fn ensure(&self, sink: &DatabaseSink) -> Result<()> {
        if self.status() == SchemaStatus::Ready {
            return Ok(());
        }

        let _gate = self.gate.lock().await;
        // Another caller may have finished while we waited.
        if self.status() == SchemaStatus::Ready {
            return Ok(());
        }
        self.run_ddl(sink).await
    }

    /// Run the DDL regardless of the remembered status.
    pub async fn recheck(&self, sink: &DatabaseSink) -> Result<()> {
        let _gate = self.gate.lock().await;
        self.run_ddl(sink).await
    }

    /// Caller must hold `gate`.
    async fn run_ddl(&self, sink: &DatabaseSink) -> Result<()> {
        let result = match sink.dialect() {
            Ok(dialect) => {
                sink.execute_ddl(&create_table_sql(dialect, &self.table))
                    .await
            }
            Err(e) => Err(e),
        };

        match &result {
            Ok(()) => {
                info!(table = %self.table, driver = %sink.driver(), "Schema ready");
                self.set_status(SchemaStatus::Ready);
            }
            Err(e) => {
                warn!(table = %self.table, driver = %sink.driver(), error = %e, "Schema ensure failed");
                self.set_status(SchemaStatus::Failed {
                    reason: e.to_string(),
                });
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use starlinx_core::config::StorageConfig;
    use starlinx_core::error::StarlinxError;

    use crate::target::{resolve_storage_target, StorageTarget};

    fn sqlite_sink(dir: &tempfile::TempDir) -> DatabaseSink {
        let target = StorageTarget::Sqlite {
            path: dir.path().join("app.db"),
        };
        DatabaseSink::open(&target, &StorageConfig::default())
    }

    #[test]
    fn test_dialects_use_their_own_identity_syntax() {
        let sqlite = create_table_sql(Dialect::Sqlite, "registrations");
        let postgres = create_table_sql(Dialect::Postgres, "registrations");

        assert!(sqlite.contains("AUTOINCREMENT"));
        assert!(!sqlite.contains("SERIAL"));
        assert!(postgres.contains("SERIAL PRIMARY KEY"));
        assert!(!postgres.contains("AUTOINCREMENT"));
        assert!(postgres.contains("TIMESTAMP"));
    }

    #[tokio::test]
    async fn test_ensure_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let sink = sqlite_sink(&dir);
        let manager = SchemaManager::new("registrations");
        assert_eq!(manager.status(), SchemaStatus::Pending);

        manager.ensure(&sink).await.unwrap();
        manager.ensure(&sink).await.unwrap();

        assert_eq!(manager.status(), SchemaStatus::Ready);
        assert!(sink.table_exists("registrations").await.unwrap());
    }

    #[tokio::test]
    async fn test_existing_table_is_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let sink = sqlite_sink(&dir);

        // Two independent managers, as in two processes sharing one file.
        SchemaManager::new("registrations").ensure(&sink).await.unwrap();
        SchemaManager::new("registrations").ensure(&sink).await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_ensure() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(sqlite_sink(&dir));
        let manager = Arc::new(SchemaManager::new("registrations"));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let sink = Arc::clone(&sink);
            let manager = Arc::clone(&manager);
            handles.push(tokio::spawn(async move { manager.ensure(&sink).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(manager.status(), SchemaStatus::Ready);
    }

    #[tokio::test]
    async fn test_failure_is_recorded_and_retried() {
        let manager = SchemaManager::new("registrations");
        let sink = DatabaseSink::open(
            &resolve_storage_target("oracle://legacy"),
            &StorageConfig::default(),
        );

        let err = manager.ensure(&sink).await.unwrap_err();
        assert!(matches!(err, StarlinxError::Config(_)));
        assert!(matches!(manager.status(), SchemaStatus::Failed { .. }));

        // A later call against a working sink recovers.
        let dir = tempfile::tempdir().unwrap();
        manager.ensure(&sqlite_sink(&dir)).await.unwrap();
        assert_eq!(manager.status(), SchemaStatus::Ready);
    }

    #[tokio::test]
    async fn test_recheck_recreates_dropped_table() {
        let dir = tempfile::tempdir().unwrap();
        let sink = sqlite_sink(&dir);
        let manager = SchemaManager::new("registrations");
        manager.ensure(&sink).await.unwrap();

        sink.execute_ddl("DROP TABLE registrations").await.unwrap();
        // The remembered status still short-circuits the lazy path.
        manager.ensure(&sink).await.unwrap();
        assert!(!sink.table_exists("registrations").await.unwrap());

        manager.recheck(&sink).await.unwrap();
        assert!(sink.table_exists("registrations").await.unwrap());
        assert_eq!(manager.status(), SchemaStatus::Ready);
    }

    #[tokio::test]
    async fn test_invalidate_reopens_lazy_path() {
        let dir = tempfile::tempdir().unwrap();
        let sink = sqlite_sink(&dir);
        let manager = SchemaManager::new("registrations");
        manager.ensure(&sink).await.unwrap();
        sink.execute_ddl("DROP TABLE registrations").await.unwrap();

        manager.invalidate();
        assert_eq!(manager.status(), SchemaStatus::Pending);
        manager.ensure(&sink).await.unwrap();
        assert!(sink.table_exists("registrations").await.unwrap());
    }
}
