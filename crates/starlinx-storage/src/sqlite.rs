//! Embedded SQLite sink.
//!
//! Wraps a single rusqlite Connection in a Mutex for thread-safe access. The
//! connection is opened lazily on first use so a bad path or unwritable
//! directory never prevents startup; the error is returned from whichever
//! operation first needs the database.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use starlinx_core::error::{Result, StarlinxError};
use starlinx_core::types::Registration;

use crate::target::StorageTarget;

/// Thread-safe, lazily opened SQLite database.
pub struct SqliteSink {
    path: PathBuf,
    busy_timeout: Duration,
    conn: Mutex<Option<Connection>>,
}

impl SqliteSink {
    pub fn new(path: impl Into<PathBuf>, busy_timeout: Duration) -> Self {
        Self {
            path: path.into(),
            busy_timeout,
            conn: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Execute a closure with the connection, opening it first if needed.
    ///
    /// A failed open leaves the slot empty so the next call retries.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut slot = self
            .conn
            .lock()
            .map_err(|e| StarlinxError::Storage(format!("Database lock poisoned: {}", e)))?;
        if slot.is_none() {
            *slot = Some(self.open()?);
        }
        match slot.as_ref() {
            Some(conn) => f(conn),
            None => Err(StarlinxError::Storage("Database not open".to_string())),
        }
    }

    fn open(&self) -> Result<Connection> {
        StorageTarget::Sqlite {
            path: self.path.clone(),
        }
        .prepare()?;

        let conn = Connection::open(&self.path)
            .map_err(|e| StarlinxError::Storage(format!("Failed to open database: {}", e)))?;
        conn.busy_timeout(self.busy_timeout)
            .map_err(|e| StarlinxError::Storage(format!("Failed to set busy timeout: {}", e)))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(|e| StarlinxError::Storage(format!("Failed to set pragmas: {}", e)))?;

        info!("Database opened at {}", self.path.display());
        Ok(conn)
    }

    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute_batch(sql)
                .map_err(|e| StarlinxError::Storage(format!("Schema statement failed: {}", e)))
        })
    }

    pub fn insert(&self, table: &str, registration: &Registration) -> Result<()> {
        let sql = format!(
            "INSERT INTO {table} (created_at, name, document, phone, email, city, vehicle_type, client_ip)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
        );
        self.with_conn(|conn| {
            conn.execute(
                &sql,
                rusqlite::params![
                    registration.timestamp(),
                    registration.name,
                    registration.document,
                    registration.phone,
                    registration.email,
                    registration.city,
                    registration.vehicle_type,
                    registration.client_ip,
                ],
            )
            .map_err(|e| StarlinxError::Storage(format!("Failed to insert registration: {}", e)))?;
            Ok(())
        })
    }

    pub fn table_exists(&self, table: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<String> = conn
                .query_row(
                    "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    rusqlite::params![table],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| StarlinxError::Storage(e.to_string()))?;
            Ok(found.is_some())
        })
    }

    pub fn count(&self, table: &str) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {table}");
        self.with_conn(|conn| {
            let count: i64 = conn
                .query_row(&sql, [], |row| row.get(0))
                .map_err(|e| StarlinxError::Storage(e.to_string()))?;
            Ok(count.max(0) as u64)
        })
    }
}

impl std::fmt::Debug for SqliteSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteSink")
            .field("path", &self.path)
            .finish()
    }
}
