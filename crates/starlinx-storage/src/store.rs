//! Dual-sink registration store.
//!
//! Writes go to the CSV file first (primary, must succeed) and then to the
//! database (secondary, best effort). The two copies are not transactional
//! and may diverge; the CSV file is the export source, the database answers
//! `count`.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tracing::{debug, info, warn};

use starlinx_core::config::{StarlinxConfig, StorageConfig};
use starlinx_core::error::Result;
use starlinx_core::types::Registration;

use crate::export::{rows_to_objects, Export, ExportFormat};
use crate::file_sink::{CsvDump, FileSink};
use crate::schema::{SchemaManager, SchemaStatus};
use crate::sink::DatabaseSink;
use crate::target::{resolve_storage_target, Driver, StorageTarget};

/// Outcome of the secondary write.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DatabaseWrite {
    Written,
    Failed { reason: String },
}

/// Result of a successful `record`: the CSV row is on disk.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RecordOutcome {
    pub database: DatabaseWrite,
}

impl RecordOutcome {
    pub fn database_ok(&self) -> bool {
        self.database == DatabaseWrite::Written
    }
}

/// Row count from the database sink.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RowCount {
    pub rows: u64,
    /// Set when the table does not exist yet.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advisory: Option<String>,
}

/// Storage facade handed to the presentation layer.
pub struct RegistrationStore {
    target: StorageTarget,
    file: FileSink,
    database: DatabaseSink,
    schema: SchemaManager,
    secondary_failures: AtomicU64,
}

impl RegistrationStore {
    /// Resolve the target from configuration and open both sinks.
    ///
    /// Only the CSV sink can fail here; the database is not contacted.
    pub fn open(config: &StarlinxConfig) -> Result<Self> {
        let target = resolve_storage_target(&config.storage.database_url);
        Self::with_target(target, config.csv_path(), &config.storage)
    }

    pub fn with_target(
        target: StorageTarget,
        csv_path: impl Into<PathBuf>,
        storage: &StorageConfig,
    ) -> Result<Self> {
        let file = FileSink::open(csv_path)?;
        let database = DatabaseSink::open(&target, storage);
        info!(
            driver = %target.driver(),
            location = %target.redacted_location(),
            csv = %file.path().display(),
            "Registration store opened"
        );
        Ok(Self {
            target,
            file,
            database,
            schema: SchemaManager::new(storage.table.clone()),
            secondary_failures: AtomicU64::new(0),
        })
    }

    pub fn target(&self) -> &StorageTarget {
        &self.target
    }

    pub fn driver(&self) -> Driver {
        self.target.driver()
    }

    pub fn schema_status(&self) -> SchemaStatus {
        self.schema.status()
    }

    /// Number of database writes that failed since startup.
    pub fn secondary_failures(&self) -> u64 {
        self.secondary_failures.load(Ordering::Relaxed)
    }

    /// Startup schema ensure. Failures are logged and remembered, never
    /// returned, so the service still comes up.
    pub async fn initialize(&self) {
        if let Err(e) = self.schema.ensure(&self.database).await {
            warn!(error = %e, "Database schema not ready at startup; will retry on next write");
        }
    }

    /// Create the registrations table if missing.
    ///
    /// Always reaches the database, so a table dropped after startup is
    /// recreated here.
    pub async fn ensure_schema(&self) -> Result<()> {
        self.schema.recheck(&self.database).await
    }

    /// Persist one registration to both sinks.
    ///
    /// Fails only if the CSV append fails. Database problems are reported in
    /// the returned outcome.
    pub async fn record(&self, registration: &Registration) -> Result<RecordOutcome> {
        self.file.append(registration)?;

        let database = match self.write_database(registration).await {
            Ok(()) => DatabaseWrite::Written,
            Err(e) => {
                let failures = self.secondary_failures.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    driver = %self.driver(),
                    error = %e,
                    failures,
                    "Database write failed; registration kept in CSV only"
                );
                DatabaseWrite::Failed {
                    reason: e.to_string(),
                }
            }
        };

        debug!(database_ok = database == DatabaseWrite::Written, "Registration recorded");
        Ok(RecordOutcome { database })
    }

    async fn write_database(&self, registration: &Registration) -> Result<()> {
        let table = self.schema.table();
        self.schema.ensure(&self.database).await?;
        let err = match self.database.insert(table, registration).await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        // A table dropped behind our back: recreate it and retry once.
        if let Ok(false) = self.database.table_exists(table).await {
            warn!(table = %table, "Registrations table vanished; recreating");
            self.schema.invalidate();
            self.schema.ensure(&self.database).await?;
            return self.database.insert(table, registration).await;
        }
        Err(err)
    }

    /// Rows in the database table; zero with an advisory if it is missing.
    pub async fn count(&self) -> Result<RowCount> {
        let table = self.schema.table();
        if !self.database.table_exists(table).await? {
            return Ok(RowCount {
                rows: 0,
                advisory: Some(format!(
                    "table '{}' does not exist; schema not initialized",
                    table
                )),
            });
        }
        Ok(RowCount {
            rows: self.database.count(table).await?,
            advisory: None,
        })
    }

    /// Every row of the CSV file, oldest first.
    pub fn dump(&self) -> Result<CsvDump> {
        self.file.dump()
    }

    /// Data rows currently in the CSV file.
    pub fn file_row_count(&self) -> Result<u64> {
        self.file.row_count()
    }

    pub fn export(&self, format: ExportFormat) -> Result<Export> {
        match format {
            ExportFormat::Csv => Ok(Export::Csv(self.file.read_raw()?)),
            ExportFormat::Json => Ok(Export::Json(rows_to_objects(&self.file.dump()?))),
        }
    }
}

impl std::fmt::Debug for RegistrationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationStore")
            .field("driver", &self.driver())
            .field("csv", &self.file.path())
            .finish()
    }
}
