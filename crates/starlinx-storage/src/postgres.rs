//! PostgreSQL sink backed by a deadpool connection pool.
//!
//! Every operation is bounded by the configured connect timeout: the pool's
//! wait/create/recycle timeouts cover acquiring a client and an outer
//! `tokio::time::timeout` covers the statement itself.

use std::future::Future;
use std::time::Duration;

use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime, Timeouts};
use tokio_postgres::error::SqlState;
use tokio_postgres::NoTls;
use tracing::debug;

use starlinx_core::error::{Result, StarlinxError};
use starlinx_core::types::Registration;

/// Pooled PostgreSQL sink.
pub struct PostgresSink {
    pool: Pool,
    timeout: Duration,
}

fn pool_error(e: impl std::fmt::Display) -> StarlinxError {
    StarlinxError::Storage(format!("postgres pool: {}", e))
}

fn query_error(op: &str, e: impl std::fmt::Display) -> StarlinxError {
    StarlinxError::Storage(format!("postgres {}: {}", op, e))
}

impl PostgresSink {
    /// Build the pool. No connection is made until the first operation.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error if the URL cannot be parsed.
    pub fn new(url: &str, timeout: Duration, pool_max_size: usize) -> Result<Self> {
        url.parse::<tokio_postgres::Config>()
            .map_err(|e| StarlinxError::Config(format!("invalid postgres URL: {}", e)))?;

        let mut cfg = Config::new();
        cfg.url = Some(url.to_string());
        cfg.connect_timeout = Some(timeout);
        cfg.pool = Some(PoolConfig {
            max_size: pool_max_size,
            timeouts: Timeouts {
                wait: Some(timeout),
                create: Some(timeout),
                recycle: Some(timeout),
            },
            ..Default::default()
        });
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| StarlinxError::Config(format!("failed to create postgres pool: {}", e)))?;

        Ok(Self { pool, timeout })
    }

    async fn bounded<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StarlinxError::Timeout {
                secs: self.timeout.as_secs(),
            }),
        }
    }

    /// Run DDL. Losing a `CREATE ... IF NOT EXISTS` race to another process
    /// surfaces as `duplicate_table` or a catalog `unique_violation`; both
    /// mean the table is there.
    pub async fn execute_ddl(&self, sql: &str) -> Result<()> {
        self.bounded(async {
            let client = self.pool.get().await.map_err(pool_error)?;
            match client.batch_execute(sql).await {
                Ok(()) => Ok(()),
                Err(e)
                    if e.code() == Some(&SqlState::DUPLICATE_TABLE)
                        || e.code() == Some(&SqlState::UNIQUE_VIOLATION) =>
                {
                    debug!(error = %e, "concurrent schema creation, table already present");
                    Ok(())
                }
                Err(e) => Err(query_error("ddl", e)),
            }
        })
        .await
    }

    pub async fn insert(&self, table: &str, registration: &Registration) -> Result<()> {
        let sql = format!(
            "INSERT INTO {table} (created_at, name, document, phone, email, city, vehicle_type, client_ip)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
        );
        self.bounded(async {
            let client = self.pool.get().await.map_err(pool_error)?;
            client
                .execute(
                    &sql,
                    &[
                        &registration.created_at,
                        &registration.name,
                        &registration.document,
                        &registration.phone,
                        &registration.email,
                        &registration.city,
                        &registration.vehicle_type,
                        &registration.client_ip,
                    ],
                )
                .await
                .map_err(|e| query_error("insert", e))?;
            Ok(())
        })
        .await
    }

    pub async fn table_exists(&self, table: &str) -> Result<bool> {
        self.bounded(async {
            let client = self.pool.get().await.map_err(pool_error)?;
            let row = client
                .query_one(
                    "SELECT EXISTS (
                         SELECT 1 FROM information_schema.tables
                         WHERE table_schema = current_schema() AND table_name = $1::text
                     )",
                    &[&table],
                )
                .await
                .map_err(|e| query_error("table_exists", e))?;
            Ok(row.get::<_, bool>(0))
        })
        .await
    }

    pub async fn count(&self, table: &str) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {table}");
        self.bounded(async {
            let client = self.pool.get().await.map_err(pool_error)?;
            let row = client
                .query_one(&sql, &[])
                .await
                .map_err(|e| query_error("count", e))?;
            let count: i64 = row.get(0);
            Ok(count.max(0) as u64)
        })
        .await
    }
}

impl std::fmt::Debug for PostgresSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresSink")
            .field("timeout", &self.timeout)
            .finish()
    }
}
