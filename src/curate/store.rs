//! The analytical SQLite database.
//!
//! - Connection pool management
//! - WAL mode for file databases
//! - Table creation from a [`TableSchema`]
//! - Transactional upsert by merge key
//!
//! # Example
//!
//! ```no_run
//! use footprint_core::curate::{AnalyticsStore, TableSchema};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = AnalyticsStore::open(Path::new("footprint.db")).await?;
//! store.ensure_table(&TableSchema::carbon_footprint()).await?;
//! store.close().await;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::{debug, instrument, warn};

use super::error::CurationError;
use super::schema::TableSchema;
use super::transform::{CellValue, Row};

/// Maximum pooled connections. Writes are sequential, reads are rare.
const DEFAULT_MAX_CONNECTIONS: u32 = 2;

/// SQLite busy timeout in milliseconds.
const BUSY_TIMEOUT_MS: u32 = 5000;

/// Handle to the analytical database.
#[derive(Debug, Clone)]
pub struct AnalyticsStore {
    pool: SqlitePool,
}

impl AnalyticsStore {
    /// Opens (creating if needed) the database file at `db_path`.
    ///
    /// # Errors
    ///
    /// Returns [`CurationError::Database`] if the connection or the pragmas
    /// fail.
    #[instrument(skip(db_path), fields(path = %db_path.display()))]
    pub async fn open(db_path: &Path) -> Result<Self, CurationError> {
        let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

        let pool = SqlitePoolOptions::new()
            .max_connections(DEFAULT_MAX_CONNECTIONS)
            .connect(&db_url)
            .await?;

        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&pool)
            .await?;
        sqlx::query(&format!("PRAGMA busy_timeout={BUSY_TIMEOUT_MS}"))
            .execute(&pool)
            .await?;

        Ok(Self { pool })
    }

    /// Opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`CurationError::Database`] if the connection fails.
    #[instrument]
    pub async fn open_in_memory() -> Result<Self, CurationError> {
        // One connection: every in-memory connection is a separate database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Ok(Self { pool })
    }

    /// The underlying pool, for ad hoc queries.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Creates the schema's table if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`CurationError::Database`] if the DDL fails.
    #[instrument(skip(self, schema), fields(table = schema.table()))]
    pub async fn ensure_table(&self, schema: &TableSchema) -> Result<(), CurationError> {
        sqlx::query(&schema.create_table_sql())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Inserts `rows`, replacing non-key columns of rows whose merge key
    /// already exists. All rows are written in one transaction.
    ///
    /// Returns the number of rows written; an empty batch writes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`CurationError::Database`] if any statement fails, in which
    /// case nothing from the batch is kept.
    #[instrument(skip(self, schema, rows), fields(table = schema.table(), rows = rows.len()))]
    pub async fn upsert(&self, schema: &TableSchema, rows: &[Row]) -> Result<u64, CurationError> {
        if rows.is_empty() {
            warn!("no rows to load, skipping");
            return Ok(0);
        }

        let sql = schema.upsert_sql();
        let mut tx = self.pool.begin().await?;
        for row in rows {
            let mut query = sqlx::query(&sql);
            for cell in row {
                query = match cell {
                    CellValue::Null => query.bind(None::<i64>),
                    CellValue::Integer(value) => query.bind(*value),
                    CellValue::Real(value) => query.bind(*value),
                    CellValue::Text(value) => query.bind(value.as_str()),
                };
            }
            query.execute(&mut *tx).await?;
        }
        tx.commit().await?;

        debug!("upsert committed");
        Ok(rows.len() as u64)
    }

    /// Number of rows currently in the schema's table.
    ///
    /// # Errors
    ///
    /// Returns [`CurationError::Database`] if the query fails.
    pub async fn count_rows(&self, schema: &TableSchema) -> Result<i64, CurationError> {
        let sql = format!("SELECT COUNT(*) FROM \"{}\"", schema.table());
        let (count,): (i64,) = sqlx::query_as(&sql).fetch_one(&self.pool).await?;
        Ok(count)
    }

    /// Closes every pooled connection.
    #[instrument(skip(self))]
    pub async fn close(self) {
        self.pool.close().await;
    }
}
