//! SQLite bookkeeping for uploaded blobs, bundles and pins.

use std::path::Path;

use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions},
    Row,
};

use crate::error::Result;

/// SQLite database connection pool.
#[derive(Debug, Clone)]
pub(crate) struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection from a file path.
    pub async fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Create an in-memory database.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new().filename(":memory:");

        // a single long-lived connection, the database dies with it
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Record a stored blob. Re-inserting the same hash is a no-op.
    pub async fn insert_blob(&self, hash: &str, size: i64) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO blobs (hash, size, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT(hash) DO NOTHING
            "#,
        )
        .bind(hash)
        .bind(size)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record an uploaded bundle. Re-inserting the same address is a no-op.
    pub async fn insert_bundle(&self, address: &str, entries: i64) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO bundles (address, entries, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT(address) DO NOTHING
            "#,
        )
        .bind(address)
        .bind(entries)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// List bundle addresses, newest first.
    pub async fn list_bundles(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT address FROM bundles
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|r| r.get("address")).collect())
    }

    pub async fn insert_pin(&self, address: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO pins (address, created_at)
            VALUES (?, ?)
            ON CONFLICT(address) DO NOTHING
            "#,
        )
        .bind(address)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_pin(&self, address: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM pins WHERE address = ?")
            .bind(address)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn has_pin(&self, address: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM pins WHERE address = ?")
            .bind(address)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    pub async fn list_pins(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT address FROM pins ORDER BY created_at ASC, rowid ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|r| r.get("address")).collect())
    }
}

#[cfg(test)]
impl Database {
    pub async fn count_blobs(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM blobs")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("count"))
    }
}
