//! Database lifecycle and schema migrations.

use crate::error::DatabaseError;
use crate::{Error, Result};
use sqlx::SqliteConnection;
use sqlx::sqlite::SqlitePool;
use std::path::Path;

use super::Database;

fn migration_failed(context: &'static str) -> impl FnOnce(sqlx::Error) -> Error {
    move |e| Error::Database(DatabaseError::MigrationFailed(format!("{}: {}", context, e)))
}

impl Database {
    /// Create a new database connection
    ///
    /// Creates the database file if it doesn't exist and runs migrations.
    pub async fn new(path: &Path) -> Result<Self> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::Database(DatabaseError::ConnectionFailed(format!(
                    "Failed to create database directory: {}",
                    e
                )))
            })?;
        }

        use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteSynchronous};
        use std::str::FromStr;

        // WAL + FULL sync: every auto-committed statement is on disk when it returns
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(|e| {
                Error::Database(DatabaseError::ConnectionFailed(format!(
                    "Failed to parse database path: {}",
                    e
                )))
            })?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full);

        let pool = SqlitePool::connect_with(options).await.map_err(|e| {
            Error::Database(DatabaseError::ConnectionFailed(format!(
                "Failed to connect to database: {}",
                e
            )))
        })?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Run database migrations
    async fn run_migrations(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            Error::Database(DatabaseError::ConnectionFailed(format!(
                "Failed to acquire connection: {}",
                e
            )))
        })?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&mut *conn)
        .await
        .map_err(migration_failed("Failed to create schema_version table"))?;

        let current_version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
                .fetch_optional(&mut *conn)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to query schema version: {}",
                        e
                    )))
                })?
                .flatten();

        if current_version.unwrap_or(0) < 1 {
            Self::migrate_v1(&mut conn).await?;
        }

        Ok(())
    }

    /// Migration v1: catalog and cache record tables
    async fn migrate_v1(conn: &mut SqliteConnection) -> Result<()> {
        tracing::info!("Applying database migration v1");

        // Wrap migration in a transaction so partial failures don't leave the DB in a broken state
        sqlx::query("BEGIN")
            .execute(&mut *conn)
            .await
            .map_err(migration_failed("Failed to begin transaction"))?;

        let result = async {
            Self::create_catalog_schema(conn).await?;
            Self::create_cache_schema(conn).await?;
            Self::record_migration(conn, 1).await?;
            Ok::<(), Error>(())
        }
        .await;

        match result {
            Ok(()) => {
                sqlx::query("COMMIT")
                    .execute(&mut *conn)
                    .await
                    .map_err(migration_failed("Failed to commit migration v1"))?;
            }
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                return Err(e);
            }
        }

        tracing::info!("Database migration v1 complete");
        Ok(())
    }

    /// Create the expanded catalog table
    async fn create_catalog_schema(conn: &mut SqliteConnection) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE catalog_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                category TEXT NOT NULL,
                image TEXT NOT NULL,
                website TEXT NOT NULL,
                project_name TEXT NOT NULL,
                homepage TEXT NOT NULL,
                url_template TEXT NOT NULL,
                platform TEXT NOT NULL,
                arch TEXT NOT NULL,
                original_platform TEXT NOT NULL,
                original_arch TEXT NOT NULL,
                suffix TEXT NOT NULL,
                stale_duration_days INTEGER,
                single_variant INTEGER NOT NULL DEFAULT 0,
                download_path TEXT NOT NULL,
                UNIQUE(name, platform, arch)
            )
            "#,
        )
        .execute(&mut *conn)
        .await
        .map_err(migration_failed("Failed to create catalog_entries table"))?;

        sqlx::query("CREATE INDEX idx_catalog_website ON catalog_entries(website)")
            .execute(&mut *conn)
            .await
            .map_err(migration_failed("Failed to create index"))?;

        Ok(())
    }

    /// Create the cache record table
    async fn create_cache_schema(conn: &mut SqliteConnection) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE cache_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                platform TEXT NOT NULL,
                arch TEXT NOT NULL,
                version TEXT NOT NULL,
                abs_path TEXT NOT NULL,
                last_modified INTEGER NOT NULL,
                UNIQUE(name, platform, arch)
            )
            "#,
        )
        .execute(&mut *conn)
        .await
        .map_err(migration_failed("Failed to create cache_records table"))?;

        sqlx::query("CREATE INDEX idx_cache_last_modified ON cache_records(last_modified ASC)")
            .execute(&mut *conn)
            .await
            .map_err(migration_failed("Failed to create index"))?;

        Ok(())
    }

    async fn record_migration(conn: &mut SqliteConnection, version: i32) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query("INSERT INTO schema_version (version, applied_at) VALUES (?, ?)")
            .bind(version)
            .bind(now)
            .execute(&mut *conn)
            .await
            .map_err(migration_failed("Failed to record migration"))?;

        Ok(())
    }

    /// Close the database connection
    pub async fn close(self) {
        self.pool.close().await;
    }

    /// Get the underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
