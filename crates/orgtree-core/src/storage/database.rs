//! SQLite database operations
//!
//! Provides connection pool management and database initialization for orgtree.

use crate::storage::migrations;
use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::debug;

/// Default maximum connections in the pool
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Database configuration options
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file
    pub path: PathBuf,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Whether to run migrations automatically
    pub auto_migrate: bool,
    /// Journal mode (default: WAL so readers do not block the writer)
    pub journal_mode: SqliteJournalMode,
    /// Synchronous mode
    pub synchronous: SqliteSynchronous,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            auto_migrate: true,
            journal_mode: SqliteJournalMode::Wal,
            synchronous: SqliteSynchronous::Normal,
        }
    }
}

impl DatabaseConfig {
    /// Create a new database config with the specified path
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Create a config for an in-memory database (useful for testing)
    pub fn in_memory() -> Self {
        Self {
            path: PathBuf::from(":memory:"),
            max_connections: 1, // every connection to :memory: is a separate database
            auto_migrate: true,
            journal_mode: SqliteJournalMode::Memory,
            synchronous: SqliteSynchronous::Normal,
        }
    }

    /// Set the maximum number of connections
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Disable automatic migrations
    pub fn no_migrate(mut self) -> Self {
        self.auto_migrate = false;
        self
    }

    pub fn is_in_memory(&self) -> bool {
        self.path.to_string_lossy() == ":memory:"
    }
}

/// Get the default database path
pub fn default_database_path() -> PathBuf {
    if let Some(data_dir) = dirs::data_dir() {
        data_dir.join("orgtree").join("orgtree.db")
    } else {
        PathBuf::from("orgtree.db")
    }
}

/// Database connection pool wrapper
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection with the given configuration
    pub async fn new(config: DatabaseConfig) -> Result<Self> {
        if !config.is_in_memory() {
            if let Some(parent) = config.path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    std::fs::create_dir_all(parent).with_context(|| {
                        format!("Failed to create database directory: {:?}", parent)
                    })?;
                }
            }
        }

        let connection_str = if config.is_in_memory() {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite:{}?mode=rwc", config.path.display())
        };

        let connect_options = SqliteConnectOptions::from_str(&connection_str)?
            .journal_mode(config.journal_mode)
            .synchronous(config.synchronous)
            .foreign_keys(true)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(connect_options)
            .await
            .with_context(|| format!("Failed to connect to database: {:?}", config.path))?;

        let db = Self { pool };

        if config.auto_migrate {
            let status = db.migrate().await?;
            debug!(
                path = %config.path.display(),
                schema_version = status.current_version,
                "Database ready"
            );
        }

        Ok(db)
    }

    /// Create an in-memory database (useful for testing)
    pub async fn in_memory() -> Result<Self> {
        Self::new(DatabaseConfig::in_memory()).await
    }

    /// Get the underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Run pending migrations and report the resulting schema version
    pub async fn migrate(&self) -> Result<migrations::MigrationStatus> {
        migrations::run_migrations(&self.pool)
            .await
            .context("Failed to run database migrations")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn insert_group(db: &Database, id: &str) {
        sqlx::query(
            "INSERT INTO nodes (id, kind, name, created_at, updated_at) VALUES (?, 'GROUP', ?, '', '')",
        )
        .bind(id)
        .bind(id)
        .execute(db.pool())
        .await
        .expect("Failed to insert node");
        sqlx::query("INSERT INTO closure (ancestor, descendant, depth) VALUES (?, ?, 0)")
            .bind(id)
            .bind(id)
            .execute(db.pool())
            .await
            .expect("Failed to insert self-link");
    }

    #[tokio::test]
    async fn test_in_memory_database() {
        let db = Database::in_memory().await.expect("Failed to create in-memory database");

        let status = migrations::migration_status(db.pool())
            .await
            .expect("Failed to get migration status");
        assert_eq!(status.current_version, migrations::CURRENT_VERSION);
        assert!(!status.needs_migration);
    }

    #[tokio::test]
    async fn test_no_migrate_leaves_schema_empty() {
        let db = Database::new(DatabaseConfig::in_memory().no_migrate())
            .await
            .expect("Failed to create database");
        let status = migrations::migration_status(db.pool())
            .await
            .expect("Failed to get migration status");
        assert_eq!(status.current_version, 0);

        let applied = db.migrate().await.expect("Failed to migrate");
        assert_eq!(applied.current_version, migrations::CURRENT_VERSION);
    }

    #[tokio::test]
    async fn test_database_config_builder() {
        let config = DatabaseConfig::with_path("/tmp/orgtree-test.db")
            .max_connections(10)
            .no_migrate();

        assert_eq!(config.path, PathBuf::from("/tmp/orgtree-test.db"));
        assert_eq!(config.max_connections, 10);
        assert!(!config.auto_migrate);
        assert!(!config.is_in_memory());
        assert!(DatabaseConfig::in_memory().is_in_memory());
    }

    #[tokio::test]
    async fn test_foreign_keys_enabled() {
        let db = Database::in_memory().await.expect("Failed to create database");

        let result: (i32,) = sqlx::query_as("PRAGMA foreign_keys")
            .fetch_one(db.pool())
            .await
            .expect("Failed to check foreign_keys pragma");

        assert_eq!(result.0, 1, "Foreign keys should be enabled");
    }

    #[tokio::test]
    async fn test_closure_rejects_unknown_nodes() {
        let db = Database::in_memory().await.expect("Failed to create database");
        insert_group(&db, "company").await;

        let result = sqlx::query("INSERT INTO closure (ancestor, descendant, depth) VALUES ('company', 'ghost', 1)")
            .execute(db.pool())
            .await;
        assert!(result.is_err(), "closure rows must reference existing nodes");
    }

    #[tokio::test]
    async fn test_cascade_delete() {
        let db = Database::in_memory().await.expect("Failed to create database");
        insert_group(&db, "company").await;
        insert_group(&db, "team").await;
        sqlx::query("INSERT INTO closure (ancestor, descendant, depth) VALUES ('company', 'team', 1)")
            .execute(db.pool())
            .await
            .expect("Failed to insert link");

        sqlx::query("DELETE FROM nodes WHERE id = 'team'")
            .execute(db.pool())
            .await
            .expect("Failed to delete node");

        let (remaining,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM closure")
            .fetch_one(db.pool())
            .await
            .expect("Failed to count closure rows");
        assert_eq!(remaining, 1, "only the company self-link should survive");
    }

    #[tokio::test]
    async fn test_file_database_persists_between_connections() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("nested").join("orgtree.db");

        let db = Database::new(DatabaseConfig::with_path(&path))
            .await
            .expect("Failed to create file database");
        insert_group(&db, "company").await;
        db.pool().close().await;

        let reopened = Database::new(DatabaseConfig::with_path(&path))
            .await
            .expect("Failed to reopen database");
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM nodes")
            .fetch_one(reopened.pool())
            .await
            .expect("Failed to count nodes");
        assert_eq!(count, 1);
        assert!(path.exists());
    }
}
