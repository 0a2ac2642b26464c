//! Database migrations
//!
//! This module manages the SQLite schema for the hierarchy store.
//! Migrations are versioned and applied automatically on database connection.

use sqlx::SqlitePool;

/// Current schema version
pub const CURRENT_VERSION: i32 = 2;

/// SQL for creating the migrations tracking table
const CREATE_MIGRATIONS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS _migrations (
        version INTEGER PRIMARY KEY NOT NULL,
        applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );
"#;

/// Migration 1: Nodes and closure relation
const MIGRATION_V1: &str = r#"
    -- Users and groups
    CREATE TABLE IF NOT EXISTS nodes (
        id TEXT PRIMARY KEY NOT NULL,
        kind TEXT NOT NULL CHECK (kind IN ('USER', 'GROUP')),
        name TEXT NOT NULL CHECK (length(name) > 0),
        email TEXT UNIQUE,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        CHECK ((kind = 'USER') = (email IS NOT NULL))
    );

    CREATE INDEX IF NOT EXISTS idx_nodes_kind ON nodes(kind);

    -- Transitive closure of parent links, one row per reachable pair
    CREATE TABLE IF NOT EXISTS closure (
        ancestor TEXT NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
        descendant TEXT NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
        depth INTEGER NOT NULL CHECK (depth >= 0),
        PRIMARY KEY (ancestor, descendant),
        CHECK ((ancestor = descendant) = (depth = 0))
    );

    CREATE INDEX IF NOT EXISTS idx_closure_ancestor ON closure(ancestor);
    CREATE INDEX IF NOT EXISTS idx_closure_descendant ON closure(descendant);
"#;

/// Migration 2: Covering index for depth-ordered reads
const MIGRATION_V2: &str = r#"
    CREATE INDEX IF NOT EXISTS idx_closure_descendant_depth ON closure(descendant, depth);
    CREATE INDEX IF NOT EXISTS idx_closure_ancestor_depth ON closure(ancestor, depth);
"#;

/// Get the current schema version from the database
async fn get_current_version(pool: &SqlitePool) -> anyhow::Result<i32> {
    sqlx::raw_sql(CREATE_MIGRATIONS_TABLE).execute(pool).await?;

    let row: Option<(Option<i32>,)> = sqlx::query_as("SELECT MAX(version) FROM _migrations")
        .fetch_optional(pool)
        .await?;

    Ok(row.and_then(|(v,)| v).unwrap_or(0))
}

/// Record that a migration has been applied
async fn record_migration(pool: &SqlitePool, version: i32) -> anyhow::Result<()> {
    sqlx::query("INSERT INTO _migrations (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;
    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<MigrationStatus> {
    let status = migration_status(pool).await?;

    tracing::info!(
        current_version = status.current_version,
        target_version = status.target_version,
        "Checking database migrations"
    );

    if !status.needs_migration {
        tracing::debug!("Database is up to date");
        return Ok(status);
    }

    if status.current_version < 1 {
        tracing::info!("Applying migration v1: Nodes and closure relation");
        sqlx::raw_sql(MIGRATION_V1).execute(pool).await?;
        record_migration(pool, 1).await?;
    }

    if status.current_version < 2 {
        tracing::info!("Applying migration v2: Depth-ordered closure indexes");
        sqlx::raw_sql(MIGRATION_V2).execute(pool).await?;
        record_migration(pool, 2).await?;
    }

    tracing::info!("Database migrations completed");
    migration_status(pool).await
}

/// Get migration status information
pub async fn migration_status(pool: &SqlitePool) -> anyhow::Result<MigrationStatus> {
    let current_version = get_current_version(pool).await?;
    Ok(MigrationStatus {
        current_version,
        target_version: CURRENT_VERSION,
        needs_migration: current_version < CURRENT_VERSION,
    })
}

/// Migration status information
#[derive(Debug, Clone)]
pub struct MigrationStatus {
    /// Current schema version in the database
    pub current_version: i32,
    /// Target schema version (latest)
    pub target_version: i32,
    /// Whether migrations need to be run
    pub needs_migration: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn create_test_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create test pool")
    }

    #[tokio::test]
    async fn test_run_migrations() {
        let pool = create_test_pool().await;

        let status = migration_status(&pool).await.unwrap();
        assert_eq!(status.current_version, 0);
        assert!(status.needs_migration);

        let applied = run_migrations(&pool).await.unwrap();
        assert_eq!(applied.current_version, CURRENT_VERSION);
        assert!(!applied.needs_migration);

        let status = migration_status(&pool).await.unwrap();
        assert_eq!(status.current_version, CURRENT_VERSION);
    }

    #[tokio::test]
    async fn test_migrations_idempotent() {
        let pool = create_test_pool().await;

        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let status = migration_status(&pool).await.unwrap();
        assert_eq!(status.current_version, CURRENT_VERSION);
    }

    #[tokio::test]
    async fn test_tables_created_empty() {
        let pool = create_test_pool().await;
        run_migrations(&pool).await.unwrap();

        for table in ["nodes", "closure"] {
            let result: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", table))
                .fetch_one(&pool)
                .await
                .unwrap_or_else(|_| panic!("Table {} should exist", table));
            assert_eq!(result.0, 0, "Table {} should be empty", table);
        }
    }

    #[tokio::test]
    async fn test_schema_rejects_user_without_email() {
        let pool = create_test_pool().await;
        run_migrations(&pool).await.unwrap();

        let result = sqlx::query(
            "INSERT INTO nodes (id, kind, name, email, created_at, updated_at) VALUES ('a', 'USER', 'Alice', NULL, '', '')",
        )
        .execute(&pool)
        .await;
        assert!(result.is_err());

        let result = sqlx::query(
            "INSERT INTO nodes (id, kind, name, email, created_at, updated_at) VALUES ('g', 'GROUP', 'Team', 'team@x.com', '', '')",
        )
        .execute(&pool)
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_schema_rejects_non_reflexive_zero_depth() {
        let pool = create_test_pool().await;
        run_migrations(&pool).await.unwrap();

        for id in ["a", "b"] {
            sqlx::query(
                "INSERT INTO nodes (id, kind, name, created_at, updated_at) VALUES (?, 'GROUP', ?, '', '')",
            )
            .bind(id)
            .bind(id)
            .execute(&pool)
            .await
            .unwrap();
        }

        let result = sqlx::query("INSERT INTO closure (ancestor, descendant, depth) VALUES ('a', 'b', 0)")
            .execute(&pool)
            .await;
        assert!(result.is_err());

        let result = sqlx::query("INSERT INTO closure (ancestor, descendant, depth) VALUES ('a', 'a', 1)")
            .execute(&pool)
            .await;
        assert!(result.is_err());
    }
}
