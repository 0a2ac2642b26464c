//! SQLite implementation of the HierarchyRepository
//!
//! Link propagation is one set-based `INSERT ... SELECT` over the closure
//! table joined with itself, with an upsert clause that keeps the smaller
//! depth. Writers are serialized by an in-process gate so the cycle re-check
//! and the propagation run against the same snapshot.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteConnection;
use sqlx::{FromRow, Sqlite, SqlitePool, Transaction};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, warn};

use crate::domain::hierarchy::{
    ClosureEdge, HierarchyRepository, HierarchyStats, LinkOutcome, Node, NodeId, NodeKind,
    NodeWithDepth,
};
use crate::error::{Error, Result};

/// Default time a writer waits for the gate
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite implementation of the hierarchy repository
#[derive(Clone)]
pub struct SqliteHierarchyRepository {
    pool: SqlitePool,
    writer: Arc<Mutex<()>>,
    write_timeout: Duration,
}

impl SqliteHierarchyRepository {
    /// Create a new SQLite hierarchy repository
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            writer: Arc::new(Mutex::new(())),
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }

    /// Set how long a write waits for the gate before failing with `LockTimeout`
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn acquire_writer(&self) -> Result<MutexGuard<'_, ()>> {
        tokio::time::timeout(self.write_timeout, self.writer.lock())
            .await
            .map_err(|_| {
                warn!(timeout_secs = self.write_timeout.as_secs(), "Timed out waiting for hierarchy writer");
                Error::LockTimeout(self.write_timeout.as_secs())
            })
    }

    async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        self.pool
            .begin()
            .await
            .map_err(|e| Error::TransactionFailed(format!("begin: {}", e)))
    }
}

async fn commit(tx: Transaction<'static, Sqlite>) -> Result<()> {
    tx.commit().await.map_err(|e| {
        error!(error = %e, "Failed to commit hierarchy transaction");
        Error::TransactionFailed(format!("commit: {}", e))
    })
}

async fn insert_node(conn: &mut SqliteConnection, node: &Node) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO nodes (id, kind, name, email, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(node.id.to_string())
    .bind(node.kind.as_str())
    .bind(&node.name)
    .bind(&node.email)
    .bind(node.created_at.to_rfc3339())
    .bind(node.updated_at.to_rfc3339())
    .execute(&mut *conn)
    .await
    .map_err(|err| {
        if let (sqlx::Error::Database(db), Some(email)) = (&err, &node.email) {
            if db.is_unique_violation() {
                return Error::EmailAlreadyExists(email.clone());
            }
        }
        Error::DatabaseError(err)
    })?;
    Ok(())
}

async fn insert_self_link(conn: &mut SqliteConnection, id: &NodeId) -> Result<()> {
    sqlx::query("INSERT INTO closure (ancestor, descendant, depth) VALUES (?, ?, 0)")
        .bind(id.to_string())
        .bind(id.to_string())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn path_exists(conn: &mut SqliteConnection, ancestor: &NodeId, descendant: &NodeId) -> Result<bool> {
    let (exists,): (i64,) = sqlx::query_as(
        "SELECT EXISTS(SELECT 1 FROM closure WHERE ancestor = ? AND descendant = ?)",
    )
    .bind(ancestor.to_string())
    .bind(descendant.to_string())
    .fetch_one(&mut *conn)
    .await?;
    Ok(exists != 0)
}

/// Fail with `NodeNotFound` for the first id that has no node row
async fn require_nodes(conn: &mut SqliteConnection, ids: [&NodeId; 2]) -> Result<()> {
    for id in ids {
        let (exists,): (i64,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM nodes WHERE id = ?)")
            .bind(id.to_string())
            .fetch_one(&mut *conn)
            .await?;
        if exists == 0 {
            warn!(node_id = %id, "Node vanished before link, rolling back");
            return Err(Error::NodeNotFound(*id));
        }
    }
    Ok(())
}

/// Cross-product upsert: every ancestor of `parent` (itself included) with
/// every descendant of `child` (itself included)
async fn propagate_link(conn: &mut SqliteConnection, child: &NodeId, parent: &NodeId) -> Result<u64> {
    // The WHERE on the SELECT keeps SQLite from reading ON CONFLICT as a join constraint
    let result = sqlx::query(
        r#"
        INSERT INTO closure (ancestor, descendant, depth)
        SELECT up.ancestor, down.descendant, up.depth + 1 + down.depth
        FROM closure AS up, closure AS down
        WHERE up.descendant = ?1 AND down.ancestor = ?2
        ON CONFLICT(ancestor, descendant) DO UPDATE SET
            depth = MIN(closure.depth, excluded.depth)
        WHERE excluded.depth < closure.depth
        "#,
    )
    .bind(parent.to_string())
    .bind(child.to_string())
    .execute(&mut *conn)
    .await
    .map_err(|e| {
        error!(child_id = %child, parent_id = %parent, error = %e, "Closure propagation failed");
        Error::LinkPropagationFailed {
            child: *child,
            parent: *parent,
            reason: e.to_string(),
        }
    })?;
    Ok(result.rows_affected())
}

/// Re-check both endpoints and the cycle condition, then propagate, inside
/// the caller's transaction
async fn link_in(conn: &mut SqliteConnection, child: &NodeId, parent: &NodeId) -> Result<LinkOutcome> {
    require_nodes(conn, [child, parent]).await?;
    if path_exists(conn, child, parent).await? {
        warn!(child_id = %child, parent_id = %parent, "Cycle found on re-check, rolling back");
        return Err(Error::CycleDetected {
            child: *child,
            parent: *parent,
        });
    }
    let edges_written = propagate_link(conn, child, parent).await?;
    Ok(LinkOutcome { edges_written })
}

#[async_trait]
impl HierarchyRepository for SqliteHierarchyRepository {
    // ========== Node Operations ==========

    async fn create_node(&self, node: &Node) -> Result<()> {
        let _writer = self.acquire_writer().await?;
        let mut tx = self.begin().await?;
        insert_node(&mut *tx, node).await?;
        insert_self_link(&mut *tx, &node.id).await?;
        commit(tx).await?;

        debug!(node_id = %node.id, kind = %node.kind, "Node created with self-link");
        Ok(())
    }

    async fn create_node_under(&self, node: &Node, parent_id: &NodeId) -> Result<LinkOutcome> {
        let _writer = self.acquire_writer().await?;
        let mut tx = self.begin().await?;
        insert_node(&mut *tx, node).await?;
        insert_self_link(&mut *tx, &node.id).await?;
        let outcome = link_in(&mut *tx, &node.id, parent_id).await?;
        commit(tx).await?;

        debug!(
            node_id = %node.id,
            parent_id = %parent_id,
            count = outcome.edges_written,
            "Node created and linked"
        );
        Ok(outcome)
    }

    async fn get_node(&self, id: &NodeId) -> Result<Option<Node>> {
        let row: Option<NodeRow> = sqlx::query_as("SELECT * FROM nodes WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| r.into_node()).transpose()
    }

    async fn get_node_by_email(&self, email: &str) -> Result<Option<Node>> {
        let row: Option<NodeRow> = sqlx::query_as("SELECT * FROM nodes WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| r.into_node()).transpose()
    }

    async fn list_node_ids(&self) -> Result<Vec<NodeId>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT id FROM nodes ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(|(id,)| parse_id(&id)).collect()
    }

    // ========== Closure Operations ==========

    async fn has_path(&self, ancestor: &NodeId, descendant: &NodeId) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        path_exists(&mut *conn, ancestor, descendant).await
    }

    async fn depth_between(&self, ancestor: &NodeId, descendant: &NodeId) -> Result<Option<u32>> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT depth FROM closure WHERE ancestor = ? AND descendant = ?")
                .bind(ancestor.to_string())
                .bind(descendant.to_string())
                .fetch_optional(&self.pool)
                .await?;

        row.map(|(depth,)| to_depth(depth)).transpose()
    }

    async fn link(&self, child_id: &NodeId, parent_id: &NodeId) -> Result<LinkOutcome> {
        let _writer = self.acquire_writer().await?;
        let mut tx = self.begin().await?;
        let outcome = link_in(&mut *tx, child_id, parent_id).await?;
        commit(tx).await?;

        debug!(
            child_id = %child_id,
            parent_id = %parent_id,
            count = outcome.edges_written,
            "Link propagated"
        );
        Ok(outcome)
    }

    async fn ancestors(&self, id: &NodeId) -> Result<Vec<NodeWithDepth>> {
        let rows: Vec<RelativeRow> = sqlx::query_as(
            r#"
            SELECT n.id, n.name, n.kind, c.depth
            FROM closure c
            JOIN nodes n ON n.id = c.ancestor
            WHERE c.descendant = ? AND c.depth >= 1
            ORDER BY c.depth ASC, n.name ASC, n.id ASC
            "#,
        )
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_relative()).collect()
    }

    async fn descendants(&self, id: &NodeId) -> Result<Vec<NodeWithDepth>> {
        let rows: Vec<RelativeRow> = sqlx::query_as(
            r#"
            SELECT n.id, n.name, n.kind, c.depth
            FROM closure c
            JOIN nodes n ON n.id = c.descendant
            WHERE c.ancestor = ? AND c.depth >= 1
            ORDER BY c.depth ASC, n.name ASC, n.id ASC
            "#,
        )
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_relative()).collect()
    }

    async fn organizations(&self, id: &NodeId) -> Result<Vec<NodeWithDepth>> {
        let rows: Vec<RelativeRow> = sqlx::query_as(
            r#"
            SELECT n.id, n.name, n.kind, MIN(c.depth) AS depth
            FROM closure c
            JOIN nodes n ON n.id = c.ancestor
            WHERE c.descendant = ? AND c.depth >= 1 AND n.kind = 'GROUP'
            GROUP BY n.id, n.name, n.kind
            ORDER BY depth ASC, n.name ASC, n.id ASC
            "#,
        )
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.into_relative()).collect()
    }

    async fn closure_edges(&self) -> Result<Vec<ClosureEdge>> {
        let rows: Vec<(String, String, i64)> = sqlx::query_as(
            "SELECT ancestor, descendant, depth FROM closure ORDER BY ancestor, depth, descendant",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(ancestor, descendant, depth)| {
                Ok(ClosureEdge::new(
                    parse_id(&ancestor)?,
                    parse_id(&descendant)?,
                    to_depth(depth)?,
                ))
            })
            .collect()
    }

    // ========== Statistics ==========

    async fn stats(&self) -> Result<HierarchyStats> {
        let (users, groups): (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN kind = 'USER' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN kind = 'GROUP' THEN 1 ELSE 0 END), 0)
            FROM nodes
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let (closure_edges, max_depth): (i64, i64) =
            sqlx::query_as("SELECT COUNT(*), COALESCE(MAX(depth), 0) FROM closure")
                .fetch_one(&self.pool)
                .await?;

        Ok(HierarchyStats {
            total_nodes: (users + groups) as u64,
            users: users as u64,
            groups: groups as u64,
            closure_edges: closure_edges as u64,
            max_depth: to_depth(max_depth)?,
        })
    }
}

// ========== Row Types ==========

#[derive(FromRow)]
struct NodeRow {
    id: String,
    kind: String,
    name: String,
    email: Option<String>,
    created_at: String,
    updated_at: String,
}

impl NodeRow {
    fn into_node(self) -> Result<Node> {
        let kind = parse_kind(&self.kind)?;

        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        let updated_at = DateTime::parse_from_rfc3339(&self.updated_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(Node {
            id: parse_id(&self.id)?,
            kind,
            name: self.name,
            email: self.email,
            created_at,
            updated_at,
        })
    }
}

#[derive(FromRow)]
struct RelativeRow {
    id: String,
    name: String,
    kind: String,
    depth: i64,
}

impl RelativeRow {
    fn into_relative(self) -> Result<NodeWithDepth> {
        Ok(NodeWithDepth {
            id: parse_id(&self.id)?,
            name: self.name,
            kind: parse_kind(&self.kind)?,
            depth: to_depth(self.depth)?,
        })
    }
}

fn parse_id(value: &str) -> Result<NodeId> {
    NodeId::from_str(value).map_err(|e| Error::Other(format!("Invalid node id '{}': {}", value, e)))
}

fn parse_kind(value: &str) -> Result<NodeKind> {
    NodeKind::parse(value).ok_or_else(|| Error::Other(format!("Invalid node kind: {}", value)))
}

fn to_depth(value: i64) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::Other(format!("Invalid closure depth: {}", value)))
}
