//! Repository trait for hierarchy persistence
//!
//! One repository owns both relations: node rows and the closure rows
//! derived from parent links. Backends must make every mutating call atomic
//! and must serialize writers so the cycle re-check and the propagation it
//! guards observe the same state.

use async_trait::async_trait;

use crate::error::Result;

use super::entity::{ClosureEdge, HierarchyStats, LinkOutcome, Node, NodeId, NodeWithDepth};

#[async_trait]
pub trait HierarchyRepository: Send + Sync {
    // ========== Node Operations ==========

    /// Persist a node together with its self-link in one atomic unit
    ///
    /// Fails with `EmailAlreadyExists` when the email is taken by any node.
    async fn create_node(&self, node: &Node) -> Result<()>;

    /// Persist a node, its self-link, and its link under `parent_id` in one
    /// atomic unit. Nothing is persisted if any step fails.
    async fn create_node_under(&self, node: &Node, parent_id: &NodeId) -> Result<LinkOutcome>;

    /// Get a node by ID
    async fn get_node(&self, id: &NodeId) -> Result<Option<Node>>;

    /// Get a node by email (emails are unique across all kinds)
    async fn get_node_by_email(&self, email: &str) -> Result<Option<Node>>;

    /// IDs of every stored node
    async fn list_node_ids(&self) -> Result<Vec<NodeId>>;

    // ========== Closure Operations ==========

    /// Whether a closure row `(ancestor, descendant)` exists
    async fn has_path(&self, ancestor: &NodeId, descendant: &NodeId) -> Result<bool>;

    /// Stored depth of `(ancestor, descendant)`, if the pair is connected
    async fn depth_between(&self, ancestor: &NodeId, descendant: &NodeId) -> Result<Option<u32>>;

    /// Link `child_id` under `parent_id` and propagate through the closure
    ///
    /// Re-checks the cycle condition inside the write and fails with
    /// `CycleDetected` if `parent_id` is already beneath `child_id`. On any
    /// failure the closure is left exactly as it was.
    async fn link(&self, child_id: &NodeId, parent_id: &NodeId) -> Result<LinkOutcome>;

    /// Strict ancestors (depth >= 1), ascending by depth
    async fn ancestors(&self, id: &NodeId) -> Result<Vec<NodeWithDepth>>;

    /// Strict descendants (depth >= 1), ascending by depth
    async fn descendants(&self, id: &NodeId) -> Result<Vec<NodeWithDepth>>;

    /// Group ancestors, one entry per group at its minimum depth
    async fn organizations(&self, id: &NodeId) -> Result<Vec<NodeWithDepth>>;

    /// Every closure row, self-links included
    async fn closure_edges(&self) -> Result<Vec<ClosureEdge>>;

    // ========== Statistics ==========

    async fn stats(&self) -> Result<HierarchyStats>;
}
