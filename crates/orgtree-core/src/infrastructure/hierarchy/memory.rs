//! In-memory implementation of the HierarchyRepository
//!
//! Backed by [`ClosureTable`]. A single `RwLock` over the whole state is the
//! writer gate; every mutation validates first and only then applies, so a
//! rejected call leaves the state untouched.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::domain::hierarchy::{
    ClosureEdge, ClosureTable, HierarchyRepository, HierarchyStats, LinkOutcome, Node, NodeId,
    NodeKind, NodeWithDepth,
};
use crate::error::{Error, Result};

#[derive(Debug, Default)]
struct MemoryState {
    nodes: HashMap<NodeId, Node>,
    emails: HashMap<String, NodeId>,
    closure: ClosureTable,
}

impl MemoryState {
    fn check_insertable(&self, node: &Node) -> Result<()> {
        if let Some(email) = &node.email {
            if self.emails.contains_key(email) {
                return Err(Error::EmailAlreadyExists(email.clone()));
            }
        }
        if self.nodes.contains_key(&node.id) {
            return Err(Error::Other(format!("Node '{}' already exists", node.id)));
        }
        Ok(())
    }

    fn require_node(&self, id: &NodeId) -> Result<()> {
        if self.nodes.contains_key(id) {
            Ok(())
        } else {
            Err(Error::NodeNotFound(*id))
        }
    }

    fn insert(&mut self, node: &Node) {
        if let Some(email) = &node.email {
            self.emails.insert(email.clone(), node.id);
        }
        self.nodes.insert(node.id, node.clone());
        self.closure.insert_self_link(node.id);
    }

    fn relatives(&self, related: Vec<(NodeId, u32)>, kind: Option<NodeKind>) -> Vec<NodeWithDepth> {
        let mut relatives: Vec<NodeWithDepth> = related
            .into_iter()
            .filter_map(|(id, depth)| {
                self.nodes.get(&id).map(|node| NodeWithDepth {
                    id,
                    name: node.name.clone(),
                    kind: node.kind,
                    depth,
                })
            })
            .filter(|relative| kind.is_none_or(|kind| relative.kind == kind))
            .collect();
        relatives.sort_by(|a, b| {
            a.depth
                .cmp(&b.depth)
                .then_with(|| a.name.cmp(&b.name))
                .then_with(|| a.id.cmp(&b.id))
        });
        relatives
    }
}

/// In-memory hierarchy repository, mainly for tests and embedding
#[derive(Debug, Default)]
pub struct InMemoryHierarchyRepository {
    state: RwLock<MemoryState>,
}

impl InMemoryHierarchyRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn cycle_error(child: &NodeId, parent: &NodeId) -> Error {
    Error::CycleDetected {
        child: *child,
        parent: *parent,
    }
}

#[async_trait]
impl HierarchyRepository for InMemoryHierarchyRepository {
    // ========== Node Operations ==========

    async fn create_node(&self, node: &Node) -> Result<()> {
        let mut state = self.state.write().await;
        state.check_insertable(node)?;
        state.insert(node);

        debug!(node_id = %node.id, kind = %node.kind, "Node created with self-link");
        Ok(())
    }

    async fn create_node_under(&self, node: &Node, parent_id: &NodeId) -> Result<LinkOutcome> {
        let mut state = self.state.write().await;
        state.check_insertable(node)?;
        // a fresh node has no descendants, so only a self-parent can cycle
        if node.id == *parent_id {
            return Err(cycle_error(&node.id, parent_id));
        }
        state.require_node(parent_id)?;

        state.insert(node);
        let summary = state.closure.link(&node.id, parent_id);

        debug!(node_id = %node.id, parent_id = %parent_id, count = summary.written(), "Node created and linked");
        Ok(LinkOutcome {
            edges_written: summary.written() as u64,
        })
    }

    async fn get_node(&self, id: &NodeId) -> Result<Option<Node>> {
        Ok(self.state.read().await.nodes.get(id).cloned())
    }

    async fn get_node_by_email(&self, email: &str) -> Result<Option<Node>> {
        let state = self.state.read().await;
        Ok(state
            .emails
            .get(email)
            .and_then(|id| state.nodes.get(id))
            .cloned())
    }

    async fn list_node_ids(&self) -> Result<Vec<NodeId>> {
        let mut ids: Vec<NodeId> = self.state.read().await.nodes.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }

    // ========== Closure Operations ==========

    async fn has_path(&self, ancestor: &NodeId, descendant: &NodeId) -> Result<bool> {
        Ok(self.state.read().await.closure.has_path(ancestor, descendant))
    }

    async fn depth_between(&self, ancestor: &NodeId, descendant: &NodeId) -> Result<Option<u32>> {
        Ok(self.state.read().await.closure.depth(ancestor, descendant))
    }

    async fn link(&self, child_id: &NodeId, parent_id: &NodeId) -> Result<LinkOutcome> {
        let mut state = self.state.write().await;
        state.require_node(child_id)?;
        state.require_node(parent_id)?;
        if state.closure.has_path(child_id, parent_id) {
            return Err(cycle_error(child_id, parent_id));
        }

        let summary = state.closure.link(child_id, parent_id);
        debug!(
            child_id = %child_id,
            parent_id = %parent_id,
            count = summary.written(),
            "Link propagated"
        );
        Ok(LinkOutcome {
            edges_written: summary.written() as u64,
        })
    }

    async fn ancestors(&self, id: &NodeId) -> Result<Vec<NodeWithDepth>> {
        let state = self.state.read().await;
        Ok(state.relatives(state.closure.ancestors(id), None))
    }

    async fn descendants(&self, id: &NodeId) -> Result<Vec<NodeWithDepth>> {
        let state = self.state.read().await;
        Ok(state.relatives(state.closure.descendants(id), None))
    }

    async fn organizations(&self, id: &NodeId) -> Result<Vec<NodeWithDepth>> {
        // one closure row per pair, so the ancestors are already deduplicated
        let state = self.state.read().await;
        Ok(state.relatives(state.closure.ancestors(id), Some(NodeKind::Group)))
    }

    async fn closure_edges(&self) -> Result<Vec<ClosureEdge>> {
        Ok(self.state.read().await.closure.edges())
    }

    // ========== Statistics ==========

    async fn stats(&self) -> Result<HierarchyStats> {
        let state = self.state.read().await;
        let users = state.nodes.values().filter(|node| node.is_user()).count() as u64;
        let total_nodes = state.nodes.len() as u64;
        Ok(HierarchyStats {
            total_nodes,
            users,
            groups: total_nodes - users,
            closure_edges: state.closure.len() as u64,
            max_depth: state.closure.max_depth(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_node_indexes_email() {
        let repo = InMemoryHierarchyRepository::new();
        let alice = Node::user("Alice", "alice@x.com");
        repo.create_node(&alice).await.unwrap();

        let found = repo.get_node_by_email("alice@x.com").await.unwrap();
        assert_eq!(found.map(|n| n.id), Some(alice.id));
        assert_eq!(repo.depth_between(&alice.id, &alice.id).await.unwrap(), Some(0));

        let err = repo
            .create_node(&Node::user("Alice again", "alice@x.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EmailAlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_rejected_create_under_persists_nothing() {
        let repo = InMemoryHierarchyRepository::new();
        let company = Node::group("Company");
        repo.create_node(&company).await.unwrap();
        repo.create_node(&Node::user("Alice", "alice@x.com")).await.unwrap();

        let clash = Node::user("Alice 2", "alice@x.com");
        assert!(repo.create_node_under(&clash, &company.id).await.is_err());
        assert!(repo.get_node(&clash.id).await.unwrap().is_none());
        assert_eq!(repo.closure_edges().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_create_under_missing_parent_is_not_found() {
        let repo = InMemoryHierarchyRepository::new();
        let missing = NodeId::new();
        let orphan = Node::group("Orphan");

        let err = repo.create_node_under(&orphan, &missing).await.unwrap_err();
        assert!(matches!(err, Error::NodeNotFound(id) if id == missing));
        assert!(repo.get_node(&orphan.id).await.unwrap().is_none());
        assert!(repo.closure_edges().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_link_rejects_cycle_and_unknown_nodes() {
        let repo = InMemoryHierarchyRepository::new();
        let company = Node::group("Company");
        let team = Node::group("Team");
        repo.create_node(&company).await.unwrap();
        repo.create_node_under(&team, &company.id).await.unwrap();

        assert!(matches!(
            repo.link(&company.id, &team.id).await,
            Err(Error::CycleDetected { .. })
        ));
        assert!(matches!(
            repo.link(&team.id, &NodeId::new()).await,
            Err(Error::NodeNotFound(_))
        ));
        assert_eq!(repo.closure_edges().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_relatives_are_ordered_by_depth_then_name() {
        let repo = InMemoryHierarchyRepository::new();
        let company = Node::group("Company");
        let zeta = Node::group("Zeta");
        let alpha = Node::group("Alpha");
        repo.create_node(&company).await.unwrap();
        repo.create_node_under(&zeta, &company.id).await.unwrap();
        repo.create_node_under(&alpha, &company.id).await.unwrap();
        let alice = Node::user("Alice", "alice@x.com");
        repo.create_node_under(&alice, &alpha.id).await.unwrap();

        let names: Vec<String> = repo
            .descendants(&company.id)
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["Alpha", "Zeta", "Alice"]);

        let stats = repo.stats().await.unwrap();
        assert_eq!(stats.users, 1);
        assert_eq!(stats.groups, 3);
        assert_eq!(stats.max_depth, 2);
    }
}
