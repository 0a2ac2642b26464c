//! Read-side queries over the closure relation

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{Error, Result};

use super::entity::{Node, NodeId, NodeWithDepth};
use super::repository::HierarchyRepository;

pub struct HierarchyQueryService<R: HierarchyRepository> {
    repository: Arc<R>,
}

impl<R: HierarchyRepository> HierarchyQueryService<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    pub async fn get_node(&self, id: &NodeId) -> Result<Node> {
        self.repository.get_node(id).await?.ok_or_else(|| {
            warn!(node_id = %id, "Node not found");
            Error::NodeNotFound(*id)
        })
    }

    pub async fn node_ancestors(&self, id: &NodeId) -> Result<Vec<NodeWithDepth>> {
        info!(node_id = %id, "Getting node ancestors");
        self.get_node(id).await?;
        let ancestors = self.repository.ancestors(id).await?;
        info!(node_id = %id, count = ancestors.len(), "Retrieved node ancestors");
        Ok(ancestors)
    }

    pub async fn node_descendants(&self, id: &NodeId) -> Result<Vec<NodeWithDepth>> {
        info!(node_id = %id, "Getting node descendants");
        self.get_node(id).await?;
        let descendants = self.repository.descendants(id).await?;
        info!(node_id = %id, count = descendants.len(), "Retrieved node descendants");
        Ok(descendants)
    }

    /// Groups the node belongs to, directly or transitively
    ///
    /// Only existence is checked. Asking for a group's organizations returns
    /// its enclosing groups.
    pub async fn user_organizations(&self, id: &NodeId) -> Result<Vec<NodeWithDepth>> {
        info!(node_id = %id, "Getting user organizations");
        self.get_node(id).await?;
        let organizations = self.repository.organizations(id).await?;
        info!(node_id = %id, count = organizations.len(), "Retrieved user organizations");
        Ok(organizations)
    }
}
