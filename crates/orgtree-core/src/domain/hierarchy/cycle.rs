//! Cycle guard
//!
//! Linking `child` under `parent` closes a loop exactly when `parent` is
//! already reachable from `child`. Because every node carries a self-link,
//! `child == parent` is caught by the same lookup.

use std::sync::Arc;

use tracing::warn;

use crate::error::{Error, Result};

use super::entity::NodeId;
use super::repository::HierarchyRepository;

pub struct CycleGuard<R: HierarchyRepository> {
    repository: Arc<R>,
}

impl<R: HierarchyRepository> Clone for CycleGuard<R> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
        }
    }
}

impl<R: HierarchyRepository> CycleGuard<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    /// True iff `parent_id` already sits beneath (or is) `child_id`
    pub async fn would_create_cycle(&self, child_id: &NodeId, parent_id: &NodeId) -> Result<bool> {
        self.repository.has_path(child_id, parent_id).await
    }

    /// Fail with `CycleDetected` if the link would close a loop
    pub async fn ensure_acyclic(&self, child_id: &NodeId, parent_id: &NodeId) -> Result<()> {
        if self.would_create_cycle(child_id, parent_id).await? {
            warn!(child_id = %child_id, parent_id = %parent_id, "Rejected link: would create a cycle");
            return Err(Error::CycleDetected {
                child: *child_id,
                parent: *parent_id,
            });
        }
        Ok(())
    }
}
