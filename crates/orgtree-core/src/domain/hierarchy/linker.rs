//! Hierarchy linker
//!
//! Orchestrates node creation and parent linking. Kind and existence checks
//! run first; the persisting step is always a single repository call so a
//! failed creation leaves nothing behind.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::error::{Error, Result};

use super::cycle::CycleGuard;
use super::entity::{LinkOutcome, Node, NodeId, NodeKind};
use super::repository::HierarchyRepository;

pub struct HierarchyLinker<R: HierarchyRepository> {
    repository: Arc<R>,
    guard: CycleGuard<R>,
}

impl<R: HierarchyRepository> HierarchyLinker<R> {
    pub fn new(repository: Arc<R>) -> Self {
        let guard = CycleGuard::new(Arc::clone(&repository));
        Self { repository, guard }
    }

    /// Create a user node
    ///
    /// Fails with `EmailAlreadyExists` if the email is taken. The pre-check
    /// only gives a fast rejection; the storage constraint still decides
    /// when two creations race.
    pub async fn create_user(&self, name: &str, email: &str) -> Result<Node> {
        info!(name = %name, email = %email, "Creating user");

        if self.repository.get_node_by_email(email).await?.is_some() {
            warn!(email = %email, "Email already exists");
            return Err(Error::EmailAlreadyExists(email.to_string()));
        }

        let user = Node::user(name, email);
        if let Err(err) = self.repository.create_node(&user).await {
            log_failure("Error creating user", &err);
            return Err(err);
        }

        info!(node_id = %user.id, "User created");
        Ok(user)
    }

    /// Create a group node, optionally linked under `parent_id`
    ///
    /// With a parent, node creation and link propagation commit together: a
    /// rejected or failed link leaves no orphan group behind.
    pub async fn create_group(&self, name: &str, parent_id: Option<&NodeId>) -> Result<Node> {
        info!(name = %name, parent_id = ?parent_id.map(ToString::to_string), "Creating group");

        let group = Node::group(name);
        let result = match parent_id {
            None => self.repository.create_node(&group).await.map(|()| None),
            Some(parent_id) => {
                self.require_kind(parent_id, NodeKind::Group).await?;
                self.repository
                    .create_node_under(&group, parent_id)
                    .await
                    .map(Some)
            }
        };

        match result {
            Ok(Some(outcome)) => {
                info!(
                    node_id = %group.id,
                    parent_id = ?parent_id.map(ToString::to_string),
                    count = outcome.edges_written,
                    "Group created and linked to parent"
                );
            }
            Ok(None) => info!(node_id = %group.id, "Group created"),
            Err(err) => {
                log_failure("Error creating group", &err);
                return Err(err);
            }
        }
        Ok(group)
    }

    /// Link an existing user under an existing group
    pub async fn associate_user_to_group(
        &self,
        user_id: &NodeId,
        group_id: &NodeId,
    ) -> Result<LinkOutcome> {
        info!(user_id = %user_id, group_id = %group_id, "Associating user to group");

        self.require_kind(user_id, NodeKind::User).await?;
        self.require_kind(group_id, NodeKind::Group).await?;
        self.guard.ensure_acyclic(user_id, group_id).await?;

        match self.repository.link(user_id, group_id).await {
            Ok(outcome) => {
                info!(
                    user_id = %user_id,
                    group_id = %group_id,
                    count = outcome.edges_written,
                    "User associated to group"
                );
                Ok(outcome)
            }
            Err(err) => {
                log_failure("Error associating user to group", &err);
                Err(err)
            }
        }
    }

    /// Fetch a node and check its kind
    async fn require_kind(&self, id: &NodeId, expected: NodeKind) -> Result<Node> {
        let node = self.repository.get_node(id).await?.ok_or_else(|| {
            warn!(node_id = %id, expected = %expected, "Node not found");
            Error::NodeNotFound(*id)
        })?;

        if node.kind != expected {
            warn!(node_id = %id, expected = %expected, actual = %node.kind, "Node has the wrong kind");
            return Err(Error::InvalidNodeKind {
                id: *id,
                expected,
                actual: node.kind,
            });
        }
        Ok(node)
    }
}

/// Domain rejections are already logged where they are raised
fn log_failure(message: &str, err: &Error) {
    match err {
        Error::EmailAlreadyExists(email) => warn!(email = %email, "{}: email already exists", message),
        Error::CycleDetected { child, parent } => {
            warn!(child_id = %child, parent_id = %parent, "{}: would create a cycle", message)
        }
        _ => error!(error = %err, code = err.code(), "{}", message),
    }
}
