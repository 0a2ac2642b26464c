//! Request and response DTOs
//!
//! Requests are validated and normalized before they reach the domain;
//! responses are flat, serializable views of domain types.

use serde::{Deserialize, Serialize};

use crate::domain::hierarchy::{
    ClosureViolation, HierarchyStats, LinkOutcome, Node, NodeId, NodeKind, NodeWithDepth,
};
use crate::error::{Error, Result};

/// Longest accepted name or email, in characters
pub const MAX_FIELD_LEN: usize = 255;

// ========== Requests ==========

#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
}

impl CreateUserRequest {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// Trimmed `(name, email)`, or `InvalidInput`
    pub fn normalize(&self) -> Result<(String, String)> {
        Ok((validate_name(&self.name)?, validate_email(&self.email)?))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupRequest {
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<String>,
}

impl CreateGroupRequest {
    pub fn new(name: impl Into<String>, parent_id: Option<String>) -> Self {
        Self {
            name: name.into(),
            parent_id,
        }
    }

    pub fn normalize(&self) -> Result<(String, Option<NodeId>)> {
        let name = validate_name(&self.name)?;
        let parent_id = self
            .parent_id
            .as_deref()
            .map(|id| parse_node_id("parentId", id))
            .transpose()?;
        Ok((name, parent_id))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociateUserRequest {
    pub user_id: String,
    pub group_id: String,
}

impl AssociateUserRequest {
    pub fn new(user_id: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            group_id: group_id.into(),
        }
    }

    pub fn normalize(&self) -> Result<(NodeId, NodeId)> {
        Ok((
            parse_node_id("userId", &self.user_id)?,
            parse_node_id("groupId", &self.group_id)?,
        ))
    }
}

pub fn parse_node_id(field: &str, value: &str) -> Result<NodeId> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::InvalidInput(format!("{} must be a UUID, got '{}'", field, value)))
}

fn validate_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Error::InvalidInput("name must not be empty".into()));
    }
    if name.chars().count() > MAX_FIELD_LEN {
        return Err(Error::InvalidInput(format!(
            "name must be at most {} characters",
            MAX_FIELD_LEN
        )));
    }
    Ok(name.to_string())
}

fn validate_email(email: &str) -> Result<String> {
    let email = email.trim();
    if email.chars().count() > MAX_FIELD_LEN {
        return Err(Error::InvalidInput(format!(
            "email must be at most {} characters",
            MAX_FIELD_LEN
        )));
    }
    if !is_well_formed_email(email) {
        return Err(Error::InvalidInput(format!("'{}' is not a valid email", email)));
    }
    Ok(email.to_string())
}

/// `local@domain.tld` with no whitespace and a single `@`
fn is_well_formed_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2 && labels.iter().all(|label| !label.is_empty())
}

// ========== Responses ==========

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub name: String,
    pub email: String,
}

impl From<Node> for UserSummary {
    fn from(node: Node) -> Self {
        Self {
            id: node.id,
            kind: node.kind,
            name: node.name,
            email: node.email.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub name: String,
}

impl From<Node> for GroupSummary {
    fn from(node: Node) -> Self {
        Self {
            id: node.id,
            kind: node.kind,
            name: node.name,
        }
    }
}

/// Full view of a single node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSummary {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Node> for NodeSummary {
    fn from(node: Node) -> Self {
        Self {
            id: node.id,
            kind: node.kind,
            name: node.name,
            email: node.email,
            created_at: node.created_at.to_rfc3339(),
            updated_at: node.updated_at.to_rfc3339(),
        }
    }
}

/// One ancestor, descendant, or organization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyEntry {
    pub id: NodeId,
    pub name: String,
    pub depth: u32,
}

impl From<NodeWithDepth> for HierarchyEntry {
    fn from(relative: NodeWithDepth) -> Self {
        Self {
            id: relative.id,
            name: relative.name,
            depth: relative.depth,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociationSummary {
    pub user_id: NodeId,
    pub group_id: NodeId,
    pub edges_written: u64,
}

impl AssociationSummary {
    pub fn new(user_id: NodeId, group_id: NodeId, outcome: LinkOutcome) -> Self {
        Self {
            user_id,
            group_id,
            edges_written: outcome.edges_written,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSummary {
    pub total_nodes: u64,
    pub users: u64,
    pub groups: u64,
    pub closure_edges: u64,
    pub max_depth: u32,
}

impl From<HierarchyStats> for StatsSummary {
    fn from(stats: HierarchyStats) -> Self {
        Self {
            total_nodes: stats.total_nodes,
            users: stats.users,
            groups: stats.groups,
            closure_edges: stats.closure_edges,
            max_depth: stats.max_depth,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyReport {
    pub consistent: bool,
    pub nodes_checked: usize,
    pub edges_checked: usize,
    pub violations: Vec<ClosureViolation>,
}
