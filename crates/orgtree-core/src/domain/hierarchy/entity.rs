//! Node and closure edge types for the organization hierarchy
//!
//! Nodes are either users or groups. Every parent link between two nodes is
//! materialized in the closure relation as `(ancestor, descendant, depth)`
//! triples, so reads never need to walk the graph.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier of a node in the hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Generate a fresh random identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NodeId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::from_str(s).map(Self)
    }
}

impl From<Uuid> for NodeId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

/// Kind of a hierarchy node
///
/// This is a closed set. Every kind check (parent must be a group, associated
/// node must be a user) matches on it exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeKind {
    /// A person; always carries an email
    User,
    /// An organizational unit; may contain users and other groups
    Group,
}

impl NodeKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            NodeKind::User => "USER",
            NodeKind::Group => "GROUP",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "USER" => Some(NodeKind::User),
            "GROUP" => Some(NodeKind::Group),
            _ => None,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user or group in the hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier
    pub id: NodeId,
    /// User or group
    pub kind: NodeKind,
    /// Display name
    pub name: String,
    /// Email address, present iff `kind` is `User`; unique across all nodes
    pub email: Option<String>,
    /// When the node was created
    pub created_at: DateTime<Utc>,
    /// When the node was last updated
    pub updated_at: DateTime<Utc>,
}

impl Node {
    /// Create a new user node
    pub fn user(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self::build(NodeKind::User, name.into(), Some(email.into()))
    }

    /// Create a new group node
    pub fn group(name: impl Into<String>) -> Self {
        Self::build(NodeKind::Group, name.into(), None)
    }

    fn build(kind: NodeKind, name: String, email: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: NodeId::new(),
            kind,
            name,
            email,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_user(&self) -> bool {
        self.kind == NodeKind::User
    }

    pub fn is_group(&self) -> bool {
        self.kind == NodeKind::Group
    }
}

/// One row of the closure relation
///
/// `descendant` is reachable from `ancestor` in `depth` parent-link hops along
/// the shortest chain. Every node has a `(n, n, 0)` self-link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClosureEdge {
    pub ancestor: NodeId,
    pub descendant: NodeId,
    pub depth: u32,
}

impl ClosureEdge {
    pub fn new(ancestor: NodeId, descendant: NodeId, depth: u32) -> Self {
        Self {
            ancestor,
            descendant,
            depth,
        }
    }

    /// The reflexive edge every node owns
    pub fn self_link(id: NodeId) -> Self {
        Self::new(id, id, 0)
    }

    pub fn is_self_link(&self) -> bool {
        self.ancestor == self.descendant
    }
}

/// A node related to a query subject, with its shortest distance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeWithDepth {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
    pub depth: u32,
}

/// Result of propagating a single parent link
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkOutcome {
    /// Closure rows inserted or lowered to a shorter depth
    pub edges_written: u64,
}

/// Aggregate counts over the hierarchy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyStats {
    pub total_nodes: u64,
    pub users: u64,
    pub groups: u64,
    /// Includes self-links
    pub closure_edges: u64,
    pub max_depth: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_kind_round_trip_through_db_value() {
        for kind in [NodeKind::User, NodeKind::Group] {
            assert_eq!(NodeKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(NodeKind::parse("user"), None);
        assert_eq!(NodeKind::parse("ROLE"), None);
    }

    #[test]
    fn test_node_kind_serializes_uppercase() {
        let json = serde_json::to_string(&NodeKind::Group).unwrap();
        assert_eq!(json, "\"GROUP\"");
    }

    #[test]
    fn test_user_carries_email_and_group_does_not() {
        let user = Node::user("Alice", "alice@x.com");
        assert!(user.is_user());
        assert_eq!(user.email.as_deref(), Some("alice@x.com"));

        let group = Node::group("Engineering");
        assert!(group.is_group());
        assert!(group.email.is_none());
        assert_ne!(user.id, group.id);
    }

    #[test]
    fn test_node_id_parses_from_uuid_string() {
        let id = NodeId::new();
        let parsed: NodeId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<NodeId>().is_err());
    }

    #[test]
    fn test_self_link() {
        let id = NodeId::new();
        let edge = ClosureEdge::self_link(id);
        assert!(edge.is_self_link());
        assert_eq!(edge.depth, 0);
    }
}
