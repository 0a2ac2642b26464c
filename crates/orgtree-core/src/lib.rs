//! Orgtree Core Library
//!
//! This crate maintains an organization hierarchy of users and groups as a
//! closure table, including:
//! - Domain types and the closure propagation algorithm
//! - Cycle detection before any link is committed
//! - Storage (SQLite, plus an in-memory backend)
//! - Ancestor, descendant, and organization queries
//! - Closure consistency verification
//! - Configuration with file persistence

pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod storage;

pub use error::{Error, ErrorKind, ErrorResponse, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::api::OrgApi;
    pub use crate::config::Config;
    pub use crate::domain::hierarchy::{
        HierarchyLinker, HierarchyQueryService, HierarchyRepository, Node, NodeId, NodeKind,
        NodeWithDepth,
    };
    pub use crate::error::{Error, Result};
    pub use crate::infrastructure::hierarchy::{
        InMemoryHierarchyRepository, SqliteHierarchyRepository,
    };
}
