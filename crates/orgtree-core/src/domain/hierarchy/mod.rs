//! Organization hierarchy backed by a closure table
//!
//! Users and groups form an acyclic graph of parent links. Instead of walking
//! that graph on every read, each reachable pair is materialized as a
//! `(ancestor, descendant, depth)` row whose depth is the length of the
//! shortest chain of links.
//!
//! ## Writes
//!
//! - **Node creation** persists the node together with its `(n, n, 0)` self-link
//! - **Linking** joins every ancestor of the parent with every descendant of
//!   the child and upserts each pair keeping the minimum depth
//! - **Cycle guard** rejects a link when the parent is already beneath the child
//!
//! ## Reads
//!
//! Ancestors, descendants, and organizations (group ancestors) are single
//! lookups against the closure rows, ordered by ascending depth.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use orgtree_core::domain::hierarchy::{HierarchyLinker, HierarchyQueryService};
//!
//! let linker = HierarchyLinker::new(repository.clone());
//! let company = linker.create_group("Company", None).await?;
//! let team = linker.create_group("Team", Some(&company.id)).await?;
//! let alice = linker.create_user("Alice", "alice@example.com").await?;
//! linker.associate_user_to_group(&alice.id, &team.id).await?;
//!
//! let queries = HierarchyQueryService::new(repository);
//! let orgs = queries.user_organizations(&alice.id).await?;
//! ```

mod closure;
mod cycle;
mod entity;
mod linker;
mod query;
mod repository;
mod verify;

pub use closure::{ClosureTable, LinkSummary, UpsertOutcome};
pub use cycle::CycleGuard;
pub use entity::{
    ClosureEdge, HierarchyStats, LinkOutcome, Node, NodeId, NodeKind, NodeWithDepth,
};
pub use linker::HierarchyLinker;
pub use query::HierarchyQueryService;
pub use repository::HierarchyRepository;
pub use verify::{ClosureViolation, closure_violations, ensure_closure_invariants};
