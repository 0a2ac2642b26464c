//! Hierarchy repository backends

mod memory;
mod sqlite;

pub use memory::InMemoryHierarchyRepository;
pub use sqlite::{DEFAULT_WRITE_TIMEOUT, SqliteHierarchyRepository};
