//! Infrastructure layer
//!
//! Contains the storage-backed implementations of the domain repositories.

pub mod hierarchy;
