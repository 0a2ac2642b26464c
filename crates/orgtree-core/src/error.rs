//! Error types for orgtree

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::domain::hierarchy::{NodeId, NodeKind};

/// Result type alias using orgtree's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Orgtree error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Node errors (E001-E099)
    #[error("Node '{0}' not found.")]
    NodeNotFound(NodeId),

    #[error("Node '{id}' is a {actual}, but a {expected} is required here.")]
    InvalidNodeKind {
        id: NodeId,
        expected: NodeKind,
        actual: NodeKind,
    },

    #[error("Email '{0}' is already in use by another node.")]
    EmailAlreadyExists(String),

    // Hierarchy errors (E100-E199)
    #[error("Linking '{child}' under '{parent}' would create a cycle in the hierarchy.")]
    CycleDetected { child: NodeId, parent: NodeId },

    #[error("Failed to link '{child}' under '{parent}': {reason}")]
    LinkPropagationFailed {
        child: NodeId,
        parent: NodeId,
        reason: String,
    },

    // Transaction and lock errors (E300-E399)
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Lock timeout: the hierarchy writer was busy for {0} seconds. Try again later.")]
    LockTimeout(u64),

    // Database errors (E400-E499)
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Input errors (E800-E899)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Error taxonomy visible to callers of the hierarchy core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    InvalidNodeKind,
    CycleDetected,
    ConstraintViolation,
    TransactionFailed,
    InvalidInput,
    Internal,
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::NodeNotFound(_) => "E001",
            Self::InvalidNodeKind { .. } => "E002",
            Self::EmailAlreadyExists(_) => "E003",
            Self::CycleDetected { .. } => "E100",
            Self::LinkPropagationFailed { .. } => "E101",
            Self::TransactionFailed(_) => "E300",
            Self::LockTimeout(_) => "E301",
            Self::DatabaseError(_) => "E400",
            Self::ConfigError(_) => "E600",
            Self::InvalidInput(_) => "E800",
            Self::Other(_) => "E9999",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NodeNotFound(_) => ErrorKind::NotFound,
            Self::InvalidNodeKind { .. } => ErrorKind::InvalidNodeKind,
            Self::EmailAlreadyExists(_) => ErrorKind::ConstraintViolation,
            Self::CycleDetected { .. } => ErrorKind::CycleDetected,
            Self::LinkPropagationFailed { .. } | Self::TransactionFailed(_) | Self::LockTimeout(_) => {
                ErrorKind::TransactionFailed
            }
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::DatabaseError(_) | Self::ConfigError(_) | Self::Other(_) => ErrorKind::Internal,
        }
    }

    /// Transport status a front end should answer with
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::NotFound => 404,
            ErrorKind::InvalidNodeKind => 422,
            ErrorKind::CycleDetected | ErrorKind::ConstraintViolation => 409,
            ErrorKind::InvalidInput => 400,
            ErrorKind::TransactionFailed if matches!(self, Self::LockTimeout(_)) => 503,
            ErrorKind::TransactionFailed | ErrorKind::Internal => 500,
        }
    }

    /// Whether the caller may retry. Only atomic-unit failures qualify, and
    /// only when the retried operation is idempotent for the caller.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::TransactionFailed
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::NodeNotFound(_) => Some("orgtree node show <id>".to_string()),
            Self::InvalidNodeKind { expected, .. } => {
                Some(format!("Pass the id of a {} node", expected))
            }
            Self::EmailAlreadyExists(_) => Some("Use a different email address".to_string()),
            Self::CycleDetected { parent, .. } => {
                Some(format!("orgtree node ancestors {}", parent))
            }
            Self::LockTimeout(_) => {
                Some("orgtree config set hierarchy.write_timeout_secs <secs>".to_string())
            }
            Self::ConfigError(_) => Some("orgtree config list".to_string()),
            _ => None,
        }
    }
}

/// Serializable error body for transport layers
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub status_code: u16,
    pub code: &'static str,
    pub kind: ErrorKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl From<&Error> for ErrorResponse {
    fn from(error: &Error) -> Self {
        Self {
            status_code: error.status_code(),
            code: error.code(),
            kind: error.kind(),
            message: error.to_string(),
            timestamp: Utc::now(),
        }
    }
}
