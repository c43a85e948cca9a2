//! Service Layer Error Types
//!
//! This module defines error types for nested-set operations, separating tree rule
//! violations (raised before any write) from store failures (which roll back).

use crate::db::DatabaseError;
use crate::interval::IntervalError;
use crate::models::{NodeId, ScopeKey};
use crate::services::validator::TreeReport;
use thiserror::Error;

/// Nested-set operation errors
#[derive(Error, Debug)]
pub enum NestedSetError {
    /// Acting and reference node live in different scopes
    #[error("Scope violation: {acting} does not match reference scope {reference}")]
    ScopeViolation {
        acting: ScopeKey,
        reference: ScopeKey,
    },

    /// Move target lies inside the moved subtree
    #[error("Cannot move node {node_id} relative to {target_id}: target is inside its subtree")]
    Cycle { node_id: NodeId, target_id: NodeId },

    /// Node not found by ID
    #[error("Node not found: {id}")]
    NotFound { id: NodeId },

    /// Scope fails structural validation
    #[error("Tree in scope {scope} is broken: {report}")]
    BrokenTree { scope: ScopeKey, report: TreeReport },

    /// Scope mapping does not match the configured scope columns
    #[error("Invalid scope: {0}")]
    InvalidScope(String),

    /// Operation makes no sense for its arguments
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Boundary planning failed
    #[error("Interval error: {0}")]
    Interval(#[from] IntervalError),

    /// Database operation failed
    #[error("Database operation failed: {0}")]
    Database(#[from] DatabaseError),
}

impl NestedSetError {
    /// Create a scope violation error
    pub fn scope_violation(acting: &ScopeKey, reference: &ScopeKey) -> Self {
        Self::ScopeViolation {
            acting: acting.clone(),
            reference: reference.clone(),
        }
    }

    /// Create a cycle error
    pub fn cycle(node_id: NodeId, target_id: NodeId) -> Self {
        Self::Cycle { node_id, target_id }
    }

    /// Create a not found error
    pub fn not_found(id: impl Into<NodeId>) -> Self {
        Self::NotFound { id: id.into() }
    }

    pub fn invalid_scope(msg: impl Into<String>) -> Self {
        Self::InvalidScope(msg.into())
    }

    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        Self::InvalidOperation(msg.into())
    }
}
