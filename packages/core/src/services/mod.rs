//! Nested-Set Services
//!
//! This module contains the engine built on top of the record store:
//!
//! - `NestedSetService` - structural operations, traversal queries, repair
//! - `ScopeResolver` - canonical scope keys and the same-scope rule
//! - `ScopeLocks` - per-scope serialisation of structural writes
//! - `boundary_mutator` - applies boundary plans inside a transaction
//! - `validator` - structural diagnostics for one scope
//! - `rebuilder` - recomputes a scope from a forest or from parent pointers
//! - `TreeEvent` - change notifications broadcast after commit

pub mod boundary_mutator;
pub mod error;
pub mod events;
pub mod rebuilder;
pub mod scope_locks;
pub mod scope_resolver;
pub mod tree_service;
pub mod validator;

pub use error::NestedSetError;
pub use events::TreeEvent;
pub use rebuilder::RebuildSummary;
pub use scope_locks::{ScopeGuard, ScopeLocks};
pub use scope_resolver::ScopeResolver;
pub use tree_service::{MovePosition, NestedSetService};
pub use validator::TreeReport;
