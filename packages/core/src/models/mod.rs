//! Data Models
//!
//! This module contains the row model and operation inputs of the nested-set engine:
//!
//! - `Node` - One row of a scoped nested-set table
//! - `ScopeKey` / `ScopeValue` - Forest discriminator shared by a tree's rows
//! - `NodeDraft` / `Subject` - Inputs of placement operations
//! - `ForestEntry` - Nested description consumed by `rebuild_tree`

mod node;
mod scope;

pub use node::{ForestEntry, Node, NodeDraft, NodeId, Subject};
pub use scope::{ScopeKey, ScopeValue};
