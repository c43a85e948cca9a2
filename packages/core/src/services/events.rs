//! Tree Events
//!
//! Events broadcast by `NestedSetService` after a structural change commits.
//! Subscribers use them to invalidate whatever they derived from a scope (rendered
//! menus, cached paths); the engine itself keeps no derived state.
//!
//! # Event Flow
//!
//! 1. A node operation commits its transaction
//! 2. The service sends a `TreeEvent` on its broadcast channel
//! 3. Every subscriber receives it; sends with no subscriber are dropped silently

use crate::interval::Interval;
use crate::models::{Node, NodeId, ScopeKey};
use serde::{Deserialize, Serialize};

/// Structural change in one scope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TreeEvent {
    /// A row was inserted; `node` carries its final boundaries
    #[serde(rename = "node:inserted")]
    NodeInserted { node: Node },

    /// An existing subtree was relocated or re-parented
    #[serde(rename = "node:moved", rename_all = "camelCase")]
    NodeMoved { node: Node, previous: Interval },

    /// A subtree was removed and its gap closed
    #[serde(rename = "subtree:deleted", rename_all = "camelCase")]
    SubtreeDeleted {
        scope: ScopeKey,
        root_id: NodeId,
        removed: u64,
        span: Interval,
    },

    /// Every boundary of a scope was recomputed
    #[serde(rename = "scope:rebuilt")]
    ScopeRebuilt { scope: ScopeKey, updated: usize },
}

impl TreeEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            TreeEvent::NodeInserted { .. } => "node:inserted",
            TreeEvent::NodeMoved { .. } => "node:moved",
            TreeEvent::SubtreeDeleted { .. } => "subtree:deleted",
            TreeEvent::ScopeRebuilt { .. } => "scope:rebuilt",
        }
    }

    /// Scope the change happened in
    pub fn scope(&self) -> &ScopeKey {
        match self {
            TreeEvent::NodeInserted { node } | TreeEvent::NodeMoved { node, .. } => &node.scope,
            TreeEvent::SubtreeDeleted { scope, .. } | TreeEvent::ScopeRebuilt { scope, .. } => {
                scope
            }
        }
    }
}
