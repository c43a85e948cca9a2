//! Node Data Structures
//!
//! This module defines the `Node` row model of a nested-set table and the inputs
//! accepted by structural operations.
//!
//! # Architecture
//!
//! - **Typed columns**: `id`, `lft`, `rgt`, `parent_id` and the scope key are explicit
//!   fields; there is no runtime attribute lookup
//! - **Opaque payload**: domain attributes (title, url, ...) live in a JSON `payload`
//!   the engine never inspects
//! - **Derived depth**: `depth` is only present when a query asked for it
//!
//! # Examples
//!
//! ```rust
//! use nestedset_core::models::{NodeDraft, ScopeKey};
//! use serde_json::json;
//!
//! // New row that will inherit its scope from the node it is placed next to
//! let draft = NodeDraft::new(json!({ "title": "Contact" }));
//!
//! // New root row, scope given explicitly
//! let root = NodeDraft::in_scope(ScopeKey::new().with("menu_id", 3), json!({}));
//! assert!(root.scope.is_some());
//! # let _ = draft;
//! ```

use crate::interval::Interval;
use crate::models::ScopeKey;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Table-wide row identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub i64);

impl From<i64> for NodeId {
    fn from(value: i64) -> Self {
        NodeId(value)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn empty_payload() -> Value {
    Value::Object(Default::default())
}

/// One row of a nested-set table
///
/// # Fields
///
/// - `id`: Unique identifier across the whole table
/// - `lft` / `rgt`: Interval owned by the node and its descendants
/// - `parent_id`: Parent reference, `None` exactly for roots
/// - `depth`: Number of ancestors, populated by depth-annotated queries only
/// - `scope`: Scope key shared with every ancestor and descendant
/// - `payload`: Domain attributes, stored as JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,

    pub lft: i64,

    pub rgt: i64,

    pub parent_id: Option<NodeId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<i64>,

    pub scope: ScopeKey,

    #[serde(default = "empty_payload")]
    pub payload: Value,
}

impl Node {
    pub fn interval(&self) -> Interval {
        Interval {
            lft: self.lft,
            rgt: self.rgt,
        }
    }

    /// Number of boundary values owned by this subtree (`rgt - lft + 1`)
    pub fn width(&self) -> i64 {
        self.rgt - self.lft + 1
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn is_leaf(&self) -> bool {
        self.rgt - self.lft == 1
    }

    pub fn same_scope(&self, other: &Node) -> bool {
        self.scope == other.scope
    }

    /// Strict interval containment; always false across scopes
    pub fn is_descendant_of(&self, other: &Node) -> bool {
        self.same_scope(other) && other.interval().contains(&self.interval())
    }

    pub fn is_self_or_descendant_of(&self, other: &Node) -> bool {
        self.same_scope(other)
            && (self.id == other.id || other.interval().contains(&self.interval()))
    }

    pub fn is_ancestor_of(&self, other: &Node) -> bool {
        other.is_descendant_of(self)
    }

    /// Read a payload attribute (`None` when absent or payload is not an object)
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.payload.get(name)
    }
}

/// A row that does not exist yet
///
/// `scope: None` means "inherit the scope of the reference node"; root placements
/// require an explicit scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDraft {
    #[serde(default)]
    pub scope: Option<ScopeKey>,

    #[serde(default = "empty_payload")]
    pub payload: Value,
}

impl NodeDraft {
    pub fn new(payload: Value) -> Self {
        Self {
            scope: None,
            payload,
        }
    }

    pub fn in_scope(scope: ScopeKey, payload: Value) -> Self {
        Self {
            scope: Some(scope),
            payload,
        }
    }
}

/// Acting node of a placement operation: a new row or an existing one
#[derive(Debug, Clone, PartialEq)]
pub enum Subject {
    New(NodeDraft),
    Existing(NodeId),
}

impl From<NodeDraft> for Subject {
    fn from(draft: NodeDraft) -> Self {
        Subject::New(draft)
    }
}

impl From<NodeId> for Subject {
    fn from(id: NodeId) -> Self {
        Subject::Existing(id)
    }
}

impl From<&Node> for Subject {
    fn from(node: &Node) -> Self {
        Subject::Existing(node.id)
    }
}

/// One entry of a nested forest description used by `rebuild_tree`
///
/// `id: Some(_)` refers to an existing row of the scope being rebuilt; `id: None`
/// creates a new row. `payload: Some(_)` overwrites the stored payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForestEntry {
    #[serde(default)]
    pub id: Option<NodeId>,

    #[serde(default)]
    pub payload: Option<Value>,

    #[serde(default)]
    pub children: Vec<ForestEntry>,
}

impl ForestEntry {
    pub fn existing(id: impl Into<NodeId>) -> Self {
        Self {
            id: Some(id.into()),
            ..Default::default()
        }
    }

    pub fn new(payload: Value) -> Self {
        Self {
            id: None,
            payload: Some(payload),
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<ForestEntry>) -> Self {
        self.children = children;
        self
    }
}
