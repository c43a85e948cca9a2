//! Nested-Set Service - Structural Operations and Traversal Queries
//!
//! This module provides the caller-facing layer of the engine:
//!
//! - Placement (`create_root`, `append_child`, `prepend_child`, `insert_before`,
//!   `insert_after`, `move_node`, `up`, `down`, `save_as_root`)
//! - Removal (`delete`, which removes the whole subtree and closes the gap)
//! - Traversal (`ancestors`, `descendants`, `siblings`, `children`, `depth`, ...)
//! - Diagnostics and repair (`count_errors`, `ensure_consistent`, `rebuild_tree`,
//!   `fix_tree`)
//!
//! # Operation Pipeline
//!
//! Every structural operation runs the same fixed sequence:
//!
//! 1. Look up the reference node to learn its scope
//! 2. Take the per-scope lock and open a write transaction
//! 3. Re-read every node involved inside the transaction
//! 4. Validate (scope match, cycles) before any write
//! 5. Plan boundaries with [`crate::interval`] and apply them through the
//!    boundary mutator, scoped to the acting node's scope
//! 6. Commit (or roll back on any error), then broadcast a [`TreeEvent`]
//!
//! # Scope Isolation
//!
//! Acting and reference nodes must share a scope key; a mismatch is a
//! `ScopeViolation` raised before anything is written. Every shift is filtered by
//! that key, so rows of other scopes in the same table are never touched.
//!
//! # Examples
//!
//! ```no_run
//! # use nestedset_core::config::TreeTableConfig;
//! # use nestedset_core::models::{NodeDraft, ScopeKey};
//! # use nestedset_core::services::NestedSetService;
//! # use serde_json::json;
//! # use std::path::PathBuf;
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = TreeTableConfig::scoped("menu_items", ["menu_id"]);
//! let service = NestedSetService::open(PathBuf::from("./data/menus.db"), config).await?;
//!
//! let scope = ScopeKey::new().with("menu_id", 1);
//! let home = service
//!     .create_root(NodeDraft::in_scope(scope, json!({ "title": "Home" })))
//!     .await?;
//! let about = service
//!     .append_child(home.id, NodeDraft::new(json!({ "title": "About" })))
//!     .await?;
//! assert_eq!((about.lft, about.rgt), (2, 3));
//! # Ok(())
//! # }
//! ```

use crate::config::TreeTableConfig;
use crate::db::{DatabaseError, LibsqlStore, NewRow, RecordStore, ScopedQuery, StoreTransaction};
use crate::interval::{root_slot, Interval, Slot};
use crate::models::{ForestEntry, Node, NodeDraft, NodeId, ScopeKey, Subject};
use crate::services::boundary_mutator;
use crate::services::rebuilder::{self, RebuildSummary};
use crate::services::validator::{self, TreeReport};
use crate::services::{NestedSetError, ScopeLocks, ScopeResolver, TreeEvent};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Where a placed node lands relative to its reference node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovePosition {
    /// Last child of the reference node
    LastChildOf,
    /// First child of the reference node
    FirstChildOf,
    /// Previous sibling of the reference node
    Before,
    /// Next sibling of the reference node
    After,
}

impl MovePosition {
    fn slot(self, reference: Interval) -> Slot {
        match self {
            MovePosition::LastChildOf => Slot::LastChildOf(reference),
            MovePosition::FirstChildOf => Slot::FirstChildOf(reference),
            MovePosition::Before => Slot::Before(reference),
            MovePosition::After => Slot::After(reference),
        }
    }

    /// Parent the placed node ends up with
    fn parent_for(self, reference: &Node) -> Option<NodeId> {
        match self {
            MovePosition::LastChildOf | MovePosition::FirstChildOf => Some(reference.id),
            MovePosition::Before | MovePosition::After => reference.parent_id,
        }
    }
}

/// Nested-set engine over one configured table
///
/// Cheap to clone; clones share the store, scope locks and event channel.
#[derive(Clone)]
pub struct NestedSetService {
    store: Arc<dyn RecordStore>,

    resolver: ScopeResolver,

    locks: ScopeLocks,

    /// Broadcast channel for tree events
    event_tx: broadcast::Sender<TreeEvent>,

    /// First boundary value of every scope
    offset: i64,
}

impl NestedSetService {
    /// Create a service over an existing store
    ///
    /// # Errors
    ///
    /// Returns `Database(InvalidConfig)` when `config` fails validation.
    pub fn new(store: Arc<dyn RecordStore>, config: &TreeTableConfig) -> Result<Self, NestedSetError> {
        config.validate().map_err(DatabaseError::InvalidConfig)?;

        let (event_tx, _) = broadcast::channel(config.event_capacity);

        Ok(Self {
            store,
            resolver: ScopeResolver::from_config(config),
            locks: ScopeLocks::new(),
            event_tx,
            offset: config.boundary_offset,
        })
    }

    /// Open (or create) a libsql database and build a service on it
    pub async fn open(db_path: PathBuf, config: TreeTableConfig) -> Result<Self, NestedSetError> {
        let store = LibsqlStore::new(db_path, config.clone()).await?;
        Self::new(Arc::new(store), &config)
    }

    /// Get access to the underlying record store
    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn resolver(&self) -> &ScopeResolver {
        &self.resolver
    }

    /// Subscribe to tree events
    ///
    /// Events are sent after the owning transaction commits.
    pub fn subscribe(&self) -> broadcast::Receiver<TreeEvent> {
        self.event_tx.subscribe()
    }

    /// Ignores send errors when nobody is subscribed
    fn emit(&self, event: TreeEvent) {
        let _ = self.event_tx.send(event);
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    /// Query over every row of the scope named by `mapping`
    pub fn scoped(&self, mapping: &ScopeKey) -> Result<ScopedQuery, NestedSetError> {
        self.resolver.scoped(mapping)
    }

    /// Table-wide lookup by id
    pub async fn find(&self, id: NodeId) -> Result<Option<Node>, NestedSetError> {
        Ok(self.store.get_node(id).await?)
    }

    /// Like `find`, but a missing row is `NotFound`
    pub async fn get(&self, id: NodeId) -> Result<Node, NestedSetError> {
        self.find(id)
            .await?
            .ok_or_else(|| NestedSetError::not_found(id))
    }

    pub async fn fetch(&self, query: &ScopedQuery) -> Result<Vec<Node>, NestedSetError> {
        Ok(self.store.fetch_nodes(query).await?)
    }

    /// First row of `query`, in its order
    pub async fn first(&self, query: &ScopedQuery) -> Result<Option<Node>, NestedSetError> {
        Ok(self.fetch(&query.clone().take(1)).await?.into_iter().next())
    }

    pub async fn list_scopes(&self) -> Result<Vec<ScopeKey>, NestedSetError> {
        Ok(self.store.list_scopes().await?)
    }

    // ------------------------------------------------------------------
    // Traversal
    // ------------------------------------------------------------------

    /// Enclosing nodes, root first
    pub async fn ancestors(&self, node: &Node) -> Result<Vec<Node>, NestedSetError> {
        self.fetch(&ScopedQuery::for_node(node).ancestors_of(node)).await
    }

    pub async fn ancestors_and_self(&self, node: &Node) -> Result<Vec<Node>, NestedSetError> {
        self.fetch(&ScopedQuery::for_node(node).ancestors_and_self_of(node))
            .await
    }

    /// Every node inside `node`'s interval, in preorder
    pub async fn descendants(&self, node: &Node) -> Result<Vec<Node>, NestedSetError> {
        self.fetch(&ScopedQuery::for_node(node).descendants_of(node))
            .await
    }

    pub async fn descendants_and_self(&self, node: &Node) -> Result<Vec<Node>, NestedSetError> {
        self.fetch(&ScopedQuery::for_node(node).descendants_and_self_of(node))
            .await
    }

    pub async fn children(&self, node: &Node) -> Result<Vec<Node>, NestedSetError> {
        self.fetch(&ScopedQuery::for_node(node).children_of(node)).await
    }

    /// Nodes sharing `node`'s parent (or the other roots), excluding `node`
    pub async fn siblings(&self, node: &Node) -> Result<Vec<Node>, NestedSetError> {
        self.fetch(&ScopedQuery::for_node(node).siblings_of(node)).await
    }

    pub async fn next_siblings(&self, node: &Node) -> Result<Vec<Node>, NestedSetError> {
        self.fetch(&ScopedQuery::for_node(node).next_siblings_of(node))
            .await
    }

    pub async fn prev_siblings(&self, node: &Node) -> Result<Vec<Node>, NestedSetError> {
        self.fetch(&ScopedQuery::for_node(node).prev_siblings_of(node))
            .await
    }

    pub async fn parent(&self, node: &Node) -> Result<Option<Node>, NestedSetError> {
        match node.parent_id {
            Some(parent_id) => {
                self.first(&ScopedQuery::for_node(node).where_id(parent_id))
                    .await
            }
            None => Ok(None),
        }
    }

    pub async fn roots(&self, scope: &ScopeKey) -> Result<Vec<Node>, NestedSetError> {
        self.fetch(&self.scoped(scope)?.roots()).await
    }

    pub async fn leaves(&self, scope: &ScopeKey) -> Result<Vec<Node>, NestedSetError> {
        self.fetch(&self.scoped(scope)?.leaves()).await
    }

    /// Number of ancestors; roots have depth 0
    pub async fn depth(&self, node: &Node) -> Result<i64, NestedSetError> {
        let annotated = self
            .first(&ScopedQuery::for_node(node).where_id(node.id).with_depth())
            .await?
            .ok_or_else(|| NestedSetError::not_found(node.id))?;
        Ok(annotated.depth.unwrap_or(0))
    }

    /// Interval containment; false across scopes
    pub fn is_descendant_of(&self, node: &Node, other: &Node) -> bool {
        node.is_descendant_of(other)
    }

    pub fn is_self_or_descendant_of(&self, node: &Node, other: &Node) -> bool {
        node.is_self_or_descendant_of(other)
    }

    // ------------------------------------------------------------------
    // Placement
    // ------------------------------------------------------------------

    /// Insert a new root at the end of its scope
    ///
    /// # Errors
    ///
    /// `InvalidScope` if the draft has no scope or its scope doesn't match the
    /// configured columns.
    pub async fn create_root(&self, draft: NodeDraft) -> Result<Node, NestedSetError> {
        let scope = draft.scope.as_ref().ok_or_else(|| {
            NestedSetError::invalid_scope("a root placement requires an explicit scope")
        })?;
        let scope = self.resolver.normalize(scope)?;

        let _guard = self.locks.acquire(&scope).await;
        let mut tx = self.store.begin().await?;
        let result = self.insert_root_in(&mut *tx, &scope, &draft.payload).await;
        let node = finish(tx, result).await?;

        self.emit(TreeEvent::NodeInserted { node: node.clone() });
        Ok(node)
    }

    /// Place `subject` as the last child of `parent`
    pub async fn append_child(
        &self,
        parent: NodeId,
        subject: impl Into<Subject>,
    ) -> Result<Node, NestedSetError> {
        self.place(subject.into(), parent, MovePosition::LastChildOf)
            .await
    }

    /// Place `subject` as the first child of `parent`
    pub async fn prepend_child(
        &self,
        parent: NodeId,
        subject: impl Into<Subject>,
    ) -> Result<Node, NestedSetError> {
        self.place(subject.into(), parent, MovePosition::FirstChildOf)
            .await
    }

    /// Place `subject` immediately before `sibling`
    pub async fn insert_before(
        &self,
        sibling: NodeId,
        subject: impl Into<Subject>,
    ) -> Result<Node, NestedSetError> {
        self.place(subject.into(), sibling, MovePosition::Before).await
    }

    /// Place `subject` immediately after `sibling`
    pub async fn insert_after(
        &self,
        sibling: NodeId,
        subject: impl Into<Subject>,
    ) -> Result<Node, NestedSetError> {
        self.place(subject.into(), sibling, MovePosition::After).await
    }

    /// Move an existing subtree relative to `target`
    ///
    /// # Errors
    ///
    /// - `Cycle` if `target` lies inside the moved subtree
    /// - `ScopeViolation` if the two nodes live in different scopes
    /// - `NotFound` if either node is missing
    pub async fn move_node(
        &self,
        id: NodeId,
        target: NodeId,
        position: MovePosition,
    ) -> Result<Node, NestedSetError> {
        self.place(Subject::Existing(id), target, position).await
    }

    /// Swap a node with its previous sibling; `false` if it is already first
    pub async fn up(&self, id: NodeId) -> Result<bool, NestedSetError> {
        self.step(id, true).await
    }

    /// Swap a node with its next sibling; `false` if it is already last
    pub async fn down(&self, id: NodeId) -> Result<bool, NestedSetError> {
        self.step(id, false).await
    }

    /// Make `subject` a root at the end of its own scope
    ///
    /// A draft is inserted like `create_root`; an existing node is detached from its
    /// parent and its subtree moved after the last root.
    pub async fn save_as_root(&self, subject: impl Into<Subject>) -> Result<Node, NestedSetError> {
        let id = match subject.into() {
            Subject::New(draft) => return self.create_root(draft).await,
            Subject::Existing(id) => id,
        };

        let node = self.get(id).await?;
        let _guard = self.locks.acquire(&node.scope).await;
        let mut tx = self.store.begin().await?;
        let result = self.save_as_root_in(&mut *tx, id).await;
        let (node, event) = finish(tx, result).await?;

        self.emit(event);
        Ok(node)
    }

    /// Delete a node and its whole subtree, returning the number of rows removed
    pub async fn delete(&self, id: NodeId) -> Result<u64, NestedSetError> {
        let node = self.get(id).await?;
        let _guard = self.locks.acquire(&node.scope).await;
        let mut tx = self.store.begin().await?;
        let result = self.delete_in(&mut *tx, id).await;
        let (removed, event) = finish(tx, result).await?;

        self.emit(event);
        Ok(removed)
    }

    /// Overwrite the payload of one node; boundaries are untouched
    pub async fn update_payload(&self, id: NodeId, payload: Value) -> Result<Node, NestedSetError> {
        let mut node = self.get(id).await?;
        let mut tx = self.store.begin().await?;
        let result = tx.set_payload(id, &payload).await.map_err(NestedSetError::from);
        finish(tx, result).await?;

        node.payload = payload;
        Ok(node)
    }

    // ------------------------------------------------------------------
    // Diagnostics and repair
    // ------------------------------------------------------------------

    /// Per-category error counts for one scope
    pub async fn count_errors(&self, scope: &ScopeKey) -> Result<TreeReport, NestedSetError> {
        let nodes = self.fetch(&self.scoped(scope)?).await?;
        Ok(validator::inspect(&nodes, self.offset))
    }

    pub async fn is_broken(&self, scope: &ScopeKey) -> Result<bool, NestedSetError> {
        Ok(self.count_errors(scope).await?.is_broken())
    }

    /// `BrokenTree` unless the scope passes every check
    pub async fn ensure_consistent(&self, scope: &ScopeKey) -> Result<(), NestedSetError> {
        let report = self.count_errors(scope).await?;
        if report.is_broken() {
            return Err(NestedSetError::BrokenTree {
                scope: self.resolver.normalize(scope)?,
                report,
            });
        }
        Ok(())
    }

    /// Replace the structure of one scope with `forest`
    ///
    /// See [`rebuilder::rebuild_forest`] for how unmentioned rows are treated.
    pub async fn rebuild_tree(
        &self,
        scope: &ScopeKey,
        forest: &[ForestEntry],
        delete_missing: bool,
    ) -> Result<RebuildSummary, NestedSetError> {
        let scope = self.resolver.normalize(scope)?;

        let _guard = self.locks.acquire(&scope).await;
        let mut tx = self.store.begin().await?;
        let result =
            rebuilder::rebuild_forest(&mut *tx, &scope, forest, delete_missing, self.offset).await;
        let summary = finish(tx, result).await?;

        self.emit(TreeEvent::ScopeRebuilt {
            updated: summary.updated + summary.inserted.len(),
            scope,
        });
        Ok(summary)
    }

    /// Recompute boundaries of one scope from its stored parent pointers
    pub async fn fix_tree(&self, scope: &ScopeKey) -> Result<RebuildSummary, NestedSetError> {
        let scope = self.resolver.normalize(scope)?;

        let _guard = self.locks.acquire(&scope).await;
        let mut tx = self.store.begin().await?;
        let result = rebuilder::rebuild_from_parents(&mut *tx, &scope, self.offset).await;
        let summary = finish(tx, result).await?;

        if summary.updated > 0 {
            self.emit(TreeEvent::ScopeRebuilt {
                updated: summary.updated,
                scope,
            });
        }
        Ok(summary)
    }

    // ------------------------------------------------------------------
    // Transaction bodies
    // ------------------------------------------------------------------

    async fn place(
        &self,
        subject: Subject,
        target_id: NodeId,
        position: MovePosition,
    ) -> Result<Node, NestedSetError> {
        if subject == Subject::Existing(target_id) {
            return Err(NestedSetError::invalid_operation(format!(
                "node {} cannot be placed relative to itself",
                target_id
            )));
        }

        let target = self.get(target_id).await?;
        let _guard = self.locks.acquire(&target.scope).await;
        let mut tx = self.store.begin().await?;
        let result = self.place_in(&mut *tx, subject, target_id, position).await;
        let (node, event) = finish(tx, result).await?;

        self.emit(event);
        Ok(node)
    }

    async fn place_in(
        &self,
        tx: &mut dyn StoreTransaction,
        subject: Subject,
        target_id: NodeId,
        position: MovePosition,
    ) -> Result<(Node, TreeEvent), NestedSetError> {
        let target = load(tx, target_id).await?;
        let parent_id = position.parent_for(&target);
        let cut = position.slot(target.interval()).position();

        match subject {
            Subject::New(draft) => {
                let scope = match &draft.scope {
                    Some(scope) => {
                        let scope = self.resolver.normalize(scope)?;
                        ScopeResolver::ensure_same_scope(&scope, &target.scope)?;
                        scope
                    }
                    None => target.scope.clone(),
                };

                boundary_mutator::open_gap(tx, &scope, cut, 2).await?;
                let interval = Interval::leaf(cut);
                let id = tx
                    .insert_node(NewRow {
                        scope: &scope,
                        interval,
                        parent_id,
                        payload: &draft.payload,
                    })
                    .await?;

                debug!(node_id = %id, lft = interval.lft, scope = %scope, "Inserted node");

                let node = Node {
                    id,
                    lft: interval.lft,
                    rgt: interval.rgt,
                    parent_id,
                    depth: None,
                    scope,
                    payload: draft.payload,
                };
                Ok((node.clone(), TreeEvent::NodeInserted { node }))
            }
            Subject::Existing(id) => {
                let node = load(tx, id).await?;
                ScopeResolver::ensure_same_scope(&node.scope, &target.scope)?;

                if target.is_self_or_descendant_of(&node) {
                    return Err(NestedSetError::cycle(id, target_id));
                }

                let previous = node.interval();
                let moved_to = boundary_mutator::relocate(tx, &node.scope, previous, cut).await?;
                if node.parent_id != parent_id {
                    tx.set_parent(id, parent_id).await?;
                }

                debug!(
                    node_id = %id,
                    from = previous.lft,
                    to = moved_to.lft,
                    "Moved subtree"
                );

                let moved = Node {
                    lft: moved_to.lft,
                    rgt: moved_to.rgt,
                    parent_id,
                    depth: None,
                    ..node
                };
                Ok((moved.clone(), TreeEvent::NodeMoved { node: moved, previous }))
            }
        }
    }

    async fn insert_root_in(
        &self,
        tx: &mut dyn StoreTransaction,
        scope: &ScopeKey,
        payload: &Value,
    ) -> Result<Node, NestedSetError> {
        let interval = root_slot(tx.max_rgt(scope).await?, self.offset);
        let id = tx
            .insert_node(NewRow {
                scope,
                interval,
                parent_id: None,
                payload,
            })
            .await?;

        debug!(node_id = %id, lft = interval.lft, scope = %scope, "Inserted root");

        Ok(Node {
            id,
            lft: interval.lft,
            rgt: interval.rgt,
            parent_id: None,
            depth: None,
            scope: scope.clone(),
            payload: payload.clone(),
        })
    }

    async fn save_as_root_in(
        &self,
        tx: &mut dyn StoreTransaction,
        id: NodeId,
    ) -> Result<(Node, TreeEvent), NestedSetError> {
        let node = load(tx, id).await?;
        let max_rgt = tx.max_rgt(&node.scope).await?.unwrap_or(node.rgt);

        let previous = node.interval();
        let moved_to = boundary_mutator::relocate(tx, &node.scope, previous, max_rgt + 1).await?;
        if node.parent_id.is_some() {
            tx.set_parent(id, None).await?;
        }

        let moved = Node {
            lft: moved_to.lft,
            rgt: moved_to.rgt,
            parent_id: None,
            depth: None,
            ..node
        };
        Ok((moved.clone(), TreeEvent::NodeMoved { node: moved, previous }))
    }

    async fn step(&self, id: NodeId, up: bool) -> Result<bool, NestedSetError> {
        let node = self.get(id).await?;
        let _guard = self.locks.acquire(&node.scope).await;
        let mut tx = self.store.begin().await?;
        let result = self.step_in(&mut *tx, id, up).await;

        match finish(tx, result).await? {
            Some(event) => {
                self.emit(event);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn step_in(
        &self,
        tx: &mut dyn StoreTransaction,
        id: NodeId,
        up: bool,
    ) -> Result<Option<TreeEvent>, NestedSetError> {
        let node = load(tx, id).await?;
        let query = ScopedQuery::for_node(&node);
        let query = if up {
            query.prev_siblings_of(&node).reversed().take(1)
        } else {
            query.next_siblings_of(&node).take(1)
        };

        let Some(sibling) = tx.fetch_nodes(&query).await?.into_iter().next() else {
            return Ok(None);
        };

        let slot = if up {
            Slot::Before(sibling.interval())
        } else {
            Slot::After(sibling.interval())
        };

        let previous = node.interval();
        let moved_to =
            boundary_mutator::relocate(tx, &node.scope, previous, slot.position()).await?;

        let moved = Node {
            lft: moved_to.lft,
            rgt: moved_to.rgt,
            depth: None,
            ..node
        };
        Ok(Some(TreeEvent::NodeMoved { node: moved, previous }))
    }

    async fn delete_in(
        &self,
        tx: &mut dyn StoreTransaction,
        id: NodeId,
    ) -> Result<(u64, TreeEvent), NestedSetError> {
        let node = load(tx, id).await?;
        let span = node.interval();

        let removed = tx.delete_range(&node.scope, span).await?;
        boundary_mutator::close_gap(tx, &node.scope, span).await?;

        debug!(node_id = %id, removed, scope = %node.scope, "Deleted subtree");

        Ok((
            removed,
            TreeEvent::SubtreeDeleted {
                scope: node.scope,
                root_id: id,
                removed,
                span,
            },
        ))
    }
}

async fn load(tx: &mut dyn StoreTransaction, id: NodeId) -> Result<Node, NestedSetError> {
    tx.get_node(id)
        .await?
        .ok_or_else(|| NestedSetError::not_found(id))
}

/// Commit on success, roll back on failure
///
/// A failed rollback is logged; the original error is returned either way.
async fn finish<T>(
    tx: Box<dyn StoreTransaction>,
    result: Result<T, NestedSetError>,
) -> Result<T, NestedSetError> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!("Failed to roll back after '{}': {}", err, rollback_err);
            }
            Err(err)
        }
    }
}
