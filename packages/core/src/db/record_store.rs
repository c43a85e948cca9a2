//! RecordStore Trait - Persistence Abstraction Layer
//!
//! This module defines the `RecordStore` and `StoreTransaction` traits the nested-set
//! engine runs against. The engine never issues SQL itself: it plans boundary shifts
//! and hands them to a store, which decides how to execute them.
//!
//! # Architecture
//!
//! - **Abstraction Point**: Between `NestedSetService` (tree rules) and the backend
//! - **Reads**: `RecordStore` serves snapshot-free reads (queries, lookups)
//! - **Writes**: every structural change goes through a `StoreTransaction`, which
//!   must provide at least read-committed isolation and exclude concurrent writers
//!   to the same scope until commit
//!
//! # Design Decisions
//!
//! 1. **Async-First**: All methods are async so embedded and networked backends fit
//! 2. **Typed Errors**: Methods return `DatabaseError`; the service maps them
//! 3. **Pre-operation semantics**: `shift_boundaries` must evaluate every rule of a
//!    plan against the values stored before the call
//!
//! # Examples
//!
//! ```rust,no_run
//! use nestedset_core::config::TreeTableConfig;
//! use nestedset_core::db::{LibsqlStore, RecordStore, ScopedQuery};
//! use nestedset_core::models::ScopeKey;
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = TreeTableConfig::scoped("menu_items", ["menu_id"]);
//!     let store: Arc<dyn RecordStore> =
//!         Arc::new(LibsqlStore::new(PathBuf::from("./data/menus.db"), config).await?);
//!
//!     let scope = ScopeKey::new().with("menu_id", 1);
//!     let roots = store.fetch_nodes(&ScopedQuery::new(scope).roots()).await?;
//!     println!("{} roots", roots.len());
//!     Ok(())
//! }
//! ```

use crate::db::{DatabaseError, ScopedQuery};
use crate::interval::{BoundaryPlan, Interval};
use crate::models::{Node, NodeId, ScopeKey};
use async_trait::async_trait;
use serde_json::Value;

/// Row to insert through [`StoreTransaction::insert_node`]
#[derive(Debug, Clone, Copy)]
pub struct NewRow<'a> {
    pub scope: &'a ScopeKey,
    pub interval: Interval,
    pub parent_id: Option<NodeId>,
    pub payload: &'a Value,
}

/// Abstraction over the table holding nested-set rows
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the service shares one store across tasks.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Get a node by id, regardless of scope
    ///
    /// # Returns
    ///
    /// - `Ok(Some(node))` if the row exists
    /// - `Ok(None)` if it doesn't (not an error)
    async fn get_node(&self, id: NodeId) -> Result<Option<Node>, DatabaseError>;

    /// Run a scoped query
    async fn fetch_nodes(&self, query: &ScopedQuery) -> Result<Vec<Node>, DatabaseError>;

    /// Every distinct scope key present in the table
    async fn list_scopes(&self) -> Result<Vec<ScopeKey>, DatabaseError>;

    /// Open a write transaction
    ///
    /// The returned transaction holds whatever lock the backend uses to serialise
    /// structural writes until `commit` or `rollback`.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, DatabaseError>;
}

/// One atomic unit of structural change
///
/// Dropping a transaction without committing must discard its writes.
#[async_trait]
pub trait StoreTransaction: Send {
    async fn get_node(&mut self, id: NodeId) -> Result<Option<Node>, DatabaseError>;

    async fn fetch_nodes(&mut self, query: &ScopedQuery) -> Result<Vec<Node>, DatabaseError>;

    /// Highest `rgt` in the scope, `None` for an empty scope
    async fn max_rgt(&mut self, scope: &ScopeKey) -> Result<Option<i64>, DatabaseError>;

    /// Apply a shift plan to the `lft` and `rgt` columns of every row in `scope`
    ///
    /// Returns the number of rows touched.
    async fn shift_boundaries(
        &mut self,
        scope: &ScopeKey,
        plan: &BoundaryPlan,
    ) -> Result<u64, DatabaseError>;

    /// Insert a row and return its generated id
    async fn insert_node(&mut self, row: NewRow<'_>) -> Result<NodeId, DatabaseError>;

    async fn set_parent(&mut self, id: NodeId, parent: Option<NodeId>)
        -> Result<(), DatabaseError>;

    /// Overwrite boundaries and parent of one row (rebuilds)
    async fn set_position(
        &mut self,
        id: NodeId,
        interval: Interval,
        parent: Option<NodeId>,
    ) -> Result<(), DatabaseError>;

    async fn set_payload(&mut self, id: NodeId, payload: &Value) -> Result<(), DatabaseError>;

    /// Delete every row of `scope` whose `lft` lies in `range`
    async fn delete_range(
        &mut self,
        scope: &ScopeKey,
        range: Interval,
    ) -> Result<u64, DatabaseError>;

    async fn delete_node(&mut self, id: NodeId) -> Result<u64, DatabaseError>;

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError>;

    async fn rollback(self: Box<Self>) -> Result<(), DatabaseError>;
}
