//! Scoped Nested-Set Index
//!
//! This crate maintains nested-set (modified preorder tree traversal) boundaries over
//! hierarchical rows stored in one flat table, partitioned into independent forests
//! by a scope key such as `menu_id`.
//!
//! # Architecture
//!
//! - **Pure interval arithmetic**: every structural change is planned as a list of
//!   boundary shifts before anything is written
//! - **Scope isolation**: every shift is filtered by the acting node's scope key
//! - **Pluggable store**: the engine talks to an async `RecordStore`; `LibsqlStore`
//!   is the embedded libsql/SQLite implementation
//!
//! # Modules
//!
//! - [`interval`] - Boundary planning (gaps, moves, rebuild numbering)
//! - [`models`] - Row model, scope keys, placement inputs
//! - [`db`] - Record store traits, scoped queries, libsql backend
//! - [`services`] - `NestedSetService`, validator, rebuilder, events
//! - [`config`] - Table layout configuration

pub mod config;
pub mod db;
pub mod interval;
pub mod models;
pub mod services;

// Re-export commonly used types
pub use config::TreeTableConfig;
pub use db::{DatabaseError, LibsqlStore, RecordStore, ScopedQuery};
pub use interval::{Interval, IntervalError};
pub use models::*;
pub use services::{
    MovePosition, NestedSetError, NestedSetService, RebuildSummary, TreeEvent, TreeReport,
};
