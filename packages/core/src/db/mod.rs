//! Database Layer
//!
//! This module handles all persistence for the nested-set engine:
//!
//! - `RecordStore` / `StoreTransaction` - async traits the engine runs against
//! - `ScopedQuery` - backend-neutral description of a scoped read
//! - `LibsqlStore` - embedded libsql/SQLite implementation
//!
//! # Architecture
//!
//! The engine never talks to a database directly. Structural operations plan their
//! boundary shifts with [`crate::interval`] and hand them to a `StoreTransaction`;
//! every statement a store issues is filtered by the scope key of the acting node.

mod error;
mod libsql_store;
pub mod query;
mod record_store;

pub use error::DatabaseError;
pub use libsql_store::{LibsqlStore, LibsqlTransaction};
pub use query::{Comparison, Order, Predicate, ScopedQuery};
pub use record_store::{NewRow, RecordStore, StoreTransaction};
