//! LibsqlStore - RecordStore Implementation for libsql/SQLite
//!
//! This module implements the `RecordStore` trait on top of an embedded libsql
//! database holding one nested-set table.
//!
//! # Architecture
//!
//! - **Configurable layout**: table and column names come from `TreeTableConfig`
//! - **Typeless scope columns**: scope columns are declared without a type, so SQLite
//!   applies no affinity and `2` never equals `'2'`
//! - **WAL mode**: Write-Ahead Logging so readers don't block the single writer
//! - **`BEGIN IMMEDIATE`**: every write transaction takes the database write lock up
//!   front, so two structural operations can never interleave their read-then-shift
//!
//! # Connection Pattern
//!
//! Every operation opens its connection through `connect_with_timeout()`, which sets
//! the busy timeout so concurrent writers wait instead of failing with `SQLITE_BUSY`.
//!
//! # Examples
//!
//! ```rust,no_run
//! use nestedset_core::config::TreeTableConfig;
//! use nestedset_core::db::LibsqlStore;
//! use std::path::PathBuf;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = TreeTableConfig::scoped("menu_items", ["menu_id"]);
//! let store = LibsqlStore::new(PathBuf::from("./data/menus.db"), config).await?;
//! # Ok(())
//! # }
//! ```

use crate::config::TreeTableConfig;
use crate::db::query::{Order, Predicate};
use crate::db::record_store::{NewRow, RecordStore, StoreTransaction};
use crate::db::{DatabaseError, ScopedQuery};
use crate::interval::{BoundaryPlan, Interval};
use crate::models::{Node, NodeId, ScopeKey, ScopeValue};
use async_trait::async_trait;
use libsql::{Builder, Connection, Database, Value as SqlValue};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

/// libsql-backed record store
#[derive(Debug, Clone)]
pub struct LibsqlStore {
    /// libsql database handle (wrapped in Arc for sharing)
    db: Arc<Database>,

    /// Path to the database file
    db_path: PathBuf,

    layout: Arc<TableLayout>,
}

impl LibsqlStore {
    /// Open (or create) the database at `db_path` and ensure the tree table exists
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if:
    /// - The configuration is invalid
    /// - Parent directory cannot be created
    /// - Database connection fails
    /// - Schema initialization fails
    pub async fn new(db_path: PathBuf, config: TreeTableConfig) -> Result<Self, DatabaseError> {
        config.validate().map_err(DatabaseError::InvalidConfig)?;

        let is_new_database = !db_path.exists();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::PermissionDenied {
                        DatabaseError::permission_denied(db_path.clone())
                    } else {
                        DatabaseError::DirectoryCreationFailed(e)
                    }
                })?;
            }
        }

        let db = Builder::new_local(&db_path)
            .build()
            .await
            .map_err(|e| DatabaseError::connection_failed(db_path.clone(), e))?;

        let store = Self {
            db: Arc::new(db),
            db_path,
            layout: Arc::new(TableLayout::new(config)),
        };

        store.initialize_schema(is_new_database).await?;

        Ok(store)
    }

    pub fn db_path(&self) -> &PathBuf {
        &self.db_path
    }

    pub fn config(&self) -> &TreeTableConfig {
        &self.layout.config
    }

    /// Get a raw connection without busy timeout
    ///
    /// Only for synchronous, single-threaded use; async code should call
    /// `connect_with_timeout()`.
    pub fn connect(&self) -> Result<Connection, DatabaseError> {
        self.db
            .connect()
            .map_err(|e| DatabaseError::connection_failed(self.db_path.clone(), e))
    }

    /// Get a connection with the configured busy timeout
    pub async fn connect_with_timeout(&self) -> Result<Connection, DatabaseError> {
        let conn = self.connect()?;
        execute_pragma(
            &conn,
            &format!("PRAGMA busy_timeout = {}", self.layout.config.busy_timeout_ms),
        )
        .await?;
        Ok(conn)
    }

    /// Create the tree table and its indexes (idempotent)
    async fn initialize_schema(&self, is_new_database: bool) -> Result<(), DatabaseError> {
        let conn = self.connect_with_timeout().await?;
        let layout = &self.layout;

        execute_pragma(&conn, "PRAGMA journal_mode = WAL").await?;

        let mut columns = vec![format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", layout.id)];
        // No declared type: values keep their storage class
        columns.extend(layout.scope.iter().map(|(_, quoted)| quoted.clone()));
        columns.push(format!("{} INTEGER NOT NULL", layout.lft));
        columns.push(format!("{} INTEGER NOT NULL", layout.rgt));
        columns.push(format!("{} INTEGER", layout.parent));
        columns.push(format!("{} TEXT NOT NULL DEFAULT '{{}}'", layout.payload));

        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} ({})",
                layout.table,
                columns.join(", ")
            ),
            (),
        )
        .await
        .map_err(|e| {
            DatabaseError::initialization_failed(format!(
                "Failed to create table {}: {}",
                layout.config.table, e
            ))
        })?;

        let mut bounds_columns: Vec<String> =
            layout.scope.iter().map(|(_, quoted)| quoted.clone()).collect();
        bounds_columns.push(layout.lft.clone());
        bounds_columns.push(layout.rgt.clone());

        let indexes = [
            (
                format!("idx_{}_bounds", layout.config.table),
                bounds_columns.join(", "),
            ),
            (
                format!("idx_{}_parent", layout.config.table),
                layout.parent.clone(),
            ),
        ];

        for (name, columns) in indexes {
            conn.execute(
                &format!(
                    "CREATE INDEX IF NOT EXISTS {} ON {}({})",
                    quote(&name),
                    layout.table,
                    columns
                ),
                (),
            )
            .await
            .map_err(|e| {
                DatabaseError::initialization_failed(format!(
                    "Failed to create index '{}': {}",
                    name, e
                ))
            })?;
        }

        if is_new_database {
            execute_pragma(&conn, "PRAGMA wal_checkpoint(TRUNCATE)").await?;
        }

        Ok(())
    }
}

#[async_trait]
impl RecordStore for LibsqlStore {
    async fn get_node(&self, id: NodeId) -> Result<Option<Node>, DatabaseError> {
        let conn = self.connect_with_timeout().await?;
        query_node_by_id(&conn, &self.layout, id).await
    }

    async fn fetch_nodes(&self, query: &ScopedQuery) -> Result<Vec<Node>, DatabaseError> {
        let conn = self.connect_with_timeout().await?;
        query_nodes(&conn, &self.layout, query).await
    }

    async fn list_scopes(&self) -> Result<Vec<ScopeKey>, DatabaseError> {
        let conn = self.connect_with_timeout().await?;
        let layout = &self.layout;

        if layout.scope.is_empty() {
            let mut rows = conn
                .query(&format!("SELECT 1 FROM {} LIMIT 1", layout.table), ())
                .await
                .map_err(|e| DatabaseError::sql_execution(format!("Failed to list scopes: {}", e)))?;
            let has_rows = rows.next().await?.is_some();
            return Ok(if has_rows { vec![ScopeKey::new()] } else { Vec::new() });
        }

        let columns = layout
            .scope
            .iter()
            .map(|(_, quoted)| quoted.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT DISTINCT {columns} FROM {} ORDER BY {columns}",
            layout.table
        );

        let mut rows = conn
            .query(&sql, ())
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to list scopes: {}", e)))?;

        let mut scopes = Vec::new();
        while let Some(row) = rows.next().await? {
            let mut key = ScopeKey::new();
            for (i, (name, _)) in layout.scope.iter().enumerate() {
                key = key.with(name.clone(), decode_scope_value(&row, i as i32, name)?);
            }
            scopes.push(key);
        }
        Ok(scopes)
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, DatabaseError> {
        let conn = self.connect_with_timeout().await?;
        conn.execute("BEGIN IMMEDIATE", ()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to begin transaction: {}", e))
        })?;

        Ok(Box::new(LibsqlTransaction {
            conn,
            layout: Arc::clone(&self.layout),
        }))
    }
}

/// Write transaction on a dedicated connection
///
/// Dropping it without `commit` closes the connection, which rolls back.
pub struct LibsqlTransaction {
    conn: Connection,
    layout: Arc<TableLayout>,
}

#[async_trait]
impl StoreTransaction for LibsqlTransaction {
    async fn get_node(&mut self, id: NodeId) -> Result<Option<Node>, DatabaseError> {
        query_node_by_id(&self.conn, &self.layout, id).await
    }

    async fn fetch_nodes(&mut self, query: &ScopedQuery) -> Result<Vec<Node>, DatabaseError> {
        query_nodes(&self.conn, &self.layout, query).await
    }

    async fn max_rgt(&mut self, scope: &ScopeKey) -> Result<Option<i64>, DatabaseError> {
        let layout = &self.layout;
        let mut params = Vec::new();
        let filter = layout.scope_filter(None, scope, &mut params)?;
        let sql = format!("SELECT MAX({}) FROM {} WHERE {}", layout.rgt, layout.table, filter);

        let mut rows = self
            .conn
            .query(&sql, libsql::params_from_iter(params))
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to read max rgt: {}", e)))?;

        match rows.next().await? {
            Some(row) => row
                .get::<Option<i64>>(0)
                .map_err(|e| DatabaseError::decode(format!("max rgt: {}", e))),
            None => Ok(None),
        }
    }

    async fn shift_boundaries(
        &mut self,
        scope: &ScopeKey,
        plan: &BoundaryPlan,
    ) -> Result<u64, DatabaseError> {
        let Some((sql, params)) = self.layout.render_shift(scope, plan)? else {
            return Ok(0);
        };

        self.conn
            .execute(&sql, libsql::params_from_iter(params))
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to shift boundaries: {}", e)))
    }

    async fn insert_node(&mut self, row: NewRow<'_>) -> Result<NodeId, DatabaseError> {
        let layout = &self.layout;
        let mut columns = Vec::new();
        let mut params = Vec::new();

        layout.check_scope(row.scope)?;
        for ((_, quoted), (_, value)) in layout.scope.iter().zip(row.scope.iter()) {
            columns.push(quoted.clone());
            params.push(scope_param(value));
        }
        columns.push(layout.lft.clone());
        params.push(SqlValue::Integer(row.interval.lft));
        columns.push(layout.rgt.clone());
        params.push(SqlValue::Integer(row.interval.rgt));
        columns.push(layout.parent.clone());
        params.push(id_param(row.parent_id));
        columns.push(layout.payload.clone());
        params.push(SqlValue::Text(row.payload.to_string()));

        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            layout.table,
            columns.join(", "),
            placeholders
        );

        self.conn
            .execute(&sql, libsql::params_from_iter(params))
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to insert node: {}", e)))?;

        Ok(NodeId(self.conn.last_insert_rowid()))
    }

    async fn set_parent(
        &mut self,
        id: NodeId,
        parent: Option<NodeId>,
    ) -> Result<(), DatabaseError> {
        let layout = &self.layout;
        let sql = format!(
            "UPDATE {} SET {} = ? WHERE {} = ?",
            layout.table, layout.parent, layout.id
        );
        self.conn
            .execute(&sql, libsql::params_from_iter(vec![id_param(parent), SqlValue::Integer(id.0)]))
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to set parent of {}: {}", id, e)))?;
        Ok(())
    }

    async fn set_position(
        &mut self,
        id: NodeId,
        interval: Interval,
        parent: Option<NodeId>,
    ) -> Result<(), DatabaseError> {
        let layout = &self.layout;
        let sql = format!(
            "UPDATE {} SET {} = ?, {} = ?, {} = ? WHERE {} = ?",
            layout.table, layout.lft, layout.rgt, layout.parent, layout.id
        );
        let params = vec![
            SqlValue::Integer(interval.lft),
            SqlValue::Integer(interval.rgt),
            id_param(parent),
            SqlValue::Integer(id.0),
        ];
        self.conn
            .execute(&sql, libsql::params_from_iter(params))
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to reposition node {}: {}", id, e))
            })?;
        Ok(())
    }

    async fn set_payload(&mut self, id: NodeId, payload: &Value) -> Result<(), DatabaseError> {
        let layout = &self.layout;
        let sql = format!(
            "UPDATE {} SET {} = ? WHERE {} = ?",
            layout.table, layout.payload, layout.id
        );
        let params = vec![SqlValue::Text(payload.to_string()), SqlValue::Integer(id.0)];
        self.conn
            .execute(&sql, libsql::params_from_iter(params))
            .await
            .map_err(|e| {
                DatabaseError::sql_execution(format!("Failed to update payload of {}: {}", id, e))
            })?;
        Ok(())
    }

    async fn delete_range(
        &mut self,
        scope: &ScopeKey,
        range: Interval,
    ) -> Result<u64, DatabaseError> {
        let layout = &self.layout;
        let mut params = Vec::new();
        let filter = layout.scope_filter(None, scope, &mut params)?;
        let sql = format!(
            "DELETE FROM {} WHERE {} AND {} BETWEEN ? AND ?",
            layout.table, filter, layout.lft
        );
        params.push(SqlValue::Integer(range.lft));
        params.push(SqlValue::Integer(range.rgt));

        self.conn
            .execute(&sql, libsql::params_from_iter(params))
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to delete subtree: {}", e)))
    }

    async fn delete_node(&mut self, id: NodeId) -> Result<u64, DatabaseError> {
        let layout = &self.layout;
        let sql = format!("DELETE FROM {} WHERE {} = ?", layout.table, layout.id);
        self.conn
            .execute(&sql, [id.0])
            .await
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to delete node {}: {}", id, e)))
    }

    async fn commit(self: Box<Self>) -> Result<(), DatabaseError> {
        if let Err(e) = self.conn.execute("COMMIT", ()).await {
            if let Err(rollback_err) = self.conn.execute("ROLLBACK", ()).await {
                warn!("Failed to roll back after failed commit '{}': {}", e, rollback_err);
            }
            return Err(DatabaseError::sql_execution(format!(
                "Failed to commit transaction: {}",
                e
            )));
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DatabaseError> {
        self.conn.execute("ROLLBACK", ()).await.map_err(|e| {
            DatabaseError::sql_execution(format!("Failed to roll back transaction: {}", e))
        })?;
        Ok(())
    }
}

/// Quoted identifiers and SQL rendering for one configured table
#[derive(Debug)]
struct TableLayout {
    config: TreeTableConfig,
    table: String,
    id: String,
    lft: String,
    rgt: String,
    parent: String,
    payload: String,
    /// (raw name, quoted name) in key order
    scope: Vec<(String, String)>,
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier)
}

fn id_param(id: Option<NodeId>) -> SqlValue {
    match id {
        Some(id) => SqlValue::Integer(id.0),
        None => SqlValue::Null,
    }
}

fn scope_param(value: &ScopeValue) -> SqlValue {
    match value {
        ScopeValue::Integer(v) => SqlValue::Integer(*v),
        ScopeValue::Text(v) => SqlValue::Text(v.clone()),
    }
}

impl TableLayout {
    fn new(config: TreeTableConfig) -> Self {
        Self {
            table: quote(&config.table),
            id: quote(&config.id_column),
            lft: quote(&config.lft_column),
            rgt: quote(&config.rgt_column),
            parent: quote(&config.parent_column),
            payload: quote(&config.payload_column),
            scope: config
                .scope_columns
                .iter()
                .map(|name| (name.clone(), quote(name)))
                .collect(),
            config,
        }
    }

    /// The key must carry exactly the configured scope columns, in order
    fn check_scope(&self, scope: &ScopeKey) -> Result<(), DatabaseError> {
        let matches = scope.len() == self.scope.len()
            && scope
                .columns()
                .zip(self.scope.iter())
                .all(|(column, (name, _))| column == name);
        if matches {
            Ok(())
        } else {
            Err(DatabaseError::ScopeMismatch(format!(
                "expected columns {:?}, got {}",
                self.config.scope_columns, scope
            )))
        }
    }

    fn column(alias: Option<&str>, quoted: &str) -> String {
        match alias {
            Some(alias) => format!("{}.{}", alias, quoted),
            None => quoted.to_string(),
        }
    }

    /// `scope_col = ? AND ...`, pushing the scope values onto `params`
    fn scope_filter(
        &self,
        alias: Option<&str>,
        scope: &ScopeKey,
        params: &mut Vec<SqlValue>,
    ) -> Result<String, DatabaseError> {
        self.check_scope(scope)?;
        if self.scope.is_empty() {
            return Ok("1 = 1".to_string());
        }

        let clauses: Vec<String> = self
            .scope
            .iter()
            .zip(scope.iter())
            .map(|((_, quoted), (_, value))| {
                params.push(scope_param(value));
                format!("{} = ?", Self::column(alias, quoted))
            })
            .collect();
        Ok(clauses.join(" AND "))
    }

    fn select_list(&self, with_depth: bool) -> String {
        let mut columns = vec![
            Self::column(Some("n"), &self.id),
            Self::column(Some("n"), &self.lft),
            Self::column(Some("n"), &self.rgt),
            Self::column(Some("n"), &self.parent),
            Self::column(Some("n"), &self.payload),
        ];
        columns.extend(
            self.scope
                .iter()
                .map(|(_, quoted)| Self::column(Some("n"), quoted)),
        );

        if with_depth {
            let mut conditions = vec![
                format!("a.{} < n.{}", self.lft, self.lft),
                format!("a.{} > n.{}", self.rgt, self.rgt),
            ];
            conditions.extend(
                self.scope
                    .iter()
                    .map(|(_, quoted)| format!("a.{} = n.{}", quoted, quoted)),
            );
            columns.push(format!(
                "(SELECT COUNT(*) FROM {} AS a WHERE {})",
                self.table,
                conditions.join(" AND ")
            ));
        }

        columns.join(", ")
    }

    fn render_query(&self, query: &ScopedQuery) -> Result<(String, Vec<SqlValue>), DatabaseError> {
        let mut params = Vec::new();
        let filter = self.scope_filter(Some("n"), query.scope(), &mut params)?;
        let mut sql = format!(
            "SELECT {} FROM {} AS n WHERE {}",
            self.select_list(query.includes_depth()),
            self.table,
            filter
        );

        for predicate in query.predicates() {
            match predicate {
                Predicate::Id(id) => {
                    sql.push_str(&format!(" AND n.{} = ?", self.id));
                    params.push(SqlValue::Integer(id.0));
                }
                Predicate::NotId(id) => {
                    sql.push_str(&format!(" AND n.{} <> ?", self.id));
                    params.push(SqlValue::Integer(id.0));
                }
                Predicate::Parent(Some(parent)) => {
                    sql.push_str(&format!(" AND n.{} = ?", self.parent));
                    params.push(SqlValue::Integer(parent.0));
                }
                Predicate::Parent(None) => {
                    sql.push_str(&format!(" AND n.{} IS NULL", self.parent));
                }
                Predicate::Lft(comparison, value) => {
                    sql.push_str(&format!(" AND n.{} {} ?", self.lft, comparison.as_sql()));
                    params.push(SqlValue::Integer(*value));
                }
                Predicate::Rgt(comparison, value) => {
                    sql.push_str(&format!(" AND n.{} {} ?", self.rgt, comparison.as_sql()));
                    params.push(SqlValue::Integer(*value));
                }
                Predicate::Leaf => {
                    sql.push_str(&format!(" AND n.{} = n.{} + 1", self.rgt, self.lft));
                }
            }
        }

        let direction = match query.order() {
            Order::LftAsc => "ASC",
            Order::LftDesc => "DESC",
        };
        sql.push_str(&format!(" ORDER BY n.{} {}", self.lft, direction));

        if let Some(limit) = query.limit() {
            sql.push_str(" LIMIT ?");
            params.push(SqlValue::Integer(limit as i64));
        }

        Ok((sql, params))
    }

    /// One UPDATE whose `lft`/`rgt` CASE expressions read only pre-update values
    fn render_shift(
        &self,
        scope: &ScopeKey,
        plan: &BoundaryPlan,
    ) -> Result<Option<(String, Vec<SqlValue>)>, DatabaseError> {
        let Some((low, high)) = plan.window() else {
            return Ok(None);
        };

        let mut params = Vec::new();
        let lft_case = Self::case_expression(&self.lft, plan, &mut params);
        let rgt_case = Self::case_expression(&self.rgt, plan, &mut params);
        let filter = self.scope_filter(None, scope, &mut params)?;

        let window = match high {
            Some(high) => {
                params.extend([
                    SqlValue::Integer(low),
                    SqlValue::Integer(high),
                    SqlValue::Integer(low),
                    SqlValue::Integer(high),
                ]);
                format!(
                    "({lft} BETWEEN ? AND ? OR {rgt} BETWEEN ? AND ?)",
                    lft = self.lft,
                    rgt = self.rgt
                )
            }
            None => {
                params.extend([SqlValue::Integer(low), SqlValue::Integer(low)]);
                format!("({} >= ? OR {} >= ?)", self.lft, self.rgt)
            }
        };

        let sql = format!(
            "UPDATE {} SET {} = {}, {} = {} WHERE {} AND {}",
            self.table, self.lft, lft_case, self.rgt, rgt_case, filter, window
        );
        Ok(Some((sql, params)))
    }

    fn case_expression(column: &str, plan: &BoundaryPlan, params: &mut Vec<SqlValue>) -> String {
        let mut sql = String::from("CASE");
        for shift in plan.shifts() {
            match shift.to {
                Some(to) => {
                    sql.push_str(&format!(" WHEN {column} BETWEEN ? AND ? THEN {column} + ?"));
                    params.extend([
                        SqlValue::Integer(shift.from),
                        SqlValue::Integer(to),
                        SqlValue::Integer(shift.delta),
                    ]);
                }
                None => {
                    sql.push_str(&format!(" WHEN {column} >= ? THEN {column} + ?"));
                    params.extend([SqlValue::Integer(shift.from), SqlValue::Integer(shift.delta)]);
                }
            }
        }
        sql.push_str(&format!(" ELSE {column} END"));
        sql
    }

    /// Convert a row produced by `select_list` into a `Node`
    ///
    /// Column order: id, lft, rgt, parent, payload, scope columns..., [depth]
    fn decode_row(&self, row: &libsql::Row, with_depth: bool) -> Result<Node, DatabaseError> {
        let id: i64 = row
            .get(0)
            .map_err(|e| DatabaseError::decode(format!("id: {}", e)))?;
        let lft: i64 = row
            .get(1)
            .map_err(|e| DatabaseError::decode(format!("lft of {}: {}", id, e)))?;
        let rgt: i64 = row
            .get(2)
            .map_err(|e| DatabaseError::decode(format!("rgt of {}: {}", id, e)))?;
        let parent_id: Option<i64> = row
            .get(3)
            .map_err(|e| DatabaseError::decode(format!("parent of {}: {}", id, e)))?;
        let payload_json: Option<String> = row
            .get(4)
            .map_err(|e| DatabaseError::decode(format!("payload of {}: {}", id, e)))?;

        let payload = match payload_json {
            Some(text) => serde_json::from_str(&text)
                .map_err(|e| DatabaseError::decode(format!("payload JSON of {}: {}", id, e)))?,
            None => Value::Object(Default::default()),
        };

        let mut scope = ScopeKey::new();
        for (i, (name, _)) in self.scope.iter().enumerate() {
            scope = scope.with(name.clone(), decode_scope_value(row, (5 + i) as i32, name)?);
        }

        let depth = if with_depth {
            let index = (5 + self.scope.len()) as i32;
            Some(
                row.get::<i64>(index)
                    .map_err(|e| DatabaseError::decode(format!("depth of {}: {}", id, e)))?,
            )
        } else {
            None
        };

        Ok(Node {
            id: NodeId(id),
            lft,
            rgt,
            parent_id: parent_id.map(NodeId),
            depth,
            scope,
            payload,
        })
    }
}

fn decode_scope_value(row: &libsql::Row, index: i32, column: &str) -> Result<ScopeValue, DatabaseError> {
    match row
        .get_value(index)
        .map_err(|e| DatabaseError::decode(format!("scope column {}: {}", column, e)))?
    {
        SqlValue::Integer(v) => Ok(ScopeValue::Integer(v)),
        SqlValue::Text(v) => Ok(ScopeValue::Text(v)),
        other => Err(DatabaseError::decode(format!(
            "scope column {} holds unsupported value {:?}",
            column, other
        ))),
    }
}

/// Execute a PRAGMA statement
///
/// PRAGMA statements return rows, so they go through query() instead of execute().
async fn execute_pragma(conn: &Connection, pragma: &str) -> Result<(), DatabaseError> {
    let mut stmt = conn.prepare(pragma).await.map_err(|e| {
        DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
    })?;
    let _ = stmt.query(()).await.map_err(|e| {
        DatabaseError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
    })?;
    Ok(())
}

async fn query_nodes(
    conn: &Connection,
    layout: &TableLayout,
    query: &ScopedQuery,
) -> Result<Vec<Node>, DatabaseError> {
    let (sql, params) = layout.render_query(query)?;

    let mut stmt = conn.prepare(&sql).await.map_err(|e| {
        DatabaseError::sql_execution(format!("Failed to prepare scoped query: {}", e))
    })?;
    let mut rows = stmt
        .query(libsql::params_from_iter(params))
        .await
        .map_err(|e| DatabaseError::sql_execution(format!("Failed to execute scoped query: {}", e)))?;

    let mut nodes = Vec::new();
    while let Some(row) = rows.next().await? {
        nodes.push(layout.decode_row(&row, query.includes_depth())?);
    }
    Ok(nodes)
}

async fn query_node_by_id(
    conn: &Connection,
    layout: &TableLayout,
    id: NodeId,
) -> Result<Option<Node>, DatabaseError> {
    let sql = format!(
        "SELECT {} FROM {} AS n WHERE n.{} = ?",
        layout.select_list(false),
        layout.table,
        layout.id
    );

    let mut stmt = conn.prepare(&sql).await.map_err(|e| {
        DatabaseError::sql_execution(format!("Failed to prepare get_node query: {}", e))
    })?;
    let mut rows = stmt.query([id.0]).await.map_err(|e| {
        DatabaseError::sql_execution(format!("Failed to execute get_node query: {}", e))
    })?;

    match rows.next().await? {
        Some(row) => Ok(Some(layout.decode_row(&row, false)?)),
        None => Ok(None),
    }
}
