//! Configuration for a nested-set table
use serde::{Deserialize, Serialize};

/// Default SQLite busy timeout, matching the connection helper
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// Layout of the table holding the tree rows
///
/// Column names are interpolated into SQL, so `validate()` only accepts plain
/// identifiers (`[A-Za-z_][A-Za-z0-9_]*`).
///
/// # Examples
///
/// ```rust
/// use nestedset_core::config::TreeTableConfig;
///
/// let config = TreeTableConfig::scoped("menu_items", ["menu_id"]);
/// assert!(config.validate().is_ok());
/// assert_eq!(config.boundary_offset, 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeTableConfig {
    /// Table name
    pub table: String,

    pub id_column: String,

    pub lft_column: String,

    pub rgt_column: String,

    pub parent_column: String,

    /// JSON text column holding the domain attributes
    pub payload_column: String,

    /// Columns forming the scope key, in key order (empty = one global tree)
    pub scope_columns: Vec<String>,

    /// First boundary value of every scope
    pub boundary_offset: i64,

    /// How long a writer waits on a locked database before failing
    pub busy_timeout_ms: u64,

    /// Buffered tree events per subscriber
    pub event_capacity: usize,
}

impl Default for TreeTableConfig {
    fn default() -> Self {
        Self {
            table: "nodes".to_string(),
            id_column: "id".to_string(),
            lft_column: "lft".to_string(),
            rgt_column: "rgt".to_string(),
            parent_column: "parent_id".to_string(),
            payload_column: "payload".to_string(),
            scope_columns: Vec::new(),
            boundary_offset: 1,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            event_capacity: 256,
        }
    }
}

impl TreeTableConfig {
    /// Default column layout for `table`, partitioned by `scope_columns`
    pub fn scoped<I, S>(table: impl Into<String>, scope_columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            table: table.into(),
            scope_columns: scope_columns.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Every column the engine reads or writes, scope columns last
    pub fn all_columns(&self) -> Vec<&str> {
        let mut columns = vec![
            self.id_column.as_str(),
            self.lft_column.as_str(),
            self.rgt_column.as_str(),
            self.parent_column.as_str(),
            self.payload_column.as_str(),
        ];
        columns.extend(self.scope_columns.iter().map(String::as_str));
        columns
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !is_sql_identifier(&self.table) {
            return Err(format!("table name '{}' is not a plain identifier", self.table));
        }

        let columns = self.all_columns();
        for column in &columns {
            if !is_sql_identifier(column) {
                return Err(format!("column name '{}' is not a plain identifier", column));
            }
        }

        for (i, column) in columns.iter().enumerate() {
            if columns[..i]
                .iter()
                .any(|other| other.eq_ignore_ascii_case(column))
            {
                return Err(format!("column '{}' is configured more than once", column));
            }
        }

        if self.event_capacity == 0 {
            return Err("event_capacity must be greater than 0".to_string());
        }

        Ok(())
    }
}

fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
