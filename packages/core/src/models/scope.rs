//! Scope Keys
//!
//! A scope key is the ordered list of `(column, value)` pairs that partitions a shared
//! table into independent forests (e.g. `{menu_id: 2}`). Two rows belong to the same
//! tree only when their scope keys are equal pairwise, in order.
//!
//! Values are strongly typed: `ScopeValue::Integer(2)` and `ScopeValue::Text("2")` are
//! different scopes. No coercion happens anywhere in the engine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single scope attribute value
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScopeValue {
    Integer(i64),
    Text(String),
}

impl From<i64> for ScopeValue {
    fn from(value: i64) -> Self {
        ScopeValue::Integer(value)
    }
}

impl From<i32> for ScopeValue {
    fn from(value: i32) -> Self {
        ScopeValue::Integer(i64::from(value))
    }
}

impl From<&str> for ScopeValue {
    fn from(value: &str) -> Self {
        ScopeValue::Text(value.to_string())
    }
}

impl From<String> for ScopeValue {
    fn from(value: String) -> Self {
        ScopeValue::Text(value)
    }
}

impl fmt::Display for ScopeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeValue::Integer(v) => write!(f, "{}", v),
            ScopeValue::Text(v) => write!(f, "{:?}", v),
        }
    }
}

/// Ordered column → value mapping identifying one forest in a shared table
///
/// An empty key is valid and denotes the single global scope of an unscoped table.
///
/// # Examples
///
/// ```rust
/// use nestedset_core::models::{ScopeKey, ScopeValue};
///
/// let scope = ScopeKey::new().with("menu_id", 2);
/// assert_eq!(scope.get("menu_id"), Some(&ScopeValue::Integer(2)));
/// assert_ne!(scope, ScopeKey::new().with("menu_id", "2"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScopeKey(Vec<(String, ScopeValue)>);

impl ScopeKey {
    /// Create an empty (global) scope key
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Append a column/value pair, replacing an earlier value for the same column
    pub fn with(mut self, column: impl Into<String>, value: impl Into<ScopeValue>) -> Self {
        let column = column.into();
        let value = value.into();
        match self.0.iter_mut().find(|(name, _)| *name == column) {
            Some(entry) => entry.1 = value,
            None => self.0.push((column, value)),
        }
        self
    }

    pub fn get(&self, column: &str) -> Option<&ScopeValue> {
        self.0
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ScopeValue)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for ScopeKey
where
    K: Into<String>,
    V: Into<ScopeValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(ScopeKey::new(), |key, (column, value)| key.with(column, value))
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (column, value)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", column, value)?;
        }
        write!(f, "}}")
    }
}
