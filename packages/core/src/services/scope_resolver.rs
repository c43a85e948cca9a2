//! Scope Resolver
//!
//! Turns caller-supplied scope mappings into canonical `ScopeKey`s (declared column
//! order, every declared column present, nothing else) and enforces the rule that
//! acting and reference nodes share a scope.

use crate::config::TreeTableConfig;
use crate::db::ScopedQuery;
use crate::models::{ScopeKey, ScopeValue};
use crate::services::NestedSetError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeResolver {
    columns: Vec<String>,
}

impl ScopeResolver {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }

    pub fn from_config(config: &TreeTableConfig) -> Self {
        Self::new(config.scope_columns.clone())
    }

    /// Declared scope columns, in key order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Build a canonical key from `(column, value)` pairs given in any order
    ///
    /// # Errors
    ///
    /// `InvalidScope` when a declared column is missing or an undeclared one is given.
    pub fn resolve<I, K, V>(&self, mapping: I) -> Result<ScopeKey, NestedSetError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<ScopeValue>,
    {
        self.normalize(&mapping.into_iter().collect())
    }

    /// Reorder `key` into declared column order, rejecting missing or unknown columns
    pub fn normalize(&self, key: &ScopeKey) -> Result<ScopeKey, NestedSetError> {
        if let Some(unknown) = key
            .columns()
            .find(|column| !self.columns.iter().any(|declared| declared == column))
        {
            return Err(NestedSetError::invalid_scope(format!(
                "column '{}' is not a scope column (expected {:?})",
                unknown, self.columns
            )));
        }

        let mut canonical = ScopeKey::new();
        for column in &self.columns {
            let value = key.get(column).ok_or_else(|| {
                NestedSetError::invalid_scope(format!(
                    "scope {} is missing column '{}'",
                    key, column
                ))
            })?;
            canonical = canonical.with(column.clone(), value.clone());
        }
        Ok(canonical)
    }

    /// Exact pairwise comparison; `2` and `"2"` differ
    pub fn ensure_same_scope(acting: &ScopeKey, reference: &ScopeKey) -> Result<(), NestedSetError> {
        if acting == reference {
            Ok(())
        } else {
            Err(NestedSetError::scope_violation(acting, reference))
        }
    }

    /// Query over every row of the scope named by `mapping`
    pub fn scoped(&self, mapping: &ScopeKey) -> Result<ScopedQuery, NestedSetError> {
        Ok(ScopedQuery::new(self.normalize(mapping)?))
    }
}
