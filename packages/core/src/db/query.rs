//! Scoped Queries
//!
//! `ScopedQuery` is the read-side description handed to a [`RecordStore`]: a scope key
//! (always ANDed into the filter), interval predicates, ordering, and whether depth
//! should be computed. The traversal builders (`ancestors_of`, `descendants_of`,
//! `siblings_of`, ...) express tree relations purely as interval predicates.
//!
//! A query is only a description; stores render it (SQL for [`LibsqlStore`]).
//!
//! [`RecordStore`]: crate::db::RecordStore
//! [`LibsqlStore`]: crate::db::LibsqlStore

use crate::models::{Node, NodeId, ScopeKey};

/// Comparison operator for boundary predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Lt,
    Le,
    Eq,
    Ge,
    Gt,
}

impl Comparison {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Eq => "=",
            Comparison::Ge => ">=",
            Comparison::Gt => ">",
        }
    }
}

/// Row filter ANDed into a scoped query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    Id(NodeId),
    NotId(NodeId),
    /// `parent_id = ?`, or `parent_id IS NULL` for `None`
    Parent(Option<NodeId>),
    Lft(Comparison, i64),
    Rgt(Comparison, i64),
    /// `rgt = lft + 1`
    Leaf,
}

/// Result ordering, always by `lft`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Order {
    #[default]
    LftAsc,
    LftDesc,
}

/// Read query restricted to exactly one scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopedQuery {
    scope: ScopeKey,
    predicates: Vec<Predicate>,
    order: Order,
    with_depth: bool,
    limit: Option<u64>,
}

impl ScopedQuery {
    /// Every row of `scope`, in preorder
    pub fn new(scope: ScopeKey) -> Self {
        Self {
            scope,
            predicates: Vec::new(),
            order: Order::LftAsc,
            with_depth: false,
            limit: None,
        }
    }

    /// Query over the scope of `node`
    pub fn for_node(node: &Node) -> Self {
        Self::new(node.scope.clone())
    }

    pub fn scope(&self) -> &ScopeKey {
        &self.scope
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn order(&self) -> Order {
        self.order
    }

    pub fn includes_depth(&self) -> bool {
        self.with_depth
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn where_id(self, id: NodeId) -> Self {
        self.filter(Predicate::Id(id))
    }

    pub fn excluding(self, id: NodeId) -> Self {
        self.filter(Predicate::NotId(id))
    }

    pub fn where_parent(self, parent: Option<NodeId>) -> Self {
        self.filter(Predicate::Parent(parent))
    }

    pub fn where_lft(self, comparison: Comparison, value: i64) -> Self {
        self.filter(Predicate::Lft(comparison, value))
    }

    pub fn where_rgt(self, comparison: Comparison, value: i64) -> Self {
        self.filter(Predicate::Rgt(comparison, value))
    }

    pub fn roots(self) -> Self {
        self.where_parent(None)
    }

    pub fn leaves(self) -> Self {
        self.filter(Predicate::Leaf)
    }

    /// Rows whose interval strictly encloses `node`, root first
    pub fn ancestors_of(self, node: &Node) -> Self {
        self.where_lft(Comparison::Lt, node.lft)
            .where_rgt(Comparison::Gt, node.rgt)
    }

    pub fn ancestors_and_self_of(self, node: &Node) -> Self {
        self.where_lft(Comparison::Le, node.lft)
            .where_rgt(Comparison::Ge, node.rgt)
    }

    /// Rows strictly inside `node`'s interval, in preorder
    pub fn descendants_of(self, node: &Node) -> Self {
        self.where_lft(Comparison::Gt, node.lft)
            .where_lft(Comparison::Lt, node.rgt)
    }

    pub fn descendants_and_self_of(self, node: &Node) -> Self {
        self.where_lft(Comparison::Ge, node.lft)
            .where_lft(Comparison::Le, node.rgt)
    }

    pub fn children_of(self, node: &Node) -> Self {
        self.where_parent(Some(node.id))
    }

    /// Rows sharing `node`'s parent, excluding `node`
    pub fn siblings_of(self, node: &Node) -> Self {
        self.where_parent(node.parent_id).excluding(node.id)
    }

    pub fn next_siblings_of(self, node: &Node) -> Self {
        self.siblings_of(node).where_lft(Comparison::Gt, node.lft)
    }

    pub fn prev_siblings_of(self, node: &Node) -> Self {
        self.siblings_of(node).where_lft(Comparison::Lt, node.lft)
    }

    /// Annotate every row with its number of ancestors
    pub fn with_depth(mut self) -> Self {
        self.with_depth = true;
        self
    }

    pub fn reversed(mut self) -> Self {
        self.order = match self.order {
            Order::LftAsc => Order::LftDesc,
            Order::LftDesc => Order::LftAsc,
        };
        self
    }

    pub fn take(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node() -> Node {
        Node {
            id: NodeId(5),
            lft: 4,
            rgt: 5,
            parent_id: Some(NodeId(2)),
            depth: None,
            scope: ScopeKey::new().with("menu_id", 1),
            payload: json!({}),
        }
    }

    #[test]
    fn test_prev_siblings_predicates() {
        let n = node();
        let query = ScopedQuery::for_node(&n).prev_siblings_of(&n);

        assert_eq!(query.scope(), &n.scope);
        assert_eq!(
            query.predicates(),
            &[
                Predicate::Parent(Some(NodeId(2))),
                Predicate::NotId(NodeId(5)),
                Predicate::Lft(Comparison::Lt, 4),
            ]
        );
    }

    #[test]
    fn test_descendants_use_lft_window() {
        let n = node();
        let query = ScopedQuery::for_node(&n).descendants_of(&n);
        assert_eq!(
            query.predicates(),
            &[
                Predicate::Lft(Comparison::Gt, 4),
                Predicate::Lft(Comparison::Lt, 5),
            ]
        );
    }

    #[test]
    fn test_reversed_and_take() {
        let query = ScopedQuery::new(ScopeKey::new()).reversed().take(1).with_depth();
        assert_eq!(query.order(), Order::LftDesc);
        assert_eq!(query.limit(), Some(1));
        assert!(query.includes_depth());
        assert_eq!(query.reversed().order(), Order::LftAsc);
    }
}
