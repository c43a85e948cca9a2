//! Tree Validator
//!
//! Diagnostic checks over the rows of one scope. Nothing here runs on the write
//! path; `NestedSetService::count_errors` loads a scope and hands it to [`inspect`].

use crate::models::{Node, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Per-category error counts for one scope
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeReport {
    /// Rows with `lft >= rgt` or an odd-sized interval
    pub oddness: usize,

    /// Extra occurrences of a boundary value already used
    pub duplicates: usize,

    /// Values missing from the `offset..offset + 2n` sequence
    pub gaps: usize,

    /// Intervals that partially overlap an earlier one
    pub overlaps: usize,

    /// Rows whose closest enclosing interval is not their parent
    pub wrong_parent: usize,

    /// Rows whose parent id does not exist in the scope
    pub missing_parent: usize,
}

impl TreeReport {
    pub fn total(&self) -> usize {
        self.oddness
            + self.duplicates
            + self.gaps
            + self.overlaps
            + self.wrong_parent
            + self.missing_parent
    }

    pub fn is_broken(&self) -> bool {
        self.total() > 0
    }
}

impl fmt::Display for TreeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "oddness={} duplicates={} gaps={} overlaps={} wrong_parent={} missing_parent={}",
            self.oddness,
            self.duplicates,
            self.gaps,
            self.overlaps,
            self.wrong_parent,
            self.missing_parent
        )
    }
}

/// Check the rows of a single scope
///
/// `nodes` may come in any order. Boundaries must form the gapless sequence
/// `offset, offset + 1, ..., offset + 2n - 1`, intervals must nest, and each
/// parent must be the closest enclosing interval.
pub fn inspect(nodes: &[Node], offset: i64) -> TreeReport {
    let mut report = TreeReport::default();

    let mut seen: HashMap<i64, usize> = HashMap::with_capacity(nodes.len() * 2);
    for node in nodes {
        if node.lft >= node.rgt || (node.rgt - node.lft) % 2 == 0 {
            report.oddness += 1;
        }
        *seen.entry(node.lft).or_default() += 1;
        *seen.entry(node.rgt).or_default() += 1;
    }

    report.duplicates = seen.values().map(|count| count - 1).sum();

    let expected_end = offset + 2 * nodes.len() as i64;
    report.gaps = (offset..expected_end)
        .filter(|value| !seen.contains_key(value))
        .count();

    let ids: HashSet<NodeId> = nodes.iter().map(|node| node.id).collect();

    let mut ordered: Vec<&Node> = nodes.iter().collect();
    ordered.sort_by(|a, b| a.lft.cmp(&b.lft).then(b.rgt.cmp(&a.rgt)));

    let mut open: Vec<&Node> = Vec::new();
    for node in ordered {
        while open.last().is_some_and(|top| top.rgt < node.lft) {
            open.pop();
        }

        let enclosing = match open.last() {
            Some(top) if node.rgt < top.rgt => Some(top.id),
            Some(_) => {
                report.overlaps += 1;
                None
            }
            None => None,
        };

        match node.parent_id {
            Some(parent) if !ids.contains(&parent) => report.missing_parent += 1,
            Some(parent) if enclosing != Some(parent) => report.wrong_parent += 1,
            None if enclosing.is_some() => report.wrong_parent += 1,
            _ => {}
        }

        open.push(node);
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScopeKey;
    use serde_json::json;

    fn node(id: i64, lft: i64, rgt: i64, parent: Option<i64>) -> Node {
        Node {
            id: NodeId(id),
            lft,
            rgt,
            parent_id: parent.map(NodeId),
            depth: None,
            scope: ScopeKey::new().with("menu_id", 1),
            payload: json!({}),
        }
    }

    fn menu_one() -> Vec<Node> {
        vec![
            node(1, 1, 2, None),
            node(2, 3, 6, None),
            node(5, 4, 5, Some(2)),
        ]
    }

    #[test]
    fn test_consistent_scope() {
        let report = inspect(&menu_one(), 1);
        assert_eq!(report, TreeReport::default());
        assert!(!report.is_broken());
    }

    #[test]
    fn test_empty_scope_is_consistent() {
        assert!(!inspect(&[], 1).is_broken());
    }

    #[test]
    fn test_gap_after_manual_edit() {
        let mut nodes = menu_one();
        nodes[1].rgt = 7;

        let report = inspect(&nodes, 1);
        assert_eq!(report.oddness, 1);
        assert_eq!(report.gaps, 1);
        assert!(report.is_broken());
    }

    #[test]
    fn test_duplicates_and_overlap() {
        let nodes = vec![node(1, 1, 4, None), node(2, 3, 6, None)];
        let report = inspect(&nodes, 1);
        assert_eq!(report.overlaps, 1);
        assert_eq!(report.duplicates, 0);

        let nodes = vec![node(1, 1, 2, None), node(2, 1, 2, None)];
        let report = inspect(&nodes, 1);
        assert_eq!(report.duplicates, 2);
        assert_eq!(report.gaps, 2);
    }

    #[test]
    fn test_parent_pointer_errors() {
        let nodes = vec![
            node(1, 1, 6, None),
            node(2, 2, 5, Some(1)),
            // nested inside 2, but claims 1
            node(3, 3, 4, Some(1)),
            node(4, 7, 8, Some(99)),
        ];
        let report = inspect(&nodes, 1);
        assert_eq!(report.wrong_parent, 1);
        assert_eq!(report.missing_parent, 1);

        let nested_root = vec![node(1, 1, 4, None), node(2, 2, 3, None)];
        assert_eq!(inspect(&nested_root, 1).wrong_parent, 1);
    }

    #[test]
    fn test_respects_offset() {
        let nodes = vec![node(1, 0, 1, None)];
        assert!(!inspect(&nodes, 0).is_broken());
        assert_eq!(inspect(&nodes, 1).gaps, 1);
    }
}
