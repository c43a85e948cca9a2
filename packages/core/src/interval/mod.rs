//! Interval Arithmetic
//!
//! Pure boundary computations for the nested-set engine. Nothing in this module
//! performs I/O: every structural operation is first planned here as a
//! [`BoundaryPlan`] (an ordered list of [`Shift`] rules) and only then handed to the
//! store by the boundary mutator.
//!
//! # Shift Semantics
//!
//! A plan is applied to the `lft` and `rgt` columns independently. For each stored
//! boundary value the FIRST rule whose range contains the old value decides the
//! delta; values matched by no rule stay put. Because every rule is evaluated
//! against pre-operation values, a rule can never observe another rule's write.
//!
//! # Operations
//!
//! - [`root_slot`] - next free top-level interval of a scope
//! - [`Slot::position`] - boundary where a child/sibling insert or move lands
//! - [`open_gap`] / [`close_gap`] - make room for, or collapse, a subtree
//! - [`relocate`] - move a subtree to a new position in one relabelling
//! - [`outline_from_parents`] / [`number_forest`] - rebuild boundaries from structure

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use thiserror::Error;

/// Errors produced by boundary planning
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntervalError {
    #[error("Invalid interval [{lft}, {rgt}]: lft must be lower than rgt")]
    InvalidInterval { lft: i64, rgt: i64 },

    #[error("Cannot move interval [{lft}, {rgt}] to position {position} inside itself")]
    MoveIntoSelf { lft: i64, rgt: i64, position: i64 },
}

/// Closed boundary interval `[lft, rgt]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interval {
    pub lft: i64,
    pub rgt: i64,
}

impl Interval {
    pub fn new(lft: i64, rgt: i64) -> Result<Self, IntervalError> {
        if lft >= rgt {
            return Err(IntervalError::InvalidInterval { lft, rgt });
        }
        Ok(Self { lft, rgt })
    }

    /// Interval of a freshly inserted leaf
    pub const fn leaf(lft: i64) -> Self {
        Self { lft, rgt: lft + 1 }
    }

    /// Number of boundary values spanned, always even for a consistent subtree
    pub const fn width(&self) -> i64 {
        self.rgt - self.lft + 1
    }

    /// Strict containment: `other` lies entirely inside `self`
    pub const fn contains(&self, other: &Interval) -> bool {
        self.lft < other.lft && other.rgt < self.rgt
    }

    /// True when inserting at `position` would land inside this subtree
    pub const fn encloses_position(&self, position: i64) -> bool {
        self.lft < position && position <= self.rgt
    }
}

/// Shift every boundary in `[from, to]` (or `[from, ∞)` when `to` is `None`) by `delta`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shift {
    pub from: i64,
    pub to: Option<i64>,
    pub delta: i64,
}

impl Shift {
    pub const fn matches(&self, value: i64) -> bool {
        match self.to {
            Some(to) => self.from <= value && value <= to,
            None => self.from <= value,
        }
    }
}

/// Ordered shift rules for one structural operation; first matching rule wins
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundaryPlan {
    shifts: Vec<Shift>,
}

impl BoundaryPlan {
    pub fn new(shifts: Vec<Shift>) -> Self {
        Self {
            shifts: shifts.into_iter().filter(|s| s.delta != 0).collect(),
        }
    }

    pub fn shifts(&self) -> &[Shift] {
        &self.shifts
    }

    pub fn is_empty(&self) -> bool {
        self.shifts.is_empty()
    }

    /// New value of a single boundary under this plan
    pub fn apply(&self, value: i64) -> i64 {
        self.shifts
            .iter()
            .find(|shift| shift.matches(value))
            .map_or(value, |shift| value + shift.delta)
    }

    /// Smallest range covering every rule: `(lowest from, highest to)`, where an
    /// unbounded rule makes the upper end `None`
    pub fn window(&self) -> Option<(i64, Option<i64>)> {
        let low = self.shifts.iter().map(|s| s.from).min()?;
        let high = self
            .shifts
            .iter()
            .map(|s| s.to)
            .try_fold(i64::MIN, |acc, to| to.map(|t| acc.max(t)));
        Some((low, high))
    }
}

/// Where a node lands relative to an existing interval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    LastChildOf(Interval),
    FirstChildOf(Interval),
    Before(Interval),
    After(Interval),
}

impl Slot {
    /// Boundary value the placed node's `lft` takes in pre-operation coordinates
    pub const fn position(&self) -> i64 {
        match self {
            Slot::LastChildOf(parent) => parent.rgt,
            Slot::FirstChildOf(parent) => parent.lft + 1,
            Slot::Before(sibling) => sibling.lft,
            Slot::After(sibling) => sibling.rgt + 1,
        }
    }
}

/// Next free top-level interval: after the highest `rgt`, or at `offset` when empty
pub fn root_slot(max_rgt: Option<i64>, offset: i64) -> Interval {
    Interval::leaf(max_rgt.map_or(offset, |rgt| rgt + 1))
}

/// Make room for `height` boundary values at `cut`
pub fn open_gap(cut: i64, height: i64) -> BoundaryPlan {
    BoundaryPlan::new(vec![Shift {
        from: cut,
        to: None,
        delta: height,
    }])
}

/// Collapse the hole left by a removed subtree
pub fn close_gap(removed: Interval) -> BoundaryPlan {
    BoundaryPlan::new(vec![Shift {
        from: removed.rgt + 1,
        to: None,
        delta: -removed.width(),
    }])
}

/// Result of planning a subtree move
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovePlan {
    pub plan: BoundaryPlan,
    pub moved_to: Interval,
}

/// Plan moving `subject` so that its `lft` lands at `position` (pre-move coordinates)
///
/// The window `[from, to]` between the old and new location is relabelled in one
/// pass: the subtree shifts by the travelled distance, everything it passes over
/// shifts by its width in the opposite direction. Returns `Ok(None)` when the
/// subtree already occupies the target position.
pub fn relocate(subject: Interval, position: i64) -> Result<Option<MovePlan>, IntervalError> {
    if subject.encloses_position(position) {
        return Err(IntervalError::MoveIntoSelf {
            lft: subject.lft,
            rgt: subject.rgt,
            position,
        });
    }

    let from = subject.lft.min(position);
    let to = subject.rgt.max(position - 1);
    let height = subject.width();
    let distance = to - from + 1 - height;

    if distance == 0 {
        return Ok(None);
    }

    let (subject_delta, others_delta) = if position > subject.lft {
        (distance, -height)
    } else {
        (-distance, height)
    };

    let plan = BoundaryPlan::new(vec![
        Shift {
            from: subject.lft,
            to: Some(subject.rgt),
            delta: subject_delta,
        },
        Shift {
            from,
            to: Some(to),
            delta: others_delta,
        },
    ]);

    Ok(Some(MovePlan {
        plan,
        moved_to: Interval {
            lft: subject.lft + subject_delta,
            rgt: subject.rgt + subject_delta,
        },
    }))
}

/// Ordered tree of keys, children in sibling order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlineNode<K> {
    pub key: K,
    pub children: Vec<OutlineNode<K>>,
}

impl<K> OutlineNode<K> {
    pub fn leaf(key: K) -> Self {
        Self {
            key,
            children: Vec::new(),
        }
    }
}

/// Boundaries assigned to one key by [`number_forest`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Numbered<K> {
    pub key: K,
    pub parent: Option<K>,
    pub interval: Interval,
    pub depth: i64,
}

/// Build an outline from `(key, parent)` pairs given in sibling order
///
/// Keys whose parent is absent from `entries` (or is the key itself) become roots.
/// Keys only reachable through a parent cycle are promoted to roots in input order,
/// so every key appears exactly once in the result.
pub fn outline_from_parents<K>(entries: &[(K, Option<K>)]) -> Vec<OutlineNode<K>>
where
    K: Copy + Eq + Hash,
{
    let known: HashSet<K> = entries.iter().map(|(key, _)| *key).collect();
    let mut children: HashMap<K, Vec<K>> = HashMap::new();
    let mut roots = Vec::new();

    for (key, parent) in entries {
        match parent {
            Some(parent) if *parent != *key && known.contains(parent) => {
                children.entry(*parent).or_default().push(*key)
            }
            _ => roots.push(*key),
        }
    }

    let mut visited = HashSet::new();
    let mut outline: Vec<OutlineNode<K>> = roots
        .into_iter()
        .map(|key| expand(key, &children, &mut visited))
        .collect();

    for (key, _) in entries {
        if !visited.contains(key) {
            outline.push(expand(*key, &children, &mut visited));
        }
    }

    outline
}

fn expand<K>(key: K, children: &HashMap<K, Vec<K>>, visited: &mut HashSet<K>) -> OutlineNode<K>
where
    K: Copy + Eq + Hash,
{
    visited.insert(key);
    let mut node = OutlineNode::leaf(key);
    if let Some(kids) = children.get(&key) {
        for kid in kids {
            if !visited.contains(kid) {
                node.children.push(expand(*kid, children, visited));
            }
        }
    }
    node
}

/// Assign boundaries with a depth-first counter starting at `offset`
///
/// Entering a node takes `lft = counter++`; leaving it (after its children) takes
/// `rgt = counter++`. Results are in preorder, so parents precede their children.
pub fn number_forest<K: Copy>(roots: &[OutlineNode<K>], offset: i64) -> Vec<Numbered<K>> {
    let mut numbered = Vec::new();
    let mut counter = offset;
    for root in roots {
        number_subtree(root, None, 0, &mut counter, &mut numbered);
    }
    numbered
}

fn number_subtree<K: Copy>(
    node: &OutlineNode<K>,
    parent: Option<K>,
    depth: i64,
    counter: &mut i64,
    out: &mut Vec<Numbered<K>>,
) {
    let slot = out.len();
    out.push(Numbered {
        key: node.key,
        parent,
        interval: Interval::leaf(*counter),
        depth,
    });
    *counter += 1;

    for child in &node.children {
        number_subtree(child, Some(node.key), depth + 1, counter, out);
    }

    out[slot].interval.rgt = *counter;
    *counter += 1;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Apply a plan to a list of intervals, the way the store applies it to rows
    fn apply_all(plan: &BoundaryPlan, rows: &[Interval]) -> Vec<Interval> {
        rows.iter()
            .map(|row| Interval {
                lft: plan.apply(row.lft),
                rgt: plan.apply(row.rgt),
            })
            .collect()
    }

    #[test]
    fn test_root_slot() {
        assert_eq!(root_slot(None, 1), Interval { lft: 1, rgt: 2 });
        assert_eq!(root_slot(Some(6), 1), Interval { lft: 7, rgt: 8 });
        assert_eq!(root_slot(None, 0), Interval { lft: 0, rgt: 1 });
    }

    #[test]
    fn test_interval_new_rejects_inverted_bounds() {
        assert!(Interval::new(3, 3).is_err());
        assert!(Interval::new(4, 2).is_err());
        assert_eq!(Interval::new(1, 4).unwrap().width(), 4);
    }

    #[test]
    fn test_append_child_gap() {
        // root [1,2] gains a last child at its rgt
        let root = Interval { lft: 1, rgt: 2 };
        let position = Slot::LastChildOf(root).position();
        assert_eq!(position, 2);

        let plan = open_gap(position, 2);
        assert_eq!(plan.apply(1), 1);
        assert_eq!(plan.apply(2), 4);
    }

    #[test]
    fn test_slot_positions() {
        let n = Interval { lft: 4, rgt: 7 };
        assert_eq!(Slot::LastChildOf(n).position(), 7);
        assert_eq!(Slot::FirstChildOf(n).position(), 5);
        assert_eq!(Slot::Before(n).position(), 4);
        assert_eq!(Slot::After(n).position(), 8);
    }

    #[test]
    fn test_close_gap_after_delete() {
        // [1,4] with child [2,3] removed, sibling [5,6] slides to [1,2]
        let plan = close_gap(Interval { lft: 1, rgt: 4 });
        assert_eq!(plan.apply(5), 1);
        assert_eq!(plan.apply(6), 2);
        assert_eq!(plan.apply(0), 0);
    }

    #[test]
    fn test_relocate_forward() {
        // roots A[1,2] B[3,6] with child C[4,5]; move A after B (position 7)
        let rows = [
            Interval { lft: 1, rgt: 2 },
            Interval { lft: 3, rgt: 6 },
            Interval { lft: 4, rgt: 5 },
        ];
        let plan = relocate(rows[0], 7).unwrap().unwrap();
        assert_eq!(plan.moved_to, Interval { lft: 5, rgt: 6 });

        let moved = apply_all(&plan.plan, &rows);
        assert_eq!(moved[0], Interval { lft: 5, rgt: 6 });
        assert_eq!(moved[1], Interval { lft: 1, rgt: 4 });
        assert_eq!(moved[2], Interval { lft: 2, rgt: 3 });
    }

    #[test]
    fn test_relocate_backward() {
        // A[1,2] B[3,6] C[4,5]; move C before A (position 1)
        let rows = [
            Interval { lft: 1, rgt: 2 },
            Interval { lft: 3, rgt: 6 },
            Interval { lft: 4, rgt: 5 },
        ];
        let plan = relocate(rows[2], 1).unwrap().unwrap();
        assert_eq!(plan.moved_to, Interval { lft: 1, rgt: 2 });

        let moved = apply_all(&plan.plan, &rows);
        assert_eq!(moved[0], Interval { lft: 3, rgt: 4 });
        assert_eq!(moved[1], Interval { lft: 5, rgt: 6 });
        assert_eq!(moved[2], Interval { lft: 1, rgt: 2 });
    }

    #[test]
    fn test_relocate_child_to_end_as_root() {
        // save-as-root of [4,5] inside [3,6], scope max rgt 6
        let plan = relocate(Interval { lft: 4, rgt: 5 }, 7).unwrap().unwrap();
        assert_eq!(plan.moved_to.lft, 5);
        assert_eq!(plan.plan.apply(6), 4);
        assert_eq!(plan.plan.apply(3), 3);
    }

    #[test]
    fn test_relocate_round_trip_restores_layout() {
        let rows = [
            Interval { lft: 1, rgt: 4 },
            Interval { lft: 2, rgt: 3 },
            Interval { lft: 5, rgt: 10 },
            Interval { lft: 6, rgt: 7 },
            Interval { lft: 8, rgt: 9 },
        ];
        // move [2,3] to be the last child of [5,10]
        let forward = relocate(rows[1], 10).unwrap().unwrap();
        let moved = apply_all(&forward.plan, &rows);
        assert_eq!(moved[1], Interval { lft: 8, rgt: 9 });
        assert_eq!(moved[0], Interval { lft: 1, rgt: 2 });

        // and back to the first child of what used to be [1,4]
        let back = relocate(moved[1], moved[0].lft + 1).unwrap().unwrap();
        let restored = apply_all(&back.plan, &moved);
        assert_eq!(restored, rows);
    }

    #[test]
    fn test_relocate_into_self_is_rejected() {
        let subject = Interval { lft: 3, rgt: 8 };
        assert!(matches!(
            relocate(subject, 5),
            Err(IntervalError::MoveIntoSelf { .. })
        ));
        assert!(relocate(subject, 8).is_err());
    }

    #[test]
    fn test_relocate_to_current_position_is_noop() {
        let subject = Interval { lft: 3, rgt: 4 };
        assert_eq!(relocate(subject, 3).unwrap(), None);
        assert_eq!(relocate(subject, 5).unwrap(), None);
    }

    #[test]
    fn test_plan_window() {
        let gap = open_gap(4, 2);
        assert_eq!(gap.window(), Some((4, None)));

        let mv = relocate(Interval { lft: 1, rgt: 2 }, 7).unwrap().unwrap();
        assert_eq!(mv.plan.window(), Some((1, Some(6))));

        assert_eq!(BoundaryPlan::default().window(), None);
    }

    #[test]
    fn test_zero_delta_rules_are_dropped() {
        let plan = open_gap(4, 0);
        assert!(plan.is_empty());
    }

    #[test]
    fn test_number_forest_depth_first() {
        let forest = vec![
            OutlineNode {
                key: 'a',
                children: vec![OutlineNode::leaf('b'), OutlineNode::leaf('c')],
            },
            OutlineNode::leaf('d'),
        ];
        let numbered = number_forest(&forest, 1);
        let find = |k| numbered.iter().find(|n| n.key == k).unwrap();

        assert_eq!(find('a').interval, Interval { lft: 1, rgt: 6 });
        assert_eq!(find('b').interval, Interval { lft: 2, rgt: 3 });
        assert_eq!(find('c').interval, Interval { lft: 4, rgt: 5 });
        assert_eq!(find('d').interval, Interval { lft: 7, rgt: 8 });
        assert_eq!(find('c').parent, Some('a'));
        assert_eq!(find('c').depth, 1);
        assert_eq!(numbered[0].key, 'a');
    }

    #[test]
    fn test_outline_orphans_and_cycles_become_roots() {
        // 1 -> root, 2 -> child of 1, 3 -> parent 99 (missing), 4 <-> 5 cycle
        let entries = [
            (1, None),
            (2, Some(1)),
            (3, Some(99)),
            (4, Some(5)),
            (5, Some(4)),
        ];
        let outline = outline_from_parents(&entries);
        let roots: Vec<i32> = outline.iter().map(|n| n.key).collect();
        assert_eq!(roots, vec![1, 3, 4]);
        assert_eq!(outline[0].children[0].key, 2);
        assert_eq!(outline[2].children[0].key, 5);

        let numbered = number_forest(&outline, 1);
        assert_eq!(numbered.len(), 5);
        assert_eq!(numbered.iter().map(|n| n.interval.rgt).max(), Some(10));
    }
}
