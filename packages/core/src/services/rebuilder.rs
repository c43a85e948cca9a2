//! Rebuilder
//!
//! Recomputes every boundary of one scope, either from a nested forest description
//! supplied by the caller or from the `parent_id` pointers already stored. Both paths
//! reduce to `(key, parent)` pairs in sibling order, which
//! [`outline_from_parents`](crate::interval::outline_from_parents) and
//! [`number_forest`](crate::interval::number_forest) turn into fresh intervals.
//!
//! These functions run inside a transaction the caller owns; locking and events are
//! handled by `NestedSetService`.

use crate::db::{NewRow, ScopedQuery, StoreTransaction};
use crate::interval::{number_forest, outline_from_parents};
use crate::models::{ForestEntry, Node, NodeId, ScopeKey};
use crate::services::NestedSetError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// Outcome of a rebuild
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebuildSummary {
    /// Existing rows whose boundaries or parent changed
    pub updated: usize,

    /// Ids generated for new forest entries, in preorder
    pub inserted: Vec<NodeId>,

    /// Rows removed because the forest did not mention them
    pub deleted: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RowKey {
    Stored(NodeId),
    /// Index into the list of new entries
    Draft(usize),
}

/// Flattened forest: `(key, parent)` pairs in preorder plus payloads to write
struct FlatForest<'a> {
    entries: Vec<(RowKey, Option<RowKey>)>,
    drafts: Vec<Value>,
    payloads: Vec<(NodeId, &'a Value)>,
    mentioned: HashSet<NodeId>,
}

fn flatten<'a>(
    entries: &'a [ForestEntry],
    parent: Option<RowKey>,
    flat: &mut FlatForest<'a>,
) -> Result<(), NestedSetError> {
    for entry in entries {
        let key = match entry.id {
            Some(id) => {
                if !flat.mentioned.insert(id) {
                    return Err(NestedSetError::invalid_operation(format!(
                        "node {} appears more than once in the forest",
                        id
                    )));
                }
                if let Some(payload) = &entry.payload {
                    flat.payloads.push((id, payload));
                }
                RowKey::Stored(id)
            }
            None => {
                flat.drafts.push(
                    entry
                        .payload
                        .clone()
                        .unwrap_or_else(|| Value::Object(Default::default())),
                );
                RowKey::Draft(flat.drafts.len() - 1)
            }
        };
        flat.entries.push((key, parent));
        flatten(&entry.children, Some(key), flat)?;
    }
    Ok(())
}

/// Replace the structure of `scope` with `forest`
///
/// Existing ids must belong to `scope`. Rows not mentioned are deleted when
/// `delete_missing` is set; otherwise they keep their stored parent and become its
/// last children, after any described children. Unmentioned roots, and rows whose
/// parent is gone, follow the described roots.
pub async fn rebuild_forest(
    tx: &mut dyn StoreTransaction,
    scope: &ScopeKey,
    forest: &[ForestEntry],
    delete_missing: bool,
    offset: i64,
) -> Result<RebuildSummary, NestedSetError> {
    let stored = tx.fetch_nodes(&ScopedQuery::new(scope.clone())).await?;
    let by_id: HashMap<NodeId, &Node> = stored.iter().map(|node| (node.id, node)).collect();

    let mut flat = FlatForest {
        entries: Vec::new(),
        drafts: Vec::new(),
        payloads: Vec::new(),
        mentioned: HashSet::new(),
    };
    flatten(forest, None, &mut flat)?;

    for id in &flat.mentioned {
        if by_id.contains_key(id) {
            continue;
        }
        return Err(match tx.get_node(*id).await? {
            Some(other) => NestedSetError::scope_violation(&other.scope, scope),
            None => NestedSetError::not_found(*id),
        });
    }

    let mut summary = RebuildSummary::default();
    let mut entries = flat.entries;

    // `stored` is in lft order, so leftovers keep their relative order
    for node in stored.iter().filter(|node| !flat.mentioned.contains(&node.id)) {
        if delete_missing {
            summary.deleted += tx.delete_node(node.id).await?;
        } else {
            entries.push((RowKey::Stored(node.id), node.parent_id.map(RowKey::Stored)));
        }
    }

    let numbered = number_forest(&outline_from_parents(&entries), offset);

    let mut assigned: HashMap<RowKey, NodeId> = HashMap::new();
    for row in &numbered {
        let parent = row.parent.and_then(|key| assigned.get(&key).copied());
        match row.key {
            RowKey::Stored(id) => {
                let changed = by_id.get(&id).map_or(true, |node| {
                    node.interval() != row.interval || node.parent_id != parent
                });
                if changed {
                    tx.set_position(id, row.interval, parent).await?;
                    summary.updated += 1;
                }
                assigned.insert(row.key, id);
            }
            RowKey::Draft(index) => {
                let id = tx
                    .insert_node(NewRow {
                        scope,
                        interval: row.interval,
                        parent_id: parent,
                        payload: &flat.drafts[index],
                    })
                    .await?;
                summary.inserted.push(id);
                assigned.insert(row.key, id);
            }
        }
    }

    for (id, payload) in flat.payloads {
        tx.set_payload(id, payload).await?;
    }

    info!(
        scope = %scope,
        updated = summary.updated,
        inserted = summary.inserted.len(),
        deleted = summary.deleted,
        "Rebuilt scope from forest"
    );
    Ok(summary)
}

/// Recompute boundaries of `scope` from stored parent pointers
///
/// Children keep the order of their current `lft`. Rows whose parent is missing
/// from the scope, or only reachable through a cycle, become roots.
pub async fn rebuild_from_parents(
    tx: &mut dyn StoreTransaction,
    scope: &ScopeKey,
    offset: i64,
) -> Result<RebuildSummary, NestedSetError> {
    let stored = tx.fetch_nodes(&ScopedQuery::new(scope.clone())).await?;
    let by_id: HashMap<NodeId, &Node> = stored.iter().map(|node| (node.id, node)).collect();

    let entries: Vec<(NodeId, Option<NodeId>)> = stored
        .iter()
        .map(|node| (node.id, node.parent_id))
        .collect();

    let mut summary = RebuildSummary::default();
    for row in number_forest(&outline_from_parents(&entries), offset) {
        let Some(node) = by_id.get(&row.key) else {
            continue;
        };
        if node.interval() != row.interval || node.parent_id != row.parent {
            debug!(
                node_id = %row.key,
                lft = row.interval.lft,
                rgt = row.interval.rgt,
                "Repairing node position"
            );
            tx.set_position(row.key, row.interval, row.parent).await?;
            summary.updated += 1;
        }
    }

    info!(scope = %scope, updated = summary.updated, "Fixed scope from parent pointers");
    Ok(summary)
}
