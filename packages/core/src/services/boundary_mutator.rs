//! Boundary Mutator
//!
//! Applies boundary plans from [`crate::interval`] to a store transaction. Every
//! write is confined to the scope it is given; callers pass the scope of the acting
//! node and nothing else.

use crate::db::StoreTransaction;
use crate::interval::{self, BoundaryPlan, Interval};
use crate::models::ScopeKey;
use crate::services::NestedSetError;
use tracing::debug;

/// Apply `plan` to every row of `scope`, returning the number of rows touched
pub async fn apply_plan(
    tx: &mut dyn StoreTransaction,
    scope: &ScopeKey,
    plan: &BoundaryPlan,
) -> Result<u64, NestedSetError> {
    if plan.is_empty() {
        return Ok(0);
    }

    let touched = tx.shift_boundaries(scope, plan).await?;
    debug!(
        scope = %scope,
        rules = plan.shifts().len(),
        touched,
        "Applied boundary plan"
    );
    Ok(touched)
}

/// Shift every boundary `>= cut` up by `height`
pub async fn open_gap(
    tx: &mut dyn StoreTransaction,
    scope: &ScopeKey,
    cut: i64,
    height: i64,
) -> Result<u64, NestedSetError> {
    apply_plan(tx, scope, &interval::open_gap(cut, height)).await
}

/// Shift every boundary `> removed.rgt` down by the removed width
pub async fn close_gap(
    tx: &mut dyn StoreTransaction,
    scope: &ScopeKey,
    removed: Interval,
) -> Result<u64, NestedSetError> {
    apply_plan(tx, scope, &interval::close_gap(removed)).await
}

/// Move the subtree at `subject` so its `lft` lands at `position`
///
/// Returns the subtree's new interval; unchanged when it already sits there.
pub async fn relocate(
    tx: &mut dyn StoreTransaction,
    scope: &ScopeKey,
    subject: Interval,
    position: i64,
) -> Result<Interval, NestedSetError> {
    match interval::relocate(subject, position)? {
        Some(plan) => {
            apply_plan(tx, scope, &plan.plan).await?;
            Ok(plan.moved_to)
        }
        None => Ok(subject),
    }
}
