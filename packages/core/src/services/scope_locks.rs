//! Per-Scope Write Locks
//!
//! Structural operations on the same scope must not interleave their
//! read-plan-shift sequence. `ScopeLocks` hands out one async mutex per scope key;
//! operations on different scopes never wait on each other here.

use crate::models::ScopeKey;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Held for the duration of one structural operation
pub type ScopeGuard = OwnedMutexGuard<()>;

/// Registry of async mutexes keyed by scope
#[derive(Debug, Clone, Default)]
pub struct ScopeLocks {
    registry: Arc<Mutex<HashMap<ScopeKey, Arc<Mutex<()>>>>>,
}

impl ScopeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `scope`
    pub async fn acquire(&self, scope: &ScopeKey) -> ScopeGuard {
        let lock = {
            let mut registry = self.registry.lock().await;
            // Entries only referenced by the registry are idle
            registry.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(
                registry
                    .entry(scope.clone())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        lock.lock_owned().await
    }

    /// Number of scopes currently held or awaited
    pub async fn active_scopes(&self) -> usize {
        self.registry
            .lock()
            .await
            .values()
            .filter(|lock| Arc::strong_count(lock) > 1)
            .count()
    }
}
