//! Exclusive ownership of a collection while it is being processed.
//!
//! Ownership is granted by one conditional write in the [`StateStore`]:
//! `pending | paused → running`. Exactly one of any number of concurrent
//! claimers, in this process or another, sees an affected row.
//!
//! The process-local set only keeps this process from spawning two runners
//! for the same collection between polls. It is never consulted for
//! correctness and is cleared when the [`ClaimGuard`] drops.

use std::sync::{Arc, Mutex, MutexGuard};

use rustc_hash::FxHashSet;

use crate::collection::{CollectionId, CollectionStatus};
use crate::error::SchedResult;
use crate::persistence::StateStore;

type ClaimSet = Arc<Mutex<FxHashSet<CollectionId>>>;

fn lock_set(set: &ClaimSet) -> MutexGuard<'_, FxHashSet<CollectionId>> {
    // The set holds plain ids; a panic elsewhere cannot leave it half-updated.
    set.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Grants collection ownership to runners.
#[derive(Clone)]
pub struct ClaimCoordinator {
    store: Arc<dyn StateStore>,
    claimed: ClaimSet,
}

impl ClaimCoordinator {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self {
            store,
            claimed: Arc::new(Mutex::new(FxHashSet::default())),
        }
    }

    /// Whether a runner in this process currently owns the collection.
    pub fn is_claimed_locally(&self, id: &CollectionId) -> bool {
        lock_set(&self.claimed).contains(id)
    }

    /// Number of collections owned by this process.
    pub fn local_claims(&self) -> usize {
        lock_set(&self.claimed).len()
    }

    /// Try to take ownership of a collection.
    ///
    /// Returns `None` when another owner already has it. The claim marker is
    /// released when the returned guard is dropped.
    pub async fn try_claim(&self, id: &CollectionId) -> SchedResult<Option<ClaimGuard>> {
        let inserted = lock_set(&self.claimed).insert(*id);
        if !inserted {
            return Ok(None);
        }
        // From here on the guard owns the local marker, including on error.
        let guard = ClaimGuard {
            id: *id,
            claimed: self.claimed.clone(),
        };

        let affected = self
            .store
            .transition_collection_status(id, &CollectionStatus::CLAIMABLE, CollectionStatus::Running)
            .await?;

        if affected == 1 {
            tracing::debug!(collection = %id, "claimed collection");
            Ok(Some(guard))
        } else {
            Ok(None)
        }
    }
}

/// Proof of ownership of one collection.
#[derive(Debug)]
pub struct ClaimGuard {
    id: CollectionId,
    claimed: ClaimSet,
}

impl ClaimGuard {
    pub fn collection_id(&self) -> &CollectionId {
        &self.id
    }
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        lock_set(&self.claimed).remove(&self.id);
    }
}
