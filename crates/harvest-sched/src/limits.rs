//! Bounded pools for collection runners and week executions.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{SchedError, SchedResult};

/// Two independent pools: one slot per running collection, one slot per
/// in-flight week execution. The week pool is shared by all collections.
///
/// Slots are returned when the permit is dropped, whatever the outcome.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimits {
    collections: Arc<Semaphore>,
    weeks: Arc<Semaphore>,
}

impl ConcurrencyLimits {
    pub fn new(max_collections: usize, max_weeks: usize) -> Self {
        Self {
            collections: Arc::new(Semaphore::new(max_collections)),
            weeks: Arc::new(Semaphore::new(max_weeks)),
        }
    }

    /// Wait for a collection-runner slot.
    pub async fn acquire_collection(&self) -> SchedResult<OwnedSemaphorePermit> {
        self.collections
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| SchedError::Internal(format!("collection pool closed: {e}")))
    }

    /// Wait for a week-execution slot.
    pub async fn acquire_week(&self) -> SchedResult<OwnedSemaphorePermit> {
        self.weeks
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| SchedError::Internal(format!("week pool closed: {e}")))
    }

    pub fn available_collections(&self) -> usize {
        self.collections.available_permits()
    }

    pub fn available_weeks(&self) -> usize {
        self.weeks.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_permits_return_on_drop() {
        let limits = ConcurrencyLimits::new(2, 3);
        let first = limits.acquire_collection().await.unwrap();
        let _second = limits.acquire_collection().await.unwrap();
        assert_eq!(limits.available_collections(), 0);

        drop(first);
        assert_eq!(limits.available_collections(), 1);
        assert_eq!(limits.available_weeks(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_excess_waits_for_slot() {
        let limits = ConcurrencyLimits::new(1, 1);
        let held = limits.acquire_week().await.unwrap();

        let waiter = {
            let limits = limits.clone();
            tokio::spawn(async move { limits.acquire_week().await.map(|_| ()) })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!waiter.is_finished());

        drop(held);
        waiter.await.unwrap().unwrap();
    }
}
