use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::catalog::ResourceKind;
use crate::store::StoreError;

/// Per-(user, resource) running totals checked against tier limits.
///
/// Counters are a cache of derived state: the authoritative number is the
/// count of the underlying rows, and [`UsageCounters::reset`] exists to bring
/// a drifted counter back in line. Counts never go below zero.
#[async_trait]
pub trait UsageCounters: Send + Sync {
    async fn current_count(&self, user: Uuid, resource: &ResourceKind) -> Result<u64, StoreError>;

    /// Unconditional increment, creating the counter on first use.
    async fn increment(&self, user: Uuid, resource: &ResourceKind) -> Result<u64, StoreError>;

    /// Decrement clamped at zero. A missing counter stays missing and reads as 0.
    async fn decrement(&self, user: Uuid, resource: &ResourceKind) -> Result<u64, StoreError>;

    /// Atomically increment only while the count is below `max`.
    ///
    /// Returns the new count, or `None` when the limit was already reached.
    /// Two concurrent callers racing for the last slot get one `Some` and one
    /// `None`.
    async fn try_increment(
        &self,
        user: Uuid,
        resource: &ResourceKind,
        max: u64,
    ) -> Result<Option<u64>, StoreError>;

    /// Overwrite the counter with a recomputed value.
    async fn reset(&self, user: Uuid, resource: &ResourceKind, count: u64) -> Result<(), StoreError>;
}

/// In-process counters. The single mutex makes every operation atomic.
#[derive(Debug, Default)]
pub struct MemoryUsageCounters {
    counts: Mutex<HashMap<(Uuid, ResourceKind), u64>>,
}

impl MemoryUsageCounters {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UsageCounters for MemoryUsageCounters {
    async fn current_count(&self, user: Uuid, resource: &ResourceKind) -> Result<u64, StoreError> {
        let counts = self.counts.lock().await;
        Ok(counts.get(&(user, resource.clone())).copied().unwrap_or(0))
    }

    async fn increment(&self, user: Uuid, resource: &ResourceKind) -> Result<u64, StoreError> {
        let mut counts = self.counts.lock().await;
        let count = counts.entry((user, resource.clone())).or_insert(0);
        *count = count.saturating_add(1);
        Ok(*count)
    }

    async fn decrement(&self, user: Uuid, resource: &ResourceKind) -> Result<u64, StoreError> {
        let mut counts = self.counts.lock().await;
        match counts.get_mut(&(user, resource.clone())) {
            Some(count) => {
                *count = count.saturating_sub(1);
                Ok(*count)
            }
            None => Ok(0),
        }
    }

    async fn try_increment(
        &self,
        user: Uuid,
        resource: &ResourceKind,
        max: u64,
    ) -> Result<Option<u64>, StoreError> {
        let mut counts = self.counts.lock().await;
        let count = counts.entry((user, resource.clone())).or_insert(0);
        if *count >= max {
            return Ok(None);
        }
        *count += 1;
        Ok(Some(*count))
    }

    async fn reset(&self, user: Uuid, resource: &ResourceKind, count: u64) -> Result<(), StoreError> {
        let mut counts = self.counts.lock().await;
        counts.insert((user, resource.clone()), count);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recipes() -> ResourceKind {
        ResourceKind::new("saved_recipes")
    }

    #[tokio::test]
    async fn missing_counter_reads_zero() {
        let counters = MemoryUsageCounters::new();
        assert_eq!(counters.current_count(Uuid::new_v4(), &recipes()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn decrement_floors_at_zero() {
        let counters = MemoryUsageCounters::new();
        let user = Uuid::new_v4();

        assert_eq!(counters.decrement(user, &recipes()).await.unwrap(), 0);
        counters.increment(user, &recipes()).await.unwrap();
        assert_eq!(counters.decrement(user, &recipes()).await.unwrap(), 0);
        assert_eq!(counters.decrement(user, &recipes()).await.unwrap(), 0);
        assert_eq!(counters.current_count(user, &recipes()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn try_increment_stops_at_max() {
        let counters = MemoryUsageCounters::new();
        let user = Uuid::new_v4();

        assert_eq!(counters.try_increment(user, &recipes(), 2).await.unwrap(), Some(1));
        assert_eq!(counters.try_increment(user, &recipes(), 2).await.unwrap(), Some(2));
        assert_eq!(counters.try_increment(user, &recipes(), 2).await.unwrap(), None);
        assert_eq!(counters.current_count(user, &recipes()).await.unwrap(), 2);
        assert_eq!(counters.try_increment(user, &recipes(), 0).await.unwrap(), None);
    }

    #[tokio::test]
    async fn counters_are_scoped_per_user_and_resource() {
        let counters = MemoryUsageCounters::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        counters.increment(alice, &recipes()).await.unwrap();
        counters.increment(alice, &ResourceKind::new("family_members")).await.unwrap();

        assert_eq!(counters.current_count(alice, &recipes()).await.unwrap(), 1);
        assert_eq!(counters.current_count(bob, &recipes()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn reset_overwrites() {
        let counters = MemoryUsageCounters::new();
        let user = Uuid::new_v4();
        counters.increment(user, &recipes()).await.unwrap();
        counters.reset(user, &recipes(), 7).await.unwrap();
        assert_eq!(counters.current_count(user, &recipes()).await.unwrap(), 7);
    }
}
