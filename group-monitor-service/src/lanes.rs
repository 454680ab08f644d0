//! Per-group reconciliation lanes.
//!
//! Reconciliation is a read-modify-write sequence over a group's
//! membership rows. Handlers for different groups may interleave across
//! await points, so two syncs for the same group must not. One
//! single-permit semaphore per group id serializes them.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Guard that releases the group's lane when dropped
pub struct GroupLaneGuard {
    _permit: OwnedSemaphorePermit,
}

pub struct GroupLanes {
    lanes: DashMap<String, Arc<Semaphore>>,
}

impl GroupLanes {
    pub fn new() -> Self {
        Self {
            lanes: DashMap::new(),
        }
    }

    /// Acquire the lane for a group, waiting if another reconciliation for
    /// the same group is in flight.
    pub async fn acquire(&self, group_id: &str) -> GroupLaneGuard {
        let semaphore = self
            .lanes
            .entry(group_id.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(1)))
            .clone();

        let permit = semaphore
            .acquire_owned()
            .await
            .expect("group lane semaphore should not be closed");

        GroupLaneGuard { _permit: permit }
    }

    pub fn is_busy(&self, group_id: &str) -> bool {
        self.lanes
            .get(group_id)
            .map(|s| s.available_permits() == 0)
            .unwrap_or(false)
    }
}
