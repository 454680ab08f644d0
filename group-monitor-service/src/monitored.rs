//! In-memory cache of the group ids currently under observation.
//!
//! Membership decisions are made against this cache, never the store:
//! `contains` is O(1) and may lag persisted state until the next `load`
//! or same-process mutation. A group added to the store by another
//! process is invisible here until `load` runs again.

use crate::db::Db;
use std::collections::HashSet;
use std::sync::RwLock;

pub struct MonitoredGroups {
    inner: RwLock<HashSet<String>>,
}

impl MonitoredGroups {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashSet::new()),
        }
    }

    /// Replace the cache with every group currently marked monitored in
    /// the store. Store errors propagate — callers at startup treat this
    /// as fatal.
    pub fn load(&self, db: &Db) -> Result<usize, String> {
        let ids = db
            .list_monitored_group_ids()
            .map_err(|e| format!("Failed to load monitored groups: {}", e))?;
        let mut set = self.inner.write().unwrap();
        set.clear();
        set.extend(ids);
        Ok(set.len())
    }

    pub fn contains(&self, group_id: &str) -> bool {
        self.inner.read().unwrap().contains(group_id)
    }

    /// Returns true when the group was not already present.
    pub fn mark_monitored(&self, group_id: &str) -> bool {
        self.inner.write().unwrap().insert(group_id.to_string())
    }

    pub fn mark_unmonitored(&self, group_id: &str) -> bool {
        self.inner.write().unwrap().remove(group_id)
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_replaces_cache_contents() {
        let db = Db::open(":memory:").unwrap();
        db.upsert_group("g1", Some("Neol A")).unwrap();
        db.upsert_group("g2", Some("Neol B")).unwrap();

        let cache = MonitoredGroups::new();
        cache.mark_monitored("stale");

        assert_eq!(cache.load(&db).unwrap(), 2);
        assert!(cache.contains("g1"));
        assert!(cache.contains("g2"));
        assert!(!cache.contains("stale"));
    }

    #[test]
    fn contains_checks_cache_not_store() {
        let db = Db::open(":memory:").unwrap();
        let cache = MonitoredGroups::new();
        cache.load(&db).unwrap();

        // Written to the store after load: invisible until the next load
        db.upsert_group("g1", Some("Neol A")).unwrap();
        assert!(!cache.contains("g1"));

        cache.load(&db).unwrap();
        assert!(cache.contains("g1"));
    }

    #[test]
    fn mark_monitored_reports_newness() {
        let cache = MonitoredGroups::new();
        assert!(cache.mark_monitored("g1"));
        assert!(!cache.mark_monitored("g1"));
        assert_eq!(cache.len(), 1);
        assert!(cache.mark_unmonitored("g1"));
        assert!(!cache.contains("g1"));
    }
}
