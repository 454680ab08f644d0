//! Membership reconciliation against the store.
//!
//! Full-snapshot reconciliation replaces the persisted active/inactive
//! state of a group's membership with a freshly fetched roster; the
//! incremental variants apply participant-update deltas directly. Every
//! write path here runs under the group's lane and is guarded by the
//! monitored cache — groups never registered are skipped outright.

use crate::db::Db;
use crate::lanes::GroupLanes;
use crate::monitored::MonitoredGroups;
use std::collections::HashSet;

/// Reconcile a group's membership records against a complete roster.
///
/// Every member of `current` is upserted active; every previously-active
/// record absent from `current` is flipped inactive. Records that are
/// already inactive and still absent are left untouched.
pub async fn sync_group_members(
    db: &Db,
    cache: &MonitoredGroups,
    lanes: &GroupLanes,
    group_id: &str,
    current: &HashSet<String>,
) -> Result<(), String> {
    if !cache.contains(group_id) {
        log::info!("Skipping member sync for unmonitored group {}", group_id);
        return Ok(());
    }

    let _lane = lanes.acquire(group_id).await;

    let existing = db
        .list_members(group_id)
        .map_err(|e| format!("Failed to list members of {}: {}", group_id, e))?;

    for phone in current {
        db.upsert_member_active(group_id, phone)
            .map_err(|e| format!("Failed to upsert member {} of {}: {}", phone, group_id, e))?;
    }

    let mut deactivated = 0usize;
    for record in &existing {
        if record.active && !current.contains(&record.phone) {
            db.deactivate_member(group_id, &record.phone)
                .map_err(|e| {
                    format!(
                        "Failed to deactivate member {} of {}: {}",
                        record.phone, group_id, e
                    )
                })?;
            deactivated += 1;
        }
    }

    log::info!(
        "Synced group {}: {} current members, {} deactivated",
        group_id,
        current.len(),
        deactivated
    );
    Ok(())
}

/// Apply a participant-add delta. No-op for unmonitored groups.
pub async fn handle_members_added(
    db: &Db,
    cache: &MonitoredGroups,
    lanes: &GroupLanes,
    group_id: &str,
    phones: &[String],
) -> Result<(), String> {
    if !cache.contains(group_id) {
        log::debug!("Ignoring member add for unmonitored group {}", group_id);
        return Ok(());
    }

    let _lane = lanes.acquire(group_id).await;
    for phone in phones {
        db.upsert_member_active(group_id, phone)
            .map_err(|e| format!("Failed to upsert member {} of {}: {}", phone, group_id, e))?;
    }
    log::info!("Added {} member(s) to group {}", phones.len(), group_id);
    Ok(())
}

/// Apply a participant-remove delta. No-op for unmonitored groups.
/// Removed members are flipped inactive without checking prior state.
pub async fn handle_members_removed(
    db: &Db,
    cache: &MonitoredGroups,
    lanes: &GroupLanes,
    group_id: &str,
    phones: &[String],
) -> Result<(), String> {
    if !cache.contains(group_id) {
        log::debug!("Ignoring member remove for unmonitored group {}", group_id);
        return Ok(());
    }

    let _lane = lanes.acquire(group_id).await;
    for phone in phones {
        db.deactivate_member(group_id, phone)
            .map_err(|e| format!("Failed to deactivate member {} of {}: {}", phone, group_id, e))?;
    }
    log::info!("Removed {} member(s) from group {}", phones.len(), group_id);
    Ok(())
}
