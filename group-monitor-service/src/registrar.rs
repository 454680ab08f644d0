//! Adding groups to the monitored set (store + cache, in lockstep).

use crate::db::Db;
use crate::monitored::MonitoredGroups;

/// Upsert a group as monitored and add it to the in-memory set.
///
/// Idempotent: a repeat call with the same arguments only refreshes the
/// row's timestamp. Returns true when the group row was newly created.
/// Store errors propagate — in event-handling context the router logs
/// and discards them.
pub fn add_group_to_monitored(
    db: &Db,
    cache: &MonitoredGroups,
    group_id: &str,
    name: Option<&str>,
) -> Result<bool, String> {
    let (group, newly_created) = db
        .upsert_group(group_id, name)
        .map_err(|e| format!("Failed to upsert group {}: {}", group_id, e))?;

    cache.mark_monitored(group_id);

    if newly_created {
        log::info!(
            "Now monitoring group {} ({})",
            group_id,
            group.name.as_deref().unwrap_or("unnamed")
        );
    } else {
        log::debug!("Group {} already monitored", group_id);
    }

    Ok(newly_created)
}
