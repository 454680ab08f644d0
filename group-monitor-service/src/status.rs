//! Aggregated status report over every monitored group.

use crate::db::Db;
use crate::keyword::matches_keyword;
use group_monitor_types::*;

/// Compute membership counts for every monitored group. Pure read.
///
/// Groups whose stored name still matches the keyword count as keyword
/// targets; everything else in the monitored set got there via the
/// "sync" command and counts as force-monitored.
pub fn get_database_status(db: &Db, target_keyword: &str) -> Result<DatabaseStatus, String> {
    let groups = db
        .list_monitored_groups()
        .map_err(|e| format!("Failed to list monitored groups: {}", e))?;

    let mut details = Vec::with_capacity(groups.len());
    let mut target_groups = 0i64;
    let mut force_monitored_groups = 0i64;
    let mut total_members = 0i64;
    let mut active_members = 0i64;

    for group in &groups {
        let (total, active) = db
            .member_counts(&group.group_id)
            .map_err(|e| format!("Failed to count members of {}: {}", group.group_id, e))?;

        let monitor_kind = if matches_keyword(group.name.as_deref(), target_keyword) {
            target_groups += 1;
            MonitorKind::Keyword
        } else {
            force_monitored_groups += 1;
            MonitorKind::Forced
        };

        total_members += total;
        active_members += active;
        details.push(GroupStatusDetail {
            group_id: group.group_id.clone(),
            name: group.name.clone(),
            monitor_kind,
            total_members: total,
            active_members: active,
            inactive_members: total - active,
        });
    }

    Ok(DatabaseStatus {
        total_groups: groups.len() as i64,
        target_groups,
        force_monitored_groups,
        total_members,
        active_members,
        inactive_members: total_members - active_members,
        groups: details,
    })
}

/// Render the status as the fixed-structure text report sent back on the
/// transport.
pub fn format_database_status(status: &DatabaseStatus) -> String {
    let mut out = String::new();
    out.push_str("=== Group Monitor Status ===\n");
    out.push_str(&format!(
        "Groups: {} total ({} keyword, {} force-monitored)\n",
        status.total_groups, status.target_groups, status.force_monitored_groups
    ));
    out.push_str(&format!(
        "Members: {} total, {} active, {} inactive\n",
        status.total_members, status.active_members, status.inactive_members
    ));

    for group in &status.groups {
        let kind = match group.monitor_kind {
            MonitorKind::Keyword => "keyword",
            MonitorKind::Forced => "forced",
        };
        out.push_str(&format!(
            "\n[{}] {} ({})\n  members: {} total, {} active, {} inactive\n",
            kind,
            group.name.as_deref().unwrap_or("unnamed"),
            group.group_id,
            group.total_members,
            group.active_members,
            group.inactive_members
        ));
    }

    out
}
