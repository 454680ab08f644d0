//! Shared types for the group membership monitor and its bridge clients.

use serde::{Deserialize, Serialize};

// =====================================================
// Domain Types
// =====================================================

/// A chat group under observation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoredGroup {
    pub id: i64,
    pub group_id: String,
    pub name: Option<String>,
    pub monitored: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// A membership record: one (phone, group) pair, never hard-deleted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMember {
    pub id: i64,
    pub phone: String,
    pub group_id: String,
    pub active: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// How a group ended up in the monitored set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorKind {
    /// Display name matched the target keyword
    Keyword,
    /// Added via the explicit "sync" command, bypassing the keyword check
    Forced,
}

// =====================================================
// Status Report Types
// =====================================================

/// Per-group detail in the status report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupStatusDetail {
    pub group_id: String,
    pub name: Option<String>,
    pub monitor_kind: MonitorKind,
    pub total_members: i64,
    pub active_members: i64,
    pub inactive_members: i64,
}

/// Aggregate status across all monitored groups
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseStatus {
    pub total_groups: i64,
    pub target_groups: i64,
    pub force_monitored_groups: i64,
    pub total_members: i64,
    pub active_members: i64,
    pub inactive_members: i64,
    pub groups: Vec<GroupStatusDetail>,
}
