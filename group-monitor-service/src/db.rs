//! SQLite database operations for the group membership monitor.
//!
//! Two tables: `groups` (one row per sighted group, unique on group_id) and
//! `group_members` (one row per (phone, group) pair, unique together).
//! Neither table is ever hard-deleted from — membership history is the
//! audit trail.

use group_monitor_types::*;
use rusqlite::{Connection, Result as SqliteResult};
use std::sync::Mutex;

pub struct Db {
    conn: Mutex<Connection>,
}

impl Db {
    pub fn open(path: &str) -> SqliteResult<Self> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(path)?
        };
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.create_tables()?;
        Ok(db)
    }

    fn create_tables(&self) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS groups (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                group_id TEXT NOT NULL UNIQUE,
                name TEXT,
                monitored INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS group_members (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                phone TEXT NOT NULL,
                group_id TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE(phone, group_id)
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_members_group ON group_members(group_id, active)",
            [],
        )?;

        Ok(())
    }

    // =====================================================
    // Group Operations
    // =====================================================

    /// Upsert a group as monitored. Returns the stored row plus whether it
    /// was newly created. A `None` name never overwrites a stored name.
    pub fn upsert_group(
        &self,
        group_id: &str,
        name: Option<&str>,
    ) -> SqliteResult<(MonitoredGroup, bool)> {
        let conn = self.conn.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();

        let existed = get_group_inner(&conn, group_id)?.is_some();

        conn.execute(
            "INSERT INTO groups (group_id, name, monitored, created_at, updated_at)
             VALUES (?1, ?2, 1, ?3, ?3)
             ON CONFLICT(group_id) DO UPDATE SET
                monitored = 1,
                name = COALESCE(excluded.name, groups.name),
                updated_at = excluded.updated_at",
            rusqlite::params![group_id, name, now],
        )?;

        let group =
            get_group_inner(&conn, group_id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)?;
        Ok((group, !existed))
    }

    /// Update the stored display name of a group, refreshing its timestamp.
    pub fn set_group_name(&self, group_id: &str, name: Option<&str>) -> SqliteResult<bool> {
        let conn = self.conn.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        let rows = conn.execute(
            "UPDATE groups SET name = ?1, updated_at = ?2 WHERE group_id = ?3",
            rusqlite::params![name, now, group_id],
        )?;
        Ok(rows > 0)
    }

    pub fn get_group(&self, group_id: &str) -> SqliteResult<Option<MonitoredGroup>> {
        let conn = self.conn.lock().unwrap();
        get_group_inner(&conn, group_id)
    }

    pub fn list_monitored_groups(&self) -> SqliteResult<Vec<MonitoredGroup>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, group_id, name, monitored, created_at, updated_at
             FROM groups WHERE monitored = 1 ORDER BY created_at ASC",
        )?;
        let entries = stmt
            .query_map([], |row| row_to_group(row))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(entries)
    }

    pub fn list_monitored_group_ids(&self) -> SqliteResult<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT group_id FROM groups WHERE monitored = 1 ORDER BY created_at ASC")?;
        let entries = stmt
            .query_map([], |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(entries)
    }

    // =====================================================
    // Member Operations
    // =====================================================

    /// Upsert a membership record as active, refreshing its timestamp
    /// whether newly created or already active.
    pub fn upsert_member_active(&self, group_id: &str, phone: &str) -> SqliteResult<()> {
        let conn = self.conn.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO group_members (phone, group_id, active, created_at, updated_at)
             VALUES (?1, ?2, 1, ?3, ?3)
             ON CONFLICT(phone, group_id) DO UPDATE SET
                active = 1,
                updated_at = excluded.updated_at",
            rusqlite::params![phone, group_id, now],
        )?;
        Ok(())
    }

    /// Flip a membership record to inactive. Returns false when no record
    /// exists for the pair — a record is never created here.
    pub fn deactivate_member(&self, group_id: &str, phone: &str) -> SqliteResult<bool> {
        let conn = self.conn.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        let rows = conn.execute(
            "UPDATE group_members SET active = 0, updated_at = ?1
             WHERE group_id = ?2 AND phone = ?3",
            rusqlite::params![now, group_id, phone],
        )?;
        Ok(rows > 0)
    }

    pub fn list_members(&self, group_id: &str) -> SqliteResult<Vec<GroupMember>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, phone, group_id, active, created_at, updated_at
             FROM group_members WHERE group_id = ?1 ORDER BY created_at ASC",
        )?;
        let entries = stmt
            .query_map([group_id], |row| row_to_member(row))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(entries)
    }

    /// (total, active) membership-record counts for a group. Read errors
    /// propagate — these counts feed the status report.
    pub fn member_counts(&self, group_id: &str) -> SqliteResult<(i64, i64)> {
        let conn = self.conn.lock().unwrap();
        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM group_members WHERE group_id = ?1",
            [group_id],
            |row| row.get(0),
        )?;
        let active: i64 = conn.query_row(
            "SELECT COUNT(*) FROM group_members WHERE group_id = ?1 AND active = 1",
            [group_id],
            |row| row.get(0),
        )?;
        Ok((total, active))
    }
}

// =====================================================
// Row Mapping Functions
// =====================================================

fn get_group_inner(conn: &Connection, group_id: &str) -> SqliteResult<Option<MonitoredGroup>> {
    let mut stmt = conn.prepare(
        "SELECT id, group_id, name, monitored, created_at, updated_at
         FROM groups WHERE group_id = ?1",
    )?;
    let mut rows = stmt.query_map([group_id], |row| row_to_group(row))?;
    Ok(rows.next().and_then(|r| r.ok()))
}

fn row_to_group(row: &rusqlite::Row) -> rusqlite::Result<MonitoredGroup> {
    Ok(MonitoredGroup {
        id: row.get(0)?,
        group_id: row.get(1)?,
        name: row.get(2)?,
        monitored: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn row_to_member(row: &rusqlite::Row) -> rusqlite::Result<GroupMember> {
    Ok(GroupMember {
        id: row.get(0)?,
        phone: row.get(1)?,
        group_id: row.get(2)?,
        active: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}
