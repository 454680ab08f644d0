//! Event routing for the five inbound event streams.
//!
//! Each event is handled statelessly; the monitored cache is the only
//! cross-event state. Handler failures are caught here, logged, and
//! discarded — the triggering event is never retried. Connection
//! lifecycle events are surfaced to the outer loop as `LoopControl` so
//! reconnect and logout policy stay out of the handlers.

use crate::keyword::matches_keyword;
use crate::lanes::GroupLanes;
use crate::monitored::MonitoredGroups;
use crate::reconciler;
use crate::registrar::add_group_to_monitored;
use crate::status;
use crate::transport::{GroupMetadata, Transport};
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantAction {
    Add,
    Remove,
}

/// Inbound events, normalized from whatever the transport delivers
#[derive(Debug, Clone)]
pub enum Event {
    ConnectionOpened,
    ConnectionClosed {
        logout: bool,
    },
    AddedToGroup {
        meta: GroupMetadata,
    },
    GroupMetadataChanged {
        group_id: String,
        name: Option<String>,
    },
    ParticipantsUpdate {
        group_id: String,
        action: ParticipantAction,
        phones: Vec<String>,
    },
    TextMessage {
        chat_id: String,
        group_id: Option<String>,
        from_self: bool,
        text: String,
    },
}

/// What the outer connection loop should do after an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopControl {
    Continue,
    Reconnect,
    Logout,
}

pub struct RouterContext {
    pub db: Arc<crate::db::Db>,
    pub monitored: Arc<MonitoredGroups>,
    pub lanes: Arc<GroupLanes>,
    pub keyword: String,
}

pub async fn handle_event<T: Transport>(
    ctx: &RouterContext,
    transport: &T,
    event: Event,
) -> LoopControl {
    match event {
        Event::ConnectionClosed { logout } => {
            if logout {
                LoopControl::Logout
            } else {
                LoopControl::Reconnect
            }
        }
        other => {
            if let Err(e) = dispatch(ctx, transport, other).await {
                log::error!("Event handler failed: {}", e);
            }
            LoopControl::Continue
        }
    }
}

async fn dispatch<T: Transport>(
    ctx: &RouterContext,
    transport: &T,
    event: Event,
) -> Result<(), String> {
    match event {
        Event::ConnectionOpened => on_connection_opened(ctx, transport).await,
        Event::AddedToGroup { meta } => on_added_to_group(ctx, &meta).await,
        Event::GroupMetadataChanged { group_id, name } => {
            on_group_renamed(ctx, transport, &group_id, name.as_deref()).await
        }
        Event::ParticipantsUpdate {
            group_id,
            action,
            phones,
        } => on_participants_update(ctx, transport, &group_id, action, &phones).await,
        Event::TextMessage {
            chat_id,
            group_id,
            from_self,
            text,
        } => on_text_message(ctx, transport, &chat_id, group_id.as_deref(), from_self, &text).await,
        // Lifecycle events never reach dispatch
        Event::ConnectionClosed { .. } => Ok(()),
    }
}

/// Register a group as monitored and reconcile its full roster.
async fn register_and_sync(ctx: &RouterContext, meta: &GroupMetadata) -> Result<(), String> {
    add_group_to_monitored(&ctx.db, &ctx.monitored, &meta.id, meta.subject.as_deref())?;
    let roster: HashSet<String> = meta.participants.iter().cloned().collect();
    reconciler::sync_group_members(&ctx.db, &ctx.monitored, &ctx.lanes, &meta.id, &roster).await
}

/// Full scan on connection open: every participating group whose name
/// matches the keyword gets registered and reconciled. One group failing
/// does not abort the scan.
async fn on_connection_opened<T: Transport>(
    ctx: &RouterContext,
    transport: &T,
) -> Result<(), String> {
    let groups = transport.participating_groups().await?;
    log::info!(
        "Connection open; scanning {} group(s) for keyword matches",
        groups.len()
    );

    for meta in &groups {
        if !matches_keyword(meta.subject.as_deref(), &ctx.keyword) {
            continue;
        }
        if let Err(e) = register_and_sync(ctx, meta).await {
            log::warn!("Scan failed for group {}: {}", meta.id, e);
        }
    }
    Ok(())
}

async fn on_added_to_group(ctx: &RouterContext, meta: &GroupMetadata) -> Result<(), String> {
    if !matches_keyword(meta.subject.as_deref(), &ctx.keyword) {
        log::debug!("Added to non-matching group {}; ignoring", meta.id);
        return Ok(());
    }

    add_group_to_monitored(&ctx.db, &ctx.monitored, &meta.id, meta.subject.as_deref())?;
    if !meta.participants.is_empty() {
        let roster: HashSet<String> = meta.participants.iter().cloned().collect();
        reconciler::sync_group_members(&ctx.db, &ctx.monitored, &ctx.lanes, &meta.id, &roster)
            .await?;
    }
    Ok(())
}

async fn on_group_renamed<T: Transport>(
    ctx: &RouterContext,
    transport: &T,
    group_id: &str,
    name: Option<&str>,
) -> Result<(), String> {
    if ctx.monitored.contains(group_id) {
        // A metadata frame without a subject carries nothing to store;
        // writing NULL would silently reclassify the group as forced
        let Some(new_name) = name else {
            return Ok(());
        };
        ctx.db
            .set_group_name(group_id, Some(new_name))
            .map_err(|e| format!("Failed to rename group {}: {}", group_id, e))?;
        if !matches_keyword(Some(new_name), &ctx.keyword) {
            // Monitoring is sticky once established
            log::warn!(
                "Monitored group {} renamed to {:?}, which no longer matches the keyword; keeping it monitored",
                group_id,
                new_name
            );
        }
        return Ok(());
    }

    if matches_keyword(name, &ctx.keyword) {
        let meta = transport.group_metadata(group_id).await?;
        register_and_sync(ctx, &meta).await?;
    }
    Ok(())
}

async fn on_participants_update<T: Transport>(
    ctx: &RouterContext,
    transport: &T,
    group_id: &str,
    action: ParticipantAction,
    phones: &[String],
) -> Result<(), String> {
    if !ctx.monitored.contains(group_id) {
        let meta = transport.group_metadata(group_id).await?;
        if !matches_keyword(meta.subject.as_deref(), &ctx.keyword) {
            log::debug!(
                "Participant update for unmonitored, non-matching group {}; ignoring",
                group_id
            );
            return Ok(());
        }
        // First sighting of a matching group: take the full roster, then
        // still apply this event's delta on top.
        register_and_sync(ctx, &meta).await?;
    }

    match action {
        ParticipantAction::Add => {
            reconciler::handle_members_added(&ctx.db, &ctx.monitored, &ctx.lanes, group_id, phones)
                .await
        }
        ParticipantAction::Remove => {
            reconciler::handle_members_removed(&ctx.db, &ctx.monitored, &ctx.lanes, group_id, phones)
                .await
        }
    }
}

/// Exact-match, case-sensitive command handling on self-authored plain
/// text only.
async fn on_text_message<T: Transport>(
    ctx: &RouterContext,
    transport: &T,
    chat_id: &str,
    group_id: Option<&str>,
    from_self: bool,
    text: &str,
) -> Result<(), String> {
    if !from_self {
        return Ok(());
    }

    match text {
        "Hi!" => {
            let Some(gid) = group_id else {
                return Ok(());
            };
            let meta = transport.group_metadata(gid).await?;
            if matches_keyword(meta.subject.as_deref(), &ctx.keyword) {
                register_and_sync(ctx, &meta).await?;
            }
        }
        "sync" => {
            let Some(gid) = group_id else {
                return Ok(());
            };
            // Force monitor: bypasses the keyword predicate entirely
            let meta = transport.group_metadata(gid).await?;
            add_group_to_monitored(&ctx.db, &ctx.monitored, gid, meta.subject.as_deref())?;
            let roster: HashSet<String> = meta.participants.iter().cloned().collect();
            reconciler::sync_group_members(&ctx.db, &ctx.monitored, &ctx.lanes, gid, &roster)
                .await?;
        }
        "check" => {
            let report = status::format_database_status(&status::get_database_status(
                &ctx.db,
                &ctx.keyword,
            )?);
            log::info!("Status report requested:\n{}", report);
            transport.send_text(chat_id, &report).await?;
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;
    use async_trait::async_trait;
    use group_monitor_types::MonitorKind;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FakeTransport {
        groups: Mutex<HashMap<String, GroupMetadata>>,
        sent: Mutex<Vec<(String, String)>>,
    }

    impl FakeTransport {
        fn new() -> Self {
            Self {
                groups: Mutex::new(HashMap::new()),
                sent: Mutex::new(Vec::new()),
            }
        }

        fn with_group(self, id: &str, subject: Option<&str>, participants: &[&str]) -> Self {
            self.groups.lock().unwrap().insert(
                id.to_string(),
                GroupMetadata {
                    id: id.to_string(),
                    subject: subject.map(|s| s.to_string()),
                    participants: participants.iter().map(|p| p.to_string()).collect(),
                },
            );
            self
        }

        fn sent_messages(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn group_metadata(&self, group_id: &str) -> Result<GroupMetadata, String> {
            self.groups
                .lock()
                .unwrap()
                .get(group_id)
                .cloned()
                .ok_or_else(|| format!("unknown group {}", group_id))
        }

        async fn participating_groups(&self) -> Result<Vec<GroupMetadata>, String> {
            let mut groups: Vec<GroupMetadata> =
                self.groups.lock().unwrap().values().cloned().collect();
            groups.sort_by(|a, b| a.id.cmp(&b.id));
            Ok(groups)
        }

        async fn send_text(&self, chat_id: &str, text: &str) -> Result<(), String> {
            self.sent
                .lock()
                .unwrap()
                .push((chat_id.to_string(), text.to_string()));
            Ok(())
        }
    }

    fn test_ctx() -> RouterContext {
        RouterContext {
            db: Arc::new(Db::open(":memory:").unwrap()),
            monitored: Arc::new(MonitoredGroups::new()),
            lanes: Arc::new(GroupLanes::new()),
            keyword: "neol".to_string(),
        }
    }

    fn active_map(ctx: &RouterContext, group_id: &str) -> Vec<(String, bool)> {
        let mut members: Vec<(String, bool)> = ctx
            .db
            .list_members(group_id)
            .unwrap()
            .into_iter()
            .map(|m| (m.phone, m.active))
            .collect();
        members.sort();
        members
    }

    #[tokio::test]
    async fn connection_open_registers_matching_groups() {
        let ctx = test_ctx();
        let transport = FakeTransport::new()
            .with_group("g1", Some("Neol Friends"), &["111", "222"])
            .with_group("g2", Some("Other Chat"), &["333"]);

        let control = handle_event(&ctx, &transport, Event::ConnectionOpened).await;
        assert_eq!(control, LoopControl::Continue);

        let group = ctx.db.get_group("g1").unwrap().unwrap();
        assert!(group.monitored);
        assert_eq!(group.name.as_deref(), Some("Neol Friends"));
        assert_eq!(
            active_map(&ctx, "g1"),
            vec![("111".to_string(), true), ("222".to_string(), true)]
        );

        assert!(ctx.db.get_group("g2").unwrap().is_none());
        assert!(!ctx.monitored.contains("g2"));
    }

    #[tokio::test]
    async fn participant_remove_flips_only_that_record() {
        let ctx = test_ctx();
        let transport =
            FakeTransport::new().with_group("g1", Some("Neol Friends"), &["111", "222"]);
        handle_event(&ctx, &transport, Event::ConnectionOpened).await;

        handle_event(
            &ctx,
            &transport,
            Event::ParticipantsUpdate {
                group_id: "g1".to_string(),
                action: ParticipantAction::Remove,
                phones: vec!["111".to_string()],
            },
        )
        .await;

        assert_eq!(
            active_map(&ctx, "g1"),
            vec![("111".to_string(), false), ("222".to_string(), true)]
        );
    }

    #[tokio::test]
    async fn participant_update_on_unmonitored_matching_group_registers_first() {
        let ctx = test_ctx();
        let transport =
            FakeTransport::new().with_group("g1", Some("Neol Hikers"), &["111", "222"]);

        handle_event(
            &ctx,
            &transport,
            Event::ParticipantsUpdate {
                group_id: "g1".to_string(),
                action: ParticipantAction::Add,
                phones: vec!["333".to_string()],
            },
        )
        .await;

        // Full roster reconciled, then the delta applied on top
        assert_eq!(
            active_map(&ctx, "g1"),
            vec![
                ("111".to_string(), true),
                ("222".to_string(), true),
                ("333".to_string(), true),
            ]
        );
        assert!(ctx.monitored.contains("g1"));
    }

    #[tokio::test]
    async fn participant_update_on_non_matching_group_is_noop() {
        let ctx = test_ctx();
        let transport = FakeTransport::new().with_group("g1", Some("Random Chat"), &["111"]);

        handle_event(
            &ctx,
            &transport,
            Event::ParticipantsUpdate {
                group_id: "g1".to_string(),
                action: ParticipantAction::Add,
                phones: vec!["111".to_string()],
            },
        )
        .await;

        assert!(ctx.db.get_group("g1").unwrap().is_none());
        assert!(ctx.db.list_members("g1").unwrap().is_empty());
    }

    #[tokio::test]
    async fn rename_away_from_keyword_is_sticky() {
        let ctx = test_ctx();
        let transport =
            FakeTransport::new().with_group("g1", Some("Neol Friends"), &["111"]);
        handle_event(&ctx, &transport, Event::ConnectionOpened).await;

        handle_event(
            &ctx,
            &transport,
            Event::GroupMetadataChanged {
                group_id: "g1".to_string(),
                name: Some("Plain Chat".to_string()),
            },
        )
        .await;

        // Still monitored, name updated
        assert!(ctx.monitored.contains("g1"));
        let group = ctx.db.get_group("g1").unwrap().unwrap();
        assert!(group.monitored);
        assert_eq!(group.name.as_deref(), Some("Plain Chat"));
    }

    #[tokio::test]
    async fn rename_without_subject_keeps_stored_name() {
        let ctx = test_ctx();
        let transport =
            FakeTransport::new().with_group("g1", Some("Neol Friends"), &["111"]);
        handle_event(&ctx, &transport, Event::ConnectionOpened).await;

        handle_event(
            &ctx,
            &transport,
            Event::GroupMetadataChanged {
                group_id: "g1".to_string(),
                name: None,
            },
        )
        .await;

        let group = ctx.db.get_group("g1").unwrap().unwrap();
        assert_eq!(group.name.as_deref(), Some("Neol Friends"));

        // Still classified as a keyword group in the report
        let status = status::get_database_status(&ctx.db, &ctx.keyword).unwrap();
        assert_eq!(status.target_groups, 1);
        assert_eq!(status.force_monitored_groups, 0);
    }

    #[tokio::test]
    async fn rename_to_keyword_registers_and_reconciles() {
        let ctx = test_ctx();
        let transport =
            FakeTransport::new().with_group("g1", Some("Neol Crew"), &["111", "222"]);

        handle_event(
            &ctx,
            &transport,
            Event::GroupMetadataChanged {
                group_id: "g1".to_string(),
                name: Some("Neol Crew".to_string()),
            },
        )
        .await;

        assert!(ctx.monitored.contains("g1"));
        assert_eq!(
            active_map(&ctx, "g1"),
            vec![("111".to_string(), true), ("222".to_string(), true)]
        );
    }

    #[tokio::test]
    async fn added_to_matching_group_registers() {
        let ctx = test_ctx();
        let transport = FakeTransport::new();

        handle_event(
            &ctx,
            &transport,
            Event::AddedToGroup {
                meta: GroupMetadata {
                    id: "g1".to_string(),
                    subject: Some("Neol Runners".to_string()),
                    participants: vec!["111".to_string()],
                },
            },
        )
        .await;

        assert!(ctx.monitored.contains("g1"));
        assert_eq!(active_map(&ctx, "g1"), vec![("111".to_string(), true)]);
    }

    #[tokio::test]
    async fn added_to_group_without_roster_registers_without_sync() {
        let ctx = test_ctx();
        let transport = FakeTransport::new();

        handle_event(
            &ctx,
            &transport,
            Event::AddedToGroup {
                meta: GroupMetadata {
                    id: "g1".to_string(),
                    subject: Some("Neol Runners".to_string()),
                    participants: vec![],
                },
            },
        )
        .await;

        assert!(ctx.monitored.contains("g1"));
        assert!(ctx.db.list_members("g1").unwrap().is_empty());
    }

    #[tokio::test]
    async fn sync_command_force_registers_non_matching_group() {
        let ctx = test_ctx();
        let transport = FakeTransport::new().with_group("g1", Some("Random Chat"), &["555"]);

        handle_event(
            &ctx,
            &transport,
            Event::TextMessage {
                chat_id: "g1".to_string(),
                group_id: Some("g1".to_string()),
                from_self: true,
                text: "sync".to_string(),
            },
        )
        .await;

        assert!(ctx.monitored.contains("g1"));
        assert_eq!(active_map(&ctx, "g1"), vec![("555".to_string(), true)]);

        let status = status::get_database_status(&ctx.db, &ctx.keyword).unwrap();
        assert_eq!(status.force_monitored_groups, 1);
        assert_eq!(
            status.groups[0].monitor_kind,
            MonitorKind::Forced
        );
    }

    #[tokio::test]
    async fn hi_command_registers_only_on_keyword_match() {
        let ctx = test_ctx();
        let transport = FakeTransport::new()
            .with_group("g1", Some("Random Chat"), &["111"])
            .with_group("g2", Some("Neol Friends"), &["222"]);

        for gid in ["g1", "g2"] {
            handle_event(
                &ctx,
                &transport,
                Event::TextMessage {
                    chat_id: gid.to_string(),
                    group_id: Some(gid.to_string()),
                    from_self: true,
                    text: "Hi!".to_string(),
                },
            )
            .await;
        }

        assert!(!ctx.monitored.contains("g1"));
        assert!(ctx.monitored.contains("g2"));
        assert_eq!(active_map(&ctx, "g2"), vec![("222".to_string(), true)]);
    }

    #[tokio::test]
    async fn check_command_replies_with_report() {
        let ctx = test_ctx();
        let transport =
            FakeTransport::new().with_group("g1", Some("Neol Friends"), &["111", "222"]);
        handle_event(&ctx, &transport, Event::ConnectionOpened).await;

        handle_event(
            &ctx,
            &transport,
            Event::TextMessage {
                chat_id: "me@chat".to_string(),
                group_id: None,
                from_self: true,
                text: "check".to_string(),
            },
        )
        .await;

        let sent = transport.sent_messages();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "me@chat");
        assert!(sent[0].1.starts_with("=== Group Monitor Status ==="));
        assert!(sent[0].1.contains("[keyword] Neol Friends (g1)"));
    }

    #[tokio::test]
    async fn commands_are_exact_and_case_sensitive() {
        let ctx = test_ctx();
        let transport = FakeTransport::new().with_group("g1", Some("Random Chat"), &["111"]);

        for text in ["SYNC", "sync ", "Sync", "hi!", "Check"] {
            handle_event(
                &ctx,
                &transport,
                Event::TextMessage {
                    chat_id: "g1".to_string(),
                    group_id: Some("g1".to_string()),
                    from_self: true,
                    text: text.to_string(),
                },
            )
            .await;
        }

        assert!(!ctx.monitored.contains("g1"));
        assert!(transport.sent_messages().is_empty());
    }

    #[tokio::test]
    async fn messages_from_others_are_ignored() {
        let ctx = test_ctx();
        let transport = FakeTransport::new().with_group("g1", Some("Random Chat"), &["111"]);

        handle_event(
            &ctx,
            &transport,
            Event::TextMessage {
                chat_id: "g1".to_string(),
                group_id: Some("g1".to_string()),
                from_self: false,
                text: "sync".to_string(),
            },
        )
        .await;

        assert!(!ctx.monitored.contains("g1"));
    }

    #[tokio::test]
    async fn connection_closed_maps_to_loop_control() {
        let ctx = test_ctx();
        let transport = FakeTransport::new();

        assert_eq!(
            handle_event(&ctx, &transport, Event::ConnectionClosed { logout: false }).await,
            LoopControl::Reconnect
        );
        assert_eq!(
            handle_event(&ctx, &transport, Event::ConnectionClosed { logout: true }).await,
            LoopControl::Logout
        );
    }

    #[tokio::test]
    async fn handler_errors_are_swallowed() {
        let ctx = test_ctx();
        // No groups in the fake: metadata fetch fails
        let transport = FakeTransport::new();

        let control = handle_event(
            &ctx,
            &transport,
            Event::TextMessage {
                chat_id: "g1".to_string(),
                group_id: Some("g1".to_string()),
                from_self: true,
                text: "sync".to_string(),
            },
        )
        .await;

        assert_eq!(control, LoopControl::Continue);
        assert!(!ctx.monitored.contains("g1"));
    }
}
