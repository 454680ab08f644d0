//! Client for the sidecar messaging bridge.
//!
//! The bridge process owns the messaging protocol, authentication (QR or
//! pairing code) and the multi-file session credentials. This side talks
//! to it over one TCP connection carrying newline-delimited JSON frames:
//! events flow in and are mapped onto router `Event`s; requests flow out
//! and are correlated to `response` frames by numeric id.

use crate::router::{Event, ParticipantAction};
use crate::transport::{GroupMetadata, Transport};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, oneshot};

// =====================================================
// Wire Types
// =====================================================

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeRequest {
    Hello {
        auth: String,
        mark_online: bool,
    },
    GroupMetadata {
        id: u64,
        group_id: String,
    },
    ParticipatingGroups {
        id: u64,
    },
    SendText {
        id: u64,
        chat_id: String,
        text: String,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeMessage {
    ConnectionOpened,
    ConnectionClosed {
        #[serde(default)]
        logout: bool,
    },
    GroupUpsert {
        group: GroupMetadata,
    },
    GroupUpdate {
        group_id: String,
        subject: Option<String>,
    },
    ParticipantsUpdate {
        group_id: String,
        action: String,
        participants: Vec<String>,
    },
    Message {
        chat_id: String,
        group_id: Option<String>,
        from_self: bool,
        text: Option<String>,
    },
    Response {
        id: u64,
        #[serde(default)]
        ok: bool,
        #[serde(default)]
        error: Option<String>,
        #[serde(default)]
        data: serde_json::Value,
    },
}

type PendingMap = DashMap<u64, oneshot::Sender<Result<serde_json::Value, String>>>;

// =====================================================
// Client
// =====================================================

pub struct BridgeClient {
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    pending: Arc<PendingMap>,
    next_id: AtomicU64,
}

impl BridgeClient {
    /// Connect to the bridge, send the hello frame, and spawn the reader
    /// task that feeds decoded events into `events`.
    ///
    /// The event channel is unbounded: the reader is also the only path
    /// for response frames, and a handler may block on a request while
    /// further events queue up. A bounded send here could stall the
    /// reader behind that backlog and the pending response would never
    /// be read.
    pub async fn connect(
        addr: &str,
        auth: &str,
        mark_online: bool,
        events: mpsc::UnboundedSender<Event>,
    ) -> Result<Arc<Self>, String> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| format!("Failed to connect to bridge at {}: {}", addr, e))?;
        let (read_half, write_half) = stream.into_split();

        let client = Arc::new(Self {
            writer: tokio::sync::Mutex::new(write_half),
            pending: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
        });

        client
            .send_frame(&BridgeRequest::Hello {
                auth: auth.to_string(),
                mark_online,
            })
            .await?;

        tokio::spawn(read_loop(read_half, client.pending.clone(), events));
        Ok(client)
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn send_frame(&self, request: &BridgeRequest) -> Result<(), String> {
        let mut line = serde_json::to_string(request)
            .map_err(|e| format!("Failed to serialize bridge request: {}", e))?;
        line.push('\n');

        let mut writer = self.writer.lock().await;
        writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| format!("Bridge write failed: {}", e))?;
        writer
            .flush()
            .await
            .map_err(|e| format!("Bridge flush failed: {}", e))
    }

    async fn request(&self, request: &BridgeRequest, id: u64) -> Result<serde_json::Value, String> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        if let Err(e) = self.send_frame(request).await {
            self.pending.remove(&id);
            return Err(e);
        }

        match rx.await {
            Ok(result) => result,
            Err(_) => Err("Bridge connection closed before response".to_string()),
        }
    }
}

#[async_trait]
impl Transport for BridgeClient {
    async fn group_metadata(&self, group_id: &str) -> Result<GroupMetadata, String> {
        let id = self.next_id();
        let data = self
            .request(
                &BridgeRequest::GroupMetadata {
                    id,
                    group_id: group_id.to_string(),
                },
                id,
            )
            .await?;
        serde_json::from_value(data).map_err(|e| format!("Malformed group metadata: {}", e))
    }

    async fn participating_groups(&self) -> Result<Vec<GroupMetadata>, String> {
        let id = self.next_id();
        let data = self
            .request(&BridgeRequest::ParticipatingGroups { id }, id)
            .await?;
        serde_json::from_value(data).map_err(|e| format!("Malformed group list: {}", e))
    }

    async fn send_text(&self, chat_id: &str, text: &str) -> Result<(), String> {
        let id = self.next_id();
        self.request(
            &BridgeRequest::SendText {
                id,
                chat_id: chat_id.to_string(),
                text: text.to_string(),
            },
            id,
        )
        .await
        .map(|_| ())
    }
}

// =====================================================
// Reader Task
// =====================================================

async fn read_loop(
    read_half: OwnedReadHalf,
    pending: Arc<PendingMap>,
    events: mpsc::UnboundedSender<Event>,
) {
    let mut lines = BufReader::new(read_half).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<BridgeMessage>(&line) {
                    Ok(BridgeMessage::Response {
                        id,
                        ok,
                        error,
                        data,
                    }) => {
                        if let Some((_, tx)) = pending.remove(&id) {
                            let result = if ok {
                                Ok(data)
                            } else {
                                Err(error.unwrap_or_else(|| "bridge request failed".to_string()))
                            };
                            let _ = tx.send(result);
                        } else {
                            log::warn!("Response for unknown request id {}", id);
                        }
                    }
                    Ok(message) => {
                        if let Some(event) = to_event(message) {
                            if events.send(event).is_err() {
                                break;
                            }
                        }
                    }
                    Err(e) => log::warn!("Unparseable bridge frame: {}", e),
                }
            }
            Ok(None) => break,
            Err(e) => {
                log::warn!("Bridge read error: {}", e);
                break;
            }
        }
    }

    // Fail any requests still waiting, then report the stream as closed
    pending.clear();
    let _ = events.send(Event::ConnectionClosed { logout: false });
}

fn to_event(message: BridgeMessage) -> Option<Event> {
    match message {
        BridgeMessage::ConnectionOpened => Some(Event::ConnectionOpened),
        BridgeMessage::ConnectionClosed { logout } => Some(Event::ConnectionClosed { logout }),
        BridgeMessage::GroupUpsert { group } => Some(Event::AddedToGroup { meta: group }),
        BridgeMessage::GroupUpdate { group_id, subject } => Some(Event::GroupMetadataChanged {
            group_id,
            name: subject,
        }),
        BridgeMessage::ParticipantsUpdate {
            group_id,
            action,
            participants,
        } => {
            let action = match action.as_str() {
                "add" => ParticipantAction::Add,
                "remove" => ParticipantAction::Remove,
                other => {
                    log::debug!("Ignoring participant action {:?} for {}", other, group_id);
                    return None;
                }
            };
            Some(Event::ParticipantsUpdate {
                group_id,
                action,
                phones: participants,
            })
        }
        BridgeMessage::Message {
            chat_id,
            group_id,
            from_self,
            text,
        } => {
            // Rich message types carry no plain-text body and are ignored
            let text = text?;
            Some(Event::TextMessage {
                chat_id,
                group_id,
                from_self,
                text,
            })
        }
        BridgeMessage::Response { .. } => None,
    }
}
