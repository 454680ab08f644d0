//! Seam over the external messaging client.
//!
//! Everything the router needs from the transport lives behind this
//! trait, so handlers are unit-testable without a live connection. The
//! production implementation is the bridge client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Group metadata as reported by the messaging client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMetadata {
    pub id: String,
    pub subject: Option<String>,
    #[serde(default)]
    pub participants: Vec<String>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch metadata (name + roster) for one group.
    async fn group_metadata(&self, group_id: &str) -> Result<GroupMetadata, String>;

    /// Enumerate all groups the account participates in.
    async fn participating_groups(&self) -> Result<Vec<GroupMetadata>, String>;

    /// Send a plain-text message to a chat.
    async fn send_text(&self, chat_id: &str, text: &str) -> Result<(), String>;
}
