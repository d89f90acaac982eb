//! Saved conversation history.
//!
//! Conversations are saved without tool messages and listed per owner. Stored
//! records are decoded one at a time; a damaged record is defaulted or
//! skipped instead of failing the list.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;

use shadow_chat_core::{Conversation, Message, OwnerId};

use crate::client::ApiClient;
use crate::error::Result;

/// Bracketed citation markers such as `[doc1]`.
static CITATION_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[.*?\]").expect("citation marker pattern is valid"));

/// Remote store for named conversations.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Persist `messages` under `title` for `owner`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the record or is unreachable.
    async fn save(&self, owner: &OwnerId, title: &str, messages: &[Message]) -> Result<()>;

    /// Every conversation stored for `owner`.
    ///
    /// # Errors
    ///
    /// Returns an error if the list itself cannot be fetched. Damaged records
    /// never cause an error.
    async fn list(&self, owner: &OwnerId) -> Result<Vec<Conversation>>;
}

/// Messages to persist: tool messages dropped, markers optionally stripped.
#[must_use]
pub fn prepare_for_save(messages: &[Message], strip_markers: bool) -> Vec<Message> {
    messages
        .iter()
        .filter(|message| !message.is_tool())
        .map(|message| {
            if strip_markers {
                Message {
                    role: message.role,
                    content: strip_citation_markers(&message.content),
                }
            } else {
                message.clone()
            }
        })
        .collect()
}

/// Remove `[...]` citation markers from `text`.
#[must_use]
pub fn strip_citation_markers(text: &str) -> String {
    CITATION_MARKER.replace_all(text, "").into_owned()
}

/// Decode stored records, dropping those that are not objects.
#[must_use]
pub fn decode_records(records: &[serde_json::Value]) -> Vec<Conversation> {
    let conversations: Vec<Conversation> =
        records.iter().filter_map(Conversation::from_record).collect();

    let skipped = records.len() - conversations.len();
    if skipped > 0 {
        tracing::debug!(skipped, "Skipped undecodable conversation records");
    }
    conversations
}

#[async_trait]
impl ConversationStore for ApiClient {
    async fn save(&self, owner: &OwnerId, title: &str, messages: &[Message]) -> Result<()> {
        self.save_conversation(owner, title, messages).await?;
        tracing::info!(owner = %owner, title, messages = messages.len(), "Conversation saved");
        Ok(())
    }

    async fn list(&self, owner: &OwnerId) -> Result<Vec<Conversation>> {
        let records = self.select_conversation_history(owner).await?;
        Ok(decode_records(&records))
    }
}

/// In-memory store for tests.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Default)]
pub struct MemoryConversationStore {
    records: parking_lot::Mutex<Vec<serde_json::Value>>,
}

#[cfg(any(test, feature = "test-utils"))]
impl MemoryConversationStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a raw record, valid or not.
    pub fn insert_raw(&self, record: serde_json::Value) {
        self.records.lock().push(record);
    }

    /// Raw records in insertion order.
    #[must_use]
    pub fn records(&self) -> Vec<serde_json::Value> {
        self.records.lock().clone()
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn save(&self, owner: &OwnerId, title: &str, messages: &[Message]) -> Result<()> {
        let record = serde_json::json!({
            "id": shadow_chat_core::ConversationId::generate(),
            "title": title,
            "user": owner.as_str(),
            "messages": messages,
        });
        self.insert_raw(record);
        Ok(())
    }

    async fn list(&self, owner: &OwnerId) -> Result<Vec<Conversation>> {
        let records: Vec<serde_json::Value> = self
            .records
            .lock()
            .iter()
            .filter(|record| {
                record.get("user").and_then(serde_json::Value::as_str) == Some(owner.as_str())
            })
            .cloned()
            .collect();
        Ok(decode_records(&records))
    }
}
