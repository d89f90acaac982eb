//! Message, frame and conversation types.
//!
//! These types mirror the JSON exchanged with the chat backend.

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{CoreError, Result};
use crate::ids::ConversationId;

// =============================================================================
// Messages
// =============================================================================

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Text typed by the user.
    User,
    /// Model output.
    Assistant,
    /// Retrieval output; content is a JSON `ToolMessageContent` document.
    Tool,
}

impl Role {
    /// Wire name of the role.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single chat message.
///
/// Decoding is strict: an unknown role or a missing or `null` content fails,
/// so a frame carrying such a message is rejected as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Who produced the message.
    pub role: Role,
    /// Message text.
    pub content: String,
}

impl Message {
    /// Create a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    /// Create a tool message.
    #[must_use]
    pub fn tool(content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
        }
    }

    /// Check if this is a tool message.
    #[must_use]
    pub fn is_tool(&self) -> bool {
        self.role == Role::Tool
    }

    /// Citations carried by this message.
    ///
    /// Only tool messages carry citations. Content that does not parse as a
    /// `ToolMessageContent` document yields none.
    #[must_use]
    pub fn citations(&self) -> Vec<Citation> {
        if !self.is_tool() {
            return Vec::new();
        }
        serde_json::from_str::<ToolMessageContent>(&self.content)
            .map(|content| content.citations)
            .unwrap_or_default()
    }
}

// =============================================================================
// Citations
// =============================================================================

/// A source document referenced by an answer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    /// Source identifier. The retrieval extension sends `null` for some indexes.
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    /// Document title.
    #[serde(default)]
    pub title: Option<String>,
    /// Path of the source file inside the index.
    #[serde(default)]
    pub filepath: Option<String>,
    /// Source URL.
    #[serde(default)]
    pub url: Option<String>,
    /// Opaque metadata attached by the index.
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    /// Cited passage (markdown).
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    /// Chunk identifier within the document.
    #[serde(default)]
    pub chunk_id: Option<String>,
    /// Reindex identifier.
    #[serde(default)]
    pub reindex_id: Option<String>,
}

impl Citation {
    /// Title to display, falling back to an empty string.
    #[must_use]
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("")
    }
}

/// Content of a tool-role message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolMessageContent {
    /// Retrieved citations.
    #[serde(default)]
    pub citations: Vec<Citation>,
    /// Search intent reported by the retrieval extension.
    #[serde(default, deserialize_with = "null_as_default")]
    pub intent: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// =============================================================================
// Chat endpoint
// =============================================================================

/// Request body for the chat endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationRequest {
    /// Prior messages followed by the new user message.
    pub messages: Vec<Message>,
}

/// One choice inside a response frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatChoice {
    /// Messages produced so far for this turn. Required: a choice without
    /// them is not a usable frame.
    pub messages: Vec<Message>,
}

/// One frame of the streamed chat response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Completion ID assigned upstream.
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    /// Model deployment that produced the frame.
    #[serde(default, deserialize_with = "null_as_default")]
    pub model: String,
    /// Unix timestamp of the completion.
    #[serde(default, deserialize_with = "null_as_default")]
    pub created: i64,
    /// Upstream object type.
    #[serde(default, deserialize_with = "null_as_default")]
    pub object: String,
    /// Choices; only the first one is used.
    pub choices: Vec<ChatChoice>,
}

impl ChatResponse {
    /// Build a single-choice frame. Handy for tests and fixtures.
    #[must_use]
    pub fn from_messages(messages: Vec<Message>) -> Self {
        Self {
            id: String::new(),
            model: String::new(),
            created: 0,
            object: String::new(),
            choices: vec![ChatChoice { messages }],
        }
    }

    /// Messages of the first choice.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::MalformedFrame` if the frame has no choices.
    pub fn messages(&self) -> Result<&[Message]> {
        self.choices
            .first()
            .map(|choice| choice.messages.as_slice())
            .ok_or_else(|| CoreError::MalformedFrame("frame has no choices".to_string()))
    }
}

// =============================================================================
// Conversations
// =============================================================================

/// A named, persisted snapshot of a message sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Server-assigned ID, absent until stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ConversationId>,
    /// User-supplied title.
    #[serde(default)]
    pub title: String,
    /// Owner identifier.
    #[serde(rename = "user", default)]
    pub owner: String,
    /// Stored messages, in order.
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Conversation {
    /// Decode one stored record, tolerating damaged fields.
    ///
    /// Returns `None` only when the record is not a JSON object. A missing or
    /// non-string title becomes `""`, an unparseable ID becomes `None`, and
    /// individual messages that fail to decode are dropped.
    #[must_use]
    pub fn from_record(record: &serde_json::Value) -> Option<Self> {
        let obj = record.as_object()?;

        let text_field = |key: &str| {
            obj.get(key)
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        let id = obj
            .get("id")
            .and_then(serde_json::Value::as_str)
            .and_then(|s| s.parse().ok());

        let messages = obj
            .get("messages")
            .and_then(serde_json::Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| Message::deserialize(item).ok())
                    .collect()
            })
            .unwrap_or_default();

        Some(Self {
            id,
            title: text_field("title"),
            owner: text_field("user"),
            messages,
        })
    }
}
