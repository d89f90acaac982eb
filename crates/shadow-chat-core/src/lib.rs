//! Core types for shadow-chat.
//!
//! This crate provides the data model shared by the client library and the CLI:
//!
//! - **Messages**: the role-tagged chat messages exchanged with the backend
//! - **Stream frames**: the `ChatResponse` objects the chat endpoint streams back
//! - **Conversations**: named, persisted snapshots of a message sequence
//! - **Identifiers**: request, conversation and owner IDs
//!
//! # Example
//!
//! ```
//! use shadow_chat_core::{Message, Role, RequestId};
//!
//! let question = Message::user("What changed in Q3?");
//! assert_eq!(question.role, Role::User);
//!
//! let request_id = RequestId::generate();
//! assert_ne!(request_id, RequestId::generate());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod ids;
pub mod types;

pub use error::{CoreError, Result};
pub use ids::{ConversationId, IdError, OwnerId, RequestId};
pub use types::{
    ChatChoice, ChatResponse, Citation, Conversation, ConversationRequest, Message, Role,
    ToolMessageContent,
};
