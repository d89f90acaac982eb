//! Chat client for shadow-chat.
//!
//! This crate talks to the chat backend and keeps the state a front end
//! renders:
//!
//! - **Streaming**: reassembles the newline-delimited response body into frames
//! - **Session**: the message sequence, loading flags and open citation
//! - **History**: saving and listing named conversations
//! - **Cancellation**: stopping sends that are still in flight
//!
//! # Example
//!
//! ```no_run
//! use shadow_chat_client::{ChatController, ClientConfig, TurnOutcome};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let controller = ChatController::new(&ClientConfig::default())?;
//!
//! if controller.send("Summarise the Q3 pricing changes").await == TurnOutcome::Completed {
//!     for message in controller.session().messages() {
//!         println!("{}: {}", message.role, message.content);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod auth;
pub mod cancel;
pub mod client;
pub mod config;
pub mod controller;
pub mod error;
pub mod history;
pub mod session;
pub mod stream;

pub use auth::{AuthState, UserInfo};
pub use cancel::CancellationRegistry;
pub use client::ApiClient;
pub use config::{ClientConfig, MergePolicy};
pub use controller::{ChatController, ChatEvent, TurnOutcome};
pub use error::{ClientError, Result};
pub use history::{ConversationStore, prepare_for_save, strip_citation_markers};
pub use session::{Session, Turn, GENERIC_FAILURE_NOTICE};
pub use stream::{read_frames, FrameAssembler, StreamError, StreamFrame};

#[cfg(any(test, feature = "test-utils"))]
pub use history::MemoryConversationStore;
