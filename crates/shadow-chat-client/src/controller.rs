//! Chat orchestration.
//!
//! `ChatController` ties one session to the backend: it sends questions,
//! streams the answers into the session, and saves or restores conversations.
//! Front ends either poll `session()` or subscribe to `ChatEvent`s.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use shadow_chat_core::{ChatResponse, Citation, Conversation, ConversationRequest, Message, OwnerId, RequestId};

use crate::auth::{self, AuthState};
use crate::cancel::CancellationRegistry;
use crate::client::ApiClient;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::history::{prepare_for_save, ConversationStore};
use crate::session::{Session, Turn, GENERIC_FAILURE_NOTICE};
use crate::stream::{read_frames, StreamError};

/// Progress of a send, for front ends that render incrementally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// The question was sent; no frame has arrived yet.
    Generating {
        /// Request carrying the turn.
        request_id: RequestId,
    },
    /// A frame was merged into the session.
    Frame {
        /// Request carrying the turn.
        request_id: RequestId,
        /// Messages of the frame.
        messages: Vec<Message>,
    },
    /// The stream ended normally.
    Completed {
        /// Request carrying the turn.
        request_id: RequestId,
    },
    /// The turn was stopped by the user.
    Aborted {
        /// Request carrying the turn.
        request_id: RequestId,
    },
    /// The turn failed.
    Failed {
        /// Request carrying the turn.
        request_id: RequestId,
        /// Text to show the user.
        notice: String,
    },
}

/// How a send ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The stream ended normally.
    Completed,
    /// The turn was stopped; only the user message remains.
    Aborted,
    /// The turn failed; only the user message remains and a notice is pending.
    Failed,
}

/// Drives one chat session against the backend.
///
/// Cloning yields another handle to the same session and registry, so a
/// front end can `stop()` from one task while `send()` runs in another.
#[derive(Clone)]
pub struct ChatController {
    api: ApiClient,
    store: Arc<dyn ConversationStore>,
    session: Arc<Mutex<Session>>,
    registry: Arc<CancellationRegistry>,
    owner: Option<OwnerId>,
    strip_markers: bool,
    events: Option<mpsc::UnboundedSender<ChatEvent>>,
}

impl std::fmt::Debug for ChatController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatController")
            .field("api", &self.api)
            .field("owner", &self.owner)
            .field("pending", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl ChatController {
    /// Create a controller that saves conversations through the backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or names an empty
    /// owner.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let api = ApiClient::from_config(config)?;
        let owner = config
            .owner
            .as_deref()
            .filter(|owner| !owner.trim().is_empty())
            .map(OwnerId::new)
            .transpose()?;

        Ok(Self {
            store: Arc::new(api.clone()),
            api,
            session: Arc::new(Mutex::new(Session::new(config.merge_policy))),
            registry: Arc::new(CancellationRegistry::new()),
            owner,
            strip_markers: config.strip_citation_markers,
            events: None,
        })
    }

    /// Use a different conversation store.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn ConversationStore>) -> Self {
        self.store = store;
        self
    }

    /// Receive `ChatEvent`s for every send made through this controller.
    ///
    /// Clones made afterwards report to the same receiver.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<ChatEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.events = Some(tx);
        rx
    }

    /// Set the owner used for saving and listing.
    pub fn set_owner(&mut self, owner: OwnerId) {
        self.owner = Some(owner);
    }

    /// Owner used for saving and listing, if known.
    #[must_use]
    pub fn owner(&self) -> Option<&OwnerId> {
        self.owner.as_ref()
    }

    /// Snapshot of the session.
    #[must_use]
    pub fn session(&self) -> Session {
        self.session.lock().clone()
    }

    /// Take the pending failure notice, if any.
    pub fn take_notice(&self) -> Option<String> {
        self.session.lock().take_notice()
    }

    /// Backend base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.api.base_url()
    }

    /// Number of sends still in flight.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.registry.len()
    }

    /// Probe the identity endpoint, adopting the signed-in user as owner when
    /// none is configured.
    pub async fn probe_auth(&mut self) -> AuthState {
        let state = auth::probe(&self.api).await;
        if self.owner.is_none() {
            if let Some(owner) = state.owner_hint().and_then(|hint| OwnerId::new(hint).ok()) {
                tracing::info!(owner = %owner, "Using signed-in user as conversation owner");
                self.owner = Some(owner);
            }
        }
        state
    }

    // =========================================================================
    // Chat
    // =========================================================================

    /// Send a question and stream the answer into the session.
    ///
    /// Never fails: the outcome says how the turn ended, and a failed turn
    /// leaves its notice in the session.
    pub async fn send(&self, question: &str) -> TurnOutcome {
        let (request, turn, cancel) = self.begin_send(question);
        let request_id = turn.request_id();

        tracing::info!(
            request_id = %request_id,
            messages = request.messages.len(),
            "Sending question"
        );
        self.emit(ChatEvent::Generating { request_id });

        let result = self.stream_turn(&request, &turn, &cancel).await;
        self.registry.resolve(request_id);

        match result {
            Ok(last) => {
                self.session.lock().complete_turn(&turn);
                tracing::info!(
                    request_id = %request_id,
                    response_id = %last.id,
                    "Turn completed"
                );
                self.emit(ChatEvent::Completed { request_id });
                TurnOutcome::Completed
            }
            Err(e) if e.is_abort() => {
                self.session.lock().abort_turn(&turn);
                tracing::info!(request_id = %request_id, "Turn aborted");
                self.emit(ChatEvent::Aborted { request_id });
                TurnOutcome::Aborted
            }
            Err(e) => {
                self.session.lock().fail_turn(&turn);
                tracing::warn!(request_id = %request_id, error = %e, "Turn failed");
                self.emit(ChatEvent::Failed {
                    request_id,
                    notice: GENERIC_FAILURE_NOTICE.to_string(),
                });
                TurnOutcome::Failed
            }
        }
    }

    /// Start a turn and register its token under one session lock.
    ///
    /// `stop` takes the same lock, so it either runs before the turn starts
    /// or sees both the loading flags and the token.
    fn begin_send(&self, question: &str) -> (ConversationRequest, Turn, CancellationToken) {
        let mut session = self.session.lock();
        let (request, turn) = session.begin_turn(question);
        let cancel = self.registry.issue(turn.request_id());
        (request, turn, cancel)
    }

    async fn stream_turn(
        &self,
        request: &ConversationRequest,
        turn: &Turn,
        cancel: &CancellationToken,
    ) -> std::result::Result<ChatResponse, StreamError> {
        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(StreamError::Aborted),
            response = self.api.conversation(request) => response?,
        };

        read_frames(response.bytes_stream(), cancel, |frame| {
            let Ok(messages) = frame.messages() else {
                return;
            };
            self.session.lock().apply_frame(turn, messages);
            self.emit(ChatEvent::Frame {
                request_id: turn.request_id(),
                messages: messages.to_vec(),
            });
        })
        .await
    }

    /// Stop every send in flight and clear the loading indicators.
    ///
    /// Returns how many sends were signalled. Safe to call when idle.
    pub fn stop(&self) -> usize {
        let stopped = {
            let mut session = self.session.lock();
            let stopped = self.registry.abort_all();
            session.stop_indicators();
            stopped
        };
        if stopped > 0 {
            tracing::info!(stopped, "Stopped pending requests");
        }
        stopped
    }

    // =========================================================================
    // Conversations
    // =========================================================================

    /// Save the current messages under `title`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NoOwner` if no owner is known, or the store's
    /// error if the save is rejected.
    pub async fn save(&self, title: &str) -> Result<()> {
        let owner = self.owner.as_ref().ok_or(ClientError::NoOwner)?;
        let messages = prepare_for_save(self.session.lock().messages(), self.strip_markers);
        self.store.save(owner, title, &messages).await
    }

    /// List the owner's saved conversations.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NoOwner` if no owner is known, or the store's
    /// error if the list cannot be fetched.
    pub async fn list_conversations(&self) -> Result<Vec<Conversation>> {
        let owner = self.owner.as_ref().ok_or(ClientError::NoOwner)?;
        self.store.list(owner).await
    }

    /// Replace the session's messages with a saved conversation.
    pub fn load(&self, conversation: Conversation) {
        tracing::debug!(
            title = %conversation.title,
            messages = conversation.messages.len(),
            "Loading conversation"
        );
        self.session.lock().replace_messages(conversation.messages);
    }

    /// Start a new conversation.
    pub fn clear(&self) {
        self.session.lock().clear();
    }

    // =========================================================================
    // Citations
    // =========================================================================

    /// Open citation `citation` of the assistant message at `message`.
    ///
    /// Returns the citation, or `None` if there is no such citation.
    pub fn show_citation(&self, message: usize, citation: usize) -> Option<Citation> {
        let mut session = self.session.lock();
        let selected = session.citations_for(message).into_iter().nth(citation)?;
        session.show_citation(selected.clone());
        Some(selected)
    }

    /// Close the citation panel.
    pub fn dismiss_citation(&self) {
        self.session.lock().dismiss_citation();
    }

    fn emit(&self, event: ChatEvent) {
        if let Some(tx) = &self.events {
            // A dropped receiver only means nobody is rendering.
            let _ = tx.send(event);
        }
    }
}
