//! In-memory chat session state.
//!
//! `Session` is the single owner of everything a front end renders: the
//! message sequence, the loading and generating flags, the open citation and
//! the pending failure notice. All mutation goes through the methods here.

use shadow_chat_core::{Citation, ConversationRequest, Message, RequestId, Role};

use crate::config::MergePolicy;

/// Notice shown once when a turn fails for any reason other than a stop.
pub const GENERIC_FAILURE_NOTICE: &str = "An error occurred. Please try again. If the problem \
                                          persists, please contact your site administrator.";

/// Marker for one in-progress send.
///
/// Holds the history the turn started from, user message included, so that
/// frames and cleanup rebuild the sequence from the same base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    request_id: RequestId,
    history: Vec<Message>,
}

impl Turn {
    /// ID of the request carrying this turn.
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Messages before the turn plus the user message.
    #[must_use]
    pub fn history(&self) -> &[Message] {
        &self.history
    }
}

/// Chat session state.
#[derive(Debug, Clone, Default)]
pub struct Session {
    messages: Vec<Message>,
    last_question: String,
    is_loading: bool,
    is_generating: bool,
    active_citation: Option<Citation>,
    citation_panel_open: bool,
    notice: Option<String>,
    merge_policy: MergePolicy,
}

impl Session {
    /// Create an empty session.
    #[must_use]
    pub fn new(merge_policy: MergePolicy) -> Self {
        Self {
            merge_policy,
            ..Self::default()
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Messages in display order.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The most recent question sent, empty after `clear`.
    #[must_use]
    pub fn last_question(&self) -> &str {
        &self.last_question
    }

    /// A request is in flight.
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.is_loading
    }

    /// Waiting for the first frame of the current turn.
    #[must_use]
    pub const fn is_generating(&self) -> bool {
        self.is_generating
    }

    /// Citation currently shown, if the panel is open.
    #[must_use]
    pub fn active_citation(&self) -> Option<&Citation> {
        if self.citation_panel_open {
            self.active_citation.as_ref()
        } else {
            None
        }
    }

    /// Saving is allowed only when idle and there is something to save.
    #[must_use]
    pub fn can_save(&self) -> bool {
        !self.is_loading && !self.messages.is_empty()
    }

    // =========================================================================
    // Turn lifecycle
    // =========================================================================

    /// Start a turn: append the user message and raise the loading flags.
    ///
    /// Returns the request body (prior messages plus the question) and the
    /// turn marker to pass back to the other lifecycle methods.
    pub fn begin_turn(&mut self, question: &str) -> (ConversationRequest, Turn) {
        self.last_question = question.to_string();
        self.is_loading = true;
        self.is_generating = true;
        self.notice = None;

        self.messages.push(Message::user(question));
        let turn = Turn {
            request_id: RequestId::generate(),
            history: self.messages.clone(),
        };
        let request = ConversationRequest {
            messages: self.messages.clone(),
        };
        (request, turn)
    }

    /// Merge one parsed frame into the message sequence.
    pub fn apply_frame(&mut self, turn: &Turn, frame_messages: &[Message]) {
        match self.merge_policy {
            MergePolicy::Replace => {
                self.messages.clone_from(&turn.history);
                self.messages.extend_from_slice(frame_messages);
            }
            MergePolicy::Append => self.messages.extend_from_slice(frame_messages),
        }
        self.is_generating = false;
    }

    /// Finish a turn whose stream completed normally.
    pub fn complete_turn(&mut self, _turn: &Turn) {
        self.stop_indicators();
    }

    /// Finish a stopped turn: keep only the user message, report nothing.
    pub fn abort_turn(&mut self, turn: &Turn) {
        self.messages.clone_from(&turn.history);
        self.stop_indicators();
    }

    /// Finish a failed turn: keep only the user message and raise the notice.
    pub fn fail_turn(&mut self, turn: &Turn) {
        self.messages.clone_from(&turn.history);
        self.notice = Some(GENERIC_FAILURE_NOTICE.to_string());
        self.stop_indicators();
    }

    /// Clear the loading and generating flags.
    pub fn stop_indicators(&mut self) {
        self.is_loading = false;
        self.is_generating = false;
    }

    /// Take the pending failure notice, if any.
    pub fn take_notice(&mut self) -> Option<String> {
        self.notice.take()
    }

    // =========================================================================
    // Whole-session operations
    // =========================================================================

    /// Start over: forget messages, the last question and the open citation.
    pub fn clear(&mut self) {
        self.last_question.clear();
        self.active_citation = None;
        self.citation_panel_open = false;
        self.messages.clear();
    }

    /// Replace the message sequence wholesale (loading a saved conversation).
    pub fn replace_messages(&mut self, messages: Vec<Message>) {
        self.messages = messages;
        self.active_citation = None;
        self.citation_panel_open = false;
    }

    // =========================================================================
    // Citations
    // =========================================================================

    /// Citations for the assistant message at `index`.
    ///
    /// They come from the tool message immediately before it; anything else
    /// yields an empty list.
    #[must_use]
    pub fn citations_for(&self, index: usize) -> Vec<Citation> {
        match self.messages.get(index) {
            Some(message) if message.role == Role::Assistant => index
                .checked_sub(1)
                .and_then(|prev| self.messages.get(prev))
                .map(Message::citations)
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    /// Open the citation panel on `citation`.
    pub fn show_citation(&mut self, citation: Citation) {
        self.active_citation = Some(citation);
        self.citation_panel_open = true;
    }

    /// Close the citation panel.
    pub fn dismiss_citation(&mut self) {
        self.citation_panel_open = false;
    }
}
