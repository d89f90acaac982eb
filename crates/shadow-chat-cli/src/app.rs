//! Application state.
//!
//! `App` owns the terminal-side state (input line, focus, dialogs, scroll) and
//! a snapshot of the chat session taken from the controller. Sends run as
//! background tasks; their progress comes back as `ChatEvent`s.

use shadow_chat_client::{AuthState, ChatController, ChatEvent, ClientError, Session};
use shadow_chat_core::{Citation, Conversation, Role};

/// Which UI column has focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Focus {
    /// Left column: saved conversations.
    History,
    /// Right column: chat area with input.
    #[default]
    Chat,
}

impl Focus {
    /// Toggle to the other column.
    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Self::History => Self::Chat,
            Self::Chat => Self::History,
        }
    }
}

/// Input mode for dialogs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    /// Normal operation mode.
    #[default]
    Normal,
    /// Prompting for the title of the conversation to save.
    SavingConversation,
    /// Showing the citation panel.
    ViewingCitation,
}

/// Application state.
pub struct App {
    controller: ChatController,
    /// Latest snapshot of the chat session.
    pub session: Session,
    /// Result of the identity probe, once it has run.
    pub auth: Option<AuthState>,
    /// Saved conversations for the current owner.
    pub conversations: Vec<Conversation>,
    /// Selected conversation in the history panel.
    pub selected_conversation: Option<usize>,
    /// Current input buffer.
    pub input: String,
    /// Cursor position in input, in characters.
    pub cursor_position: usize,
    /// Which panel has focus.
    pub focus: Focus,
    /// Current input mode.
    pub input_mode: InputMode,
    /// Lines scrolled up from the bottom of the chat.
    pub chat_scroll: usize,
    /// Status message to display.
    pub status_message: Option<String>,
    /// Error message to display.
    pub error_message: Option<String>,
    /// Why the history panel is empty, if it could not be loaded.
    pub history_error: Option<String>,
    /// Whether the app should quit.
    pub should_quit: bool,
    /// Keys go to the input line (vim-like insert mode).
    pub chat_insert_mode: bool,
    /// Animation frame counter for the spinner.
    pub animation_frame: usize,
    saved_chat_input: Option<(String, usize)>,
}

impl App {
    /// Create the application around a controller.
    #[must_use]
    pub fn new(controller: ChatController) -> Self {
        let session = controller.session();
        Self {
            controller,
            session,
            auth: None,
            conversations: Vec::new(),
            selected_conversation: None,
            input: String::new(),
            cursor_position: 0,
            focus: Focus::Chat,
            input_mode: InputMode::Normal,
            chat_scroll: 0,
            status_message: None,
            error_message: None,
            history_error: None,
            should_quit: false,
            chat_insert_mode: true,
            animation_frame: 0,
            saved_chat_input: None,
        }
    }

    /// Backend URL for display.
    #[must_use]
    pub fn backend_url(&self) -> &str {
        self.controller.base_url()
    }

    /// Owner used for history, for display.
    #[must_use]
    pub fn owner_label(&self) -> Option<&str> {
        self.controller.owner().map(shadow_chat_core::OwnerId::as_str)
    }

    /// An answer is being streamed.
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.session.is_loading()
    }

    /// Tick the animation frame (call on each render).
    pub fn tick_animation(&mut self) {
        self.animation_frame = self.animation_frame.wrapping_add(1);
    }

    /// Current spinner character.
    #[must_use]
    pub fn spinner_char(&self) -> &'static str {
        const SPINNER: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
        SPINNER[self.animation_frame % SPINNER.len()]
    }

    /// Set the status message (also clears any error).
    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status_message = Some(message.into());
        self.error_message = None;
    }

    /// Set the error message.
    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error_message = Some(message.into());
    }

    /// Clear the error message.
    pub fn clear_error(&mut self) {
        self.error_message = None;
    }

    fn sync_session(&mut self) {
        self.session = self.controller.session();
    }

    // =========================================================================
    // Startup
    // =========================================================================

    /// Run the identity probe and report what it found.
    pub async fn probe_auth(&mut self) {
        let state = self.controller.probe_auth().await;
        if state == AuthState::NotConfigured {
            self.set_error("Authentication is not configured for this backend");
        }
        self.auth = Some(state);
    }

    // =========================================================================
    // Chat
    // =========================================================================

    /// Send the input line as a question.
    pub fn submit_question(&mut self) {
        let question = self.input.trim().to_string();
        if question.is_empty() {
            return;
        }
        if self.is_loading() {
            self.set_error("An answer is still streaming (Esc to stop)");
            return;
        }

        self.clear_input();
        self.chat_scroll = 0;

        let controller = self.controller.clone();
        tokio::spawn(async move {
            controller.send(&question).await;
        });
    }

    /// Handle progress of a send.
    ///
    /// Returns `true` if the UI should be redrawn right away.
    pub fn handle_chat_event(&mut self, event: ChatEvent) -> bool {
        self.sync_session();
        match event {
            ChatEvent::Generating { .. } => {
                self.set_status("Generating answer... (Esc to stop)");
            }
            ChatEvent::Frame { .. } => {
                self.chat_scroll = 0;
            }
            ChatEvent::Completed { .. } => {
                self.set_status("Answer complete");
            }
            ChatEvent::Aborted { .. } => {
                self.set_status("Stopped");
            }
            ChatEvent::Failed { notice, .. } => {
                // The event already carries the notice.
                let _ = self.controller.take_notice();
                self.set_error(notice);
            }
        }
        true
    }

    /// Stop the answer being streamed.
    pub fn stop(&mut self) {
        let stopped = self.controller.stop();
        self.sync_session();
        if stopped > 0 {
            self.set_status("Stopping...");
        }
    }

    /// Put the last question back in the input for editing or resending.
    pub fn recall_last_question(&mut self) {
        let question = self.session.last_question();
        if question.is_empty() {
            self.set_error("No question to recall");
            return;
        }
        self.input = question.to_string();
        self.move_cursor_end();
        self.chat_insert_mode = true;
    }

    /// Start a new chat.
    pub fn new_chat(&mut self) {
        self.controller.clear();
        self.sync_session();
        self.chat_scroll = 0;
        self.set_status("New chat");
    }

    // =========================================================================
    // History
    // =========================================================================

    /// Reload the saved conversations.
    ///
    /// # Errors
    ///
    /// Returns the client error if the list cannot be fetched.
    pub async fn refresh_history(&mut self) -> Result<(), ClientError> {
        match self.controller.list_conversations().await {
            Ok(conversations) => {
                self.conversations = conversations;
                self.history_error = None;
                if let Some(i) = self.selected_conversation {
                    if i >= self.conversations.len() {
                        self.selected_conversation = self.conversations.len().checked_sub(1);
                    }
                } else if !self.conversations.is_empty() {
                    self.selected_conversation = Some(0);
                }
                Ok(())
            }
            Err(e) => {
                self.history_error = Some(match &e {
                    ClientError::NoOwner => "No owner configured (--owner)".to_string(),
                    other => other.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Save the chat under `title`, then reload the history.
    pub async fn save_conversation(&mut self, title: &str) {
        let title = title.trim();
        if title.is_empty() {
            self.set_error("A title is required");
            return;
        }
        if !self.session.can_save() {
            self.set_error("Nothing to save yet");
            return;
        }

        match self.controller.save(title).await {
            Ok(()) => {
                self.set_status(format!("Saved '{title}'"));
                if let Err(e) = self.refresh_history().await {
                    tracing::warn!(error = %e, "Failed to reload history after save");
                }
            }
            Err(e) => self.set_error(format!("Save failed: {e}")),
        }
    }

    /// The selected saved conversation.
    #[must_use]
    pub fn selected_conversation(&self) -> Option<&Conversation> {
        self.selected_conversation
            .and_then(|i| self.conversations.get(i))
    }

    /// Load the selected conversation into the chat.
    pub fn load_selected(&mut self) {
        if self.is_loading() {
            self.set_error("An answer is still streaming (Esc to stop)");
            return;
        }
        let Some(conversation) = self.selected_conversation().cloned() else {
            return;
        };

        let title = display_title(&conversation).to_string();
        self.controller.load(conversation);
        self.sync_session();
        self.chat_scroll = 0;
        self.focus = Focus::Chat;
        self.set_status(format!("Loaded '{title}'"));
    }

    /// Move selection up in the history list.
    pub fn select_prev_conversation(&mut self) {
        if self.conversations.is_empty() {
            return;
        }
        self.selected_conversation = Some(match self.selected_conversation {
            Some(0) | None => self.conversations.len() - 1,
            Some(i) => i - 1,
        });
    }

    /// Move selection down in the history list.
    pub fn select_next_conversation(&mut self) {
        if self.conversations.is_empty() {
            return;
        }
        self.selected_conversation = Some(match self.selected_conversation {
            Some(i) if i + 1 < self.conversations.len() => i + 1,
            _ => 0,
        });
    }

    // =========================================================================
    // Citations
    // =========================================================================

    /// Index of the latest assistant message.
    #[must_use]
    pub fn last_answer_index(&self) -> Option<usize> {
        self.session
            .messages()
            .iter()
            .rposition(|message| message.role == Role::Assistant)
    }

    /// Open citation `number` (1-based) of the latest answer.
    pub fn open_citation(&mut self, number: usize) {
        let opened = self
            .last_answer_index()
            .zip(number.checked_sub(1))
            .and_then(|(answer, citation)| self.controller.show_citation(answer, citation));

        if opened.is_some() {
            self.sync_session();
            self.input_mode = InputMode::ViewingCitation;
        } else {
            self.set_error(format!("No citation [{number}] on the latest answer"));
        }
    }

    /// Citation shown in the panel.
    #[must_use]
    pub fn active_citation(&self) -> Option<&Citation> {
        self.session.active_citation()
    }

    /// Close the citation panel.
    pub fn close_citation(&mut self) {
        self.controller.dismiss_citation();
        self.sync_session();
        self.input_mode = InputMode::Normal;
    }

    // =========================================================================
    // Dialogs
    // =========================================================================

    /// Enter a dialog mode, saving the current chat input.
    pub fn enter_dialog_mode(&mut self, mode: InputMode) {
        self.saved_chat_input = Some((std::mem::take(&mut self.input), self.cursor_position));
        self.cursor_position = 0;
        self.input_mode = mode;
    }

    /// Exit dialog mode, restoring the saved chat input.
    pub fn exit_dialog_mode(&mut self) {
        self.input_mode = InputMode::Normal;
        if let Some((input, cursor)) = self.saved_chat_input.take() {
            self.input = input;
            self.cursor_position = cursor;
        } else {
            self.clear_input();
        }
    }

    // =========================================================================
    // Chat Scrolling
    // =========================================================================

    /// Scroll chat up (view older messages).
    pub fn scroll_chat_up(&mut self, amount: usize) {
        self.chat_scroll = self.chat_scroll.saturating_add(amount);
    }

    /// Scroll chat down (view newer messages).
    pub fn scroll_chat_down(&mut self, amount: usize) {
        self.chat_scroll = self.chat_scroll.saturating_sub(amount);
    }

    // =========================================================================
    // Input Handling
    // =========================================================================

    fn byte_offset(&self, chars: usize) -> usize {
        self.input
            .char_indices()
            .nth(chars)
            .map_or(self.input.len(), |(i, _)| i)
    }

    fn input_chars(&self) -> usize {
        self.input.chars().count()
    }

    /// Insert a character at the cursor position.
    pub fn insert_char(&mut self, c: char) {
        let at = self.byte_offset(self.cursor_position);
        self.input.insert(at, c);
        self.cursor_position += 1;
    }

    /// Delete the character before the cursor.
    pub fn delete_char(&mut self) {
        if self.cursor_position > 0 {
            self.cursor_position -= 1;
            let at = self.byte_offset(self.cursor_position);
            self.input.remove(at);
        }
    }

    /// Delete the character at the cursor.
    pub fn delete_char_forward(&mut self) {
        if self.cursor_position < self.input_chars() {
            let at = self.byte_offset(self.cursor_position);
            self.input.remove(at);
        }
    }

    /// Delete the word before the cursor.
    pub fn delete_word(&mut self) {
        while self.cursor_position > 0 {
            self.delete_char();
            let prev = self
                .cursor_position
                .checked_sub(1)
                .and_then(|i| self.input.chars().nth(i));
            if prev == Some(' ') {
                break;
            }
        }
    }

    /// Move cursor left.
    pub fn move_cursor_left(&mut self) {
        self.cursor_position = self.cursor_position.saturating_sub(1);
    }

    /// Move cursor right.
    pub fn move_cursor_right(&mut self) {
        if self.cursor_position < self.input_chars() {
            self.cursor_position += 1;
        }
    }

    /// Move cursor to the start.
    pub fn move_cursor_start(&mut self) {
        self.cursor_position = 0;
    }

    /// Move cursor to the end.
    pub fn move_cursor_end(&mut self) {
        self.cursor_position = self.input_chars();
    }

    /// Clear the input.
    pub fn clear_input(&mut self) {
        self.input.clear();
        self.cursor_position = 0;
    }

    /// Take the current input (clears it).
    pub fn take_input(&mut self) -> String {
        self.cursor_position = 0;
        std::mem::take(&mut self.input)
    }
}

/// Title shown for a saved conversation.
#[must_use]
pub fn display_title(conversation: &Conversation) -> &str {
    if conversation.title.trim().is_empty() {
        "(untitled)"
    } else {
        &conversation.title
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shadow_chat_client::ClientConfig;
    use shadow_chat_core::{Message, RequestId};
    use serde_json::json;

    fn app() -> App {
        App::new(ChatController::new(&ClientConfig::default()).unwrap())
    }

    fn conversation(title: &str, messages: Vec<Message>) -> Conversation {
        Conversation {
            id: None,
            title: title.to_string(),
            owner: "seller@example.com".to_string(),
            messages,
        }
    }

    #[test]
    fn input_editing_handles_multibyte() {
        let mut app = app();
        for c in "héllo".chars() {
            app.insert_char(c);
        }
        app.move_cursor_left();
        app.delete_char();
        assert_eq!(app.input, "hélo");

        app.move_cursor_start();
        app.delete_char_forward();
        assert_eq!(app.input, "élo");

        app.move_cursor_end();
        assert_eq!(app.cursor_position, 3);
        assert_eq!(app.take_input(), "élo");
        assert_eq!(app.cursor_position, 0);
    }

    #[test]
    fn recall_last_question_fills_input() {
        let mut app = app();
        app.recall_last_question();
        assert!(app.input.is_empty());
        assert!(app.error_message.is_some());

        app.chat_insert_mode = false;
        let _ = app.session.begin_turn("what discount?");
        app.recall_last_question();
        assert_eq!(app.input, "what discount?");
        assert_eq!(app.cursor_position, 14);
        assert!(app.chat_insert_mode);
    }

    #[test]
    fn delete_word_stops_at_space() {
        let mut app = app();
        for c in "pricing sheet".chars() {
            app.insert_char(c);
        }
        app.delete_word();
        assert_eq!(app.input, "pricing ");
    }

    #[test]
    fn dialog_keeps_chat_input() {
        let mut app = app();
        app.insert_char('q');
        app.enter_dialog_mode(InputMode::SavingConversation);
        assert!(app.input.is_empty());

        app.insert_char('T');
        app.exit_dialog_mode();
        assert_eq!(app.input, "q");
        assert_eq!(app.input_mode, InputMode::Normal);
    }

    #[test]
    fn history_selection_wraps() {
        let mut app = app();
        app.conversations = vec![conversation("a", vec![]), conversation("b", vec![])];

        app.select_next_conversation();
        assert_eq!(app.selected_conversation, Some(0));
        app.select_prev_conversation();
        assert_eq!(app.selected_conversation, Some(1));
        app.select_next_conversation();
        assert_eq!(app.selected_conversation, Some(0));
    }

    #[test]
    fn load_and_open_citation() {
        let mut app = app();
        let tool = Message::tool(
            json!({"citations": [{"id": "1", "title": "Playbook", "content": "body"}]}).to_string(),
        );
        app.conversations = vec![conversation(
            "Pricing",
            vec![Message::user("q"), tool, Message::assistant("See [doc1]")],
        )];
        app.selected_conversation = Some(0);

        app.load_selected();
        assert_eq!(app.session.messages().len(), 3);
        assert_eq!(app.last_answer_index(), Some(2));

        app.open_citation(1);
        assert_eq!(app.input_mode, InputMode::ViewingCitation);
        assert_eq!(app.active_citation().map(Citation::display_title), Some("Playbook"));

        app.close_citation();
        assert!(app.active_citation().is_none());

        app.open_citation(2);
        assert!(app.error_message.is_some());
    }

    #[test]
    fn failed_event_shows_notice() {
        let mut app = app();
        let redraw = app.handle_chat_event(ChatEvent::Failed {
            request_id: RequestId::generate(),
            notice: "An error occurred.".to_string(),
        });
        assert!(redraw);
        assert_eq!(app.error_message.as_deref(), Some("An error occurred."));
    }

    #[test]
    fn untitled_conversations_get_placeholder() {
        assert_eq!(display_title(&conversation("", vec![])), "(untitled)");
        assert_eq!(display_title(&conversation("Q3", vec![])), "Q3");
    }

    #[tokio::test]
    async fn history_without_owner_explains_why() {
        let mut app = app();
        assert!(app.refresh_history().await.is_err());
        assert_eq!(
            app.history_error.as_deref(),
            Some("No owner configured (--owner)")
        );
    }
}
