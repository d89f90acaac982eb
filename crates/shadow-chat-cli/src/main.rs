//! Shadow Chat CLI - terminal chat against the sales-assistant backend.
//!
//! This is the entry point for the `shadowchat` binary.

mod app;
mod markdown;
mod ui;

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers, MouseEventKind,
};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use shadow_chat_client::{ChatController, ChatEvent, ClientConfig, MergePolicy};

use app::{App, Focus, InputMode};

/// Shadow Chat CLI - terminal chat against the sales-assistant backend.
#[derive(Parser, Debug)]
#[command(name = "shadowchat")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Backend URL.
    #[arg(long, env = "SHADOW_CHAT_BACKEND")]
    backend: Option<String>,

    /// Owner of saved conversations (defaults to the signed-in user).
    #[arg(long, env = "SHADOW_CHAT_OWNER")]
    owner: Option<String>,

    /// Bearer token sent with every request.
    #[arg(long, env = "SHADOW_CHAT_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Request timeout in seconds, including the streamed answer.
    #[arg(long, env = "SHADOW_CHAT_TIMEOUT")]
    timeout: Option<u64>,

    /// How streamed frames are merged: replace or append.
    #[arg(long)]
    merge: Option<MergePolicy>,

    /// Strip [docN] markers from saved conversations.
    #[arg(long)]
    strip_citations: bool,

    /// JSON configuration file. Flags override its values.
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(long, default_value = "false")]
    debug: bool,
}

impl Args {
    /// Build the client configuration: file first, then flags.
    fn client_config(&self) -> anyhow::Result<ClientConfig> {
        let mut config = match &self.config {
            Some(path) => ClientConfig::from_json_file(path)?,
            None => ClientConfig::default(),
        };

        if let Some(backend) = &self.backend {
            config.base_url.clone_from(backend);
        }
        if let Some(owner) = &self.owner {
            config.owner = Some(owner.clone());
        }
        if let Some(token) = &self.token {
            config.access_token = Some(token.clone());
        }
        if let Some(timeout) = self.timeout {
            config.request_timeout_seconds = timeout;
        }
        if let Some(merge) = self.merge {
            config.merge_policy = merge;
        }
        if self.strip_citations {
            config.strip_citation_markers = true;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.debug || std::env::var_os("RUST_LOG").is_some() {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("shadow_chat_cli=debug,shadow_chat_client=debug,warn"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    let config = args.client_config()?;
    let mut controller = ChatController::new(&config)?;
    let events = controller.subscribe();

    tracing::info!(
        backend = %config.base_url,
        merge = %config.merge_policy,
        "Starting shadowchat"
    );

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(controller);
    terminal.draw(|f| ui::render(f, &app))?;

    app.probe_auth().await;
    if let Err(e) = app.refresh_history().await {
        tracing::warn!(error = %e, "Failed to load conversation history");
    }

    let result = run_event_loop(&mut terminal, &mut app, events).await;

    // Anything still streaming is abandoned.
    app.stop();

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    result
}

/// Main event loop.
///
/// Chat events trigger an immediate redraw so frames appear as they arrive.
async fn run_event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    mut events: mpsc::UnboundedReceiver<ChatEvent>,
) -> anyhow::Result<()> {
    loop {
        app.tick_animation();
        terminal.draw(|f| ui::render(f, app))?;

        let tick_rate = if app.is_loading() {
            Duration::from_millis(80)
        } else {
            Duration::from_millis(100)
        };

        tokio::select! {
            () = tokio::time::sleep(tick_rate) => {
                while event::poll(Duration::ZERO).unwrap_or(false) {
                    if let Ok(evt) = event::read() {
                        handle_input(app, evt).await;
                    }
                }
            }

            Some(event) = events.recv() => {
                if app.handle_chat_event(event) {
                    terminal.draw(|f| ui::render(f, app))?;
                }
            }
        }

        if app.should_quit {
            break;
        }
    }

    Ok(())
}

/// Handle input events.
async fn handle_input(app: &mut App, event: Event) {
    match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => {
            if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
                app.should_quit = true;
                return;
            }
            match app.input_mode {
                InputMode::Normal => handle_normal_mode(app, key).await,
                InputMode::SavingConversation => handle_save_mode(app, key.code).await,
                InputMode::ViewingCitation => handle_citation_mode(app, key.code),
            }
        }
        Event::Mouse(mouse) => match mouse.kind {
            MouseEventKind::ScrollUp => app.scroll_chat_up(3),
            MouseEventKind::ScrollDown => app.scroll_chat_down(3),
            _ => {}
        },
        _ => {}
    }
}

/// Keys shared by both columns, then per-column handling.
async fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    match key.code {
        // Esc stops a streaming answer first, then clears an error, then
        // toggles between typing and commands.
        KeyCode::Esc => {
            if app.is_loading() {
                app.stop();
            } else if app.error_message.is_some() {
                app.clear_error();
            } else {
                app.chat_insert_mode = !app.chat_insert_mode;
            }
        }
        KeyCode::Tab => app.focus = app.focus.next(),
        KeyCode::PageUp => app.scroll_chat_up(10),
        KeyCode::PageDown => app.scroll_chat_down(10),
        _ => match app.focus {
            Focus::History => handle_history_keys(app, key.code).await,
            Focus::Chat if app.chat_insert_mode => handle_typing(app, key),
            Focus::Chat => handle_command_keys(app, key.code).await,
        },
    }
}

async fn handle_history_keys(app: &mut App, code: KeyCode) {
    match code {
        KeyCode::Up | KeyCode::Char('k') => app.select_prev_conversation(),
        KeyCode::Down | KeyCode::Char('j') => app.select_next_conversation(),
        KeyCode::Enter => app.load_selected(),
        KeyCode::Char('r') => refresh_history(app).await,
        KeyCode::Char('q') => app.should_quit = true,
        _ => {}
    }
}

/// Single-key commands (Esc was pressed in the chat column).
async fn handle_command_keys(app: &mut App, code: KeyCode) {
    match code {
        KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Char('i') | KeyCode::Enter => app.chat_insert_mode = true,
        KeyCode::Char('s') => {
            if app.session.can_save() {
                app.enter_dialog_mode(InputMode::SavingConversation);
            } else {
                app.set_error("Nothing to save yet");
            }
        }
        KeyCode::Char('n') => app.new_chat(),
        KeyCode::Char('a') => app.recall_last_question(),
        KeyCode::Char('r') => refresh_history(app).await,
        KeyCode::Char('j') | KeyCode::Down => app.scroll_chat_down(1),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_chat_up(1),
        KeyCode::Char(c @ '1'..='9') => {
            if let Some(n) = c.to_digit(10) {
                app.open_citation(n as usize);
            }
        }
        _ => {}
    }
}

/// Line editing in the chat input.
fn handle_typing(app: &mut App, key: KeyEvent) {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match key.code {
        KeyCode::Enter => app.submit_question(),
        KeyCode::Char('a') if ctrl => app.move_cursor_start(),
        KeyCode::Char('e') if ctrl => app.move_cursor_end(),
        KeyCode::Char('u') if ctrl => app.clear_input(),
        KeyCode::Char('w') if ctrl => app.delete_word(),
        KeyCode::Char(c) => app.insert_char(c),
        KeyCode::Backspace => app.delete_char(),
        KeyCode::Delete => app.delete_char_forward(),
        KeyCode::Left => app.move_cursor_left(),
        KeyCode::Right => app.move_cursor_right(),
        KeyCode::Home => app.move_cursor_start(),
        KeyCode::End => app.move_cursor_end(),
        KeyCode::Up => app.scroll_chat_up(1),
        KeyCode::Down => app.scroll_chat_down(1),
        _ => {}
    }
}

async fn handle_save_mode(app: &mut App, code: KeyCode) {
    match code {
        KeyCode::Esc => app.exit_dialog_mode(),
        KeyCode::Enter => {
            let title = app.take_input();
            app.exit_dialog_mode();
            app.save_conversation(&title).await;
        }
        KeyCode::Char(c) => app.insert_char(c),
        KeyCode::Backspace => app.delete_char(),
        KeyCode::Left => app.move_cursor_left(),
        KeyCode::Right => app.move_cursor_right(),
        _ => {}
    }
}

fn handle_citation_mode(app: &mut App, code: KeyCode) {
    if matches!(code, KeyCode::Esc | KeyCode::Enter | KeyCode::Char('q')) {
        app.close_citation();
    }
}

async fn refresh_history(app: &mut App) {
    match app.refresh_history().await {
        Ok(()) => {
            let count = app.conversations.len();
            app.set_status(format!("{count} saved conversation(s)"));
        }
        Err(e) => app.set_error(format!("Failed to load history: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let args = Args::try_parse_from([
            "shadowchat",
            "--backend",
            "https://chat.example.com",
            "--owner",
            "seller@example.com",
            "--timeout",
            "30",
            "--merge",
            "append",
            "--strip-citations",
        ])
        .unwrap();

        let config = args.client_config().unwrap();
        assert_eq!(config.base_url, "https://chat.example.com");
        assert_eq!(config.owner.as_deref(), Some("seller@example.com"));
        assert_eq!(config.request_timeout_seconds, 30);
        assert_eq!(config.merge_policy, MergePolicy::Append);
        assert!(config.strip_citation_markers);
    }

    #[test]
    fn unknown_merge_policy_is_rejected() {
        assert!(Args::try_parse_from(["shadowchat", "--merge", "interleave"]).is_err());
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let args = Args::try_parse_from(["shadowchat", "--config", "/nonexistent/shadowchat.json"])
            .unwrap();
        assert!(args.client_config().is_err());
    }
}
