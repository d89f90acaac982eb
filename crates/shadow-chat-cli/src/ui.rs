//! UI rendering with ratatui.
//!
//! Two columns: saved conversations on the left, the chat on the right.
//! The save prompt and the citation panel open as centered overlays.

use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style, Stylize};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{
    Block, Borders, Clear, List, ListItem, ListState, Paragraph, Scrollbar, ScrollbarOrientation,
    ScrollbarState, Wrap,
};
use ratatui::Frame;

use shadow_chat_client::AuthState;
use shadow_chat_core::Role;

use crate::app::{display_title, App, Focus, InputMode};
use crate::markdown::render_markdown;

/// Horizontal padding for chat content.
const CHAT_PADDING: u16 = 2;

/// Render the UI.
pub fn render(frame: &mut Frame, app: &App) {
    let area = frame.area();

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(5),
            Constraint::Length(1),
        ])
        .split(area);

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(28), Constraint::Percentage(72)])
        .split(rows[1]);

    render_header_bar(frame, app, rows[0]);
    render_history_panel(frame, app, columns[0]);
    render_chat_column(frame, app, columns[1]);
    render_status_bar(frame, app, rows[2]);

    match app.input_mode {
        InputMode::SavingConversation => render_save_dialog(frame, app, area),
        InputMode::ViewingCitation => render_citation_panel(frame, app, area),
        InputMode::Normal => {}
    }
}

/// Shorten `s` to `max` characters by cutting out the middle.
fn truncate_middle(s: &str, max: usize) -> String {
    let len = s.chars().count();
    if len <= max {
        return s.to_string();
    }
    if max < 5 {
        return s.chars().take(max).collect();
    }
    let keep = (max - 3) / 2;
    let start: String = s.chars().take(keep).collect();
    let end: String = s.chars().skip(len - keep).collect();
    format!("{start}...{end}")
}

fn border_style(focused: bool) -> Style {
    if focused {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default().fg(Color::Gray)
    }
}

/// Title bar with the backend URL and sign-in state.
fn render_header_bar(frame: &mut Frame, app: &App, area: Rect) {
    let title = "SHADOW CHAT";
    let (auth_text, auth_style) = match &app.auth {
        Some(AuthState::Authenticated { user_id }) if !user_id.is_empty() => {
            (user_id.clone(), Style::default().fg(Color::Green))
        }
        Some(AuthState::Authenticated { .. }) => {
            ("signed in".to_string(), Style::default().fg(Color::Green))
        }
        Some(AuthState::LocalDevelopment) => {
            ("local".to_string(), Style::default().fg(Color::Yellow))
        }
        Some(AuthState::NotConfigured) => {
            ("not signed in".to_string(), Style::default().fg(Color::Red))
        }
        None => ("...".to_string(), Style::default().fg(Color::Gray)),
    };

    let width = usize::from(area.width);
    let url = truncate_middle(app.backend_url(), (width / 2).saturating_sub(15));
    let right_len = url.chars().count() + auth_text.chars().count() + 3;
    let gap = width.saturating_sub(title.len() + right_len);

    let line = Line::from(vec![
        Span::styled(title, Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::raw(" ".repeat(gap)),
        Span::raw(url),
        Span::raw(" ["),
        Span::styled(auth_text, auth_style),
        Span::raw("]"),
    ]);

    frame.render_widget(
        Paragraph::new(line).style(Style::default().bg(Color::DarkGray)),
        area,
    );
}

/// Saved conversations.
fn render_history_panel(frame: &mut Frame, app: &App, area: Rect) {
    let focused = app.focus == Focus::History;
    let title = match app.owner_label() {
        Some(owner) => format!(" History: {} ", truncate_middle(owner, 24)),
        None => " History ".to_string(),
    };
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(border_style(focused));

    if app.conversations.is_empty() {
        let hint = app
            .history_error
            .as_deref()
            .unwrap_or("No saved conversations");
        frame.render_widget(
            Paragraph::new(hint)
                .style(Style::default().fg(Color::DarkGray))
                .wrap(Wrap { trim: true })
                .block(block),
            area,
        );
        return;
    }

    let items: Vec<ListItem> = app
        .conversations
        .iter()
        .map(|conversation| {
            let turns = conversation
                .messages
                .iter()
                .filter(|m| m.role == Role::User)
                .count();
            ListItem::new(Line::from(vec![
                Span::raw(display_title(conversation).to_string()),
                Span::styled(format!(" ({turns})"), Style::default().fg(Color::DarkGray)),
            ]))
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    let mut state = ListState::default();
    state.select(app.selected_conversation);
    frame.render_stateful_widget(list, area, &mut state);
}

/// Chat messages plus the input line.
fn render_chat_column(frame: &mut Frame, app: &App, area: Rect) {
    let focused = app.focus == Focus::Chat;
    let block = Block::default()
        .title(" Chat ")
        .borders(Borders::ALL)
        .border_style(border_style(focused));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(1),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(inner);

    let chat_full = rows[0];
    let chat_area = Rect::new(
        chat_full.x + CHAT_PADDING,
        chat_full.y,
        chat_full.width.saturating_sub(CHAT_PADDING * 2 + 1),
        chat_full.height,
    );

    if app.session.messages().is_empty() && !app.is_loading() {
        frame.render_widget(
            Paragraph::new("Ask a question and press Enter")
                .style(Style::default().fg(Color::DarkGray))
                .wrap(Wrap { trim: true }),
            chat_area,
        );
    } else {
        render_messages(frame, app, chat_area, chat_full);
    }

    render_input_line(frame, app, rows[1], rows[2], focused);
}

fn render_messages(frame: &mut Frame, app: &App, area: Rect, scroll_area: Rect) {
    let width = usize::from(area.width);
    let label = |text: &'static str, color: Color| {
        Line::from(Span::styled(
            text,
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        ))
    };

    let mut lines: Vec<Line> = Vec::new();
    for (index, message) in app.session.messages().iter().enumerate() {
        match message.role {
            Role::User => {
                lines.push(Line::from(vec![
                    Span::styled("[You] ", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
                    Span::styled(message.content.as_str(), Style::default().fg(Color::White)),
                ]));
                lines.push(Line::default());
            }
            Role::Assistant => {
                lines.push(label("[Assistant]", Color::Green));
                lines.extend(render_markdown(&message.content, width));

                let citations = app.session.citations_for(index);
                if !citations.is_empty() {
                    lines.push(Line::styled("Sources:", Style::default().fg(Color::DarkGray)));
                    for (n, citation) in citations.iter().enumerate() {
                        lines.push(Line::from(vec![
                            Span::styled(format!("  [{}] ", n + 1), Style::default().fg(Color::LightBlue)),
                            Span::styled(
                                citation.display_title().to_string(),
                                Style::default().fg(Color::Gray),
                            ),
                        ]));
                    }
                }
                lines.push(Line::default());
            }
            // Tool output is shown through the citations of the next answer.
            Role::Tool => {}
        }
    }

    if app.session.is_generating() {
        lines.push(label("[Assistant]", Color::Green));
        lines.push(Line::from(vec![
            Span::styled(app.spinner_char(), Style::default().fg(Color::Yellow)),
            Span::styled(" generating answer...", Style::default().fg(Color::DarkGray)),
        ]));
    }

    let text = Text::from(lines);
    let visible = usize::from(area.height);
    let total = wrapped_line_count(&text, width);
    let max_scroll = total.saturating_sub(visible);
    let offset = max_scroll.saturating_sub(app.chat_scroll.min(max_scroll));

    frame.render_widget(
        Paragraph::new(text)
            .wrap(Wrap { trim: true })
            .scroll((u16::try_from(offset).unwrap_or(u16::MAX), 0)),
        area,
    );

    if total > visible {
        let mut state = ScrollbarState::new(total)
            .position(offset)
            .viewport_content_length(visible);
        frame.render_stateful_widget(
            Scrollbar::new(ScrollbarOrientation::VerticalRight)
                .begin_symbol(Some("▲"))
                .end_symbol(Some("▼")),
            scroll_area,
            &mut state,
        );
    }
}

fn render_input_line(frame: &mut Frame, app: &App, separator: Rect, area: Rect, focused: bool) {
    frame.render_widget(
        Paragraph::new("─".repeat(usize::from(separator.width)))
            .style(Style::default().fg(Color::DarkGray)),
        separator,
    );

    let prompt = if !focused {
        "│ "
    } else if app.chat_insert_mode {
        "> "
    } else {
        ": "
    };
    let in_dialog = app.input_mode != InputMode::Normal;
    let input = if in_dialog { "" } else { app.input.as_str() };
    let prompt_color = if focused && app.chat_insert_mode {
        Color::Cyan
    } else {
        Color::DarkGray
    };

    frame.render_widget(
        Paragraph::new(Line::from(vec![
            Span::styled(prompt, Style::default().fg(prompt_color)),
            Span::styled(input, Style::default().fg(Color::White)),
        ])),
        area,
    );

    if focused && !in_dialog && app.chat_insert_mode {
        let cursor = u16::try_from(app.cursor_position).unwrap_or(u16::MAX);
        frame.set_cursor_position((area.x + 2 + cursor, area.y));
    }
}

fn key_hint(key: &'static str, action: &'static str) -> [Span<'static>; 2] {
    [
        Span::styled(key, Style::default().fg(Color::Yellow)),
        Span::raw(action),
    ]
}

/// Mode indicator and either the current message or key hints.
fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let mode = match (app.focus, app.chat_insert_mode) {
        (Focus::Chat, true) => Span::styled(" INSERT ", Style::default().fg(Color::Black).bg(Color::Green)),
        (Focus::Chat, false) => Span::styled(" NORMAL ", Style::default().fg(Color::Black).bg(Color::Blue)),
        (Focus::History, _) => {
            Span::styled(" HISTORY ", Style::default().fg(Color::Black).bg(Color::Magenta))
        }
    };

    let mut spans = vec![mode];
    if let Some(error) = &app.error_message {
        spans.push(Span::styled(" ERROR: ", Style::default().fg(Color::Red).bold()));
        spans.push(Span::styled(error.as_str(), Style::default().fg(Color::Red)));
    } else if let Some(status) = &app.status_message {
        spans.push(Span::styled(format!(" {status}"), Style::default().fg(Color::Green)));
    } else {
        spans.push(Span::raw(" "));
        let hints: Vec<[Span<'static>; 2]> = match (app.focus, app.chat_insert_mode) {
            (Focus::Chat, true) => vec![
                key_hint("Enter", ":send "),
                key_hint("Esc", ":stop/normal "),
                key_hint("Tab", ":history"),
            ],
            (Focus::Chat, false) => vec![
                key_hint("i", ":insert "),
                key_hint("s", ":save "),
                key_hint("n", ":new "),
                key_hint("a", ":ask again "),
                key_hint("1-9", ":citation "),
                key_hint("q", ":quit"),
            ],
            (Focus::History, _) => vec![
                key_hint("Enter", ":load "),
                key_hint("r", ":refresh "),
                key_hint("Tab", ":chat "),
                key_hint("q", ":quit"),
            ],
        };
        spans.extend(hints.into_iter().flatten());
    }

    frame.render_widget(
        Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::DarkGray)),
        area,
    );
}

/// Prompt for the title of the conversation to save.
fn render_save_dialog(frame: &mut Frame, app: &App, area: Rect) {
    let width = 50.min(area.width.saturating_sub(4));
    let height = 8.min(area.height.saturating_sub(4));
    let dialog = Rect::new(
        area.x + area.width.saturating_sub(width) / 2,
        area.y + area.height.saturating_sub(height) / 2,
        width,
        height,
    );
    frame.render_widget(Clear, dialog);

    let block = Block::default()
        .title(" Save Conversation ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan));
    let inner = block.inner(dialog);
    frame.render_widget(block, dialog);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Length(3),
            Constraint::Length(1),
        ])
        .split(inner);

    frame.render_widget(Paragraph::new("Title:"), rows[0]);
    frame.render_widget(
        Paragraph::new(app.input.as_str())
            .style(Style::default().fg(Color::Yellow))
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Cyan)),
            ),
        rows[1],
    );
    frame.render_widget(
        Paragraph::new("Enter to save, Esc to cancel").style(Style::default().fg(Color::DarkGray)),
        rows[2],
    );

    let cursor = u16::try_from(app.cursor_position).unwrap_or(u16::MAX);
    frame.set_cursor_position((rows[1].x + 1 + cursor, rows[1].y + 1));
}

/// The open citation: title, location and content.
fn render_citation_panel(frame: &mut Frame, app: &App, area: Rect) {
    let Some(citation) = app.active_citation() else {
        return;
    };

    let panel = centered_rect(70, 70, area);
    frame.render_widget(Clear, panel);

    let block = Block::default()
        .title(" Citation ")
        .title_bottom(Line::from(" Esc to close ").right_aligned())
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::LightBlue));

    let mut lines = vec![Line::styled(
        citation.display_title().to_string(),
        Style::default().fg(Color::White).add_modifier(Modifier::BOLD),
    )];
    for location in [&citation.filepath, &citation.url].into_iter().flatten() {
        lines.push(Line::styled(location.clone(), Style::default().fg(Color::DarkGray)));
    }
    lines.push(Line::default());
    lines.extend(render_markdown(&citation.content, usize::from(panel.width.saturating_sub(2))));

    frame.render_widget(
        Paragraph::new(Text::from(lines))
            .wrap(Wrap { trim: false })
            .block(block),
        panel,
    );
}

/// Number of visual lines after wrapping to `width`.
fn wrapped_line_count(text: &Text, width: usize) -> usize {
    if width == 0 {
        return text.lines.len();
    }
    text.lines
        .iter()
        .map(|line| line.width().div_ceil(width).max(1))
        .sum()
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_middle_keeps_ends() {
        assert_eq!(truncate_middle("http://localhost:5000", 40), "http://localhost:5000");
        assert_eq!(truncate_middle("https://chat.example.com/api", 13), "https...m/api");
        assert_eq!(truncate_middle("abcdef", 3), "abc");
    }

    #[test]
    fn wrapped_lines_round_up() {
        let text = Text::from(vec![Line::from("x".repeat(25)), Line::default()]);
        assert_eq!(wrapped_line_count(&text, 10), 4);
        assert_eq!(wrapped_line_count(&text, 0), 2);
    }
}
