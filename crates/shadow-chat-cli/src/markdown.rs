//! Answer rendering.
//!
//! Assistant answers are markdown with inline `[docN]` citation markers.
//! Markdown becomes styled ratatui lines, fenced code is highlighted with
//! syntect, and each marker becomes a numbered reference like `[1]`.

use std::sync::LazyLock;

use pulldown_cmark::{
    CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd, TextMergeStream,
};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use syntect::easy::HighlightLines;
use syntect::highlighting::{FontStyle, Theme, ThemeSet};
use syntect::parsing::SyntaxSet;
use syntect::util::LinesWithEndings;

static SYNTAXES: LazyLock<SyntaxSet> = LazyLock::new(SyntaxSet::load_defaults_newlines);
static THEME: LazyLock<Theme> = LazyLock::new(|| {
    ThemeSet::load_defaults()
        .themes
        .remove("base16-ocean.dark")
        .unwrap_or_default()
});

const CODE_GUTTER: Color = Color::DarkGray;
const CITATION: Color = Color::LightBlue;

/// A run of answer text: plain text or a citation reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    /// Ordinary text.
    Text(&'a str),
    /// A `[docN]` marker, carrying `N`.
    Citation(usize),
}

/// Split `text` at `[docN]` markers.
pub fn citation_segments(text: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find("[doc") {
        let after = &rest[start + 4..];
        let digits = after.bytes().take_while(u8::is_ascii_digit).count();
        let number = after[..digits].parse::<usize>().ok();

        match number {
            Some(n) if after[digits..].starts_with(']') => {
                if start > 0 {
                    segments.push(Segment::Text(&rest[..start]));
                }
                segments.push(Segment::Citation(n));
                rest = &after[digits + 1..];
            }
            _ => {
                segments.push(Segment::Text(&rest[..start + 4]));
                rest = after;
            }
        }
    }

    if !rest.is_empty() {
        segments.push(Segment::Text(rest));
    }
    segments
}

/// Convert an answer to styled lines.
///
/// Code lines wider than `width` are cut with an ellipsis instead of wrapped.
pub fn render_markdown(text: &str, width: usize) -> Vec<Line<'static>> {
    let mut renderer = Renderer::new(width);
    let parser = Parser::new_ext(text, Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TABLES);
    // Brackets arrive as separate text events; markers need them joined.
    for event in TextMergeStream::new(parser) {
        renderer.event(event);
    }
    renderer.finish()
}

struct Renderer {
    width: usize,
    lines: Vec<Line<'static>>,
    spans: Vec<Span<'static>>,
    styles: Vec<Style>,
    code: Option<(String, String)>,
    lists: Vec<Option<u64>>,
}

impl Renderer {
    fn new(width: usize) -> Self {
        Self {
            width,
            lines: Vec::new(),
            spans: Vec::new(),
            styles: vec![Style::default()],
            code: None,
            lists: Vec::new(),
        }
    }

    fn style(&self) -> Style {
        self.styles.last().copied().unwrap_or_default()
    }

    fn push_style(&mut self, patch: Style) {
        self.styles.push(self.style().patch(patch));
    }

    fn pop_style(&mut self) {
        if self.styles.len() > 1 {
            self.styles.pop();
        }
    }

    fn flush(&mut self) {
        if !self.spans.is_empty() {
            self.lines.push(Line::from(std::mem::take(&mut self.spans)));
        }
    }

    fn blank(&mut self) {
        self.flush();
        if self.lines.last().is_some_and(|line| !line.spans.is_empty()) {
            self.lines.push(Line::default());
        }
    }

    fn text(&mut self, text: &str) {
        if let Some((_, body)) = &mut self.code {
            body.push_str(text);
            return;
        }

        let style = self.style();
        for (i, part) in text.split('\n').enumerate() {
            if i > 0 {
                self.flush();
            }
            for segment in citation_segments(part) {
                let span = match segment {
                    Segment::Text(s) => Span::styled(s.to_string(), style),
                    Segment::Citation(n) => Span::styled(
                        format!("[{n}]"),
                        Style::default().fg(CITATION).add_modifier(Modifier::BOLD),
                    ),
                };
                self.spans.push(span);
            }
        }
    }

    fn event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag),
            Event::Text(text) => self.text(&text),
            Event::Code(code) => self.spans.push(Span::styled(
                format!("`{code}`"),
                Style::default().fg(Color::Yellow).bg(Color::Rgb(40, 40, 40)),
            )),
            // Soft breaks read better as real breaks in a terminal.
            Event::SoftBreak | Event::HardBreak => self.flush(),
            Event::Rule => {
                self.flush();
                self.lines.push(Line::styled(
                    "─".repeat(self.width.min(60)),
                    Style::default().fg(CODE_GUTTER),
                ));
            }
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Heading { level, .. } => {
                self.blank();
                let marks = match level {
                    HeadingLevel::H1 => "# ",
                    HeadingLevel::H2 => "## ",
                    HeadingLevel::H3 => "### ",
                    _ => "#### ",
                };
                self.spans
                    .push(Span::styled(marks, Style::default().fg(Color::Magenta)));
                self.push_style(Style::default().fg(Color::Magenta).add_modifier(Modifier::BOLD));
            }
            Tag::BlockQuote(_) => {
                self.flush();
                self.spans
                    .push(Span::styled("│ ", Style::default().fg(Color::Blue)));
                self.push_style(Style::default().fg(Color::Blue));
            }
            Tag::CodeBlock(kind) => {
                self.flush();
                let lang = match kind {
                    CodeBlockKind::Fenced(lang) => lang.to_string(),
                    CodeBlockKind::Indented => String::new(),
                };
                self.code = Some((lang, String::new()));
            }
            Tag::List(first) => {
                self.flush();
                self.lists.push(first);
            }
            Tag::Item => {
                let indent = "  ".repeat(self.lists.len().saturating_sub(1));
                let bullet = match self.lists.last_mut() {
                    Some(Some(n)) => {
                        *n += 1;
                        format!("{indent}{}. ", *n - 1)
                    }
                    _ => format!("{indent}• "),
                };
                self.spans
                    .push(Span::styled(bullet, Style::default().fg(Color::Cyan)));
            }
            Tag::Emphasis => self.push_style(Style::default().add_modifier(Modifier::ITALIC)),
            Tag::Strong => self.push_style(Style::default().add_modifier(Modifier::BOLD)),
            Tag::Strikethrough => {
                self.push_style(Style::default().add_modifier(Modifier::CROSSED_OUT));
            }
            Tag::Link { .. } => self.push_style(
                Style::default()
                    .fg(Color::Blue)
                    .add_modifier(Modifier::UNDERLINED),
            ),
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Heading(_) | TagEnd::BlockQuote(_) => {
                self.pop_style();
                self.flush();
            }
            TagEnd::Paragraph => self.blank(),
            TagEnd::CodeBlock => {
                if let Some((lang, body)) = self.code.take() {
                    self.code_block(&lang, &body);
                }
            }
            TagEnd::List(_) => {
                self.flush();
                self.lists.pop();
                if self.lists.is_empty() {
                    self.blank();
                }
            }
            TagEnd::Item => self.flush(),
            TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough | TagEnd::Link => {
                self.pop_style();
            }
            _ => {}
        }
    }

    fn code_block(&mut self, lang: &str, body: &str) {
        let gutter = Style::default().fg(CODE_GUTTER);
        let rule = "─".repeat(self.width.saturating_sub(2).min(44));

        let mut header = vec![Span::styled("┌", gutter)];
        if !lang.is_empty() {
            header.push(Span::styled(
                format!("─ {lang} "),
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            ));
        }
        header.push(Span::styled(rule.clone(), gutter));
        self.lines.push(Line::from(header));

        let max = self.width.saturating_sub(4);
        for spans in highlight(body, lang) {
            let mut line = vec![Span::styled("│ ", gutter)];
            line.extend(truncate_spans(spans, max));
            self.lines.push(Line::from(line));
        }

        self.lines
            .push(Line::from(vec![Span::styled("└", gutter), Span::styled(rule, gutter)]));
        self.lines.push(Line::default());
    }

    fn finish(mut self) -> Vec<Line<'static>> {
        self.flush();
        while self.lines.last().is_some_and(|line| line.spans.is_empty()) {
            self.lines.pop();
        }
        self.lines
    }
}

/// Highlight `code` as `lang`, one span list per line.
fn highlight(code: &str, lang: &str) -> Vec<Vec<Span<'static>>> {
    let syntax = SYNTAXES
        .find_syntax_by_token(lang)
        .unwrap_or_else(|| SYNTAXES.find_syntax_plain_text());
    let mut highlighter = HighlightLines::new(syntax, &THEME);

    LinesWithEndings::from(code)
        .map(|line| match highlighter.highlight_line(line, &SYNTAXES) {
            Ok(ranges) => ranges
                .into_iter()
                .map(|(style, text)| {
                    let fg = style.foreground;
                    let mut converted = Style::default().fg(Color::Rgb(fg.r, fg.g, fg.b));
                    if style.font_style.contains(FontStyle::BOLD) {
                        converted = converted.add_modifier(Modifier::BOLD);
                    }
                    if style.font_style.contains(FontStyle::ITALIC) {
                        converted = converted.add_modifier(Modifier::ITALIC);
                    }
                    Span::styled(text.trim_end_matches(['\n', '\r']).to_string(), converted)
                })
                .filter(|span| !span.content.is_empty())
                .collect(),
            Err(_) => vec![Span::styled(
                line.trim_end_matches(['\n', '\r']).to_string(),
                Style::default().fg(Color::Yellow),
            )],
        })
        .collect()
}

/// Cut spans to `max` characters, marking the cut with an ellipsis.
fn truncate_spans(spans: Vec<Span<'static>>, max: usize) -> Vec<Span<'static>> {
    let total: usize = spans.iter().map(|span| span.content.chars().count()).sum();
    if total <= max {
        return spans;
    }

    let mut remaining = max.saturating_sub(1);
    let mut out = Vec::new();
    for span in spans {
        if remaining == 0 {
            break;
        }
        let len = span.content.chars().count();
        if len <= remaining {
            remaining -= len;
            out.push(span);
        } else {
            out.push(Span::styled(
                span.content.chars().take(remaining).collect::<String>(),
                span.style,
            ));
            remaining = 0;
        }
    }
    out.push(Span::styled("…", Style::default().fg(CODE_GUTTER)));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(lines: &[Line<'_>]) -> Vec<String> {
        lines
            .iter()
            .map(|line| line.spans.iter().map(|s| s.content.as_ref()).collect())
            .collect()
    }

    #[test]
    fn markers_become_numbers() {
        assert_eq!(
            citation_segments("See [doc1] and [doc12]."),
            vec![
                Segment::Text("See "),
                Segment::Citation(1),
                Segment::Text(" and "),
                Segment::Citation(12),
                Segment::Text("."),
            ]
        );
    }

    #[test]
    fn incomplete_markers_stay_text() {
        let text: String = citation_segments("[doc] [docx] [doc3")
            .into_iter()
            .map(|segment| match segment {
                Segment::Text(s) => s.to_string(),
                Segment::Citation(n) => format!("<{n}>"),
            })
            .collect();
        assert_eq!(text, "[doc] [docx] [doc3");
    }

    #[test]
    fn answer_with_citation() {
        let lines = render_markdown("Use the **playbook** [doc1].", 80);
        assert_eq!(plain(&lines), vec!["Use the playbook [1]."]);
    }

    #[test]
    fn code_block_is_framed() {
        let lines = render_markdown("```rust\nfn main() {}\n```", 80);
        let text = plain(&lines);
        assert!(text[0].starts_with("┌─ rust "));
        assert!(text[1].starts_with("│ fn main"));
        assert!(text[2].starts_with('└'));
    }

    #[test]
    fn long_code_lines_are_cut() {
        let lines = render_markdown(&format!("```\n{}\n```", "x".repeat(100)), 20);
        let code = &plain(&lines)[1];
        assert!(code.ends_with('…'));
        assert_eq!(code.chars().count(), 2 + 16);
    }

    #[test]
    fn ordered_list_numbers() {
        let lines = render_markdown("3. one\n4. two", 80);
        assert_eq!(plain(&lines), vec!["3. one", "4. two"]);
    }
}
