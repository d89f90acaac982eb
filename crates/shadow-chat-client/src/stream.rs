//! Incremental reassembly of the streamed chat response.
//!
//! The chat endpoint answers with newline-delimited JSON: one `ChatResponse`
//! object per line. The body arrives in arbitrary chunks, so a line (and a
//! UTF-8 code point) may be split across reads. Raw bytes are buffered until a
//! newline arrives and only complete lines are decoded.
//!
//! Framing is the backend's, not ours: a decoded line is appended to a running
//! text buffer and the buffer is parsed as JSON. If parsing fails the object is
//! assumed incomplete and the next line is appended to it. Two objects on one
//! line therefore never parse; the backend does not produce that.

use std::fmt;

use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use shadow_chat_core::ChatResponse;

use crate::error::ClientError;

/// Why a response stream did not complete.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The request was cancelled locally.
    #[error("request aborted")]
    Aborted,

    /// The request could not be sent or was rejected.
    #[error("request failed: {0}")]
    Request(#[from] ClientError),

    /// Reading the body failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend reported an error inside the stream.
    #[error("server error: {0}")]
    Server(String),

    /// A complete JSON object arrived that is not a usable response frame.
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// The stream ended without a single complete frame.
    #[error("stream ended without a response")]
    EmptyResponse,
}

impl StreamError {
    /// Returns `true` for user-initiated cancellation, which is never reported.
    #[must_use]
    pub const fn is_abort(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}

/// A complete JSON object pulled out of the stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamFrame {
    /// A response frame with at least one choice.
    Response(ChatResponse),
    /// An `{"error": ...}` object emitted by the backend.
    Error(String),
    /// Valid JSON that is not a response frame.
    Malformed(String),
}

impl StreamFrame {
    fn classify(value: serde_json::Value) -> Self {
        if let Some(error) = value.get("error") {
            let message = error
                .as_str()
                .map(str::to_string)
                .or_else(|| {
                    error
                        .get("message")
                        .and_then(serde_json::Value::as_str)
                        .map(str::to_string)
                })
                .unwrap_or_else(|| error.to_string());
            return Self::Error(message);
        }

        match serde_json::from_value::<ChatResponse>(value) {
            Ok(response) if !response.choices.is_empty() => Self::Response(response),
            Ok(_) => Self::Malformed("frame has no choices".to_string()),
            Err(e) => Self::Malformed(e.to_string()),
        }
    }
}

/// Buffers stream chunks and yields complete frames.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    /// Bytes after the last newline seen.
    pending: Vec<u8>,
    /// Decoded lines that have not parsed yet.
    running: String,
    frames: usize,
}

impl FrameAssembler {
    /// Create an empty assembler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk of the body and return every frame it completed, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamFrame> {
        self.pending.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(newline) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=newline).collect();
            self.feed_line(&line[..newline], &mut frames);
        }
        frames
    }

    /// Flush a trailing line that had no final newline.
    pub fn finish(&mut self) -> Vec<StreamFrame> {
        let mut frames = Vec::new();
        if !self.pending.is_empty() {
            let line = std::mem::take(&mut self.pending);
            self.feed_line(&line, &mut frames);
        }
        if !self.running.trim().is_empty() {
            tracing::debug!(
                leftover = self.running.len(),
                "Discarding incomplete trailing fragment"
            );
            self.running.clear();
        }
        frames
    }

    /// Number of frames produced so far.
    #[must_use]
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Returns `true` if text is buffered that has not formed a frame yet.
    #[must_use]
    pub fn has_partial(&self) -> bool {
        !self.pending.is_empty() || !self.running.trim().is_empty()
    }

    fn feed_line(&mut self, line: &[u8], frames: &mut Vec<StreamFrame>) {
        let text = String::from_utf8_lossy(line);
        self.running.push_str(text.strip_suffix('\r').unwrap_or(&text));

        if self.running.trim().is_empty() {
            self.running.clear();
            return;
        }

        // A parse failure means the object continues on the next line.
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(&self.running) {
            self.running.clear();
            self.frames += 1;
            frames.push(StreamFrame::classify(value));
        }
    }
}

/// Read a response body to the end, calling `on_frame` for every frame.
///
/// Returns the last frame. Cancelling `cancel` stops the read at the next
/// suspension point with `StreamError::Aborted`.
///
/// # Errors
///
/// Returns a `StreamError` on cancellation, body read failure, an error or
/// malformed frame, or a body that contained no frame at all.
pub async fn read_frames<S, B, E, F>(
    body: S,
    cancel: &CancellationToken,
    mut on_frame: F,
) -> Result<ChatResponse, StreamError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: fmt::Display,
    F: FnMut(&ChatResponse),
{
    let mut body = std::pin::pin!(body);
    let mut assembler = FrameAssembler::new();
    let mut last = None;

    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(StreamError::Aborted),
            next = body.next() => next,
        };

        let Some(chunk) = next else { break };
        let chunk = chunk.map_err(|e| StreamError::Transport(e.to_string()))?;

        for frame in assembler.push(chunk.as_ref()) {
            last = Some(accept(frame, &mut on_frame)?);
        }
    }

    for frame in assembler.finish() {
        last = Some(accept(frame, &mut on_frame)?);
    }

    tracing::debug!(frames = assembler.frames(), "Response stream finished");
    last.ok_or(StreamError::EmptyResponse)
}

fn accept<F>(frame: StreamFrame, on_frame: &mut F) -> Result<ChatResponse, StreamError>
where
    F: FnMut(&ChatResponse),
{
    match frame {
        StreamFrame::Response(response) => {
            on_frame(&response);
            Ok(response)
        }
        StreamFrame::Error(message) => Err(StreamError::Server(message)),
        StreamFrame::Malformed(reason) => Err(StreamError::Malformed(reason)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use shadow_chat_core::Message;

    fn frame_line(text: &str) -> String {
        let response = ChatResponse::from_messages(vec![Message::assistant(text)]);
        format!("{}\n", serde_json::to_string(&response).unwrap())
    }

    fn contents(frames: &[StreamFrame]) -> Vec<String> {
        frames
            .iter()
            .map(|frame| match frame {
                StreamFrame::Response(r) => r.messages().unwrap()[0].content.clone(),
                other => panic!("Expected Response, got {other:?}"),
            })
            .collect()
    }

    fn chunks_of(body: &[u8], size: usize) -> Vec<Result<Vec<u8>, std::io::Error>> {
        body.chunks(size).map(|c| Ok(c.to_vec())).collect()
    }

    // =========================================================================
    // FrameAssembler
    // =========================================================================

    #[test]
    fn one_frame_per_line() {
        let body = format!("{}{}", frame_line("Hel"), frame_line("Hello"));
        let mut assembler = FrameAssembler::new();
        let frames = assembler.push(body.as_bytes());
        assert_eq!(contents(&frames), vec!["Hel", "Hello"]);
        assert!(!assembler.has_partial());
    }

    #[test]
    fn every_chunking_yields_same_frames() {
        let body = format!(
            "{}{}{}",
            frame_line("Olá"),
            frame_line("Olá, 世界"),
            frame_line("Olá, 世界 🎉")
        );
        let bytes = body.as_bytes();

        for size in 1..=bytes.len() {
            let mut assembler = FrameAssembler::new();
            let mut frames = Vec::new();
            for chunk in bytes.chunks(size) {
                frames.extend(assembler.push(chunk));
            }
            frames.extend(assembler.finish());
            assert_eq!(
                contents(&frames),
                vec!["Olá", "Olá, 世界", "Olá, 世界 🎉"],
                "chunk size {size}"
            );
        }
    }

    #[test]
    fn object_split_over_lines_is_joined() {
        let mut assembler = FrameAssembler::new();
        let first = assembler.push(b"{\"choices\":[{\"messages\":\n");
        assert!(first.is_empty());
        assert!(assembler.has_partial());

        let second =
            assembler.push(b"[{\"role\":\"assistant\",\"content\":\"joined\"}]}]}\n");
        assert_eq!(contents(&second), vec!["joined"]);
    }

    #[test]
    fn blank_and_crlf_lines() {
        let body = format!("\n\r\n{}", frame_line("ok").replace('\n', "\r\n"));
        let mut assembler = FrameAssembler::new();
        let frames = assembler.push(body.as_bytes());
        assert_eq!(contents(&frames), vec!["ok"]);
    }

    #[test]
    fn trailing_line_without_newline_flushed() {
        let line = frame_line("tail");
        let mut assembler = FrameAssembler::new();
        assert!(assembler.push(line.trim_end().as_bytes()).is_empty());
        assert_eq!(contents(&assembler.finish()), vec!["tail"]);
    }

    #[test]
    fn two_objects_on_one_line_never_parse() {
        let joined = format!("{}{}", frame_line("a").trim_end(), frame_line("b"));
        let mut assembler = FrameAssembler::new();
        assert!(assembler.push(joined.as_bytes()).is_empty());
        assert!(assembler.has_partial());
        assert!(assembler.finish().is_empty());
    }

    #[test]
    fn error_object_classified() {
        let mut assembler = FrameAssembler::new();
        let frames = assembler.push(b"{\"error\": \"quota exceeded\"}\n");
        assert_eq!(frames, vec![StreamFrame::Error("quota exceeded".to_string())]);

        let frames = assembler.push(b"{\"error\": {\"message\": \"bad deployment\"}}\n");
        assert_eq!(frames, vec![StreamFrame::Error("bad deployment".to_string())]);
    }

    #[test]
    fn json_without_choices_is_malformed() {
        let mut assembler = FrameAssembler::new();
        let frames = assembler.push(b"{\"id\":\"x\"}\n[1,2]\n{\"choices\":[]}\n");
        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(|f| matches!(f, StreamFrame::Malformed(_))));
    }

    #[test]
    fn choice_without_messages_is_malformed() {
        let mut assembler = FrameAssembler::new();
        let frames = assembler.push(b"{\"choices\":[{}]}\n");
        assert_eq!(frames.len(), 1);
        assert!(matches!(frames[0], StreamFrame::Malformed(_)));
    }

    // =========================================================================
    // read_frames
    // =========================================================================

    #[tokio::test]
    async fn read_frames_reports_each_frame_in_order() {
        let body = format!("{}{}", frame_line("one"), frame_line("one two"));
        let token = CancellationToken::new();
        let mut seen = Vec::new();

        let last = read_frames(
            stream::iter(chunks_of(body.as_bytes(), 7)),
            &token,
            |frame| seen.push(frame.messages().unwrap()[0].content.clone()),
        )
        .await
        .unwrap();

        assert_eq!(seen, vec!["one", "one two"]);
        assert_eq!(last.messages().unwrap()[0].content, "one two");
    }

    #[tokio::test]
    async fn read_frames_empty_body() {
        let token = CancellationToken::new();
        let result = read_frames(
            stream::iter(Vec::<Result<Vec<u8>, std::io::Error>>::new()),
            &token,
            |_| {},
        )
        .await;
        assert!(matches!(result, Err(StreamError::EmptyResponse)));
    }

    #[tokio::test]
    async fn read_frames_cancelled_before_data() {
        let token = CancellationToken::new();
        token.cancel();
        let mut called = false;

        let result = read_frames(
            stream::pending::<Result<Vec<u8>, std::io::Error>>(),
            &token,
            |_| called = true,
        )
        .await;

        assert!(matches!(result, Err(StreamError::Aborted)));
        assert!(result.unwrap_err().is_abort());
        assert!(!called);
    }

    #[tokio::test]
    async fn read_frames_cancelled_mid_stream() {
        let token = CancellationToken::new();
        let first = frame_line("partial");
        let body = stream::iter(vec![Ok::<_, std::io::Error>(first.into_bytes())])
            .chain(stream::pending());
        let mut seen = 0;

        let canceller = token.clone();
        let result = read_frames(body, &token, |_| {
            seen += 1;
            canceller.cancel();
        })
        .await;

        assert!(matches!(result, Err(StreamError::Aborted)));
        assert_eq!(seen, 1);
    }

    #[tokio::test]
    async fn read_frames_transport_error() {
        let token = CancellationToken::new();
        let chunks: Vec<Result<Vec<u8>, std::io::Error>> = vec![
            Ok(b"{\"choices\":".to_vec()),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ];
        let result = read_frames(stream::iter(chunks), &token, |_| {}).await;
        assert!(matches!(result, Err(StreamError::Transport(_))));
    }

    #[tokio::test]
    async fn read_frames_server_error_frame() {
        let token = CancellationToken::new();
        let body = format!("{}{{\"error\":\"upstream timeout\"}}\n", frame_line("half"));
        let mut seen = 0;
        let result = read_frames(stream::iter(chunks_of(body.as_bytes(), 64)), &token, |_| {
            seen += 1;
        })
        .await;
        assert!(matches!(result, Err(StreamError::Server(ref m)) if m == "upstream timeout"));
        assert_eq!(seen, 1);
    }
}
