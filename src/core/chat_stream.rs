//! Server-sent-event decoding for streamed chat responses.
//!
//! [`FragmentDecoder`] turns one line into at most one [`StreamEvent`];
//! [`EventStream`] drives it over a response body, splitting on newlines and
//! stopping for good once the stream ends.

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use futures_util::StreamExt;
use memchr::memchr;
use serde_json::Value;
use tracing::debug;

use crate::core::transport::ByteStream;
use crate::utils::input::{strip_encoded_surrogates, strip_lone_surrogate_escapes};

/// Longest line kept while waiting for its newline.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Why a line produced no text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The line does not carry the `data:` prefix the format requires.
    NotData,
    InvalidUtf8,
    InvalidJson,
    /// Valid JSON without a string at the delta path.
    MissingDelta,
    EmptyDelta,
    /// No newline arrived within the line length limit; the line is dropped.
    LineTooLong,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SkipReason::NotData => "not a data line",
            SkipReason::InvalidUtf8 => "invalid UTF-8",
            SkipReason::InvalidJson => "invalid JSON",
            SkipReason::MissingDelta => "no text delta",
            SkipReason::EmptyDelta => "empty text delta",
            SkipReason::LineTooLong => "line too long",
        };
        f.write_str(text)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamEvent {
    Fragment(String),
    Malformed(SkipReason),
    /// The stream stopped early because of a network error.
    Failed(String),
    End,
}

/// Provider-specific framing facts the decoder needs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameFormat {
    pub require_data_prefix: bool,
    /// Payload that marks the end of the stream; `None` means only a closed
    /// connection ends it.
    pub sentinel: Option<&'static str>,
    /// JSON pointer to the text delta inside one event.
    pub delta_pointer: &'static str,
}

impl FrameFormat {
    pub const CHAT_COMPLETIONS: FrameFormat = FrameFormat {
        require_data_prefix: false,
        sentinel: Some("[DONE]"),
        delta_pointer: "/choices/0/delta/content",
    };

    pub const GEMINI: FrameFormat = FrameFormat {
        require_data_prefix: true,
        sentinel: None,
        delta_pointer: "/candidates/0/content/parts/0/text",
    };

    pub fn extract<'v>(&self, event: &'v Value) -> Option<&'v str> {
        event.pointer(self.delta_pointer).and_then(Value::as_str)
    }
}

fn extract_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

#[derive(Clone, Copy, Debug)]
pub struct FragmentDecoder {
    format: FrameFormat,
}

impl FragmentDecoder {
    pub fn new(format: FrameFormat) -> Self {
        Self { format }
    }

    /// Decode one line (without its newline). Blank lines yield `None`.
    pub fn decode_line(&self, raw: &[u8]) -> Option<StreamEvent> {
        let cleaned = strip_encoded_surrogates(raw);
        let Ok(line) = std::str::from_utf8(&cleaned) else {
            return Some(StreamEvent::Malformed(SkipReason::InvalidUtf8));
        };
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let payload = match extract_data_payload(line) {
            Some(payload) => payload,
            None if self.format.require_data_prefix => {
                return Some(StreamEvent::Malformed(SkipReason::NotData));
            }
            None => line,
        };

        if self.format.sentinel == Some(payload) {
            return Some(StreamEvent::End);
        }

        Some(self.decode_payload(payload))
    }

    fn decode_payload(&self, payload: &str) -> StreamEvent {
        let payload = strip_lone_surrogate_escapes(payload);
        let value = match serde_json::from_str::<Value>(&payload) {
            Ok(value) => value,
            Err(_) => return StreamEvent::Malformed(SkipReason::InvalidJson),
        };

        match self.format.extract(&value) {
            Some("") => StreamEvent::Malformed(SkipReason::EmptyDelta),
            Some(text) => StreamEvent::Fragment(text.to_string()),
            None => {
                if let Some(summary) = extract_error_summary(&value) {
                    debug!(%summary, "Skipping error event in stream");
                }
                StreamEvent::Malformed(SkipReason::MissingDelta)
            }
        }
    }
}

/// Lazy, finite sequence of [`StreamEvent`]s over a response body.
///
/// After `End` or `Failed` the stream is exhausted: `next_event` returns
/// `None` and the body is never polled again.
pub struct EventStream {
    body: ByteStream,
    decoder: FragmentDecoder,
    buffer: Vec<u8>,
    queued: VecDeque<StreamEvent>,
    idle_timeout: Option<Duration>,
    max_line_bytes: usize,
    // Inside an oversized line whose rest is still arriving.
    discarding: bool,
    exhausted: bool,
}

impl EventStream {
    pub fn new(body: ByteStream, format: FrameFormat) -> Self {
        Self {
            body,
            decoder: FragmentDecoder::new(format),
            buffer: Vec::new(),
            queued: VecDeque::new(),
            idle_timeout: None,
            max_line_bytes: MAX_LINE_BYTES,
            discarding: false,
            exhausted: false,
        }
    }

    /// Fail the stream when no bytes arrive for `timeout`.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    pub fn with_max_line_bytes(mut self, limit: usize) -> Self {
        self.max_line_bytes = limit;
        self
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted && self.queued.is_empty()
    }

    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        loop {
            if let Some(event) = self.queued.pop_front() {
                return Some(event);
            }
            if self.exhausted {
                return None;
            }

            if let Some(newline_pos) = memchr(b'\n', &self.buffer) {
                if self.discarding {
                    self.buffer.drain(..=newline_pos);
                    self.discarding = false;
                    continue;
                }
                let event = self.decoder.decode_line(&self.buffer[..newline_pos]);
                self.buffer.drain(..=newline_pos);
                if let Some(event) = event {
                    if event == StreamEvent::End {
                        self.finish();
                    }
                    return Some(event);
                }
                continue;
            }

            if self.buffer.len() > self.max_line_bytes {
                self.buffer.clear();
                if !self.discarding {
                    self.discarding = true;
                    debug!(limit = self.max_line_bytes, "Dropping oversized stream line");
                    return Some(StreamEvent::Malformed(SkipReason::LineTooLong));
                }
            }

            match self.read_chunk().await {
                Ok(Some(chunk)) => self.buffer.extend_from_slice(&chunk),
                Ok(None) => {
                    // Connection closed: the last line may lack a newline.
                    let tail = std::mem::take(&mut self.buffer);
                    if !self.discarding {
                        match self.decoder.decode_line(&tail) {
                            Some(StreamEvent::End) | None => {}
                            Some(event) => self.queued.push_back(event),
                        }
                    }
                    self.queued.push_back(StreamEvent::End);
                    self.finish();
                }
                Err(message) => {
                    debug!(error = %message, "Response stream failed");
                    self.queued.push_back(StreamEvent::Failed(message));
                    self.finish();
                }
            }
        }
    }

    async fn read_chunk(&mut self) -> Result<Option<Vec<u8>>, String> {
        let next = match self.idle_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, self.body.next()).await {
                Ok(next) => next,
                Err(_) => {
                    return Err(format!("No data received for {timeout:?}"))
                }
            },
            None => self.body.next().await,
        };

        match next {
            Some(Ok(chunk)) => Ok(Some(chunk)),
            Some(Err(err)) => Err(err.to_string()),
            None => Ok(None),
        }
    }

    fn finish(&mut self) {
        self.exhausted = true;
        self.buffer.clear();
    }
}

fn extract_error_summary(value: &Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value.get("error").and_then(|v| match v {
                Value::String(s) => Some(s.to_string()),
                Value::Object(map) => map
                    .get("message")
                    .and_then(|message| message.as_str().map(str::to_owned)),
                _ => None,
            })
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str().map(str::to_owned))
        });

    summary.map(|text| {
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        collapsed.trim().to_string()
    })
}

/// Format an error response body for display.
pub fn format_api_error(error_text: &str) -> String {
    let trimmed = error_text.trim();

    if trimmed.is_empty() {
        return "API Error:\n```\n<empty>\n```".to_string();
    }

    if let Ok(json_value) = serde_json::from_str::<Value>(trimmed) {
        if let Ok(pretty_json) = serde_json::to_string_pretty(&json_value) {
            if let Some(summary) = extract_error_summary(&json_value) {
                if !summary.is_empty() {
                    return format!("API Error: {}\n```json\n{}\n```", summary, pretty_json);
                }
            }
            return format!("API Error:\n```json\n{}\n```", pretty_json);
        }
    }

    if trimmed.starts_with('<') && trimmed.ends_with('>') {
        format!("API Error:\n```xml\n{}\n```", trimmed)
    } else {
        format!("API Error:\n```\n{}\n```", trimmed)
    }
}
