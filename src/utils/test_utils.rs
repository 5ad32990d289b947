use std::collections::VecDeque;
use std::io;
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::core::builtin_providers::find_builtin_provider;
use crate::core::persistence::{PersistError, RecordSink, TranscriptRecord};
use crate::core::providers::ProviderSession;
use crate::core::session::{InputSource, Renderer};
use crate::core::transport::{PreparedRequest, Transport, TransportError, TransportResponse};

pub fn create_test_session(provider_id: &str, model: &str) -> ProviderSession {
    ProviderSession {
        config: find_builtin_provider(provider_id).expect("builtin provider"),
        api_key: "test-key".to_string(),
        model: model.to_string(),
    }
}

pub fn chat_completions_line(content: &str) -> String {
    format!(
        "data: {}",
        serde_json::json!({"choices": [{"delta": {"content": content}}]})
    )
}

pub fn gemini_line(text: &str) -> String {
    format!(
        "data: {}",
        serde_json::json!({"candidates": [{"content": {"parts": [{"text": text}], "role": "model"}}]})
    )
}

pub enum ScriptedReply {
    /// Body chunks, then a clean close.
    Stream(Vec<Result<Vec<u8>, TransportError>>),
    /// Body chunks, then a body that never yields again.
    StreamThenHang(Vec<Result<Vec<u8>, TransportError>>),
    Rejected { status: u16, body: String },
    Error(TransportError),
}

impl ScriptedReply {
    /// One chunk per line, each newline-terminated.
    pub fn sse<S: AsRef<str>>(lines: &[S]) -> Self {
        ScriptedReply::Stream(
            lines
                .iter()
                .map(|line| Ok(format!("{}\n", line.as_ref()).into_bytes()))
                .collect(),
        )
    }
}

/// Transport that replays canned replies in order and remembers every request.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<PreparedRequest>>,
}

impl ScriptedTransport {
    pub fn new(replies: impl IntoIterator<Item = ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<PreparedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: PreparedRequest) -> Result<TransportResponse, TransportError> {
        self.requests.lock().unwrap().push(request);
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(ScriptedReply::Stream(chunks)) => {
                Ok(TransportResponse::Streaming(Box::pin(stream::iter(chunks))))
            }
            Some(ScriptedReply::StreamThenHang(chunks)) => Ok(TransportResponse::Streaming(
                Box::pin(stream::iter(chunks).chain(stream::pending())),
            )),
            Some(ScriptedReply::Rejected { status, body }) => {
                Ok(TransportResponse::Rejected { status, body })
            }
            Some(ScriptedReply::Error(err)) => Err(err),
            None => Err(TransportError::Request("no scripted reply".to_string())),
        }
    }
}

pub struct ScriptedInput {
    lines: VecDeque<String>,
}

impl ScriptedInput {
    pub fn new(lines: &[&str]) -> Self {
        Self {
            lines: lines.iter().map(|line| line.to_string()).collect(),
        }
    }
}

#[async_trait]
impl InputSource for ScriptedInput {
    async fn read_line(&mut self) -> io::Result<Option<String>> {
        Ok(self.lines.pop_front())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderEvent {
    Prompt,
    Header(String),
    Fragment(String),
    EndResponse,
    Info(String),
    Error(String),
}

#[derive(Default)]
pub struct RecordingRenderer {
    pub events: Vec<RenderEvent>,
    cancel_on_fragment: Option<CancellationToken>,
}

impl RecordingRenderer {
    /// Cancels `token` as soon as the first fragment is rendered.
    pub fn cancelling_on_fragment(token: CancellationToken) -> Self {
        Self {
            events: Vec::new(),
            cancel_on_fragment: Some(token),
        }
    }

    pub fn fragments(&self) -> String {
        self.events
            .iter()
            .filter_map(|event| match event {
                RenderEvent::Fragment(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|event| match event {
                RenderEvent::Error(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl Renderer for RecordingRenderer {
    fn user_prompt(&mut self) {
        self.events.push(RenderEvent::Prompt);
    }

    fn assistant_header(&mut self, label: &str) {
        self.events.push(RenderEvent::Header(label.to_string()));
    }

    fn fragment(&mut self, text: &str) {
        self.events.push(RenderEvent::Fragment(text.to_string()));
        if let Some(token) = &self.cancel_on_fragment {
            token.cancel();
        }
    }

    fn end_response(&mut self) {
        self.events.push(RenderEvent::EndResponse);
    }

    fn info(&mut self, message: &str) {
        self.events.push(RenderEvent::Info(message.to_string()));
    }

    fn error(&mut self, message: &str) {
        self.events.push(RenderEvent::Error(message.to_string()));
    }
}

#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<TranscriptRecord>>,
}

impl MemorySink {
    pub fn records(&self) -> Vec<TranscriptRecord> {
        self.records.lock().unwrap().clone()
    }
}

impl RecordSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    fn append_record(&self, record: &TranscriptRecord) -> Result<(), PersistError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

pub struct FailingSink;

impl RecordSink for FailingSink {
    fn name(&self) -> &str {
        "failing"
    }

    fn append_record(&self, _record: &TranscriptRecord) -> Result<(), PersistError> {
        Err(PersistError::Io(io::Error::other("disk full")))
    }
}
