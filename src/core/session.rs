//! The per-provider chat loop.
//!
//! A [`ChatSession`] owns one conversation and drives it through
//! `AwaitingInput → Sending → Streaming → Committing` until the user leaves,
//! input ends, the provider closes the session, or the session is
//! interrupted. One exchange is in flight at a time.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::core::adapters::{ProviderAdapter, RejectionPolicy};
use crate::core::chat_stream::{format_api_error, EventStream, StreamEvent};
use crate::core::conversation::Conversation;
use crate::core::persistence::{RecordRole, Recorder};
use crate::core::transport::{Transport, TransportResponse};

/// Inputs that end a session, compared trimmed and case-insensitively.
pub const EXIT_TOKENS: [&str; 5] = ["exit", "quit", ":q", "bye", "خروج"];

const REJECTION_PREVIEW_CHARS: usize = 200;

pub fn is_exit_token(input: &str) -> bool {
    let normalized = input.trim().to_lowercase();
    EXIT_TOKENS.iter().any(|token| *token == normalized)
}

/// Output surface for a session. Implementations decide how things look;
/// the session only decides what is shown and when.
pub trait Renderer {
    fn user_prompt(&mut self);
    fn assistant_header(&mut self, label: &str);
    /// Called once per fragment, before it is accumulated.
    fn fragment(&mut self, text: &str);
    fn end_response(&mut self);
    fn info(&mut self, message: &str);
    fn error(&mut self, message: &str);
}

#[async_trait]
pub trait InputSource: Send {
    /// Next line of user input, `None` once input is exhausted.
    ///
    /// Must be cancel-safe: dropping the future mid-read loses no input.
    async fn read_line(&mut self) -> io::Result<Option<String>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    AwaitingInput,
    Sending,
    Streaming,
    Committing,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionExit {
    UserExit,
    Interrupted,
    InputClosed,
    ProviderRejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    pub exit: SessionExit,
    /// Requests sent during the session.
    pub exchanges: usize,
}

enum Prompted {
    Line(String),
    Closed,
    Interrupted,
}

pub struct ChatSession<'a> {
    adapter: Box<dyn ProviderAdapter>,
    conversation: Conversation,
    transport: Arc<dyn Transport>,
    recorder: Recorder,
    renderer: &'a mut dyn Renderer,
    input: &'a mut dyn InputSource,
    cancel: CancellationToken,
    idle_timeout: Duration,
    phase: SessionPhase,
    exchanges: usize,
}

impl<'a> ChatSession<'a> {
    pub fn new(
        adapter: Box<dyn ProviderAdapter>,
        transport: Arc<dyn Transport>,
        recorder: Recorder,
        renderer: &'a mut dyn Renderer,
        input: &'a mut dyn InputSource,
        cancel: CancellationToken,
    ) -> Self {
        let conversation = adapter.seed_conversation();
        let idle_timeout = adapter.config().timeout();
        Self {
            adapter,
            conversation,
            transport,
            recorder,
            renderer,
            input,
            cancel,
            idle_timeout,
            phase: SessionPhase::AwaitingInput,
            exchanges: 0,
        }
    }

    /// Fail a stream that goes quiet for longer than `timeout`. Defaults to
    /// the provider's request timeout.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub async fn run(&mut self) -> SessionSummary {
        let exit = loop {
            self.set_phase(SessionPhase::AwaitingInput);
            let line = match self.prompt().await {
                Prompted::Line(line) => line,
                Prompted::Closed => break SessionExit::InputClosed,
                Prompted::Interrupted => break SessionExit::Interrupted,
            };

            let text = line.trim();
            if text.is_empty() {
                continue;
            }
            if is_exit_token(text) {
                break SessionExit::UserExit;
            }

            if let Some(exit) = self.exchange(text).await {
                break exit;
            }
        };

        self.set_phase(SessionPhase::Closed);
        debug!(
            provider = %self.adapter.config().id,
            exit = ?exit,
            exchanges = self.exchanges,
            "Session closed"
        );
        SessionSummary {
            exit,
            exchanges: self.exchanges,
        }
    }

    async fn prompt(&mut self) -> Prompted {
        self.renderer.user_prompt();
        let cancel = self.cancel.clone();
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            line = self.input.read_line() => Some(line),
        };

        match read {
            None => Prompted::Interrupted,
            Some(Ok(Some(line))) => Prompted::Line(line),
            Some(Ok(None)) => Prompted::Closed,
            Some(Err(err)) => {
                self.renderer.error(&format!("Failed to read input: {err}"));
                Prompted::Closed
            }
        }
    }

    /// One request/response round trip. Returns the exit reason when the
    /// session must close afterwards.
    async fn exchange(&mut self, text: &str) -> Option<SessionExit> {
        self.set_phase(SessionPhase::Sending);
        self.adapter.append_user_turn(&mut self.conversation, text);
        self.recorder.record(RecordRole::User, text);
        self.exchanges += 1;

        let request = match self.adapter.build_request(&self.conversation) {
            Ok(request) => request,
            Err(err) => {
                self.renderer.error(&format!("Failed to build request: {err}"));
                return None;
            }
        };

        self.renderer.assistant_header(&self.adapter.config().assistant_label);

        let cancel = self.cancel.clone();
        let transport = Arc::clone(&self.transport);
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            response = transport.send(request) => Some(response),
        };

        let body = match response {
            None => {
                self.renderer.end_response();
                self.renderer.info("Interrupted.");
                return Some(SessionExit::Interrupted);
            }
            Some(Err(err)) => {
                self.renderer.end_response();
                self.renderer.error(&err.to_string());
                return None;
            }
            Some(Ok(TransportResponse::Rejected { status, body })) => {
                self.renderer.end_response();
                self.renderer.error(&describe_rejection(status, &body));
                return match self.adapter.rejection_policy() {
                    RejectionPolicy::ContinueSession => None,
                    RejectionPolicy::CloseSession => Some(SessionExit::ProviderRejected),
                };
            }
            Some(Ok(TransportResponse::Streaming(body))) => body,
        };

        self.set_phase(SessionPhase::Streaming);
        let mut events = EventStream::new(body, self.adapter.frame_format())
            .with_idle_timeout(self.idle_timeout);
        let mut pending = String::new();
        let mut failure = None;
        let mut interrupted = false;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                event = events.next_event() => Some(event),
            };

            match next {
                None => {
                    interrupted = true;
                    break;
                }
                Some(None) | Some(Some(StreamEvent::End)) => break,
                Some(Some(StreamEvent::Fragment(text))) => {
                    self.renderer.fragment(&text);
                    pending.push_str(&text);
                }
                Some(Some(StreamEvent::Malformed(reason))) => {
                    debug!(provider = %self.adapter.config().id, %reason, "Skipped stream line");
                }
                Some(Some(StreamEvent::Failed(message))) => {
                    failure = Some(message);
                    break;
                }
            }
        }

        self.renderer.end_response();
        if let Some(message) = failure {
            self.renderer.error(&message);
        }

        self.set_phase(SessionPhase::Committing);
        self.commit(pending);

        if interrupted {
            self.renderer.info("Interrupted.");
            Some(SessionExit::Interrupted)
        } else {
            None
        }
    }

    fn commit(&mut self, pending: String) {
        if pending.trim().is_empty() {
            return;
        }
        self.adapter.append_assistant_turn(&mut self.conversation, &pending);
        self.recorder.record(RecordRole::Assistant, &pending);
    }

    fn set_phase(&mut self, next: SessionPhase) {
        if self.phase != next {
            debug!(from = ?self.phase, to = ?next, "Session phase");
            self.phase = next;
        }
    }
}

fn describe_rejection(status: u16, body: &str) -> String {
    let preview: String = body.chars().take(REJECTION_PREVIEW_CHARS).collect();
    format!(
        "Request failed with status {status}.\n{}",
        format_api_error(&preview)
    )
}
