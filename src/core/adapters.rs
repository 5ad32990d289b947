//! Per-provider translation between the session loop and a provider's wire
//! shape. There are two variants; OpenAI and Groq share the chat-completions
//! adapter and differ only in their [`ProviderConfig`].

use thiserror::Error;

use crate::api::{
    ChatMessage, ChatRequest, GeminiContent, GenerateContentRequest, GenerationConfig,
    SafetySetting, GEMINI_HARM_CATEGORIES,
};
use crate::core::builtin_providers::{AuthScheme, ProviderConfig, WireFormat};
use crate::core::chat_stream::FrameFormat;
use crate::core::conversation::{Conversation, HistoryShape, HistorySnapshot};
use crate::core::message::{Role, Turn};
use crate::core::providers::ProviderSession;
use crate::core::transport::PreparedRequest;

/// What the session does when the provider answers with a non-success status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionPolicy {
    /// Report the error and wait for the next input.
    ContinueSession,
    /// Report the error and leave the provider's chat loop.
    CloseSession,
}

#[derive(Debug, Error)]
pub enum RequestBuildError {
    #[error("Conversation is {found:?} but this provider expects {expected:?} history")]
    ShapeMismatch {
        expected: HistoryShape,
        found: HistoryShape,
    },
    #[error("Failed to encode request body: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Generation knobs shared by every adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSettings {
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub safety_threshold: String,
    /// Replaces the provider's built-in system prompt when set.
    pub system_prompt: Option<String>,
}

impl Default for RequestSettings {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_output_tokens: 8192,
            safety_threshold: "BLOCK_NONE".to_string(),
            system_prompt: None,
        }
    }
}

pub trait ProviderAdapter: Send + Sync {
    fn config(&self) -> &ProviderConfig;

    fn history_shape(&self) -> HistoryShape;

    /// A fresh conversation carrying the provider's seed turns.
    fn seed_conversation(&self) -> Conversation;

    /// Build the streaming request for the history as it stands, which
    /// already ends with the newest user turn.
    fn build_request(
        &self,
        conversation: &Conversation,
    ) -> Result<PreparedRequest, RequestBuildError>;

    fn frame_format(&self) -> FrameFormat;

    fn rejection_policy(&self) -> RejectionPolicy;

    fn append_user_turn(&self, conversation: &mut Conversation, text: &str) {
        conversation.append_user(text);
    }

    fn append_assistant_turn(&self, conversation: &mut Conversation, text: &str) {
        conversation.append_assistant(text);
    }
}

pub fn build_adapter(
    session: ProviderSession,
    settings: &RequestSettings,
) -> Box<dyn ProviderAdapter> {
    match session.config.wire {
        WireFormat::ChatCompletions => Box::new(ChatCompletionsAdapter::new(session, settings)),
        WireFormat::Gemini => Box::new(GeminiAdapter::new(session, settings)),
    }
}

fn auth_parts(
    config: &ProviderConfig,
    api_key: &str,
) -> (Vec<(String, String)>, Vec<(String, String)>) {
    match config.auth {
        AuthScheme::Bearer => (
            vec![("Authorization".to_string(), format!("Bearer {api_key}"))],
            Vec::new(),
        ),
        AuthScheme::QueryKey => (Vec::new(), vec![("key".to_string(), api_key.to_string())]),
    }
}

fn system_prompt<'a>(config: &'a ProviderConfig, settings: &'a RequestSettings) -> &'a str {
    settings
        .system_prompt
        .as_deref()
        .unwrap_or(&config.system_prompt)
}

pub struct ChatCompletionsAdapter {
    session: ProviderSession,
    temperature: f32,
    system_prompt: String,
}

impl ChatCompletionsAdapter {
    pub fn new(session: ProviderSession, settings: &RequestSettings) -> Self {
        let system_prompt = system_prompt(&session.config, settings).to_string();
        Self {
            session,
            temperature: settings.temperature,
            system_prompt,
        }
    }

    fn messages(conversation: &Conversation) -> Result<Vec<ChatMessage>, RequestBuildError> {
        match conversation.snapshot_for_request() {
            HistorySnapshot::Flat(messages) => Ok(messages),
            HistorySnapshot::Nested(_) => Err(RequestBuildError::ShapeMismatch {
                expected: HistoryShape::Flat,
                found: HistoryShape::Nested,
            }),
        }
    }
}

impl ProviderAdapter for ChatCompletionsAdapter {
    fn config(&self) -> &ProviderConfig {
        &self.session.config
    }

    fn history_shape(&self) -> HistoryShape {
        HistoryShape::Flat
    }

    fn seed_conversation(&self) -> Conversation {
        Conversation::with_seed(
            HistoryShape::Flat,
            [Turn::new(Role::System, self.system_prompt.clone())],
        )
    }

    fn build_request(
        &self,
        conversation: &Conversation,
    ) -> Result<PreparedRequest, RequestBuildError> {
        let request = ChatRequest {
            model: self.session.model.clone(),
            messages: Self::messages(conversation)?,
            stream: true,
            temperature: self.temperature,
        };
        let (headers, query) = auth_parts(&self.session.config, &self.session.api_key);
        Ok(PreparedRequest {
            url: self.session.config.endpoint_for(&self.session.model),
            headers,
            query,
            body: serde_json::to_value(&request)?,
            timeout: self.session.config.timeout(),
        })
    }

    fn frame_format(&self) -> FrameFormat {
        FrameFormat::CHAT_COMPLETIONS
    }

    fn rejection_policy(&self) -> RejectionPolicy {
        RejectionPolicy::ContinueSession
    }
}

pub struct GeminiAdapter {
    session: ProviderSession,
    temperature: f32,
    max_output_tokens: u32,
    safety_threshold: String,
    system_prompt: String,
}

impl GeminiAdapter {
    pub fn new(session: ProviderSession, settings: &RequestSettings) -> Self {
        let system_prompt = system_prompt(&session.config, settings).to_string();
        Self {
            session,
            temperature: settings.temperature,
            max_output_tokens: settings.max_output_tokens,
            safety_threshold: settings.safety_threshold.clone(),
            system_prompt,
        }
    }

    fn contents(conversation: &Conversation) -> Result<Vec<GeminiContent>, RequestBuildError> {
        match conversation.snapshot_for_request() {
            HistorySnapshot::Nested(contents) => Ok(contents),
            HistorySnapshot::Flat(_) => Err(RequestBuildError::ShapeMismatch {
                expected: HistoryShape::Nested,
                found: HistoryShape::Flat,
            }),
        }
    }

    fn safety_settings(&self) -> Vec<SafetySetting> {
        GEMINI_HARM_CATEGORIES
            .iter()
            .map(|category| SafetySetting {
                category: (*category).to_string(),
                threshold: self.safety_threshold.clone(),
            })
            .collect()
    }
}

impl ProviderAdapter for GeminiAdapter {
    fn config(&self) -> &ProviderConfig {
        &self.session.config
    }

    fn history_shape(&self) -> HistoryShape {
        HistoryShape::Nested
    }

    fn seed_conversation(&self) -> Conversation {
        let mut seed = vec![Turn::new(Role::User, self.system_prompt.clone())];
        if let Some(greeting) = &self.session.config.greeting {
            seed.push(Turn::new(Role::Model, greeting.clone()));
        }
        Conversation::with_seed(HistoryShape::Nested, seed)
    }

    fn build_request(
        &self,
        conversation: &Conversation,
    ) -> Result<PreparedRequest, RequestBuildError> {
        let request = GenerateContentRequest {
            contents: Self::contents(conversation)?,
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
            },
            safety_settings: self.safety_settings(),
        };
        let (headers, mut query) = auth_parts(&self.session.config, &self.session.api_key);
        query.push(("alt".to_string(), "sse".to_string()));
        Ok(PreparedRequest {
            url: self.session.config.endpoint_for(&self.session.model),
            headers,
            query,
            body: serde_json::to_value(&request)?,
            timeout: self.session.config.timeout(),
        })
    }

    fn frame_format(&self) -> FrameFormat {
        FrameFormat::GEMINI
    }

    fn rejection_policy(&self) -> RejectionPolicy {
        RejectionPolicy::CloseSession
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::builtin_providers::find_builtin_provider;
    use serde_json::json;

    fn session(id: &str, model: &str) -> ProviderSession {
        ProviderSession {
            config: find_builtin_provider(id).unwrap(),
            api_key: "test-key".to_string(),
            model: model.to_string(),
        }
    }

    #[test]
    fn openai_request_carries_bearer_stream_and_history() {
        let adapter = build_adapter(session("openai", "gpt-4o"), &RequestSettings::default());
        let mut conversation = adapter.seed_conversation();
        adapter.append_user_turn(&mut conversation, "hi");

        let request = adapter.build_request(&conversation).unwrap();
        assert_eq!(request.url, "https://api.openai.com/v1/chat/completions");
        assert_eq!(request.header("Authorization"), Some("Bearer test-key"));
        assert!(request.query.is_empty());
        assert_eq!(request.body["model"], "gpt-4o");
        assert_eq!(request.body["stream"], true);
        assert!(request.body["temperature"].is_number());
        assert_eq!(
            request.body["messages"],
            json!([
                {"role": "system", "content": "تو یک دستیار فارسی بسیار هوشمند و دقیق هستی."},
                {"role": "user", "content": "hi"}
            ])
        );
        assert_eq!(request.timeout.as_secs(), 120);
    }

    #[test]
    fn groq_uses_the_same_adapter_with_its_own_config() {
        let adapter = build_adapter(
            session("groq", "gemma2-9b-it"),
            &RequestSettings::default(),
        );
        assert_eq!(adapter.history_shape(), HistoryShape::Flat);
        assert_eq!(adapter.frame_format(), FrameFormat::CHAT_COMPLETIONS);
        assert_eq!(adapter.rejection_policy(), RejectionPolicy::ContinueSession);

        let conversation = adapter.seed_conversation();
        let request = adapter.build_request(&conversation).unwrap();
        assert_eq!(request.url, "https://api.groq.com/openai/v1/chat/completions");
        assert_eq!(request.timeout.as_secs(), 90);
    }

    #[test]
    fn gemini_request_uses_query_key_and_nested_history() {
        let settings = RequestSettings {
            temperature: 0.5,
            max_output_tokens: 1024,
            ..RequestSettings::default()
        };
        let adapter = build_adapter(session("gemini", "gemini-1.5-pro"), &settings);
        let mut conversation = adapter.seed_conversation();
        adapter.append_user_turn(&mut conversation, "salam");

        let request = adapter.build_request(&conversation).unwrap();
        assert_eq!(
            request.url,
            "https://generativelanguage.googleapis.com/v1/models/gemini-1.5-pro:streamGenerateContent"
        );
        assert_eq!(request.header("Authorization"), None);
        assert_eq!(request.query_param("key"), Some("test-key"));
        assert_eq!(request.query_param("alt"), Some("sse"));
        assert_eq!(
            request.body["generationConfig"],
            json!({"temperature": 0.5, "maxOutputTokens": 1024})
        );

        let contents = request.body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[1]["parts"][0]["text"], "سلام! چطور می‌توانم کمک کنم؟");
        assert_eq!(contents[2], json!({"role": "user", "parts": [{"text": "salam"}]}));

        let safety = request.body["safetySettings"].as_array().unwrap();
        assert_eq!(safety.len(), 4);
        assert!(safety.iter().all(|s| s["threshold"] == "BLOCK_NONE"));
    }

    #[test]
    fn gemini_closes_on_rejection_and_has_no_sentinel() {
        let adapter = build_adapter(
            session("gemini", "gemini-1.5-flash"),
            &RequestSettings::default(),
        );
        assert_eq!(adapter.rejection_policy(), RejectionPolicy::CloseSession);
        assert_eq!(adapter.frame_format().sentinel, None);
    }

    #[test]
    fn safety_threshold_is_configurable() {
        let settings = RequestSettings {
            safety_threshold: "BLOCK_MEDIUM_AND_ABOVE".to_string(),
            ..RequestSettings::default()
        };
        let adapter = build_adapter(session("gemini", "gemini-1.5-flash"), &settings);
        let request = adapter.build_request(&adapter.seed_conversation()).unwrap();
        let safety = request.body["safetySettings"].as_array().unwrap();
        assert!(safety
            .iter()
            .all(|s| s["threshold"] == "BLOCK_MEDIUM_AND_ABOVE"));
    }

    #[test]
    fn system_prompt_override_replaces_seed() {
        let settings = RequestSettings {
            system_prompt: Some("Answer in French.".to_string()),
            ..RequestSettings::default()
        };
        let adapter = build_adapter(session("openai", "gpt-4o"), &settings);
        let conversation = adapter.seed_conversation();
        assert_eq!(conversation.turns()[0].content(), "Answer in French.");
        assert_eq!(conversation.turns()[0].role(), Role::System);
    }

    #[test]
    fn assistant_turns_follow_provider_shape() {
        let gemini = build_adapter(
            session("gemini", "gemini-1.5-flash"),
            &RequestSettings::default(),
        );
        let mut conversation = gemini.seed_conversation();
        gemini.append_assistant_turn(&mut conversation, "reply");
        assert_eq!(conversation.last().map(Turn::role), Some(Role::Model));
    }

    #[test]
    fn conversation_of_the_other_shape_is_refused() {
        let openai = build_adapter(session("openai", "gpt-4o"), &RequestSettings::default());
        let gemini = build_adapter(
            session("gemini", "gemini-1.5-flash"),
            &RequestSettings::default(),
        );

        let err = openai.build_request(&gemini.seed_conversation()).unwrap_err();
        assert!(matches!(
            err,
            RequestBuildError::ShapeMismatch {
                expected: HistoryShape::Flat,
                found: HistoryShape::Nested,
            }
        ));

        let err = gemini.build_request(&openai.seed_conversation()).unwrap_err();
        assert!(matches!(
            err,
            RequestBuildError::ShapeMismatch {
                expected: HistoryShape::Nested,
                found: HistoryShape::Flat,
            }
        ));
    }
}
