//! Built-in provider configuration
//!
//! Static per-provider facts (endpoints, auth shape, model catalogs, prompts)
//! are loaded from the `builtin_providers.toml` file embedded at build time.

use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthScheme {
    /// `Authorization: Bearer <key>`
    Bearer,
    /// `?key=<key>` on the request URL.
    QueryKey,
}

/// Request/response family spoken by a provider. Selects the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireFormat {
    ChatCompletions,
    Gemini,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub display_name: String,
    pub assistant_label: String,
    /// Endpoint URL; `{model}` is replaced with the selected model id.
    pub endpoint: String,
    pub auth: AuthScheme,
    pub wire: WireFormat,
    /// Environment variables holding the key, in lookup order.
    pub env_keys: Vec<String>,
    pub models: Vec<String>,
    #[serde(default)]
    pub default_model: usize,
    pub timeout_secs: u64,
    pub system_prompt: String,
    #[serde(default)]
    pub greeting: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BuiltinProvidersConfig {
    providers: Vec<ProviderConfig>,
}

impl ProviderConfig {
    pub fn endpoint_for(&self, model: &str) -> String {
        self.endpoint.replace("{model}", model)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn default_model_id(&self) -> Option<&str> {
        self.models
            .get(self.default_model)
            .or_else(|| self.models.first())
            .map(String::as_str)
    }

    /// Resolve a 1-based catalog index typed by the user. Anything that is
    /// not a valid index, including empty input, selects the default model.
    pub fn select_model(&self, input: &str) -> Option<&str> {
        input
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|choice| choice.checked_sub(1))
            .and_then(|index| self.models.get(index))
            .map(String::as_str)
            .or_else(|| self.default_model_id())
    }
}

/// Load built-in providers from the embedded configuration
pub fn load_builtin_providers() -> Vec<ProviderConfig> {
    const CONFIG_CONTENT: &str = include_str!("../builtin_providers.toml");

    let config: BuiltinProvidersConfig =
        toml::from_str(CONFIG_CONTENT).expect("Failed to parse builtin_providers.toml");

    config.providers
}

/// Find a built-in provider by ID (case-insensitive)
#[cfg(test)]
pub fn find_builtin_provider(id: &str) -> Option<ProviderConfig> {
    load_builtin_providers()
        .into_iter()
        .find(|p| p.id.eq_ignore_ascii_case(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_builtin_providers() {
        let providers = load_builtin_providers();
        let provider_ids: Vec<&str> = providers.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(provider_ids, ["openai", "groq", "gemini"]);
    }

    #[test]
    fn test_find_builtin_provider() {
        let provider = find_builtin_provider("Groq").expect("groq");
        assert_eq!(provider.id, "groq");
        assert_eq!(provider.env_keys, ["GROQ_API_KEY", "XAI_API_KEY"]);
        assert!(find_builtin_provider("nonexistent").is_none());
    }

    #[test]
    fn test_wire_and_auth_modes() {
        let openai = find_builtin_provider("openai").unwrap();
        let groq = find_builtin_provider("groq").unwrap();
        let gemini = find_builtin_provider("gemini").unwrap();

        assert_eq!(openai.wire, WireFormat::ChatCompletions);
        assert_eq!(groq.wire, WireFormat::ChatCompletions);
        assert_eq!(gemini.wire, WireFormat::Gemini);
        assert_eq!(openai.auth, AuthScheme::Bearer);
        assert_eq!(gemini.auth, AuthScheme::QueryKey);
        assert!(gemini.greeting.is_some());
        assert!(openai.greeting.is_none());
    }

    #[test]
    fn test_provider_properties() {
        for provider in load_builtin_providers() {
            assert!(!provider.display_name.is_empty());
            assert!(provider.endpoint.starts_with("https://"));
            assert!(!provider.env_keys.is_empty());
            assert!(provider.default_model < provider.models.len());
            assert!(provider.timeout_secs > 0);
        }
    }

    #[test]
    fn endpoint_template_substitutes_model() {
        let gemini = find_builtin_provider("gemini").unwrap();
        assert_eq!(
            gemini.endpoint_for("gemini-1.5-pro"),
            "https://generativelanguage.googleapis.com/v1/models/gemini-1.5-pro:streamGenerateContent"
        );
        let openai = find_builtin_provider("openai").unwrap();
        assert_eq!(openai.endpoint_for("gpt-4o"), openai.endpoint);
    }

    #[test]
    fn select_model_uses_one_based_indices() {
        let openai = find_builtin_provider("openai").unwrap();
        assert_eq!(openai.select_model("1"), Some("gpt-4o-mini"));
        assert_eq!(openai.select_model(" 2 "), Some("gpt-4o"));
        assert_eq!(openai.select_model("5"), Some("gpt-4-turbo"));
    }

    #[test]
    fn select_model_falls_back_to_first_entry() {
        let groq = find_builtin_provider("groq").unwrap();
        for input in ["", "0", "99", "-1", "abc", "1.5"] {
            assert_eq!(
                groq.select_model(input),
                Some("llama-3.3-70b-versatile"),
                "input {input:?}"
            );
        }
    }

    #[test]
    fn select_model_with_empty_catalog_is_none() {
        let mut openai = find_builtin_provider("openai").unwrap();
        openai.models.clear();
        assert_eq!(openai.select_model("1"), None);
    }
}
