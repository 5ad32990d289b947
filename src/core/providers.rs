use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

use crate::core::builtin_providers::ProviderConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProviderResolutionError {
    #[error("{} is not set.", .env_keys.join(" or "))]
    MissingCredential { env_keys: Vec<String> },
    #[error("No models are configured for {0}.")]
    NoModels(String),
    #[error("Unknown provider '{0}'.")]
    UnknownProvider(String),
}

/// API keys discovered at startup, keyed by provider id. Values are never
/// printed; callers only ask whether a key is present.
#[derive(Clone, Default)]
pub struct Credentials {
    keys: HashMap<String, String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<&str> = self.keys.keys().map(String::as_str).collect();
        ids.sort_unstable();
        f.debug_struct("Credentials").field("present", &ids).finish()
    }
}

impl Credentials {
    pub fn from_env(providers: &[ProviderConfig]) -> Self {
        Self::from_lookup(providers, |name| std::env::var(name).ok())
    }

    /// The first non-empty variable in a provider's `env_keys` wins.
    pub fn from_lookup<F>(providers: &[ProviderConfig], lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let keys = providers
            .iter()
            .filter_map(|provider| {
                provider
                    .env_keys
                    .iter()
                    .filter_map(|name| lookup(name))
                    .find(|value| !value.trim().is_empty())
                    .map(|value| (provider.id.clone(), value))
            })
            .collect();
        Self { keys }
    }

    pub fn key_for(&self, provider_id: &str) -> Option<&str> {
        self.keys.get(provider_id).map(String::as_str)
    }

    pub fn is_set(&self, provider_id: &str) -> bool {
        self.keys.contains_key(provider_id)
    }
}

/// Everything needed to open one chat session with a provider.
#[derive(Clone)]
pub struct ProviderSession {
    pub config: ProviderConfig,
    pub api_key: String,
    pub model: String,
}

impl fmt::Debug for ProviderSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSession")
            .field("provider", &self.config.id)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

/// Check the credential first so a missing key is reported before the user
/// is asked to pick a model.
pub fn require_credential<'a>(
    config: &ProviderConfig,
    credentials: &'a Credentials,
) -> Result<&'a str, ProviderResolutionError> {
    credentials
        .key_for(&config.id)
        .ok_or_else(|| ProviderResolutionError::MissingCredential {
            env_keys: config.env_keys.clone(),
        })
}

pub fn resolve_session(
    config: &ProviderConfig,
    credentials: &Credentials,
    model_choice: &str,
) -> Result<ProviderSession, ProviderResolutionError> {
    let api_key = require_credential(config, credentials)?.to_string();
    let model = config
        .select_model(model_choice)
        .ok_or_else(|| ProviderResolutionError::NoModels(config.display_name.clone()))?
        .to_string();
    Ok(ProviderSession {
        config: config.clone(),
        api_key,
        model,
    })
}

pub fn find_provider<'a>(
    providers: &'a [ProviderConfig],
    id: &str,
) -> Result<&'a ProviderConfig, ProviderResolutionError> {
    providers
        .iter()
        .find(|p| p.id.eq_ignore_ascii_case(id))
        .ok_or_else(|| ProviderResolutionError::UnknownProvider(id.to_string()))
}
