use std::collections::HashMap;
use std::path::PathBuf;

use crate::core::adapters::RequestSettings;
use crate::core::config::Config;

pub const DEFAULT_LOG_DIR: &str = "logs";
pub const DEFAULT_SQLITE_FILE: &str = "chat.db";

/// Values supplied on the command line. Flags can only switch features on.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub log_dir: Option<PathBuf>,
    pub use_sqlite: bool,
    pub insecure_tls: bool,
}

/// Effective runtime settings after layering CLI flags, environment,
/// config file and defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub log_dir: PathBuf,
    pub use_sqlite: bool,
    pub sqlite_path: PathBuf,
    pub insecure_tls: bool,
    pub request: RequestSettings,
    system_prompts: HashMap<String, String>,
}

impl Settings {
    pub fn resolve<F>(config: &Config, overrides: &CliOverrides, env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let log_dir = overrides
            .log_dir
            .clone()
            .or_else(|| config.log_dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR));

        // A set USE_SQLITE decides on its own; only "1" enables.
        let env_sqlite = env("USE_SQLITE")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(|value| value == "1");
        let use_sqlite = overrides.use_sqlite || env_sqlite.or(config.use_sqlite).unwrap_or(false);

        let sqlite_path = config
            .sqlite_path
            .clone()
            .unwrap_or_else(|| log_dir.join(DEFAULT_SQLITE_FILE));

        let defaults = RequestSettings::default();
        let request = RequestSettings {
            temperature: config.temperature.unwrap_or(defaults.temperature),
            max_output_tokens: config
                .max_output_tokens
                .unwrap_or(defaults.max_output_tokens),
            safety_threshold: config
                .gemini_safety_threshold
                .clone()
                .unwrap_or(defaults.safety_threshold),
            system_prompt: None,
        };

        let system_prompts = config
            .system_prompts
            .iter()
            .map(|(provider, prompt)| (provider.to_lowercase(), prompt.clone()))
            .collect();

        Settings {
            log_dir,
            use_sqlite,
            sqlite_path,
            insecure_tls: overrides.insecure_tls || config.insecure_tls.unwrap_or(false),
            request,
            system_prompts,
        }
    }

    pub fn from_env(config: &Config, overrides: &CliOverrides) -> Self {
        Self::resolve(config, overrides, |name| std::env::var(name).ok())
    }

    /// Generation settings for one provider, with its prompt override applied.
    pub fn request_settings_for(&self, provider_id: &str) -> RequestSettings {
        RequestSettings {
            system_prompt: self
                .system_prompts
                .get(&provider_id.to_lowercase())
                .cloned(),
            ..self.request.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn defaults_apply_without_config() {
        let settings = Settings::resolve(&Config::default(), &CliOverrides::default(), no_env);
        assert_eq!(settings.log_dir, PathBuf::from("logs"));
        assert_eq!(settings.sqlite_path, PathBuf::from("logs").join("chat.db"));
        assert!(!settings.use_sqlite);
        assert!(!settings.insecure_tls);
        assert_eq!(settings.request, RequestSettings::default());
    }

    #[test]
    fn cli_beats_config_for_log_dir() {
        let config = Config {
            log_dir: Some(PathBuf::from("from-config")),
            ..Default::default()
        };
        let overrides = CliOverrides {
            log_dir: Some(PathBuf::from("from-cli")),
            ..Default::default()
        };

        let settings = Settings::resolve(&config, &overrides, no_env);
        assert_eq!(settings.log_dir, PathBuf::from("from-cli"));
        assert_eq!(settings.sqlite_path, PathBuf::from("from-cli").join("chat.db"));
    }

    #[test]
    fn sqlite_enabled_by_env_flag_only_when_one() {
        let config = Config::default();
        let overrides = CliOverrides::default();

        let on = Settings::resolve(&config, &overrides, |name| {
            (name == "USE_SQLITE").then(|| "1".to_string())
        });
        assert!(on.use_sqlite);

        let off = Settings::resolve(&config, &overrides, |name| {
            (name == "USE_SQLITE").then(|| "yes".to_string())
        });
        assert!(!off.use_sqlite);
    }

    #[test]
    fn env_flag_overrides_config_file() {
        let config = Config {
            use_sqlite: Some(true),
            ..Default::default()
        };
        let overrides = CliOverrides::default();

        let disabled = Settings::resolve(&config, &overrides, |name| {
            (name == "USE_SQLITE").then(|| "0".to_string())
        });
        assert!(!disabled.use_sqlite);

        let unset = Settings::resolve(&config, &overrides, no_env);
        assert!(unset.use_sqlite);

        let blank = Settings::resolve(&config, &overrides, |name| {
            (name == "USE_SQLITE").then(String::new)
        });
        assert!(blank.use_sqlite);

        let forced = CliOverrides {
            use_sqlite: true,
            ..Default::default()
        };
        let cli = Settings::resolve(&config, &forced, |name| {
            (name == "USE_SQLITE").then(|| "0".to_string())
        });
        assert!(cli.use_sqlite);
    }

    #[test]
    fn config_values_fill_request_settings() {
        let mut config = Config {
            temperature: Some(0.1),
            max_output_tokens: Some(512),
            gemini_safety_threshold: Some("BLOCK_LOW_AND_ABOVE".to_string()),
            sqlite_path: Some(PathBuf::from("/data/chat.db")),
            insecure_tls: Some(true),
            ..Default::default()
        };
        config
            .system_prompts
            .insert("Groq".to_string(), "Be quick.".to_string());

        let settings = Settings::resolve(&config, &CliOverrides::default(), no_env);
        assert_eq!(settings.sqlite_path, PathBuf::from("/data/chat.db"));
        assert!(settings.insecure_tls);

        let groq = settings.request_settings_for("groq");
        assert_eq!(groq.temperature, 0.1);
        assert_eq!(groq.max_output_tokens, 512);
        assert_eq!(groq.safety_threshold, "BLOCK_LOW_AND_ABOVE");
        assert_eq!(groq.system_prompt.as_deref(), Some("Be quick."));
        assert_eq!(settings.request_settings_for("openai").system_prompt, None);
    }
}
