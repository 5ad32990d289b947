use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Contents of `config.toml`. Every key is optional; unset keys fall back to
/// environment variables and then built-in defaults.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    /// Directory holding the `<provider>.jsonl` transcripts
    pub log_dir: Option<PathBuf>,
    /// Also write transcripts to the shared SQLite store
    pub use_sqlite: Option<bool>,
    pub sqlite_path: Option<PathBuf>,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    /// Threshold applied to every Gemini harm category (e.g. "BLOCK_NONE")
    pub gemini_safety_threshold: Option<String>,
    /// Accept invalid TLS certificates
    pub insecure_tls: Option<bool>,
    /// System prompt overrides keyed by provider id (e.g. "openai")
    #[serde(default)]
    pub system_prompts: HashMap<String, String>,
}

/// Get a user-friendly display string for a path
/// Converts absolute paths to use ~ notation on Unix-like systems when possible
///
/// # Examples
/// - Unix: `/home/user/.config/parley/config.toml` → `~/.config/parley/config.toml`
/// - Windows: paths are shown unchanged
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}
