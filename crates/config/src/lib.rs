//! Configuration loading, validation, and management for Chronicle.
//!
//! Loads configuration from `~/.chronicle/config.toml` with environment
//! variable overrides. Validates all settings at startup. The memory engine
//! never hard-codes its thresholds; everything it tunes on comes from
//! [`MemoryConfig`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.chronicle/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Tier thresholds and collaborator timeouts
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Which Tokenizer / Summarizer backends to build
    #[serde(default)]
    pub providers: ProvidersConfig,
}

/// Tuning for the three-tier memory engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Recent History is promoted once its token sum exceeds this.
    #[serde(default = "default_recent_history_threshold")]
    pub recent_history_threshold: usize,

    /// Target size of one promotion block and budget for its summary.
    #[serde(default = "default_chunk_target_size")]
    pub chunk_target_size: usize,

    /// Merge into deep memory once more chunks than this are live.
    #[serde(default = "default_max_live_chunks")]
    pub max_live_chunks: usize,

    /// Optional ceiling on the combined token count of live chunks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_live_chunk_tokens: Option<usize>,

    /// Budget for the deep memory summary, independent of how much is merged.
    #[serde(default = "default_deep_memory_max_tokens")]
    pub deep_memory_max_tokens: usize,

    /// Most chunks the context assembler will emit.
    #[serde(default = "default_context_max_chunks")]
    pub context_max_chunks: usize,

    /// Joins entry texts, both for summarization input and rendering.
    #[serde(default = "default_entry_separator")]
    pub entry_separator: String,

    #[serde(default = "default_tokenizer_timeout_secs")]
    pub tokenizer_timeout_secs: u64,

    #[serde(default = "default_summarizer_timeout_secs")]
    pub summarizer_timeout_secs: u64,
}

fn default_recent_history_threshold() -> usize {
    800
}
fn default_chunk_target_size() -> usize {
    200
}
fn default_max_live_chunks() -> usize {
    5
}
fn default_deep_memory_max_tokens() -> usize {
    300
}
fn default_context_max_chunks() -> usize {
    5
}
fn default_entry_separator() -> String {
    "\n\n".into()
}
fn default_tokenizer_timeout_secs() -> u64 {
    10
}
fn default_summarizer_timeout_secs() -> u64 {
    120
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            recent_history_threshold: default_recent_history_threshold(),
            chunk_target_size: default_chunk_target_size(),
            max_live_chunks: default_max_live_chunks(),
            max_live_chunk_tokens: None,
            deep_memory_max_tokens: default_deep_memory_max_tokens(),
            context_max_chunks: default_context_max_chunks(),
            entry_separator: default_entry_separator(),
            tokenizer_timeout_secs: default_tokenizer_timeout_secs(),
            summarizer_timeout_secs: default_summarizer_timeout_secs(),
        }
    }
}

impl MemoryConfig {
    pub fn tokenizer_timeout(&self) -> Duration {
        Duration::from_secs(self.tokenizer_timeout_secs)
    }

    pub fn summarizer_timeout(&self) -> Duration {
        Duration::from_secs(self.summarizer_timeout_secs)
    }

    /// Validate thresholds. Called by [`AppConfig::validate`] and by the
    /// engine when it is built from a hand-made config.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("recent_history_threshold", self.recent_history_threshold),
            ("chunk_target_size", self.chunk_target_size),
            ("max_live_chunks", self.max_live_chunks),
            ("deep_memory_max_tokens", self.deep_memory_max_tokens),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "memory.{name} must be > 0"
                )));
            }
        }

        if self.chunk_target_size > self.recent_history_threshold {
            return Err(ConfigError::ValidationError(
                "memory.chunk_target_size must not exceed memory.recent_history_threshold".into(),
            ));
        }

        if self.max_live_chunk_tokens == Some(0) {
            return Err(ConfigError::ValidationError(
                "memory.max_live_chunk_tokens must be > 0 when set".into(),
            ));
        }

        if self.tokenizer_timeout_secs == 0 || self.summarizer_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "collaborator timeouts must be > 0 seconds".into(),
            ));
        }

        Ok(())
    }
}

/// Tokenizer backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenizerKind {
    /// ~4 characters per token estimate
    #[default]
    Heuristic,
    /// The narrative AI server's batch token counter
    AiServer,
    /// A local `tokenizer.json` (requires the `local` feature)
    Local,
}

/// Summarizer backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummarizerKind {
    /// The narrative AI server's summarize endpoints
    #[default]
    AiServer,
    /// Any OpenAI-compatible chat completions endpoint
    OpenaiCompat,
    /// Offline, keeps the leading words within budget
    Extractive,
}

impl std::str::FromStr for SummarizerKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "ai_server" => Ok(Self::AiServer),
            "openai_compat" => Ok(Self::OpenaiCompat),
            "extractive" => Ok(Self::Extractive),
            other => Err(ConfigError::ValidationError(format!(
                "unknown summarizer '{other}'"
            ))),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub tokenizer: TokenizerKind,

    #[serde(default)]
    pub summarizer: SummarizerKind,

    /// Base URL of the narrative AI server
    #[serde(default = "default_ai_server_url")]
    pub ai_server_url: String,

    /// Bearer token for the AI server or chat endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// OpenAI-compatible base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model used by the OpenAI-compatible summarizer
    #[serde(default = "default_model")]
    pub model: String,

    /// Path to a `tokenizer.json` for the local tokenizer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokenizer_path: Option<PathBuf>,
}

fn default_ai_server_url() -> String {
    "http://127.0.0.1:8000".into()
}
fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_model() -> String {
    "meta-llama/llama-3.1-8b-instruct".into()
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            tokenizer: TokenizerKind::default(),
            summarizer: SummarizerKind::default(),
            ai_server_url: default_ai_server_url(),
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
            tokenizer_path: None,
        }
    }
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for ProvidersConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvidersConfig")
            .field("tokenizer", &self.tokenizer)
            .field("summarizer", &self.summarizer)
            .field("ai_server_url", &self.ai_server_url)
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("tokenizer_path", &self.tokenizer_path)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the default location, then apply environment
    /// overrides:
    /// - `CHRONICLE_API_KEY`
    /// - `CHRONICLE_AI_SERVER_URL`
    /// - `CHRONICLE_SUMMARIZER`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup (highest priority).
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("CHRONICLE_API_KEY") {
            self.providers.api_key = Some(key);
        }

        if let Some(url) = lookup("CHRONICLE_AI_SERVER_URL") {
            self.providers.ai_server_url = url;
        }

        if let Some(summarizer) = lookup("CHRONICLE_SUMMARIZER") {
            self.providers.summarizer = summarizer.parse()?;
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".chronicle")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.memory.validate()?;

        if self.providers.tokenizer == TokenizerKind::Local && self.providers.tokenizer_path.is_none()
        {
            return Err(ConfigError::ValidationError(
                "providers.tokenizer = \"local\" requires providers.tokenizer_path".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.memory.recent_history_threshold, 800);
        assert_eq!(config.memory.chunk_target_size, 200);
        assert_eq!(config.memory.entry_separator, "\n\n");
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.memory, config.memory);
        assert_eq!(parsed.providers.summarizer, config.providers.summarizer);
    }

    #[test]
    fn chunk_target_above_threshold_rejected() {
        let config = AppConfig {
            memory: MemoryConfig {
                recent_history_threshold: 100,
                chunk_target_size: 150,
                ..MemoryConfig::default()
            },
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_live_chunks_rejected() {
        let memory = MemoryConfig {
            max_live_chunks: 0,
            ..MemoryConfig::default()
        };
        let err = memory.validate().unwrap_err();
        assert!(err.to_string().contains("max_live_chunks"));
    }

    #[test]
    fn local_tokenizer_requires_path() {
        let mut config = AppConfig::default();
        config.providers.tokenizer = TokenizerKind::Local;
        assert!(config.validate().is_err());
        config.providers.tokenizer_path = Some(PathBuf::from("tokenizer.json"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.memory, MemoryConfig::default());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[memory]\nrecent_history_threshold = 100\nchunk_target_size = 50\nmax_live_chunks = 2\n\n[providers]\nsummarizer = \"extractive\""
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.memory.recent_history_threshold, 100);
        assert_eq!(config.memory.chunk_target_size, 50);
        assert_eq!(config.memory.max_live_chunks, 2);
        assert_eq!(config.memory.deep_memory_max_tokens, 300);
        assert_eq!(config.providers.summarizer, SummarizerKind::Extractive);
    }

    #[test]
    fn invalid_file_reports_validation_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[memory]\nchunk_target_size = 0").unwrap();
        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn env_overrides_take_priority() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("CHRONICLE_API_KEY", "secret"),
            ("CHRONICLE_AI_SERVER_URL", "http://gpu-box:9000"),
            ("CHRONICLE_SUMMARIZER", "openai_compat"),
        ]);
        let mut config = AppConfig::default();
        config
            .apply_env_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.providers.api_key.as_deref(), Some("secret"));
        assert_eq!(config.providers.ai_server_url, "http://gpu-box:9000");
        assert_eq!(config.providers.summarizer, SummarizerKind::OpenaiCompat);
    }

    #[test]
    fn unknown_summarizer_override_rejected() {
        let mut config = AppConfig::default();
        let result = config.apply_env_overrides(|k| {
            (k == "CHRONICLE_SUMMARIZER").then(|| "oracle".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn api_key_redacted_in_debug() {
        let mut config = AppConfig::default();
        config.providers.api_key = Some("sk-very-secret".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-very-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("recent_history_threshold = 800"));
        assert!(toml_str.contains("ai_server"));
    }
}
