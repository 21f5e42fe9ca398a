//! Command implementations and the plumbing they share.

pub mod config_cmd;
pub mod memory;
pub mod state;

use std::path::PathBuf;
use std::sync::Arc;

use chronicle_config::AppConfig;
use chronicle_core::{Summarizer, Tokenizer};
use chronicle_memory::MemoryEngine;
use chronicle_providers::{
    ExtractiveSummarizer, HeuristicTokenizer, build_summarizer, build_tokenizer,
};
use tracing::debug;

/// Flags every command sees.
pub struct GlobalOpts {
    pub state: PathBuf,
    pub config: Option<PathBuf>,
    pub offline: bool,
}

impl GlobalOpts {
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"))
    }

    /// Load the config file (defaults if missing) with env overrides applied.
    pub fn load_config(&self) -> Result<AppConfig, Box<dyn std::error::Error>> {
        let mut config = AppConfig::load_from(&self.config_path())
            .map_err(|e| format!("Failed to load config: {e}"))?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Build the engine with the configured collaborators, or the offline
    /// pair when `--offline` is set.
    pub fn build_engine(&self) -> Result<Arc<MemoryEngine>, Box<dyn std::error::Error>> {
        let config = self.load_config()?;

        let (tokenizer, summarizer): (Arc<dyn Tokenizer>, Arc<dyn Summarizer>) = if self.offline {
            (Arc::new(HeuristicTokenizer), Arc::new(ExtractiveSummarizer))
        } else {
            (
                build_tokenizer(&config.providers)?,
                build_summarizer(&config.providers)?,
            )
        };
        debug!(
            tokenizer = tokenizer.name(),
            summarizer = summarizer.name(),
            offline = self.offline,
            "Collaborators selected"
        );

        Ok(Arc::new(MemoryEngine::new(config.memory, tokenizer, summarizer)?))
    }
}
