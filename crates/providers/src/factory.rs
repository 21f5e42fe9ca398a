//! Builds the configured Tokenizer and Summarizer backends.

use crate::ai_server::AiServerClient;
use crate::extractive::ExtractiveSummarizer;
use crate::heuristic::HeuristicTokenizer;
use crate::openai_compat::OpenAiCompatSummarizer;
use chronicle_config::{ProvidersConfig, SummarizerKind, TokenizerKind};
use chronicle_core::{ProviderError, Summarizer, Tokenizer};
use std::sync::Arc;
use tracing::debug;

/// Build the tokenizer selected by `config.tokenizer`.
pub fn build_tokenizer(config: &ProvidersConfig) -> Result<Arc<dyn Tokenizer>, ProviderError> {
    debug!(kind = ?config.tokenizer, "Building tokenizer");
    match config.tokenizer {
        TokenizerKind::Heuristic => Ok(Arc::new(HeuristicTokenizer)),
        TokenizerKind::AiServer => Ok(Arc::new(AiServerClient::new(
            config.ai_server_url.clone(),
            config.api_key.clone(),
        )?)),
        TokenizerKind::Local => build_local(config),
    }
}

#[cfg(feature = "local")]
fn build_local(config: &ProvidersConfig) -> Result<Arc<dyn Tokenizer>, ProviderError> {
    let path = config
        .tokenizer_path
        .as_deref()
        .ok_or_else(|| ProviderError::NotConfigured("tokenizer_path is not set".into()))?;
    Ok(Arc::new(crate::local::HfTokenizer::from_file(path)?))
}

#[cfg(not(feature = "local"))]
fn build_local(_config: &ProvidersConfig) -> Result<Arc<dyn Tokenizer>, ProviderError> {
    Err(ProviderError::NotConfigured(
        "local tokenizer requires the 'local' feature".into(),
    ))
}

/// Build the summarizer selected by `config.summarizer`.
pub fn build_summarizer(config: &ProvidersConfig) -> Result<Arc<dyn Summarizer>, ProviderError> {
    debug!(kind = ?config.summarizer, "Building summarizer");
    match config.summarizer {
        SummarizerKind::AiServer => Ok(Arc::new(AiServerClient::new(
            config.ai_server_url.clone(),
            config.api_key.clone(),
        )?)),
        SummarizerKind::OpenaiCompat => Ok(Arc::new(OpenAiCompatSummarizer::new(
            config.base_url.clone(),
            config.api_key.clone().unwrap_or_default(),
            config.model.clone(),
        )?)),
        SummarizerKind::Extractive => Ok(Arc::new(ExtractiveSummarizer)),
    }
}
