//! Exact token counts from a Hugging Face `tokenizer.json`.
//!
//! Loads the tokenizer the narrative model was trained with, so counts agree
//! with the server's without a network round trip. Encoding is CPU-bound and
//! runs on the blocking pool.

use async_trait::async_trait;
use chronicle_core::{ProviderError, Tokenizer};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

pub struct HfTokenizer {
    inner: Arc<tokenizers::Tokenizer>,
}

impl HfTokenizer {
    pub fn from_file(path: &Path) -> Result<Self, ProviderError> {
        let inner = tokenizers::Tokenizer::from_file(path).map_err(|e| {
            ProviderError::NotConfigured(format!(
                "Failed to load tokenizer from {}: {e}",
                path.display()
            ))
        })?;
        info!(path = %path.display(), "Loaded local tokenizer");
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    fn encode_len(tokenizer: &tokenizers::Tokenizer, text: &str) -> Result<usize, ProviderError> {
        tokenizer
            .encode(text, false)
            .map(|encoding| encoding.len())
            .map_err(|e| ProviderError::ApiError {
                status_code: 0,
                message: format!("Tokenization failed: {e}"),
            })
    }
}

#[async_trait]
impl Tokenizer for HfTokenizer {
    fn name(&self) -> &str {
        "local"
    }

    async fn count(&self, text: &str) -> Result<usize, ProviderError> {
        let tokenizer = Arc::clone(&self.inner);
        let text = text.to_string();
        tokio::task::spawn_blocking(move || Self::encode_len(&tokenizer, &text))
            .await
            .map_err(|e| ProviderError::Network(format!("Tokenizer task failed: {e}")))?
    }

    async fn count_batch(&self, texts: &[String]) -> Result<Vec<usize>, ProviderError> {
        let tokenizer = Arc::clone(&self.inner);
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || {
            texts
                .iter()
                .map(|text| Self::encode_len(&tokenizer, text))
                .collect()
        })
        .await
        .map_err(|e| ProviderError::Network(format!("Tokenizer task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_not_configured() {
        let err = HfTokenizer::from_file(Path::new("/nonexistent/tokenizer.json"))
            .err()
            .unwrap();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }
}
