//! Collaborator traits: the external capabilities the engine consumes.
//!
//! A [`Tokenizer`] turns text into a token count for a fixed model; the engine
//! treats it as a pure function. A [`Summarizer`] condenses text toward a
//! token budget; it is non-deterministic and may fail or return nothing.
//!
//! Implementations: heuristic, Hugging Face `tokenizer.json`, the narrative
//! AI server, OpenAI-compatible chat endpoints, and test doubles.

use crate::error::ProviderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// What a summary will be used for. Backends pick their instructions by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryKind {
    /// Condense a block of recent history into a tokenized chunk.
    Chunk,
    /// Fold deep memory and old chunk summaries into a new deep memory.
    Deep,
}

/// A request to condense text toward a token budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRequest {
    /// The already-concatenated text to condense.
    pub text: String,

    /// Approximate maximum size of the result, in tokens.
    pub target_tokens: usize,

    /// The previous chunk's summary, given as context the summary should
    /// not repeat.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_summary: Option<String>,

    pub kind: SummaryKind,
}

impl SummaryRequest {
    pub fn chunk(text: impl Into<String>, target_tokens: usize) -> Self {
        Self {
            text: text.into(),
            target_tokens,
            previous_summary: None,
            kind: SummaryKind::Chunk,
        }
    }

    pub fn deep(text: impl Into<String>, target_tokens: usize) -> Self {
        Self {
            text: text.into(),
            target_tokens,
            previous_summary: None,
            kind: SummaryKind::Deep,
        }
    }

    pub fn with_previous_summary(mut self, previous: Option<String>) -> Self {
        self.previous_summary = previous;
        self
    }
}

/// Counts tokens for a fixed model.
#[async_trait]
pub trait Tokenizer: Send + Sync {
    /// A human-readable backend name (e.g., "heuristic", "ai_server").
    fn name(&self) -> &str;

    /// Count the tokens in `text`.
    async fn count(&self, text: &str) -> std::result::Result<usize, ProviderError>;

    /// Count several texts, preserving order.
    ///
    /// Default implementation calls `count()` once per text.
    async fn count_batch(&self, texts: &[String]) -> std::result::Result<Vec<usize>, ProviderError> {
        let mut counts = Vec::with_capacity(texts.len());
        for text in texts {
            counts.push(self.count(text).await?);
        }
        Ok(counts)
    }
}

/// Condenses text toward a token budget.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// A human-readable backend name.
    fn name(&self) -> &str;

    /// Produce a summary. An empty string is a legal (unusable) result; the
    /// engine treats it as a failure.
    async fn summarize(&self, request: SummaryRequest) -> std::result::Result<String, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CharTokenizer;

    #[async_trait]
    impl Tokenizer for CharTokenizer {
        fn name(&self) -> &str {
            "chars"
        }

        async fn count(&self, text: &str) -> Result<usize, ProviderError> {
            Ok(text.chars().count())
        }
    }

    #[tokio::test]
    async fn default_batch_preserves_order() {
        let texts = vec!["abc".to_string(), "".to_string(), "hello".to_string()];
        let counts = CharTokenizer.count_batch(&texts).await.unwrap();
        assert_eq!(counts, vec![3, 0, 5]);
    }

    #[test]
    fn request_builders_set_kind() {
        let req = SummaryRequest::chunk("text", 50)
            .with_previous_summary(Some("earlier".into()));
        assert_eq!(req.kind, SummaryKind::Chunk);
        assert_eq!(req.previous_summary.as_deref(), Some("earlier"));
        assert_eq!(SummaryRequest::deep("text", 10).kind, SummaryKind::Deep);
    }

    #[test]
    fn request_serializes_without_empty_previous() {
        let json = serde_json::to_string(&SummaryRequest::deep("x", 5)).unwrap();
        assert!(!json.contains("previous_summary"));
        assert!(json.contains("\"deep\""));
    }
}
