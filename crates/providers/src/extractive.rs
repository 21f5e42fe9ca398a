//! Offline summarizer: keeps the leading words of the text that fit the
//! budget, at roughly three words per four tokens.
//!
//! Useful for replaying logs without a model and for deterministic runs.
//! Merge separators are dropped so deep memory reads as running text.

use async_trait::async_trait;
use chronicle_core::{ProviderError, Summarizer, SummaryRequest};

const WORDS_PER_TOKEN: f64 = 0.75;

#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractiveSummarizer;

impl ExtractiveSummarizer {
    pub fn word_budget(target_tokens: usize) -> usize {
        ((target_tokens as f64 * WORDS_PER_TOKEN) as usize).max(1)
    }
}

#[async_trait]
impl Summarizer for ExtractiveSummarizer {
    fn name(&self) -> &str {
        "extractive"
    }

    async fn summarize(&self, request: SummaryRequest) -> Result<String, ProviderError> {
        let words: Vec<&str> = request
            .text
            .split_whitespace()
            .filter(|w| *w != "---")
            .take(Self::word_budget(request.target_tokens))
            .collect();
        Ok(words.join(" "))
    }
}
