//! Token Ledger: the only path from text to a cached `token_count`.

use chronicle_core::{MemoryError, Tokenizer};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Wraps the [`Tokenizer`] with a mandatory per-call timeout.
///
/// Failures and timeouts both surface as
/// [`MemoryError::TokenizationUnavailable`]; the ledger never guesses.
pub struct TokenLedger {
    tokenizer: Arc<dyn Tokenizer>,
    timeout: Duration,
}

impl TokenLedger {
    pub fn new(tokenizer: Arc<dyn Tokenizer>, timeout: Duration) -> Self {
        Self { tokenizer, timeout }
    }

    pub fn tokenizer_name(&self) -> &str {
        self.tokenizer.name()
    }

    pub async fn count(&self, text: &str) -> Result<usize, MemoryError> {
        match tokio::time::timeout(self.timeout, self.tokenizer.count(text)).await {
            Ok(Ok(tokens)) => Ok(tokens),
            Ok(Err(e)) => {
                warn!(tokenizer = %self.tokenizer.name(), error = %e, "Token count failed");
                Err(MemoryError::TokenizationUnavailable(e.to_string()))
            }
            Err(_) => {
                warn!(
                    tokenizer = %self.tokenizer.name(),
                    timeout_secs = self.timeout.as_secs(),
                    "Token count timed out"
                );
                Err(MemoryError::TokenizationUnavailable(format!(
                    "tokenizer '{}' timed out after {}s",
                    self.tokenizer.name(),
                    self.timeout.as_secs()
                )))
            }
        }
    }
}

impl std::fmt::Debug for TokenLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenLedger")
            .field("tokenizer", &self.tokenizer.name())
            .field("timeout", &self.timeout)
            .finish()
    }
}
