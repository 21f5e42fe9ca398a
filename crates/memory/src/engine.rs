//! Process-wide collaborators and thresholds, shared by every session.

use crate::assembler::ContextAssembler;
use crate::ledger::TokenLedger;
use crate::manager::TierManager;
use crate::session::MemorySession;
use crate::tiers::MemorySnapshot;
use chronicle_config::MemoryConfig;
use chronicle_core::{Error, MemoryError, SessionId, Summarizer, SummaryRequest, Tokenizer};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Created once at startup and shared by `Arc` across sessions.
pub struct MemoryEngine {
    config: MemoryConfig,
    ledger: TokenLedger,
    summarizer: Arc<dyn Summarizer>,
    summarizer_timeout: Duration,
    manager: TierManager,
    assembler: ContextAssembler,
}

impl MemoryEngine {
    /// Validates `config` before wiring anything up.
    pub fn new(
        config: MemoryConfig,
        tokenizer: Arc<dyn Tokenizer>,
        summarizer: Arc<dyn Summarizer>,
    ) -> Result<Self, Error> {
        config.validate().map_err(|e| Error::Config {
            message: e.to_string(),
        })?;

        info!(
            tokenizer = %tokenizer.name(),
            summarizer = %summarizer.name(),
            threshold = config.recent_history_threshold,
            chunk_target = config.chunk_target_size,
            max_live_chunks = config.max_live_chunks,
            "Memory engine ready"
        );

        Ok(Self {
            ledger: TokenLedger::new(tokenizer, config.tokenizer_timeout()),
            summarizer,
            summarizer_timeout: config.summarizer_timeout(),
            manager: TierManager::new(&config),
            assembler: ContextAssembler::new(config.context_max_chunks),
            config,
        })
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    pub fn ledger(&self) -> &TokenLedger {
        &self.ledger
    }

    pub fn manager(&self) -> &TierManager {
        &self.manager
    }

    pub fn assembler(&self) -> &ContextAssembler {
        &self.assembler
    }

    /// Start an empty session.
    pub fn open_session(self: &Arc<Self>, id: SessionId) -> MemorySession {
        MemorySession::new(id, Arc::clone(self))
    }

    /// Rehydrate a session from persisted state.
    pub fn restore_session(
        self: &Arc<Self>,
        id: SessionId,
        snapshot: MemorySnapshot,
    ) -> Result<MemorySession, MemoryError> {
        MemorySession::restore(id, snapshot, Arc::clone(self))
    }

    /// Summarize and count the result. Any failure, timeout or empty
    /// summary comes back as a reason string for a deferral notice.
    pub(crate) async fn condense(&self, request: SummaryRequest) -> Result<(String, usize), String> {
        let kind = request.kind;
        let summary =
            match tokio::time::timeout(self.summarizer_timeout, self.summarizer.summarize(request))
                .await
            {
                Ok(Ok(summary)) => summary,
                Ok(Err(e)) => {
                    warn!(summarizer = %self.summarizer.name(), ?kind, error = %e, "Summarizer failed");
                    return Err(e.to_string());
                }
                Err(_) => {
                    warn!(
                        summarizer = %self.summarizer.name(),
                        ?kind,
                        timeout_secs = self.summarizer_timeout.as_secs(),
                        "Summarizer timed out"
                    );
                    return Err(format!(
                        "summarizer '{}' timed out after {}s",
                        self.summarizer.name(),
                        self.summarizer_timeout.as_secs()
                    ));
                }
            };

        let summary = summary.trim().to_string();
        if summary.is_empty() {
            warn!(summarizer = %self.summarizer.name(), ?kind, "Summarizer returned nothing");
            return Err("summarizer returned an empty summary".into());
        }

        let tokens = self.ledger.count(&summary).await.map_err(|e| e.to_string())?;
        Ok((summary, tokens))
    }
}

impl std::fmt::Debug for MemoryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryEngine")
            .field("config", &self.config)
            .field("ledger", &self.ledger)
            .field("summarizer", &self.summarizer.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FailingSummarizer, ScriptedSummarizer, SlowSummarizer, WordTokenizer};

    fn engine(summarizer: Arc<dyn Summarizer>) -> MemoryEngine {
        MemoryEngine::new(MemoryConfig::default(), Arc::new(WordTokenizer::new()), summarizer)
            .unwrap()
    }

    #[test]
    fn invalid_config_rejected() {
        let config = MemoryConfig {
            chunk_target_size: 0,
            ..MemoryConfig::default()
        };
        let err = MemoryEngine::new(
            config,
            Arc::new(WordTokenizer::new()),
            Arc::new(ScriptedSummarizer::new(2)),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[tokio::test]
    async fn condense_counts_summary() {
        let engine = engine(Arc::new(ScriptedSummarizer::new(4)));
        let (summary, tokens) = engine
            .condense(SummaryRequest::chunk("a b c d e f", 4))
            .await
            .unwrap();
        assert_eq!(tokens, 4);
        assert!(summary.starts_with("s1"));
    }

    #[tokio::test]
    async fn empty_summary_is_failure() {
        let engine = engine(Arc::new(FailingSummarizer::empty()));
        let reason = engine
            .condense(SummaryRequest::chunk("text", 4))
            .await
            .unwrap_err();
        assert!(reason.contains("empty"));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_summarizer_times_out() {
        let engine = engine(Arc::new(SlowSummarizer {
            delay: Duration::from_secs(600),
        }));
        let reason = engine
            .condense(SummaryRequest::deep("text", 4))
            .await
            .unwrap_err();
        assert!(reason.contains("timed out"));
    }
}
