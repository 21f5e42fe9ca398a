//! Deterministic collaborator doubles for exercising the engine without a
//! model. Compiled for this crate's tests and, behind the `testing`
//! feature, for downstream tests.

use async_trait::async_trait;
use chronicle_core::{ProviderError, Summarizer, SummaryRequest, Tokenizer};
use std::sync::{Mutex, PoisonError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

/// Build a text of exactly `n` tokens under [`WordTokenizer`].
///
/// The text is `tokN`, which the tokenizer reads as `N` tokens. Use
/// [`words`] when distinct, readable texts are needed.
pub fn tok(n: usize) -> String {
    format!("tok{n}")
}

/// Build `n` whitespace-separated words tagged with `label`.
pub fn words(label: &str, n: usize) -> String {
    (0..n)
        .map(|i| format!("{label}{i}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// One token per whitespace-separated word; a bare `tokN` counts as `N`.
#[derive(Debug, Default)]
pub struct WordTokenizer {
    offline: AtomicBool,
    calls: AtomicUsize,
}

impl WordTokenizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent count fail (or succeed again).
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn count_words(text: &str) -> usize {
        let trimmed = text.trim();
        if let Some(n) = trimmed.strip_prefix("tok").and_then(|n| n.parse().ok()) {
            return n;
        }
        trimmed.split_whitespace().count()
    }
}

#[async_trait]
impl Tokenizer for WordTokenizer {
    fn name(&self) -> &str {
        "words"
    }

    async fn count(&self, text: &str) -> Result<usize, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(ProviderError::Network("tokenizer offline".into()));
        }
        Ok(Self::count_words(text))
    }
}

/// A tokenizer that always fails.
#[derive(Debug, Default)]
pub struct UnavailableTokenizer;

#[async_trait]
impl Tokenizer for UnavailableTokenizer {
    fn name(&self) -> &str {
        "unavailable"
    }

    async fn count(&self, _text: &str) -> Result<usize, ProviderError> {
        Err(ProviderError::Network("connection refused".into()))
    }
}

/// Returns summaries of a fixed word count and records every request.
///
/// Each summary starts with a per-call marker (`s1`, `s2`, ...) so tests
/// can tell which call produced which chunk.
#[derive(Debug)]
pub struct ScriptedSummarizer {
    summary_words: usize,
    failing: AtomicBool,
    requests: Mutex<Vec<SummaryRequest>>,
}

impl ScriptedSummarizer {
    pub fn new(summary_words: usize) -> Self {
        Self {
            summary_words: summary_words.max(1),
            failing: AtomicBool::new(false),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn requests(&self) -> Vec<SummaryRequest> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn respond(&self, request: SummaryRequest) -> Result<String, ProviderError> {
        let call = {
            let mut requests = self.requests.lock().unwrap_or_else(PoisonError::into_inner);
            requests.push(request);
            requests.len()
        };
        if self.failing.load(Ordering::SeqCst) {
            return Err(ProviderError::ApiError {
                status_code: 503,
                message: "model overloaded".into(),
            });
        }
        let mut words = vec![format!("s{call}")];
        words.extend((1..self.summary_words).map(|i| format!("w{i}")));
        Ok(words.join(" "))
    }
}

#[async_trait]
impl Summarizer for ScriptedSummarizer {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn summarize(&self, request: SummaryRequest) -> Result<String, ProviderError> {
        self.respond(request)
    }
}

/// A summarizer that never produces a usable summary.
#[derive(Debug, Default)]
pub struct FailingSummarizer {
    /// Return `Ok("")` instead of an error.
    pub empty: bool,
    calls: AtomicUsize,
}

impl FailingSummarizer {
    pub fn error() -> Self {
        Self::default()
    }

    pub fn empty() -> Self {
        Self {
            empty: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Summarizer for FailingSummarizer {
    fn name(&self) -> &str {
        "failing"
    }

    async fn summarize(&self, _request: SummaryRequest) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.empty {
            Ok(String::new())
        } else {
            Err(ProviderError::Network("summarizer unreachable".into()))
        }
    }
}

/// Blocks each call until the test releases it, then answers like a
/// [`ScriptedSummarizer`].
///
/// `started` is notified when a call begins waiting; `release` lets one
/// waiting call proceed.
#[derive(Debug)]
pub struct GatedSummarizer {
    pub inner: ScriptedSummarizer,
    pub started: Notify,
    pub release: Notify,
}

impl GatedSummarizer {
    pub fn new(summary_words: usize) -> Self {
        Self {
            inner: ScriptedSummarizer::new(summary_words),
            started: Notify::new(),
            release: Notify::new(),
        }
    }
}

#[async_trait]
impl Summarizer for GatedSummarizer {
    fn name(&self) -> &str {
        "gated"
    }

    async fn summarize(&self, request: SummaryRequest) -> Result<String, ProviderError> {
        self.started.notify_one();
        self.release.notified().await;
        self.inner.respond(request)
    }
}

/// Sleeps before answering. Pair with a paused tokio clock to test timeouts.
#[derive(Debug)]
pub struct SlowSummarizer {
    pub delay: Duration,
}

#[async_trait]
impl Summarizer for SlowSummarizer {
    fn name(&self) -> &str {
        "slow"
    }

    async fn summarize(&self, request: SummaryRequest) -> Result<String, ProviderError> {
        tokio::time::sleep(self.delay).await;
        Ok(request.text.split_whitespace().take(2).collect::<Vec<_>>().join(" "))
    }
}
