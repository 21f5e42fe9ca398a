//! Error types for the Chronicle domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum.

use crate::history::{ChunkId, Ordinal};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The top-level error type for all Chronicle operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Collaborator errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Memory engine errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures of the external Tokenizer / Summarizer capabilities.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider returned an empty response: {0}")]
    EmptyResponse(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Failures surfaced by the memory engine to its caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    /// The Tokenizer could not produce a count; the mutation was rejected.
    #[error("Tokenizer unavailable: {0}")]
    TokenizationUnavailable(String),

    /// The target ordinal has already been folded into a tokenized chunk.
    #[error("History entry {ordinal} is already archived")]
    AlreadyArchived { ordinal: Ordinal },

    #[error("History entry {0} not found")]
    EntryNotFound(Ordinal),

    #[error("Tokenized chunk {0} not found")]
    ChunkNotFound(ChunkId),

    /// Undo was requested on a session with no history at all.
    #[error("No history entries to undo")]
    Empty,

    /// A structural invariant would be violated. Indicates a defect.
    #[error("Ordinal conflict: {0}")]
    OrdinalConflict(String),

    #[error("Session {0} is closed")]
    SessionClosed(String),

    #[error("Session {0} not found")]
    SessionNotFound(String),

    #[error("Session {0} already exists")]
    SessionExists(String),
}

impl MemoryError {
    /// Whether this error is one of the `NotFound` family.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::EntryNotFound(_) | Self::ChunkNotFound(_) | Self::SessionNotFound(_)
        )
    }
}

/// Which tier transition was postponed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionStage {
    /// Recent History → Tokenized Chunk.
    Promotion,
    /// Tokenized Chunk → Deep Memory.
    Merge,
}

impl std::fmt::Display for CompressionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Promotion => write!(f, "promotion"),
            Self::Merge => write!(f, "merge"),
        }
    }
}

/// A compression that could not complete this turn.
///
/// Not a failure of the mutation: it is reported alongside a successful
/// outcome and retried on the next qualifying mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{stage} deferred: {reason}")]
pub struct CompressionDeferred {
    pub stage: CompressionStage,
    pub reason: String,
}
