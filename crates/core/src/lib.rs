//! # Chronicle Core
//!
//! Domain types, collaborator traits, and error definitions for the Chronicle
//! narrative memory engine. Every other crate depends inward on this one.
//!
//! ## Design Philosophy
//!
//! The engine consumes two external capabilities, a [`Tokenizer`] and a
//! [`Summarizer`]. Both are traits here; implementations live in
//! `chronicle-providers` (real backends) and `chronicle-memory::testing`
//! (deterministic doubles). This keeps the tier logic testable without a
//! model and lets the caller swap backends via configuration.

pub mod change;
pub mod error;
pub mod history;
pub mod provider;
pub mod session;

// Re-export key types at crate root for ergonomics
pub use change::MemoryChange;
pub use error::{
    CompressionDeferred, CompressionStage, Error, MemoryError, ProviderError, Result,
};
pub use history::{Author, ChunkId, DeepMemory, HistoryEntry, Ordinal, TokenizedChunk};
pub use provider::{SummaryKind, SummaryRequest, Summarizer, Tokenizer};
pub use session::SessionId;
