//! Three-tier narrative memory for Chronicle.
//!
//! A session's transcript lives in three tiers:
//!
//! - **Recent history**: entries kept verbatim
//! - **Tokenized chunks**: summaries of contiguous archived ranges
//! - **Deep memory**: one running summary absorbing old chunks
//!
//! The [`TierManager`] promotes and merges as thresholds are crossed, the
//! [`ContextAssembler`] fits the tiers into a prompt budget, and
//! [`MemorySession`] serializes mutations per session while keeping
//! summarizer calls outside its lock.

pub mod assembler;
pub mod engine;
pub mod ledger;
pub mod manager;
pub mod registry;
pub mod session;
pub mod stats;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod tiers;

pub use assembler::{
    AssemblyMetadata, ContextAssembler, DropInfo, LayerStats, PromptContext, PromptSection,
    SectionKind,
};
pub use engine::MemoryEngine;
pub use ledger::TokenLedger;
pub use manager::{Applied, MergePlan, PromotionPlan, TierManager};
pub use registry::SessionRegistry;
pub use session::{MemorySession, MutationOutcome};
pub use stats::MemoryStats;
pub use tiers::{ChunkTier, MemorySnapshot, MemoryTiers, RecentHistory};
