//! Token accounting for a session.

use crate::tiers::MemoryTiers;
use serde::{Deserialize, Serialize};

/// What the next prompt will carry versus everything ever recorded.
///
/// "Active" follows the prompt's view: the newest `context_max_chunks`
/// chunks, and the newest history entries whose cumulative count stays
/// within `recent_history_threshold`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStats {
    /// Active chunks + active history. Deep memory is reported on its own.
    pub active_tokens: u64,
    /// Every entry ever recorded, archived or still recent.
    pub total_tokens: u64,
    pub active_tokenized_chunks: usize,
    pub active_tokenized_tokens: u64,
    pub active_history_entries: usize,
    pub active_history_tokens: u64,
    /// Ordinals assigned so far, including archived entries.
    pub total_history_entries: u64,
    pub deep_memory_tokens: u64,
    pub chunks_merged: u64,
}

impl MemoryStats {
    pub fn compute(
        tiers: &MemoryTiers,
        context_max_chunks: usize,
        recent_history_threshold: usize,
    ) -> Self {
        let chunks = tiers.chunks();
        let active_chunks = chunks.len().min(context_max_chunks);
        let active_tokenized_tokens: u64 = chunks
            .iter()
            .skip(chunks.len() - active_chunks)
            .map(|c| c.token_count as u64)
            .sum();

        let mut active_history_entries = 0;
        let mut active_history_tokens = 0u64;
        for entry in tiers.recent().iter().rev() {
            let next = active_history_tokens + entry.token_count as u64;
            if next > recent_history_threshold as u64 {
                break;
            }
            active_history_tokens = next;
            active_history_entries += 1;
        }

        let (deep_memory_tokens, chunks_merged) = tiers
            .deep_memory()
            .map_or((0, 0), |d| (d.token_count as u64, d.chunks_merged));

        Self {
            active_tokens: active_tokenized_tokens + active_history_tokens,
            total_tokens: tiers.archived_tokens() + tiers.recent().total_tokens() as u64,
            active_tokenized_chunks: active_chunks,
            active_tokenized_tokens,
            active_history_entries,
            active_history_tokens,
            total_history_entries: tiers.next_ordinal(),
            deep_memory_tokens,
            chunks_merged,
        }
    }
}
