//! Tier Manager: decides when entries become chunks and chunks become deep
//! memory.
//!
//! Planning and applying are split so the session can release its lock
//! while the Summarizer runs. A plan records exactly what it read; applying
//! re-checks that against the current tiers and reports [`Applied::Stale`]
//! if anything moved in between.

use crate::tiers::MemoryTiers;
use chronicle_config::MemoryConfig;
use chronicle_core::{
    ChunkId, DeepMemory, MemoryChange, MemoryError, Ordinal, SummaryRequest, TokenizedChunk,
};
use chrono::Utc;
use tracing::debug;

/// Separator between summaries in a deep-memory merge request.
pub const MERGE_SEPARATOR: &str = "\n\n---\n\n";

/// Result of applying a planned compression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    /// The compression landed; changes are in application order.
    Changes(Vec<MemoryChange>),
    /// The planned range or its contents changed while summarizing.
    Stale,
}

/// A planned Recent History → Tokenized Chunk promotion.
#[derive(Debug, Clone)]
pub struct PromotionPlan {
    block: Vec<(Ordinal, String)>,
    pub request: SummaryRequest,
}

impl PromotionPlan {
    pub fn start_ordinal(&self) -> Ordinal {
        self.block.first().map_or(0, |(o, _)| *o)
    }

    pub fn end_ordinal(&self) -> Ordinal {
        self.block.last().map_or(0, |(o, _)| *o)
    }

    pub fn len(&self) -> usize {
        self.block.len()
    }

    pub fn is_empty(&self) -> bool {
        self.block.is_empty()
    }
}

/// A planned Tokenized Chunk → Deep Memory merge.
#[derive(Debug, Clone)]
pub struct MergePlan {
    chunks: Vec<(ChunkId, String)>,
    prior_deep: Option<String>,
    pub request: SummaryRequest,
}

impl MergePlan {
    pub fn chunk_ids(&self) -> Vec<ChunkId> {
        self.chunks.iter().map(|(id, _)| *id).collect()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Threshold logic over [`MemoryTiers`]. Holds no state of its own.
#[derive(Debug, Clone)]
pub struct TierManager {
    recent_history_threshold: usize,
    chunk_target_size: usize,
    max_live_chunks: usize,
    max_live_chunk_tokens: Option<usize>,
    deep_memory_max_tokens: usize,
    entry_separator: String,
}

impl TierManager {
    pub fn new(config: &MemoryConfig) -> Self {
        Self {
            recent_history_threshold: config.recent_history_threshold,
            chunk_target_size: config.chunk_target_size,
            max_live_chunks: config.max_live_chunks,
            max_live_chunk_tokens: config.max_live_chunk_tokens,
            deep_memory_max_tokens: config.deep_memory_max_tokens,
            entry_separator: config.entry_separator.clone(),
        }
    }

    /// Recent History is over threshold and holds more than the newest entry.
    pub fn needs_promotion(&self, tiers: &MemoryTiers) -> bool {
        tiers.recent().len() >= 2 && tiers.recent().total_tokens() > self.recent_history_threshold
    }

    /// Live chunks exceed the count limit or the optional token ceiling.
    pub fn needs_merge(&self, tiers: &MemoryTiers) -> bool {
        let chunks = tiers.chunks();
        if chunks.is_empty() {
            return false;
        }
        chunks.len() > self.max_live_chunks
            || self
                .max_live_chunk_tokens
                .is_some_and(|ceiling| chunks.total_tokens() > ceiling)
    }

    /// Greedy oldest-first block: accumulate until `chunk_target_size` is
    /// met, never taking the newest entry.
    pub fn plan_promotion(&self, tiers: &MemoryTiers) -> Option<PromotionPlan> {
        if !self.needs_promotion(tiers) {
            return None;
        }

        let recent = tiers.recent();
        let mut block = Vec::new();
        let mut accumulated = 0usize;
        for entry in recent.iter().take(recent.len() - 1) {
            block.push((entry.ordinal, entry.text.clone()));
            accumulated += entry.token_count;
            if accumulated >= self.chunk_target_size {
                break;
            }
        }

        let text = block
            .iter()
            .map(|(_, text)| text.as_str())
            .collect::<Vec<_>>()
            .join(&self.entry_separator);
        let previous = tiers.chunks().last().map(|c| c.summary.clone());

        debug!(
            start = block.first().map(|(o, _)| *o),
            end = block.last().map(|(o, _)| *o),
            entries = block.len(),
            tokens = accumulated,
            "Planned promotion"
        );

        Some(PromotionPlan {
            block,
            request: SummaryRequest::chunk(text, self.chunk_target_size)
                .with_previous_summary(previous),
        })
    }

    /// Fold the planned block into a new chunk at the tail.
    pub fn apply_promotion(
        &self,
        tiers: &mut MemoryTiers,
        plan: &PromotionPlan,
        summary: String,
        token_count: usize,
    ) -> Result<Applied, MemoryError> {
        let recent = tiers.recent();
        if plan.is_empty() || recent.len() <= plan.len() {
            return Ok(Applied::Stale);
        }
        let unchanged = recent
            .iter()
            .zip(&plan.block)
            .all(|(entry, (ordinal, text))| entry.ordinal == *ordinal && entry.text == *text);
        if !unchanged {
            return Ok(Applied::Stale);
        }

        let chunk = TokenizedChunk {
            id: ChunkId(tiers.next_chunk_id),
            start_ordinal: plan.start_ordinal(),
            end_ordinal: plan.end_ordinal(),
            summary,
            token_count,
            created_at: Utc::now(),
        };
        tiers.chunks.push(chunk.clone())?;
        tiers.next_chunk_id += 1;

        let archived = tiers.recent.drain_front(plan.len());
        let archived_tokens: usize = archived.iter().map(|e| e.token_count).sum();
        tiers.archived_tokens += archived_tokens as u64;

        Ok(Applied::Changes(vec![
            MemoryChange::EntriesArchived {
                start_ordinal: chunk.start_ordinal,
                end_ordinal: chunk.end_ordinal,
            },
            MemoryChange::ChunkCreated { chunk },
        ]))
    }

    /// Select the oldest `max(live - max_live_chunks, 1)` chunks and the
    /// existing deep memory as merge input.
    pub fn plan_merge(&self, tiers: &MemoryTiers) -> Option<MergePlan> {
        if !self.needs_merge(tiers) {
            return None;
        }

        let live = tiers.chunks().len();
        let excess = live.saturating_sub(self.max_live_chunks).max(1).min(live);
        let chunks: Vec<(ChunkId, String)> = tiers
            .chunks()
            .iter()
            .take(excess)
            .map(|c| (c.id, c.summary.clone()))
            .collect();
        let prior_deep = tiers.deep_memory().map(|d| d.summary.clone());

        let mut parts: Vec<&str> = Vec::with_capacity(chunks.len() + 1);
        if let Some(deep) = prior_deep.as_deref().filter(|s| !s.trim().is_empty()) {
            parts.push(deep);
        }
        parts.extend(chunks.iter().map(|(_, summary)| summary.as_str()));
        let text = parts.join(MERGE_SEPARATOR);

        debug!(
            chunks = chunks.len(),
            live,
            has_deep_memory = prior_deep.is_some(),
            "Planned merge"
        );

        Some(MergePlan {
            chunks,
            prior_deep,
            request: SummaryRequest::deep(text, self.deep_memory_max_tokens),
        })
    }

    /// Replace deep memory with the merged summary and head-trim the chunks.
    pub fn apply_merge(
        &self,
        tiers: &mut MemoryTiers,
        plan: &MergePlan,
        summary: String,
        token_count: usize,
    ) -> Result<Applied, MemoryError> {
        let chunks = tiers.chunks();
        if plan.is_empty() || chunks.len() < plan.len() {
            return Ok(Applied::Stale);
        }
        let unchanged = chunks
            .iter()
            .zip(&plan.chunks)
            .all(|(chunk, (id, text))| chunk.id == *id && chunk.summary == *text);
        let prior = tiers.deep_memory().map(|d| d.summary.clone());
        if !unchanged || prior != plan.prior_deep {
            return Ok(Applied::Stale);
        }

        let folded = tiers.chunks.drain_front(plan.len());
        let merged_through = folded.last().map(|c| c.end_ordinal);
        let folded_count = folded.len() as u64;

        let now = Utc::now();
        let deep = match tiers.deep.take() {
            Some(mut deep) => {
                deep.summary = summary;
                deep.token_count = token_count;
                deep.chunks_merged += folded_count;
                deep.merged_through = merged_through.or(deep.merged_through);
                deep.updated_at = now;
                deep
            }
            None => DeepMemory {
                summary,
                token_count,
                chunks_merged: folded_count,
                merged_through,
                updated_at: now,
            },
        };
        tiers.deep = Some(deep.clone());

        let mut changes: Vec<MemoryChange> = folded
            .iter()
            .map(|c| MemoryChange::ChunkRemoved { id: c.id })
            .collect();
        changes.push(MemoryChange::DeepMemoryUpserted { deep_memory: deep });
        Ok(Applied::Changes(changes))
    }
}
