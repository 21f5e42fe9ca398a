//! Tier state for one session.
//!
//! [`RecentHistory`] and [`ChunkTier`] enforce their ordering invariants on
//! every insertion, and [`MemoryTiers::verify`] checks the whole partition:
//! the ordinals `0..next_ordinal` split, with no gaps and no overlap, into
//! the range absorbed by deep memory, the live chunk ranges, and the recent
//! entries.

use chronicle_core::{ChunkId, DeepMemory, HistoryEntry, MemoryError, Ordinal, TokenizedChunk};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Uncompressed tail of the transcript, oldest first, ordinals contiguous.
#[derive(Debug, Clone, Default)]
pub struct RecentHistory {
    entries: VecDeque<HistoryEntry>,
}

impl RecentHistory {
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &HistoryEntry> + ExactSizeIterator {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_tokens(&self) -> usize {
        self.entries.iter().map(|e| e.token_count).sum()
    }

    pub fn first_ordinal(&self) -> Option<Ordinal> {
        self.entries.front().map(|e| e.ordinal)
    }

    pub fn last_ordinal(&self) -> Option<Ordinal> {
        self.entries.back().map(|e| e.ordinal)
    }

    pub fn get(&self, ordinal: Ordinal) -> Option<&HistoryEntry> {
        let index = ordinal.checked_sub(self.first_ordinal()?)?;
        self.entries.get(usize::try_from(index).ok()?)
    }

    pub(crate) fn get_mut(&mut self, ordinal: Ordinal) -> Option<&mut HistoryEntry> {
        let index = ordinal.checked_sub(self.first_ordinal()?)?;
        self.entries.get_mut(usize::try_from(index).ok()?)
    }

    /// Append at the tail. The ordinal must directly follow the current tail.
    pub(crate) fn push(&mut self, entry: HistoryEntry) -> Result<(), MemoryError> {
        if let Some(last) = self.last_ordinal() {
            if entry.ordinal != last + 1 {
                return Err(MemoryError::OrdinalConflict(format!(
                    "entry {} does not follow recent tail {last}",
                    entry.ordinal
                )));
            }
        }
        self.entries.push_back(entry);
        Ok(())
    }

    pub(crate) fn pop_back(&mut self) -> Option<HistoryEntry> {
        self.entries.pop_back()
    }

    /// Remove the `count` oldest entries.
    pub(crate) fn drain_front(&mut self, count: usize) -> Vec<HistoryEntry> {
        let count = count.min(self.entries.len());
        self.entries.drain(..count).collect()
    }
}

/// Live tokenized chunks, ordered by ordinal range, never overlapping.
#[derive(Debug, Clone, Default)]
pub struct ChunkTier {
    chunks: Vec<TokenizedChunk>,
}

impl ChunkTier {
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &TokenizedChunk> + ExactSizeIterator {
        self.chunks.iter()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn total_tokens(&self) -> usize {
        self.chunks.iter().map(|c| c.token_count).sum()
    }

    pub fn last(&self) -> Option<&TokenizedChunk> {
        self.chunks.last()
    }

    pub fn get(&self, id: ChunkId) -> Option<&TokenizedChunk> {
        self.chunks.iter().find(|c| c.id == id)
    }

    pub(crate) fn get_mut(&mut self, id: ChunkId) -> Option<&mut TokenizedChunk> {
        self.chunks.iter_mut().find(|c| c.id == id)
    }

    /// Append at the tail. The chunk must start after every live chunk ends.
    pub(crate) fn push(&mut self, chunk: TokenizedChunk) -> Result<(), MemoryError> {
        if chunk.start_ordinal > chunk.end_ordinal {
            return Err(MemoryError::OrdinalConflict(format!(
                "chunk {} has inverted range {}..={}",
                chunk.id, chunk.start_ordinal, chunk.end_ordinal
            )));
        }
        if let Some(last) = self.chunks.last() {
            if chunk.start_ordinal <= last.end_ordinal {
                return Err(MemoryError::OrdinalConflict(format!(
                    "chunk {}..={} overlaps chunk {} ending at {}",
                    chunk.start_ordinal, chunk.end_ordinal, last.id, last.end_ordinal
                )));
            }
        }
        self.chunks.push(chunk);
        Ok(())
    }

    /// Remove the `count` oldest chunks (head trim only).
    pub(crate) fn drain_front(&mut self, count: usize) -> Vec<TokenizedChunk> {
        let count = count.min(self.chunks.len());
        self.chunks.drain(..count).collect()
    }
}

/// Serializable form of a session's tiers, handed to and from the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorySnapshot {
    #[serde(default)]
    pub recent_history: Vec<HistoryEntry>,

    #[serde(default)]
    pub chunks: Vec<TokenizedChunk>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deep_memory: Option<DeepMemory>,

    /// Next chunk id to hand out. Raised to `max(id) + 1` on restore.
    #[serde(default)]
    pub next_chunk_id: u64,

    /// Token total of every entry ever archived into a chunk.
    #[serde(default)]
    pub archived_tokens: u64,
}

/// The complete tier state of one session.
#[derive(Debug, Clone, Default)]
pub struct MemoryTiers {
    pub(crate) recent: RecentHistory,
    pub(crate) chunks: ChunkTier,
    pub(crate) deep: Option<DeepMemory>,
    pub(crate) next_chunk_id: u64,
    pub(crate) archived_tokens: u64,
}

impl MemoryTiers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recent(&self) -> &RecentHistory {
        &self.recent
    }

    pub fn chunks(&self) -> &ChunkTier {
        &self.chunks
    }

    pub fn deep_memory(&self) -> Option<&DeepMemory> {
        self.deep.as_ref()
    }

    pub fn archived_tokens(&self) -> u64 {
        self.archived_tokens
    }

    /// The ordinal the next appended entry will receive.
    pub fn next_ordinal(&self) -> Ordinal {
        if let Some(last) = self.recent.last_ordinal() {
            last + 1
        } else if let Some(chunk) = self.chunks.last() {
            chunk.end_ordinal + 1
        } else {
            self.merged_through().map_or(0, |o| o + 1)
        }
    }

    fn merged_through(&self) -> Option<Ordinal> {
        self.deep.as_ref().and_then(|d| d.merged_through)
    }

    /// Check every structural invariant.
    pub fn verify(&self) -> Result<(), MemoryError> {
        let mut expected: Ordinal = self.merged_through().map_or(0, |o| o + 1);

        let mut seen_ids = std::collections::HashSet::new();
        for chunk in self.chunks.iter() {
            if !seen_ids.insert(chunk.id) {
                return Err(MemoryError::OrdinalConflict(format!(
                    "chunk id {} appears twice",
                    chunk.id
                )));
            }
            if chunk.id.0 >= self.next_chunk_id {
                return Err(MemoryError::OrdinalConflict(format!(
                    "chunk id {} not below next id {}",
                    chunk.id, self.next_chunk_id
                )));
            }
            if chunk.start_ordinal != expected || chunk.end_ordinal < chunk.start_ordinal {
                return Err(MemoryError::OrdinalConflict(format!(
                    "chunk {} covers {}..={}, expected to start at {expected}",
                    chunk.id, chunk.start_ordinal, chunk.end_ordinal
                )));
            }
            expected = chunk.end_ordinal + 1;
        }

        for entry in self.recent.iter() {
            if entry.ordinal != expected {
                return Err(MemoryError::OrdinalConflict(format!(
                    "recent entry {} found where {expected} was expected",
                    entry.ordinal
                )));
            }
            expected += 1;
        }

        Ok(())
    }

    /// Rebuild tiers from persisted state, rejecting anything inconsistent.
    pub fn from_snapshot(snapshot: MemorySnapshot) -> Result<Self, MemoryError> {
        let max_id = snapshot.chunks.iter().map(|c| c.id.0 + 1).max().unwrap_or(0);
        let mut tiers = Self {
            recent: RecentHistory::default(),
            chunks: ChunkTier::default(),
            deep: snapshot.deep_memory,
            next_chunk_id: snapshot.next_chunk_id.max(max_id),
            archived_tokens: snapshot.archived_tokens,
        };
        for chunk in snapshot.chunks {
            tiers.chunks.push(chunk)?;
        }
        for entry in snapshot.recent_history {
            tiers.recent.push(entry)?;
        }
        tiers.verify()?;
        Ok(tiers)
    }

    pub fn snapshot(&self) -> MemorySnapshot {
        MemorySnapshot {
            recent_history: self.recent.iter().cloned().collect(),
            chunks: self.chunks.iter().cloned().collect(),
            deep_memory: self.deep.clone(),
            next_chunk_id: self.next_chunk_id,
            archived_tokens: self.archived_tokens,
        }
    }
}
