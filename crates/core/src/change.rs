//! Structural change records.
//!
//! The engine never persists anything itself. Every mutation returns the
//! list of changes it applied, in order, so the caller can write them to its
//! store in one transaction.

use crate::history::{ChunkId, DeepMemory, HistoryEntry, Ordinal, TokenizedChunk};
use serde::{Deserialize, Serialize};

/// One entity-level change produced by a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MemoryChange {
    EntryCreated { entry: HistoryEntry },
    EntryUpdated { entry: HistoryEntry },
    /// Removed by undo.
    EntryRemoved { ordinal: Ordinal },
    /// Entries folded into a new chunk; the caller should mark or drop them.
    EntriesArchived { start_ordinal: Ordinal, end_ordinal: Ordinal },
    ChunkCreated { chunk: TokenizedChunk },
    ChunkUpdated { chunk: TokenizedChunk },
    /// Absorbed into deep memory.
    ChunkRemoved { id: ChunkId },
    DeepMemoryUpserted { deep_memory: DeepMemory },
}

impl MemoryChange {
    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EntryCreated { .. } => "entry_created",
            Self::EntryUpdated { .. } => "entry_updated",
            Self::EntryRemoved { .. } => "entry_removed",
            Self::EntriesArchived { .. } => "entries_archived",
            Self::ChunkCreated { .. } => "chunk_created",
            Self::ChunkUpdated { .. } => "chunk_updated",
            Self::ChunkRemoved { .. } => "chunk_removed",
            Self::DeepMemoryUpserted { .. } => "deep_memory_upserted",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn changes_are_tagged_in_json() {
        let change = MemoryChange::EntryRemoved { ordinal: 9 };
        let json = serde_json::to_string(&change).unwrap();
        assert!(json.contains("\"type\":\"entry_removed\""));
        assert!(json.contains("\"ordinal\":9"));
        assert_eq!(change.kind(), "entry_removed");
    }
}
