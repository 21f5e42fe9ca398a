//! The three tiers' value objects.
//!
//! A transcript entry starts life as a [`HistoryEntry`], is folded into a
//! [`TokenizedChunk`] once Recent History grows too large, and the chunk is
//! eventually absorbed into the session's single [`DeepMemory`]. Nothing is
//! ever promoted back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Position of an entry in the full transcript. Assigned once, never reused
/// while the entry exists.
pub type Ordinal = u64;

/// Who produced a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Author {
    Player,
    Narrator,
}

impl Author {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Player => "player",
            Self::Narrator => "narrator",
        }
    }
}

impl std::fmt::Display for Author {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Author {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "player" => Ok(Self::Player),
            "narrator" => Ok(Self::Narrator),
            other => Err(format!("unknown author '{other}' (expected player or narrator)")),
        }
    }
}

/// A single uncompressed transcript entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub ordinal: Ordinal,
    pub text: String,
    pub token_count: usize,
    pub author: Author,
}

/// Session-unique identifier of a tokenized chunk. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkId(pub u64);

impl std::fmt::Display for ChunkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A compact summary standing in for the archived ordinals
/// `start_ordinal..=end_ordinal`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenizedChunk {
    pub id: ChunkId,
    pub start_ordinal: Ordinal,
    pub end_ordinal: Ordinal,
    pub summary: String,
    pub token_count: usize,
    pub created_at: DateTime<Utc>,
}

impl TokenizedChunk {
    /// Number of history entries this chunk replaced.
    pub fn span(&self) -> u64 {
        self.end_ordinal - self.start_ordinal + 1
    }

    pub fn contains(&self, ordinal: Ordinal) -> bool {
        (self.start_ordinal..=self.end_ordinal).contains(&ordinal)
    }
}

/// The single ultra-compressed running summary of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeepMemory {
    pub summary: String,
    pub token_count: usize,
    /// Total number of chunks ever folded in. Never decreases.
    pub chunks_merged: u64,
    /// Last history ordinal covered by a folded chunk. `None` until the
    /// first merge (a manually authored deep memory covers no ordinals).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_through: Option<Ordinal>,
    pub updated_at: DateTime<Utc>,
}

impl DeepMemory {
    /// A deep memory written by hand rather than produced by a merge.
    pub fn authored(summary: impl Into<String>, token_count: usize) -> Self {
        Self {
            summary: summary.into(),
            token_count,
            chunks_merged: 0,
            merged_through: None,
            updated_at: Utc::now(),
        }
    }
}
