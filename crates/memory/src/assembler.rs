//! Context assembly: the three tiers, fitted to a token budget.
//!
//! Sections are emitted in a fixed order:
//!
//! 1. **Deep memory**: included whole if it fits, otherwise omitted
//! 2. **Tokenized chunks**: the newest `context_max_chunks`, oldest dropped
//!    first when over budget, emitted chronologically
//! 3. **Recent history**: newest entries that fit the remaining budget,
//!    emitted oldest to newest
//!
//! Budgets are measured on stored token counts; headings added by
//! [`PromptContext::render`] are not counted.
//!
//! # Determinism
//!
//! Identical tiers and budget always produce identical output. No clock or
//! randomness is read during assembly.

use crate::tiers::MemoryTiers;
use chronicle_core::{Author, Ordinal};
use serde::{Deserialize, Serialize};

pub const DEEP_MEMORY_HEADING: &str = "# Ancient History (Major Events):";
pub const CHUNKS_HEADING: &str = "# Past Events:";
pub const HISTORY_HEADING: &str = "# Recent Story:";

/// Which tier a section came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    DeepMemory,
    Chunk,
    History,
}

impl SectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DeepMemory => "deep_memory",
            Self::Chunk => "tokenized_chunks",
            Self::History => "recent_history",
        }
    }
}

/// One ordered piece of the prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptSection {
    pub kind: SectionKind,
    pub text: String,
    pub token_count: usize,
    /// Ordinal range covered; `None` for deep memory.
    pub start_ordinal: Option<Ordinal>,
    pub end_ordinal: Option<Ordinal>,
    /// Set for history sections only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<Author>,
}

/// The assembled context for one model turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptContext {
    pub sections: Vec<PromptSection>,
    pub metadata: AssemblyMetadata,
}

/// Detailed metadata about the assembly process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblyMetadata {
    /// Total tokens across all sections.
    pub total_tokens: usize,
    /// Requested budget.
    pub budget: usize,
    /// Per-tier statistics, in emission order.
    pub per_layer: Vec<LayerStats>,
    /// Items left out of the output (never out of storage).
    pub drops: Vec<DropInfo>,
}

/// Statistics for a single tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerStats {
    pub name: String,
    pub tokens: usize,
    pub items_included: usize,
    pub items_total: usize,
}

/// Items omitted from a tier during budget enforcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropInfo {
    pub layer: String,
    pub items_dropped: usize,
    pub tokens_dropped: usize,
    pub reason: String,
}

impl PromptContext {
    /// Prompt text with a heading per non-empty tier.
    pub fn render(&self) -> String {
        let mut blocks = Vec::new();
        for (kind, heading) in [
            (SectionKind::DeepMemory, DEEP_MEMORY_HEADING),
            (SectionKind::Chunk, CHUNKS_HEADING),
            (SectionKind::History, HISTORY_HEADING),
        ] {
            let texts: Vec<&str> = self
                .sections
                .iter()
                .filter(|s| s.kind == kind)
                .map(|s| s.text.as_str())
                .collect();
            if !texts.is_empty() {
                blocks.push(format!("{heading}\n{}", texts.join("\n\n")));
            }
        }
        blocks.join("\n\n")
    }

    pub fn total_tokens(&self) -> usize {
        self.metadata.total_tokens
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

/// Stateless; create one per engine and reuse it.
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    max_chunks: usize,
}

impl ContextAssembler {
    pub fn new(max_chunks: usize) -> Self {
        Self { max_chunks }
    }

    pub fn build(&self, tiers: &MemoryTiers, max_context_tokens: usize) -> PromptContext {
        let mut remaining = max_context_tokens;
        let mut sections = Vec::new();
        let mut per_layer = Vec::new();
        let mut drops = Vec::new();

        // ── Deep memory ───────────────────────────────────────────────────
        let mut deep_stats = Self::empty_stats(SectionKind::DeepMemory, 0);
        if let Some(deep) = tiers.deep_memory() {
            deep_stats.items_total = 1;
            if deep.token_count <= remaining {
                remaining -= deep.token_count;
                deep_stats.tokens = deep.token_count;
                deep_stats.items_included = 1;
                sections.push(PromptSection {
                    kind: SectionKind::DeepMemory,
                    text: deep.summary.clone(),
                    token_count: deep.token_count,
                    start_ordinal: None,
                    end_ordinal: None,
                    author: None,
                });
            } else {
                drops.push(DropInfo {
                    layer: SectionKind::DeepMemory.as_str().into(),
                    items_dropped: 1,
                    tokens_dropped: deep.token_count,
                    reason: "Deep memory alone exceeds budget".into(),
                });
            }
        }
        per_layer.push(deep_stats);

        // ── Tokenized chunks ──────────────────────────────────────────────
        let chunks = tiers.chunks();
        let window = chunks.len().saturating_sub(self.max_chunks);
        if window > 0 {
            let tokens: usize = chunks.iter().take(window).map(|c| c.token_count).sum();
            drops.push(DropInfo {
                layer: SectionKind::Chunk.as_str().into(),
                items_dropped: window,
                tokens_dropped: tokens,
                reason: format!("Only the newest {} chunks are assembled", self.max_chunks),
            });
        }

        // Newest first, stop at the first chunk that does not fit so the
        // included chunks stay contiguous.
        let mut picked = Vec::new();
        let mut used = 0;
        for chunk in chunks.iter().skip(window).rev() {
            if used + chunk.token_count > remaining {
                break;
            }
            used += chunk.token_count;
            picked.push(chunk);
        }
        picked.reverse();
        remaining -= used;

        let candidates = chunks.len() - window;
        let over_budget = candidates - picked.len();
        if over_budget > 0 {
            let tokens: usize = chunks
                .iter()
                .skip(window)
                .take(over_budget)
                .map(|c| c.token_count)
                .sum();
            drops.push(DropInfo {
                layer: SectionKind::Chunk.as_str().into(),
                items_dropped: over_budget,
                tokens_dropped: tokens,
                reason: "Oldest chunks dropped to fit budget".into(),
            });
        }
        per_layer.push(LayerStats {
            name: SectionKind::Chunk.as_str().into(),
            tokens: used,
            items_included: picked.len(),
            items_total: chunks.len(),
        });
        sections.extend(picked.into_iter().map(|chunk| PromptSection {
            kind: SectionKind::Chunk,
            text: chunk.summary.clone(),
            token_count: chunk.token_count,
            start_ordinal: Some(chunk.start_ordinal),
            end_ordinal: Some(chunk.end_ordinal),
            author: None,
        }));

        // ── Recent history ────────────────────────────────────────────────
        let recent = tiers.recent();
        let mut window = Vec::new();
        let mut used = 0;
        for entry in recent.iter().rev() {
            if used + entry.token_count > remaining {
                break;
            }
            used += entry.token_count;
            window.push(entry);
        }
        window.reverse();

        let dropped = recent.len() - window.len();
        if dropped > 0 {
            let tokens: usize = recent.iter().take(dropped).map(|e| e.token_count).sum();
            drops.push(DropInfo {
                layer: SectionKind::History.as_str().into(),
                items_dropped: dropped,
                tokens_dropped: tokens,
                reason: "Oldest entries dropped to fit budget".into(),
            });
        }
        per_layer.push(LayerStats {
            name: SectionKind::History.as_str().into(),
            tokens: used,
            items_included: window.len(),
            items_total: recent.len(),
        });
        sections.extend(window.into_iter().map(|entry| PromptSection {
            kind: SectionKind::History,
            text: entry.text.clone(),
            token_count: entry.token_count,
            start_ordinal: Some(entry.ordinal),
            end_ordinal: Some(entry.ordinal),
            author: Some(entry.author),
        }));

        let total_tokens = per_layer.iter().map(|s| s.tokens).sum();
        PromptContext {
            sections,
            metadata: AssemblyMetadata {
                total_tokens,
                budget: max_context_tokens,
                per_layer,
                drops,
            },
        }
    }

    fn empty_stats(kind: SectionKind, total: usize) -> LayerStats {
        LayerStats {
            name: kind.as_str().into(),
            tokens: 0,
            items_included: 0,
            items_total: total,
        }
    }
}
