//! One game's memory: the tiers behind a session-scoped async mutex.
//!
//! Every mutation follows the same shape: count tokens with the lock
//! released, apply the change under the lock, then run the Tier Manager to
//! fixpoint. Compression is planned under the lock, summarized without it,
//! and applied after re-validating the plan. A per-tier in-flight flag keeps
//! two callers from summarizing the same tier at once.

use crate::assembler::PromptContext;
use crate::engine::MemoryEngine;
use crate::manager::{Applied, MergePlan, PromotionPlan};
use crate::stats::MemoryStats;
use crate::tiers::{MemorySnapshot, MemoryTiers};
use chronicle_core::{
    Author, ChunkId, CompressionDeferred, CompressionStage, DeepMemory, HistoryEntry,
    MemoryChange, MemoryError, Ordinal, SessionId, TokenizedChunk,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

/// Stale results tolerated per tier within one mutation before deferring.
const MAX_STALE_RETRIES: usize = 3;

/// What a successful mutation hands back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationOutcome<T> {
    /// The entity the mutation targeted, as it stands after the change.
    pub value: T,
    /// Structural changes in application order, for the caller to persist.
    pub changes: Vec<MemoryChange>,
    /// Compressions that could not complete and will be retried.
    pub deferred: Vec<CompressionDeferred>,
    /// Tier state after the mutation and any compression it triggered.
    pub snapshot: MemorySnapshot,
}

struct SessionState {
    tiers: MemoryTiers,
    closed: bool,
}

/// Clears an in-flight flag on drop, so a cancelled call cannot wedge a tier.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

enum Job<'a> {
    Promote(PromotionPlan, InFlight<'a>),
    Merge(MergePlan, InFlight<'a>),
}

/// A single session's memory. Share it as `Arc<MemorySession>`.
pub struct MemorySession {
    id: SessionId,
    engine: Arc<MemoryEngine>,
    state: Mutex<SessionState>,
    promotion_in_flight: AtomicBool,
    merge_in_flight: AtomicBool,
}

impl MemorySession {
    pub fn new(id: SessionId, engine: Arc<MemoryEngine>) -> Self {
        Self::with_tiers(id, engine, MemoryTiers::new())
    }

    /// Rebuild a session from persisted state, validating every invariant.
    pub fn restore(
        id: SessionId,
        snapshot: MemorySnapshot,
        engine: Arc<MemoryEngine>,
    ) -> Result<Self, MemoryError> {
        let tiers = MemoryTiers::from_snapshot(snapshot).map_err(|e| {
            error!(session = %id, error = %e, "Rejected inconsistent snapshot");
            e
        })?;
        debug!(
            session = %id,
            recent = tiers.recent().len(),
            chunks = tiers.chunks().len(),
            "Session restored"
        );
        Ok(Self::with_tiers(id, engine, tiers))
    }

    fn with_tiers(id: SessionId, engine: Arc<MemoryEngine>, tiers: MemoryTiers) -> Self {
        Self {
            id,
            engine,
            state: Mutex::new(SessionState {
                tiers,
                closed: false,
            }),
            promotion_in_flight: AtomicBool::new(false),
            merge_in_flight: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn engine(&self) -> &Arc<MemoryEngine> {
        &self.engine
    }

    // ── Mutations ─────────────────────────────────────────────────────────

    /// Record a new transcript entry at the next ordinal.
    pub async fn append_entry(
        &self,
        text: impl Into<String>,
        author: Author,
    ) -> Result<MutationOutcome<HistoryEntry>, MemoryError> {
        let text = text.into();
        self.lock_open().await?;
        let token_count = self.engine.ledger().count(&text).await?;

        let entry = {
            let mut state = self.lock_open().await?;
            let entry = HistoryEntry {
                ordinal: state.tiers.next_ordinal(),
                text,
                token_count,
                author,
            };
            state
                .tiers
                .recent
                .push(entry.clone())
                .map_err(|e| self.conflict(e))?;
            entry
        };

        debug!(
            session = %self.id,
            ordinal = entry.ordinal,
            tokens = entry.token_count,
            author = %entry.author,
            "Entry appended"
        );
        let changes = vec![MemoryChange::EntryCreated {
            entry: entry.clone(),
        }];
        self.finish(entry, changes).await
    }

    /// Replace the text of an entry still in Recent History.
    pub async fn edit_entry(
        &self,
        ordinal: Ordinal,
        new_text: impl Into<String>,
    ) -> Result<MutationOutcome<HistoryEntry>, MemoryError> {
        let new_text = new_text.into();
        {
            let state = self.lock_open().await?;
            Self::check_editable(&state.tiers, ordinal)?;
        }
        let token_count = self.engine.ledger().count(&new_text).await?;

        let entry = {
            let mut state = self.lock_open().await?;
            Self::check_editable(&state.tiers, ordinal)?;
            let entry = state
                .tiers
                .recent
                .get_mut(ordinal)
                .ok_or(MemoryError::EntryNotFound(ordinal))?;
            entry.text = new_text;
            entry.token_count = token_count;
            entry.clone()
        };

        debug!(session = %self.id, ordinal, tokens = token_count, "Entry edited");
        let changes = vec![MemoryChange::EntryUpdated {
            entry: entry.clone(),
        }];
        self.finish(entry, changes).await
    }

    /// Rewrite a live chunk's summary. Its ordinal range never changes.
    pub async fn edit_chunk_summary(
        &self,
        chunk_id: ChunkId,
        new_summary: impl Into<String>,
    ) -> Result<MutationOutcome<TokenizedChunk>, MemoryError> {
        let new_summary = new_summary.into();
        {
            let state = self.lock_open().await?;
            if state.tiers.chunks().get(chunk_id).is_none() {
                return Err(MemoryError::ChunkNotFound(chunk_id));
            }
        }
        let token_count = self.engine.ledger().count(&new_summary).await?;

        let chunk = {
            let mut state = self.lock_open().await?;
            let chunk = state
                .tiers
                .chunks
                .get_mut(chunk_id)
                .ok_or(MemoryError::ChunkNotFound(chunk_id))?;
            chunk.summary = new_summary;
            chunk.token_count = token_count;
            chunk.clone()
        };

        debug!(session = %self.id, chunk_id = %chunk.id, tokens = token_count, "Chunk summary edited");
        let changes = vec![MemoryChange::ChunkUpdated {
            chunk: chunk.clone(),
        }];
        self.finish(chunk, changes).await
    }

    /// Rewrite deep memory, creating it if the session has none yet.
    pub async fn edit_deep_memory(
        &self,
        new_summary: impl Into<String>,
    ) -> Result<MutationOutcome<DeepMemory>, MemoryError> {
        let new_summary = new_summary.into();
        self.lock_open().await?;
        let token_count = self.engine.ledger().count(&new_summary).await?;

        let deep = {
            let mut state = self.lock_open().await?;
            let deep = match state.tiers.deep.take() {
                Some(mut deep) => {
                    deep.summary = new_summary;
                    deep.token_count = token_count;
                    deep.updated_at = Utc::now();
                    deep
                }
                None => DeepMemory::authored(new_summary, token_count),
            };
            state.tiers.deep = Some(deep.clone());
            deep
        };

        debug!(session = %self.id, tokens = token_count, "Deep memory edited");
        let changes = vec![MemoryChange::DeepMemoryUpserted {
            deep_memory: deep.clone(),
        }];
        self.finish(deep, changes).await
    }

    /// Remove the newest entry. Its ordinal is handed out again by the next
    /// append.
    ///
    /// Undo never runs compaction: deferred work waits for the next append
    /// or edit, so undo followed by the same append lands in the same state.
    pub async fn undo_last(&self) -> Result<MutationOutcome<HistoryEntry>, MemoryError> {
        let mut state = self.lock_open().await?;
        let next = state.tiers.next_ordinal();
        if next == 0 {
            return Err(MemoryError::Empty);
        }
        let entry = state
            .tiers
            .recent
            .pop_back()
            .ok_or(MemoryError::AlreadyArchived { ordinal: next - 1 })?;
        let snapshot = state.tiers.snapshot();
        drop(state);

        debug!(session = %self.id, ordinal = entry.ordinal, "Entry undone");
        let changes = vec![MemoryChange::EntryRemoved {
            ordinal: entry.ordinal,
        }];
        Ok(MutationOutcome {
            value: entry,
            changes,
            deferred: Vec::new(),
            snapshot,
        })
    }

    // ── Queries ───────────────────────────────────────────────────────────

    /// Assemble the prompt for the next model turn.
    pub async fn build_prompt_context(
        &self,
        max_context_tokens: usize,
    ) -> Result<PromptContext, MemoryError> {
        let state = self.lock_open().await?;
        Ok(self.engine.assembler().build(&state.tiers, max_context_tokens))
    }

    pub async fn stats(&self) -> Result<MemoryStats, MemoryError> {
        let state = self.lock_open().await?;
        let config = self.engine.config();
        Ok(MemoryStats::compute(
            &state.tiers,
            config.context_max_chunks,
            config.recent_history_threshold,
        ))
    }

    pub async fn snapshot(&self) -> Result<MemorySnapshot, MemoryError> {
        Ok(self.lock_open().await?.tiers.snapshot())
    }

    /// Tear the session down. Results of compressions still in flight are
    /// discarded when they arrive. Returns `false` if already closed.
    pub async fn close(&self) -> bool {
        let mut state = self.state.lock().await;
        if state.closed {
            return false;
        }
        state.closed = true;
        info!(session = %self.id, "Session closed");
        true
    }

    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }

    // ── Internals ─────────────────────────────────────────────────────────

    async fn lock_open(&self) -> Result<MutexGuard<'_, SessionState>, MemoryError> {
        let state = self.state.lock().await;
        if state.closed {
            return Err(MemoryError::SessionClosed(self.id.to_string()));
        }
        Ok(state)
    }

    fn check_editable(tiers: &MemoryTiers, ordinal: Ordinal) -> Result<(), MemoryError> {
        if ordinal >= tiers.next_ordinal() {
            return Err(MemoryError::EntryNotFound(ordinal));
        }
        match tiers.recent().first_ordinal() {
            Some(first) if ordinal >= first => Ok(()),
            _ => Err(MemoryError::AlreadyArchived { ordinal }),
        }
    }

    fn conflict(&self, e: MemoryError) -> MemoryError {
        if let MemoryError::OrdinalConflict(detail) = &e {
            error!(session = %self.id, detail = %detail, "Tier invariant violated");
        }
        e
    }

    async fn finish<T>(
        &self,
        value: T,
        mut changes: Vec<MemoryChange>,
    ) -> Result<MutationOutcome<T>, MemoryError> {
        let deferred = self.compact(&mut changes).await?;
        let snapshot = self.lock_open().await?.tiers.snapshot();
        Ok(MutationOutcome {
            value,
            changes,
            deferred,
            snapshot,
        })
    }

    /// Run promotion then merge until neither has work, a tier fails, or
    /// another caller already has that tier in flight.
    async fn compact(
        &self,
        changes: &mut Vec<MemoryChange>,
    ) -> Result<Vec<CompressionDeferred>, MemoryError> {
        let manager = self.engine.manager();
        let mut deferred = Vec::new();
        let mut promotion_blocked = false;
        let mut merge_blocked = false;
        let mut stale_promotions = 0;
        let mut stale_merges = 0;

        loop {
            let job = {
                let state = self.lock_open().await?;
                let mut job = None;
                if !promotion_blocked {
                    if let Some(plan) = manager.plan_promotion(&state.tiers) {
                        job = InFlight::acquire(&self.promotion_in_flight)
                            .map(|flight| Job::Promote(plan, flight));
                    }
                }
                if job.is_none() && !merge_blocked {
                    if let Some(plan) = manager.plan_merge(&state.tiers) {
                        job = InFlight::acquire(&self.merge_in_flight)
                            .map(|flight| Job::Merge(plan, flight));
                    }
                }
                job
            };

            match job {
                None => break,
                Some(Job::Promote(plan, _flight)) => {
                    let result = self.engine.condense(plan.request.clone()).await;
                    let mut state = self.lock_applicable(CompressionStage::Promotion).await?;
                    let (summary, tokens) = match result {
                        Ok(done) => done,
                        Err(reason) => {
                            warn!(session = %self.id, %reason, "Promotion deferred");
                            promotion_blocked = true;
                            deferred.push(CompressionDeferred {
                                stage: CompressionStage::Promotion,
                                reason,
                            });
                            continue;
                        }
                    };
                    match manager
                        .apply_promotion(&mut state.tiers, &plan, summary, tokens)
                        .map_err(|e| self.conflict(e))?
                    {
                        Applied::Changes(applied) => {
                            info!(
                                session = %self.id,
                                start = plan.start_ordinal(),
                                end = plan.end_ordinal(),
                                tokens,
                                "Recent history promoted to chunk"
                            );
                            changes.extend(applied);
                        }
                        Applied::Stale => {
                            stale_promotions += 1;
                            warn!(
                                session = %self.id,
                                start = plan.start_ordinal(),
                                end = plan.end_ordinal(),
                                attempt = stale_promotions,
                                "Discarded stale promotion"
                            );
                            if stale_promotions >= MAX_STALE_RETRIES {
                                promotion_blocked = true;
                                deferred.push(CompressionDeferred {
                                    stage: CompressionStage::Promotion,
                                    reason: "history kept changing during summarization".into(),
                                });
                            }
                        }
                    }
                }
                Some(Job::Merge(plan, _flight)) => {
                    let result = self.engine.condense(plan.request.clone()).await;
                    let mut state = self.lock_applicable(CompressionStage::Merge).await?;
                    let (summary, tokens) = match result {
                        Ok(done) => done,
                        Err(reason) => {
                            warn!(session = %self.id, %reason, "Merge deferred");
                            merge_blocked = true;
                            deferred.push(CompressionDeferred {
                                stage: CompressionStage::Merge,
                                reason,
                            });
                            continue;
                        }
                    };
                    match manager
                        .apply_merge(&mut state.tiers, &plan, summary, tokens)
                        .map_err(|e| self.conflict(e))?
                    {
                        Applied::Changes(applied) => {
                            info!(
                                session = %self.id,
                                folded = plan.len(),
                                chunks_merged = state.tiers.deep_memory().map_or(0, |d| d.chunks_merged),
                                tokens,
                                "Chunks merged into deep memory"
                            );
                            changes.extend(applied);
                        }
                        Applied::Stale => {
                            stale_merges += 1;
                            warn!(
                                session = %self.id,
                                chunks = ?plan.chunk_ids(),
                                attempt = stale_merges,
                                "Discarded stale merge"
                            );
                            if stale_merges >= MAX_STALE_RETRIES {
                                merge_blocked = true;
                                deferred.push(CompressionDeferred {
                                    stage: CompressionStage::Merge,
                                    reason: "chunks kept changing during summarization".into(),
                                });
                            }
                        }
                    }
                }
            }
        }

        Ok(deferred)
    }

    /// Re-acquire the lock after a summarizer call; a session closed in the
    /// meantime discards the result.
    async fn lock_applicable(
        &self,
        stage: CompressionStage,
    ) -> Result<MutexGuard<'_, SessionState>, MemoryError> {
        self.lock_open().await.inspect_err(|_| {
            warn!(session = %self.id, %stage, "Session closed mid-compression, result discarded");
        })
    }
}

impl std::fmt::Debug for MemorySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySession").field("id", &self.id).finish()
    }
}
