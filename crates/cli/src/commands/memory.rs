//! `chronicle replay|append|undo|edit|context|stats`: session commands.

use std::path::Path;

use super::GlobalOpts;
use super::state::{open_session, save_session};
use chronicle_core::{Author, ChunkId, MemoryChange, Ordinal};
use chronicle_memory::{MemorySession, MutationOutcome};
use tracing::warn;

type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Split a transcript into entries. One entry per non-blank line; a leading
/// `player:` or `narrator:` picks the author, anything else is narration.
pub fn parse_transcript(content: &str) -> Vec<(Author, String)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let (author, text) = match line.split_once(':') {
                Some((prefix, rest)) => match prefix.parse::<Author>() {
                    Ok(author) => (author, rest.trim()),
                    Err(_) => (Author::Narrator, line),
                },
                None => (Author::Narrator, line),
            };
            (!text.is_empty()).then(|| (author, text.to_string()))
        })
        .collect()
}

/// Running totals over a batch of outcomes.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ChangeTally {
    pub entries: usize,
    pub chunks_created: usize,
    pub chunks_merged: usize,
    pub deferred: usize,
}

impl ChangeTally {
    pub fn record<T>(&mut self, outcome: &MutationOutcome<T>) {
        for change in &outcome.changes {
            match change {
                MemoryChange::EntryCreated { .. } => self.entries += 1,
                MemoryChange::ChunkCreated { .. } => self.chunks_created += 1,
                MemoryChange::ChunkRemoved { .. } => self.chunks_merged += 1,
                _ => {}
            }
        }
        self.deferred += outcome.deferred.len();
    }
}

fn report_deferred<T>(outcome: &MutationOutcome<T>) {
    for notice in &outcome.deferred {
        warn!(stage = %notice.stage, reason = %notice.reason, "Compression deferred");
        eprintln!("note: {notice} (will retry on the next change)");
    }
}

fn print_changes<T>(outcome: &MutationOutcome<T>) {
    for change in &outcome.changes {
        match change {
            MemoryChange::EntryCreated { entry } | MemoryChange::EntryUpdated { entry } => {
                println!(
                    "{} #{} ({} tokens, {})",
                    change.kind(),
                    entry.ordinal,
                    entry.token_count,
                    entry.author
                );
            }
            MemoryChange::EntryRemoved { ordinal } => println!("{} #{ordinal}", change.kind()),
            MemoryChange::EntriesArchived {
                start_ordinal,
                end_ordinal,
            } => println!("{} #{start_ordinal}..=#{end_ordinal}", change.kind()),
            MemoryChange::ChunkCreated { chunk } | MemoryChange::ChunkUpdated { chunk } => {
                println!(
                    "{} {} covering #{}..=#{} ({} tokens)",
                    change.kind(),
                    chunk.id,
                    chunk.start_ordinal,
                    chunk.end_ordinal,
                    chunk.token_count
                );
            }
            MemoryChange::ChunkRemoved { id } => println!("{} {id}", change.kind()),
            MemoryChange::DeepMemoryUpserted { deep_memory } => println!(
                "{} ({} chunks merged, {} tokens)",
                change.kind(),
                deep_memory.chunks_merged,
                deep_memory.token_count
            ),
        }
    }
    report_deferred(outcome);
}

async fn with_session<F, Fut>(opts: &GlobalOpts, mutate: F) -> CmdResult
where
    F: FnOnce(MemorySession) -> Fut,
    Fut: std::future::Future<Output = (MemorySession, CmdResult)>,
{
    let engine = opts.build_engine()?;
    let session = open_session(&engine, &opts.state).await?;
    let (session, result) = mutate(session).await;
    result?;
    save_session(&session, &opts.state).await
}

pub async fn replay(opts: &GlobalOpts, transcript: &Path) -> CmdResult {
    let content = tokio::fs::read_to_string(transcript)
        .await
        .map_err(|e| format!("Failed to read {}: {e}", transcript.display()))?;
    let entries = parse_transcript(&content);

    let engine = opts.build_engine()?;
    let session = open_session(&engine, &opts.state).await?;

    let mut tally = ChangeTally::default();
    let mut failure = None;
    for (author, text) in entries {
        match session.append_entry(text, author).await {
            Ok(outcome) => {
                report_deferred(&outcome);
                tally.record(&outcome);
            }
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }

    // Keep whatever was appended before a failure.
    save_session(&session, &opts.state).await?;

    println!(
        "Replayed {} entries: {} chunks created, {} chunks merged into deep memory, {} deferrals",
        tally.entries, tally.chunks_created, tally.chunks_merged, tally.deferred
    );
    match failure {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

pub async fn append(opts: &GlobalOpts, text: String, author: Author) -> CmdResult {
    with_session(opts, |session| async move {
        let result = session.append_entry(text, author).await;
        let result: CmdResult = result.map(|outcome| print_changes(&outcome)).map_err(Into::into);
        (session, result)
    })
    .await
}

pub async fn undo(opts: &GlobalOpts) -> CmdResult {
    with_session(opts, |session| async move {
        let result = session.undo_last().await;
        let result: CmdResult = result.map(|outcome| print_changes(&outcome)).map_err(Into::into);
        (session, result)
    })
    .await
}

pub async fn edit_entry(opts: &GlobalOpts, ordinal: Ordinal, text: String) -> CmdResult {
    with_session(opts, |session| async move {
        let result = session.edit_entry(ordinal, text).await;
        let result: CmdResult = result.map(|outcome| print_changes(&outcome)).map_err(Into::into);
        (session, result)
    })
    .await
}

pub async fn edit_chunk(opts: &GlobalOpts, id: u64, text: String) -> CmdResult {
    with_session(opts, |session| async move {
        let result = session.edit_chunk_summary(ChunkId(id), text).await;
        let result: CmdResult = result.map(|outcome| print_changes(&outcome)).map_err(Into::into);
        (session, result)
    })
    .await
}

pub async fn edit_deep(opts: &GlobalOpts, text: String) -> CmdResult {
    with_session(opts, |session| async move {
        let result = session.edit_deep_memory(text).await;
        let result: CmdResult = result.map(|outcome| print_changes(&outcome)).map_err(Into::into);
        (session, result)
    })
    .await
}

pub async fn context(opts: &GlobalOpts, budget: usize, json: bool) -> CmdResult {
    let engine = opts.build_engine()?;
    let session = open_session(&engine, &opts.state).await?;
    let ctx = session.build_prompt_context(budget).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&ctx)?);
        return Ok(());
    }

    if !ctx.is_empty() {
        println!("{}", ctx.render());
    }
    for drop in &ctx.metadata.drops {
        eprintln!(
            "dropped {} {} item(s) ({} tokens): {}",
            drop.items_dropped, drop.layer, drop.tokens_dropped, drop.reason
        );
    }
    Ok(())
}

pub async fn stats(opts: &GlobalOpts) -> CmdResult {
    let engine = opts.build_engine()?;
    let session = open_session(&engine, &opts.state).await?;
    let stats = session.stats().await?;

    println!("Memory Statistics");
    println!("=================");
    println!("  Session:          {}", session.id());
    println!("  Active tokens:    {}", stats.active_tokens);
    println!("  Total tokens:     {}", stats.total_tokens);
    println!(
        "  Recent history:   {} entries, {} tokens",
        stats.active_history_entries, stats.active_history_tokens
    );
    println!(
        "  Live chunks:      {} ({} tokens)",
        stats.active_tokenized_chunks, stats.active_tokenized_tokens
    );
    println!(
        "  Deep memory:      {} tokens, {} chunks merged",
        stats.deep_memory_tokens, stats.chunks_merged
    );
    println!("  Entries recorded: {}", stats.total_history_entries);
    Ok(())
}
