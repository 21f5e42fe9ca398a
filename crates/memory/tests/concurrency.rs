//! Sessions under concurrent callers: the lock is released while the
//! summarizer runs, stale results are discarded, closed sessions drop
//! late results, and timeouts defer compression.

use std::sync::Arc;
use std::time::Duration;

use chronicle_config::MemoryConfig;
use chronicle_core::{Author, CompressionStage, MemoryError, SessionId, Summarizer};
use chronicle_memory::testing::{GatedSummarizer, SlowSummarizer, WordTokenizer, tok};
use chronicle_memory::{MemoryEngine, MemorySession, SessionRegistry};

fn engine(summarizer: Arc<dyn Summarizer>) -> Arc<MemoryEngine> {
    let config = MemoryConfig {
        recent_history_threshold: 100,
        chunk_target_size: 50,
        max_live_chunks: 5,
        summarizer_timeout_secs: 30,
        ..MemoryConfig::default()
    };
    Arc::new(MemoryEngine::new(config, Arc::new(WordTokenizer::new()), summarizer).unwrap())
}

/// A session holding three 30-token entries; the next 30-token append
/// crosses the threshold.
async fn primed(engine: &Arc<MemoryEngine>, id: &str) -> Arc<MemorySession> {
    let session = Arc::new(engine.open_session(SessionId::from(id)));
    for _ in 0..3 {
        session.append_entry(tok(30), Author::Narrator).await.unwrap();
    }
    session
}

#[tokio::test]
async fn lock_is_released_during_summarization() {
    let gate = Arc::new(GatedSummarizer::new(3));
    let engine = engine(gate.clone());
    let session = primed(&engine, "open-lock").await;

    let trigger = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.append_entry(tok(30), Author::Narrator).await })
    };
    gate.started.notified().await;

    // Another mutation completes while the promotion is in flight, and does
    // not start a second promotion for the same tier.
    let quick = tokio::time::timeout(
        Duration::from_secs(5),
        session.append_entry("quick", Author::Player),
    )
    .await
    .expect("append blocked behind summarizer")
    .unwrap();
    assert_eq!(quick.value.ordinal, 4);
    assert!(quick.deferred.is_empty());
    assert!(quick.snapshot.chunks.is_empty());

    gate.release.notify_one();
    let outcome = trigger.await.unwrap().unwrap();
    assert_eq!(outcome.snapshot.chunks.len(), 1);
    assert_eq!(outcome.snapshot.chunks[0].end_ordinal, 1);
    let recent: Vec<u64> = outcome.snapshot.recent_history.iter().map(|e| e.ordinal).collect();
    assert_eq!(recent, vec![2, 3, 4]);
    assert_eq!(gate.inner.calls(), 1);
}

#[tokio::test]
async fn stale_result_is_discarded_and_replanned() {
    let gate = Arc::new(GatedSummarizer::new(3));
    let engine = engine(gate.clone());
    let session = primed(&engine, "stale").await;

    let trigger = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.append_entry(tok(30), Author::Narrator).await })
    };
    gate.started.notified().await;

    // Rewrite an entry inside the block being summarized.
    let edited = session.edit_entry(1, tok(40)).await.unwrap();
    assert_eq!(edited.value.token_count, 40);

    gate.release.notify_one();
    gate.started.notified().await;
    gate.release.notify_one();

    let outcome = trigger.await.unwrap().unwrap();
    assert_eq!(gate.inner.calls(), 2);
    let chunk = &outcome.snapshot.chunks[0];
    assert_eq!((chunk.start_ordinal, chunk.end_ordinal), (0, 1));
    // Only the second summary survived.
    assert!(chunk.summary.starts_with("s2"));
    assert!(gate.inner.requests()[1].text.contains("tok40"));
}

#[tokio::test]
async fn closing_discards_in_flight_result() {
    let gate = Arc::new(GatedSummarizer::new(3));
    let engine = engine(gate.clone());
    let session = primed(&engine, "doomed").await;

    let trigger = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.append_entry(tok(30), Author::Narrator).await })
    };
    gate.started.notified().await;

    assert!(session.close().await);
    gate.release.notify_one();

    let result = trigger.await.unwrap();
    assert!(matches!(result, Err(MemoryError::SessionClosed(_))));
    assert_eq!(gate.inner.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn summarizer_timeout_defers_promotion() {
    let engine = engine(Arc::new(SlowSummarizer {
        delay: Duration::from_secs(300),
    }));
    let session = primed(&engine, "slow").await;

    let outcome = session.append_entry(tok(30), Author::Narrator).await.unwrap();
    assert_eq!(outcome.deferred.len(), 1);
    assert_eq!(outcome.deferred[0].stage, CompressionStage::Promotion);
    assert!(outcome.deferred[0].reason.contains("timed out"));
    assert_eq!(outcome.snapshot.recent_history.len(), 4);
}

#[tokio::test]
async fn sessions_do_not_block_each_other() {
    let gate = Arc::new(GatedSummarizer::new(3));
    let registry = SessionRegistry::new(engine(gate.clone()));

    let busy = registry.create(SessionId::from("busy")).await.unwrap();
    for _ in 0..3 {
        busy.append_entry(tok(30), Author::Narrator).await.unwrap();
    }
    let trigger = {
        let busy = Arc::clone(&busy);
        tokio::spawn(async move { busy.append_entry(tok(30), Author::Narrator).await })
    };
    gate.started.notified().await;

    let idle = registry.create(SessionId::from("idle")).await.unwrap();
    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        idle.append_entry("meanwhile", Author::Player),
    )
    .await
    .expect("independent session was blocked")
    .unwrap();
    assert_eq!(outcome.value.ordinal, 0);
    let ctx = idle.build_prompt_context(100).await.unwrap();
    assert_eq!(ctx.render(), "# Recent Story:\nmeanwhile");

    gate.release.notify_one();
    trigger.await.unwrap().unwrap();
    assert_eq!(busy.stats().await.unwrap().active_tokenized_chunks, 1);
}
