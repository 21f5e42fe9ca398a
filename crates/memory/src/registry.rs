//! Live sessions by id. Sessions share nothing but the engine.

use crate::engine::MemoryEngine;
use crate::session::MemorySession;
use crate::tiers::MemorySnapshot;
use chronicle_core::{MemoryError, SessionId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

pub struct SessionRegistry {
    engine: Arc<MemoryEngine>,
    sessions: RwLock<HashMap<SessionId, Arc<MemorySession>>>,
}

impl SessionRegistry {
    pub fn new(engine: Arc<MemoryEngine>) -> Self {
        Self {
            engine,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn engine(&self) -> &Arc<MemoryEngine> {
        &self.engine
    }

    /// Register a fresh, empty session.
    pub async fn create(&self, id: SessionId) -> Result<Arc<MemorySession>, MemoryError> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&id) {
            return Err(MemoryError::SessionExists(id.to_string()));
        }
        let session = Arc::new(self.engine.open_session(id.clone()));
        sessions.insert(id.clone(), Arc::clone(&session));
        info!(session = %id, "Session created");
        Ok(session)
    }

    /// Register a session rebuilt from persisted state.
    pub async fn restore(
        &self,
        id: SessionId,
        snapshot: MemorySnapshot,
    ) -> Result<Arc<MemorySession>, MemoryError> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&id) {
            return Err(MemoryError::SessionExists(id.to_string()));
        }
        let session = Arc::new(self.engine.restore_session(id.clone(), snapshot)?);
        sessions.insert(id.clone(), Arc::clone(&session));
        info!(session = %id, "Session restored");
        Ok(session)
    }

    pub async fn get(&self, id: &SessionId) -> Result<Arc<MemorySession>, MemoryError> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| MemoryError::SessionNotFound(id.to_string()))
    }

    pub async fn get_or_create(&self, id: SessionId) -> Arc<MemorySession> {
        if let Some(session) = self.sessions.read().await.get(&id) {
            return Arc::clone(session);
        }
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .entry(id.clone())
            .or_insert_with(|| Arc::new(self.engine.open_session(id)));
        Arc::clone(session)
    }

    /// Unregister and close a session. Handles still held elsewhere see
    /// `SessionClosed` from then on.
    pub async fn remove(&self, id: &SessionId) -> Result<(), MemoryError> {
        let session = self
            .sessions
            .write()
            .await
            .remove(id)
            .ok_or_else(|| MemoryError::SessionNotFound(id.to_string()))?;
        session.close().await;
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Registered ids, sorted.
    pub async fn ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedSummarizer, WordTokenizer};
    use chronicle_config::MemoryConfig;
    use chronicle_core::Author;

    fn registry() -> SessionRegistry {
        let engine = MemoryEngine::new(
            MemoryConfig::default(),
            Arc::new(WordTokenizer::new()),
            Arc::new(ScriptedSummarizer::new(2)),
        )
        .unwrap();
        SessionRegistry::new(Arc::new(engine))
    }

    #[tokio::test]
    async fn create_get_remove() {
        let registry = registry();
        let id = SessionId::from("game-1");
        let session = registry.create(id.clone()).await.unwrap();
        session.append_entry("hello", Author::Player).await.unwrap();

        assert!(matches!(
            registry.create(id.clone()).await,
            Err(MemoryError::SessionExists(_))
        ));
        let fetched = registry.get(&id).await.unwrap();
        assert_eq!(fetched.snapshot().await.unwrap().recent_history.len(), 1);

        registry.remove(&id).await.unwrap();
        assert!(registry.get(&id).await.unwrap_err().is_not_found());
        assert!(session.is_closed().await);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn sessions_are_independent() {
        let registry = registry();
        let a = registry.get_or_create(SessionId::from("a")).await;
        let b = registry.get_or_create(SessionId::from("b")).await;
        a.append_entry("one two", Author::Player).await.unwrap();
        assert!(b.snapshot().await.unwrap().recent_history.is_empty());
        assert_eq!(registry.ids().await, vec![SessionId::from("a"), SessionId::from("b")]);

        let again = registry.get_or_create(SessionId::from("a")).await;
        assert!(Arc::ptr_eq(&a, &again));
    }

    #[tokio::test]
    async fn restore_rejects_bad_snapshot() {
        let registry = registry();
        let snapshot = MemorySnapshot {
            recent_history: vec![chronicle_core::HistoryEntry {
                ordinal: 3,
                text: "gap".into(),
                token_count: 1,
                author: Author::Narrator,
            }],
            ..MemorySnapshot::default()
        };
        let err = registry
            .restore(SessionId::from("broken"), snapshot)
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::OrdinalConflict(_)));
        assert_eq!(registry.len().await, 0);
    }
}
