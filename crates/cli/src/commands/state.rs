//! The JSON state file: one session's memory snapshot plus its id.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use chronicle_core::SessionId;
use chronicle_memory::{MemoryEngine, MemorySession, MemorySnapshot};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Bumped when the file layout changes incompatibly.
pub const STATE_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateFile {
    pub version: u32,
    pub session: SessionId,
    pub saved_at: DateTime<Utc>,
    pub memory: MemorySnapshot,
}

impl StateFile {
    pub fn new(session: SessionId, memory: MemorySnapshot) -> Self {
        Self {
            version: STATE_VERSION,
            session,
            saved_at: Utc::now(),
            memory,
        }
    }

    pub async fn load_json(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = tokio::fs::read_to_string(path).await?;
        let saved: Self = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse state file {}: {e}", path.display()))?;

        if saved.version != STATE_VERSION {
            return Err(format!(
                "State file version mismatch: expected {STATE_VERSION}, found {}",
                saved.version
            )
            .into());
        }
        Ok(saved)
    }

    /// Write through a sibling temp file so a crash never leaves a torn file.
    pub async fn save_json(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        let content = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

/// Open the session stored at `path`, or a fresh one if the file is absent.
pub async fn open_session(
    engine: &Arc<MemoryEngine>,
    path: &Path,
) -> Result<MemorySession, Box<dyn std::error::Error>> {
    if !path.exists() {
        let session = engine.open_session(SessionId::new());
        info!(session = %session.id(), path = %path.display(), "Starting new session");
        return Ok(session);
    }
    let saved = StateFile::load_json(path).await?;
    Ok(engine.restore_session(saved.session, saved.memory)?)
}

pub async fn save_session(
    session: &MemorySession,
    path: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let snapshot = session.snapshot().await?;
    StateFile::new(session.id().clone(), snapshot)
        .save_json(path)
        .await
}
