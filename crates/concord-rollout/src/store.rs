//! Rollout state persistence
//!
//! The state is a single JSON document; history is an append-only
//! JSON-lines log of hash-chained audit events.

use crate::stage::RolloutState;
use async_trait::async_trait;
use concord_core::{Error, Result};
use concord_telemetry::AuditEvent;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

const STATE_FILE: &str = "state.json";
const HISTORY_FILE: &str = "history.jsonl";

/// Durable storage for the rollout state and its audit history
#[async_trait]
pub trait RolloutStore: Send + Sync {
    /// Last committed state, `None` if nothing was ever stored
    async fn load_state(&self) -> Result<Option<RolloutState>>;

    /// Every stored audit event, oldest first
    async fn load_history(&self) -> Result<Vec<AuditEvent>>;

    /// Persist a new state together with the event that produced it
    async fn commit(&self, state: &RolloutState, event: &AuditEvent) -> Result<()>;
}

/// In-memory store
#[derive(Default)]
pub struct MemoryRolloutStore {
    state: Mutex<Option<RolloutState>>,
    history: Mutex<Vec<AuditEvent>>,
    fail_writes: AtomicBool,
}

impl MemoryRolloutStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following commit fail (for exercising error paths)
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    /// Number of stored events
    pub fn history_len(&self) -> usize {
        self.history.lock().len()
    }
}

#[async_trait]
impl RolloutStore for MemoryRolloutStore {
    async fn load_state(&self) -> Result<Option<RolloutState>> {
        Ok(self.state.lock().clone())
    }

    async fn load_history(&self) -> Result<Vec<AuditEvent>> {
        Ok(self.history.lock().clone())
    }

    async fn commit(&self, state: &RolloutState, event: &AuditEvent) -> Result<()> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(Error::persistence("store is read-only"));
        }
        self.history.lock().push(event.clone());
        *self.state.lock() = Some(state.clone());
        Ok(())
    }
}

/// File store: `state.json` plus `history.jsonl` in one directory.
///
/// A commit writes the new state to a temp file, appends the event to the
/// history, then renames the temp file over `state.json`. If the rename
/// fails the history is truncated back to its previous length. A crash
/// between the last two steps leaves history one step ahead of the state,
/// which the controller repairs on load.
#[derive(Debug, Clone)]
pub struct FileRolloutStore {
    dir: PathBuf,
}

impl FileRolloutStore {
    /// Open (and create if needed) a store directory
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::persistence(format!("failed to create {:?}: {}", dir, e)))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    fn history_path(&self) -> PathBuf {
        self.dir.join(HISTORY_FILE)
    }

    /// Append one event and return the history length before the append
    async fn append_history(&self, event: &AuditEvent) -> Result<u64> {
        let mut line = serde_json::to_string(event)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.history_path())
            .await
            .map_err(|e| Error::persistence(format!("failed to open history: {}", e)))?;
        let prev_len = file
            .metadata()
            .await
            .map_err(|e| Error::persistence(format!("failed to stat history: {}", e)))?
            .len();

        let written = async {
            file.write_all(line.as_bytes()).await?;
            file.sync_data().await
        }
        .await;
        if let Err(e) = written {
            if let Err(undo) = Self::truncate(&file, prev_len).await {
                warn!("Failed to drop partial history line: {}", undo);
            }
            return Err(Error::persistence(format!("failed to append history: {}", e)));
        }
        Ok(prev_len)
    }

    /// Cut the history back to `len` bytes
    async fn truncate_history(&self, len: u64) -> std::io::Result<()> {
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .open(self.history_path())
            .await?;
        Self::truncate(&file, len).await
    }

    async fn truncate(file: &tokio::fs::File, len: u64) -> std::io::Result<()> {
        file.set_len(len).await?;
        file.sync_data().await
    }
}

#[async_trait]
impl RolloutStore for FileRolloutStore {
    async fn load_state(&self) -> Result<Option<RolloutState>> {
        match tokio::fs::read(self.state_path()).await {
            Ok(bytes) => {
                let state = serde_json::from_slice(&bytes)
                    .map_err(|e| Error::persistence(format!("corrupt rollout state: {}", e)))?;
                Ok(Some(state))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::persistence(format!("failed to read rollout state: {}", e))),
        }
    }

    async fn load_history(&self) -> Result<Vec<AuditEvent>> {
        let content = match tokio::fs::read_to_string(self.history_path()).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::persistence(format!("failed to read history: {}", e))),
        };

        let mut events = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(event) => events.push(event),
                Err(e) => {
                    return Err(Error::persistence(format!(
                        "corrupt history line {}: {}",
                        line_no + 1,
                        e
                    )))
                }
            }
        }
        debug!("Loaded {} rollout history events", events.len());
        Ok(events)
    }

    async fn commit(&self, state: &RolloutState, event: &AuditEvent) -> Result<()> {
        let tmp = self.dir.join(format!("{}.tmp", STATE_FILE));
        let json = serde_json::to_vec_pretty(state)?;
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| Error::persistence(format!("failed to write rollout state: {}", e)))?;

        let prev_len = match self.append_history(event).await {
            Ok(len) => len,
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_file(&tmp).await {
                    warn!("Failed to remove temp state file: {}", cleanup);
                }
                return Err(e);
            }
        };

        if let Err(e) = tokio::fs::rename(&tmp, self.state_path()).await {
            // Drop the event again so history never runs ahead of a failed commit
            if let Err(undo) = self.truncate_history(prev_len).await {
                warn!("Failed to roll back history after failed commit: {}", undo);
            }
            if let Err(cleanup) = tokio::fs::remove_file(&tmp).await {
                warn!("Failed to remove temp state file: {}", cleanup);
            }
            return Err(Error::persistence(format!(
                "failed to replace rollout state: {}",
                e
            )));
        }
        Ok(())
    }
}
