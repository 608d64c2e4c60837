//! File-backed session state.
//!
//! One pretty-printed JSON document per active session at
//! `<state_dir>/session.json`; archived sessions live under
//! `<state_dir>/history/<session_id>.json`. Writes replace the active file
//! atomically via a temp file and rename.

use std::path::{Path, PathBuf};

use chrono::Utc;
use pawl_core::{GateResult, Phase, Result, SessionState, SessionSummary, Task};
use tracing::{debug, info, instrument, warn};

const STATE_FILE: &str = "session.json";
const HISTORY_DIR: &str = "history";

/// Default state directory, relative to the project root.
pub const DEFAULT_STATE_DIR: &str = ".pawl/state";

/// Store for the active session plus its archived history.
///
/// Single-writer: the store serializes nothing across processes. Exactly
/// one orchestrator may hold an active session; concurrent writers to the
/// same state directory are a caller error.
#[derive(Debug, Clone)]
pub struct SessionStore {
    state_dir: PathBuf,
}

impl SessionStore {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn state_file(&self) -> PathBuf {
        self.state_dir.join(STATE_FILE)
    }

    fn history_dir(&self) -> PathBuf {
        self.state_dir.join(HISTORY_DIR)
    }

    async fn ensure_dirs(&self) -> Result<()> {
        tokio::fs::create_dir_all(self.history_dir()).await?;
        Ok(())
    }

    /// Creates a new session and persists it immediately: phase `init`,
    /// iteration 1, empty collections.
    #[instrument(skip(self, task))]
    pub async fn create(
        &self,
        session_id: &str,
        profile: &str,
        task: &str,
    ) -> Result<SessionState> {
        let mut state = SessionState::new(session_id, profile, task);
        self.save(&mut state).await?;
        info!(session = session_id, profile, "session created");
        Ok(state)
    }

    /// Persists the state, stamping `last_updated` first.
    #[instrument(skip(self, state), fields(session = %state.session_id))]
    pub async fn save(&self, state: &mut SessionState) -> Result<()> {
        self.ensure_dirs().await?;
        state.last_updated = Utc::now();
        let json = serde_json::to_string_pretty(state)?;
        let path = self.state_file();
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(phase = %state.phase, iteration = state.iteration, "session saved");
        Ok(())
    }

    /// Loads the active session. Absence is `None`; an unreadable or
    /// corrupt file is also `None`, with a warning, so a damaged state file
    /// never wedges the loop.
    pub async fn load(&self) -> Option<SessionState> {
        let path = self.state_file();
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "failed to read session state");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(state) => Some(state),
            Err(e) => {
                warn!(file = %path.display(), error = %e, "corrupt session state");
                None
            }
        }
    }

    /// Id of the active session, if any.
    pub async fn load_session_id(&self) -> Option<String> {
        self.load().await.map(|state| state.session_id)
    }

    /// Archives the active session into the history directory, then
    /// removes the active file. Archiving precedes removal unconditionally,
    /// so no state is ever lost to a bare delete. A no-op when no session
    /// is active.
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<()> {
        let Some(state) = self.load().await else {
            return Ok(());
        };
        self.ensure_dirs().await?;
        let archive = self
            .history_dir()
            .join(format!("{}.json", state.session_id));
        tokio::fs::copy(self.state_file(), &archive).await?;
        tokio::fs::remove_file(self.state_file()).await?;
        info!(session = %state.session_id, "session archived");
        Ok(())
    }

    // Read-modify-write helper shared by the conveniences below; a quiet
    // no-op when no session is active.
    async fn with_session<F>(&self, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut SessionState),
    {
        match self.load().await {
            Some(mut state) => {
                mutate(&mut state);
                self.save(&mut state).await
            }
            None => Ok(()),
        }
    }

    pub async fn update_phase(&self, phase: Phase) -> Result<()> {
        self.with_session(|state| state.phase = phase).await
    }

    /// Iteration only ever moves forward.
    pub async fn increment_iteration(&self) -> Result<()> {
        self.with_session(|state| state.iteration += 1).await
    }

    /// Appends to the commit history. Commits are append-only.
    pub async fn add_commit(&self, hash: &str) -> Result<()> {
        let hash = hash.to_string();
        self.with_session(move |state| state.commits.push(hash))
            .await
    }

    /// Records a changed file once; already-recorded paths are ignored.
    pub async fn add_file_change(&self, path: &str) -> Result<()> {
        let path = path.to_string();
        self.with_session(move |state| {
            if !state.file_changes.contains(&path) {
                state.file_changes.push(path);
            }
        })
        .await
    }

    /// Records the latest result for one gate.
    pub async fn update_gate(&self, result: GateResult) -> Result<()> {
        self.with_session(move |state| {
            state.gates.insert(result.name.clone(), result);
        })
        .await
    }

    /// Replaces the persisted task snapshot with the queue's current view.
    pub async fn update_tasks(&self, tasks: Vec<Task>) -> Result<()> {
        self.with_session(move |state| state.tasks = tasks).await
    }

    pub async fn set_metadata(&self, key: &str, value: serde_json::Value) -> Result<()> {
        let key = key.to_string();
        self.with_session(move |state| {
            state.metadata.insert(key, value);
        })
        .await
    }

    /// Archived session summaries, newest first. Entries that fail to
    /// parse are skipped with a warning.
    #[instrument(skip(self))]
    pub async fn list_history(&self) -> Result<Vec<SessionSummary>> {
        let dir = self.history_dir();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut summaries = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw = match tokio::fs::read_to_string(&path).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "skipping unreadable archive");
                    continue;
                }
            };
            match serde_json::from_str::<SessionState>(&raw) {
                Ok(state) => summaries.push(SessionSummary {
                    session_id: state.session_id,
                    task: state.task,
                    started_at: state.started_at,
                    last_updated: state.last_updated,
                    profile: state.profile,
                }),
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "skipping corrupt archive");
                }
            }
        }
        summaries.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(summaries)
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_STATE_DIR)
    }
}
