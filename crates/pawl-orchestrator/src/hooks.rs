//! Lifecycle hooks around tool use.
//!
//! The dispatcher is the sole boundary between the deterministic core and
//! the agent runtime: the runtime reports tool lifecycle events, hooks
//! record side effects in session state or return a partial response the
//! runtime merges (a system message, a permission verdict). Hooks that do
//! not apply return an empty output; only genuine execution failures
//! propagate as errors.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use pawl_core::{PawlError, Phase, Result};
use pawl_session::SessionStore;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

/// Lifecycle events the dispatcher understands. `Custom` carries any other
/// event name, so callers can add events without touching this enum.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HookEvent {
    PreToolUse,
    PostToolUse,
    Stop,
    Custom(String),
}

impl fmt::Display for HookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookEvent::PreToolUse => write!(f, "PreToolUse"),
            HookEvent::PostToolUse => write!(f, "PostToolUse"),
            HookEvent::Stop => write!(f, "Stop"),
            HookEvent::Custom(name) => write!(f, "{}", name),
        }
    }
}

impl From<&str> for HookEvent {
    fn from(s: &str) -> Self {
        match s {
            "PreToolUse" => HookEvent::PreToolUse,
            "PostToolUse" => HookEvent::PostToolUse,
            "Stop" => HookEvent::Stop,
            other => HookEvent::Custom(other.to_string()),
        }
    }
}

/// Payload delivered to hooks: which tool ran (or is about to run), its
/// structured input, and the textual outcome for post-events.
#[derive(Debug, Clone, PartialEq)]
pub struct HookPayload {
    pub event: HookEvent,
    pub tool_name: Option<String>,
    pub tool_input: Value,
    pub tool_use_id: Option<String>,
    pub result: Option<String>,
    pub error: Option<String>,
}

impl HookPayload {
    pub fn new(event: HookEvent) -> Self {
        Self {
            event,
            tool_name: None,
            tool_input: Value::Null,
            tool_use_id: None,
            result: None,
            error: None,
        }
    }

    pub fn with_tool(mut self, name: impl Into<String>) -> Self {
        self.tool_name = Some(name.into());
        self
    }

    pub fn with_input(mut self, input: Value) -> Self {
        self.tool_input = input;
        self
    }

    pub fn with_tool_use_id(mut self, id: impl Into<String>) -> Self {
        self.tool_use_id = Some(id.into());
        self
    }

    pub fn with_result(mut self, result: impl Into<String>) -> Self {
        self.result = Some(result.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Permission verdict a pre-tool-use hook may return.
#[derive(Debug, Clone, PartialEq)]
pub enum PermissionDecision {
    Allow,
    Deny { reason: String },
}

/// Partial response a hook hands back to the caller. Empty means the hook
/// had nothing to say.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HookOutput {
    /// Message surfaced to the agent runtime.
    pub system_message: Option<String>,
    /// Verdict on the pending tool call.
    pub permission: Option<PermissionDecision>,
}

impl HookOutput {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_system_message(message: impl Into<String>) -> Self {
        Self {
            system_message: Some(message.into()),
            permission: None,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            system_message: None,
            permission: Some(PermissionDecision::Deny {
                reason: reason.into(),
            }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.system_message.is_none() && self.permission.is_none()
    }

    /// Folds another output into this one. Messages concatenate in arrival
    /// order; a deny verdict always wins over allow or absence.
    pub fn merge(&mut self, other: HookOutput) {
        if let Some(message) = other.system_message {
            match &mut self.system_message {
                Some(existing) => {
                    existing.push('\n');
                    existing.push_str(&message);
                }
                None => self.system_message = Some(message),
            }
        }
        match (&self.permission, other.permission) {
            (Some(PermissionDecision::Deny { .. }), _) => {}
            (_, Some(deny @ PermissionDecision::Deny { .. })) => {
                self.permission = Some(deny);
            }
            (None, Some(allow)) => self.permission = Some(allow),
            _ => {}
        }
    }
}

/// A lifecycle hook.
#[async_trait]
pub trait Hook: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    async fn run(&self, payload: &HookPayload) -> Result<HookOutput>;
}

/// One registration: an optional tool-name pattern plus the hooks to run
/// when it matches. No pattern matches every payload for the event.
pub struct HookMatcher {
    pattern: Option<Regex>,
    hooks: Vec<Arc<dyn Hook>>,
}

impl HookMatcher {
    pub fn pattern(&self) -> Option<&str> {
        self.pattern.as_ref().map(|re| re.as_str())
    }

    pub fn hook_names(&self) -> Vec<&str> {
        self.hooks.iter().map(|hook| hook.name()).collect()
    }

    fn matches(&self, tool_name: Option<&str>) -> bool {
        match (&self.pattern, tool_name) {
            (None, _) => true,
            (Some(re), Some(name)) => re.is_match(name),
            (Some(_), None) => false,
        }
    }
}

/// Registration table mapping lifecycle events to ordered matchers.
pub struct HookDispatcher {
    table: HashMap<HookEvent, Vec<HookMatcher>>,
}

impl HookDispatcher {
    /// Dispatcher with the three standard lifecycle events pre-registered
    /// and no hooks.
    pub fn new() -> Self {
        let mut table = HashMap::new();
        table.insert(HookEvent::PreToolUse, Vec::new());
        table.insert(HookEvent::PostToolUse, Vec::new());
        table.insert(HookEvent::Stop, Vec::new());
        Self { table }
    }

    /// Registers a hook for an event. `pattern` is a regex tested against
    /// the payload's tool name; `None` matches everything. Unknown events
    /// are created on first registration. An unparsable pattern is a
    /// caller error.
    pub fn add_hook(
        &mut self,
        event: HookEvent,
        hook: Arc<dyn Hook>,
        pattern: Option<&str>,
    ) -> Result<()> {
        let compiled = match pattern {
            Some(p) => Some(Regex::new(p).map_err(|e| PawlError::InvalidMatcher {
                pattern: p.to_string(),
                reason: e.to_string(),
            })?),
            None => None,
        };
        self.table.entry(event).or_default().push(HookMatcher {
            pattern: compiled,
            hooks: vec![hook],
        });
        Ok(())
    }

    /// The full registration table, for composition and tests.
    pub fn hooks(&self) -> &HashMap<HookEvent, Vec<HookMatcher>> {
        &self.table
    }

    /// Appends another dispatcher's registrations after this one's,
    /// preserving both registration orders.
    pub fn merge(&mut self, other: HookDispatcher) {
        for (event, matchers) in other.table {
            self.table.entry(event).or_default().extend(matchers);
        }
    }

    /// Runs the event's matchers in registration order and each matcher's
    /// hooks in array order, merging their outputs.
    pub async fn dispatch(&self, payload: &HookPayload) -> Result<HookOutput> {
        let mut merged = HookOutput::empty();
        let Some(matchers) = self.table.get(&payload.event) else {
            return Ok(merged);
        };
        for matcher in matchers {
            if !matcher.matches(payload.tool_name.as_deref()) {
                continue;
            }
            for hook in &matcher.hooks {
                let output = hook.run(payload).await?;
                if !output.is_empty() {
                    debug!(hook = hook.name(), event = %payload.event, "hook produced output");
                }
                merged.merge(output);
            }
        }
        Ok(merged)
    }

    /// Total number of registered matchers across all events.
    pub fn len(&self) -> usize {
        self.table.values().map(|matchers| matchers.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for HookDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Records file paths written by file-modifying tools, deduplicated, in
/// session state.
pub struct TrackFileChanges {
    store: SessionStore,
}

impl TrackFileChanges {
    pub fn new(store: SessionStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Hook for TrackFileChanges {
    fn name(&self) -> &str {
        "track_file_changes"
    }

    async fn run(&self, payload: &HookPayload) -> Result<HookOutput> {
        let tool = payload.tool_name.as_deref().unwrap_or("");
        if tool != "Write" && tool != "Edit" {
            return Ok(HookOutput::empty());
        }
        if let Some(path) = payload.tool_input.get("file_path").and_then(Value::as_str) {
            self.store.add_file_change(path).await?;
        }
        Ok(HookOutput::empty())
    }
}

/// Appends commit hashes to session state after a `git commit` runs.
///
/// Extraction is textual: the shell result must mention a commit and carry
/// a hex run. Hashes recorded this way are best-effort breadcrumbs, not
/// authority; decorated or quiet git output can evade the match.
pub struct TrackCommands {
    store: SessionStore,
}

impl TrackCommands {
    pub fn new(store: SessionStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Hook for TrackCommands {
    fn name(&self) -> &str {
        "track_commands"
    }

    async fn run(&self, payload: &HookPayload) -> Result<HookOutput> {
        if payload.tool_name.as_deref() != Some("Bash") {
            return Ok(HookOutput::empty());
        }
        let command = payload
            .tool_input
            .get("command")
            .and_then(Value::as_str)
            .unwrap_or("");
        if !command.contains("git commit") {
            return Ok(HookOutput::empty());
        }
        let Some(result) = payload.result.as_deref() else {
            return Ok(HookOutput::empty());
        };
        if !result.to_lowercase().contains("commit") {
            return Ok(HookOutput::empty());
        }
        if let Some(hash) = extract_commit_hash(result) {
            debug!(hash = %hash, "recording commit");
            self.store.add_commit(&hash).await?;
        }
        Ok(HookOutput::empty())
    }
}

/// First hex run of 7 to 40 characters in the text.
fn extract_commit_hash(text: &str) -> Option<String> {
    let re = Regex::new(r"\b([0-9a-f]{7,40})\b").ok()?;
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Flips the session to the complete phase and persists on the stop
/// event. A quiet no-op when no session is active.
pub struct SaveFinalState {
    store: SessionStore,
}

impl SaveFinalState {
    pub fn new(store: SessionStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Hook for SaveFinalState {
    fn name(&self) -> &str {
        "save_final_state"
    }

    async fn run(&self, _payload: &HookPayload) -> Result<HookOutput> {
        self.store.update_phase(Phase::Complete).await?;
        Ok(HookOutput::empty())
    }
}

/// The standard registration table: file-change tracking after edits,
/// commit tracking after shell commands, a final save on stop.
pub fn default_hooks(store: &SessionStore) -> Result<HookDispatcher> {
    let mut dispatcher = HookDispatcher::new();
    dispatcher.add_hook(
        HookEvent::PostToolUse,
        Arc::new(TrackFileChanges::new(store.clone())),
        Some("Edit|Write"),
    )?;
    dispatcher.add_hook(
        HookEvent::PostToolUse,
        Arc::new(TrackCommands::new(store.clone())),
        Some("Bash"),
    )?;
    dispatcher.add_hook(HookEvent::Stop, Arc::new(SaveFinalState::new(store.clone())), None)?;
    Ok(dispatcher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct CountingHook {
        count: Arc<Mutex<usize>>,
    }

    #[async_trait]
    impl Hook for CountingHook {
        fn name(&self) -> &str {
            "counting"
        }

        async fn run(&self, _payload: &HookPayload) -> Result<HookOutput> {
            *self.count.lock().unwrap() += 1;
            Ok(HookOutput::empty())
        }
    }

    struct LabelHook {
        label: &'static str,
        seen: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Hook for LabelHook {
        fn name(&self) -> &str {
            self.label
        }

        async fn run(&self, _payload: &HookPayload) -> Result<HookOutput> {
            self.seen.lock().unwrap().push(self.label.to_string());
            Ok(HookOutput::with_system_message(self.label))
        }
    }

    fn write_payload(path: &str) -> HookPayload {
        HookPayload::new(HookEvent::PostToolUse)
            .with_tool("Write")
            .with_input(serde_json::json!({ "file_path": path }))
    }

    #[tokio::test]
    async fn test_dispatch_respects_tool_pattern() {
        let count = Arc::new(Mutex::new(0));
        let mut dispatcher = HookDispatcher::new();
        dispatcher
            .add_hook(
                HookEvent::PostToolUse,
                Arc::new(CountingHook { count: count.clone() }),
                Some("Edit|Write"),
            )
            .unwrap();

        dispatcher.dispatch(&write_payload("a.rs")).await.unwrap();
        assert_eq!(*count.lock().unwrap(), 1);

        let bash = HookPayload::new(HookEvent::PostToolUse).with_tool("Bash");
        dispatcher.dispatch(&bash).await.unwrap();
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_without_pattern_matches_everything() {
        let count = Arc::new(Mutex::new(0));
        let mut dispatcher = HookDispatcher::new();
        dispatcher
            .add_hook(
                HookEvent::Stop,
                Arc::new(CountingHook { count: count.clone() }),
                None,
            )
            .unwrap();

        dispatcher
            .dispatch(&HookPayload::new(HookEvent::Stop))
            .await
            .unwrap();
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_unknown_event_is_empty() {
        let dispatcher = HookDispatcher::new();
        let payload = HookPayload::new(HookEvent::Custom("SessionPaused".to_string()));
        let output = dispatcher.dispatch(&payload).await.unwrap();
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_preserves_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher = HookDispatcher::new();
        for label in ["first", "second", "third"] {
            dispatcher
                .add_hook(
                    HookEvent::PostToolUse,
                    Arc::new(LabelHook {
                        label,
                        seen: seen.clone(),
                    }),
                    None,
                )
                .unwrap();
        }

        let output = dispatcher
            .dispatch(&HookPayload::new(HookEvent::PostToolUse).with_tool("Write"))
            .await
            .unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["first".to_string(), "second".to_string(), "third".to_string()]
        );
        assert_eq!(
            output.system_message.as_deref(),
            Some("first\nsecond\nthird")
        );
    }

    #[tokio::test]
    async fn test_merge_appends_after_existing() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut base = HookDispatcher::new();
        base.add_hook(
            HookEvent::PostToolUse,
            Arc::new(LabelHook {
                label: "base",
                seen: seen.clone(),
            }),
            None,
        )
        .unwrap();

        let mut extra = HookDispatcher::new();
        extra
            .add_hook(
                HookEvent::PostToolUse,
                Arc::new(LabelHook {
                    label: "extra",
                    seen: seen.clone(),
                }),
                None,
            )
            .unwrap();

        base.merge(extra);
        assert_eq!(base.len(), 2);
        base.dispatch(&HookPayload::new(HookEvent::PostToolUse).with_tool("Write"))
            .await
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["base".to_string(), "extra".to_string()]);
    }

    #[tokio::test]
    async fn test_invalid_pattern_is_rejected() {
        let count = Arc::new(Mutex::new(0));
        let mut dispatcher = HookDispatcher::new();
        let err = dispatcher
            .add_hook(
                HookEvent::PostToolUse,
                Arc::new(CountingHook { count }),
                Some("("),
            )
            .unwrap_err();
        assert!(matches!(err, PawlError::InvalidMatcher { .. }));
        assert!(err.is_misuse());
        assert!(dispatcher.is_empty());
    }

    #[test]
    fn test_output_merge_deny_wins() {
        let mut output = HookOutput::with_system_message("heads up");
        output.merge(HookOutput::deny("tests failed"));
        output.merge(HookOutput {
            system_message: None,
            permission: Some(PermissionDecision::Allow),
        });

        assert_eq!(output.system_message.as_deref(), Some("heads up"));
        assert!(matches!(
            output.permission,
            Some(PermissionDecision::Deny { .. })
        ));
    }

    #[test]
    fn test_hook_event_names_round_trip() {
        assert_eq!(HookEvent::from("PreToolUse"), HookEvent::PreToolUse);
        assert_eq!(HookEvent::from("Stop").to_string(), "Stop");
        let custom = HookEvent::from("SessionPaused");
        assert_eq!(custom, HookEvent::Custom("SessionPaused".to_string()));
        assert_eq!(custom.to_string(), "SessionPaused");
    }

    #[tokio::test]
    async fn test_track_file_changes_records_and_dedups() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path().join("state"));
        store.create("abc12345", "rust", "t").await.unwrap();

        let dispatcher = default_hooks(&store).unwrap();
        dispatcher.dispatch(&write_payload("src/lib.rs")).await.unwrap();
        dispatcher.dispatch(&write_payload("src/lib.rs")).await.unwrap();
        let edit = HookPayload::new(HookEvent::PostToolUse)
            .with_tool("Edit")
            .with_input(serde_json::json!({ "file_path": "src/queue.rs" }));
        dispatcher.dispatch(&edit).await.unwrap();

        let state = store.load().await.unwrap();
        assert_eq!(
            state.file_changes,
            vec!["src/lib.rs".to_string(), "src/queue.rs".to_string()]
        );
    }

    #[tokio::test]
    async fn test_track_file_changes_without_session_is_noop() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path().join("state"));
        let dispatcher = default_hooks(&store).unwrap();
        dispatcher.dispatch(&write_payload("src/lib.rs")).await.unwrap();
        assert!(store.load().await.is_none());
    }

    #[tokio::test]
    async fn test_track_commands_extracts_commit_hash() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path().join("state"));
        store.create("abc12345", "rust", "t").await.unwrap();

        let dispatcher = default_hooks(&store).unwrap();
        let payload = HookPayload::new(HookEvent::PostToolUse)
            .with_tool("Bash")
            .with_input(serde_json::json!({ "command": "git commit -m 'tidy'" }))
            .with_result("created commit 4f9d2c1 on main");
        dispatcher.dispatch(&payload).await.unwrap();

        let state = store.load().await.unwrap();
        assert_eq!(state.commits, vec!["4f9d2c1".to_string()]);
    }

    #[tokio::test]
    async fn test_track_commands_ignores_other_commands() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path().join("state"));
        store.create("abc12345", "rust", "t").await.unwrap();

        let dispatcher = default_hooks(&store).unwrap();
        let payload = HookPayload::new(HookEvent::PostToolUse)
            .with_tool("Bash")
            .with_input(serde_json::json!({ "command": "ls -la" }))
            .with_result("commit 4f9d2c1");
        dispatcher.dispatch(&payload).await.unwrap();

        assert!(store.load().await.unwrap().commits.is_empty());
    }

    #[tokio::test]
    async fn test_track_commands_needs_commit_in_result() {
        // Textual extraction: a result that never says "commit" is not
        // treated as one, even when it carries a hash-like run.
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path().join("state"));
        store.create("abc12345", "rust", "t").await.unwrap();

        let dispatcher = default_hooks(&store).unwrap();
        let payload = HookPayload::new(HookEvent::PostToolUse)
            .with_tool("Bash")
            .with_input(serde_json::json!({ "command": "git commit -m 'tidy'" }))
            .with_result("[main 4f9d2c1] tidy");
        dispatcher.dispatch(&payload).await.unwrap();

        assert!(store.load().await.unwrap().commits.is_empty());
    }

    #[tokio::test]
    async fn test_save_final_state_marks_complete() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path().join("state"));
        store.create("abc12345", "rust", "t").await.unwrap();

        let dispatcher = default_hooks(&store).unwrap();
        dispatcher
            .dispatch(&HookPayload::new(HookEvent::Stop))
            .await
            .unwrap();

        assert_eq!(store.load().await.unwrap().phase, Phase::Complete);
    }

    #[test]
    fn test_extract_commit_hash() {
        assert_eq!(
            extract_commit_hash("commit 4f9d2c1 pushed"),
            Some("4f9d2c1".to_string())
        );
        assert_eq!(
            extract_commit_hash("commit 4f9d2c1a4f9d2c1a4f9d2c1a4f9d2c1a4f9d2c1a done"),
            Some("4f9d2c1a4f9d2c1a4f9d2c1a4f9d2c1a4f9d2c1a".to_string())
        );
        assert_eq!(extract_commit_hash("nothing here"), None);
        // Too short to be a hash.
        assert_eq!(extract_commit_hash("commit abc123"), None);
    }
}
