//! Quality gates wired into the tool-use lifecycle.
//!
//! Two enforcement points: the lint gate runs after every file edit and
//! surfaces failures as a system message, and the test gate runs before
//! any `git commit` and denies the commit when tests fail. Profiles with
//! no gate configured skip both silently.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use pawl_core::{Profile, Result};
use pawl_gates::{run_configured_gate, GateExecutor};
use serde_json::Value;
use tracing::debug;

use crate::hooks::{Hook, HookDispatcher, HookEvent, HookOutput, HookPayload};

/// Runs the profile's lint gate after a file-modifying tool finishes.
/// Failures come back as a system message; the edit itself stands.
pub struct LintHook {
    profile: Profile,
    executor: Arc<dyn GateExecutor>,
    cwd: PathBuf,
}

impl LintHook {
    pub fn new(profile: Profile, executor: Arc<dyn GateExecutor>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            profile,
            executor,
            cwd: cwd.into(),
        }
    }
}

#[async_trait]
impl Hook for LintHook {
    fn name(&self) -> &str {
        "lint_gate"
    }

    async fn run(&self, payload: &HookPayload) -> Result<HookOutput> {
        let tool = payload.tool_name.as_deref().unwrap_or("");
        if tool != "Write" && tool != "Edit" {
            return Ok(HookOutput::empty());
        }
        let Some(config) = self.profile.gate("lint") else {
            return Ok(HookOutput::empty());
        };
        let result = run_configured_gate(self.executor.as_ref(), "lint", config, &self.cwd).await;
        if result.is_failed() {
            debug!(profile = %self.profile.name, "lint gate failed after edit");
            let detail = result.error.unwrap_or(result.output);
            return Ok(HookOutput::with_system_message(format!(
                "Lint failed:\n{}",
                detail
            )));
        }
        Ok(HookOutput::empty())
    }
}

/// Runs the profile's test gate before a `git commit` and denies the
/// commit when it fails. Other shell commands pass through untouched.
pub struct TestGuardHook {
    profile: Profile,
    executor: Arc<dyn GateExecutor>,
    cwd: PathBuf,
}

impl TestGuardHook {
    pub fn new(profile: Profile, executor: Arc<dyn GateExecutor>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            profile,
            executor,
            cwd: cwd.into(),
        }
    }
}

#[async_trait]
impl Hook for TestGuardHook {
    fn name(&self) -> &str {
        "test_guard"
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
        let Some(config) = self.profile.gate("test") else {
            return Ok(HookOutput::empty());
        };
        let result = run_configured_gate(self.executor.as_ref(), "test", config, &self.cwd).await;
        if result.is_failed() {
            debug!(profile = %self.profile.name, "test gate blocked a commit");
            let detail = result.error.unwrap_or(result.output);
            return Ok(HookOutput::deny(format!("Tests failed:\n{}", detail)));
        }
        Ok(HookOutput::empty())
    }
}

/// Gate enforcement registrations for a resolved profile.
pub fn gate_hooks(
    profile: &Profile,
    executor: Arc<dyn GateExecutor>,
    cwd: &Path,
) -> Result<HookDispatcher> {
    let mut dispatcher = HookDispatcher::new();
    dispatcher.add_hook(
        HookEvent::PostToolUse,
        Arc::new(LintHook::new(profile.clone(), executor.clone(), cwd)),
        Some("Write|Edit"),
    )?;
    dispatcher.add_hook(
        HookEvent::PreToolUse,
        Arc::new(TestGuardHook::new(profile.clone(), executor, cwd)),
        Some("Bash"),
    )?;
    Ok(dispatcher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::PermissionDecision;
    use pawl_core::ProfileResolver;
    use pawl_gates::{CommandOutput, MockGateExecutor};

    fn python_profile() -> Profile {
        ProfileResolver::new().load("python").unwrap()
    }

    fn edit_payload() -> HookPayload {
        HookPayload::new(HookEvent::PostToolUse)
            .with_tool("Edit")
            .with_input(serde_json::json!({ "file_path": "app.py" }))
    }

    fn commit_payload() -> HookPayload {
        HookPayload::new(HookEvent::PreToolUse)
            .with_tool("Bash")
            .with_input(serde_json::json!({ "command": "git commit -m 'tidy'" }))
    }

    #[tokio::test]
    async fn test_lint_failure_becomes_system_message() {
        let executor = Arc::new(
            MockGateExecutor::new()
                .with_response("ruff check .", CommandOutput::new("", "E501 line too long", false)),
        );
        let hook = LintHook::new(python_profile(), executor, "/tmp");

        let output = hook.run(&edit_payload()).await.unwrap();
        let message = output.system_message.unwrap();
        assert!(message.starts_with("Lint failed:"));
        assert!(message.contains("E501"));
        assert!(output.permission.is_none());
    }

    #[tokio::test]
    async fn test_lint_pass_is_silent() {
        let executor = Arc::new(
            MockGateExecutor::new().with_response("ruff check .", CommandOutput::new("", "", true)),
        );
        let hook = LintHook::new(python_profile(), executor, "/tmp");

        let output = hook.run(&edit_payload()).await.unwrap();
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn test_lint_skips_unconfigured_profile() {
        // The general profile configures no gates, so nothing runs and the
        // mock never sees a command.
        let executor = Arc::new(MockGateExecutor::new());
        let hook = LintHook::new(Profile::new("general"), executor, "/tmp");

        let output = hook.run(&edit_payload()).await.unwrap();
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn test_lint_ignores_other_tools() {
        let executor = Arc::new(MockGateExecutor::new());
        let hook = LintHook::new(python_profile(), executor, "/tmp");

        let payload = HookPayload::new(HookEvent::PostToolUse).with_tool("Bash");
        let output = hook.run(&payload).await.unwrap();
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn test_guard_denies_commit_when_tests_fail() {
        let executor = Arc::new(
            MockGateExecutor::new()
                .with_response("pytest", CommandOutput::new("1 failed, 3 passed", "", false)),
        );
        let hook = TestGuardHook::new(python_profile(), executor, "/tmp");

        let output = hook.run(&commit_payload()).await.unwrap();
        match output.permission {
            Some(PermissionDecision::Deny { reason }) => {
                assert!(reason.starts_with("Tests failed:"));
                assert!(reason.contains("1 failed"));
            }
            other => panic!("expected deny, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_guard_allows_commit_when_tests_pass() {
        let executor = Arc::new(
            MockGateExecutor::new()
                .with_response("pytest", CommandOutput::new("4 passed", "", true)),
        );
        let hook = TestGuardHook::new(python_profile(), executor, "/tmp");

        let output = hook.run(&commit_payload()).await.unwrap();
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn test_guard_ignores_non_commit_commands() {
        let executor = Arc::new(MockGateExecutor::new());
        let hook = TestGuardHook::new(python_profile(), executor, "/tmp");

        let payload = HookPayload::new(HookEvent::PreToolUse)
            .with_tool("Bash")
            .with_input(serde_json::json!({ "command": "git status" }));
        let output = hook.run(&payload).await.unwrap();
        assert!(output.is_empty());
    }

    #[tokio::test]
    async fn test_gate_hooks_dispatch_through_matchers() {
        let executor: Arc<dyn GateExecutor> = Arc::new(
            MockGateExecutor::new()
                .with_response("ruff check .", CommandOutput::new("", "E501", false))
                .with_response("pytest", CommandOutput::new("2 passed", "", true)),
        );
        let dispatcher = gate_hooks(&python_profile(), executor, Path::new("/tmp")).unwrap();

        let output = dispatcher.dispatch(&edit_payload()).await.unwrap();
        assert!(output.system_message.unwrap().contains("E501"));

        let output = dispatcher.dispatch(&commit_payload()).await.unwrap();
        assert!(output.is_empty());
    }
}
