//! Shell execution seam for quality gates.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use pawl_core::{PawlError, Result};
use tracing::instrument;

/// Captured output of a gate command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
}

impl CommandOutput {
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>, success: bool) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            success,
        }
    }
}

impl From<std::process::Output> for CommandOutput {
    fn from(output: std::process::Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
        }
    }
}

/// Runs gate commands. The indirection keeps the engine and the gate hooks
/// testable without spawning real processes.
#[async_trait]
pub trait GateExecutor: Send + Sync {
    async fn run(&self, command: &str, cwd: &Path) -> Result<CommandOutput>;
}

/// Real executor backed by `sh -c`.
#[derive(Debug, Clone, Default)]
pub struct ShellExecutor;

impl ShellExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl GateExecutor for ShellExecutor {
    #[instrument(skip(self), fields(cwd = %cwd.display()))]
    async fn run(&self, command: &str, cwd: &Path) -> Result<CommandOutput> {
        // kill_on_drop reaps the child when a timeout abandons this future.
        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(cwd)
            .kill_on_drop(true)
            .output()
            .await?;
        Ok(output.into())
    }
}

/// Mock executor with canned responses keyed by command string.
#[derive(Debug, Clone, Default)]
pub struct MockGateExecutor {
    responses: HashMap<String, CommandOutput>,
}

impl MockGateExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(mut self, command: &str, output: CommandOutput) -> Self {
        self.responses.insert(command.to_string(), output);
        self
    }
}

#[async_trait]
impl GateExecutor for MockGateExecutor {
    async fn run(&self, command: &str, _cwd: &Path) -> Result<CommandOutput> {
        self.responses
            .get(command)
            .cloned()
            .ok_or_else(|| PawlError::Other(format!("No mock response for command: {}", command)))
    }
}
