//! Core data types for the pawl orchestration loop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Phase of the orchestration loop.
///
/// `Complete` and `Error` are terminal: once a session reaches either, no
/// further transitions are accepted and the session is archived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Init,
    Understand,
    Plan,
    Execute,
    Verify,
    Commit,
    Evaluate,
    Complete,
    Error,
}

impl Phase {
    /// True for phases that end the session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Complete | Phase::Error)
    }

    /// Phases reachable from this one. `Error` is additionally reachable
    /// from every non-terminal phase and is not listed here.
    pub fn valid_transitions(&self) -> &'static [Phase] {
        match self {
            Phase::Init => &[Phase::Understand],
            Phase::Understand => &[Phase::Plan],
            Phase::Plan => &[Phase::Execute],
            Phase::Execute => &[Phase::Verify, Phase::Execute],
            Phase::Verify => &[Phase::Commit, Phase::Execute],
            Phase::Commit => &[Phase::Evaluate],
            Phase::Evaluate => &[Phase::Complete, Phase::Plan, Phase::Execute],
            Phase::Complete | Phase::Error => &[],
        }
    }

    /// Whether a direct transition to `next` is allowed.
    pub fn can_transition_to(&self, next: Phase) -> bool {
        if next == Phase::Error {
            return !self.is_terminal();
        }
        self.valid_transitions().contains(&next)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Init => "init",
            Phase::Understand => "understand",
            Phase::Plan => "plan",
            Phase::Execute => "execute",
            Phase::Verify => "verify",
            Phase::Commit => "commit",
            Phase::Evaluate => "evaluate",
            Phase::Complete => "complete",
            Phase::Error => "error",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "init" => Ok(Phase::Init),
            "understand" => Ok(Phase::Understand),
            "plan" => Ok(Phase::Plan),
            "execute" => Ok(Phase::Execute),
            "verify" => Ok(Phase::Verify),
            "commit" => Ok(Phase::Commit),
            "evaluate" => Ok(Phase::Evaluate),
            "complete" => Ok(Phase::Complete),
            "error" => Ok(Phase::Error),
            _ => Err(format!("Invalid phase: {}", s)),
        }
    }
}

/// Status of a task in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Blocked,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Blocked => "blocked",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "in_progress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            "blocked" => Ok(TaskStatus::Blocked),
            _ => Err(format!("Invalid task status: {}", s)),
        }
    }
}

/// Outcome status of a quality gate run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GateStatus {
    #[default]
    Pending,
    Passed,
    Failed,
    Skipped,
}

impl fmt::Display for GateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GateStatus::Pending => "pending",
            GateStatus::Passed => "passed",
            GateStatus::Failed => "failed",
            GateStatus::Skipped => "skipped",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for GateStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(GateStatus::Pending),
            "passed" => Ok(GateStatus::Passed),
            "failed" => Ok(GateStatus::Failed),
            "skipped" => Ok(GateStatus::Skipped),
            _ => Err(format!("Invalid gate status: {}", s)),
        }
    }
}

/// Task priority. Lower values sort first, so ordering a slice of tasks by
/// priority puts critical work at the front.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical = 0,
    High = 1,
    #[default]
    Medium = 2,
    Low = 3,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "critical" => Ok(Priority::Critical),
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            _ => Err(format!("Invalid priority: {}", s)),
        }
    }
}

/// A unit of work tracked by the loop.
///
/// `blocked_by` and `blocks` hold task ids and together describe a
/// dependency DAG. Tasks are never removed once added, only marked
/// completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub subject: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub blocked_by: Vec<String>,
    #[serde(default)]
    pub blocks: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Task {
    pub fn new(id: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            subject: subject.into(),
            description: String::new(),
            status: TaskStatus::default(),
            priority: Priority::default(),
            blocked_by: Vec::new(),
            blocks: Vec::new(),
            created_at: Utc::now(),
            completed_at: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Adds a dependency: this task stays pending until `id` completes.
    pub fn with_dependency(mut self, id: impl Into<String>) -> Self {
        self.blocked_by.push(id.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}

/// Result of running (or skipping) a single quality gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateResult {
    pub name: String,
    pub status: GateStatus,
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub duration_ms: u64,
}

impl GateResult {
    pub fn passed(
        name: impl Into<String>,
        command: impl Into<String>,
        output: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            name: name.into(),
            status: GateStatus::Passed,
            command: command.into(),
            output: output.into(),
            error: None,
            duration_ms,
        }
    }

    pub fn failed(
        name: impl Into<String>,
        command: impl Into<String>,
        output: impl Into<String>,
        error: Option<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            name: name.into(),
            status: GateStatus::Failed,
            command: command.into(),
            output: output.into(),
            error,
            duration_ms,
        }
    }

    /// A gate that was not configured for the active profile. Skipping is
    /// not a failure.
    pub fn skipped(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: GateStatus::Skipped,
            command: String::new(),
            output: reason.into(),
            error: None,
            duration_ms: 0,
        }
    }

    pub fn is_passed(&self) -> bool {
        self.status == GateStatus::Passed
    }

    pub fn is_failed(&self) -> bool {
        self.status == GateStatus::Failed
    }
}

/// Aggregate view over the most recent gate results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub all_blocking_passed: bool,
    pub gates: BTreeMap<String, GateStatus>,
}

/// Durable state of one orchestration session.
///
/// `commits` and `file_changes` are append-only; `file_changes` is
/// deduplicated. `last_updated` is refreshed on every write and `iteration`
/// never decreases over the life of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub phase: Phase,
    pub iteration: u32,
    #[serde(default)]
    pub profile: String,
    #[serde(default)]
    pub task: String,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub gates: BTreeMap<String, GateResult>,
    #[serde(default)]
    pub commits: Vec<String>,
    #[serde(default)]
    pub file_changes: Vec<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl SessionState {
    pub fn new(
        session_id: impl Into<String>,
        profile: impl Into<String>,
        task: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            started_at: now,
            last_updated: now,
            phase: Phase::Init,
            iteration: 1,
            profile: profile.into(),
            task: task.into(),
            tasks: Vec::new(),
            gates: BTreeMap::new(),
            commits: Vec::new(),
            file_changes: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }
}

/// One row of session history, as listed from the archive directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub task: String,
    pub started_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub profile: String,
}

/// Snapshot of loop progress, reported after each advance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopResult {
    pub success: bool,
    pub session_id: String,
    pub phase: Phase,
    pub iteration: u32,
    pub tasks_completed: usize,
    pub tasks_remaining: usize,
    pub all_blocking_passed: bool,
    pub last_commit: Option<String>,
    pub message: String,
}
