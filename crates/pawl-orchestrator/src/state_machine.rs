//! Pure phase state machine for the orchestration loop.
//!
//! Design principles:
//! - `transition` is a pure function: no I/O, no clocks, no randomness.
//!   The driver owns every side effect and executes the returned actions.
//! - Invalid (phase, event) pairs land in the error phase instead of
//!   panicking; the driver surfaces them as a caller error.
//! - Terminal phases absorb every event and emit no actions.

use pawl_core::Phase;

/// Events that drive the loop. The first group is reported by the caller;
/// the second group is derived by the driver from gate and queue state and
/// fed back through the same transition function.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopEvent {
    /// Repository context has been loaded; understanding begins.
    ContextLoaded,
    /// Scope and approach are assessed; planning begins.
    ScopeAssessed,
    /// The task queue holds a validated plan; execution begins.
    PlanReady,
    /// A unit of work was applied. `more: true` stays in execute,
    /// `more: false` moves to verification.
    WorkApplied { more: bool },
    /// The work was committed; evaluation begins.
    CommitRecorded { hash: Option<String> },
    /// The caller hit an unrecoverable problem.
    Fault { reason: String },

    /// Derived: every blocking gate passed.
    GatesPassed,
    /// Derived: at least one blocking gate did not pass.
    GatesFailed,
    /// Derived: all tasks complete and blocking gates green.
    AllWorkDone,
    /// Derived: runnable or in-flight work remains.
    WorkRemaining,
    /// Derived: pending tasks exist but none are runnable.
    PlanExhausted,
}

impl LoopEvent {
    /// Short name for logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            LoopEvent::ContextLoaded => "context_loaded",
            LoopEvent::ScopeAssessed => "scope_assessed",
            LoopEvent::PlanReady => "plan_ready",
            LoopEvent::WorkApplied { .. } => "work_applied",
            LoopEvent::CommitRecorded { .. } => "commit_recorded",
            LoopEvent::Fault { .. } => "fault",
            LoopEvent::GatesPassed => "gates_passed",
            LoopEvent::GatesFailed => "gates_failed",
            LoopEvent::AllWorkDone => "all_work_done",
            LoopEvent::WorkRemaining => "work_remaining",
            LoopEvent::PlanExhausted => "plan_exhausted",
        }
    }
}

/// Side effects the driver must perform for a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Validate the task queue before execution starts.
    ValidatePlan,
    /// Run every blocking gate and fold the outcome back into the loop.
    RunBlockingGates,
    /// Evaluate queue and gate state and fold the outcome back into the
    /// loop.
    EvaluateProgress,
    /// Record a commit hash in session state.
    RecordCommit(String),
    /// One more trip around the loop; subject to the iteration bound.
    IncrementIteration,
    /// The session is finished; archive it after the final save.
    ArchiveSession,
}

/// Applies one event to a phase, returning the next phase and the actions
/// the driver must execute.
pub fn transition(phase: Phase, event: &LoopEvent) -> (Phase, Vec<Action>) {
    match (phase, event) {
        // Terminal phases absorb everything.
        (Phase::Complete, _) => (Phase::Complete, vec![]),
        (Phase::Error, _) => (Phase::Error, vec![]),

        // A fault ends any live session.
        (_, LoopEvent::Fault { .. }) => (Phase::Error, vec![Action::ArchiveSession]),

        (Phase::Init, LoopEvent::ContextLoaded) => (Phase::Understand, vec![]),
        (Phase::Understand, LoopEvent::ScopeAssessed) => (Phase::Plan, vec![]),
        (Phase::Plan, LoopEvent::PlanReady) => (Phase::Execute, vec![Action::ValidatePlan]),

        (Phase::Execute, LoopEvent::WorkApplied { more: true }) => (Phase::Execute, vec![]),
        (Phase::Execute, LoopEvent::WorkApplied { more: false }) => {
            (Phase::Verify, vec![Action::RunBlockingGates])
        }

        (Phase::Verify, LoopEvent::GatesPassed) => (Phase::Commit, vec![]),
        (Phase::Verify, LoopEvent::GatesFailed) => {
            (Phase::Execute, vec![Action::IncrementIteration])
        }

        (Phase::Commit, LoopEvent::CommitRecorded { hash }) => {
            let mut actions = Vec::new();
            if let Some(hash) = hash {
                actions.push(Action::RecordCommit(hash.clone()));
            }
            actions.push(Action::EvaluateProgress);
            (Phase::Evaluate, actions)
        }

        (Phase::Evaluate, LoopEvent::AllWorkDone) => {
            (Phase::Complete, vec![Action::ArchiveSession])
        }
        (Phase::Evaluate, LoopEvent::WorkRemaining) => {
            (Phase::Execute, vec![Action::IncrementIteration])
        }
        (Phase::Evaluate, LoopEvent::PlanExhausted) => {
            (Phase::Plan, vec![Action::IncrementIteration])
        }

        // Anything else is an invalid pair; the driver reports it and the
        // session ends in the error phase.
        (_, _) => (Phase::Error, vec![Action::ArchiveSession]),
    }
}
