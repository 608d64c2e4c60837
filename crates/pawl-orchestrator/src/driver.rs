//! The orchestrator: drives the phase machine, owns the side effects.
//!
//! Session state on disk is the single authority. The driver holds no
//! in-memory copy between calls: every [`advance`] loads the state fresh,
//! applies the transition and its actions, and saves before returning, so
//! hook writes through the same store are never clobbered.
//!
//! [`advance`]: Orchestrator::advance

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use pawl_core::{
    GateResult, GateSummary, LoopResult, PawlError, Phase, Profile, ProfileResolver, Result,
    SessionState, Task, TaskStatus, GENERAL_PROFILE,
};
use pawl_gates::{GateExecutor, QualityGates, ShellExecutor};
use pawl_session::{SessionStore, DEFAULT_STATE_DIR};
use pawl_tasks::TaskQueue;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::gate_hooks::gate_hooks;
use crate::hooks::{default_hooks, Hook, HookDispatcher, HookEvent, HookOutput, HookPayload};
use crate::state_machine::{transition, Action, LoopEvent};

/// Iteration bound a session may not exceed without an explicit override.
pub const DEFAULT_MAX_ITERATIONS: u32 = 10;

/// Orchestrates one autonomous session over a project root: profile
/// resolution, the task queue, quality gates, lifecycle hooks, and durable
/// session state.
pub struct Orchestrator {
    root: PathBuf,
    store: SessionStore,
    resolver: ProfileResolver,
    profile: Profile,
    executor: Arc<dyn GateExecutor>,
    gates: QualityGates,
    queue: TaskQueue,
    hooks: HookDispatcher,
    custom: HookDispatcher,
    max_iterations: u32,
    session_id: Option<String>,
}

// The executor, gates, and hook dispatchers hold trait objects without a
// Debug bound, so the derive is unavailable.
impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("root", &self.root)
            .field("store", &self.store)
            .field("resolver", &self.resolver)
            .field("profile", &self.profile)
            .field("queue", &self.queue)
            .field("max_iterations", &self.max_iterations)
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Orchestrator for the project at `root`. Detects the profile, loads
    /// any profile overrides, and wires the default hooks.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let resolver = ProfileResolver::load_or_default(&root)?;
        let name = resolver.detect(&root);
        let profile = resolver
            .load(&name)
            .unwrap_or_else(|| Profile::new(GENERAL_PROFILE));
        let executor: Arc<dyn GateExecutor> = Arc::new(ShellExecutor::new());
        let store = SessionStore::new(root.join(DEFAULT_STATE_DIR));
        let gates = QualityGates::new(profile.clone()).with_executor(executor.clone());
        let hooks = Self::build_hooks(&store, &profile, &executor, &root)?;
        Ok(Self {
            root,
            store,
            resolver,
            profile,
            executor,
            gates,
            queue: TaskQueue::new(),
            hooks,
            custom: HookDispatcher::new(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            session_id: None,
        })
    }

    /// Pins the profile by name instead of detecting it.
    pub fn with_profile(mut self, name: &str) -> Result<Self> {
        self.profile = self
            .resolver
            .load(name)
            .ok_or_else(|| PawlError::Profile(format!("unknown profile '{}'", name)))?;
        self.rebuild()?;
        Ok(self)
    }

    /// Replaces the gate executor. Tests use this to substitute a mock.
    pub fn with_executor(mut self, executor: Arc<dyn GateExecutor>) -> Result<Self> {
        self.executor = executor;
        self.rebuild()?;
        Ok(self)
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Replaces the session store, for state directories outside the root.
    pub fn with_store(mut self, store: SessionStore) -> Result<Self> {
        self.store = store;
        self.rebuild()?;
        Ok(self)
    }

    // Gates and built-in hooks capture the profile, executor, and store;
    // any of those changing means both get rebuilt.
    fn rebuild(&mut self) -> Result<()> {
        self.gates = QualityGates::new(self.profile.clone()).with_executor(self.executor.clone());
        self.hooks = Self::build_hooks(&self.store, &self.profile, &self.executor, &self.root)?;
        Ok(())
    }

    fn build_hooks(
        store: &SessionStore,
        profile: &Profile,
        executor: &Arc<dyn GateExecutor>,
        root: &Path,
    ) -> Result<HookDispatcher> {
        let mut hooks = default_hooks(store)?;
        hooks.merge(gate_hooks(profile, executor.clone(), root)?);
        Ok(hooks)
    }

    /// Starts a new session for `task`. An already-active session is
    /// archived first, never overwritten in place.
    #[instrument(skip(self, task))]
    pub async fn start(&mut self, task: &str) -> Result<LoopResult> {
        self.store.clear().await?;
        self.queue = TaskQueue::new();
        self.gates = QualityGates::new(self.profile.clone()).with_executor(self.executor.clone());

        let session_id = Uuid::new_v4().to_string()[..8].to_string();
        let state = self.store.create(&session_id, &self.profile.name, task).await?;
        self.session_id = Some(session_id);
        Ok(self.report_for(&state, true, "session started"))
    }

    /// Resumes the persisted session: restores the queue, the recorded
    /// gate results, and the profile it was started under.
    #[instrument(skip(self))]
    pub async fn resume(&mut self) -> Result<LoopResult> {
        let state = self.store.load().await.ok_or(PawlError::NoSession)?;

        if state.profile != self.profile.name {
            match self.resolver.load(&state.profile) {
                Some(profile) => {
                    self.profile = profile;
                    self.rebuild()?;
                }
                None => warn!(
                    profile = %state.profile,
                    "session profile is no longer known, keeping the detected one"
                ),
            }
        }
        self.queue = TaskQueue::from_tasks(state.tasks.clone());
        self.gates.restore_results(state.gates.clone());
        self.session_id = Some(state.session_id.clone());

        Ok(self.report_for(&state, state.phase != Phase::Error, "session resumed"))
    }

    /// Applies one event to the active session. Derived events (gate
    /// outcomes, evaluation verdicts) fold back into the same call, so the
    /// returned result reflects the settled phase.
    ///
    /// A caller-misuse failure ends the session: the state is moved to the
    /// error phase, persisted, archived, and the error re-raised.
    #[instrument(skip(self, event), fields(event = event.name()))]
    pub async fn advance(&mut self, event: LoopEvent) -> Result<LoopResult> {
        let mut state = self.store.load().await.ok_or(PawlError::NoSession)?;
        match self.apply(&mut state, event).await {
            Ok(message) => {
                let success = state.phase != Phase::Error;
                Ok(self.report_for(&state, success, &message))
            }
            Err(e) if e.is_misuse() => {
                warn!(error = %e, "session cannot continue");
                state.phase = Phase::Error;
                self.store.save(&mut state).await?;
                self.store.clear().await?;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    // Runs the transition loop until no derived event is pending, then
    // persists. The save happens after every mutation; archive, when
    // requested, happens after the save so history holds the final state.
    async fn apply(&mut self, state: &mut SessionState, event: LoopEvent) -> Result<String> {
        let mut pending = Some(event);
        let mut archive = false;
        let mut fault: Option<String> = None;

        while let Some(event) = pending.take() {
            if let LoopEvent::Fault { reason } = &event {
                fault = Some(reason.clone());
            }
            let from = state.phase;
            let (next, actions) = transition(from, &event);
            if next == Phase::Error
                && from != Phase::Error
                && !matches!(event, LoopEvent::Fault { .. })
            {
                return Err(PawlError::InvalidTransition {
                    from: from.to_string(),
                    event: event.name().to_string(),
                });
            }
            debug!(from = %from, to = %next, event = event.name(), "transition");
            state.phase = next;

            for action in actions {
                match action {
                    Action::ValidatePlan => self.queue.validate()?,
                    Action::RecordCommit(hash) => state.commits.push(hash),
                    Action::RunBlockingGates => {
                        let results = self.gates.run_all_blocking(&self.root).await;
                        for result in &results {
                            state.gates.insert(result.name.clone(), result.clone());
                        }
                        pending = Some(if self.gates.all_blocking_passed() {
                            LoopEvent::GatesPassed
                        } else {
                            LoopEvent::GatesFailed
                        });
                    }
                    Action::EvaluateProgress => {
                        self.queue.validate()?;
                        pending = Some(self.evaluation_event());
                    }
                    Action::IncrementIteration => {
                        if state.iteration >= self.max_iterations {
                            return Err(PawlError::IterationLimit(self.max_iterations));
                        }
                        state.iteration += 1;
                    }
                    Action::ArchiveSession => archive = true,
                }
            }
        }

        state.tasks = self.queue.tasks().to_vec();
        self.store.save(state).await?;
        if archive {
            self.store.clear().await?;
        }

        Ok(match (state.phase, fault) {
            (Phase::Error, Some(reason)) => format!("Session failed: {}", reason),
            (Phase::Complete, _) => "All tasks complete and blocking gates passed".to_string(),
            (phase, _) => format!("Phase advanced to {}", phase),
        })
    }

    // Verdict for the evaluate phase, derived from queue and gate state.
    fn evaluation_event(&self) -> LoopEvent {
        if self.queue.all_complete() && self.gates.all_blocking_passed() {
            return LoopEvent::AllWorkDone;
        }
        if !self.queue.next_runnable().is_empty() || self.queue.count(TaskStatus::InProgress) > 0 {
            return LoopEvent::WorkRemaining;
        }
        if self.queue.remaining_count() > 0 {
            return LoopEvent::PlanExhausted;
        }
        // Tasks are done but a blocking gate is not green: go around again.
        LoopEvent::WorkRemaining
    }

    /// Adds a task to the queue and persists the new snapshot.
    pub async fn add_task(&mut self, task: Task) -> Result<()> {
        self.queue.add(task)?;
        self.store.update_tasks(self.queue.tasks().to_vec()).await
    }

    /// Updates one task's status and persists the new snapshot.
    pub async fn update_task_status(&mut self, id: &str, status: TaskStatus) -> Result<()> {
        self.queue.update_status(id, status)?;
        self.store.update_tasks(self.queue.tasks().to_vec()).await
    }

    pub async fn complete_task(&mut self, id: &str) -> Result<()> {
        self.update_task_status(id, TaskStatus::Completed).await
    }

    pub fn next_runnable(&self) -> Vec<&Task> {
        self.queue.next_runnable()
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    /// Runs every blocking gate now, outside the phase machine, recording
    /// each result in session state.
    pub async fn run_blocking_gates(&mut self) -> Result<Vec<GateResult>> {
        let results = self.gates.run_all_blocking(&self.root).await;
        for result in &results {
            self.store.update_gate(result.clone()).await?;
        }
        Ok(results)
    }

    pub fn gate_summary(&self) -> GateSummary {
        self.gates.get_summary()
    }

    /// Dispatches a lifecycle payload through the built-in hooks, then any
    /// caller-registered ones, and merges the outputs.
    pub async fn dispatch_hook(&self, payload: &HookPayload) -> Result<HookOutput> {
        let mut output = self.hooks.dispatch(payload).await?;
        output.merge(self.custom.dispatch(payload).await?);
        Ok(output)
    }

    /// Registers a caller hook. It takes effect on the next dispatch and
    /// runs after the built-ins.
    pub fn add_hook(
        &mut self,
        event: HookEvent,
        hook: Arc<dyn Hook>,
        pattern: Option<&str>,
    ) -> Result<()> {
        self.custom.add_hook(event, hook, pattern)
    }

    /// Snapshot of the active session as a loop result.
    pub async fn report(&self) -> Result<LoopResult> {
        let state = self.store.load().await.ok_or(PawlError::NoSession)?;
        let message = format!("Phase {}", state.phase);
        Ok(self.report_for(&state, state.phase != Phase::Error, &message))
    }

    fn report_for(&self, state: &SessionState, success: bool, message: &str) -> LoopResult {
        LoopResult {
            success,
            session_id: state.session_id.clone(),
            phase: state.phase,
            iteration: state.iteration,
            tasks_completed: self.queue.completed_count(),
            tasks_remaining: self.queue.remaining_count(),
            all_blocking_passed: self.gates.all_blocking_passed(),
            last_commit: state.commits.last().cloned(),
            message: message.to_string(),
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
