//! Quality gate engine: run the profile's configured commands, classify
//! the outcomes, keep the results.
//!
//! The engine is a pure "run and report" primitive. It never retries;
//! retry policy belongs one layer up, in the orchestrator's phase-advance
//! logic. Execution failures become failed [`GateResult`]s, they are never
//! raised as errors.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use pawl_core::{GateConfig, GateResult, GateStatus, GateSummary, Profile};
use tracing::{debug, instrument, warn};

use crate::executor::{GateExecutor, ShellExecutor};

const MAX_OUTPUT_LEN: usize = 4000;
const SKIP_REASON: &str = "Gate not configured for this profile";

fn truncate_output(s: &str) -> String {
    if s.len() <= MAX_OUTPUT_LEN {
        return s.to_string();
    }
    let mut end = MAX_OUTPUT_LEN;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...[truncated]", &s[..end])
}

/// Runs one configured gate command and classifies the outcome: exit 0 is
/// passed; nonzero exit, spawn failure, and timeout are all failed with the
/// diagnostic carried in `error`.
pub async fn run_configured_gate(
    executor: &dyn GateExecutor,
    name: &str,
    config: &GateConfig,
    cwd: &Path,
) -> GateResult {
    let started = Instant::now();
    let run = executor.run(&config.command, cwd);
    match tokio::time::timeout(Duration::from_secs(config.timeout_secs), run).await {
        Ok(Ok(output)) => {
            let duration_ms = started.elapsed().as_millis() as u64;
            let stdout = truncate_output(&output.stdout);
            if output.success {
                debug!(gate = name, duration_ms, "gate passed");
                GateResult::passed(name, &config.command, stdout, duration_ms)
            } else {
                let stderr = truncate_output(&output.stderr);
                let error = if stderr.is_empty() { None } else { Some(stderr) };
                debug!(gate = name, duration_ms, "gate failed");
                GateResult::failed(name, &config.command, stdout, error, duration_ms)
            }
        }
        Ok(Err(e)) => {
            let duration_ms = started.elapsed().as_millis() as u64;
            warn!(gate = name, error = %e, "gate command could not run");
            GateResult::failed(
                name,
                &config.command,
                String::new(),
                Some(e.to_string()),
                duration_ms,
            )
        }
        Err(_) => {
            warn!(
                gate = name,
                timeout_secs = config.timeout_secs,
                "gate timed out"
            );
            GateResult::failed(
                name,
                &config.command,
                String::new(),
                Some(format!("Timeout after {} seconds", config.timeout_secs)),
                config.timeout_secs * 1000,
            )
        }
    }
}

/// Gate engine bound to one profile.
pub struct QualityGates {
    profile: Profile,
    executor: Arc<dyn GateExecutor>,
    results: BTreeMap<String, GateResult>,
}

impl QualityGates {
    pub fn new(profile: Profile) -> Self {
        Self {
            profile,
            executor: Arc::new(ShellExecutor::new()),
            results: BTreeMap::new(),
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn GateExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Runs one gate and records the result. A gate the profile does not
    /// configure is recorded as skipped, not failed.
    #[instrument(skip(self, cwd), fields(profile = %self.profile.name))]
    pub async fn run_gate(&mut self, name: &str, cwd: &Path) -> GateResult {
        let result = self.execute_gate(name, cwd).await;
        self.results.insert(name.to_string(), result.clone());
        result
    }

    // Executes without recording so the concurrent path can share one
    // immutable borrow across gates.
    async fn execute_gate(&self, name: &str, cwd: &Path) -> GateResult {
        match self.profile.gates.get(name) {
            Some(config) => {
                run_configured_gate(self.executor.as_ref(), name, config, cwd).await
            }
            None => GateResult::skipped(name, SKIP_REASON),
        }
    }

    /// Runs every `blocking: true` gate sequentially, in map order, and
    /// returns the blocking subset of results.
    pub async fn run_all_blocking(&mut self, cwd: &Path) -> Vec<GateResult> {
        let names = self.profile.blocking_gate_names();
        let mut results = Vec::with_capacity(names.len());
        for name in names {
            results.push(self.run_gate(&name, cwd).await);
        }
        results
    }

    /// Concurrent variant of [`run_all_blocking`]: fans the blocking gates
    /// out and joins them, then records every result.
    ///
    /// [`run_all_blocking`]: QualityGates::run_all_blocking
    pub async fn run_all_blocking_concurrent(&mut self, cwd: &Path) -> Vec<GateResult> {
        let names = self.profile.blocking_gate_names();
        let futures: Vec<_> = names
            .iter()
            .map(|name| self.execute_gate(name, cwd))
            .collect();
        let results = join_all(futures).await;
        for result in &results {
            self.results.insert(result.name.clone(), result.clone());
        }
        results
    }

    /// True iff every blocking gate's last recorded result is passed.
    /// Vacuously true for a profile with zero blocking gates; false when a
    /// blocking gate has not been run at all.
    pub fn all_blocking_passed(&self) -> bool {
        self.profile
            .gates
            .iter()
            .filter(|(_, config)| config.blocking)
            .all(|(name, _)| {
                self.results
                    .get(name)
                    .map(|result| result.is_passed())
                    .unwrap_or(false)
            })
    }

    pub fn get_failed_gates(&self) -> Vec<&GateResult> {
        self.results.values().filter(|r| r.is_failed()).collect()
    }

    /// Aggregate counts plus the blocking-pass flag, the machine-readable
    /// contract callers use to decide whether the loop may advance.
    pub fn get_summary(&self) -> GateSummary {
        let mut passed = 0;
        let mut failed = 0;
        let mut skipped = 0;
        let mut gates = BTreeMap::new();
        for (name, result) in &self.results {
            match result.status {
                GateStatus::Passed => passed += 1,
                GateStatus::Failed => failed += 1,
                GateStatus::Skipped => skipped += 1,
                GateStatus::Pending => {}
            }
            gates.insert(name.clone(), result.status);
        }
        GateSummary {
            total: self.results.len(),
            passed,
            failed,
            skipped,
            all_blocking_passed: self.all_blocking_passed(),
            gates,
        }
    }

    pub fn results(&self) -> &BTreeMap<String, GateResult> {
        &self.results
    }

    /// Restores recorded results from a persisted session snapshot.
    pub fn restore_results(&mut self, results: BTreeMap<String, GateResult>) {
        self.results = results;
    }
}
