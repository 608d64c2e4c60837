//! # pawl-orchestrator
//!
//! Autonomous loop engine for Pawl.
//!
//! This crate provides:
//! - Orchestrator driving the phase machine over a project root
//! - Pure phase state machine with driver-executed actions
//! - Lifecycle hook dispatch around tool use
//! - Built-in session tracking hooks
//! - Quality gates enforced as lint and commit-guard hooks

#![allow(dead_code)]

mod driver;
mod gate_hooks;
mod hooks;
mod state_machine;

pub use driver::{Orchestrator, DEFAULT_MAX_ITERATIONS};
pub use gate_hooks::{gate_hooks, LintHook, TestGuardHook};
pub use hooks::{
    default_hooks, Hook, HookDispatcher, HookEvent, HookMatcher, HookOutput, HookPayload,
    PermissionDecision, SaveFinalState, TrackCommands, TrackFileChanges,
};
pub use state_machine::{transition, Action, LoopEvent};
