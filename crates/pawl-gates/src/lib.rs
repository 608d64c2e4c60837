//! Pawl Gates - quality gate engine
//!
//! Resolves gate commands from the active profile, runs them under a
//! timeout, and classifies the outcomes. A failing or missing gate is data
//! for the loop to act on, never a reason to crash it.

mod engine;
mod executor;

pub use engine::*;
pub use executor::*;
