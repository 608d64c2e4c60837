//! Pawl Tasks - dependency-aware task queue
//!
//! Holds the work items for one orchestration session and answers the one
//! question the loop keeps asking: what is runnable right now?

mod queue;

pub use queue::*;
