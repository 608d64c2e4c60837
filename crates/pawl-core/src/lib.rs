//! Pawl Core - shared types for the pawl orchestration loop
//!
//! A pawl lets a ratchet wheel advance and stops it slipping back. This
//! crate holds the vocabulary the rest of the workspace shares: loop
//! phases, tasks, gate results, session state, the error type, and the
//! project-profile resolver.

#![allow(dead_code)]

mod error;
mod profile;
mod types;

pub use error::*;
pub use profile::*;
pub use types::*;
