//! Pawl Session - durable session state
//!
//! Persists the loop's state as one JSON document per active session and
//! archives finished sessions into a history directory. Absence of state is
//! normal and never an error; only real I/O failures surface.

mod store;

pub use store::*;
