//! Error types for pawl.

use thiserror::Error;

/// Pawl error type.
///
/// Most failure modes here are data rather than errors: an unknown profile
/// loads as `None`, a failing gate command becomes a failed [`GateResult`],
/// and store operations without an active session are no-ops. The variants
/// below cover what remains: caller misuse, bad operator configuration, and
/// infrastructure failures.
///
/// [`GateResult`]: crate::types::GateResult
#[derive(Error, Debug)]
pub enum PawlError {
    // Caller misuse
    #[error("No session to resume")]
    NoSession,

    #[error("Duplicate task id: {0}")]
    DuplicateTask(String),

    #[error("Unknown task id: {0}")]
    UnknownTask(String),

    #[error("Task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency { task: String, dependency: String },

    #[error("Dependency cycle: {0}")]
    DependencyCycle(String),

    #[error("Invalid transition from phase '{from}' on event '{event}'")]
    InvalidTransition { from: String, event: String },

    #[error("Iteration limit reached: {0}")]
    IterationLimit(u32),

    #[error("Invalid hook matcher '{pattern}': {reason}")]
    InvalidMatcher { pattern: String, reason: String },

    // Configuration
    #[error("Profile error: {0}")]
    Profile(String),

    // Infrastructure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl PawlError {
    /// True for errors caused by incorrect caller behavior, as opposed to
    /// configuration or infrastructure failures. The orchestrator moves the
    /// session to the error phase before re-raising these.
    pub fn is_misuse(&self) -> bool {
        matches!(
            self,
            PawlError::NoSession
                | PawlError::DuplicateTask(_)
                | PawlError::UnknownTask(_)
                | PawlError::UnknownDependency { .. }
                | PawlError::DependencyCycle(_)
                | PawlError::InvalidTransition { .. }
                | PawlError::IterationLimit(_)
                | PawlError::InvalidMatcher { .. }
        )
    }
}

/// Result type alias for pawl operations.
pub type Result<T> = std::result::Result<T, PawlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_misuse_classification() {
        assert!(PawlError::NoSession.is_misuse());
        assert!(PawlError::DependencyCycle("a -> b -> a".to_string()).is_misuse());
        assert!(PawlError::IterationLimit(10).is_misuse());
        assert!(!PawlError::Profile("bad toml".to_string()).is_misuse());
        assert!(!PawlError::Other("boom".to_string()).is_misuse());
    }

    #[test]
    fn test_error_display() {
        let err = PawlError::UnknownDependency {
            task: "t2".to_string(),
            dependency: "t9".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Task 't2' depends on unknown task 't9'"
        );
        assert_eq!(PawlError::NoSession.to_string(), "No session to resume");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: PawlError = io.into();
        assert!(matches!(err, PawlError::Io(_)));
        assert!(!err.is_misuse());
    }
}
