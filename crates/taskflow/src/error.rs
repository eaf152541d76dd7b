//! Error taxonomy for task orchestration.
//!
//! Construction-time errors (malformed descriptors, cycles) abort a run before
//! any task executes. Execution-time errors are rendered into the affected
//! task's [`ExecutionResult`](crate::ExecutionResult) and never escape
//! [`Engine::execute`](crate::Engine::execute).

use thiserror::Error;

/// Errors produced by the orchestration core.
#[derive(Debug, Error)]
pub enum Error {
    /// A task descriptor is malformed or a required field is missing
    #[error("configuration error: {message}")]
    Configuration {
        /// What is wrong with the configuration
        message: String,
    },

    /// The dependency graph contains a cycle
    #[error("circular dependency: {}", cycle.join(" -> "))]
    CircularDependency {
        /// Nodes of the cycle; the first and last entries are the same node
        cycle: Vec<String>,
    },

    /// A prerequisite of the task did not succeed or never ran
    #[error("task '{task}' skipped: dependencies did not succeed: {}", failed.join(", "))]
    DependencyFailure {
        /// Task that was skipped
        task: String,
        /// Direct dependencies that caused the skip
        failed: Vec<String>,
    },

    /// Task requires elevated privileges the process does not have
    #[error("task '{task}' requires elevated privileges")]
    Privilege {
        /// Task that needs elevation
        task: String,
    },

    /// Task did not complete within its time bound
    #[error("task '{task}' timed out after {seconds}s")]
    Timeout {
        /// Task that timed out
        task: String,
        /// Configured bound in seconds
        seconds: u64,
    },

    /// Failure raised by a task's own logic
    #[error("task '{task}' failed: {message}")]
    TaskRuntime {
        /// Task that failed
        task: String,
        /// Captured failure message
        message: String,
    },

    /// A result was recorded twice for the same task within one run
    #[error("result for task '{task}' was already recorded in this run")]
    DuplicateResult {
        /// Task whose result was recorded twice
        task: String,
    },
}

impl Error {
    /// Shorthand for a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Whether this error aborts a run instead of being absorbed into a result.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. } | Self::CircularDependency { .. } | Self::DuplicateResult { .. }
        )
    }
}

/// Result type for orchestration operations.
pub type Result<T> = std::result::Result<T, Error>;
