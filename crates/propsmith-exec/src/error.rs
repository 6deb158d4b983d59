//! Errors raised while running external Python tooling.

use propsmith_core::PropsmithError;

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("command {name} has an empty program")]
    EmptyCommand { name: String },

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("command {name} timed out after {secs} seconds")]
    Timeout { name: String, secs: u64 },

    #[error("command {name} failed with exit code {exit_code}: {stderr}")]
    Failed {
        name: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("could not parse output of {name}: {reason}")]
    InvalidOutput { name: String, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type ExecResult<T> = std::result::Result<T, ExecError>;

impl ExecError {
    /// Map into the core error as an introspection failure.
    pub fn into_introspection(self) -> PropsmithError {
        PropsmithError::Introspection(self.to_string())
    }

    /// Map into the core error as a test-execution failure.
    pub fn into_test_execution(self) -> PropsmithError {
        PropsmithError::TestExecution(self.to_string())
    }
}
