//! Error taxonomy for propsmith.
//!
//! - [`PropsmithError`] is fatal to a stage: it is raised before any unit is
//!   scheduled (malformed input document, unreadable file, bad configuration,
//!   a collaborator that could not run at all).
//! - [`UnitError`] is the cause of one unit's failure. It never crosses the
//!   scheduler boundary as an `Err`; it is captured as an
//!   [`Outcome::Failure`](crate::scheduler::Outcome).

use crate::model::ModelError;

/// Fatal, stage-level errors.
#[derive(Debug, thiserror::Error)]
pub enum PropsmithError {
    #[error("invalid {document}: {reason}")]
    InvalidDocument { document: String, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("no functions found to analyze in module '{module}'")]
    NoFunctions { module: String },

    #[error("module introspection failed: {0}")]
    Introspection(String),

    #[error("test execution failed: {0}")]
    TestExecution(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PropsmithError {
    pub fn invalid_document(document: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDocument {
            document: document.into(),
            reason: reason.into(),
        }
    }
}

/// Why a single request unit failed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UnitError {
    #[error("model call failed: {0}")]
    Model(#[from] ModelError),

    #[error("malformed model response: {0}")]
    MalformedResponse(String),

    #[error("unit task aborted: {0}")]
    Aborted(String),
}

impl UnitError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedResponse(reason.into())
    }
}

/// Result type for fatal-capable propsmith operations.
pub type PropsmithResult<T> = std::result::Result<T, PropsmithError>;

/// Result type for a single unit's work.
pub type UnitResult<T> = std::result::Result<T, UnitError>;
