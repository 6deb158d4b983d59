//! propsmith-exec - Python tooling behind the pipeline's collaborator traits
//!
//! Provides:
//! - [`PythonIntrospector`]: reads function names, signatures, docstrings and
//!   source from an importable module
//! - [`PytestExecutor`]: runs a test file under pytest and reports per-test
//!   pass/fail with captured failure output

pub mod command;
pub mod error;
pub mod introspect;
pub mod pytest;

// Re-export key types
pub use command::{run_command, CommandOutput, CommandSpec};
pub use error::{ExecError, ExecResult};
pub use introspect::PythonIntrospector;
pub use pytest::{parse_pytest_output, PytestExecutor};
