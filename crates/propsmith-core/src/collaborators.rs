//! External collaborators the pipeline depends on.
//!
//! Implement these traits to plug in real subprocess-backed tooling (see the
//! `propsmith-exec` crate) or in-memory stubs (see [`crate::fakes`]).

use std::path::Path;

use async_trait::async_trait;

use crate::domain::{FunctionInfo, PropsmithResult, TestRunReport};

/// Reads the functions of a module.
#[async_trait]
pub trait ModuleIntrospector: Send + Sync {
    /// Describe the functions of `module`, in a stable order.
    ///
    /// With `filter == None` every public function is returned. With a filter,
    /// exactly the named functions are returned, in filter order; naming a
    /// function the module does not have is an error.
    async fn introspect(&self, module: &str, filter: Option<&[String]>) -> PropsmithResult<Vec<FunctionInfo>>;
}

/// Runs a test file and reports per-test results.
#[async_trait]
pub trait TestExecutor: Send + Sync {
    async fn execute(&self, test_file: &Path) -> PropsmithResult<TestRunReport>;
}
