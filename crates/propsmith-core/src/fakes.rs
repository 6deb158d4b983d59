//! In-memory fakes for the model and collaborator traits (testing only)
//!
//! Provides `ScriptedModel`, `StaticIntrospector` and `StaticExecutor`, which
//! satisfy the trait contracts without network access or a Python toolchain.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::collaborators::{ModuleIntrospector, TestExecutor};
use crate::domain::{FunctionInfo, PropsmithError, PropsmithResult, TestRunReport};
use crate::model::{ModelClient, ModelError, ModelRequest};

type Responder = Box<dyn Fn(&ModelRequest) -> Result<String, ModelError> + Send + Sync>;
type Latency = Box<dyn Fn(&ModelRequest) -> Duration + Send + Sync>;

// ---------------------------------------------------------------------------
// ScriptedModel
// ---------------------------------------------------------------------------

/// Model whose replies are computed by a closure over the request.
pub struct ScriptedModel {
    responder: Responder,
    latency: Option<Latency>,
    calls: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModel {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&ModelRequest) -> Result<String, ModelError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            latency: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Sleep for `latency(request)` before answering.
    pub fn with_latency<F>(mut self, latency: F) -> Self
    where
        F: Fn(&ModelRequest) -> Duration + Send + Sync + 'static,
    {
        self.latency = Some(Box::new(latency));
        self
    }

    /// Every request received so far, in arrival order.
    pub fn calls(&self) -> Vec<ModelRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn complete(&self, request: &ModelRequest) -> Result<String, ModelError> {
        self.calls.lock().unwrap().push(request.clone());
        if let Some(latency) = &self.latency {
            tokio::time::sleep(latency(request)).await;
        }
        (self.responder)(request)
    }
}

// ---------------------------------------------------------------------------
// StaticIntrospector
// ---------------------------------------------------------------------------

/// Introspector over a fixed table of modules.
#[derive(Debug, Default)]
pub struct StaticIntrospector {
    modules: HashMap<String, Vec<FunctionInfo>>,
}

impl StaticIntrospector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(mut self, module: impl Into<String>, functions: Vec<FunctionInfo>) -> Self {
        self.modules.insert(module.into(), functions);
        self
    }
}

#[async_trait]
impl ModuleIntrospector for StaticIntrospector {
    async fn introspect(&self, module: &str, filter: Option<&[String]>) -> PropsmithResult<Vec<FunctionInfo>> {
        let functions = self
            .modules
            .get(module)
            .ok_or_else(|| PropsmithError::Introspection(format!("could not import module '{module}'")))?;

        match filter {
            None => Ok(functions
                .iter()
                .filter(|f| !f.name.starts_with('_'))
                .cloned()
                .collect()),
            Some(names) => names
                .iter()
                .map(|name| {
                    functions.iter().find(|f| &f.name == name).cloned().ok_or_else(|| {
                        PropsmithError::Introspection(format!(
                            "function '{name}' not found in module '{module}'"
                        ))
                    })
                })
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// StaticExecutor
// ---------------------------------------------------------------------------

/// Executor that returns a canned report for every file.
#[derive(Debug, Default)]
pub struct StaticExecutor {
    report: TestRunReport,
    executed: Mutex<Vec<PathBuf>>,
}

impl StaticExecutor {
    pub fn new(report: TestRunReport) -> Self {
        Self {
            report,
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn executed(&self) -> Vec<PathBuf> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl TestExecutor for StaticExecutor {
    async fn execute(&self, test_file: &Path) -> PropsmithResult<TestRunReport> {
        self.executed.lock().unwrap().push(test_file.to_path_buf());
        Ok(self.report.clone())
    }
}
