//! Module introspection through the Python interpreter.
//!
//! The interpreter runs an embedded script that imports the module and
//! prints one JSON line describing the requested functions. Modules are
//! imported relative to the working directory, as `python -c` does.

use std::path::PathBuf;

use async_trait::async_trait;
use propsmith_core::{FunctionInfo, ModuleIntrospector, PropsmithResult};
use tracing::{debug, info};

use crate::command::{run_command, CommandSpec};
use crate::error::{ExecError, ExecResult};

const INTROSPECT_SCRIPT: &str = r#"
import importlib
import inspect
import json
import sys


def describe(mod, name):
    obj = getattr(mod, name)
    try:
        source = inspect.getsource(obj)
    except (TypeError, OSError):
        source = ""
    try:
        signature = str(inspect.signature(obj))
    except (TypeError, ValueError):
        signature = ""
    return {
        "name": name,
        "signature": signature,
        "docstring": inspect.getdoc(obj) or "",
        "source": source,
    }


def main(argv):
    module_name, names = argv[0], argv[1:]
    try:
        mod = importlib.import_module(module_name)
    except Exception as exc:
        sys.stderr.write("could not import module '%s': %s\n" % (module_name, exc))
        return 2
    if not names:
        names = [n for n, _ in inspect.getmembers(mod, callable) if not n.startswith("_")]
    for name in names:
        if not hasattr(mod, name):
            sys.stderr.write("function '%s' not found in module '%s'\n" % (name, module_name))
            return 3
        if not callable(getattr(mod, name)):
            sys.stderr.write("'%s' in module '%s' is not callable\n" % (name, module_name))
            return 3
    sys.stdout.write("\n" + json.dumps([describe(mod, n) for n in names]) + "\n")
    return 0


sys.exit(main(sys.argv[1:]))
"#;

pub const DEFAULT_INTROSPECT_TIMEOUT_SECS: u64 = 60;

/// [`ModuleIntrospector`] backed by a Python interpreter.
#[derive(Debug, Clone)]
pub struct PythonIntrospector {
    python: String,
    timeout_secs: u64,
    working_dir: Option<PathBuf>,
}

impl PythonIntrospector {
    pub fn new(python: impl Into<String>) -> Self {
        Self {
            python: python.into(),
            timeout_secs: DEFAULT_INTROSPECT_TIMEOUT_SECS,
            working_dir: None,
        }
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Directory the module is imported from.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    fn command(&self, module: &str, names: &[String]) -> CommandSpec {
        CommandSpec::new("introspect", &self.python)
            .arg("-c")
            .arg(INTROSPECT_SCRIPT)
            .arg(module)
            .args(names.iter().cloned())
            .timeout_secs(self.timeout_secs)
            .current_dir(self.working_dir.clone())
    }

    async fn run(&self, module: &str, names: &[String]) -> ExecResult<Vec<FunctionInfo>> {
        let output = run_command(&self.command(module, names)).await?.require_success()?;
        parse_functions(&output.stdout)
    }
}

#[async_trait]
impl ModuleIntrospector for PythonIntrospector {
    async fn introspect(&self, module: &str, filter: Option<&[String]>) -> PropsmithResult<Vec<FunctionInfo>> {
        let names: &[String] = match filter {
            Some([]) => return Ok(Vec::new()),
            Some(names) => names,
            None => &[],
        };
        debug!(module = %module, filter = ?names, python = %self.python, "introspecting module");
        let functions = self.run(module, names).await.map_err(ExecError::into_introspection)?;
        info!(module = %module, functions = functions.len(), "module introspected");
        Ok(functions)
    }
}

/// Parse the script's JSON line; anything the module printed on import comes before it.
pub fn parse_functions(stdout: &str) -> ExecResult<Vec<FunctionInfo>> {
    let line = stdout
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .ok_or_else(|| ExecError::InvalidOutput {
            name: "introspect".to_string(),
            reason: "no output".to_string(),
        })?;
    serde_json::from_str(line).map_err(|e| ExecError::InvalidOutput {
        name: "introspect".to_string(),
        reason: e.to_string(),
    })
}
