//! Subprocess execution with captured output and a timeout.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

use crate::error::{ExecError, ExecResult};

/// A command to run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Human-readable name used in logs and errors.
    pub name: String,

    pub program: String,

    pub args: Vec<String>,

    /// Timeout in seconds; 0 disables it.
    pub timeout_secs: u64,

    /// Working directory; the current one when `None`.
    pub current_dir: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(name: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            timeout_secs: 0,
            current_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn current_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.current_dir = dir;
        self
    }
}

/// Result of a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub name: String,

    /// Exit code (-1 when killed by a signal).
    pub exit_code: i32,

    pub stdout: String,

    pub stderr: String,

    pub duration_ms: u64,

    pub success: bool,
}

impl CommandOutput {
    /// Whether the command exited with code 0.
    pub fn passed(&self) -> bool {
        self.success && self.exit_code == 0
    }

    /// Fail unless the command passed.
    pub fn require_success(self) -> ExecResult<Self> {
        if self.passed() {
            return Ok(self);
        }
        Err(ExecError::Failed {
            name: self.name,
            exit_code: self.exit_code,
            stderr: self.stderr.trim().to_string(),
        })
    }
}

/// Run `spec` to completion and capture its output.
///
/// A non-zero exit is not an error here; callers decide with
/// [`CommandOutput::require_success`].
pub async fn run_command(spec: &CommandSpec) -> ExecResult<CommandOutput> {
    if spec.program.is_empty() {
        return Err(ExecError::EmptyCommand {
            name: spec.name.clone(),
        });
    }
    let start = Instant::now();

    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &spec.current_dir {
        command.current_dir(dir);
    }

    debug!(name = %spec.name, program = %spec.program, args = ?spec.args, "spawning command");
    let child = command.spawn().map_err(|source| ExecError::Spawn {
        program: spec.program.clone(),
        source,
    })?;

    let output = if spec.timeout_secs > 0 {
        tokio::time::timeout(Duration::from_secs(spec.timeout_secs), child.wait_with_output())
            .await
            .map_err(|_| ExecError::Timeout {
                name: spec.name.clone(),
                secs: spec.timeout_secs,
            })??
    } else {
        child.wait_with_output().await?
    };

    let duration_ms = start.elapsed().as_millis() as u64;
    let exit_code = output.status.code().unwrap_or(-1);
    debug!(name = %spec.name, exit_code, duration_ms, "command finished");

    Ok(CommandOutput {
        name: spec.name.clone(),
        exit_code,
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        duration_ms,
        success: output.status.success(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_output_passed() {
        let output = CommandOutput {
            name: "pytest".to_string(),
            exit_code: 0,
            stdout: "".to_string(),
            stderr: "".to_string(),
            duration_ms: 100,
            success: true,
        };
        assert!(output.passed());
        assert!(output.require_success().is_ok());
    }

    #[test]
    fn test_command_output_failed() {
        let output = CommandOutput {
            name: "introspect".to_string(),
            exit_code: 1,
            stdout: "".to_string(),
            stderr: "ModuleNotFoundError: No module named 'nope'\n".to_string(),
            duration_ms: 100,
            success: false,
        };
        assert!(!output.passed());
        let err = output.require_success().unwrap_err();
        assert!(err.to_string().contains("No module named 'nope'"));
    }

    #[test]
    fn test_command_spec_builder() {
        let spec = CommandSpec::new("pytest", "python3")
            .arg("-m")
            .args(["pytest", "-v"])
            .timeout_secs(30);
        assert_eq!(spec.args, vec!["-m", "pytest", "-v"]);
        assert_eq!(spec.timeout_secs, 30);
        assert!(spec.current_dir.is_none());
    }

    #[tokio::test]
    async fn test_run_simple_command() {
        let spec = CommandSpec::new("echo_test", "echo").arg("hello").timeout_secs(60);
        let output = run_command(&spec).await.expect("execute failed");
        assert!(output.success);
        assert_eq!(output.exit_code, 0);
        assert!(output.stdout.contains("hello"));
    }

    #[tokio::test]
    async fn test_run_failing_command() {
        let spec = CommandSpec::new("false_test", "false").timeout_secs(60);
        let output = run_command(&spec).await.expect("execute failed");
        assert!(!output.success);
        assert_ne!(output.exit_code, 0);
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let spec = CommandSpec::new("missing", "definitely-not-a-real-program-xyz");
        assert!(matches!(run_command(&spec).await, Err(ExecError::Spawn { .. })));
        let empty = CommandSpec::new("empty", "");
        assert!(matches!(run_command(&empty).await, Err(ExecError::EmptyCommand { .. })));
    }

    #[tokio::test]
    async fn test_timeout() {
        let spec = CommandSpec::new("sleepy", "sleep").arg("5").timeout_secs(1);
        assert!(matches!(run_command(&spec).await, Err(ExecError::Timeout { secs: 1, .. })));
    }
}
