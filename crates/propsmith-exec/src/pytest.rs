//! Test execution through pytest.
//!
//! Runs `python -m pytest <file> -v --tb=long --no-header` and turns the
//! verbose outcome lines and failure sections into a per-test report.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use async_trait::async_trait;
use propsmith_core::{PropsmithError, PropsmithResult, TestExecution, TestExecutor, TestRunReport};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::command::{run_command, CommandSpec};
use crate::error::ExecError;

pub const DEFAULT_PYTEST_TIMEOUT_SECS: u64 = 600;

/// pytest exit code for "no tests collected".
const NO_TESTS_COLLECTED: i32 = 5;

fn outcome_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^\S*?\.py::(\w+(?:::\w+)?)(?:\[[^\]]*\])?\s+(PASSED|FAILED|ERROR|SKIPPED)\b")
            .expect("valid regex")
    })
}

fn section_header() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^_{3,}\s+(?:ERROR at \w+ of )?(\w+(?:\.\w+)?)(?:\[[^\]]*\])?\s+_{3,}\s*$").expect("valid regex")
    })
}

fn is_divider(line: &str) -> bool {
    line.starts_with('=') && line.matches('=').count() > 10
}

/// [`TestExecutor`] that shells out to pytest.
#[derive(Debug, Clone)]
pub struct PytestExecutor {
    python: String,
    timeout_secs: u64,
    working_dir: Option<PathBuf>,
}

impl PytestExecutor {
    pub fn new(python: impl Into<String>) -> Self {
        Self {
            python: python.into(),
            timeout_secs: DEFAULT_PYTEST_TIMEOUT_SECS,
            working_dir: None,
        }
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    fn command(&self, test_file: &Path) -> CommandSpec {
        CommandSpec::new("pytest", &self.python)
            .args(["-m", "pytest"])
            .arg(test_file.display().to_string())
            .args(["-v", "--tb=long", "--no-header"])
            .timeout_secs(self.timeout_secs)
            .current_dir(self.working_dir.clone())
    }
}

#[async_trait]
impl TestExecutor for PytestExecutor {
    async fn execute(&self, test_file: &Path) -> PropsmithResult<TestRunReport> {
        info!(test_file = %test_file.display(), "running pytest");
        let output = run_command(&self.command(test_file))
            .await
            .map_err(ExecError::into_test_execution)?;

        let report = parse_pytest_output(&output.stdout);
        // A failing test run is still a result; a run that reported nothing is not.
        if report.is_empty() && output.exit_code != 0 && output.exit_code != NO_TESTS_COLLECTED {
            let detail = if output.stderr.trim().is_empty() {
                output.stdout.trim()
            } else {
                output.stderr.trim()
            };
            return Err(PropsmithError::TestExecution(format!(
                "pytest exited with code {} without reporting any test: {}",
                output.exit_code, detail
            )));
        }

        let failed = report.values().filter(|r| !r.passed).count();
        info!(tests = report.len(), failed, exit_code = output.exit_code, "pytest finished");
        Ok(report)
    }
}

/// Parse verbose pytest output into per-test results.
///
/// Parametrized cases fold into their function: it passes only if every
/// case passed. Skipped tests count as passed. Test methods are keyed
/// `Class::method`.
pub fn parse_pytest_output(stdout: &str) -> TestRunReport {
    let mut report: TestRunReport = BTreeMap::new();
    for caps in outcome_line().captures_iter(stdout) {
        let name = caps[1].to_string();
        let passed = matches!(&caps[2], "PASSED" | "SKIPPED");
        let status = caps[2].to_string();
        let entry = report.entry(name).or_insert_with(TestExecution::passed);
        if !passed {
            entry.passed = false;
        }
        if status == "SKIPPED" && entry.output.is_empty() {
            entry.output = "SKIPPED".to_string();
        }
    }

    for (name, section) in failure_sections(stdout) {
        match report.get_mut(&name) {
            Some(entry) => {
                if entry.output.is_empty() || entry.output == "SKIPPED" {
                    entry.output = section;
                } else {
                    entry.output.push_str("\n\n");
                    entry.output.push_str(&section);
                }
            }
            None => debug!(test = %name, "failure section for a test without an outcome line"),
        }
    }

    for (name, entry) in &report {
        if !entry.passed && entry.output.is_empty() {
            warn!(test = %name, "failed test has no captured failure section");
        }
    }
    report
}

/// `(test name, section text)` for every `____ name ____` block.
fn failure_sections(stdout: &str) -> Vec<(String, String)> {
    let mut sections = Vec::new();
    let mut current: Option<(String, Vec<&str>)> = None;

    for line in stdout.lines() {
        if let Some(caps) = section_header().captures(line) {
            if let Some((name, lines)) = current.take() {
                sections.push((name, lines.join("\n").trim().to_string()));
            }
            // Methods are headed `Class.method`; reports key them `Class::method`.
            current = Some((caps[1].replace('.', "::"), Vec::new()));
        } else if is_divider(line) {
            if let Some((name, lines)) = current.take() {
                sections.push((name, lines.join("\n").trim().to_string()));
            }
        } else if let Some((_, lines)) = current.as_mut() {
            lines.push(line);
        }
    }
    if let Some((name, lines)) = current {
        sections.push((name, lines.join("\n").trim().to_string()));
    }
    sections
}
