//! propsmith - LLM-driven property-based test synthesis
//!
//! ## Commands
//!
//! - `suggest`: propose properties for the functions of a Python module
//! - `write`: generate a Hypothesis test file from a properties document
//! - `review`: run a test file and review every test function
//! - `improve`: rewrite the tests a review flagged

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use propsmith_core::reporting::{
    load_properties, load_reviews, report_failures, write_json_artifact, write_text_artifact,
};
use propsmith_core::{
    ModuleIntrospector, Pipeline, PipelineConfig, StageReport, TestExecutor, UnreviewedPolicy,
    DEFAULT_MAX_CONCURRENT_REQUESTS, DEFAULT_MODEL,
};
use propsmith_exec::{PytestExecutor, PythonIntrospector};
use propsmith_llm::AnthropicClient;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};

#[derive(Parser, Debug)]
#[command(name = "propsmith")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Suggest, write, review and improve property-based tests with an LLM", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// Model identifier
    #[arg(long, global = true, env = "PROPSMITH_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Maximum model requests in flight at once
    #[arg(
        long,
        global = true,
        env = "PROPSMITH_MAX_CONCURRENT_REQUESTS",
        default_value_t = DEFAULT_MAX_CONCURRENT_REQUESTS,
        value_parser = parse_limit
    )]
    max_concurrent_requests: usize,

    /// Write the artifact here instead of standard output
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Python interpreter used for introspection and pytest
    #[arg(long, global = true, env = "PROPSMITH_PYTHON", default_value = "python3")]
    python: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Propose properties for the functions of a module
    Suggest {
        /// Importable module name
        module: String,

        /// Comma-separated function names (default: all public functions)
        #[arg(long, value_delimiter = ',')]
        functions: Option<Vec<String>>,
    },

    /// Generate a test file from a properties document
    Write {
        /// Path to a properties document, or the JSON itself
        properties: String,
    },

    /// Run a test file and review each test function
    Review {
        /// Python test file
        test_file: PathBuf,
    },

    /// Rewrite the tests a review document flagged
    Improve {
        /// Python test file
        test_file: PathBuf,

        /// Path to a review document, or the JSON itself
        reviews: String,

        /// What to do with tests the review does not mention
        #[arg(long, default_value_t = UnreviewedPolicy::Keep)]
        unreviewed: UnreviewedPolicy,
    },
}

fn parse_limit(value: &str) -> std::result::Result<usize, String> {
    let limit: usize = value.parse().map_err(|e| format!("{e}"))?;
    if limit == 0 {
        return Err("must be at least 1".to_string());
    }
    Ok(limit)
}

impl GlobalArgs {
    fn log_level(&self) -> Level {
        if self.quiet {
            Level::WARN
        } else if self.verbose {
            Level::DEBUG
        } else {
            Level::INFO
        }
    }

    fn pipeline_config(&self, unreviewed: UnreviewedPolicy) -> PipelineConfig {
        PipelineConfig {
            model: self.model.clone(),
            max_concurrent_requests: self.max_concurrent_requests,
            unreviewed,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    propsmith_core::init_tracing(cli.global.json, cli.global.log_level());

    let unreviewed = match &cli.command {
        Commands::Improve { unreviewed, .. } => *unreviewed,
        _ => UnreviewedPolicy::default(),
    };
    let client = AnthropicClient::from_env().context("Failed to configure the model provider")?;
    let pipeline = Pipeline::new(cli.global.pipeline_config(unreviewed), Arc::new(client))
        .context("Invalid pipeline configuration")?;
    let output = cli.global.output.as_deref();

    match cli.command {
        Commands::Suggest { module, functions } => {
            let introspector = PythonIntrospector::new(&cli.global.python);
            cmd_suggest(&pipeline, &introspector, &module, functions.as_deref(), output).await
        }
        Commands::Write { properties } => {
            let introspector = PythonIntrospector::new(&cli.global.python);
            cmd_write(&pipeline, &introspector, &properties, output).await
        }
        Commands::Review { test_file } => {
            let executor = PytestExecutor::new(&cli.global.python);
            cmd_review(&pipeline, &executor, &test_file, output).await
        }
        Commands::Improve {
            test_file, reviews, ..
        } => cmd_improve(&pipeline, &test_file, &reviews, output).await,
    }
}

fn finish_stage<A>(report: &StageReport<A>, output: Option<&Path>) {
    report_failures(report);
    if let Some(path) = output {
        info!(path = %path.display(), "wrote {} artifact", report.stage.name());
    }
}

async fn cmd_suggest(
    pipeline: &Pipeline,
    introspector: &dyn ModuleIntrospector,
    module: &str,
    functions: Option<&[String]>,
    output: Option<&Path>,
) -> Result<()> {
    let report = pipeline
        .suggest(introspector, module, functions)
        .await
        .with_context(|| format!("Failed to suggest properties for module {module:?}"))?;
    write_json_artifact(output, &report.artifact)?;
    finish_stage(&report, output);
    Ok(())
}

async fn cmd_write(
    pipeline: &Pipeline,
    introspector: &dyn ModuleIntrospector,
    properties: &str,
    output: Option<&Path>,
) -> Result<()> {
    let document = load_properties(properties).context("Failed to load properties document")?;
    let report = pipeline
        .write(introspector, document)
        .await
        .context("Failed to write tests")?;
    write_text_artifact(output, &report.artifact)?;
    finish_stage(&report, output);
    Ok(())
}

async fn cmd_review(
    pipeline: &Pipeline,
    executor: &dyn TestExecutor,
    test_file: &Path,
    output: Option<&Path>,
) -> Result<()> {
    let report = pipeline
        .review(executor, test_file)
        .await
        .with_context(|| format!("Failed to review {}", test_file.display()))?;
    write_json_artifact(output, &report.artifact)?;
    finish_stage(&report, output);
    Ok(())
}

async fn cmd_improve(pipeline: &Pipeline, test_file: &Path, reviews: &str, output: Option<&Path>) -> Result<()> {
    let source = tokio::fs::read_to_string(test_file)
        .await
        .with_context(|| format!("Failed to read {}", test_file.display()))?;
    let reviews = load_reviews(reviews).context("Failed to load review document")?;
    let report = pipeline
        .improve(source, reviews)
        .await
        .context("Failed to improve tests")?;
    write_text_artifact(output, &report.artifact)?;
    finish_stage(&report, output);
    Ok(())
}
