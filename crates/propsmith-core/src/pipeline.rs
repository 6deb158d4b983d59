//! The pipeline facade: configuration plus one entry point per stage.
//!
//! Every stage run gets its own `run_id`, a stage-scoped span, and
//! `stage.started` / `stage.finished` events. All stages share one
//! [`BoundedScheduler`], so the concurrency cap holds across stages running
//! in the same process.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, warn, Instrument};

use crate::aggregate::StageReport;
use crate::collaborators::{ModuleIntrospector, TestExecutor};
use crate::domain::{FunctionInfo, PropertiesDocument, PropsmithError, PropsmithResult, ReviewDocument};
use crate::model::ModelClient;
use crate::obs::{emit_stage_finished, emit_stage_started, stage_span};
use crate::scheduler::BoundedScheduler;
use crate::stages::{
    ImproveInput, ImproveStage, PipelineStage, ReviewInput, ReviewStage, StageContext, SuggestInput, SuggestStage,
    UnreviewedPolicy, WriteInput, WriteStage,
};

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Model identifier sent with every request.
    pub model: String,
    /// Upper bound on model requests in flight at once. Must be at least 1.
    pub max_concurrent_requests: usize,
    /// Treatment of tests the review document does not mention.
    #[serde(default)]
    pub unreviewed: UnreviewedPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            unreviewed: UnreviewedPolicy::default(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> PropsmithResult<()> {
        if self.model.trim().is_empty() {
            return Err(PropsmithError::InvalidConfig("model must not be empty".to_string()));
        }
        if self.max_concurrent_requests == 0 {
            return Err(PropsmithError::InvalidConfig(
                "max_concurrent_requests must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    ctx: StageContext,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, model: Arc<dyn ModelClient>) -> PropsmithResult<Self> {
        config.validate()?;
        let scheduler = BoundedScheduler::new(config.max_concurrent_requests)?;
        let ctx = StageContext::new(model, config.model.clone(), scheduler);
        Ok(Self { config, ctx })
    }

    /// Propose properties for the functions of `module`.
    ///
    /// `functions` restricts the analysis to the named functions; naming one
    /// the module lacks is fatal, as is a module with no public functions.
    pub async fn suggest(
        &self,
        introspector: &dyn ModuleIntrospector,
        module: &str,
        functions: Option<&[String]>,
    ) -> PropsmithResult<StageReport<PropertiesDocument>> {
        let infos = introspector.introspect(module, functions).await?;
        if infos.is_empty() {
            return Err(PropsmithError::NoFunctions {
                module: module.to_string(),
            });
        }
        let input = SuggestInput {
            module_name: module.to_string(),
            functions: infos,
        };
        self.run_stage(&SuggestStage, input, |i| i.functions.len() + usize::from(i.functions.len() >= 2))
            .await
    }

    /// Generate a test file from a properties document.
    pub async fn write(
        &self,
        introspector: &dyn ModuleIntrospector,
        document: PropertiesDocument,
    ) -> PropsmithResult<StageReport<String>> {
        document.validate()?;
        let names: Vec<String> = document.referenced_functions().into_iter().collect();
        let functions = resolve_functions(introspector, &document.module_name, &names).await?;
        let input = WriteInput { document, functions };
        self.run_stage(&WriteStage, input, |i| {
            i.document.single_function_properties.values().filter(|p| !p.is_empty()).count()
                + i.document.multi_function_properties.len()
        })
        .await
    }

    /// Execute `test_file` and review each of its test functions.
    pub async fn review(
        &self,
        executor: &dyn TestExecutor,
        test_file: &Path,
    ) -> PropsmithResult<StageReport<ReviewDocument>> {
        let source = tokio::fs::read_to_string(test_file).await?;
        let results = executor.execute(test_file).await?;
        let input = ReviewInput {
            test_file: test_file.display().to_string(),
            source,
            results,
        };
        self.run_stage(&ReviewStage, input, |i| crate::source::TestModule::parse(&i.source).tests().len())
            .await
    }

    /// Rewrite the tests `reviews` flagged; everything else in `source` is preserved.
    pub async fn improve(&self, source: String, reviews: ReviewDocument) -> PropsmithResult<StageReport<String>> {
        let stage = ImproveStage::new(self.config.unreviewed);
        let input = ImproveInput { source, reviews };
        self.run_stage(&stage, input, ImproveInput::flagged_tests).await
    }

    async fn run_stage<S, F>(&self, stage: &S, input: S::Input, units: F) -> PropsmithResult<StageReport<S::Output>>
    where
        S: PipelineStage,
        F: FnOnce(&S::Input) -> usize,
    {
        let run_id = uuid::Uuid::new_v4().to_string();
        let kind = stage.kind();
        let unit_count = units(&input);
        async move {
            emit_stage_started(kind, unit_count);
            let started = Instant::now();
            let report = stage.run(&self.ctx, input).await?;
            emit_stage_finished(
                kind,
                report.succeeded,
                report.failures.len(),
                started.elapsed().as_millis() as u64,
            );
            Ok(report)
        }
        .instrument(stage_span(kind, &run_id))
        .await
    }
}

/// Look up the referenced functions; names the module no longer has are
/// skipped so that their units fall back to name-only prompts.
async fn resolve_functions(
    introspector: &dyn ModuleIntrospector,
    module: &str,
    names: &[String],
) -> PropsmithResult<Vec<FunctionInfo>> {
    if names.is_empty() {
        return Ok(Vec::new());
    }
    let batch_err = match introspector.introspect(module, Some(names)).await {
        Ok(functions) => return Ok(functions),
        Err(err) => err,
    };
    warn!(module = %module, error = %batch_err, "batch introspection failed; resolving functions one by one");

    let mut resolved = Vec::new();
    for name in names {
        match introspector.introspect(module, Some(std::slice::from_ref(name))).await {
            Ok(mut found) => resolved.append(&mut found),
            Err(err) => warn!(function = %name, error = %err, "function unavailable; writing from its name only"),
        }
    }
    if resolved.is_empty() {
        return Err(batch_err);
    }
    info!(resolved = resolved.len(), requested = names.len(), "functions resolved individually");
    Ok(resolved)
}
