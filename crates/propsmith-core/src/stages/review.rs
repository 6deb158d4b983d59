//! Review: judge each test function in light of its execution result.

use async_trait::async_trait;
use tracing::debug;

use crate::aggregate::{StageAggregator, StageKind, StageReport};
use crate::domain::{PropsmithResult, ReviewDocument, TestExecution, TestReview, TestRunReport, UnitError, UnitResult};
use crate::extract::extract_json;
use crate::prompts;
use crate::scheduler::RequestUnit;
use crate::source::TestModule;
use crate::stages::{PipelineStage, StageContext, StageProgress};

/// A test file's text together with the results of executing it.
#[derive(Debug, Clone)]
pub struct ReviewInput {
    /// Recorded as `test_file` in the review document.
    pub test_file: String,
    pub source: String,
    pub results: TestRunReport,
}

#[derive(Debug, Clone)]
struct ReviewPayload {
    source: String,
    execution: Option<TestExecution>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ReviewStage;

#[async_trait]
impl PipelineStage for ReviewStage {
    type Input = ReviewInput;
    type Output = ReviewDocument;

    fn kind(&self) -> StageKind {
        StageKind::Review
    }

    async fn run(&self, ctx: &StageContext, input: ReviewInput) -> PropsmithResult<StageReport<ReviewDocument>> {
        let aggregator = StageAggregator::new(self.kind());
        let module = TestModule::parse(&input.source);

        let units: Vec<RequestUnit<ReviewPayload>> = module
            .tests()
            .into_iter()
            .map(|test| {
                let execution = input.results.get(&test.name).cloned();
                if execution.is_none() {
                    debug!(test = %test.name, "no execution result; reviewing as UNKNOWN");
                }
                RequestUnit::new(
                    test.name.clone(),
                    ReviewPayload {
                        source: test.source.clone(),
                        execution,
                    },
                )
            })
            .collect();

        let progress = StageProgress::new(self.kind(), units.len());
        let caller = ctx.caller();
        let outcomes = ctx
            .run_units(&progress, units, move |payload: ReviewPayload| {
                let caller = caller.clone();
                async move {
                    let prompt = prompts::review_test(&payload.source, payload.execution.as_ref());
                    let reply = caller.structured(prompt, prompts::review_schema()).await?;
                    parse_review(&reply)
                }
            })
            .await;

        let collected = aggregator.collect(outcomes);
        let succeeded = collected.successes.len();
        let mut document = ReviewDocument::new(input.test_file);
        document.reviews.extend(collected.successes);
        Ok(aggregator.finish(document, succeeded, collected.failures))
    }
}

/// Parse a reply into a review that satisfies the okay/issue invariant.
fn parse_review(reply: &str) -> UnitResult<TestReview> {
    let value = extract_json(reply)?;
    let mut review: TestReview =
        serde_json::from_value(value).map_err(|e| UnitError::malformed(format!("unexpected review shape: {e}")))?;
    if review.okay {
        review.issue.clear();
        review.fix.clear();
    }
    review.validate().map_err(UnitError::malformed)?;
    Ok(review)
}
