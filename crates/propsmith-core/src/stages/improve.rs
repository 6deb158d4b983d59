//! Improve: rewrite the tests a review flagged, keep everything else.

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::aggregate::{StageAggregator, StageKind, StageReport};
use crate::domain::{PropsmithResult, ReviewDocument, TestReview, UnitError, UnitResult};
use crate::extract::extract_code;
use crate::prompts;
use crate::scheduler::RequestUnit;
use crate::source::{TestEdit, TestModule};
use crate::stages::{PipelineStage, StageContext, StageProgress};

/// What to do with test functions the review document does not mention.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnreviewedPolicy {
    /// Emit them unchanged.
    #[default]
    Keep,
    /// Leave them out of the improved file.
    Drop,
}

impl FromStr for UnreviewedPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "keep" => Ok(Self::Keep),
            "drop" => Ok(Self::Drop),
            other => Err(format!("unknown unreviewed policy '{other}' (expected keep or drop)")),
        }
    }
}

impl std::fmt::Display for UnreviewedPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Keep => f.write_str("keep"),
            Self::Drop => f.write_str("drop"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImproveInput {
    pub source: String,
    pub reviews: ReviewDocument,
}

impl ImproveInput {
    /// Tests in `source` whose review asks for a fix.
    pub fn flagged_tests(&self) -> usize {
        TestModule::parse(&self.source)
            .tests()
            .iter()
            .filter(|t| self.reviews.reviews.get(&t.name).is_some_and(|r| !r.okay))
            .count()
    }
}

#[derive(Debug, Clone)]
struct ImprovePayload {
    source: String,
    review: TestReview,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ImproveStage {
    pub unreviewed: UnreviewedPolicy,
}

impl ImproveStage {
    pub fn new(unreviewed: UnreviewedPolicy) -> Self {
        Self { unreviewed }
    }
}

#[async_trait]
impl PipelineStage for ImproveStage {
    type Input = ImproveInput;
    type Output = String;

    fn kind(&self) -> StageKind {
        StageKind::Improve
    }

    async fn run(&self, ctx: &StageContext, input: ImproveInput) -> PropsmithResult<StageReport<String>> {
        let ImproveInput { source, reviews } = input;
        reviews.validate()?;

        let aggregator = StageAggregator::new(self.kind());
        let module = TestModule::parse(&source);
        let tests = module.tests();

        for name in reviews.reviews.keys() {
            if module.test(name).is_none() {
                warn!(test = %name, "review names a test that is not in the file");
            }
        }

        let mut edits: HashMap<String, TestEdit> = HashMap::new();
        let mut units = Vec::new();
        for test in &tests {
            match reviews.reviews.get(&test.name) {
                Some(review) if review.okay => {}
                Some(review) => units.push(RequestUnit::new(
                    test.name.clone(),
                    ImprovePayload {
                        source: test.source.clone(),
                        review: review.clone(),
                    },
                )),
                None => {
                    debug!(test = %test.name, policy = %self.unreviewed, "test has no review");
                    if self.unreviewed == UnreviewedPolicy::Drop {
                        edits.insert(test.name.clone(), TestEdit::Drop);
                    }
                }
            }
        }

        let progress = StageProgress::new(self.kind(), units.len());
        let caller = ctx.caller();
        let outcomes = ctx
            .run_units(&progress, units, move |payload: ImprovePayload| {
                let caller = caller.clone();
                async move {
                    let prompt = prompts::improve_test(&payload.source, &payload.review.issue, &payload.review.fix);
                    let reply = caller.text(prompt).await?;
                    improved_code(&reply)
                }
            })
            .await;

        let collected = aggregator.collect(outcomes);
        let succeeded = collected.successes.len();
        for (name, code) in collected.successes {
            edits.insert(name, TestEdit::Replace(code));
        }

        // Failed units keep their original text.
        let artifact = if edits.is_empty() {
            source
        } else {
            module.render_with(&edits)
        };
        Ok(aggregator.finish(artifact, succeeded, collected.failures))
    }
}

fn improved_code(reply: &str) -> UnitResult<String> {
    let code = extract_code(reply);
    if code.trim().is_empty() {
        return Err(UnitError::malformed("reply contained no improved code"));
    }
    Ok(code)
}
