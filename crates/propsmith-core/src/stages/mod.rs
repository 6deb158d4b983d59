//! The four pipeline stages.
//!
//! Each stage builds its request units from the input artifact, fans them
//! out through the shared [`BoundedScheduler`], and folds the outcomes into
//! its artifact with a [`StageAggregator`].
//!
//! # Module layout
//!
//! - [`suggest`]: `SuggestStage`: functions → `PropertiesDocument`
//! - [`write`]: `WriteStage`: `PropertiesDocument` → test source
//! - [`review`]: `ReviewStage`: test source + execution results → `ReviewDocument`
//! - [`improve`]: `ImproveStage`: test source + `ReviewDocument` → test source

pub mod improve;
pub mod review;
pub mod suggest;
pub mod write;

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::aggregate::{StageKind, StageReport};
use crate::domain::{PropsmithResult, UnitResult};
use crate::model::{ModelClient, ModelRequest};
use crate::obs::emit_unit_finished;
use crate::scheduler::{BoundedScheduler, RequestUnit, UnitOutcome};

pub use improve::{ImproveInput, ImproveStage, UnreviewedPolicy};
pub use review::{ReviewInput, ReviewStage};
pub use suggest::{SuggestInput, SuggestStage};
pub use write::{WriteInput, WriteStage};

/// What every stage needs to talk to the model.
#[derive(Clone)]
pub struct StageContext {
    pub model: Arc<dyn ModelClient>,
    /// Model identifier sent with every request.
    pub model_name: String,
    pub scheduler: BoundedScheduler,
}

impl StageContext {
    pub fn new(model: Arc<dyn ModelClient>, model_name: impl Into<String>, scheduler: BoundedScheduler) -> Self {
        Self {
            model,
            model_name: model_name.into(),
            scheduler,
        }
    }

    /// Schedule `units`, reporting each settled unit against `progress`.
    pub(crate) async fn run_units<P, T, F, Fut>(
        &self,
        progress: &StageProgress,
        units: Vec<RequestUnit<P>>,
        call: F,
    ) -> Vec<UnitOutcome<T>>
    where
        P: Send + 'static,
        T: Send + 'static,
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = UnitResult<T>> + Send + 'static,
    {
        self.scheduler
            .run_observed(units, call, |key, _| progress.settle(key))
            .await
    }

    /// A cheap, `'static` handle for use inside unit closures.
    pub(crate) fn caller(&self) -> ModelCaller {
        ModelCaller {
            model: Arc::clone(&self.model),
            model_name: self.model_name.clone(),
        }
    }
}

/// Settled-unit counter shared by every batch of one stage run.
pub(crate) struct StageProgress {
    stage: StageKind,
    total: usize,
    completed: AtomicUsize,
}

impl StageProgress {
    pub(crate) fn new(stage: StageKind, total: usize) -> Self {
        Self {
            stage,
            total,
            completed: AtomicUsize::new(0),
        }
    }

    fn settle(&self, key: &str) {
        let completed = self.completed.fetch_add(1, Ordering::Relaxed) + 1;
        emit_unit_finished(self.stage, key, completed, self.total);
    }
}

/// Owned model handle moved into each unit's future.
#[derive(Clone)]
pub(crate) struct ModelCaller {
    model: Arc<dyn ModelClient>,
    model_name: String,
}

impl ModelCaller {
    pub(crate) async fn text(&self, prompt: String) -> UnitResult<String> {
        let request = ModelRequest::text(self.model_name.clone(), prompt);
        Ok(self.model.complete(&request).await?)
    }

    pub(crate) async fn structured(&self, prompt: String, schema: serde_json::Value) -> UnitResult<String> {
        let request = ModelRequest::structured(self.model_name.clone(), prompt, schema);
        Ok(self.model.complete(&request).await?)
    }
}

/// One phase of the pipeline.
#[async_trait]
pub trait PipelineStage: Send + Sync {
    type Input: Send;
    type Output: Send;

    fn kind(&self) -> StageKind;

    /// Run the stage. `Err` is reserved for fatal input problems detected
    /// before any unit is scheduled; unit failures land in the report.
    async fn run(&self, ctx: &StageContext, input: Self::Input) -> PropsmithResult<StageReport<Self::Output>>;
}
