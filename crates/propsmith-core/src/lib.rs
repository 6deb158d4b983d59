//! propsmith core library
//!
//! Bounded model fan-out, per-stage aggregation with failure manifests, and
//! the four-stage property-based test synthesis pipeline
//! (suggest → write → review → improve).

pub mod aggregate;
pub mod collaborators;
pub mod domain;
pub mod extract;
pub mod fakes;
pub mod model;
pub mod obs;
pub mod pipeline;
pub mod prompts;
pub mod reporting;
pub mod scheduler;
pub mod source;
pub mod stages;
pub mod telemetry;

pub use aggregate::{Collected, StageAggregator, StageKind, StageReport, UnitFailure};
pub use collaborators::{ModuleIntrospector, TestExecutor};
pub use domain::{
    Confidence, FunctionInfo, MultiFunctionProperty, PropertiesDocument, PropertySuggestion, PropsmithError,
    PropsmithResult, ReviewDocument, TestExecution, TestReview, TestRunReport, UnitError, UnitResult,
};
pub use model::{ModelClient, ModelError, ModelRequest};
pub use pipeline::{Pipeline, PipelineConfig, DEFAULT_MAX_CONCURRENT_REQUESTS, DEFAULT_MODEL};
pub use scheduler::{BoundedScheduler, Outcome, RequestUnit, UnitOutcome};
pub use source::{TestEdit, TestFunction, TestModule};
pub use stages::{PipelineStage, StageContext, UnreviewedPolicy};
pub use telemetry::init_tracing;
