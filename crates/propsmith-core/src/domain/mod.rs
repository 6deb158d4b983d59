//! Domain models for propsmith.
//!
//! - `FunctionInfo`: what is known about a function under test
//! - `PropertiesDocument`: suggested properties (suggest → write)
//! - `ReviewDocument`: per-test verdicts (review → improve)
//! - `TestExecution`: one test's pass/fail result and captured output

pub mod error;
pub mod function;
pub mod properties;
pub mod review;

pub use error::{PropsmithError, PropsmithResult, UnitError, UnitResult};
pub use function::FunctionInfo;
pub use properties::{
    Confidence, MultiFunctionProperty, PropertiesDocument, PropertySuggestion,
    SingleFunctionProperties,
};
pub use review::{ReviewDocument, TestExecution, TestReview, TestRunReport};
