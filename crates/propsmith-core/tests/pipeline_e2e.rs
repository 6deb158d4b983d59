//! End-to-end pipeline tests: suggest → write → review → improve over fakes.

use std::collections::BTreeMap;
use std::sync::Arc;

use propsmith_core::fakes::{ScriptedModel, StaticExecutor, StaticIntrospector};
use propsmith_core::{
    FunctionInfo, ModelError, ModelRequest, Pipeline, PipelineConfig, PropsmithError, ReviewDocument, StageKind,
    TestExecution, TestModule,
};

const ADD_SOURCE: &str = "def add(a, b):\n    \"\"\"Return the sum of a and b.\"\"\"\n    return a + b\n";

fn calc_module() -> StaticIntrospector {
    StaticIntrospector::new().with_module(
        "calc",
        vec![FunctionInfo::new("add", "(a, b)", "Return the sum of a and b.", ADD_SOURCE)],
    )
}

const WRITTEN_TESTS: &str = "```python
@given(st.integers(), st.integers())
def test_add_commutes(a, b):
    assert add(a, b) == add(b, a) + 1


@given(st.integers())
def test_add_identity(a):
    assert add(a, 0) == a
```";

const FIXED_TEST: &str = "```python
@given(st.integers(), st.integers())
def test_add_commutes(a, b):
    assert add(a, b) == add(b, a)
```";

/// Answers each stage's prompt the way a cooperative model would.
fn respond(request: &ModelRequest) -> Result<String, ModelError> {
    let prompt = request.prompt.as_str();
    if prompt.starts_with("Analyze this function") {
        return Ok(r#"{"items": [
            {"property": "add(a, b) == add(b, a)", "reasoning": "addition is commutative", "confidence": "high"},
            {"property": "add(a, 0) == a", "reasoning": "zero is the identity", "confidence": "certain"}
        ]}"#
        .to_string());
    }
    if prompt.starts_with("Write `hypothesis` tests") {
        return Ok(WRITTEN_TESTS.to_string());
    }
    if prompt.starts_with("Review this Hypothesis") {
        if prompt.contains("def test_add_commutes") {
            return Ok(r#"{"okay": false, "issue": "the assertion adds 1 to one side", "fix": "compare add(a, b) with add(b, a) directly"}"#.to_string());
        }
        return Ok("I would rather not say.".to_string());
    }
    if prompt.starts_with("Fix this Hypothesis") {
        return Ok(FIXED_TEST.to_string());
    }
    Err(ModelError::Transport(format!("unexpected prompt: {}", &prompt[..prompt.len().min(40)])))
}

fn pipeline(model: Arc<ScriptedModel>, limit: usize) -> Pipeline {
    let config = PipelineConfig {
        max_concurrent_requests: limit,
        ..PipelineConfig::default()
    };
    Pipeline::new(config, model).expect("valid pipeline")
}

#[tokio::test]
async fn test_add_scenario_end_to_end() {
    let model = Arc::new(ScriptedModel::new(respond));
    let pipeline = pipeline(Arc::clone(&model), 4);
    let introspector = calc_module();

    // suggest
    let suggested = pipeline.suggest(&introspector, "calc", None).await.expect("suggest");
    assert!(suggested.is_complete());
    let properties = suggested.artifact;
    assert_eq!(properties.module_name, "calc");
    let add_props = &properties.single_function_properties["add"];
    assert_eq!(add_props.len(), 2);
    assert_eq!(add_props[0].property, "add(a, b) == add(b, a)");
    assert!(properties.multi_function_properties.is_empty());

    // the JSON artifact round-trips through the on-disk shape
    let json = serde_json::to_value(&properties).expect("serialize");
    assert!(json["multi_function_properties"].as_array().expect("list").is_empty());
    assert_eq!(json["single_function_properties"]["add"][1]["confidence"], "high");

    // write
    let written = pipeline.write(&introspector, properties).await.expect("write");
    assert!(written.is_complete());
    let test_source = written.artifact;
    assert_eq!(test_source.matches("from calc import add\n").count(), 1);
    assert!(test_source.contains("def test_add_commutes(a, b):"));
    let calls = model.calls();
    let write_prompt = &calls.last().expect("write call").prompt;
    assert!(write_prompt.contains("return a + b"), "write prompt carries the function source");

    let dir = tempfile::tempdir().expect("tempdir");
    let test_file = dir.path().join("test_calc.py");
    std::fs::write(&test_file, &test_source).expect("write test file");

    // review against a failing execution
    let mut results = BTreeMap::new();
    results.insert(
        "test_add_commutes".to_string(),
        TestExecution::failed("AssertionError: assert 3 == (3 + 1)"),
    );
    results.insert("test_add_identity".to_string(), TestExecution::passed());
    let executor = StaticExecutor::new(results);

    let reviewed = pipeline.review(&executor, &test_file).await.expect("review");
    assert_eq!(executor.executed(), vec![test_file.clone()]);
    assert_eq!(reviewed.failures.len(), 1);
    assert_eq!(reviewed.failures[0].stage, StageKind::Review);
    assert_eq!(reviewed.failures[0].key, "test_add_identity");

    let reviews = reviewed.artifact;
    assert_eq!(reviews.test_file, test_file.display().to_string());
    let verdict = &reviews.reviews["test_add_commutes"];
    assert!(!verdict.okay);
    assert!(!verdict.issue.is_empty());
    assert!(!verdict.fix.is_empty());
    assert!(!reviews.reviews.contains_key("test_add_identity"));

    // improve
    let improved = pipeline.improve(test_source.clone(), reviews).await.expect("improve");
    assert!(improved.is_complete());
    let before = TestModule::parse(&test_source);
    let after = TestModule::parse(&improved.artifact);

    assert_ne!(
        before.test("test_add_commutes").expect("original").source,
        after.test("test_add_commutes").expect("improved").source
    );
    assert!(!improved.artifact.contains("+ 1"));
    assert_eq!(
        before.test("test_add_identity").expect("original").source,
        after.test("test_add_identity").expect("kept").source
    );
    let header_end = test_source.find("@given").expect("first test");
    assert!(improved.artifact.starts_with(&test_source[..header_end]));
}

#[tokio::test]
async fn test_improve_with_empty_reviews_is_identity() {
    let model = Arc::new(ScriptedModel::new(respond));
    let pipeline = pipeline(Arc::clone(&model), 2);
    let source = "import math\n\ndef test_a():\n    assert math.pi > 3\n\n# trailing comment\n";

    let report = pipeline
        .improve(source.to_string(), ReviewDocument::new("test_x.py"))
        .await
        .expect("improve");
    assert_eq!(report.artifact, source);
    assert_eq!(report.total_units(), 0);
    assert_eq!(model.call_count(), 0);
}

#[tokio::test]
async fn test_fatal_errors_abort_before_scheduling() {
    let model = Arc::new(ScriptedModel::new(respond));

    let zero = PipelineConfig {
        max_concurrent_requests: 0,
        ..PipelineConfig::default()
    };
    assert!(matches!(
        Pipeline::new(zero, model.clone()),
        Err(PropsmithError::InvalidConfig(_))
    ));

    let pipeline = pipeline(Arc::clone(&model), 2);
    let empty = StaticIntrospector::new().with_module("empty", vec![FunctionInfo::named("_hidden")]);
    assert!(matches!(
        pipeline.suggest(&empty, "empty", None).await,
        Err(PropsmithError::NoFunctions { .. })
    ));

    let filter = vec!["mul".to_string()];
    assert!(matches!(
        pipeline.suggest(&calc_module(), "calc", Some(&filter)).await,
        Err(PropsmithError::Introspection(_))
    ));

    let executor = StaticExecutor::new(BTreeMap::new());
    let missing = std::path::Path::new("/definitely/not/here/test_calc.py");
    assert!(matches!(pipeline.review(&executor, missing).await, Err(PropsmithError::Io(_))));

    assert_eq!(model.call_count(), 0);
}
