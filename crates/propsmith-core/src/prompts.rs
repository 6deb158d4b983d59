//! Prompt templates and reply schemas for every stage.

use serde_json::{json, Value};

use crate::domain::{FunctionInfo, MultiFunctionProperty, PropertySuggestion, TestExecution};

/// Imports every generated test may rely on.
pub const ASSUMED_IMPORTS: &str = "import hypothesis\nfrom hypothesis import given, strategies as st";

const TEST_GUIDELINES: &str = "\
Follow these rules when writing tests:

1. Use `@given` with hypothesis strategies inferred from the signature or docstring.
2. Assert the stated property directly.
3. Explain the property in a short docstring or comment so a reviewer can check it.
4. Handle edge cases and expected exceptions explicitly.
5. Name each test after the property it checks.

Avoid these patterns:
- `st.data()` when a plain strategy works.
- `assume()` when `.filter()` / `.map()` or a narrower strategy works.
- `st.floats()` for values that get compared: pass `allow_nan=False, allow_infinity=False`.
- Exact equality on floats: use `math.isclose` or `numpy.isclose`.";

const CONFIDENCE_SCALE: &str = "\
Rate confidence as:
- \"high\" for mathematical definitions and well-established patterns
- \"medium\" for likely but not guaranteed properties
- \"low\" for speculative properties";

fn suggestion_item_schema(with_functions: bool) -> Value {
    let mut properties = json!({
        "property": {"type": "string"},
        "reasoning": {"type": "string"},
        "confidence": {"type": "string", "enum": ["low", "medium", "high"]}
    });
    let mut required = vec!["property", "reasoning", "confidence"];
    if with_functions {
        properties["functions_involved"] = json!({
            "type": "array",
            "items": {"type": "string"},
            "description": "Names of the functions this property relates"
        });
        required.push("functions_involved");
    }
    json!({
        "type": "object",
        "properties": {
            "items": {
                "type": "array",
                "items": {"type": "object", "properties": properties, "required": required}
            }
        },
        "required": ["items"]
    })
}

/// Reply schema for single-function suggestions.
pub fn single_suggestion_schema() -> Value {
    suggestion_item_schema(false)
}

/// Reply schema for multi-function suggestions.
pub fn multi_suggestion_schema() -> Value {
    suggestion_item_schema(true)
}

/// Reply schema for a test review.
pub fn review_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "okay": {"type": "boolean"},
            "issue": {"type": "string"},
            "fix": {"type": "string"}
        },
        "required": ["okay", "issue", "fix"]
    })
}

pub fn suggest_single(info: &FunctionInfo) -> String {
    format!(
        "Analyze this function and identify mathematical or logical properties it should satisfy.

Function: {name}
Signature: {signature}
Docstring: {docstring}

Source code:
{source}

For each property:
1. State it precisely, using mathematical notation where it helps.
2. Explain why it should hold.
3. Rate your confidence.

Look for algebraic laws (commutativity, associativity, identities), invariants and bounds,
monotonicity, round-trips, and edge-case behaviour. Every property must be testable.

{CONFIDENCE_SCALE}",
        name = info.name,
        signature = info.signature,
        docstring = info.docstring,
        source = info.source,
    )
}

pub fn suggest_multi(functions: &[FunctionInfo]) -> String {
    let described: Vec<String> = functions
        .iter()
        .enumerate()
        .map(|(i, f)| {
            format!(
                "Function {n}: {name}\nSignature: {signature}\nDocstring: {docstring}\nSource: {source}",
                n = i + 1,
                name = f.name,
                signature = f.signature,
                docstring = f.docstring,
                source = f.source,
            )
        })
        .collect();

    format!(
        "Analyze these functions together and identify properties that relate two or more of them.

Functions:
{functions}

For each property:
1. State it precisely, using mathematical notation where it helps.
2. Explain why it should hold.
3. List the functions involved, by name.
4. Rate your confidence.

Look for inverse pairs (f(g(x)) == x), composition laws, algebraic relationships between
results, shared domain/range constraints and symmetries. Skip properties of a single function.
Every property must be testable.

{CONFIDENCE_SCALE}",
        functions = described.join("\n\n"),
    )
}

pub fn write_single(module_name: &str, info: &FunctionInfo, properties: &[PropertySuggestion]) -> String {
    let listed: Vec<String> = properties
        .iter()
        .enumerate()
        .map(|(i, p)| format!("{}. {} (confidence: {})", i + 1, p.property, p.confidence))
        .collect();

    format!(
        "Write `hypothesis` tests for these properties of {name} from {module_name}.

# Function
Name: {name}
Signature: {signature}
Docstring: {docstring}

Source code:
{source}

# Properties to test
{properties}

# Guidelines
{TEST_GUIDELINES}

# Instructions
These imports are already available, together with the function itself:
```python
{ASSUMED_IMPORTS}
```
Any other import must be made inside the test function that needs it.
Reply with the test function code only.",
        name = info.name,
        signature = info.signature,
        docstring = info.docstring,
        source = info.source,
        properties = listed.join("\n"),
    )
}

pub fn write_multi(module_name: &str, property: &MultiFunctionProperty, functions: &[FunctionInfo]) -> String {
    let described: Vec<String> = functions
        .iter()
        .map(|f| {
            format!(
                "Function: {name} (from {module_name})\nSignature: {signature}\nDocstring: {docstring}\nSource: {source}",
                name = f.name,
                signature = f.signature,
                docstring = f.docstring,
                source = f.source,
            )
        })
        .collect();

    format!(
        "Write a `hypothesis` test for this property relating functions of the {module_name} module.

# Property: {property} (confidence: {confidence})
# Reasoning: {reasoning}

# Functions involved
{functions}

# Guidelines
{TEST_GUIDELINES}

# Instructions
These imports are already available, together with the functions involved:
```python
{ASSUMED_IMPORTS}
```
Any other import must be made inside the test function that needs it.
Reply with the test function code only.",
        property = property.suggestion.property,
        confidence = property.suggestion.confidence,
        reasoning = property.suggestion.reasoning,
        functions = described.join("\n\n"),
    )
}

/// Status label shown to the reviewer; `None` means the test never ran.
pub fn execution_status(execution: Option<&TestExecution>) -> &'static str {
    match execution {
        Some(e) if e.passed => "PASSED",
        Some(_) => "FAILED",
        None => "UNKNOWN",
    }
}

pub fn review_test(source: &str, execution: Option<&TestExecution>) -> String {
    let output = execution.map(|e| e.output.as_str()).unwrap_or("");
    format!(
        "Review this Hypothesis property-based test:

```python
{source}
```

Test status: {status}
Captured output:
{output}

If the test PASSED:
- okay=true when the test is well written
- okay=false when the test code itself has a problem

If the test FAILED or errored, decide whether the test is wrong (okay=false, describe the
issue and the fix) or the code under test is wrong (okay=true).

Typical test problems: strategies producing invalid values (overflow, NaN, undefined names),
float tolerances that are too strict or too loose, missing imports, syntax errors, wrong
property logic. Typical genuine bugs: sound test logic that the implementation does not
satisfy on valid inputs.

When okay=true leave issue and fix empty. When okay=false the issue must not be empty.

These imports are available, together with the functions under test:
```python
{ASSUMED_IMPORTS}
```",
        status = execution_status(execution),
    )
}

pub fn improve_test(source: &str, issue: &str, fix: &str) -> String {
    format!(
        "Fix this Hypothesis property-based test function:

```python
{source}
```

Problem identified: {issue}

Suggested fix: {fix}

These imports are available, together with the functions under test:
```python
{ASSUMED_IMPORTS}
```

Rewrite the function with the fix applied:
1. Keep the same function name and overall structure.
2. Apply the suggested fix.
3. Keep the property logic sound.
4. Use appropriate Hypothesis strategies.
5. Import anything else you need inside the function.

# Guidelines
{TEST_GUIDELINES}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Confidence;

    #[test]
    fn test_single_prompt_carries_function_context() {
        let info = FunctionInfo::new("add", "(a, b)", "Add a and b.", "def add(a, b):\n    return a + b");
        let prompt = suggest_single(&info);
        assert!(prompt.contains("Function: add"));
        assert!(prompt.contains("Signature: (a, b)"));
        assert!(prompt.contains("return a + b"));
    }

    #[test]
    fn test_write_single_numbers_properties() {
        let info = FunctionInfo::named("add");
        let props = vec![
            PropertySuggestion {
                property: "add(a, b) == add(b, a)".to_string(),
                reasoning: "commutative".to_string(),
                confidence: Confidence::High,
            },
            PropertySuggestion {
                property: "add(a, 0) == a".to_string(),
                reasoning: "identity".to_string(),
                confidence: Confidence::Medium,
            },
        ];
        let prompt = write_single("calc", &info, &props);
        assert!(prompt.contains("1. add(a, b) == add(b, a) (confidence: high)"));
        assert!(prompt.contains("2. add(a, 0) == a (confidence: medium)"));
        assert!(prompt.contains("from calc"));
    }

    #[test]
    fn test_review_prompt_status_labels() {
        assert!(review_test("def test_x(): pass", None).contains("Test status: UNKNOWN"));
        let failed = TestExecution::failed("AssertionError: 1 != 2");
        let prompt = review_test("def test_x(): pass", Some(&failed));
        assert!(prompt.contains("Test status: FAILED"));
        assert!(prompt.contains("AssertionError: 1 != 2"));
    }

    #[test]
    fn test_schemas_require_expected_fields() {
        assert_eq!(review_schema()["required"], json!(["okay", "issue", "fix"]));
        let multi = multi_suggestion_schema();
        assert!(multi["properties"]["items"]["items"]["required"]
            .as_array()
            .unwrap()
            .contains(&json!("functions_involved")));
        let single = single_suggestion_schema();
        assert!(single["properties"]["items"]["items"]["properties"]
            .get("functions_involved")
            .is_none());
    }
}
