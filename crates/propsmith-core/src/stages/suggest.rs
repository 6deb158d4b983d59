//! Suggest: propose properties for each function and across functions.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::aggregate::{StageAggregator, StageKind, StageReport};
use crate::domain::{
    FunctionInfo, MultiFunctionProperty, PropertiesDocument, PropertySuggestion, PropsmithError,
    PropsmithResult, UnitError, UnitResult,
};
use crate::extract::extract_json;
use crate::prompts;
use crate::scheduler::RequestUnit;
use crate::stages::{PipelineStage, StageContext, StageProgress};

/// Key of the single unit covering all functions at once.
pub const MULTI_FUNCTION_KEY: &str = "multi_function_properties";

/// Functions to analyze, as returned by module introspection.
#[derive(Debug, Clone)]
pub struct SuggestInput {
    pub module_name: String,
    pub functions: Vec<FunctionInfo>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SuggestStage;

#[async_trait]
impl PipelineStage for SuggestStage {
    type Input = SuggestInput;
    type Output = PropertiesDocument;

    fn kind(&self) -> StageKind {
        StageKind::Suggest
    }

    async fn run(&self, ctx: &StageContext, input: SuggestInput) -> PropsmithResult<StageReport<PropertiesDocument>> {
        if input.functions.is_empty() {
            return Err(PropsmithError::NoFunctions {
                module: input.module_name,
            });
        }
        let aggregator = StageAggregator::new(self.kind());
        let known: HashSet<String> = input.functions.iter().map(|f| f.name.clone()).collect();

        let single_units: Vec<RequestUnit<FunctionInfo>> = input
            .functions
            .iter()
            .map(|f| RequestUnit::new(f.name.clone(), f.clone()))
            .collect();

        // Relationships need at least two functions.
        let multi_units: Vec<RequestUnit<Vec<FunctionInfo>>> = if input.functions.len() >= 2 {
            vec![RequestUnit::new(MULTI_FUNCTION_KEY, input.functions.clone())]
        } else {
            Vec::new()
        };

        let progress = StageProgress::new(self.kind(), single_units.len() + multi_units.len());
        let single_caller = ctx.caller();
        let multi_caller = ctx.caller();
        let (single_outcomes, multi_outcomes) = tokio::join!(
            ctx.run_units(&progress, single_units, move |info: FunctionInfo| {
                let caller = single_caller.clone();
                async move {
                    let reply = caller
                        .structured(prompts::suggest_single(&info), prompts::single_suggestion_schema())
                        .await?;
                    parse_items::<PropertySuggestion>(&reply)
                }
            }),
            ctx.run_units(&progress, multi_units, move |infos: Vec<FunctionInfo>| {
                let caller = multi_caller.clone();
                async move {
                    let reply = caller
                        .structured(prompts::suggest_multi(&infos), prompts::multi_suggestion_schema())
                        .await?;
                    parse_items::<MultiFunctionProperty>(&reply)
                }
            }),
        );

        let singles = aggregator.collect(single_outcomes);
        let multi = aggregator.collect(multi_outcomes);

        let mut document = PropertiesDocument::new(input.module_name);
        let succeeded = singles.successes.len() + multi.successes.len();
        for (name, suggestions) in singles.successes {
            debug!(function = %name, count = suggestions.len(), "properties suggested");
            document.single_function_properties.insert(name, suggestions);
        }
        // A failed multi unit leaves the list empty.
        if let Some((_, properties)) = multi.successes.into_iter().next() {
            document.multi_function_properties = retain_known(properties, &known);
        }

        info!(
            module = %document.module_name,
            properties = document.total_properties(),
            "suggestions collected"
        );
        let mut failures = singles.failures;
        failures.extend(multi.failures);
        Ok(aggregator.finish(document, succeeded, failures))
    }
}

/// Parse `{"items": [...]}` (or a bare array) into typed items.
fn parse_items<T: DeserializeOwned>(reply: &str) -> UnitResult<Vec<T>> {
    let value = extract_json(reply)?;
    let items = match value {
        Value::Object(mut obj) => obj
            .remove("items")
            .ok_or_else(|| UnitError::malformed("reply has no `items` field"))?,
        array @ Value::Array(_) => array,
        _ => return Err(UnitError::malformed("reply is neither an object nor an array")),
    };
    serde_json::from_value(items).map_err(|e| UnitError::malformed(format!("unexpected item shape: {e}")))
}

/// Drop multi-function properties that name unknown functions or fewer than two functions.
fn retain_known(properties: Vec<MultiFunctionProperty>, known: &HashSet<String>) -> Vec<MultiFunctionProperty> {
    properties
        .into_iter()
        .filter(|p| {
            let distinct: HashSet<&String> = p.functions_involved.iter().collect();
            let unknown: Vec<&String> = p.functions_involved.iter().filter(|f| !known.contains(*f)).collect();
            if !unknown.is_empty() {
                warn!(property = %p.suggestion.property, unknown = ?unknown, "dropping property naming unknown functions");
                false
            } else if distinct.len() < 2 {
                warn!(property = %p.suggestion.property, "dropping multi-function property naming fewer than two functions");
                false
            } else {
                true
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Confidence;
    use serde_json::json;

    #[test]
    fn test_parse_items_accepts_object_and_array() {
        let obj = json!({"items": [{"property": "p", "reasoning": "r", "confidence": "certain"}]}).to_string();
        let parsed: Vec<PropertySuggestion> = parse_items(&obj).unwrap();
        assert_eq!(parsed[0].confidence, Confidence::High);

        let arr = json!([{"property": "p", "reasoning": "r", "confidence": "low"}]).to_string();
        let parsed: Vec<PropertySuggestion> = parse_items(&arr).unwrap();
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn test_parse_items_rejects_wrong_shapes() {
        assert!(parse_items::<PropertySuggestion>(r#"{"properties": []}"#).is_err());
        assert!(parse_items::<PropertySuggestion>(r#"{"items": [{"property": "p"}]}"#).is_err());
        assert!(parse_items::<PropertySuggestion>("42").is_err());
    }

    #[test]
    fn test_retain_known_filters_bad_references() {
        let known: HashSet<String> = ["add", "sub"].iter().map(|s| s.to_string()).collect();
        let prop = |fs: &[&str]| MultiFunctionProperty {
            suggestion: PropertySuggestion {
                property: "p".to_string(),
                reasoning: "r".to_string(),
                confidence: Confidence::Medium,
            },
            functions_involved: fs.iter().map(|s| s.to_string()).collect(),
        };
        let kept = retain_known(
            vec![prop(&["add", "sub"]), prop(&["add", "mul"]), prop(&["add", "add"])],
            &known,
        );
        assert_eq!(kept, vec![prop(&["add", "sub"])]);
    }
}
