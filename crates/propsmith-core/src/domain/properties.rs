//! Property suggestions and the persisted properties document.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::domain::error::{PropsmithError, PropsmithResult};

/// How sure the model is that a property holds.
///
/// Models sometimes answer on a five-point scale; `certain` folds into
/// `high` and `uncertain` into `low`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    #[serde(alias = "uncertain")]
    Low,
    Medium,
    #[serde(alias = "certain")]
    High,
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Confidence::Low => write!(f, "low"),
            Confidence::Medium => write!(f, "medium"),
            Confidence::High => write!(f, "high"),
        }
    }
}

/// One property a function (or group of functions) should satisfy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertySuggestion {
    pub property: String,
    pub reasoning: String,
    pub confidence: Confidence,
}

/// A property spanning several functions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiFunctionProperty {
    #[serde(flatten)]
    pub suggestion: PropertySuggestion,
    pub functions_involved: Vec<String>,
}

/// Function name → ordered suggestions for that function.
pub type SingleFunctionProperties = BTreeMap<String, Vec<PropertySuggestion>>;

/// Output of the suggest stage, input of the write stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertiesDocument {
    pub module_name: String,
    #[serde(default)]
    pub single_function_properties: SingleFunctionProperties,
    #[serde(default)]
    pub multi_function_properties: Vec<MultiFunctionProperty>,
}

impl PropertiesDocument {
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
            single_function_properties: BTreeMap::new(),
            multi_function_properties: Vec::new(),
        }
    }

    /// Parse and validate a properties document.
    ///
    /// A shape mismatch or an inconsistent document is a fatal input error;
    /// nothing malformed is passed further down the pipeline.
    pub fn from_json(text: &str) -> PropsmithResult<Self> {
        let doc: Self = serde_json::from_str(text)
            .map_err(|e| PropsmithError::invalid_document("properties document", e.to_string()))?;
        doc.validate()?;
        Ok(doc)
    }

    pub fn validate(&self) -> PropsmithResult<()> {
        let invalid = |reason: String| PropsmithError::invalid_document("properties document", reason);

        if self.module_name.trim().is_empty() {
            return Err(invalid("`module_name` must not be empty".to_string()));
        }
        for name in self.single_function_properties.keys() {
            if name.trim().is_empty() {
                return Err(invalid(
                    "`single_function_properties` has an empty function name".to_string(),
                ));
            }
        }
        for (idx, prop) in self.multi_function_properties.iter().enumerate() {
            if prop.functions_involved.is_empty() {
                return Err(invalid(format!(
                    "multi_function_properties[{idx}] lists no functions_involved"
                )));
            }
            if prop.functions_involved.iter().any(|f| f.trim().is_empty()) {
                return Err(invalid(format!(
                    "multi_function_properties[{idx}] has an empty function name"
                )));
            }
        }
        Ok(())
    }

    /// Every function name referenced anywhere in the document, sorted and
    /// deduplicated.
    pub fn referenced_functions(&self) -> BTreeSet<String> {
        let mut names: BTreeSet<String> = self.single_function_properties.keys().cloned().collect();
        for prop in &self.multi_function_properties {
            names.extend(prop.functions_involved.iter().cloned());
        }
        names
    }

    pub fn total_properties(&self) -> usize {
        self.single_function_properties
            .values()
            .map(Vec::len)
            .sum::<usize>()
            + self.multi_function_properties.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn suggestion(text: &str) -> PropertySuggestion {
        PropertySuggestion {
            property: text.to_string(),
            reasoning: "because".to_string(),
            confidence: Confidence::High,
        }
    }

    #[test]
    fn test_document_json_shape() {
        let mut doc = PropertiesDocument::new("calc");
        doc.single_function_properties
            .insert("add".to_string(), vec![suggestion("add(a, b) == add(b, a)")]);
        doc.multi_function_properties.push(MultiFunctionProperty {
            suggestion: suggestion("sub(add(a, b), b) == a"),
            functions_involved: vec!["add".to_string(), "sub".to_string()],
        });

        let v: Value = serde_json::to_value(&doc).expect("to_value");
        assert_eq!(v["module_name"], "calc");
        assert_eq!(v["single_function_properties"]["add"][0]["confidence"], "high");
        let multi = &v["multi_function_properties"][0];
        assert_eq!(multi["property"], "sub(add(a, b), b) == a");
        assert_eq!(multi["functions_involved"], json!(["add", "sub"]));
        assert!(multi.get("suggestion").is_none(), "suggestion must be flattened");
    }

    #[test]
    fn test_confidence_aliases_fold_into_three_levels() {
        let c: Confidence = serde_json::from_str("\"certain\"").expect("certain");
        assert_eq!(c, Confidence::High);
        let c: Confidence = serde_json::from_str("\"uncertain\"").expect("uncertain");
        assert_eq!(c, Confidence::Low);
        assert_eq!(serde_json::to_string(&Confidence::Medium).unwrap(), "\"medium\"");
    }

    #[test]
    fn test_from_json_rejects_shape_mismatch() {
        let err = PropertiesDocument::from_json(r#"{"module_name": "m", "single_function_properties": []}"#)
            .unwrap_err();
        assert!(matches!(err, PropsmithError::InvalidDocument { .. }));
    }

    #[test]
    fn test_from_json_rejects_empty_functions_involved() {
        let text = json!({
            "module_name": "m",
            "single_function_properties": {},
            "multi_function_properties": [
                {"property": "p", "reasoning": "r", "confidence": "low", "functions_involved": []}
            ]
        })
        .to_string();
        let err = PropertiesDocument::from_json(&text).unwrap_err();
        assert!(err.to_string().contains("functions_involved"));
    }

    #[test]
    fn test_from_json_accepts_missing_sections() {
        let doc = PropertiesDocument::from_json(r#"{"module_name": "m"}"#).expect("valid");
        assert!(doc.single_function_properties.is_empty());
        assert!(doc.multi_function_properties.is_empty());
    }

    #[test]
    fn test_referenced_functions_are_deduplicated() {
        let mut doc = PropertiesDocument::new("calc");
        doc.single_function_properties
            .insert("add".to_string(), vec![suggestion("p1"), suggestion("p2")]);
        doc.single_function_properties.insert("neg".to_string(), vec![]);
        for _ in 0..3 {
            doc.multi_function_properties.push(MultiFunctionProperty {
                suggestion: suggestion("p"),
                functions_involved: vec!["add".to_string(), "sub".to_string()],
            });
        }
        let names: Vec<String> = doc.referenced_functions().into_iter().collect();
        assert_eq!(names, vec!["add", "neg", "sub"]);
        assert_eq!(doc.total_properties(), 5);
    }
}
