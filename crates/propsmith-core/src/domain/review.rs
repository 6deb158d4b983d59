//! Test execution results and the persisted review document.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::error::{PropsmithError, PropsmithResult};

/// Result of running one test function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestExecution {
    pub passed: bool,
    /// Captured output (failure traceback, error text); empty on a clean pass.
    #[serde(default)]
    pub output: String,
}

impl TestExecution {
    pub fn passed() -> Self {
        Self {
            passed: true,
            output: String::new(),
        }
    }

    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            passed: false,
            output: output.into(),
        }
    }
}

/// Test function name → execution result.
pub type TestRunReport = BTreeMap<String, TestExecution>;

/// The model's verdict on one test function.
///
/// `okay == true` carries no issue and no fix; `okay == false` always
/// carries a non-empty issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestReview {
    pub okay: bool,
    #[serde(default)]
    pub issue: String,
    #[serde(default)]
    pub fix: String,
}

impl TestReview {
    pub fn okay() -> Self {
        Self {
            okay: true,
            issue: String::new(),
            fix: String::new(),
        }
    }

    pub fn needs_fix(issue: impl Into<String>, fix: impl Into<String>) -> Self {
        Self {
            okay: false,
            issue: issue.into(),
            fix: fix.into(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.okay && (!self.issue.is_empty() || !self.fix.is_empty()) {
            return Err("a review marked okay must not carry an issue or a fix".to_string());
        }
        if !self.okay && self.issue.trim().is_empty() {
            return Err("a review marked not okay must describe the issue".to_string());
        }
        Ok(())
    }
}

/// Output of the review stage, input of the improve stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewDocument {
    pub test_file: String,
    #[serde(default)]
    pub reviews: BTreeMap<String, TestReview>,
}

impl ReviewDocument {
    pub fn new(test_file: impl Into<String>) -> Self {
        Self {
            test_file: test_file.into(),
            reviews: BTreeMap::new(),
        }
    }

    /// Parse and validate a review document.
    pub fn from_json(text: &str) -> PropsmithResult<Self> {
        let doc: Self = serde_json::from_str(text)
            .map_err(|e| PropsmithError::invalid_document("review document", e.to_string()))?;
        doc.validate()?;
        Ok(doc)
    }

    pub fn validate(&self) -> PropsmithResult<()> {
        for (name, review) in &self.reviews {
            review.validate().map_err(|reason| {
                PropsmithError::invalid_document("review document", format!("reviews.{name}: {reason}"))
            })?;
        }
        Ok(())
    }

    /// Names of tests reviewed as needing a fix.
    pub fn needs_fix(&self) -> impl Iterator<Item = &str> {
        self.reviews
            .iter()
            .filter(|(_, r)| !r.okay)
            .map(|(name, _)| name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_review_document_json_shape() {
        let mut doc = ReviewDocument::new("test_calc.py");
        doc.reviews.insert("test_add_commutes".to_string(), TestReview::okay());
        doc.reviews.insert(
            "test_add_identity".to_string(),
            TestReview::needs_fix("float overflow", "bound the strategy"),
        );

        let v: Value = serde_json::to_value(&doc).expect("to_value");
        assert_eq!(v["test_file"], "test_calc.py");
        assert_eq!(
            v["reviews"]["test_add_commutes"],
            json!({"okay": true, "issue": "", "fix": ""})
        );
        assert_eq!(v["reviews"]["test_add_identity"]["okay"], false);
        assert_eq!(doc.needs_fix().collect::<Vec<_>>(), vec!["test_add_identity"]);
    }

    #[test]
    fn test_from_json_rejects_not_okay_without_issue() {
        let text = json!({
            "test_file": "t.py",
            "reviews": {"test_x": {"okay": false, "issue": "", "fix": "x"}}
        })
        .to_string();
        let err = ReviewDocument::from_json(&text).unwrap_err();
        assert!(err.to_string().contains("reviews.test_x"));
    }

    #[test]
    fn test_from_json_rejects_okay_with_issue() {
        let text = json!({
            "test_file": "t.py",
            "reviews": {"test_x": {"okay": true, "issue": "something", "fix": ""}}
        })
        .to_string();
        assert!(ReviewDocument::from_json(&text).is_err());
    }

    #[test]
    fn test_from_json_rejects_wrong_shape() {
        assert!(ReviewDocument::from_json(r#"{"reviews": {}}"#).is_err());
        assert!(ReviewDocument::from_json(r#"{"test_file": "t.py", "reviews": []}"#).is_err());
    }

    #[test]
    fn test_empty_reviews_is_valid() {
        let doc = ReviewDocument::from_json(r#"{"test_file": "t.py", "reviews": {}}"#).expect("valid");
        assert!(doc.reviews.is_empty());
    }
}
