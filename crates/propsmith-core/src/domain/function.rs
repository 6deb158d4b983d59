//! Description of a function under test.

use serde::{Deserialize, Serialize};

/// What is known about one function of the module under test.
///
/// Every field except `name` may be empty: natively compiled functions have
/// no source, some have no introspectable signature. An empty field only
/// degrades the context given to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionInfo {
    pub name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub signature: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub docstring: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub source: String,
}

impl FunctionInfo {
    pub fn new(
        name: impl Into<String>,
        signature: impl Into<String>,
        docstring: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            signature: signature.into(),
            docstring: docstring.into(),
            source: source.into(),
        }
    }

    /// A function known only by name.
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(name, "", "", "")
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
