//! Reading stage inputs and writing stage artifacts.
//!
//! Document arguments are either a path to a JSON file or the JSON itself
//! (anything whose first non-blank character is `{`). Artifacts go to a file
//! when an output path is given, otherwise to stdout.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::aggregate::StageReport;
use crate::domain::{PropertiesDocument, ReviewDocument};

fn is_inline_json(arg: &str) -> bool {
    arg.trim_start().starts_with('{')
}

fn read_document_text(arg: &str, what: &str) -> Result<String> {
    if is_inline_json(arg) {
        return Ok(arg.to_string());
    }
    std::fs::read_to_string(arg).with_context(|| format!("read {what} from {arg:?}"))
}

/// Load and validate a properties document from a path or inline JSON.
pub fn load_properties(arg: &str) -> Result<PropertiesDocument> {
    let text = read_document_text(arg, "properties document")?;
    Ok(PropertiesDocument::from_json(&text)?)
}

/// Load and validate a review document from a path or inline JSON.
pub fn load_reviews(arg: &str) -> Result<ReviewDocument> {
    let text = read_document_text(arg, "review document")?;
    Ok(ReviewDocument::from_json(&text)?)
}

/// Write `value` as pretty JSON followed by a newline.
pub fn write_json_artifact<T: Serialize>(output: Option<&Path>, value: &T) -> Result<()> {
    let mut content = serde_json::to_string_pretty(value).context("serialize artifact")?;
    content.push('\n');
    write_text_artifact(output, &content)
}

/// Write `text` unchanged.
pub fn write_text_artifact(output: Option<&Path>, text: &str) -> Result<()> {
    match output {
        Some(path) => std::fs::write(path, text).with_context(|| format!("write {:?}", path)),
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(text.as_bytes()).context("write artifact to stdout")?;
            stdout.flush().context("flush stdout")
        }
    }
}

/// Print the failure manifest of a partial report to stderr.
pub fn report_failures<A>(report: &StageReport<A>) {
    if !report.is_complete() {
        eprint!("{}", report.render_manifest());
    }
}
