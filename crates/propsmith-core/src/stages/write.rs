//! Write: turn suggested properties into one Hypothesis test file.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use tracing::debug;

use crate::aggregate::{StageAggregator, StageKind, StageReport};
use crate::domain::{
    FunctionInfo, MultiFunctionProperty, PropertiesDocument, PropertySuggestion, PropsmithResult, UnitError,
    UnitResult,
};
use crate::extract::extract_code;
use crate::prompts::{self, ASSUMED_IMPORTS};
use crate::scheduler::RequestUnit;
use crate::stages::{PipelineStage, StageContext, StageProgress};

/// A validated properties document plus whatever function details could be
/// resolved for the names it references.
#[derive(Debug, Clone)]
pub struct WriteInput {
    pub document: PropertiesDocument,
    pub functions: Vec<FunctionInfo>,
}

#[derive(Debug, Clone)]
enum WritePayload {
    Single {
        module_name: String,
        function: FunctionInfo,
        properties: Vec<PropertySuggestion>,
    },
    Multi {
        module_name: String,
        property: MultiFunctionProperty,
        functions: Vec<FunctionInfo>,
    },
}

impl WritePayload {
    fn prompt(&self) -> String {
        match self {
            WritePayload::Single {
                module_name,
                function,
                properties,
            } => prompts::write_single(module_name, function, properties),
            WritePayload::Multi {
                module_name,
                property,
                functions,
            } => prompts::write_multi(module_name, property, functions),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct WriteStage;

#[async_trait]
impl PipelineStage for WriteStage {
    type Input = WriteInput;
    type Output = String;

    fn kind(&self) -> StageKind {
        StageKind::Write
    }

    async fn run(&self, ctx: &StageContext, input: WriteInput) -> PropsmithResult<StageReport<String>> {
        let WriteInput { document, functions } = input;
        document.validate()?;

        let aggregator = StageAggregator::new(self.kind());
        let units = build_units(&document, &functions);
        debug!(units = units.len(), "write units built");

        let progress = StageProgress::new(self.kind(), units.len());
        let caller = ctx.caller();
        let outcomes = ctx
            .run_units(&progress, units, move |payload: WritePayload| {
                let caller = caller.clone();
                async move {
                    let reply = caller.text(payload.prompt()).await?;
                    code_block(&reply)
                }
            })
            .await;

        let collected = aggregator.collect(outcomes);
        let succeeded = collected.successes.len();
        let blocks: Vec<String> = collected.successes.into_iter().map(|(_, code)| code).collect();
        let artifact = assemble(&document.module_name, &document.referenced_functions(), &blocks);
        Ok(aggregator.finish(artifact, succeeded, collected.failures))
    }
}

/// Single-function units in name order, then multi-function units in input order.
fn build_units(document: &PropertiesDocument, functions: &[FunctionInfo]) -> Vec<RequestUnit<WritePayload>> {
    let by_name: HashMap<&str, &FunctionInfo> = functions.iter().map(|f| (f.name.as_str(), f)).collect();
    let lookup = |name: &str| -> FunctionInfo {
        by_name.get(name).map(|f| (*f).clone()).unwrap_or_else(|| {
            debug!(function = %name, "no details for function; prompting with its name only");
            FunctionInfo::named(name)
        })
    };

    let mut units = Vec::new();
    for (name, properties) in &document.single_function_properties {
        if properties.is_empty() {
            continue;
        }
        units.push(RequestUnit::new(
            name.clone(),
            WritePayload::Single {
                module_name: document.module_name.clone(),
                function: lookup(name),
                properties: properties.clone(),
            },
        ));
    }
    for (i, property) in document.multi_function_properties.iter().enumerate() {
        units.push(RequestUnit::new(
            format!("multi_function_properties[{i}]"),
            WritePayload::Multi {
                module_name: document.module_name.clone(),
                property: property.clone(),
                functions: property.functions_involved.iter().map(|n| lookup(n)).collect(),
            },
        ));
    }
    units
}

fn code_block(reply: &str) -> UnitResult<String> {
    let code = extract_code(reply);
    if code.trim().is_empty() {
        return Err(UnitError::malformed("reply contained no code"));
    }
    Ok(code)
}

/// Preamble, one import per referenced function, then the test blocks.
fn assemble(module_name: &str, referenced: &BTreeSet<String>, blocks: &[String]) -> String {
    let mut out = format!(
        "\"\"\"Property-based tests for {module_name} module.\nGenerated by propsmith.\n\"\"\"\n\n{ASSUMED_IMPORTS}\n"
    );
    if referenced.is_empty() {
        out.push_str(&format!("# No functions referenced from {module_name}\n"));
    }
    for name in referenced {
        out.push_str(&format!("from {module_name} import {name}\n"));
    }
    for block in blocks {
        out.push_str("\n\n");
        out.push_str(block.trim_end());
        out.push('\n');
    }
    out
}
