//! Build tool: resolve a compilation and drive it through the build runner.

use super::{ToolContext, get_string_array, make_tool, require_string};
use crate::build::{BuildRegistry, BuildReport, BuildRequest, BuildRunner};
use crate::db::Database;
use crate::logging::Logger;
use crate::types::CompilationStatus;
use anyhow::Result;
use rmcp::model::Tool;
use serde_json::{Value, json};
use tracing::info;

pub fn get_tools() -> Vec<Tool> {
    vec![make_tool(
        "run_build",
        "Resolve a compilation and build its modules. Log records are streamed as logging notifications; the result holds every record and the final state of each module.",
        json!({
            "compilation": {
                "type": "string",
                "description": "Compilation ID"
            },
            "modules": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Module IDs to build (default: all)"
            }
        }),
        vec!["compilation"],
    )]
}

/// Run one build to completion.
///
/// The compilation is `Building` while events drain and ends `Success` or
/// `Failed`. A runner that refuses to start leaves it `Failed`.
pub async fn execute_build(
    db: &Database,
    runner: &dyn BuildRunner,
    registry: &BuildRegistry,
    logger: &Logger,
    compilation_id: &str,
    module_ids: Vec<String>,
) -> Result<BuildReport> {
    let _guard = registry.acquire(compilation_id)?;
    let snapshot = db.resolve_compilation(compilation_id)?;

    db.set_compilation_status(compilation_id, CompilationStatus::Building)?;
    let request = BuildRequest {
        compilation_id: compilation_id.to_string(),
        selected_module_ids: module_ids,
        snapshot,
    };

    let handle = match runner.start(request).await {
        Ok(handle) => handle,
        Err(e) => {
            db.set_compilation_status(compilation_id, CompilationStatus::Failed)?;
            return Err(e);
        }
    };

    let report = handle
        .collect(|record| logger.build_record(compilation_id, record))
        .await;

    let status = if report.succeeded {
        CompilationStatus::Success
    } else {
        CompilationStatus::Failed
    };
    db.set_compilation_status(compilation_id, status)?;

    info!(
        compilation = %compilation_id,
        status = status.as_str(),
        modules = report.modules.len(),
        logs = report.logs.len(),
        "Build finished"
    );
    Ok(report)
}

pub async fn run_build(
    db: &Database,
    runner: &dyn BuildRunner,
    registry: &BuildRegistry,
    ctx: &ToolContext,
    args: Value,
) -> Result<Value> {
    let compilation_id = require_string(&args, "compilation")?;
    let module_ids = get_string_array(&args, "modules").unwrap_or_default();

    let report = execute_build(db, runner, registry, &ctx.logger, &compilation_id, module_ids).await?;
    Ok(serde_json::to_value(report)?)
}
