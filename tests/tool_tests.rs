//! End-to-end tests through the MCP tool surface.

use deploy_config_mcp::build::SimulatedBuildRunner;
use deploy_config_mcp::config::VersioningConfig;
use deploy_config_mcp::db::Database;
use deploy_config_mcp::error::{ErrorCode, ToolError};
use deploy_config_mcp::tools::{ToolContext, ToolHandler};
use deploy_config_mcp::types::CompilationStatus;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

fn handler() -> ToolHandler {
    let db = Arc::new(Database::open_in_memory().expect("Failed to create in-memory database"));
    let runner = Arc::new(SimulatedBuildRunner::new(Duration::ZERO, 2));
    ToolHandler::new(db, VersioningConfig::default(), runner)
}

async fn call(handler: &ToolHandler, name: &str, args: Value) -> Value {
    handler
        .call_tool(name, args, &ToolContext::default())
        .await
        .unwrap_or_else(|e| panic!("{} failed: {}", name, e))
}

async fn call_err(handler: &ToolHandler, name: &str, args: Value) -> ToolError {
    let err = handler
        .call_tool(name, args, &ToolContext::default())
        .await
        .expect_err("expected tool error");
    ToolError::from(err)
}

fn id(value: &Value, key: &str) -> String {
    value[key]
        .as_str()
        .unwrap_or_else(|| panic!("missing {} in {}", key, value))
        .to_string()
}

/// Template with a `domain` global mapped into one module, plus a customer
/// environment and a compilation. Returns (version, global, module, compilation).
async fn seed(h: &ToolHandler) -> (String, String, String, String) {
    let t = call(h, "create_template", json!({ "name": "analytics" })).await;
    let version = id(&t, "root_version_id");
    assert_eq!(t["root_version"], "1.0.0");

    let g = call(
        h,
        "create_global_config",
        json!({ "version": version, "name": "domain", "default_value": "https://zhugeio.com/" }),
    )
    .await;
    let global = id(&g, "id");

    let m = call(
        h,
        "add_module",
        json!({ "version": version, "project_id": "web", "project_name": "Web" }),
    )
    .await;
    let module = id(&m, "id");

    call(
        h,
        "create_module_config",
        json!({
            "module": module,
            "name": "api.url",
            "mapping_type": "GLOBAL",
            "mapping_value": global,
            "is_selected": true
        }),
    )
    .await;

    let c = call(h, "create_customer", json!({ "name": "acme" })).await;
    let customer = id(&c, "id");
    let e = call(
        h,
        "create_environment",
        json!({ "customer": customer, "name": "prod" }),
    )
    .await;
    let environment = id(&e, "id");

    let comp = call(
        h,
        "create_compilation",
        json!({
            "name": "acme prod",
            "version": version,
            "customer": customer,
            "environment": environment
        }),
    )
    .await;
    let compilation = id(&comp, "compilation_id");

    (version, global, module, compilation)
}

#[tokio::test]
async fn every_tool_is_listed_once() {
    let h = handler();
    let tools = h.get_tools();
    let mut names: Vec<String> = tools.iter().map(|t| t.name.to_string()).collect();
    let total = names.len();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), total);
    for expected in ["create_template", "create_version", "set_override", "run_build"] {
        assert!(names.iter().any(|n| n == expected), "missing {}", expected);
    }
}

#[tokio::test]
async fn unknown_tool_is_reported() {
    let h = handler();
    let err = call_err(&h, "no_such_tool", json!({})).await;
    assert_eq!(err.code, ErrorCode::UnknownTool);
}

#[tokio::test]
async fn missing_argument_names_the_field() {
    let h = handler();
    let err = call_err(&h, "create_template", json!({})).await;
    assert_eq!(err.code, ErrorCode::MissingRequiredField);
    assert_eq!(err.field.as_deref(), Some("name"));
}

#[tokio::test]
async fn bad_enum_value_is_invalid() {
    let h = handler();
    let t = call(&h, "create_template", json!({ "name": "x" })).await;
    let err = call_err(
        &h,
        "create_version",
        json!({ "base": id(&t, "root_version_id"), "version_type": "sideways" }),
    )
    .await;
    assert_eq!(err.code, ErrorCode::InvalidFieldValue);
}

#[tokio::test]
async fn override_changes_resolved_value() {
    let h = handler();
    let (_, global, module, compilation) = seed(&h).await;

    call(
        &h,
        "set_override",
        json!({ "compilation": compilation, "config": global, "value": "https://acme.example" }),
    )
    .await;

    let snapshot = call(&h, "resolve_compilation", json!({ "compilation": compilation })).await;
    assert_eq!(snapshot["globals"][0]["value"], "https://acme.example");
    let web = snapshot["modules"]
        .as_array()
        .unwrap()
        .iter()
        .find(|m| m["moduleId"] == module.as_str())
        .unwrap();
    assert_eq!(web["configs"][0]["value"], "https://acme.example");
}

#[tokio::test]
async fn markdown_resolution_masks_hidden_values() {
    let h = handler();
    let (_, global, _, compilation) = seed(&h).await;
    call(
        &h,
        "update_global_config",
        json!({ "global": global, "is_hidden": true }),
    )
    .await;

    let md = call(
        &h,
        "resolve_compilation",
        json!({ "compilation": compilation, "format": "markdown" }),
    )
    .await;
    assert_eq!(md["format"], "markdown");
    let content = md["content"].as_str().unwrap();
    assert!(!content.contains("https://zhugeio.com/"));

    let revealed = call(
        &h,
        "resolve_compilation",
        json!({ "compilation": compilation, "format": "markdown", "reveal_hidden": true }),
    )
    .await;
    assert!(revealed["content"].as_str().unwrap().contains("https://zhugeio.com/"));
}

#[tokio::test]
async fn global_in_use_reports_usage() {
    let h = handler();
    let (version, global, _, _) = seed(&h).await;

    let listed = call(&h, "list_global_configs", json!({ "version": version })).await;
    assert_eq!(listed["global_configs"][0]["usage"], 1);

    let err = call_err(&h, "delete_global_config", json!({ "global": global })).await;
    assert_eq!(err.code, ErrorCode::InUse);
}

#[tokio::test]
async fn suffix_only_allowed_on_branches() {
    let h = handler();
    let t = call(&h, "create_template", json!({ "name": "x" })).await;
    let err = call_err(
        &h,
        "create_version",
        json!({ "base": id(&t, "root_version_id"), "version_type": "minor", "suffix": "nope" }),
    )
    .await;
    assert_eq!(err.code, ErrorCode::InvalidFieldValue);
}

#[tokio::test]
async fn run_build_succeeds_and_marks_compilation() {
    let h = handler();
    let (_, _, module, compilation) = seed(&h).await;

    let report = call(&h, "run_build", json!({ "compilation": compilation })).await;
    assert_eq!(report["succeeded"], true);
    assert_eq!(report["modules"][0]["moduleId"], module.as_str());
    assert_eq!(report["modules"][0]["status"], "Success");
    assert!(!report["logs"].as_array().unwrap().is_empty());

    let stored = h.db.get_compilation(&compilation).unwrap().unwrap();
    assert_eq!(stored.status, CompilationStatus::Success);
}

#[tokio::test]
async fn run_build_rejects_unknown_module() {
    let h = handler();
    let (_, _, _, compilation) = seed(&h).await;

    let err = call_err(
        &h,
        "run_build",
        json!({ "compilation": compilation, "modules": ["ghost"] }),
    )
    .await;
    assert_eq!(err.code, ErrorCode::ModuleNotFound);

    let stored = h.db.get_compilation(&compilation).unwrap().unwrap();
    assert_eq!(stored.status, CompilationStatus::Failed);
}

#[tokio::test]
async fn delete_version_returns_next_selection() {
    let h = handler();
    let t = call(&h, "create_template", json!({ "name": "x" })).await;
    let root = id(&t, "root_version_id");
    let child = call(
        &h,
        "create_version",
        json!({ "base": root, "version_type": "patch" }),
    )
    .await;
    let child_id = id(&child, "version_id");
    assert_eq!(child["version"], "1.0.1");

    let result = call(
        &h,
        "delete_version",
        json!({ "version": child_id, "selected_version": child_id }),
    )
    .await;
    assert_eq!(result["success"], true);
    assert_eq!(result["selection"]["versionId"], root.as_str());
}

#[tokio::test]
async fn get_customer_includes_environments() {
    let h = handler();
    let c = call(&h, "create_customer", json!({ "name": "acme" })).await;
    let customer = id(&c, "id");
    let e = call(
        &h,
        "create_environment",
        json!({ "customer": customer, "name": "prod" }),
    )
    .await;
    let environment = id(&e, "id");

    let fetched = call(&h, "get_customer", json!({ "customer": customer })).await;
    assert_eq!(fetched["name"], "acme");
    assert_eq!(fetched["environments"][0]["id"], environment.as_str());

    let env = call(&h, "get_environment", json!({ "environment": environment })).await;
    assert_eq!(env["name"], "prod");

    let err = call_err(&h, "get_environment", json!({ "environment": "missing" })).await;
    assert_eq!(err.code, ErrorCode::EnvironmentNotFound);
}
