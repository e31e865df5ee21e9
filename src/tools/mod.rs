//! MCP tool implementations.

pub mod builds;
pub mod compilations;
pub mod configs;
pub mod context;
pub mod templates;
pub mod tenants;
pub mod versions;

pub use context::ToolContext;

use crate::build::{BuildRegistry, BuildRunner};
use crate::config::VersioningConfig;
use crate::db::Database;
use crate::error::ToolError;
use crate::format::OutputFormat;
use anyhow::Result;
use rmcp::model::Tool;
use serde_json::Value;
use std::sync::Arc;

/// Tool handler that processes MCP tool calls.
pub struct ToolHandler {
    pub db: Arc<Database>,
    pub versioning: VersioningConfig,
    pub runner: Arc<dyn BuildRunner>,
    pub builds: BuildRegistry,
}

impl ToolHandler {
    pub fn new(db: Arc<Database>, versioning: VersioningConfig, runner: Arc<dyn BuildRunner>) -> Self {
        Self {
            db,
            versioning,
            runner,
            builds: BuildRegistry::new(),
        }
    }

    /// Share a build registry with another surface (the REST server).
    pub fn with_registry(mut self, builds: BuildRegistry) -> Self {
        self.builds = builds;
        self
    }

    /// Get all available tools.
    pub fn get_tools(&self) -> Vec<Tool> {
        let mut tools = Vec::new();
        tools.extend(templates::get_tools());
        tools.extend(versions::get_tools());
        tools.extend(configs::get_tools());
        tools.extend(compilations::get_tools());
        tools.extend(tenants::get_tools());
        tools.extend(builds::get_tools());
        tools
    }

    /// Call a tool by name.
    pub async fn call_tool(&self, name: &str, arguments: Value, ctx: &ToolContext) -> Result<Value> {
        let db = &self.db;
        match name {
            // Templates
            "create_template" => templates::create_template(db, &self.versioning, arguments),
            "get_template" => templates::get_template(db, arguments),
            "list_templates" => templates::list_templates(db, arguments),
            "update_template" => templates::update_template(db, arguments),
            "delete_template" => templates::delete_template(db, arguments),

            // Versions
            "create_initial_version" => {
                versions::create_initial_version(db, &self.versioning, arguments)
            }
            "create_version" => versions::create_version(db, &self.versioning, arguments),
            "get_version" => versions::get_version(db, arguments),
            "delete_version" => versions::delete_version(db, arguments),
            "merge_version" => versions::merge_version(db, arguments),
            "set_version_status" => versions::set_version_status(db, arguments),
            "version_graph" => versions::version_graph(db, arguments),
            "validate_version" => versions::validate_version(db, arguments),

            // Schema
            "create_global_config" => configs::create_global_config(db, arguments),
            "update_global_config" => configs::update_global_config(db, arguments),
            "delete_global_config" => configs::delete_global_config(db, arguments),
            "list_global_configs" => configs::list_global_configs(db, arguments),
            "add_module" => configs::add_module(db, arguments),
            "remove_module" => configs::remove_module(db, arguments),
            "list_modules" => configs::list_modules(db, arguments),
            "create_module_config" => configs::create_module_config(db, arguments),
            "update_module_config" => configs::update_module_config(db, arguments),
            "delete_module_config" => configs::delete_module_config(db, arguments),
            "select_module_config" => configs::select_module_config(db, arguments),

            // Compilations
            "create_compilation" => compilations::create_compilation(db, arguments),
            "get_compilation" => compilations::get_compilation(db, arguments),
            "list_compilations" => compilations::list_compilations(db, arguments),
            "delete_compilation" => compilations::delete_compilation(db, arguments),
            "set_override" => compilations::set_override(db, arguments),
            "remove_override" => compilations::remove_override(db, arguments),
            "replace_overrides" => compilations::replace_overrides(db, arguments),
            "resolve_compilation" => compilations::resolve_compilation(db, arguments),

            // Tenants
            "create_customer" => tenants::create_customer(db, arguments),
            "get_customer" => tenants::get_customer(db, arguments),
            "list_customers" => tenants::list_customers(db, arguments),
            "delete_customer" => tenants::delete_customer(db, arguments),
            "create_environment" => tenants::create_environment(db, arguments),
            "get_environment" => tenants::get_environment(db, arguments),
            "list_environments" => tenants::list_environments(db, arguments),
            "delete_environment" => tenants::delete_environment(db, arguments),

            // Builds
            "run_build" => {
                builds::run_build(db, self.runner.as_ref(), &self.builds, ctx, arguments).await
            }

            _ => Err(ToolError::unknown_tool(name).into()),
        }
    }
}

/// Helper to create a tool definition.
pub fn make_tool(name: &str, description: &str, properties: Value, required: Vec<&str>) -> Tool {
    let input_schema = rmcp::model::JsonObject::from_iter([
        ("type".to_string(), serde_json::json!("object")),
        ("properties".to_string(), properties),
        ("required".to_string(), serde_json::json!(required)),
    ]);

    Tool::new(name.to_string(), description.to_string(), input_schema)
}

/// Helper to get a string from arguments.
pub fn get_string(args: &Value, key: &str) -> Option<String> {
    args.get(key).and_then(|v| v.as_str().map(String::from))
}

/// Required string argument; missing or non-string is `MISSING_REQUIRED_FIELD`.
pub fn require_string(args: &Value, key: &str) -> Result<String> {
    get_string(args, key).ok_or_else(|| ToolError::missing_field(key).into())
}

/// Helper to get a bool from arguments.
pub fn get_bool(args: &Value, key: &str) -> Option<bool> {
    args.get(key).and_then(|v| v.as_bool())
}

/// Helper to get a string array from arguments.
pub fn get_string_array(args: &Value, key: &str) -> Option<Vec<String>> {
    args.get(key).and_then(|v| {
        v.as_array().map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
    })
}

/// Optional enum argument parsed with `parse`; an unrecognised value is an
/// `INVALID_FIELD_VALUE` rather than silently ignored.
pub fn get_enum<T>(args: &Value, key: &str, parse: impl Fn(&str) -> Option<T>) -> Result<Option<T>> {
    match get_string(args, key) {
        None => Ok(None),
        Some(raw) => parse(&raw).map(Some).ok_or_else(|| {
            ToolError::invalid_value(key, &format!("unrecognised value '{}'", raw)).into()
        }),
    }
}

pub fn get_format(args: &Value) -> Result<OutputFormat> {
    Ok(get_enum(args, "format", OutputFormat::from_str)?.unwrap_or_default())
}

/// Shared `format` property for query tools.
pub(crate) fn format_property() -> Value {
    serde_json::json!({
        "type": "string",
        "enum": ["json", "markdown"],
        "description": "Output format (default: json)"
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use serde_json::json;

    #[test]
    fn missing_argument_is_structured() {
        let err = require_string(&json!({}), "template").unwrap_err();
        let tool_err: ToolError = err.into();
        assert_eq!(tool_err.code, ErrorCode::MissingRequiredField);
        assert_eq!(tool_err.field.as_deref(), Some("template"));
    }

    #[test]
    fn unknown_enum_value_is_rejected() {
        let args = json!({ "format": "yaml" });
        let err = get_format(&args).unwrap_err();
        let tool_err: ToolError = err.into();
        assert_eq!(tool_err.code, ErrorCode::InvalidFieldValue);

        assert_eq!(get_format(&json!({})).unwrap(), OutputFormat::Json);
    }
}
