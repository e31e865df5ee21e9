//! Compilation tools: binding, overrides and resolution.

use super::{format_property, get_bool, get_format, get_string, make_tool, require_string};
use crate::db::Database;
use crate::db::compilations::{CompilationFilter, CompilationInput};
use crate::error::{Entity, ModelError, ToolError};
use crate::format::{OutputFormat, format_snapshot_markdown, markdown_to_json};
use crate::types::{GlobalOverride, ModuleOverride};
use anyhow::Result;
use rmcp::model::Tool;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

pub fn get_tools() -> Vec<Tool> {
    vec![
        make_tool(
            "create_compilation",
            "Bind an active template version to a customer environment. Starts with no overrides.",
            json!({
                "name": {
                    "type": "string",
                    "description": "Compilation name"
                },
                "version": {
                    "type": "string",
                    "description": "Template version ID"
                },
                "customer": {
                    "type": "string",
                    "description": "Customer ID"
                },
                "environment": {
                    "type": "string",
                    "description": "Environment ID (must belong to the customer)"
                }
            }),
            vec!["name", "version", "customer", "environment"],
        ),
        make_tool(
            "get_compilation",
            "Get a compilation with its override arrays.",
            json!({
                "compilation": {
                    "type": "string",
                    "description": "Compilation ID"
                }
            }),
            vec!["compilation"],
        ),
        make_tool(
            "list_compilations",
            "List compilations, newest first. Every given filter must match.",
            json!({
                "template": { "type": "string", "description": "Template ID" },
                "version": { "type": "string", "description": "Version ID" },
                "customer": { "type": "string", "description": "Customer ID" },
                "environment": { "type": "string", "description": "Environment ID" }
            }),
            vec![],
        ),
        make_tool(
            "delete_compilation",
            "Delete a compilation and its overrides.",
            json!({
                "compilation": {
                    "type": "string",
                    "description": "Compilation ID"
                }
            }),
            vec!["compilation"],
        ),
        make_tool(
            "set_override",
            "Set one override value. Without module it overrides a global config; with module it overrides a MANUAL module config. An empty value is kept as an explicit empty override.",
            json!({
                "compilation": {
                    "type": "string",
                    "description": "Compilation ID"
                },
                "config": {
                    "type": "string",
                    "description": "Global config ID, or module config ID when module is given"
                },
                "module": {
                    "type": "string",
                    "description": "Module ID for a module override"
                },
                "value": {
                    "type": "string",
                    "description": "Override value"
                }
            }),
            vec!["compilation", "config", "value"],
        ),
        make_tool(
            "remove_override",
            "Remove one override so the config falls back to its default.",
            json!({
                "compilation": {
                    "type": "string",
                    "description": "Compilation ID"
                },
                "config": {
                    "type": "string",
                    "description": "Global config ID, or module config ID when module is given"
                },
                "module": {
                    "type": "string",
                    "description": "Module ID for a module override"
                }
            }),
            vec!["compilation", "config"],
        ),
        make_tool(
            "replace_overrides",
            "Replace both override arrays of a compilation at once.",
            json!({
                "compilation": {
                    "type": "string",
                    "description": "Compilation ID"
                },
                "global_configs": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "config_id": { "type": "string" },
                            "value": { "type": "string" }
                        }
                    }
                },
                "module_configs": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "module_id": { "type": "string" },
                            "config_id": { "type": "string" },
                            "value": { "type": "string" }
                        }
                    }
                }
            }),
            vec!["compilation"],
        ),
        make_tool(
            "resolve_compilation",
            "Resolve every global and module config of a compilation to its effective value and source. Dangling global mappings are reported as warnings.",
            json!({
                "compilation": {
                    "type": "string",
                    "description": "Compilation ID"
                },
                "reveal_hidden": {
                    "type": "boolean",
                    "description": "Show hidden values in markdown output"
                },
                "format": format_property()
            }),
            vec!["compilation"],
        ),
    ]
}

fn override_list<T: DeserializeOwned>(args: &Value, key: &str) -> Result<Vec<T>> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|e| ToolError::invalid_value(key, &e.to_string()).into()),
    }
}

pub fn create_compilation(db: &Database, args: Value) -> Result<Value> {
    let input = CompilationInput {
        name: require_string(&args, "name")?,
        version_id: require_string(&args, "version")?,
        customer_id: require_string(&args, "customer")?,
        environment_id: require_string(&args, "environment")?,
    };

    let compilation = db.create_compilation(input)?;
    Ok(json!({
        "compilation_id": compilation.id,
        "template_id": compilation.template_id,
        "version_id": compilation.template_version,
        "status": compilation.status.as_str(),
        "created_at": compilation.created_at
    }))
}

pub fn get_compilation(db: &Database, args: Value) -> Result<Value> {
    let compilation_id = require_string(&args, "compilation")?;
    let compilation = db
        .get_compilation(&compilation_id)?
        .ok_or_else(|| ModelError::not_found(Entity::Compilation, &compilation_id))?;
    Ok(serde_json::to_value(compilation)?)
}

pub fn list_compilations(db: &Database, args: Value) -> Result<Value> {
    let filter = CompilationFilter {
        template_id: get_string(&args, "template"),
        version_id: get_string(&args, "version"),
        customer_id: get_string(&args, "customer"),
        environment_id: get_string(&args, "environment"),
    };
    let compilations = db.list_compilations(&filter)?;
    Ok(json!({ "compilations": compilations }))
}

pub fn delete_compilation(db: &Database, args: Value) -> Result<Value> {
    let compilation_id = require_string(&args, "compilation")?;
    db.delete_compilation(&compilation_id)?;
    Ok(json!({ "success": true }))
}

pub fn set_override(db: &Database, args: Value) -> Result<Value> {
    let compilation_id = require_string(&args, "compilation")?;
    let config_id = require_string(&args, "config")?;
    let value = require_string(&args, "value")?;

    let compilation = match get_string(&args, "module") {
        Some(module_id) => db.set_module_override(&compilation_id, &module_id, &config_id, &value)?,
        None => db.set_global_override(&compilation_id, &config_id, &value)?,
    };

    Ok(json!({
        "compilation_id": compilation.id,
        "global_configs": compilation.global_configs,
        "module_configs": compilation.module_configs
    }))
}

pub fn remove_override(db: &Database, args: Value) -> Result<Value> {
    let compilation_id = require_string(&args, "compilation")?;
    let config_id = require_string(&args, "config")?;

    let removed = match get_string(&args, "module") {
        Some(module_id) => db.remove_module_override(&compilation_id, &module_id, &config_id)?,
        None => db.remove_global_override(&compilation_id, &config_id)?,
    };

    Ok(json!({ "removed": removed }))
}

pub fn replace_overrides(db: &Database, args: Value) -> Result<Value> {
    let compilation_id = require_string(&args, "compilation")?;
    let globals: Vec<GlobalOverride> = override_list(&args, "global_configs")?;
    let modules: Vec<ModuleOverride> = override_list(&args, "module_configs")?;

    let compilation = db.replace_overrides(&compilation_id, globals, modules)?;
    Ok(serde_json::to_value(compilation)?)
}

pub fn resolve_compilation(db: &Database, args: Value) -> Result<Value> {
    let compilation_id = require_string(&args, "compilation")?;
    let reveal_hidden = get_bool(&args, "reveal_hidden").unwrap_or(false);

    let snapshot = db.resolve_compilation(&compilation_id)?;
    match get_format(&args)? {
        OutputFormat::Markdown => Ok(markdown_to_json(format_snapshot_markdown(
            &snapshot,
            reveal_hidden,
        ))),
        OutputFormat::Json => Ok(serde_json::to_value(snapshot)?),
    }
}
