//! Schema tools: global configs, modules and module configs of one version.

use super::{get_bool, get_enum, get_string, make_tool, require_string};
use crate::db::Database;
use crate::db::configs::{
    GlobalConfigInput, GlobalConfigPatch, ModuleConfigInput, ModuleConfigPatch, ModuleInput,
};
use crate::error::{ToolError, ToolResult};
use crate::types::{ConfigType, Mapping, MappingType, PublishMethod};
use anyhow::Result;
use rmcp::model::Tool;
use serde_json::{Value, json};

pub fn get_tools() -> Vec<Tool> {
    vec![
        make_tool(
            "create_global_config",
            "Add a global config to a version. Module configs with a GLOBAL mapping follow its resolved value.",
            json!({
                "version": {
                    "type": "string",
                    "description": "Version ID"
                },
                "name": {
                    "type": "string",
                    "description": "Config name"
                },
                "type": {
                    "type": "string",
                    "enum": ["TEXT", "FILE"],
                    "description": "Value kind (default: TEXT)"
                },
                "default_value": {
                    "type": "string",
                    "description": "Value used when a compilation has no override"
                },
                "description": {
                    "type": "string",
                    "description": "Config description"
                },
                "is_hidden": {
                    "type": "boolean",
                    "description": "Mask the value in rendered output"
                }
            }),
            vec!["version", "name"],
        ),
        make_tool(
            "update_global_config",
            "Update fields of a global config. Omitted fields keep their value.",
            json!({
                "global": {
                    "type": "string",
                    "description": "Global config ID"
                },
                "name": { "type": "string" },
                "type": { "type": "string", "enum": ["TEXT", "FILE"] },
                "default_value": { "type": "string" },
                "description": { "type": "string" },
                "is_hidden": { "type": "boolean" }
            }),
            vec!["global"],
        ),
        make_tool(
            "delete_global_config",
            "Delete a global config. Fails while module configs map to it.",
            json!({
                "global": {
                    "type": "string",
                    "description": "Global config ID"
                }
            }),
            vec!["global"],
        ),
        make_tool(
            "list_global_configs",
            "List a version's global configs with the number of module configs mapped to each.",
            json!({
                "version": {
                    "type": "string",
                    "description": "Version ID"
                }
            }),
            vec!["version"],
        ),
        make_tool(
            "add_module",
            "Bind a catalog project into a version as a module.",
            json!({
                "version": {
                    "type": "string",
                    "description": "Version ID"
                },
                "project_id": {
                    "type": "string",
                    "description": "Catalog project ID"
                },
                "project_name": {
                    "type": "string",
                    "description": "Project display name"
                },
                "project_version": {
                    "type": "string",
                    "description": "Project version"
                },
                "publish_method": {
                    "type": "string",
                    "enum": ["GIT", "DOWNLOAD"],
                    "description": "How the artifact is published (default: GIT)"
                }
            }),
            vec!["version", "project_id", "project_name"],
        ),
        make_tool(
            "remove_module",
            "Remove a module and its configs from a version.",
            json!({
                "module": {
                    "type": "string",
                    "description": "Module ID"
                }
            }),
            vec!["module"],
        ),
        make_tool(
            "list_modules",
            "List a version's modules with their configs.",
            json!({
                "version": {
                    "type": "string",
                    "description": "Version ID"
                }
            }),
            vec!["version"],
        ),
        make_tool(
            "create_module_config",
            "Add a config to a module. FIXED takes a literal mapping_value, GLOBAL takes a global config ID of the same version, MANUAL is filled per compilation.",
            json!({
                "module": {
                    "type": "string",
                    "description": "Module ID"
                },
                "name": {
                    "type": "string",
                    "description": "Config key"
                },
                "file_location": {
                    "type": "string",
                    "description": "File the value is written into"
                },
                "mapping_type": {
                    "type": "string",
                    "enum": ["FIXED", "MANUAL", "GLOBAL"]
                },
                "mapping_value": {
                    "type": "string",
                    "description": "Literal (FIXED) or global config ID (GLOBAL)"
                },
                "regex": {
                    "type": "string",
                    "description": "Pattern MANUAL values must match"
                },
                "description": { "type": "string" },
                "is_hidden": { "type": "boolean" },
                "is_selected": { "type": "boolean" }
            }),
            vec!["module", "name", "mapping_type"],
        ),
        make_tool(
            "update_module_config",
            "Update fields of a module config. Omitted fields keep their value; a mapping_value without mapping_type keeps the current mapping kind.",
            json!({
                "config": {
                    "type": "string",
                    "description": "Module config ID"
                },
                "name": { "type": "string" },
                "file_location": { "type": "string" },
                "mapping_type": { "type": "string", "enum": ["FIXED", "MANUAL", "GLOBAL"] },
                "mapping_value": { "type": "string" },
                "regex": { "type": "string" },
                "description": { "type": "string" },
                "is_hidden": { "type": "boolean" },
                "is_selected": { "type": "boolean" }
            }),
            vec!["config"],
        ),
        make_tool(
            "delete_module_config",
            "Delete a module config.",
            json!({
                "config": {
                    "type": "string",
                    "description": "Module config ID"
                }
            }),
            vec!["config"],
        ),
        make_tool(
            "select_module_config",
            "Mark a module config as selected or not.",
            json!({
                "config": {
                    "type": "string",
                    "description": "Module config ID"
                },
                "selected": { "type": "boolean" }
            }),
            vec!["config", "selected"],
        ),
    ]
}

fn config_type(args: &Value) -> Result<Option<ConfigType>> {
    get_enum(args, "type", ConfigType::from_str)
}

fn mapping_type(args: &Value) -> Result<Option<MappingType>> {
    get_enum(args, "mapping_type", MappingType::from_str)
}

fn build_mapping(mapping_type: MappingType, value: String) -> ToolResult<Mapping> {
    Mapping::from_parts(mapping_type, value)
        .map_err(|reason| ToolError::invalid_value("mapping_value", &reason))
}

pub fn create_global_config(db: &Database, args: Value) -> Result<Value> {
    let version_id = require_string(&args, "version")?;
    let input = GlobalConfigInput {
        name: require_string(&args, "name")?,
        config_type: config_type(&args)?.unwrap_or_default(),
        default_value: get_string(&args, "default_value").unwrap_or_default(),
        description: get_string(&args, "description").unwrap_or_default(),
        is_hidden: get_bool(&args, "is_hidden").unwrap_or(false),
    };

    let global = db.create_global_config(&version_id, input)?;
    Ok(serde_json::to_value(global)?)
}

pub fn update_global_config(db: &Database, args: Value) -> Result<Value> {
    let global_id = require_string(&args, "global")?;
    let patch = GlobalConfigPatch {
        name: get_string(&args, "name"),
        config_type: config_type(&args)?,
        default_value: get_string(&args, "default_value"),
        description: get_string(&args, "description"),
        is_hidden: get_bool(&args, "is_hidden"),
    };

    let global = db.update_global_config(&global_id, patch)?;
    Ok(serde_json::to_value(global)?)
}

pub fn delete_global_config(db: &Database, args: Value) -> Result<Value> {
    let global_id = require_string(&args, "global")?;
    db.delete_global_config(&global_id)?;
    Ok(json!({ "success": true }))
}

pub fn list_global_configs(db: &Database, args: Value) -> Result<Value> {
    let version_id = require_string(&args, "version")?;
    let globals = db.list_global_configs(&version_id)?;

    let mut entries = Vec::with_capacity(globals.len());
    for global in globals {
        let usage = db.global_usage_count(&global.id)?;
        let mut entry = serde_json::to_value(&global)?;
        if let Some(obj) = entry.as_object_mut() {
            obj.insert("usage".to_string(), json!(usage));
        }
        entries.push(entry);
    }

    Ok(json!({ "global_configs": entries }))
}

pub fn add_module(db: &Database, args: Value) -> Result<Value> {
    let version_id = require_string(&args, "version")?;
    let input = ModuleInput {
        project_id: require_string(&args, "project_id")?,
        project_name: require_string(&args, "project_name")?,
        project_version: get_string(&args, "project_version").unwrap_or_default(),
        publish_method: get_enum(&args, "publish_method", PublishMethod::from_str)?
            .unwrap_or_default(),
    };

    let module = db.add_module(&version_id, input)?;
    Ok(serde_json::to_value(module)?)
}

pub fn remove_module(db: &Database, args: Value) -> Result<Value> {
    let module_id = require_string(&args, "module")?;
    db.remove_module(&module_id)?;
    Ok(json!({ "success": true }))
}

pub fn list_modules(db: &Database, args: Value) -> Result<Value> {
    let version_id = require_string(&args, "version")?;
    let modules = db.list_modules(&version_id)?;
    Ok(json!({ "modules": modules }))
}

pub fn create_module_config(db: &Database, args: Value) -> Result<Value> {
    let module_id = require_string(&args, "module")?;
    let mapping_type = mapping_type(&args)?.ok_or_else(|| ToolError::missing_field("mapping_type"))?;
    let mapping = build_mapping(
        mapping_type,
        get_string(&args, "mapping_value").unwrap_or_default(),
    )?;

    let input = ModuleConfigInput {
        name: require_string(&args, "name")?,
        file_location: get_string(&args, "file_location").unwrap_or_default(),
        mapping,
        regex: get_string(&args, "regex").unwrap_or_default(),
        description: get_string(&args, "description").unwrap_or_default(),
        is_hidden: get_bool(&args, "is_hidden").unwrap_or(false),
        is_selected: get_bool(&args, "is_selected").unwrap_or(false),
    };

    let config = db.create_module_config(&module_id, input)?;
    Ok(serde_json::to_value(config)?)
}

pub fn update_module_config(db: &Database, args: Value) -> Result<Value> {
    let config_id = require_string(&args, "config")?;
    let patch = ModuleConfigPatch {
        name: get_string(&args, "name"),
        file_location: get_string(&args, "file_location"),
        mapping_type: mapping_type(&args)?,
        mapping_value: get_string(&args, "mapping_value"),
        regex: get_string(&args, "regex"),
        description: get_string(&args, "description"),
        is_hidden: get_bool(&args, "is_hidden"),
        is_selected: get_bool(&args, "is_selected"),
    };

    let config = db.update_module_config(&config_id, patch)?;
    Ok(serde_json::to_value(config)?)
}

pub fn delete_module_config(db: &Database, args: Value) -> Result<Value> {
    let config_id = require_string(&args, "config")?;
    db.delete_module_config(&config_id)?;
    Ok(json!({ "success": true }))
}

pub fn select_module_config(db: &Database, args: Value) -> Result<Value> {
    let config_id = require_string(&args, "config")?;
    let selected = get_bool(&args, "selected").ok_or_else(|| ToolError::missing_field("selected"))?;

    let config = db.set_config_selected(&config_id, selected)?;
    Ok(json!({
        "config_id": config.id,
        "is_selected": config.is_selected
    }))
}
