//! Version graph tools: derive, delete, merge preview, status and audit.

use super::{format_property, get_enum, get_format, get_string, make_tool, require_string};
use crate::config::VersioningConfig;
use crate::db::Database;
use crate::error::{Entity, ModelError, ToolError};
use crate::format::{OutputFormat, format_merge_markdown, markdown_to_json};
use crate::types::{Selection, VersionStatus, VersionType};
use anyhow::Result;
use rmcp::model::Tool;
use serde_json::{Value, json};

pub fn get_tools() -> Vec<Tool> {
    vec![
        make_tool(
            "create_initial_version",
            "Create the root version of a template that has none.",
            json!({
                "template": {
                    "type": "string",
                    "description": "Template ID"
                },
                "description": {
                    "type": "string",
                    "description": "Version description"
                }
            }),
            vec!["template"],
        ),
        make_tool(
            "create_version",
            "Derive a version from a base, deep-cloning its globals, modules and module configs with fresh ids. Branch versions append a kebab-case suffix (random two-word slug when omitted); other types bump the numeric version.",
            json!({
                "base": {
                    "type": "string",
                    "description": "Base version ID"
                },
                "version_type": {
                    "type": "string",
                    "enum": ["major", "minor", "patch", "hotfix", "branch"],
                    "description": "Kind of bump"
                },
                "description": {
                    "type": "string",
                    "description": "Version description"
                },
                "suffix": {
                    "type": "string",
                    "description": "Branch suffix (branch only)"
                }
            }),
            vec!["base", "version_type"],
        ),
        make_tool(
            "get_version",
            "Get one version with its config tree.",
            json!({
                "version": {
                    "type": "string",
                    "description": "Version ID"
                }
            }),
            vec!["version"],
        ),
        make_tool(
            "delete_version",
            "Delete a version. Children are re-parented onto its base; deleting the root promotes its earliest child. Returns the selection to show next.",
            json!({
                "version": {
                    "type": "string",
                    "description": "Version ID"
                },
                "selected_version": {
                    "type": "string",
                    "description": "Currently selected version ID"
                },
                "selected_module": {
                    "type": "string",
                    "description": "Currently selected module ID"
                }
            }),
            vec!["version"],
        ),
        make_tool(
            "merge_version",
            "Preview merging a version into its base: lists added, removed and modified globals, modules and module configs. Nothing is written.",
            json!({
                "version": {
                    "type": "string",
                    "description": "Source version ID"
                },
                "format": format_property()
            }),
            vec!["version"],
        ),
        make_tool(
            "set_version_status",
            "Mark a version active or deprecated. Deprecated versions take no new compilations.",
            json!({
                "version": {
                    "type": "string",
                    "description": "Version ID"
                },
                "status": {
                    "type": "string",
                    "enum": ["active", "deprecated"],
                    "description": "New status"
                }
            }),
            vec!["version", "status"],
        ),
        make_tool(
            "version_graph",
            "List a template's versions with their base and lineage lane.",
            json!({
                "template": {
                    "type": "string",
                    "description": "Template ID"
                }
            }),
            vec!["template"],
        ),
        make_tool(
            "validate_version",
            "Audit a version's schema for blank or duplicate names, dangling global mappings and bad regexes.",
            json!({
                "version": {
                    "type": "string",
                    "description": "Version ID"
                }
            }),
            vec!["version"],
        ),
    ]
}

pub fn create_initial_version(
    db: &Database,
    versioning: &VersioningConfig,
    args: Value,
) -> Result<Value> {
    let template_id = require_string(&args, "template")?;
    let description =
        get_string(&args, "description").unwrap_or_else(|| "Initial version".to_string());

    let version =
        db.create_initial_version(&template_id, &versioning.initial_version, &description)?;

    Ok(json!({
        "version_id": version.id,
        "version": version.version
    }))
}

pub fn create_version(db: &Database, versioning: &VersioningConfig, args: Value) -> Result<Value> {
    let base_id = require_string(&args, "base")?;
    let version_type = get_enum(&args, "version_type", VersionType::from_str)?
        .ok_or_else(|| ToolError::missing_field("version_type"))?;
    let description = get_string(&args, "description").unwrap_or_default();
    let suffix = get_string(&args, "suffix");

    let version = db.create_version(
        &base_id,
        version_type,
        &description,
        suffix.as_deref(),
        versioning.branch_suffix_words,
    )?;

    Ok(json!({
        "version_id": version.id,
        "version": version.version,
        "base_version": version.base_version,
        "is_branch": version.is_branch,
        "version_type": version.version_type.as_str(),
        "global_configs": version.global_configs.len(),
        "modules": version.modules.len()
    }))
}

pub fn get_version(db: &Database, args: Value) -> Result<Value> {
    let version_id = require_string(&args, "version")?;
    let version = db
        .get_version(&version_id)?
        .ok_or_else(|| ModelError::not_found(Entity::Version, &version_id))?;
    Ok(serde_json::to_value(version)?)
}

pub fn delete_version(db: &Database, args: Value) -> Result<Value> {
    let version_id = require_string(&args, "version")?;
    let selection = Selection {
        version_id: get_string(&args, "selected_version"),
        module_id: get_string(&args, "selected_module"),
    };

    let selection = db.delete_version(&version_id, &selection)?;

    Ok(json!({
        "success": true,
        "selection": selection
    }))
}

pub fn merge_version(db: &Database, args: Value) -> Result<Value> {
    let version_id = require_string(&args, "version")?;
    let format = get_format(&args)?;

    let preview = db.merge_version(&version_id)?;
    match format {
        OutputFormat::Markdown => Ok(markdown_to_json(format_merge_markdown(&preview))),
        OutputFormat::Json => Ok(serde_json::to_value(preview)?),
    }
}

pub fn set_version_status(db: &Database, args: Value) -> Result<Value> {
    let version_id = require_string(&args, "version")?;
    let status = get_enum(&args, "status", VersionStatus::from_str)?
        .ok_or_else(|| ToolError::missing_field("status"))?;

    let version = db.set_version_status(&version_id, status)?;

    Ok(json!({
        "version_id": version.id,
        "version": version.version,
        "status": version.status.as_str()
    }))
}

pub fn version_graph(db: &Database, args: Value) -> Result<Value> {
    let template_id = require_string(&args, "template")?;
    let rows = db.version_graph(&template_id)?;
    Ok(json!({ "versions": rows }))
}

pub fn validate_version(db: &Database, args: Value) -> Result<Value> {
    let version_id = require_string(&args, "version")?;
    let issues = db.validate_version(&version_id)?;
    Ok(json!({
        "valid": issues.is_empty(),
        "issues": issues
    }))
}
