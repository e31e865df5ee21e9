//! Template CRUD tools.

use super::{format_property, get_format, get_string, make_tool, require_string};
use crate::config::VersioningConfig;
use crate::db::Database;
use crate::error::{Entity, ModelError};
use crate::format::{
    OutputFormat, format_template_markdown, format_templates_markdown, markdown_to_json,
};
use anyhow::Result;
use rmcp::model::Tool;
use serde_json::{Value, json};

pub fn get_tools() -> Vec<Tool> {
    vec![
        make_tool(
            "create_template",
            "Create a project template together with its root version.",
            json!({
                "name": {
                    "type": "string",
                    "description": "Template name"
                },
                "description": {
                    "type": "string",
                    "description": "Template description"
                }
            }),
            vec!["name"],
        ),
        make_tool(
            "get_template",
            "Get a template with every version and its config tree.",
            json!({
                "template": {
                    "type": "string",
                    "description": "Template ID"
                },
                "format": format_property()
            }),
            vec!["template"],
        ),
        make_tool(
            "list_templates",
            "List templates, most recently updated first.",
            json!({
                "format": format_property()
            }),
            vec![],
        ),
        make_tool(
            "update_template",
            "Rename or re-describe a template.",
            json!({
                "template": {
                    "type": "string",
                    "description": "Template ID"
                },
                "name": {
                    "type": "string",
                    "description": "New name"
                },
                "description": {
                    "type": "string",
                    "description": "New description"
                }
            }),
            vec!["template"],
        ),
        make_tool(
            "delete_template",
            "Delete a template and all its versions. Fails while compilations reference it.",
            json!({
                "template": {
                    "type": "string",
                    "description": "Template ID"
                }
            }),
            vec!["template"],
        ),
    ]
}

pub fn create_template(db: &Database, versioning: &VersioningConfig, args: Value) -> Result<Value> {
    let name = require_string(&args, "name")?;
    let description = get_string(&args, "description").unwrap_or_default();

    let template = db.create_template(&name, &description, &versioning.initial_version)?;
    let root = template.versions.first();

    Ok(json!({
        "template_id": &template.id,
        "name": template.name,
        "root_version_id": root.map(|v| v.id.as_str()),
        "root_version": root.map(|v| v.version.as_str()),
        "created_at": template.created_at
    }))
}

pub fn get_template(db: &Database, args: Value) -> Result<Value> {
    let template_id = require_string(&args, "template")?;
    let format = get_format(&args)?;

    let template = db
        .get_template(&template_id)?
        .ok_or_else(|| ModelError::not_found(Entity::Template, &template_id))?;

    match format {
        OutputFormat::Markdown => {
            let graph = db.version_graph(&template_id)?;
            Ok(markdown_to_json(format_template_markdown(&template, &graph)))
        }
        OutputFormat::Json => Ok(serde_json::to_value(template)?),
    }
}

pub fn list_templates(db: &Database, args: Value) -> Result<Value> {
    let templates = db.list_templates()?;
    match get_format(&args)? {
        OutputFormat::Markdown => Ok(markdown_to_json(format_templates_markdown(&templates))),
        OutputFormat::Json => Ok(json!({ "templates": templates })),
    }
}

pub fn update_template(db: &Database, args: Value) -> Result<Value> {
    let template_id = require_string(&args, "template")?;
    let name = get_string(&args, "name");
    let description = get_string(&args, "description");

    let template = db.update_template(&template_id, name.as_deref(), description.as_deref())?;

    Ok(json!({
        "template_id": template.id,
        "name": template.name,
        "description": template.description,
        "updated_at": template.updated_at
    }))
}

pub fn delete_template(db: &Database, args: Value) -> Result<Value> {
    let template_id = require_string(&args, "template")?;
    db.delete_template(&template_id)?;
    Ok(json!({ "success": true }))
}
