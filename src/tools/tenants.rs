//! Customer and environment tools.

use super::{get_string, make_tool, require_string};
use crate::db::Database;
use crate::error::{Entity, ModelError};
use anyhow::Result;
use rmcp::model::Tool;
use serde_json::{Value, json};

pub fn get_tools() -> Vec<Tool> {
    vec![
        make_tool(
            "create_customer",
            "Register a customer.",
            json!({
                "name": { "type": "string", "description": "Customer name" },
                "description": { "type": "string" }
            }),
            vec!["name"],
        ),
        make_tool(
            "get_customer",
            "Get a customer with its environments.",
            json!({
                "customer": { "type": "string", "description": "Customer ID" }
            }),
            vec!["customer"],
        ),
        make_tool("list_customers", "List customers by name.", json!({}), vec![]),
        make_tool(
            "delete_customer",
            "Delete a customer and its environments. Fails while compilations reference it.",
            json!({
                "customer": { "type": "string", "description": "Customer ID" }
            }),
            vec!["customer"],
        ),
        make_tool(
            "create_environment",
            "Add a deployment environment to a customer.",
            json!({
                "customer": { "type": "string", "description": "Customer ID" },
                "name": { "type": "string", "description": "Environment name" },
                "description": { "type": "string" }
            }),
            vec!["customer", "name"],
        ),
        make_tool(
            "get_environment",
            "Get one environment.",
            json!({
                "environment": { "type": "string", "description": "Environment ID" }
            }),
            vec!["environment"],
        ),
        make_tool(
            "list_environments",
            "List environments, optionally for one customer.",
            json!({
                "customer": { "type": "string", "description": "Customer ID" }
            }),
            vec![],
        ),
        make_tool(
            "delete_environment",
            "Delete an environment. Fails while compilations reference it.",
            json!({
                "environment": { "type": "string", "description": "Environment ID" }
            }),
            vec!["environment"],
        ),
    ]
}

pub fn create_customer(db: &Database, args: Value) -> Result<Value> {
    let name = require_string(&args, "name")?;
    let description = get_string(&args, "description").unwrap_or_default();
    let customer = db.create_customer(&name, &description)?;
    Ok(serde_json::to_value(customer)?)
}

pub fn get_customer(db: &Database, args: Value) -> Result<Value> {
    let customer_id = require_string(&args, "customer")?;
    let customer = db
        .get_customer(&customer_id)?
        .ok_or_else(|| ModelError::not_found(Entity::Customer, &customer_id))?;
    let environments = db.list_environments(Some(&customer_id))?;
    let mut value = serde_json::to_value(customer)?;
    value["environments"] = serde_json::to_value(environments)?;
    Ok(value)
}

pub fn list_customers(db: &Database, _args: Value) -> Result<Value> {
    Ok(json!({ "customers": db.list_customers()? }))
}

pub fn delete_customer(db: &Database, args: Value) -> Result<Value> {
    let customer_id = require_string(&args, "customer")?;
    db.delete_customer(&customer_id)?;
    Ok(json!({ "success": true }))
}

pub fn create_environment(db: &Database, args: Value) -> Result<Value> {
    let customer_id = require_string(&args, "customer")?;
    let name = require_string(&args, "name")?;
    let description = get_string(&args, "description").unwrap_or_default();
    let environment = db.create_environment(&customer_id, &name, &description)?;
    Ok(serde_json::to_value(environment)?)
}

pub fn get_environment(db: &Database, args: Value) -> Result<Value> {
    let environment_id = require_string(&args, "environment")?;
    let environment = db
        .get_environment(&environment_id)?
        .ok_or_else(|| ModelError::not_found(Entity::Environment, &environment_id))?;
    Ok(serde_json::to_value(environment)?)
}

pub fn list_environments(db: &Database, args: Value) -> Result<Value> {
    let customer_id = get_string(&args, "customer");
    let environments = db.list_environments(customer_id.as_deref())?;
    Ok(json!({ "environments": environments }))
}

pub fn delete_environment(db: &Database, args: Value) -> Result<Value> {
    let environment_id = require_string(&args, "environment")?;
    db.delete_environment(&environment_id)?;
    Ok(json!({ "success": true }))
}
