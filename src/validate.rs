//! Schema validation.
//!
//! Write paths call the `require_*`/`check_*` helpers and fail fast.
//! [`validate_version`] is the non-failing audit used for imported data.

use crate::error::ModelError;
use crate::types::{GlobalConfig, Mapping, TemplateVersion};
use serde::Serialize;
use std::collections::HashMap;

/// Trimmed, non-empty value or [`ModelError::MissingField`].
pub fn require_name(field: &str, value: &str) -> Result<String, ModelError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ModelError::MissingField(field.to_string()));
    }
    Ok(trimmed.to_string())
}

/// An empty pattern means "no constraint".
pub fn check_regex(pattern: &str) -> Result<(), ModelError> {
    if pattern.is_empty() {
        return Ok(());
    }
    regex_lite::Regex::new(pattern)
        .map(|_| ())
        .map_err(|e| ModelError::invalid("regex", e.to_string()))
}

/// A GLOBAL mapping must point at one of `globals`.
pub fn check_mapping(
    config_id: &str,
    mapping: &Mapping,
    globals: &[GlobalConfig],
) -> Result<(), ModelError> {
    match mapping.global_ref() {
        Some(global_id) if !globals.iter().any(|g| g.id == global_id) => {
            Err(ModelError::DanglingReference {
                config_id: config_id.to_string(),
                global_id: global_id.to_string(),
            })
        }
        _ => Ok(()),
    }
}

/// Whether `value` satisfies the config's regex. Configs without a pattern
/// accept anything; an uncompilable pattern accepts nothing.
pub fn value_matches(pattern: &str, value: &str) -> bool {
    if pattern.is_empty() {
        return true;
    }
    regex_lite::Regex::new(pattern)
        .map(|re| re.is_match(value))
        .unwrap_or(false)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaIssue {
    /// Id of the offending global, module or module config.
    pub target_id: String,
    pub message: String,
}

/// Audit a whole version schema without stopping at the first problem.
pub fn validate_version(version: &TemplateVersion) -> Vec<SchemaIssue> {
    let mut issues = Vec::new();
    let mut seen_names: HashMap<&str, &str> = HashMap::new();

    for g in &version.global_configs {
        if g.name.trim().is_empty() {
            issues.push(SchemaIssue {
                target_id: g.id.clone(),
                message: "global config has no name".to_string(),
            });
            continue;
        }
        if let Some(first) = seen_names.insert(g.name.as_str(), g.id.as_str()) {
            issues.push(SchemaIssue {
                target_id: g.id.clone(),
                message: format!("global config name '{}' duplicates {}", g.name, first),
            });
        }
    }

    for m in &version.modules {
        if m.project_id.trim().is_empty() {
            issues.push(SchemaIssue {
                target_id: m.id.clone(),
                message: "module has no project id".to_string(),
            });
        }
        for c in &m.configs {
            if c.name.trim().is_empty() {
                issues.push(SchemaIssue {
                    target_id: c.id.clone(),
                    message: "module config has no name".to_string(),
                });
            }
            if let Err(e) = check_regex(&c.regex) {
                issues.push(SchemaIssue {
                    target_id: c.id.clone(),
                    message: e.to_string(),
                });
            }
            if let Err(e) = check_mapping(&c.id, &c.mapping, &version.global_configs) {
                issues.push(SchemaIssue {
                    target_id: c.id.clone(),
                    message: e.to_string(),
                });
            }
        }
    }

    issues
}
