//! Schema editing within one template version: global configs, modules and
//! module configs.

use super::versions::{
    insert_global, insert_module, insert_module_config, load_globals, load_modules,
    parse_global_row, parse_module_config_row, touch_template,
};
use super::{Database, new_id, now_ms};
use crate::error::{Entity, ModelError};
use crate::types::{
    ConfigType, GlobalConfig, Mapping, MappingType, ModuleConfig, PublishMethod, TemplateModule,
};
use crate::validate::{check_mapping, check_regex, require_name};
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, params};
use serde::Deserialize;
use tracing::{debug, info};

/// Fields of a new global config.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalConfigInput {
    pub name: String,
    #[serde(rename = "type", default)]
    pub config_type: ConfigType,
    #[serde(default)]
    pub default_value: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_hidden: bool,
}

/// Partial update of a global config; `None` keeps the stored value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalConfigPatch {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub config_type: Option<ConfigType>,
    pub default_value: Option<String>,
    pub description: Option<String>,
    pub is_hidden: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleInput {
    pub project_id: String,
    pub project_name: String,
    #[serde(default)]
    pub project_version: String,
    #[serde(default)]
    pub publish_method: PublishMethod,
}

/// Fields of a new module config.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleConfigInput {
    pub name: String,
    #[serde(default)]
    pub file_location: String,
    #[serde(flatten)]
    pub mapping: Mapping,
    #[serde(default)]
    pub regex: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_hidden: bool,
    #[serde(default)]
    pub is_selected: bool,
}

/// Partial update of a module config. A `mapping_value` without a
/// `mapping_type` keeps the current mapping kind.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleConfigPatch {
    pub name: Option<String>,
    pub file_location: Option<String>,
    pub mapping_type: Option<MappingType>,
    pub mapping_value: Option<String>,
    pub regex: Option<String>,
    pub description: Option<String>,
    pub is_hidden: Option<bool>,
    pub is_selected: Option<bool>,
}

impl ModuleConfigPatch {
    fn mapping(&self, current: &Mapping) -> Result<Option<Mapping>, ModelError> {
        let mapping_type = match (self.mapping_type, &self.mapping_value) {
            (None, None) => return Ok(None),
            (Some(mapping_type), _) => mapping_type,
            (None, Some(_)) => current.mapping_type(),
        };
        let value = self.mapping_value.clone().unwrap_or_default();
        Mapping::from_parts(mapping_type, value)
            .map(Some)
            .map_err(|reason| ModelError::invalid("mappingValue", reason))
    }
}

fn template_of_version(conn: &Connection, version_id: &str) -> Result<String> {
    conn.query_row(
        "SELECT template_id FROM template_versions WHERE id = ?1",
        params![version_id],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| ModelError::not_found(Entity::Version, version_id).into())
}

/// Global config and the version that owns it.
fn locate_global(conn: &Connection, global_id: &str) -> Result<(String, GlobalConfig)> {
    conn.query_row(
        "SELECT version_id, id, name, config_type, default_value, description, is_hidden, created_at
         FROM global_configs WHERE id = ?1",
        params![global_id],
        |row| Ok((row.get("version_id")?, parse_global_row(row)?)),
    )
    .optional()?
    .ok_or_else(|| ModelError::not_found(Entity::GlobalConfig, global_id).into())
}

/// Version id owning a module.
fn locate_module(conn: &Connection, module_id: &str) -> Result<String> {
    conn.query_row(
        "SELECT version_id FROM template_modules WHERE id = ?1",
        params![module_id],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| ModelError::not_found(Entity::Module, module_id).into())
}

/// Module config with its owning version and module ids.
fn locate_module_config(conn: &Connection, config_id: &str) -> Result<(String, String, ModuleConfig)> {
    conn.query_row(
        "SELECT m.version_id, c.module_id, c.id, c.name, c.file_location, c.mapping_type,
                c.mapping_value, c.regex, c.description, c.is_hidden, c.is_selected
         FROM module_configs c JOIN template_modules m ON m.id = c.module_id
         WHERE c.id = ?1",
        params![config_id],
        |row| {
            Ok((
                row.get("version_id")?,
                row.get("module_id")?,
                parse_module_config_row(row)?,
            ))
        },
    )
    .optional()?
    .ok_or_else(|| ModelError::not_found(Entity::ModuleConfig, config_id).into())
}

/// Module configs mapped to a global.
pub(crate) fn global_usage(conn: &Connection, global_id: &str) -> Result<usize> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM module_configs WHERE mapping_type = 'GLOBAL' AND mapping_value = ?1",
        params![global_id],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

fn touch_version(conn: &Connection, version_id: &str) -> Result<()> {
    let template_id = template_of_version(conn, version_id)?;
    touch_template(conn, &template_id, now_ms())
}

impl Database {
    pub fn create_global_config(&self, version_id: &str, input: GlobalConfigInput) -> Result<GlobalConfig> {
        let global = GlobalConfig {
            id: new_id(),
            name: require_name("name", &input.name)?,
            config_type: input.config_type,
            default_value: input.default_value,
            description: input.description,
            is_hidden: input.is_hidden,
            created_at: now_ms(),
        };

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            template_of_version(&tx, version_id)?;
            insert_global(&tx, version_id, &global)?;
            touch_version(&tx, version_id)?;
            tx.commit()?;

            debug!(version = %version_id, global = %global.id, name = %global.name, "Created global config");
            Ok(global)
        })
    }

    pub fn update_global_config(&self, global_id: &str, patch: GlobalConfigPatch) -> Result<GlobalConfig> {
        let name = patch.name.as_deref().map(|n| require_name("name", n)).transpose()?;

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let (version_id, mut global) = locate_global(&tx, global_id)?;

            if let Some(name) = name {
                global.name = name;
            }
            if let Some(config_type) = patch.config_type {
                global.config_type = config_type;
            }
            if let Some(default_value) = patch.default_value {
                global.default_value = default_value;
            }
            if let Some(description) = patch.description {
                global.description = description;
            }
            if let Some(is_hidden) = patch.is_hidden {
                global.is_hidden = is_hidden;
            }

            tx.execute(
                "UPDATE global_configs
                 SET name = ?2, config_type = ?3, default_value = ?4, description = ?5, is_hidden = ?6
                 WHERE id = ?1",
                params![
                    global_id,
                    &global.name,
                    global.config_type.as_str(),
                    &global.default_value,
                    &global.description,
                    global.is_hidden,
                ],
            )?;
            touch_version(&tx, &version_id)?;
            tx.commit()?;
            Ok(global)
        })
    }

    /// Delete a global config. Refused while module configs map to it.
    pub fn delete_global_config(&self, global_id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let (version_id, global) = locate_global(&tx, global_id)?;

            let usage = global_usage(&tx, global_id)?;
            if usage > 0 {
                return Err(ModelError::InUse {
                    entity: Entity::GlobalConfig,
                    id: global_id.to_string(),
                    count: usage,
                    holder: "module configs",
                }
                .into());
            }

            tx.execute("DELETE FROM global_configs WHERE id = ?1", params![global_id])?;
            tx.execute(
                "DELETE FROM compilation_global_overrides WHERE config_id = ?1",
                params![global_id],
            )?;
            touch_version(&tx, &version_id)?;
            tx.commit()?;

            info!(version = %version_id, name = %global.name, "Deleted global config");
            Ok(())
        })
    }

    pub fn global_usage_count(&self, global_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            locate_global(conn, global_id)?;
            global_usage(conn, global_id)
        })
    }

    pub fn list_global_configs(&self, version_id: &str) -> Result<Vec<GlobalConfig>> {
        self.with_conn(|conn| {
            template_of_version(conn, version_id)?;
            load_globals(conn, version_id)
        })
    }

    /// Bind a catalog project into a version. A project appears at most once
    /// per version.
    pub fn add_module(&self, version_id: &str, input: ModuleInput) -> Result<TemplateModule> {
        let module = TemplateModule {
            id: new_id(),
            project_id: require_name("projectId", &input.project_id)?,
            project_name: require_name("projectName", &input.project_name)?,
            project_version: input.project_version,
            publish_method: input.publish_method,
            configs: Vec::new(),
        };

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            template_of_version(&tx, version_id)?;

            let duplicate: bool = tx
                .query_row(
                    "SELECT 1 FROM template_modules WHERE version_id = ?1 AND project_id = ?2",
                    params![version_id, &module.project_id],
                    |_| Ok(true),
                )
                .optional()?
                .unwrap_or(false);
            if duplicate {
                return Err(ModelError::AlreadyExists {
                    entity: Entity::Module,
                    id: module.project_id.clone(),
                }
                .into());
            }

            insert_module(&tx, version_id, &module)?;
            touch_version(&tx, version_id)?;
            tx.commit()?;

            debug!(version = %version_id, project = %module.project_id, "Added module");
            Ok(module)
        })
    }

    /// Remove a module, its configs and any compilation overrides keyed on it.
    pub fn remove_module(&self, module_id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let version_id = locate_module(&tx, module_id)?;

            tx.execute("DELETE FROM template_modules WHERE id = ?1", params![module_id])?;
            tx.execute(
                "DELETE FROM compilation_module_overrides WHERE module_id = ?1",
                params![module_id],
            )?;
            touch_version(&tx, &version_id)?;
            tx.commit()?;

            debug!(version = %version_id, module = %module_id, "Removed module");
            Ok(())
        })
    }

    pub fn list_modules(&self, version_id: &str) -> Result<Vec<TemplateModule>> {
        self.with_conn(|conn| {
            template_of_version(conn, version_id)?;
            load_modules(conn, version_id)
        })
    }

    pub fn create_module_config(&self, module_id: &str, input: ModuleConfigInput) -> Result<ModuleConfig> {
        let name = require_name("name", &input.name)?;
        check_regex(&input.regex)?;

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let version_id = locate_module(&tx, module_id)?;
            let config = ModuleConfig {
                id: new_id(),
                name,
                file_location: input.file_location,
                mapping: input.mapping,
                regex: input.regex,
                description: input.description,
                is_hidden: input.is_hidden,
                is_selected: input.is_selected,
            };
            check_mapping(&config.id, &config.mapping, &load_globals(&tx, &version_id)?)?;

            insert_module_config(&tx, module_id, &config)?;
            touch_version(&tx, &version_id)?;
            tx.commit()?;

            debug!(
                module = %module_id,
                config = %config.name,
                mapping = config.mapping.mapping_type().as_str(),
                "Created module config"
            );
            Ok(config)
        })
    }

    pub fn update_module_config(&self, config_id: &str, patch: ModuleConfigPatch) -> Result<ModuleConfig> {
        let name = patch.name.as_deref().map(|n| require_name("name", n)).transpose()?;
        if let Some(regex) = &patch.regex {
            check_regex(regex)?;
        }

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let (version_id, _, mut config) = locate_module_config(&tx, config_id)?;

            if let Some(mapping) = patch.mapping(&config.mapping)? {
                check_mapping(config_id, &mapping, &load_globals(&tx, &version_id)?)?;
                config.mapping = mapping;
            }
            if let Some(name) = name {
                config.name = name;
            }
            if let Some(file_location) = patch.file_location {
                config.file_location = file_location;
            }
            if let Some(regex) = patch.regex {
                config.regex = regex;
            }
            if let Some(description) = patch.description {
                config.description = description;
            }
            if let Some(is_hidden) = patch.is_hidden {
                config.is_hidden = is_hidden;
            }
            if let Some(is_selected) = patch.is_selected {
                config.is_selected = is_selected;
            }

            tx.execute(
                "UPDATE module_configs
                 SET name = ?2, file_location = ?3, mapping_type = ?4, mapping_value = ?5,
                     regex = ?6, description = ?7, is_hidden = ?8, is_selected = ?9
                 WHERE id = ?1",
                params![
                    config_id,
                    &config.name,
                    &config.file_location,
                    config.mapping.mapping_type().as_str(),
                    config.mapping.value(),
                    &config.regex,
                    &config.description,
                    config.is_hidden,
                    config.is_selected,
                ],
            )?;
            if config.mapping != Mapping::Manual {
                // Only MANUAL slots read module overrides
                tx.execute(
                    "DELETE FROM compilation_module_overrides WHERE config_id = ?1",
                    params![config_id],
                )?;
            }
            touch_version(&tx, &version_id)?;
            tx.commit()?;
            Ok(config)
        })
    }

    pub fn delete_module_config(&self, config_id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let (version_id, _, _) = locate_module_config(&tx, config_id)?;

            tx.execute("DELETE FROM module_configs WHERE id = ?1", params![config_id])?;
            tx.execute(
                "DELETE FROM compilation_module_overrides WHERE config_id = ?1",
                params![config_id],
            )?;
            touch_version(&tx, &version_id)?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Toggle whether a module config is part of the build selection.
    pub fn set_config_selected(&self, config_id: &str, selected: bool) -> Result<ModuleConfig> {
        self.update_module_config(
            config_id,
            ModuleConfigPatch {
                is_selected: Some(selected),
                ..Default::default()
            },
        )
    }
}
