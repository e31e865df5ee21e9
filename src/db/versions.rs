//! Template version graph: loading, cloning, deletion and status.

use super::{Database, bad_column, new_id, now_ms};
use crate::error::{Entity, ModelError};
use crate::lineage::{GraphRow, graph_rows};
use crate::merge::{MergePreview, merge_preview};
use crate::types::{
    ConfigType, GlobalConfig, Mapping, MappingType, ModuleConfig, PublishMethod, Selection,
    TemplateModule, TemplateVersion, VersionStatus, VersionType,
};
use crate::validate::{SchemaIssue, validate_version};
use crate::versioning::{
    TrunkVersion, clone_schema, generate_suffix, next_version_string, plan_deletion,
};
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::collections::HashSet;
use tracing::{debug, info};

/// Attempts at drawing an unused random branch suffix.
const SUFFIX_ATTEMPTS: usize = 8;

const VERSION_COLUMNS: &str =
    "id, template_id, version, description, date, is_branch, base_version, status, version_type";

const GLOBAL_COLUMNS: &str =
    "id, name, config_type, default_value, description, is_hidden, created_at";

const MODULE_CONFIG_COLUMNS: &str = "id, name, file_location, mapping_type, mapping_value, regex, \
     description, is_hidden, is_selected";

/// Version row without its config tree.
fn parse_version_row(row: &Row) -> rusqlite::Result<TemplateVersion> {
    let status: String = row.get("status")?;
    let version_type: String = row.get("version_type")?;

    Ok(TemplateVersion {
        id: row.get("id")?,
        template_id: row.get("template_id")?,
        version: row.get("version")?,
        description: row.get("description")?,
        date: row.get("date")?,
        is_branch: row.get("is_branch")?,
        base_version: row.get("base_version")?,
        status: VersionStatus::from_str(&status)
            .ok_or_else(|| bad_column(7, format!("unknown version status '{}'", status)))?,
        version_type: VersionType::from_str(&version_type)
            .ok_or_else(|| bad_column(8, format!("unknown version type '{}'", version_type)))?,
        global_configs: Vec::new(),
        modules: Vec::new(),
    })
}

pub(crate) fn parse_global_row(row: &Row) -> rusqlite::Result<GlobalConfig> {
    let config_type: String = row.get("config_type")?;

    Ok(GlobalConfig {
        id: row.get("id")?,
        name: row.get("name")?,
        config_type: ConfigType::from_str(&config_type)
            .ok_or_else(|| bad_column(2, format!("unknown config type '{}'", config_type)))?,
        default_value: row.get("default_value")?,
        description: row.get("description")?,
        is_hidden: row.get("is_hidden")?,
        created_at: row.get("created_at")?,
    })
}

pub(crate) fn parse_module_config_row(row: &Row) -> rusqlite::Result<ModuleConfig> {
    let mapping_type: String = row.get("mapping_type")?;
    let mapping_value: String = row.get("mapping_value")?;
    let mapping_type = MappingType::from_str(&mapping_type)
        .ok_or_else(|| bad_column(3, format!("unknown mapping type '{}'", mapping_type)))?;
    let mapping = Mapping::from_parts(mapping_type, mapping_value).map_err(|e| bad_column(4, e))?;

    Ok(ModuleConfig {
        id: row.get("id")?,
        name: row.get("name")?,
        file_location: row.get("file_location")?,
        mapping,
        regex: row.get("regex")?,
        description: row.get("description")?,
        is_hidden: row.get("is_hidden")?,
        is_selected: row.get("is_selected")?,
    })
}

fn parse_module_row(row: &Row) -> rusqlite::Result<TemplateModule> {
    let publish_method: String = row.get("publish_method")?;

    Ok(TemplateModule {
        id: row.get("id")?,
        project_id: row.get("project_id")?,
        project_name: row.get("project_name")?,
        project_version: row.get("project_version")?,
        publish_method: PublishMethod::from_str(&publish_method)
            .ok_or_else(|| bad_column(4, format!("unknown publish method '{}'", publish_method)))?,
        configs: Vec::new(),
    })
}

pub(crate) fn load_globals(conn: &Connection, version_id: &str) -> Result<Vec<GlobalConfig>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM global_configs WHERE version_id = ?1 ORDER BY position",
        GLOBAL_COLUMNS
    ))?;
    let globals = stmt
        .query_map(params![version_id], parse_global_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(globals)
}

pub(crate) fn load_module_configs(conn: &Connection, module_id: &str) -> Result<Vec<ModuleConfig>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM module_configs WHERE module_id = ?1 ORDER BY position",
        MODULE_CONFIG_COLUMNS
    ))?;
    let configs = stmt
        .query_map(params![module_id], parse_module_config_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(configs)
}

pub(crate) fn load_modules(conn: &Connection, version_id: &str) -> Result<Vec<TemplateModule>> {
    let mut stmt = conn.prepare(
        "SELECT id, project_id, project_name, project_version, publish_method
         FROM template_modules WHERE version_id = ?1 ORDER BY position",
    )?;
    let mut modules = stmt
        .query_map(params![version_id], parse_module_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    for module in &mut modules {
        module.configs = load_module_configs(conn, &module.id)?;
    }
    Ok(modules)
}

fn get_version_header(conn: &Connection, version_id: &str) -> Result<Option<TemplateVersion>> {
    let version = conn
        .query_row(
            &format!("SELECT {} FROM template_versions WHERE id = ?1", VERSION_COLUMNS),
            params![version_id],
            parse_version_row,
        )
        .optional()?;
    Ok(version)
}

/// Full version with globals, modules and module configs.
pub(crate) fn get_version_internal(
    conn: &Connection,
    version_id: &str,
) -> Result<Option<TemplateVersion>> {
    let Some(mut version) = get_version_header(conn, version_id)? else {
        return Ok(None);
    };
    version.global_configs = load_globals(conn, &version.id)?;
    version.modules = load_modules(conn, &version.id)?;
    Ok(Some(version))
}

pub(crate) fn require_version(conn: &Connection, version_id: &str) -> Result<TemplateVersion> {
    get_version_internal(conn, version_id)?
        .ok_or_else(|| ModelError::not_found(Entity::Version, version_id).into())
}

/// Versions of a template in insertion order, without config trees.
pub(crate) fn version_headers(conn: &Connection, template_id: &str) -> Result<Vec<TemplateVersion>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM template_versions WHERE template_id = ?1 ORDER BY seq",
        VERSION_COLUMNS
    ))?;
    let versions = stmt
        .query_map(params![template_id], parse_version_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(versions)
}

/// Versions of a template in insertion order, with config trees.
pub(crate) fn load_versions(conn: &Connection, template_id: &str) -> Result<Vec<TemplateVersion>> {
    let mut versions = version_headers(conn, template_id)?;
    for version in &mut versions {
        version.global_configs = load_globals(conn, &version.id)?;
        version.modules = load_modules(conn, &version.id)?;
    }
    Ok(versions)
}

fn next_position(conn: &Connection, table: &str, parent_column: &str, parent_id: &str) -> Result<i64> {
    let position: i64 = conn.query_row(
        &format!(
            "SELECT COALESCE(MAX(position), -1) + 1 FROM {} WHERE {} = ?1",
            table, parent_column
        ),
        params![parent_id],
        |row| row.get(0),
    )?;
    Ok(position)
}

pub(crate) fn insert_global(conn: &Connection, version_id: &str, global: &GlobalConfig) -> Result<()> {
    let position = next_position(conn, "global_configs", "version_id", version_id)?;
    conn.execute(
        "INSERT INTO global_configs (
            id, version_id, position, name, config_type, default_value, description, is_hidden, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            &global.id,
            version_id,
            position,
            &global.name,
            global.config_type.as_str(),
            &global.default_value,
            &global.description,
            global.is_hidden,
            global.created_at,
        ],
    )?;
    Ok(())
}

pub(crate) fn insert_module_config(
    conn: &Connection,
    module_id: &str,
    config: &ModuleConfig,
) -> Result<()> {
    let position = next_position(conn, "module_configs", "module_id", module_id)?;
    conn.execute(
        "INSERT INTO module_configs (
            id, module_id, position, name, file_location, mapping_type, mapping_value,
            regex, description, is_hidden, is_selected
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            &config.id,
            module_id,
            position,
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
    Ok(())
}

/// Insert a module together with its configs.
pub(crate) fn insert_module(conn: &Connection, version_id: &str, module: &TemplateModule) -> Result<()> {
    let position = next_position(conn, "template_modules", "version_id", version_id)?;
    conn.execute(
        "INSERT INTO template_modules (
            id, version_id, position, project_id, project_name, project_version, publish_method
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            &module.id,
            version_id,
            position,
            &module.project_id,
            &module.project_name,
            &module.project_version,
            module.publish_method.as_str(),
        ],
    )?;
    for config in &module.configs {
        insert_module_config(conn, &module.id, config)?;
    }
    Ok(())
}

/// Insert a version row and its whole config tree, appended after the
/// template's existing versions.
pub(crate) fn insert_version_tree(conn: &Connection, version: &TemplateVersion) -> Result<()> {
    let seq: i64 = conn.query_row(
        "SELECT COALESCE(MAX(seq), 0) + 1 FROM template_versions WHERE template_id = ?1",
        params![&version.template_id],
        |row| row.get(0),
    )?;
    conn.execute(
        "INSERT INTO template_versions (
            id, template_id, seq, version, description, date, is_branch, base_version, status, version_type
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            &version.id,
            &version.template_id,
            seq,
            &version.version,
            &version.description,
            version.date,
            version.is_branch,
            &version.base_version,
            version.status.as_str(),
            version.version_type.as_str(),
        ],
    )?;
    for global in &version.global_configs {
        insert_global(conn, &version.id, global)?;
    }
    for module in &version.modules {
        insert_module(conn, &version.id, module)?;
    }
    Ok(())
}

pub(crate) fn touch_template(conn: &Connection, template_id: &str, now: i64) -> Result<()> {
    conn.execute(
        "UPDATE templates SET updated_at = ?2 WHERE id = ?1",
        params![template_id, now],
    )?;
    Ok(())
}

/// Number of compilations bound to a version.
pub(crate) fn bound_compilations(conn: &Connection, version_id: &str) -> Result<usize> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM compilations WHERE version_id = ?1",
        params![version_id],
        |row| row.get(0),
    )?;
    Ok(count as usize)
}

/// The parentless version a fresh template starts from.
pub(crate) fn root_version(
    template_id: &str,
    version: &str,
    description: &str,
    now: i64,
) -> Result<TemplateVersion> {
    let trunk = TrunkVersion::parse(version)?;
    Ok(TemplateVersion {
        id: new_id(),
        template_id: template_id.to_string(),
        version: trunk.to_string(),
        description: description.to_string(),
        date: now,
        is_branch: false,
        base_version: None,
        status: VersionStatus::Active,
        version_type: VersionType::Major,
        global_configs: Vec::new(),
        modules: Vec::new(),
    })
}

impl Database {
    /// Get a version with its full config tree.
    pub fn get_version(&self, version_id: &str) -> Result<Option<TemplateVersion>> {
        self.with_conn(|conn| get_version_internal(conn, version_id))
    }

    /// All versions of a template in insertion order.
    pub fn list_versions(&self, template_id: &str) -> Result<Vec<TemplateVersion>> {
        self.with_conn(|conn| {
            super::templates::require_template_exists(conn, template_id)?;
            load_versions(conn, template_id)
        })
    }

    /// Create the root version of a template that has none.
    pub fn create_initial_version(
        &self,
        template_id: &str,
        version: &str,
        description: &str,
    ) -> Result<TemplateVersion> {
        let now = now_ms();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            super::templates::require_template_exists(&tx, template_id)?;

            let has_root: bool = tx
                .query_row(
                    "SELECT 1 FROM template_versions WHERE template_id = ?1 AND base_version IS NULL",
                    params![template_id],
                    |_| Ok(true),
                )
                .optional()?
                .unwrap_or(false);
            if has_root {
                return Err(ModelError::RootExists {
                    template_id: template_id.to_string(),
                }
                .into());
            }

            let root = root_version(template_id, version, description, now)?;
            insert_version_tree(&tx, &root)?;
            touch_template(&tx, template_id, now)?;
            tx.commit()?;

            info!(template = %template_id, version = %root.version, "Created root version");
            Ok(root)
        })
    }

    /// Derive a new version from `base_id`, deep-cloning its config tree.
    ///
    /// Branches without a suffix get a random slug of `suffix_words` words.
    pub fn create_version(
        &self,
        base_id: &str,
        version_type: VersionType,
        description: &str,
        suffix: Option<&str>,
        suffix_words: u8,
    ) -> Result<TemplateVersion> {
        let now = now_ms();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let base = require_version(&tx, base_id)?;

            let taken: HashSet<String> = version_headers(&tx, &base.template_id)?
                .into_iter()
                .map(|v| v.version)
                .collect();
            let is_taken = |candidate: &str| taken.contains(candidate);

            let version_string = match (version_type, suffix) {
                (VersionType::Branch, None) => {
                    let mut attempt = 0;
                    loop {
                        let generated = generate_suffix(suffix_words);
                        match next_version_string(&base, version_type, Some(&generated), is_taken) {
                            Err(ModelError::AlreadyExists { .. }) if attempt + 1 < SUFFIX_ATTEMPTS => {
                                attempt += 1;
                            }
                            result => break result?,
                        }
                    }
                }
                _ => next_version_string(&base, version_type, suffix, is_taken)?,
            };

            let (global_configs, modules) =
                clone_schema(&base.global_configs, &base.modules, now, new_id);

            let version = TemplateVersion {
                id: new_id(),
                template_id: base.template_id.clone(),
                version: version_string,
                description: description.to_string(),
                date: now,
                is_branch: version_type == VersionType::Branch || base.is_branch,
                base_version: Some(base.id.clone()),
                status: VersionStatus::Active,
                version_type,
                global_configs,
                modules,
            };

            insert_version_tree(&tx, &version)?;
            touch_template(&tx, &version.template_id, now)?;
            tx.commit()?;

            info!(
                template = %version.template_id,
                base = %base.version,
                version = %version.version,
                kind = version_type.as_str(),
                "Created version"
            );
            Ok(version)
        })
    }

    /// Delete a version, re-parenting its children. Returns the selection
    /// to show afterwards.
    pub fn delete_version(&self, version_id: &str, selection: &Selection) -> Result<Selection> {
        let now = now_ms();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let target = get_version_header(&tx, version_id)?
                .ok_or_else(|| ModelError::not_found(Entity::Version, version_id))?;
            let versions = version_headers(&tx, &target.template_id)?;
            let plan = plan_deletion(&versions, version_id, selection)?;

            let bound = bound_compilations(&tx, version_id)?;
            if bound > 0 {
                return Err(ModelError::InUse {
                    entity: Entity::Version,
                    id: version_id.to_string(),
                    count: bound,
                    holder: "compilations",
                }
                .into());
            }

            for (child_id, new_base) in &plan.reparent {
                tx.execute(
                    "UPDATE template_versions SET base_version = ?2 WHERE id = ?1",
                    params![child_id, new_base],
                )?;
            }
            for child_id in &plan.mark_branch {
                tx.execute(
                    "UPDATE template_versions SET is_branch = 1 WHERE id = ?1",
                    params![child_id],
                )?;
            }
            tx.execute(
                "DELETE FROM template_versions WHERE id = ?1",
                params![version_id],
            )?;
            touch_template(&tx, &target.template_id, now)?;
            tx.commit()?;

            info!(
                template = %target.template_id,
                version = %target.version,
                reparented = plan.reparent.len(),
                "Deleted version"
            );
            Ok(plan.selection)
        })
    }

    /// Diff a version against its base. Nothing is written.
    pub fn merge_version(&self, source_id: &str) -> Result<MergePreview> {
        self.with_conn(|conn| {
            let source = require_version(conn, source_id)?;
            let base_id = source
                .base_version
                .clone()
                .ok_or_else(|| ModelError::NoBaseVersion {
                    version_id: source_id.to_string(),
                })?;
            let base = require_version(conn, &base_id)?;

            let preview = merge_preview(&source, &base);
            debug!(
                source = %source.version,
                target = %base.version,
                changes = preview.changes.len(),
                "Computed merge preview"
            );
            Ok(preview)
        })
    }

    pub fn set_version_status(&self, version_id: &str, status: VersionStatus) -> Result<TemplateVersion> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE template_versions SET status = ?2 WHERE id = ?1",
                params![version_id, status.as_str()],
            )?;
            if updated == 0 {
                return Err(ModelError::not_found(Entity::Version, version_id).into());
            }
            require_version(conn, version_id)
        })
    }

    /// Versions of a template annotated with their lineage lane.
    pub fn version_graph(&self, template_id: &str) -> Result<Vec<GraphRow>> {
        self.with_conn(|conn| {
            super::templates::require_template_exists(conn, template_id)?;
            Ok(graph_rows(&version_headers(conn, template_id)?))
        })
    }

    /// Non-failing audit of a version's schema.
    pub fn validate_version(&self, version_id: &str) -> Result<Vec<SchemaIssue>> {
        self.with_conn(|conn| Ok(validate_version(&require_version(conn, version_id)?)))
    }
}
