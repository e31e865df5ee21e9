//! Compilations: a template version bound to a customer environment, plus
//! its sparse override arrays.

use super::tenants::{get_customer_internal, get_environment_internal};
use super::versions::require_version;
use super::{Database, bad_column, new_id, now_ms};
use crate::error::{Entity, ModelError};
use crate::overrides::{
    OverrideIndex, apply_global_override, apply_module_override, check_global_override,
    check_module_override, check_overrides, fold_global_overrides, fold_module_overrides,
    remove_global_override, remove_module_override,
};
use crate::resolve::{ResolvedSnapshot, resolve_version};
use crate::types::{
    Compilation, CompilationStatus, GlobalOverride, ModuleOverride, TemplateVersion, VersionStatus,
};
use crate::validate::require_name;
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Deserialize;
use tracing::{debug, info};

/// Fields of a new compilation. The template is taken from the version.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilationInput {
    pub name: String,
    pub version_id: String,
    pub customer_id: String,
    pub environment_id: String,
}

/// Optional filters for [`Database::list_compilations`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilationFilter {
    pub template_id: Option<String>,
    pub version_id: Option<String>,
    pub customer_id: Option<String>,
    pub environment_id: Option<String>,
}

const COMPILATION_COLUMNS: &str = "id, name, template_id, version_id, customer_id, environment_id, \
     status, created_at, updated_at";

fn parse_compilation_row(row: &Row) -> rusqlite::Result<Compilation> {
    let status: String = row.get("status")?;

    Ok(Compilation {
        id: row.get("id")?,
        name: row.get("name")?,
        template_id: row.get("template_id")?,
        template_version: row.get("version_id")?,
        customer_id: row.get("customer_id")?,
        environment_id: row.get("environment_id")?,
        global_configs: Vec::new(),
        module_configs: Vec::new(),
        status: CompilationStatus::from_str(&status)
            .ok_or_else(|| bad_column(6, format!("unknown compilation status '{}'", status)))?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn load_overrides(
    conn: &Connection,
    compilation_id: &str,
) -> Result<(Vec<GlobalOverride>, Vec<ModuleOverride>)> {
    let mut stmt = conn.prepare(
        "SELECT config_id, value FROM compilation_global_overrides
         WHERE compilation_id = ?1 ORDER BY position",
    )?;
    let globals = stmt
        .query_map(params![compilation_id], |row| {
            Ok(GlobalOverride {
                config_id: row.get(0)?,
                value: row.get(1)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut stmt = conn.prepare(
        "SELECT module_id, config_id, value FROM compilation_module_overrides
         WHERE compilation_id = ?1 ORDER BY position",
    )?;
    let modules = stmt
        .query_map(params![compilation_id], |row| {
            Ok(ModuleOverride {
                module_id: row.get(0)?,
                config_id: row.get(1)?,
                value: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok((globals, modules))
}

/// Replace both override arrays of a compilation. Caller owns the transaction.
fn write_overrides(
    conn: &Connection,
    compilation_id: &str,
    globals: &[GlobalOverride],
    modules: &[ModuleOverride],
) -> Result<()> {
    conn.execute(
        "DELETE FROM compilation_global_overrides WHERE compilation_id = ?1",
        params![compilation_id],
    )?;
    conn.execute(
        "DELETE FROM compilation_module_overrides WHERE compilation_id = ?1",
        params![compilation_id],
    )?;

    for (position, o) in globals.iter().enumerate() {
        conn.execute(
            "INSERT OR REPLACE INTO compilation_global_overrides (compilation_id, config_id, position, value)
             VALUES (?1, ?2, ?3, ?4)",
            params![compilation_id, &o.config_id, position as i64, &o.value],
        )?;
    }
    for (position, o) in modules.iter().enumerate() {
        conn.execute(
            "INSERT OR REPLACE INTO compilation_module_overrides
                (compilation_id, module_id, config_id, position, value)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![compilation_id, &o.module_id, &o.config_id, position as i64, &o.value],
        )?;
    }
    Ok(())
}

pub(crate) fn get_compilation_internal(
    conn: &Connection,
    compilation_id: &str,
) -> Result<Option<Compilation>> {
    let compilation = conn
        .query_row(
            &format!("SELECT {} FROM compilations WHERE id = ?1", COMPILATION_COLUMNS),
            params![compilation_id],
            parse_compilation_row,
        )
        .optional()?;

    let Some(mut compilation) = compilation else {
        return Ok(None);
    };
    let (globals, modules) = load_overrides(conn, compilation_id)?;
    compilation.global_configs = globals;
    compilation.module_configs = modules;
    Ok(Some(compilation))
}

fn require_compilation(conn: &Connection, compilation_id: &str) -> Result<Compilation> {
    get_compilation_internal(conn, compilation_id)?
        .ok_or_else(|| ModelError::not_found(Entity::Compilation, compilation_id).into())
}

/// Insert a compilation row with its overrides as stored, without checks.
pub(crate) fn insert_compilation(conn: &Connection, compilation: &Compilation) -> Result<()> {
    conn.execute(
        "INSERT INTO compilations (
            id, name, template_id, version_id, customer_id, environment_id, status, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            &compilation.id,
            &compilation.name,
            &compilation.template_id,
            &compilation.template_version,
            &compilation.customer_id,
            &compilation.environment_id,
            compilation.status.as_str(),
            compilation.created_at,
            compilation.updated_at,
        ],
    )?;
    write_overrides(
        conn,
        &compilation.id,
        &compilation.global_configs,
        &compilation.module_configs,
    )
}

impl Database {
    /// Bind a template version to a customer environment.
    ///
    /// The version must be Active and the environment must belong to the
    /// customer. The compilation starts with no overrides.
    pub fn create_compilation(&self, input: CompilationInput) -> Result<Compilation> {
        let name = require_name("name", &input.name)?;
        let now = now_ms();

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let version = require_version(&tx, &input.version_id)?;
            if version.status == VersionStatus::Deprecated {
                return Err(ModelError::Deprecated {
                    version_id: version.id.clone(),
                }
                .into());
            }

            get_customer_internal(&tx, &input.customer_id)?
                .ok_or_else(|| ModelError::not_found(Entity::Customer, &input.customer_id))?;
            let environment = get_environment_internal(&tx, &input.environment_id)?
                .ok_or_else(|| ModelError::not_found(Entity::Environment, &input.environment_id))?;
            if environment.customer_id != input.customer_id {
                return Err(ModelError::invalid(
                    "environmentId",
                    format!(
                        "environment {} belongs to customer {}, not {}",
                        environment.id, environment.customer_id, input.customer_id
                    ),
                )
                .into());
            }

            let compilation = Compilation {
                id: new_id(),
                name,
                template_id: version.template_id.clone(),
                template_version: version.id.clone(),
                customer_id: input.customer_id.clone(),
                environment_id: input.environment_id.clone(),
                global_configs: Vec::new(),
                module_configs: Vec::new(),
                status: CompilationStatus::Draft,
                created_at: now,
                updated_at: now,
            };
            insert_compilation(&tx, &compilation)?;
            tx.commit()?;

            info!(
                compilation = %compilation.id,
                version = %version.version,
                customer = %compilation.customer_id,
                "Created compilation"
            );
            Ok(compilation)
        })
    }

    pub fn get_compilation(&self, compilation_id: &str) -> Result<Option<Compilation>> {
        self.with_conn(|conn| get_compilation_internal(conn, compilation_id))
    }

    /// Compilations matching every given filter, newest first.
    pub fn list_compilations(&self, filter: &CompilationFilter) -> Result<Vec<Compilation>> {
        self.with_conn(|conn| {
            let mut sql = format!("SELECT {} FROM compilations WHERE 1=1", COMPILATION_COLUMNS);
            let mut values: Vec<&str> = Vec::new();
            for (column, value) in [
                ("template_id", &filter.template_id),
                ("version_id", &filter.version_id),
                ("customer_id", &filter.customer_id),
                ("environment_id", &filter.environment_id),
            ] {
                if let Some(value) = value {
                    values.push(value);
                    sql.push_str(&format!(" AND {} = ?{}", column, values.len()));
                }
            }
            sql.push_str(" ORDER BY created_at DESC, id");

            let mut stmt = conn.prepare(&sql)?;
            let mut compilations = stmt
                .query_map(rusqlite::params_from_iter(values), parse_compilation_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            for compilation in &mut compilations {
                let (globals, modules) = load_overrides(conn, &compilation.id)?;
                compilation.global_configs = globals;
                compilation.module_configs = modules;
            }
            Ok(compilations)
        })
    }

    pub fn delete_compilation(&self, compilation_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM compilations WHERE id = ?1",
                params![compilation_id],
            )?;
            if deleted == 0 {
                return Err(ModelError::not_found(Entity::Compilation, compilation_id).into());
            }
            info!(compilation = %compilation_id, "Deleted compilation");
            Ok(())
        })
    }

    /// Replace both override arrays in one transaction after checking every
    /// key against the bound version. Repeated keys collapse, last value wins.
    pub fn replace_overrides(
        &self,
        compilation_id: &str,
        globals: Vec<GlobalOverride>,
        modules: Vec<ModuleOverride>,
    ) -> Result<Compilation> {
        let globals = fold_global_overrides(globals);
        let modules = fold_module_overrides(modules);
        self.edit_overrides(compilation_id, |version, current| {
            check_overrides(version, &globals, &modules)?;
            current.global_configs = globals;
            current.module_configs = modules;
            Ok(true)
        })
        .map(|(compilation, _)| compilation)
    }

    /// Upsert one global override. An empty value is stored, not removed.
    pub fn set_global_override(
        &self,
        compilation_id: &str,
        config_id: &str,
        value: &str,
    ) -> Result<Compilation> {
        let entry = GlobalOverride {
            config_id: config_id.to_string(),
            value: value.to_string(),
        };
        self.edit_overrides(compilation_id, |version, current| {
            check_global_override(version, &entry)?;
            let globals = std::mem::take(&mut current.global_configs);
            current.global_configs = apply_global_override(globals, config_id, value);
            Ok(true)
        })
        .map(|(compilation, _)| compilation)
    }

    /// Upsert one module override. Only MANUAL configs accept overrides.
    pub fn set_module_override(
        &self,
        compilation_id: &str,
        module_id: &str,
        config_id: &str,
        value: &str,
    ) -> Result<Compilation> {
        let entry = ModuleOverride {
            module_id: module_id.to_string(),
            config_id: config_id.to_string(),
            value: value.to_string(),
        };
        self.edit_overrides(compilation_id, |version, current| {
            check_module_override(version, &entry)?;
            let modules = std::mem::take(&mut current.module_configs);
            current.module_configs = apply_module_override(modules, module_id, config_id, value);
            Ok(true)
        })
        .map(|(compilation, _)| compilation)
    }

    /// Drop a global override. Returns whether one existed.
    pub fn remove_global_override(&self, compilation_id: &str, config_id: &str) -> Result<bool> {
        self.edit_overrides(compilation_id, |_, current| {
            Ok(remove_global_override(&mut current.global_configs, config_id))
        })
        .map(|(_, removed)| removed)
    }

    /// Drop a module override. Returns whether one existed.
    pub fn remove_module_override(
        &self,
        compilation_id: &str,
        module_id: &str,
        config_id: &str,
    ) -> Result<bool> {
        self.edit_overrides(compilation_id, |_, current| {
            Ok(remove_module_override(&mut current.module_configs, module_id, config_id))
        })
        .map(|(_, removed)| removed)
    }

    /// Load, edit and rewrite a compilation's overrides under one transaction.
    /// `edit` returns whether anything changed; nothing is written otherwise.
    fn edit_overrides<F>(&self, compilation_id: &str, edit: F) -> Result<(Compilation, bool)>
    where
        F: FnOnce(&TemplateVersion, &mut Compilation) -> Result<bool, ModelError>,
    {
        let now = now_ms();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let mut compilation = require_compilation(&tx, compilation_id)?;
            let version = require_version(&tx, &compilation.template_version)?;
            if !edit(&version, &mut compilation)? {
                return Ok((compilation, false));
            }

            write_overrides(
                &tx,
                compilation_id,
                &compilation.global_configs,
                &compilation.module_configs,
            )?;
            tx.execute(
                "UPDATE compilations SET updated_at = ?2 WHERE id = ?1",
                params![compilation_id, now],
            )?;
            tx.commit()?;

            debug!(
                compilation = %compilation_id,
                globals = compilation.global_configs.len(),
                modules = compilation.module_configs.len(),
                "Wrote overrides"
            );
            compilation.updated_at = now;
            Ok((compilation, true))
        })
    }

    /// Resolve every config slot of the compilation's bound version.
    pub fn resolve_compilation(&self, compilation_id: &str) -> Result<ResolvedSnapshot> {
        self.with_conn(|conn| {
            let compilation = require_compilation(conn, compilation_id)?;
            let version = require_version(conn, &compilation.template_version)?;
            let index = OverrideIndex::new(&compilation.global_configs, &compilation.module_configs);
            let snapshot = resolve_version(&version, &index);

            if !snapshot.warnings.is_empty() {
                tracing::warn!(
                    compilation = %compilation_id,
                    warnings = snapshot.warnings.len(),
                    "Resolved with dangling references"
                );
            }
            Ok(snapshot)
        })
    }

    pub fn set_compilation_status(
        &self,
        compilation_id: &str,
        status: CompilationStatus,
    ) -> Result<()> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE compilations SET status = ?2, updated_at = ?3 WHERE id = ?1",
                params![compilation_id, status.as_str(), now_ms()],
            )?;
            if updated == 0 {
                return Err(ModelError::not_found(Entity::Compilation, compilation_id).into());
            }
            debug!(compilation = %compilation_id, status = status.as_str(), "Compilation status changed");
            Ok(())
        })
    }
}
