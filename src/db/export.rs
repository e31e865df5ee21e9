//! Whole-database export to a [`Snapshot`] and import back.
//!
//! Import runs in a single transaction, parents first: customers,
//! environments, templates with their version trees, then compilations.

use super::Database;
use super::compilations::{get_compilation_internal, insert_compilation};
use super::templates::{get_template_internal, insert_template_tree};
use super::tenants::{get_customer_internal, get_environment_internal, insert_customer, insert_environment};
use crate::error::{Entity, ModelError};
use crate::export::{CURRENT_SCHEMA_VERSION, Snapshot};
use crate::validate::validate_version;
use anyhow::{Result, anyhow};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// What to do with snapshot entities whose id already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImportMode {
    /// Abort the whole import.
    #[default]
    Fail,
    /// Keep the stored entity and continue.
    Skip,
}

impl ImportMode {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "fail" => Some(ImportMode::Fail),
            "skip" => Some(ImportMode::Skip),
            _ => None,
        }
    }
}

/// Counts per entity kind plus anything worth a second look.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    pub imported: BTreeMap<String, usize>,
    pub skipped: BTreeMap<String, usize>,
    pub warnings: Vec<String>,
}

impl ImportResult {
    pub fn total_imported(&self) -> usize {
        self.imported.values().sum()
    }

    pub fn total_skipped(&self) -> usize {
        self.skipped.values().sum()
    }

    fn record(&mut self, kind: &str, imported: bool) {
        let counts = if imported {
            &mut self.imported
        } else {
            &mut self.skipped
        };
        *counts.entry(kind.to_string()).or_default() += 1;
    }
}

fn version_exists(conn: &Connection, version_id: &str) -> Result<bool> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM template_versions WHERE id = ?1",
            params![version_id],
            |_| Ok(true),
        )
        .optional()?
        .unwrap_or(false))
}

/// Decide whether to insert an entity whose id may already exist.
fn should_insert(exists: bool, mode: ImportMode, entity: Entity, id: &str) -> Result<bool> {
    match (exists, mode) {
        (false, _) => Ok(true),
        (true, ImportMode::Skip) => Ok(false),
        (true, ImportMode::Fail) => Err(ModelError::AlreadyExists {
            entity,
            id: id.to_string(),
        }
        .into()),
    }
}

impl Database {
    /// Export every template, tenant and compilation.
    pub fn export_snapshot(&self) -> Result<Snapshot> {
        let mut snapshot = Snapshot::new();

        let template_ids: Vec<String> = self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id FROM templates ORDER BY created_at, id")?;
            let ids = stmt
                .query_map([], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(ids)
        })?;
        for id in template_ids {
            if let Some(template) = self.get_template(&id)? {
                snapshot.templates.push(template);
            }
        }

        snapshot.customers = self.list_customers()?;
        snapshot.environments = self.list_environments(None)?;
        snapshot.compilations = self.list_compilations(&Default::default())?;
        snapshot.compilations.reverse();

        info!(
            templates = snapshot.templates.len(),
            customers = snapshot.customers.len(),
            compilations = snapshot.compilations.len(),
            "Exported snapshot"
        );
        Ok(snapshot)
    }

    /// Import a snapshot. Nothing is written unless the whole import succeeds.
    pub fn import_snapshot(&self, snapshot: &Snapshot, mode: ImportMode) -> Result<ImportResult> {
        if !snapshot.is_schema_compatible() {
            return Err(anyhow!(
                "Snapshot schema version {} is not supported (expected {})",
                snapshot.schema_version,
                CURRENT_SCHEMA_VERSION
            ));
        }

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let mut result = ImportResult::default();

            for customer in &snapshot.customers {
                let exists = get_customer_internal(&tx, &customer.id)?.is_some();
                let insert = should_insert(exists, mode, Entity::Customer, &customer.id)?;
                if insert {
                    insert_customer(&tx, customer)?;
                }
                result.record("customers", insert);
            }

            for environment in &snapshot.environments {
                let exists = get_environment_internal(&tx, &environment.id)?.is_some();
                let insert = should_insert(exists, mode, Entity::Environment, &environment.id)?;
                if insert {
                    insert_environment(&tx, environment)?;
                }
                result.record("environments", insert);
            }

            for template in &snapshot.templates {
                let exists = get_template_internal(&tx, &template.id)?.is_some();
                let insert = should_insert(exists, mode, Entity::Template, &template.id)?;
                if insert {
                    insert_template_tree(&tx, template)?;
                    for version in &template.versions {
                        for issue in validate_version(version) {
                            result.warnings.push(format!(
                                "{} {}: {} ({})",
                                template.name, version.version, issue.message, issue.target_id
                            ));
                        }
                    }
                }
                result.record("templates", insert);
            }

            for compilation in &snapshot.compilations {
                let exists = get_compilation_internal(&tx, &compilation.id)?.is_some();
                if !should_insert(exists, mode, Entity::Compilation, &compilation.id)? {
                    result.record("compilations", false);
                    continue;
                }
                if !version_exists(&tx, &compilation.template_version)? {
                    result.warnings.push(format!(
                        "compilation {} skipped: version {} not found",
                        compilation.id, compilation.template_version
                    ));
                    result.record("compilations", false);
                    continue;
                }
                insert_compilation(&tx, compilation)?;
                result.record("compilations", true);
            }

            tx.commit()?;

            for warning in &result.warnings {
                warn!("{}", warning);
            }
            info!(
                imported = result.total_imported(),
                skipped = result.total_skipped(),
                "Imported snapshot"
            );
            Ok(result)
        })
    }
}
