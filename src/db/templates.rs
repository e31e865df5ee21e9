//! Project template aggregate CRUD.

use super::versions::{insert_version_tree, load_versions, root_version};
use super::{Database, new_id, now_ms};
use crate::error::{Entity, ModelError};
use crate::types::{ProjectTemplate, TemplateSummary, TemplateVersion};
use crate::validate::require_name;
use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::info;

/// Template row without versions.
fn get_template_row(conn: &Connection, template_id: &str) -> Result<Option<ProjectTemplate>> {
    let template = conn
        .query_row(
            "SELECT id, name, description, created_at, updated_at FROM templates WHERE id = ?1",
            params![template_id],
            |row| {
                Ok(ProjectTemplate {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    description: row.get(2)?,
                    created_at: row.get(3)?,
                    updated_at: row.get(4)?,
                    versions: Vec::new(),
                })
            },
        )
        .optional()?;
    Ok(template)
}

pub(crate) fn require_template_exists(conn: &Connection, template_id: &str) -> Result<()> {
    let exists: bool = conn
        .query_row(
            "SELECT 1 FROM templates WHERE id = ?1",
            params![template_id],
            |_| Ok(true),
        )
        .optional()?
        .unwrap_or(false);
    if !exists {
        return Err(ModelError::not_found(Entity::Template, template_id).into());
    }
    Ok(())
}

pub(crate) fn get_template_internal(
    conn: &Connection,
    template_id: &str,
) -> Result<Option<ProjectTemplate>> {
    let Some(mut template) = get_template_row(conn, template_id)? else {
        return Ok(None);
    };
    template.versions = load_versions(conn, template_id)?;
    Ok(Some(template))
}

/// Insert a template row and all its versions in insertion order.
pub(crate) fn insert_template_tree(conn: &Connection, template: &ProjectTemplate) -> Result<()> {
    conn.execute(
        "INSERT INTO templates (id, name, description, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            &template.id,
            &template.name,
            &template.description,
            template.created_at,
            template.updated_at,
        ],
    )?;
    // Link bases after every row exists; bases outside the template are dropped
    for version in &template.versions {
        let detached = TemplateVersion {
            base_version: None,
            ..version.clone()
        };
        insert_version_tree(conn, &detached)?;
    }
    for version in &template.versions {
        let Some(base) = version.base_version.as_deref() else {
            continue;
        };
        if template.versions.iter().any(|v| v.id == base) {
            conn.execute(
                "UPDATE template_versions SET base_version = ?2 WHERE id = ?1",
                params![&version.id, base],
            )?;
        }
    }
    Ok(())
}

impl Database {
    /// Create a template together with its root version.
    pub fn create_template(
        &self,
        name: &str,
        description: &str,
        initial_version: &str,
    ) -> Result<ProjectTemplate> {
        let name = require_name("name", name)?;
        let now = now_ms();
        let template_id = new_id();
        let root = root_version(&template_id, initial_version, "Initial version", now)?;

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO templates (id, name, description, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![&template_id, &name, description, now, now],
            )?;
            insert_version_tree(&tx, &root)?;
            tx.commit()?;

            info!(template = %template_id, name = %name, root = %root.version, "Created template");
            Ok(ProjectTemplate {
                id: template_id.clone(),
                name: name.clone(),
                description: description.to_string(),
                created_at: now,
                updated_at: now,
                versions: vec![root.clone()],
            })
        })
    }

    /// Get a template with all versions and their config trees.
    pub fn get_template(&self, template_id: &str) -> Result<Option<ProjectTemplate>> {
        self.with_conn(|conn| get_template_internal(conn, template_id))
    }

    /// Compact listing, most recently updated first.
    pub fn list_templates(&self) -> Result<Vec<TemplateSummary>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT t.id, t.name, t.description, t.updated_at,
                        (SELECT COUNT(*) FROM template_versions v WHERE v.template_id = t.id),
                        (SELECT v.version FROM template_versions v
                          WHERE v.template_id = t.id ORDER BY v.seq DESC LIMIT 1)
                 FROM templates t
                 ORDER BY t.updated_at DESC, t.id",
            )?;
            let summaries = stmt
                .query_map([], |row| {
                    Ok(TemplateSummary {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        description: row.get(2)?,
                        updated_at: row.get(3)?,
                        version_count: row.get(4)?,
                        latest_version: row.get(5)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(summaries)
        })
    }

    /// Rename or re-describe a template. `None` leaves a field unchanged.
    pub fn update_template(
        &self,
        template_id: &str,
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<ProjectTemplate> {
        let name = name.map(|n| require_name("name", n)).transpose()?;
        let now = now_ms();

        self.with_conn(|conn| {
            let mut template = get_template_internal(conn, template_id)?
                .ok_or_else(|| ModelError::not_found(Entity::Template, template_id))?;
            if let Some(name) = name {
                template.name = name;
            }
            if let Some(description) = description {
                template.description = description.to_string();
            }
            template.updated_at = now;

            conn.execute(
                "UPDATE templates SET name = ?2, description = ?3, updated_at = ?4 WHERE id = ?1",
                params![template_id, &template.name, &template.description, now],
            )?;
            Ok(template)
        })
    }

    /// Delete a template and all its versions. Refused while compilations
    /// reference it.
    pub fn delete_template(&self, template_id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            require_template_exists(&tx, template_id)?;

            let bound: i64 = tx.query_row(
                "SELECT COUNT(*) FROM compilations WHERE template_id = ?1",
                params![template_id],
                |row| row.get(0),
            )?;
            if bound > 0 {
                return Err(ModelError::InUse {
                    entity: Entity::Template,
                    id: template_id.to_string(),
                    count: bound as usize,
                    holder: "compilations",
                }
                .into());
            }

            // Detach the graph first so the cascade never trips the self-reference
            tx.execute(
                "UPDATE template_versions SET base_version = NULL WHERE template_id = ?1",
                params![template_id],
            )?;
            tx.execute("DELETE FROM templates WHERE id = ?1", params![template_id])?;
            tx.commit()?;

            info!(template = %template_id, "Deleted template");
            Ok(())
        })
    }
}
