//! Merge preview between a version and its base.
//!
//! No merge policy is applied: the preview lists what differs so an operator
//! can review it. Globals match by name, modules by project id, module
//! configs by name within a matched module.

use crate::types::{GlobalConfig, ModuleConfig, TemplateModule, TemplateVersion};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
}

/// One differing item between source and base.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaChange {
    pub kind: ChangeKind,
    /// `global`, `module` or `module_config`.
    pub scope: &'static str,
    /// Global name, project id, or `project_id/config_name`.
    pub key: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergePreview {
    pub source_id: String,
    pub source_version: String,
    pub target_id: String,
    pub target_version: String,
    pub changes: Vec<SchemaChange>,
    /// Always false: merges are previewed, never applied automatically.
    pub applied: bool,
}

impl MergePreview {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

fn global_fields(source: &GlobalConfig, target: &GlobalConfig) -> Vec<String> {
    let mut fields = Vec::new();
    if source.config_type != target.config_type {
        fields.push("type".to_string());
    }
    if source.default_value != target.default_value {
        fields.push("defaultValue".to_string());
    }
    if source.description != target.description {
        fields.push("description".to_string());
    }
    if source.is_hidden != target.is_hidden {
        fields.push("isHidden".to_string());
    }
    fields
}

/// Compare two configs; GLOBAL references are compared by target name since
/// ids differ between cloned versions.
fn config_fields(
    source: &ModuleConfig,
    target: &ModuleConfig,
    source_globals: &HashMap<&str, &str>,
    target_globals: &HashMap<&str, &str>,
) -> Vec<String> {
    let mut fields = Vec::new();
    if source.file_location != target.file_location {
        fields.push("fileLocation".to_string());
    }
    let same_mapping = match (source.mapping.global_ref(), target.mapping.global_ref()) {
        (Some(s), Some(t)) => match (source_globals.get(s), target_globals.get(t)) {
            (None, None) => s == t,
            (s_name, t_name) => s_name == t_name,
        },
        _ => source.mapping == target.mapping,
    };
    if !same_mapping {
        fields.push("mapping".to_string());
    }
    if source.regex != target.regex {
        fields.push("regex".to_string());
    }
    if source.description != target.description {
        fields.push("description".to_string());
    }
    if source.is_hidden != target.is_hidden {
        fields.push("isHidden".to_string());
    }
    if source.is_selected != target.is_selected {
        fields.push("isSelected".to_string());
    }
    fields
}

fn module_fields(source: &TemplateModule, target: &TemplateModule) -> Vec<String> {
    let mut fields = Vec::new();
    if source.project_name != target.project_name {
        fields.push("projectName".to_string());
    }
    if source.project_version != target.project_version {
        fields.push("projectVersion".to_string());
    }
    if source.publish_method != target.publish_method {
        fields.push("publishMethod".to_string());
    }
    fields
}

/// Diff `source` against `target` (its base).
pub fn merge_preview(source: &TemplateVersion, target: &TemplateVersion) -> MergePreview {
    let mut changes = Vec::new();

    let target_by_name: HashMap<&str, &GlobalConfig> = target
        .global_configs
        .iter()
        .map(|g| (g.name.as_str(), g))
        .collect();
    for g in &source.global_configs {
        match target_by_name.get(g.name.as_str()) {
            None => changes.push(SchemaChange {
                kind: ChangeKind::Added,
                scope: "global",
                key: g.name.clone(),
                fields: vec![],
            }),
            Some(t) => {
                let fields = global_fields(g, t);
                if !fields.is_empty() {
                    changes.push(SchemaChange {
                        kind: ChangeKind::Modified,
                        scope: "global",
                        key: g.name.clone(),
                        fields,
                    });
                }
            }
        }
    }
    for t in &target.global_configs {
        if !source.global_configs.iter().any(|g| g.name == t.name) {
            changes.push(SchemaChange {
                kind: ChangeKind::Removed,
                scope: "global",
                key: t.name.clone(),
                fields: vec![],
            });
        }
    }

    let source_globals: HashMap<&str, &str> = source
        .global_configs
        .iter()
        .map(|g| (g.id.as_str(), g.name.as_str()))
        .collect();
    let target_globals: HashMap<&str, &str> = target
        .global_configs
        .iter()
        .map(|g| (g.id.as_str(), g.name.as_str()))
        .collect();

    for m in &source.modules {
        let Some(tm) = target.modules.iter().find(|t| t.project_id == m.project_id) else {
            changes.push(SchemaChange {
                kind: ChangeKind::Added,
                scope: "module",
                key: m.project_id.clone(),
                fields: vec![],
            });
            continue;
        };
        let fields = module_fields(m, tm);
        if !fields.is_empty() {
            changes.push(SchemaChange {
                kind: ChangeKind::Modified,
                scope: "module",
                key: m.project_id.clone(),
                fields,
            });
        }
        for c in &m.configs {
            let key = format!("{}/{}", m.project_id, c.name);
            match tm.configs.iter().find(|t| t.name == c.name) {
                None => changes.push(SchemaChange {
                    kind: ChangeKind::Added,
                    scope: "module_config",
                    key,
                    fields: vec![],
                }),
                Some(tc) => {
                    let fields = config_fields(c, tc, &source_globals, &target_globals);
                    if !fields.is_empty() {
                        changes.push(SchemaChange {
                            kind: ChangeKind::Modified,
                            scope: "module_config",
                            key,
                            fields,
                        });
                    }
                }
            }
        }
        for tc in &tm.configs {
            if !m.configs.iter().any(|c| c.name == tc.name) {
                changes.push(SchemaChange {
                    kind: ChangeKind::Removed,
                    scope: "module_config",
                    key: format!("{}/{}", m.project_id, tc.name),
                    fields: vec![],
                });
            }
        }
    }
    for tm in &target.modules {
        if !source.modules.iter().any(|m| m.project_id == tm.project_id) {
            changes.push(SchemaChange {
                kind: ChangeKind::Removed,
                scope: "module",
                key: tm.project_id.clone(),
                fields: vec![],
            });
        }
    }

    MergePreview {
        source_id: source.id.clone(),
        source_version: source.version.clone(),
        target_id: target.id.clone(),
        target_version: target.version.clone(),
        changes,
        applied: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConfigType, Mapping, PublishMethod, VersionStatus, VersionType};
    use crate::versioning::clone_schema;

    fn base_version() -> TemplateVersion {
        TemplateVersion {
            id: "v1".into(),
            template_id: "t1".into(),
            version: "1.0.0".into(),
            description: String::new(),
            date: 0,
            is_branch: false,
            base_version: None,
            status: VersionStatus::Active,
            version_type: VersionType::Major,
            global_configs: vec![GlobalConfig {
                id: "g1".into(),
                name: "api.url".into(),
                config_type: ConfigType::Text,
                default_value: "https://zhugeio.com/".into(),
                description: String::new(),
                is_hidden: false,
                created_at: 0,
            }],
            modules: vec![TemplateModule {
                id: "m1".into(),
                project_id: "p-web".into(),
                project_name: "web".into(),
                project_version: "1.0".into(),
                publish_method: PublishMethod::Git,
                configs: vec![ModuleConfig {
                    id: "c1".into(),
                    name: "url".into(),
                    file_location: "app.yml".into(),
                    mapping: Mapping::Global("g1".into()),
                    regex: String::new(),
                    description: String::new(),
                    is_hidden: false,
                    is_selected: true,
                }],
            }],
        }
    }

    fn branch_of(base: &TemplateVersion) -> TemplateVersion {
        let mut n = 0;
        let (globals, modules) = clone_schema(&base.global_configs, &base.modules, 0, || {
            n += 1;
            format!("b{}", n)
        });
        TemplateVersion {
            id: "v2".into(),
            version: "1.0.0-exp".into(),
            is_branch: true,
            base_version: Some(base.id.clone()),
            version_type: VersionType::Branch,
            global_configs: globals,
            modules,
            ..base.clone()
        }
    }

    #[test]
    fn fresh_clone_has_no_changes() {
        let base = base_version();
        let branch = branch_of(&base);

        let preview = merge_preview(&branch, &base);

        assert!(preview.is_empty(), "unexpected changes: {:?}", preview.changes);
        assert!(!preview.applied);
    }

    #[test]
    fn reports_added_modified_and_removed_items() {
        let base = base_version();
        let mut branch = branch_of(&base);
        branch.global_configs[0].default_value = "https://acme.example".into();
        branch.global_configs.push(GlobalConfig {
            id: "b-new".into(),
            name: "feature.flag".into(),
            config_type: ConfigType::Text,
            default_value: "on".into(),
            description: String::new(),
            is_hidden: false,
            created_at: 0,
        });
        branch.modules[0].configs.clear();

        let preview = merge_preview(&branch, &base);

        assert!(preview.changes.contains(&SchemaChange {
            kind: ChangeKind::Modified,
            scope: "global",
            key: "api.url".into(),
            fields: vec!["defaultValue".into()],
        }));
        assert!(preview
            .changes
            .iter()
            .any(|c| c.kind == ChangeKind::Added && c.key == "feature.flag"));
        assert!(preview
            .changes
            .iter()
            .any(|c| c.kind == ChangeKind::Removed && c.key == "p-web/url"));
    }

    #[test]
    fn dangling_global_targets_compare_by_id() {
        let mut base = base_version();
        base.modules[0].configs[0].mapping = Mapping::Global("gone-a".into());
        let mut branch = branch_of(&base);
        branch.modules[0].configs[0].mapping = Mapping::Global("gone-b".into());

        let preview = merge_preview(&branch, &base);
        assert!(preview.changes.iter().any(|c| c.kind == ChangeKind::Modified
            && c.key == "p-web/url"
            && c.fields == vec!["mapping".to_string()]));

        branch.modules[0].configs[0].mapping = Mapping::Global("gone-a".into());
        assert!(merge_preview(&branch, &base).is_empty());
    }
}
