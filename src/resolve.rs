//! Effective-value resolution for config slots.
//!
//! A slot's value comes from the compilation override when one exists,
//! otherwise from the schema. GLOBAL-mapped module configs follow the
//! resolved value of the global they reference.

use crate::error::ModelError;
use crate::overrides::OverrideIndex;
use crate::types::{ConfigType, GlobalConfig, Mapping, ModuleConfig, TemplateVersion};
use serde::{Deserialize, Serialize};

/// Override value if present (even empty), else the schema default.
pub fn resolve_global_value(schema: &GlobalConfig, overrides: &OverrideIndex<'_>) -> String {
    overrides
        .global(&schema.id)
        .map(str::to_string)
        .unwrap_or_else(|| schema.default_value.clone())
}

/// Effective value of one module config.
///
/// FIXED ignores overrides, MANUAL reads the module override (empty when
/// absent), GLOBAL resolves the referenced global. A GLOBAL mapping whose
/// target is missing yields [`ModelError::DanglingReference`].
pub fn resolve_module_value(
    module_id: &str,
    config: &ModuleConfig,
    global_schema: &[GlobalConfig],
    overrides: &OverrideIndex<'_>,
) -> Result<String, ModelError> {
    match &config.mapping {
        Mapping::Fixed(value) => Ok(value.clone()),
        Mapping::Manual => Ok(overrides
            .module(module_id, &config.id)
            .unwrap_or_default()
            .to_string()),
        Mapping::Global(global_id) => global_schema
            .iter()
            .find(|g| &g.id == global_id)
            .map(|g| resolve_global_value(g, overrides))
            .ok_or_else(|| ModelError::DanglingReference {
                config_id: config.id.clone(),
                global_id: global_id.clone(),
            }),
    }
}

/// Where a resolved value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueSource {
    Override,
    Default,
    Fixed,
    Manual,
    Global,
    Dangling,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedGlobal {
    pub config_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub config_type: ConfigType,
    pub value: String,
    pub source: ValueSource,
    pub is_hidden: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedModuleConfig {
    pub config_id: String,
    pub name: String,
    pub file_location: String,
    /// `None` only when the slot's GLOBAL reference dangles.
    pub value: Option<String>,
    pub source: ValueSource,
    pub is_hidden: bool,
    pub is_selected: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedModule {
    pub module_id: String,
    pub project_id: String,
    pub project_name: String,
    pub project_version: String,
    pub configs: Vec<ResolvedModuleConfig>,
}

/// Fully resolved configuration of one version under one override set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedSnapshot {
    pub template_id: String,
    pub version_id: String,
    pub version: String,
    pub globals: Vec<ResolvedGlobal>,
    pub modules: Vec<ResolvedModule>,
    /// Data-integrity problems found while resolving (dangling references).
    pub warnings: Vec<String>,
}

impl ResolvedSnapshot {
    pub fn module(&self, module_id: &str) -> Option<&ResolvedModule> {
        self.modules.iter().find(|m| m.module_id == module_id)
    }

    pub fn global_value(&self, config_id: &str) -> Option<&str> {
        self.globals
            .iter()
            .find(|g| g.config_id == config_id)
            .map(|g| g.value.as_str())
    }
}

/// GLOBAL slots inherit the hidden flag of the global they follow.
fn follows_hidden_global(config: &ModuleConfig, version: &TemplateVersion) -> bool {
    config
        .mapping
        .global_ref()
        .and_then(|id| version.find_global(id))
        .is_some_and(|g| g.is_hidden)
}

/// Resolve every slot of `version`. Dangling references become warnings.
pub fn resolve_version(version: &TemplateVersion, overrides: &OverrideIndex<'_>) -> ResolvedSnapshot {
    let globals = version
        .global_configs
        .iter()
        .map(|g| ResolvedGlobal {
            config_id: g.id.clone(),
            name: g.name.clone(),
            config_type: g.config_type,
            value: resolve_global_value(g, overrides),
            source: if overrides.global(&g.id).is_some() {
                ValueSource::Override
            } else {
                ValueSource::Default
            },
            is_hidden: g.is_hidden,
        })
        .collect();

    let mut warnings = Vec::new();
    let modules = version
        .modules
        .iter()
        .map(|module| {
            let configs = module
                .configs
                .iter()
                .map(|config| {
                    let resolved =
                        resolve_module_value(&module.id, config, &version.global_configs, overrides);
                    let (value, source) = match (resolved, &config.mapping) {
                        (Ok(value), Mapping::Fixed(_)) => (Some(value), ValueSource::Fixed),
                        (Ok(value), Mapping::Manual) => {
                            let source = if overrides.module(&module.id, &config.id).is_some() {
                                ValueSource::Override
                            } else {
                                ValueSource::Manual
                            };
                            (Some(value), source)
                        }
                        (Ok(value), Mapping::Global(_)) => (Some(value), ValueSource::Global),
                        (Err(err), _) => {
                            warnings.push(format!("{}: {}", module.project_name, err));
                            (None, ValueSource::Dangling)
                        }
                    };
                    ResolvedModuleConfig {
                        config_id: config.id.clone(),
                        name: config.name.clone(),
                        file_location: config.file_location.clone(),
                        value,
                        source,
                        is_hidden: config.is_hidden || follows_hidden_global(config, version),
                        is_selected: config.is_selected,
                    }
                })
                .collect();
            ResolvedModule {
                module_id: module.id.clone(),
                project_id: module.project_id.clone(),
                project_name: module.project_name.clone(),
                project_version: module.project_version.clone(),
                configs,
            }
        })
        .collect();

    ResolvedSnapshot {
        template_id: version.template_id.clone(),
        version_id: version.id.clone(),
        version: version.version.clone(),
        globals,
        modules,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GlobalOverride, ModuleOverride, PublishMethod, TemplateModule, VersionStatus, VersionType};

    fn global(id: &str, default_value: &str) -> GlobalConfig {
        GlobalConfig {
            id: id.into(),
            name: format!("{}-name", id),
            config_type: ConfigType::Text,
            default_value: default_value.into(),
            description: String::new(),
            is_hidden: false,
            created_at: 0,
        }
    }

    fn module_config(id: &str, mapping: Mapping) -> ModuleConfig {
        ModuleConfig {
            id: id.into(),
            name: format!("{}-name", id),
            file_location: "conf/app.yml".into(),
            mapping,
            regex: String::new(),
            description: String::new(),
            is_hidden: false,
            is_selected: true,
        }
    }

    #[test]
    fn global_without_override_uses_default() {
        let g = global("g1", "https://zhugeio.com/");
        assert_eq!(resolve_global_value(&g, &OverrideIndex::empty()), "https://zhugeio.com/");
    }

    #[test]
    fn global_override_wins_even_when_empty() {
        let g = global("g1", "https://zhugeio.com/");
        let overrides = vec![GlobalOverride {
            config_id: "g1".into(),
            value: String::new(),
        }];
        let index = OverrideIndex::new(&overrides, &[]);
        assert_eq!(resolve_global_value(&g, &index), "");
    }

    #[test]
    fn global_mapped_module_config_follows_override() {
        let globals = vec![global("g1", "https://zhugeio.com/")];
        let overrides = vec![GlobalOverride {
            config_id: "g1".into(),
            value: "https://acme.example".into(),
        }];
        let index = OverrideIndex::new(&overrides, &[]);
        let config = module_config("c1", Mapping::Global("g1".into()));

        let value = resolve_module_value("m1", &config, &globals, &index).unwrap();
        assert_eq!(value, "https://acme.example");
    }

    #[test]
    fn fixed_mapping_ignores_module_override() {
        let overrides = vec![ModuleOverride {
            module_id: "m1".into(),
            config_id: "c1".into(),
            value: "ignored".into(),
        }];
        let index = OverrideIndex::new(&[], &overrides);
        let config = module_config("c1", Mapping::Fixed("8080".into()));

        assert_eq!(resolve_module_value("m1", &config, &[], &index).unwrap(), "8080");
    }

    #[test]
    fn manual_mapping_defaults_to_empty() {
        let config = module_config("c1", Mapping::Manual);
        let value = resolve_module_value("m1", &config, &[], &OverrideIndex::empty()).unwrap();
        assert_eq!(value, "");
    }

    #[test]
    fn dangling_reference_is_a_distinct_error() {
        let config = module_config("c1", Mapping::Global("gone".into()));
        let err = resolve_module_value("m1", &config, &[], &OverrideIndex::empty()).unwrap_err();
        assert_eq!(
            err,
            ModelError::DanglingReference {
                config_id: "c1".into(),
                global_id: "gone".into()
            }
        );
    }

    #[test]
    fn snapshot_collects_dangling_references_as_warnings() {
        let version = TemplateVersion {
            id: "v1".into(),
            template_id: "t1".into(),
            version: "1.0.0".into(),
            description: String::new(),
            date: 0,
            is_branch: false,
            base_version: None,
            status: VersionStatus::Active,
            version_type: VersionType::Major,
            global_configs: vec![global("g1", "base")],
            modules: vec![TemplateModule {
                id: "m1".into(),
                project_id: "p1".into(),
                project_name: "gateway".into(),
                project_version: "2.1".into(),
                publish_method: PublishMethod::Download,
                configs: vec![
                    module_config("c1", Mapping::Global("g1".into())),
                    module_config("c2", Mapping::Global("missing".into())),
                ],
            }],
        };

        let snapshot = resolve_version(&version, &OverrideIndex::empty());

        assert_eq!(snapshot.global_value("g1"), Some("base"));
        let module = snapshot.module("m1").unwrap();
        assert_eq!(module.configs[0].value.as_deref(), Some("base"));
        assert_eq!(module.configs[0].source, ValueSource::Global);
        assert_eq!(module.configs[1].value, None);
        assert_eq!(module.configs[1].source, ValueSource::Dangling);
        assert_eq!(snapshot.warnings.len(), 1);
        assert!(snapshot.warnings[0].contains("missing"));
    }
}
