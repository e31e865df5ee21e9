//! Sparse compilation overrides: upsert merge and lookup.
//!
//! Overrides are kept as ordered vectors (the stored and wire shape). A
//! missing key means "use the schema default"; an empty string is a real
//! override and is never treated as a removal.

use crate::error::ModelError;
use crate::types::{GlobalOverride, Mapping, ModuleOverride, TemplateVersion};
use crate::validate::value_matches;
use std::collections::HashMap;

/// Insert or replace the override for `config_id`.
pub fn apply_global_override(
    mut overrides: Vec<GlobalOverride>,
    config_id: &str,
    value: impl Into<String>,
) -> Vec<GlobalOverride> {
    let value = value.into();
    match overrides.iter_mut().find(|o| o.config_id == config_id) {
        Some(existing) => existing.value = value,
        None => overrides.push(GlobalOverride {
            config_id: config_id.to_string(),
            value,
        }),
    }
    overrides
}

/// Insert or replace the override for `(module_id, config_id)`.
pub fn apply_module_override(
    mut overrides: Vec<ModuleOverride>,
    module_id: &str,
    config_id: &str,
    value: impl Into<String>,
) -> Vec<ModuleOverride> {
    let value = value.into();
    match overrides
        .iter_mut()
        .find(|o| o.module_id == module_id && o.config_id == config_id)
    {
        Some(existing) => existing.value = value,
        None => overrides.push(ModuleOverride {
            module_id: module_id.to_string(),
            config_id: config_id.to_string(),
            value,
        }),
    }
    overrides
}

/// Drop the override for `config_id`. Returns whether one was present.
pub fn remove_global_override(overrides: &mut Vec<GlobalOverride>, config_id: &str) -> bool {
    let before = overrides.len();
    overrides.retain(|o| o.config_id != config_id);
    overrides.len() != before
}

/// Drop the override for `(module_id, config_id)`. Returns whether one was present.
pub fn remove_module_override(
    overrides: &mut Vec<ModuleOverride>,
    module_id: &str,
    config_id: &str,
) -> bool {
    let before = overrides.len();
    overrides.retain(|o| !(o.module_id == module_id && o.config_id == config_id));
    overrides.len() != before
}

/// Borrowed lookup tables over a compilation's override arrays.
#[derive(Debug, Default)]
pub struct OverrideIndex<'a> {
    globals: HashMap<&'a str, &'a str>,
    modules: HashMap<(&'a str, &'a str), &'a str>,
}

impl<'a> OverrideIndex<'a> {
    /// Later duplicates win, matching last-write-wins on the stored arrays.
    pub fn new(globals: &'a [GlobalOverride], modules: &'a [ModuleOverride]) -> Self {
        Self {
            globals: globals
                .iter()
                .map(|o| (o.config_id.as_str(), o.value.as_str()))
                .collect(),
            modules: modules
                .iter()
                .map(|o| ((o.module_id.as_str(), o.config_id.as_str()), o.value.as_str()))
                .collect(),
        }
    }

    /// An index with no overrides at all.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn global(&self, config_id: &str) -> Option<&'a str> {
        self.globals.get(config_id).copied()
    }

    pub fn module(&self, module_id: &str, config_id: &str) -> Option<&'a str> {
        self.modules.get(&(module_id, config_id)).copied()
    }
}

/// Collapse repeated keys the way successive upserts would: first position,
/// last value.
pub fn fold_global_overrides(overrides: Vec<GlobalOverride>) -> Vec<GlobalOverride> {
    overrides.into_iter().fold(Vec::new(), |acc, o| {
        apply_global_override(acc, &o.config_id, o.value)
    })
}

/// Module counterpart of [`fold_global_overrides`].
pub fn fold_module_overrides(overrides: Vec<ModuleOverride>) -> Vec<ModuleOverride> {
    overrides.into_iter().fold(Vec::new(), |acc, o| {
        apply_module_override(acc, &o.module_id, &o.config_id, o.value)
    })
}

fn unknown_target(version: &TemplateVersion, key: String) -> ModelError {
    ModelError::UnknownOverrideTarget {
        key,
        version_id: version.id.clone(),
    }
}

/// A global override must name a global of `version`.
pub fn check_global_override(
    version: &TemplateVersion,
    o: &GlobalOverride,
) -> Result<(), ModelError> {
    match version.find_global(&o.config_id) {
        Some(_) => Ok(()),
        None => Err(unknown_target(version, o.config_id.clone())),
    }
}

/// A module override must land on a MANUAL config of `version` whose regex
/// accepts the value. Empty values skip the regex.
pub fn check_module_override(
    version: &TemplateVersion,
    o: &ModuleOverride,
) -> Result<(), ModelError> {
    let config = version
        .find_module(&o.module_id)
        .and_then(|m| m.configs.iter().find(|c| c.id == o.config_id))
        .ok_or_else(|| unknown_target(version, format!("{}/{}", o.module_id, o.config_id)))?;

    if config.mapping != Mapping::Manual {
        return Err(ModelError::NotOverridable {
            config_id: config.id.clone(),
            mapping: config.mapping.mapping_type().as_str(),
        });
    }
    if !o.value.is_empty() && !value_matches(&config.regex, &o.value) {
        return Err(ModelError::invalid(
            "value",
            format!("'{}' does not match pattern {} of {}", o.value, config.regex, config.name),
        ));
    }
    Ok(())
}

/// Check every entry of both arrays against `version`.
pub fn check_overrides(
    version: &TemplateVersion,
    globals: &[GlobalOverride],
    modules: &[ModuleOverride],
) -> Result<(), ModelError> {
    for o in globals {
        check_global_override(version, o)?;
    }
    for o in modules {
        check_module_override(version, o)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        ConfigType, GlobalConfig, ModuleConfig, PublishMethod, TemplateModule, VersionStatus,
        VersionType,
    };

    fn config(id: &str, mapping: Mapping, regex: &str) -> ModuleConfig {
        ModuleConfig {
            id: id.into(),
            name: format!("{}-name", id),
            file_location: String::new(),
            mapping,
            regex: regex.into(),
            description: String::new(),
            is_hidden: false,
            is_selected: true,
        }
    }

    fn version() -> TemplateVersion {
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
                default_value: String::new(),
                description: String::new(),
                is_hidden: false,
                created_at: 0,
            }],
            modules: vec![TemplateModule {
                id: "m1".into(),
                project_id: "p1".into(),
                project_name: "web".into(),
                project_version: String::new(),
                publish_method: PublishMethod::Git,
                configs: vec![
                    config("fixed", Mapping::Fixed("8080".into()), ""),
                    config("port", Mapping::Manual, r"^\d+$"),
                    config("linked", Mapping::Global("g1".into()), ""),
                ],
            }],
        }
    }

    #[test]
    fn upsert_appends_new_key() {
        let overrides = apply_global_override(Vec::new(), "g1", "a");
        let overrides = apply_global_override(overrides, "g2", "b");

        assert_eq!(overrides.len(), 2);
        assert_eq!(overrides[1].config_id, "g2");
    }

    #[test]
    fn upsert_replaces_existing_value_in_place() {
        let overrides = apply_global_override(Vec::new(), "g1", "a");
        let overrides = apply_global_override(overrides, "g2", "b");
        let overrides = apply_global_override(overrides, "g1", "c");

        assert_eq!(overrides.len(), 2);
        assert_eq!(overrides[0].value, "c");
    }

    #[test]
    fn fold_keeps_first_position_and_last_value() {
        let raw = vec![
            GlobalOverride { config_id: "g1".into(), value: "a".into() },
            GlobalOverride { config_id: "g2".into(), value: "x".into() },
            GlobalOverride { config_id: "g1".into(), value: "b".into() },
        ];

        let folded = fold_global_overrides(raw);
        assert_eq!(folded.len(), 2);
        assert_eq!(folded[0].config_id, "g1");
        assert_eq!(folded[0].value, "b");
    }

    #[test]
    fn empty_string_is_kept_as_an_override() {
        let overrides = apply_global_override(Vec::new(), "g1", "");
        let index = OverrideIndex::new(&overrides, &[]);

        assert_eq!(index.global("g1"), Some(""));
        assert_eq!(index.global("g2"), None);
    }

    #[test]
    fn module_keys_include_module_id() {
        let overrides = apply_module_override(Vec::new(), "m1", "c1", "x");
        let overrides = apply_module_override(overrides, "m2", "c1", "y");
        let overrides = apply_module_override(overrides, "m1", "c1", "z");

        assert_eq!(overrides.len(), 2);
        let index = OverrideIndex::new(&[], &overrides);
        assert_eq!(index.module("m1", "c1"), Some("z"));
        assert_eq!(index.module("m2", "c1"), Some("y"));
    }

    #[test]
    fn remove_reports_presence() {
        let mut overrides = apply_module_override(Vec::new(), "m1", "c1", "x");

        assert!(remove_module_override(&mut overrides, "m1", "c1"));
        assert!(!remove_module_override(&mut overrides, "m1", "c1"));
        assert!(overrides.is_empty());
    }

    #[test]
    fn overrides_must_target_the_bound_version() {
        let v = version();
        let globals = apply_global_override(Vec::new(), "g-elsewhere", "x");

        assert!(matches!(
            check_overrides(&v, &globals, &[]),
            Err(ModelError::UnknownOverrideTarget { .. })
        ));
        let globals = apply_global_override(Vec::new(), "g1", "x");
        assert!(check_overrides(&v, &globals, &[]).is_ok());
    }

    #[test]
    fn only_manual_configs_take_module_overrides() {
        let v = version();

        for id in ["fixed", "linked"] {
            let modules = apply_module_override(Vec::new(), "m1", id, "1");
            assert!(matches!(
                check_overrides(&v, &[], &modules),
                Err(ModelError::NotOverridable { .. })
            ));
        }
        let modules = apply_module_override(Vec::new(), "m1", "port", "9090");
        assert!(check_overrides(&v, &[], &modules).is_ok());
    }

    #[test]
    fn manual_values_respect_the_regex_unless_empty() {
        let v = version();

        let modules = apply_module_override(Vec::new(), "m1", "port", "ninety");
        assert!(matches!(
            check_overrides(&v, &[], &modules),
            Err(ModelError::InvalidValue { .. })
        ));
        let modules = apply_module_override(Vec::new(), "m1", "port", "");
        assert!(check_overrides(&v, &[], &modules).is_ok());
    }
}
