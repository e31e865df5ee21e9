//! Core types for the deployment-configuration model.
//!
//! Every entity serialises with `camelCase` keys; these shapes are the JSON
//! contract shared by the MCP tools, the REST API and snapshot files.

use serde::{Deserialize, Serialize};

/// Value kind of a global configuration slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfigType {
    #[default]
    Text,
    File,
}

impl ConfigType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigType::Text => "TEXT",
            ConfigType::File => "FILE",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "TEXT" => Some(ConfigType::Text),
            "FILE" => Some(ConfigType::File),
            _ => None,
        }
    }
}

/// A named configuration slot shared by the modules of one template version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalConfig {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub config_type: ConfigType,
    #[serde(default)]
    pub default_value: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_hidden: bool,
    pub created_at: i64,
}

/// Discriminant of a [`Mapping`], as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MappingType {
    Fixed,
    Manual,
    Global,
}

impl MappingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MappingType::Fixed => "FIXED",
            MappingType::Manual => "MANUAL",
            MappingType::Global => "GLOBAL",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "FIXED" => Some(MappingType::Fixed),
            "MANUAL" => Some(MappingType::Manual),
            "GLOBAL" => Some(MappingType::Global),
            _ => None,
        }
    }
}

/// Where a module config takes its value from.
///
/// Serialised flat as `mappingType` + `mappingValue` so the wire shape stays
/// `{"mappingType": "GLOBAL", "mappingValue": "<global id>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "MappingRepr", into = "MappingRepr")]
pub enum Mapping {
    /// Literal value baked into the schema; not overridable.
    Fixed(String),
    /// Supplied per compilation; empty when no override exists.
    Manual,
    /// Follows the resolved value of the referenced global config.
    Global(String),
}

impl Mapping {
    pub fn mapping_type(&self) -> MappingType {
        match self {
            Mapping::Fixed(_) => MappingType::Fixed,
            Mapping::Manual => MappingType::Manual,
            Mapping::Global(_) => MappingType::Global,
        }
    }

    /// The flat `mappingValue` column.
    pub fn value(&self) -> &str {
        match self {
            Mapping::Fixed(value) => value,
            Mapping::Manual => "",
            Mapping::Global(global_id) => global_id,
        }
    }

    /// Global config id this mapping points at, if any.
    pub fn global_ref(&self) -> Option<&str> {
        match self {
            Mapping::Global(global_id) => Some(global_id),
            _ => None,
        }
    }

    /// Rebuild a mapping from its stored discriminant and value.
    pub fn from_parts(mapping_type: MappingType, value: impl Into<String>) -> Result<Self, String> {
        let value = value.into();
        match mapping_type {
            MappingType::Fixed => Ok(Mapping::Fixed(value)),
            MappingType::Manual => Ok(Mapping::Manual),
            MappingType::Global if value.trim().is_empty() => {
                Err("GLOBAL mapping requires a mappingValue naming a global config".to_string())
            }
            MappingType::Global => Ok(Mapping::Global(value)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MappingRepr {
    mapping_type: MappingType,
    #[serde(default)]
    mapping_value: String,
}

impl TryFrom<MappingRepr> for Mapping {
    type Error = String;

    fn try_from(repr: MappingRepr) -> Result<Self, Self::Error> {
        Mapping::from_parts(repr.mapping_type, repr.mapping_value)
    }
}

impl From<Mapping> for MappingRepr {
    fn from(mapping: Mapping) -> Self {
        MappingRepr {
            mapping_type: mapping.mapping_type(),
            mapping_value: mapping.value().to_string(),
        }
    }
}

/// A configuration slot scoped to one module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleConfig {
    pub id: String,
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

/// How a module's artifact is published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PublishMethod {
    #[default]
    Git,
    Download,
}

impl PublishMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishMethod::Git => "GIT",
            PublishMethod::Download => "DOWNLOAD",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GIT" => Some(PublishMethod::Git),
            "DOWNLOAD" => Some(PublishMethod::Download),
            _ => None,
        }
    }
}

/// One catalog project bound into a template version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateModule {
    pub id: String,
    pub project_id: String,
    pub project_name: String,
    #[serde(default)]
    pub project_version: String,
    #[serde(default)]
    pub publish_method: PublishMethod,
    #[serde(default)]
    pub configs: Vec<ModuleConfig>,
}

/// Lifecycle state of a template version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VersionStatus {
    #[default]
    Active,
    Deprecated,
}

impl VersionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VersionStatus::Active => "Active",
            VersionStatus::Deprecated => "Deprecated",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Some(VersionStatus::Active),
            "deprecated" => Some(VersionStatus::Deprecated),
            _ => None,
        }
    }
}

/// Kind of bump used to derive a version from its base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VersionType {
    Major,
    Minor,
    Patch,
    Hotfix,
    Branch,
}

impl VersionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VersionType::Major => "Major",
            VersionType::Minor => "Minor",
            VersionType::Patch => "Patch",
            VersionType::Hotfix => "Hotfix",
            VersionType::Branch => "Branch",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "major" => Some(VersionType::Major),
            "minor" => Some(VersionType::Minor),
            "patch" => Some(VersionType::Patch),
            "hotfix" => Some(VersionType::Hotfix),
            "branch" => Some(VersionType::Branch),
            _ => None,
        }
    }
}

/// One node of a template's tag/branch graph with its own schema snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateVersion {
    pub id: String,
    pub template_id: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    pub date: i64,
    #[serde(default)]
    pub is_branch: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_version: Option<String>,
    #[serde(default)]
    pub status: VersionStatus,
    pub version_type: VersionType,
    #[serde(default)]
    pub global_configs: Vec<GlobalConfig>,
    #[serde(default)]
    pub modules: Vec<TemplateModule>,
}

impl TemplateVersion {
    pub fn find_global(&self, global_id: &str) -> Option<&GlobalConfig> {
        self.global_configs.iter().find(|g| g.id == global_id)
    }

    pub fn find_module(&self, module_id: &str) -> Option<&TemplateModule> {
        self.modules.iter().find(|m| m.id == module_id)
    }

    /// Number of module configs mapped to the given global.
    pub fn global_usage(&self, global_id: &str) -> usize {
        self.modules
            .iter()
            .flat_map(|m| m.configs.iter())
            .filter(|c| c.mapping.global_ref() == Some(global_id))
            .count()
    }
}

/// The aggregate root: a named, versioned bundle of config schemas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectTemplate {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub created_at: i64,
    pub updated_at: i64,
    /// Versions in insertion order.
    #[serde(default)]
    pub versions: Vec<TemplateVersion>,
}

/// Compact template row for list views.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSummary {
    pub id: String,
    pub name: String,
    pub description: String,
    pub version_count: i64,
    pub latest_version: Option<String>,
    pub updated_at: i64,
}

/// Sparse override of one global config within a compilation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalOverride {
    #[serde(alias = "config_id")]
    pub config_id: String,
    pub value: String,
}

/// Sparse override of one module config within a compilation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleOverride {
    #[serde(alias = "module_id")]
    pub module_id: String,
    #[serde(alias = "config_id")]
    pub config_id: String,
    pub value: String,
}

/// Build state of a compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CompilationStatus {
    #[default]
    Draft,
    Building,
    Success,
    Failed,
}

impl CompilationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompilationStatus::Draft => "Draft",
            CompilationStatus::Building => "Building",
            CompilationStatus::Success => "Success",
            CompilationStatus::Failed => "Failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "draft" => Some(CompilationStatus::Draft),
            "building" => Some(CompilationStatus::Building),
            "success" => Some(CompilationStatus::Success),
            "failed" => Some(CompilationStatus::Failed),
            _ => None,
        }
    }
}

/// One template version instantiated for a customer/environment pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Compilation {
    pub id: String,
    pub name: String,
    pub template_id: String,
    /// Id of the bound template version.
    pub template_version: String,
    pub customer_id: String,
    pub environment_id: String,
    #[serde(default)]
    pub global_configs: Vec<GlobalOverride>,
    #[serde(default)]
    pub module_configs: Vec<ModuleOverride>,
    #[serde(default)]
    pub status: CompilationStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A tenant that compilations are produced for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub created_at: i64,
}

/// A deployment target owned by one customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    pub id: String,
    pub customer_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub created_at: i64,
}

/// Editor selection, passed explicitly instead of living in ambient state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_id: Option<String>,
}

impl Selection {
    pub fn version(version_id: impl Into<String>) -> Self {
        Self {
            version_id: Some(version_id.into()),
            module_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mapping_serialises_flat() {
        let config = ModuleConfig {
            id: "c1".into(),
            name: "api.url".into(),
            file_location: "conf/app.properties".into(),
            mapping: Mapping::Global("g1".into()),
            regex: String::new(),
            description: String::new(),
            is_hidden: false,
            is_selected: true,
        };

        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["mappingType"], "GLOBAL");
        assert_eq!(value["mappingValue"], "g1");
        assert!(value.get("mapping").is_none());
    }

    #[test]
    fn manual_mapping_accepts_missing_value() {
        let config: ModuleConfig = serde_json::from_value(json!({
            "id": "c2",
            "name": "db.password",
            "mappingType": "MANUAL"
        }))
        .unwrap();

        assert_eq!(config.mapping, Mapping::Manual);
    }

    #[test]
    fn global_mapping_without_reference_is_rejected() {
        let result: Result<ModuleConfig, _> = serde_json::from_value(json!({
            "id": "c3",
            "name": "broken",
            "mappingType": "GLOBAL",
            "mappingValue": ""
        }));

        assert!(result.is_err());
    }

    #[test]
    fn global_usage_counts_only_matching_references() {
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
            global_configs: vec![],
            modules: vec![TemplateModule {
                id: "m1".into(),
                project_id: "p1".into(),
                project_name: "web".into(),
                project_version: "3.2".into(),
                publish_method: PublishMethod::Git,
                configs: vec![
                    ModuleConfig {
                        id: "c1".into(),
                        name: "a".into(),
                        file_location: String::new(),
                        mapping: Mapping::Global("g1".into()),
                        regex: String::new(),
                        description: String::new(),
                        is_hidden: false,
                        is_selected: false,
                    },
                    ModuleConfig {
                        id: "c2".into(),
                        name: "b".into(),
                        file_location: String::new(),
                        mapping: Mapping::Fixed("g1".into()),
                        regex: String::new(),
                        description: String::new(),
                        is_hidden: false,
                        is_selected: false,
                    },
                ],
            }],
        };

        assert_eq!(version.global_usage("g1"), 1);
        assert_eq!(version.global_usage("g2"), 0);
    }

    #[test]
    fn enum_parsing_is_case_insensitive() {
        assert_eq!(VersionType::from_str("minor"), Some(VersionType::Minor));
        assert_eq!(VersionStatus::from_str("DEPRECATED"), Some(VersionStatus::Deprecated));
        assert_eq!(MappingType::from_str("global"), Some(MappingType::Global));
        assert_eq!(PublishMethod::from_str("download"), Some(PublishMethod::Download));
        assert_eq!(ConfigType::from_str("nope"), None);
    }
}
