//! Version graph rules: version-string derivation, schema cloning and
//! deletion planning.
//!
//! Everything here is pure; `db::versions` applies the results inside a
//! transaction.

use crate::error::{Entity, ModelError};
use crate::types::{
    GlobalConfig, Mapping, ModuleConfig, Selection, TemplateModule, TemplateVersion, VersionType,
};
use heck::ToKebabCase;
use std::collections::HashMap;
use std::fmt;

/// Numeric trunk version: `major.minor.patch` with an optional hotfix part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrunkVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub hotfix: Option<u64>,
}

impl TrunkVersion {
    /// Parse the leading numeric components of a trunk version string.
    /// Anything after the first `-` is ignored.
    pub fn parse(version: &str) -> Result<Self, ModelError> {
        let numeric = version.split('-').next().unwrap_or_default();
        let parts: Vec<u64> = numeric
            .split('.')
            .map(|p| p.trim().parse::<u64>())
            .collect::<Result<_, _>>()
            .map_err(|_| ModelError::InvalidVersion(version.to_string()))?;

        match parts.as_slice() {
            [major, minor, patch] => Ok(Self {
                major: *major,
                minor: *minor,
                patch: *patch,
                hotfix: None,
            }),
            [major, minor, patch, hotfix] => Ok(Self {
                major: *major,
                minor: *minor,
                patch: *patch,
                hotfix: Some(*hotfix),
            }),
            _ => Err(ModelError::InvalidVersion(version.to_string())),
        }
    }

    /// Bump one component. Lower components reset; hotfix is dropped by
    /// every bump except [`VersionType::Hotfix`].
    pub fn bump(&self, version_type: VersionType) -> Self {
        match version_type {
            VersionType::Major => Self {
                major: self.major + 1,
                minor: 0,
                patch: 0,
                hotfix: None,
            },
            VersionType::Minor => Self {
                major: self.major,
                minor: self.minor + 1,
                patch: 0,
                hotfix: None,
            },
            VersionType::Patch => Self {
                major: self.major,
                minor: self.minor,
                patch: self.patch + 1,
                hotfix: None,
            },
            VersionType::Hotfix => Self {
                hotfix: Some(self.hotfix.unwrap_or(0) + 1),
                ..*self
            },
            VersionType::Branch => *self,
        }
    }
}

impl fmt::Display for TrunkVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(hotfix) = self.hotfix {
            write!(f, ".{}", hotfix)?;
        }
        Ok(())
    }
}

/// Normalise a user-supplied branch suffix to kebab-case.
pub fn normalize_suffix(raw: &str) -> Result<String, ModelError> {
    let suffix = raw.trim().to_kebab_case();
    if suffix.is_empty() {
        return Err(ModelError::invalid(
            "suffix",
            "branch suffix must contain at least one letter or digit",
        ));
    }
    Ok(suffix)
}

/// Random two-or-more word slug for branches created without a suffix.
pub fn generate_suffix(words: u8) -> String {
    use petname::{Generator, Petnames};

    Petnames::medium()
        .generate_one(words.max(1), "-")
        .unwrap_or_else(|| format!("branch-{}", chrono::Utc::now().timestamp_millis()))
}

/// Next step of a branch line: `x-y` becomes `x-y.1`, `x-y.N` becomes `x-y.(N+1)`.
fn next_branch_step(version: &str) -> String {
    let tail_start = version.find('-').map(|i| i + 1).unwrap_or(0);
    let tail = &version[tail_start..];
    if let Some(dot) = tail.rfind('.') {
        let counter = &tail[dot + 1..];
        if !counter.is_empty() && counter.chars().all(|c| c.is_ascii_digit()) {
            if let Ok(n) = counter.parse::<u64>() {
                return format!("{}{}.{}", &version[..tail_start], &tail[..dot], n + 1);
            }
        }
    }
    format!("{}.1", version)
}

/// Compute the version string of a new version derived from `base`.
///
/// `taken` reports whether a version string already exists in the template.
/// Numeric and branch-step collisions keep bumping until a free string is
/// found; an explicit branch name that is already taken is rejected.
pub fn next_version_string(
    base: &TemplateVersion,
    version_type: VersionType,
    suffix: Option<&str>,
    taken: impl Fn(&str) -> bool,
) -> Result<String, ModelError> {
    if version_type == VersionType::Branch {
        let suffix = suffix.ok_or_else(|| ModelError::MissingField("suffix".into()))?;
        let candidate = format!("{}-{}", base.version, normalize_suffix(suffix)?);
        if taken(&candidate) {
            return Err(ModelError::AlreadyExists {
                entity: Entity::Version,
                id: candidate,
            });
        }
        return Ok(candidate);
    }
    if suffix.is_some() {
        return Err(ModelError::invalid("suffix", "only branch versions take a suffix"));
    }

    if base.is_branch {
        let mut candidate = next_branch_step(&base.version);
        while taken(&candidate) {
            candidate = next_branch_step(&candidate);
        }
        return Ok(candidate);
    }

    let mut next = TrunkVersion::parse(&base.version)?.bump(version_type);
    while taken(&next.to_string()) {
        next = next.bump(version_type);
    }
    Ok(next.to_string())
}

/// Deep copies of a version's globals and modules with freshly minted ids.
///
/// GLOBAL mappings are remapped to the copied globals so the clone never
/// points back into its base. References that were already dangling in the
/// base stay as they are.
pub fn clone_schema(
    globals: &[GlobalConfig],
    modules: &[TemplateModule],
    created_at: i64,
    mut new_id: impl FnMut() -> String,
) -> (Vec<GlobalConfig>, Vec<TemplateModule>) {
    let mut id_map: HashMap<&str, String> = HashMap::new();

    let cloned_globals = globals
        .iter()
        .map(|g| {
            let id = new_id();
            id_map.insert(g.id.as_str(), id.clone());
            GlobalConfig {
                id,
                created_at,
                ..g.clone()
            }
        })
        .collect();

    let cloned_modules = modules
        .iter()
        .map(|m| TemplateModule {
            id: new_id(),
            project_id: m.project_id.clone(),
            project_name: m.project_name.clone(),
            project_version: m.project_version.clone(),
            publish_method: m.publish_method,
            configs: m
                .configs
                .iter()
                .map(|c| clone_module_config(c, &id_map, &mut new_id))
                .collect(),
        })
        .collect();

    (cloned_globals, cloned_modules)
}

fn clone_module_config(
    config: &ModuleConfig,
    id_map: &HashMap<&str, String>,
    new_id: &mut impl FnMut() -> String,
) -> ModuleConfig {
    let mapping = match &config.mapping {
        Mapping::Global(global_id) => Mapping::Global(
            id_map
                .get(global_id.as_str())
                .cloned()
                .unwrap_or_else(|| global_id.clone()),
        ),
        other => other.clone(),
    };
    ModuleConfig {
        id: new_id(),
        mapping,
        ..config.clone()
    }
}

/// Structural edits needed to remove one version from a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionPlan {
    pub removed_id: String,
    /// `(version_id, new_base)` for every version whose base changes.
    pub reparent: Vec<(String, Option<String>)>,
    /// Trunk versions that end up under a branch and become branches.
    pub mark_branch: Vec<String>,
    /// Selection after the deletion.
    pub selection: Selection,
}

/// Plan removal of `version_id` from `versions` (insertion order).
///
/// Children move up to the removed version's base. Removing the root
/// promotes its earliest trunk child (the earliest child when all of them
/// are branches) and hangs the other children off it.
pub fn plan_deletion(
    versions: &[TemplateVersion],
    version_id: &str,
    selection: &Selection,
) -> Result<DeletionPlan, ModelError> {
    let target = versions
        .iter()
        .find(|v| v.id == version_id)
        .ok_or_else(|| ModelError::not_found(Entity::Version, version_id))?;

    if versions.len() <= 1 {
        return Err(ModelError::LastVersion {
            template_id: target.template_id.clone(),
        });
    }

    let children: Vec<&TemplateVersion> = versions
        .iter()
        .filter(|v| v.base_version.as_deref() == Some(version_id))
        .collect();

    let reparent: Vec<(String, Option<String>)> = match &target.base_version {
        Some(base) => children
            .iter()
            .map(|c| (c.id.clone(), Some(base.clone())))
            .collect(),
        None => match children.iter().find(|c| !c.is_branch).or(children.first()) {
            Some(heir) => std::iter::once((heir.id.clone(), None))
                .chain(
                    children
                        .iter()
                        .filter(|c| c.id != heir.id)
                        .map(|c| (c.id.clone(), Some(heir.id.clone()))),
                )
                .collect(),
            None => Vec::new(),
        },
    };

    let is_branch = |id: &str| versions.iter().any(|v| v.id == id && v.is_branch);
    let mark_branch = reparent
        .iter()
        .filter_map(|(child, base)| {
            let base = base.as_deref()?;
            (is_branch(base) && !is_branch(child)).then(|| child.clone())
        })
        .collect();

    let selection = if selection.version_id.as_deref() == Some(version_id) {
        let last = versions
            .iter()
            .rev()
            .find(|v| v.id != version_id)
            .map(|v| v.id.clone());
        Selection {
            version_id: last,
            module_id: None,
        }
    } else {
        selection.clone()
    };

    Ok(DeletionPlan {
        removed_id: version_id.to_string(),
        reparent,
        mark_branch,
        selection,
    })
}
