//! Tiered configuration loading.
//!
//! Tiers merge field by field, later tiers winning: embedded defaults,
//! project `./deploy-config/config.yaml`, user `~/.deploy-config/config.yaml`,
//! then environment variables. An explicit file (`--config` or
//! `DEPLOY_CONFIG_CONFIG_PATH`) replaces the project and user tiers.

use super::merge::deep_merge_all;
use super::types::Config;
use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const ENV_CONFIG_PATH: &str = "DEPLOY_CONFIG_CONFIG_PATH";
pub const ENV_DB_PATH: &str = "DEPLOY_CONFIG_DB_PATH";
pub const ENV_HTTP_PORT: &str = "DEPLOY_CONFIG_HTTP_PORT";

/// Configuration tier priority (lowest to highest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigTier {
    Defaults = 0,
    Project = 1,
    User = 2,
    Environment = 3,
}

impl std::fmt::Display for ConfigTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigTier::Defaults => write!(f, "defaults"),
            ConfigTier::Project => write!(f, "project"),
            ConfigTier::User => write!(f, "user"),
            ConfigTier::Environment => write!(f, "environment"),
        }
    }
}

/// Directories searched for `config.yaml`.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub project_dir: Option<PathBuf>,
    pub user_dir: Option<PathBuf>,
}

impl Default for ConfigPaths {
    fn default() -> Self {
        Self::discover()
    }
}

impl ConfigPaths {
    pub fn discover() -> Self {
        Self {
            project_dir: Some(PathBuf::from("deploy-config")),
            user_dir: dirs::home_dir().map(|h| h.join(".deploy-config")),
        }
    }

    pub fn with_dirs(project_dir: Option<PathBuf>, user_dir: Option<PathBuf>) -> Self {
        Self {
            project_dir,
            user_dir,
        }
    }
}

/// Parse a YAML file into a JSON value for merging. Missing files are
/// skipped silently; unreadable ones with a warning.
fn read_tier(path: &Path, tier: ConfigTier) -> Option<Value> {
    if !path.exists() {
        return None;
    }
    let parsed = std::fs::read_to_string(path)
        .map_err(anyhow::Error::from)
        .and_then(|content| serde_yaml::from_str::<Value>(&content).map_err(Into::into));
    match parsed {
        Ok(value) => {
            debug!(%tier, path = %path.display(), "Loaded config tier");
            Some(value)
        }
        Err(e) => {
            warn!(%tier, path = %path.display(), error = %e, "Ignoring unreadable config file");
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfigLoader {
    pub paths: ConfigPaths,
    config: Config,
    /// Highest-priority file that contributed, if any.
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Load from all tiers, honouring `DEPLOY_CONFIG_CONFIG_PATH`.
    pub fn load() -> Result<Self> {
        match std::env::var(ENV_CONFIG_PATH) {
            Ok(explicit) => Self::load_explicit(Path::new(&explicit)),
            Err(_) => Self::load_with_paths(ConfigPaths::discover()),
        }
    }

    /// Defaults merged with one explicit file, then the environment.
    pub fn load_explicit(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let file: Value = serde_yaml::from_str(&content)
            .with_context(|| format!("parsing config file {}", path.display()))?;

        let merged = deep_merge_all([serde_json::to_value(Config::default())?, file]);
        let mut config: Config = serde_json::from_value(merged)?;
        apply_env_overrides(&mut config, |key| std::env::var(key).ok());
        config.validate()?;

        Ok(Self {
            paths: ConfigPaths::with_dirs(None, None),
            config,
            config_path: Some(path.to_path_buf()),
        })
    }

    pub fn load_with_paths(paths: ConfigPaths) -> Result<Self> {
        let mut tiers = vec![serde_json::to_value(Config::default())?];
        let mut config_path = None;

        for (dir, tier) in [
            (&paths.project_dir, ConfigTier::Project),
            (&paths.user_dir, ConfigTier::User),
        ] {
            let Some(dir) = dir else { continue };
            let file = dir.join("config.yaml");
            if let Some(value) = read_tier(&file, tier) {
                tiers.push(value);
                config_path = Some(file);
            }
        }

        let mut config: Config = serde_json::from_value(deep_merge_all(tiers))?;
        apply_env_overrides(&mut config, |key| std::env::var(key).ok());
        config.validate()?;

        Ok(Self {
            paths,
            config,
            config_path,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn into_config(self) -> Config {
        self.config
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }
}

/// Environment tier. `lookup` is `std::env::var` outside tests.
pub fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(db_path) = lookup(ENV_DB_PATH) {
        config.server.db_path = PathBuf::from(db_path);
    }
    if let Some(port) = lookup(ENV_HTTP_PORT) {
        match port.parse() {
            Ok(port) => config.server.http.port = port,
            Err(_) => warn!(value = %port, "Ignoring invalid {}", ENV_HTTP_PORT),
        }
    }
}
