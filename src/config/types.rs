//! Configuration sections.

use crate::versioning::TrunkVersion;
use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub versioning: VersioningConfig,

    #[serde(default)]
    pub build: BuildConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default)]
    pub http: HttpConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            http: HttpConfig::default(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("deploy-config/deploy.db")
}

/// REST surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_http_port")]
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_http_port(),
        }
    }
}

fn default_http_port() -> u16 {
    8740
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersioningConfig {
    /// Version string given to the root of a new template.
    #[serde(default = "default_initial_version")]
    pub initial_version: String,

    /// Words in a generated branch suffix.
    #[serde(default = "default_branch_suffix_words")]
    pub branch_suffix_words: u8,
}

impl Default for VersioningConfig {
    fn default() -> Self {
        Self {
            initial_version: default_initial_version(),
            branch_suffix_words: default_branch_suffix_words(),
        }
    }
}

fn default_initial_version() -> String {
    "1.0.0".to_string()
}

fn default_branch_suffix_words() -> u8 {
    2
}

/// Simulated build runner pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    #[serde(default = "default_steps_per_module")]
    pub steps_per_module: u32,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            steps_per_module: default_steps_per_module(),
        }
    }
}

impl BuildConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

fn default_tick_ms() -> u64 {
    250
}

fn default_steps_per_module() -> u32 {
    4
}

impl Config {
    /// Load a single YAML file with no tier merging.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        TrunkVersion::parse(&self.versioning.initial_version).map_err(|e| {
            anyhow!("versioning.initial_version: {}", e)
        })?;
        if self.versioning.branch_suffix_words == 0 {
            return Err(anyhow!("versioning.branch_suffix_words must be at least 1"));
        }
        if self.build.steps_per_module == 0 {
            return Err(anyhow!("build.steps_per_module must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.versioning.initial_version, "1.0.0");
        assert!(!config.server.http.enabled);
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let config: Config = serde_yaml::from_str(
            "versioning:\n  initial_version: \"0.1.0\"\nbuild:\n  tick_ms: 0\n",
        )
        .unwrap();

        assert_eq!(config.versioning.initial_version, "0.1.0");
        assert_eq!(config.versioning.branch_suffix_words, 2);
        assert_eq!(config.build.tick(), Duration::ZERO);
        assert_eq!(config.build.steps_per_module, 4);
    }

    #[test]
    fn non_numeric_initial_version_is_rejected() {
        let mut config = Config::default();
        config.versioning.initial_version = "first".into();
        assert!(config.validate().is_err());
    }
}
