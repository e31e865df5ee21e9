//! Server configuration.
//!
//! Tiers, lowest to highest:
//! 1. **Defaults** - compiled in
//! 2. **Project** - `./deploy-config/config.yaml`
//! 3. **User** - `~/.deploy-config/config.yaml`
//! 4. **Environment** - `DEPLOY_CONFIG_DB_PATH`, `DEPLOY_CONFIG_HTTP_PORT`
//!
//! `DEPLOY_CONFIG_CONFIG_PATH` (or `--config`) names a single file that
//! replaces the project and user tiers.

mod loader;
mod merge;
mod types;

pub use loader::{
    ConfigLoader, ConfigPaths, ConfigTier, ENV_CONFIG_PATH, ENV_DB_PATH, ENV_HTTP_PORT,
    apply_env_overrides,
};
pub use merge::{deep_merge, deep_merge_all};
pub use types::*;
