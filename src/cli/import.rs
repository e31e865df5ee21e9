//! Import subcommand.

use crate::db::export::ImportMode;
use clap::{Args, ValueEnum};
use std::path::PathBuf;

/// Handling of snapshot entities whose id is already stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ConflictPolicy {
    /// Abort the import and leave the database untouched
    #[default]
    Fail,
    /// Keep the stored entity and continue
    Skip,
}

impl From<ConflictPolicy> for ImportMode {
    fn from(policy: ConflictPolicy) -> Self {
        match policy {
            ConflictPolicy::Fail => ImportMode::Fail,
            ConflictPolicy::Skip => ImportMode::Skip,
        }
    }
}

/// Arguments for the import subcommand
#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Path to the snapshot file (plain or gzip JSON)
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// What to do when an id already exists
    #[arg(long, value_enum, default_value_t = ConflictPolicy::Fail)]
    pub on_conflict: ConflictPolicy,

    /// Validate the snapshot and report counts without writing anything
    #[arg(long)]
    pub dry_run: bool,
}

impl ImportArgs {
    pub fn mode(&self) -> ImportMode {
        self.on_conflict.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Command};
    use clap::Parser;

    #[test]
    fn default_policy_fails_on_conflict() {
        let cli = Cli::try_parse_from(["deploy-config-mcp", "import", "snap.json"]).unwrap();
        match cli.command {
            Some(Command::Import(args)) => {
                assert_eq!(args.mode(), ImportMode::Fail);
                assert!(!args.dry_run);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn skip_policy_parses() {
        let cli = Cli::try_parse_from([
            "deploy-config-mcp",
            "import",
            "snap.json.gz",
            "--on-conflict",
            "skip",
        ])
        .unwrap();
        match cli.command {
            Some(Command::Import(args)) => assert_eq!(args.mode(), ImportMode::Skip),
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
