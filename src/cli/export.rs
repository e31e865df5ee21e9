//! Export subcommand.
//!
//! Writes every template, tenant and compilation as one snapshot that can be
//! version-controlled, diffed and re-imported.

use crate::export::wants_gzip;
use clap::Args;
use std::path::PathBuf;

/// Arguments for the export subcommand
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Output file path (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Force gzip compression (auto-detected from .gz extension otherwise)
    #[arg(long)]
    pub gzip: bool,
}

impl ExportArgs {
    /// Explicit `--gzip` wins, otherwise a `.gz` output path decides.
    pub fn should_compress(&self) -> bool {
        self.gzip || self.output.as_deref().is_some_and(wants_gzip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_compress() {
        let args = ExportArgs {
            output: None,
            gzip: true,
        };
        assert!(args.should_compress());

        let args = ExportArgs {
            output: Some(PathBuf::from("snapshot.json.gz")),
            gzip: false,
        };
        assert!(args.should_compress());

        let args = ExportArgs {
            output: Some(PathBuf::from("snapshot.json")),
            gzip: false,
        };
        assert!(!args.should_compress());

        let args = ExportArgs {
            output: None,
            gzip: false,
        };
        assert!(!args.should_compress());
    }
}
