//! Resolve subcommand.

use crate::format::OutputFormat;
use clap::{Args, ValueEnum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ResolveFormat {
    #[default]
    Json,
    Markdown,
}

impl From<ResolveFormat> for OutputFormat {
    fn from(format: ResolveFormat) -> Self {
        match format {
            ResolveFormat::Json => OutputFormat::Json,
            ResolveFormat::Markdown => OutputFormat::Markdown,
        }
    }
}

/// Arguments for the resolve subcommand
#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Compilation ID
    #[arg(value_name = "COMPILATION")]
    pub compilation: String,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = ResolveFormat::Json)]
    pub format: ResolveFormat,

    /// Print hidden values in markdown output instead of masking them
    #[arg(long)]
    pub reveal_hidden: bool,
}
