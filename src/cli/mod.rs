//! CLI command definitions for deploy-config-mcp.
//!
//! The main entry point is the `Cli` struct. Without a subcommand the
//! binary runs the MCP server on stdio.

pub mod export;
pub mod import;
pub mod resolve;

use clap::{Parser, Subcommand};
use export::ExportArgs;
use import::ImportArgs;
use resolve::ResolveArgs;

/// Deployment configuration MCP server and CLI tools
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Path to database file (overrides config)
    #[arg(short, long, global = true)]
    pub database: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    /// Serve the REST API beside the MCP server
    #[arg(long, global = true)]
    pub http: bool,

    /// Port for the REST API (overrides config)
    #[arg(long, global = true)]
    pub http_port: Option<u16>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the MCP server (default if no subcommand given)
    Serve,

    /// Export templates, tenants and compilations to a JSON snapshot
    Export(ExportArgs),

    /// Import a JSON snapshot into the database
    Import(ImportArgs),

    /// Print the resolved configuration of a compilation
    Resolve(ResolveArgs),
}
