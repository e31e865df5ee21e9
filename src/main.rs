//! Deploy Config MCP Server
//!
//! Versioned deployment-configuration templates and per-customer
//! compilations, served to agents over MCP and optionally over HTTP.

use anyhow::{Result, bail};
use clap::Parser;
use deploy_config_mcp::api::{self, ApiServer};
use deploy_config_mcp::build::{BuildRegistry, BuildRunner, SimulatedBuildRunner};
use deploy_config_mcp::cli::export::ExportArgs;
use deploy_config_mcp::cli::import::ImportArgs;
use deploy_config_mcp::cli::resolve::ResolveArgs;
use deploy_config_mcp::cli::{Cli, Command};
use deploy_config_mcp::config::{Config, ConfigLoader};
use deploy_config_mcp::db::Database;
use deploy_config_mcp::db::export::ImportResult;
use deploy_config_mcp::error::ToolError;
use deploy_config_mcp::export::{CURRENT_SCHEMA_VERSION, Snapshot};
use deploy_config_mcp::format::{OutputFormat, format_snapshot_markdown};
use deploy_config_mcp::logging::{LogLevelFilter, Logger};
use deploy_config_mcp::tools::{ToolContext, ToolHandler};
use rmcp::{
    ErrorData, RoleServer, ServerHandler, ServiceExt,
    model::{
        CallToolRequestParams, CallToolResult, Content, InitializeResult, ListToolsResult,
        PaginatedRequestParams, ServerCapabilities,
    },
    service::RequestContext,
    transport::io::stdio,
};
use serde_json::{Value, json};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::{Level, debug, info, warn};
use tracing_subscriber::FmtSubscriber;

const INSTRUCTIONS: &str = "\
Deployment configuration templates. Templates own versions (tags and branches), each with \
global configs and modules. A compilation binds one version to a customer environment and \
stores overrides. Start: list_templates() \u{2192} get_template() \u{2192} create_compilation() \
\u{2192} set_override() \u{2192} resolve_compilation() \u{2192} run_build().";

/// MCP server handler.
#[derive(Clone)]
struct DeployConfigServer {
    tool_handler: Arc<ToolHandler>,
    /// Client-adjustable via logging/setLevel.
    level_filter: Arc<LogLevelFilter>,
}

impl ServerHandler for DeployConfigServer {
    fn get_info(&self) -> InitializeResult {
        InitializeResult {
            protocol_version: Default::default(),
            server_info: rmcp::model::Implementation {
                name: "deploy-config-mcp".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            capabilities: ServerCapabilities {
                tools: Some(rmcp::model::ToolsCapability::default()),
                logging: Some(Default::default()),
                ..Default::default()
            },
            instructions: Some(INSTRUCTIONS.to_string()),
        }
    }

    async fn set_level(
        &self,
        request: rmcp::model::SetLevelRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<(), ErrorData> {
        self.level_filter.set(request.level);
        info!(level = ?request.level, "Logging level updated via MCP");
        Ok(())
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> std::result::Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult {
            tools: self.tool_handler.get_tools(),
            next_cursor: None,
            meta: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        context: RequestContext<RoleServer>,
    ) -> std::result::Result<CallToolResult, ErrorData> {
        let tool_name = request.name.clone();
        let start = std::time::Instant::now();

        let logger = Logger::new()
            .with_peer(context.peer.clone())
            .with_level_filter(Arc::clone(&self.level_filter))
            .with_name(format!("tool:{}", tool_name));
        let tool_ctx = ToolContext::new(logger);

        let args = Value::Object(request.arguments.unwrap_or_default());
        match self.tool_handler.call_tool(&tool_name, args, &tool_ctx).await {
            Ok(result) => {
                debug!(
                    tool = %tool_name,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Tool call succeeded"
                );
                Ok(CallToolResult {
                    content: vec![Content::text(response_text(result))],
                    is_error: None,
                    meta: None,
                    structured_content: None,
                })
            }
            Err(e) => {
                let tool_err = ToolError::from(e);
                warn!(
                    tool = %tool_name,
                    error_code = ?tool_err.code,
                    error_message = %tool_err.message,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Tool call failed"
                );
                let error_json = serde_json::to_string(&tool_err).unwrap_or_else(|_| {
                    json!({ "code": "INTERNAL_ERROR", "message": tool_err.message }).to_string()
                });
                Ok(CallToolResult {
                    content: vec![Content::text(error_json)],
                    is_error: Some(true),
                    meta: None,
                    structured_content: None,
                })
            }
        }
    }
}

/// Markdown results are sent as their raw text, everything else as JSON.
fn response_text(result: Value) -> String {
    if result.get("format").and_then(Value::as_str) == Some("markdown")
        && let Some(content) = result.get("content").and_then(Value::as_str)
    {
        return content.to_string();
    }
    match result {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

fn init_logging(target: &str, verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    match target {
        "0" | "off" => {}
        "1" | "stdout" => {
            let subscriber = FmtSubscriber::builder()
                .with_max_level(level)
                .with_writer(std::io::stdout)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        "2" | "stderr" => {
            let subscriber = FmtSubscriber::builder()
                .with_max_level(level)
                .with_writer(std::io::stderr)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        filename => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(filename)?;
            let subscriber = FmtSubscriber::builder()
                .with_max_level(level)
                .with_writer(file)
                .with_ansi(false)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log, cli.verbose)?;

    let mut loader = match &cli.config {
        Some(path) => ConfigLoader::load_explicit(Path::new(path))?,
        None => ConfigLoader::load()?,
    };
    if let Some(path) = loader.config_path() {
        debug!(path = %path.display(), "Using config file");
    }

    let config = loader.config_mut();
    if let Some(db_path) = &cli.database {
        config.server.db_path = db_path.into();
    }
    if cli.http {
        config.server.http.enabled = true;
    }
    if let Some(port) = cli.http_port {
        config.server.http.port = port;
    }
    config.validate()?;
    let config = loader.into_config();

    match cli.command {
        Some(Command::Export(args)) => run_export(&config, args)?,
        Some(Command::Import(args)) => run_import(&config, args)?,
        Some(Command::Resolve(args)) => run_resolve(&config, args)?,
        Some(Command::Serve) | None => run_server(config).await?,
    }

    Ok(())
}

async fn run_server(config: Config) -> Result<()> {
    info!(db = %config.server.db_path.display(), "Opening database");
    let db = Arc::new(Database::open(&config.server.db_path)?);

    let runner: Arc<dyn BuildRunner> = Arc::new(SimulatedBuildRunner::new(
        config.build.tick(),
        config.build.steps_per_module,
    ));
    let builds = BuildRegistry::new();

    let tool_handler = ToolHandler::new(
        Arc::clone(&db),
        config.versioning.clone(),
        Arc::clone(&runner),
    )
    .with_registry(builds.clone());

    let server = DeployConfigServer {
        tool_handler: Arc::new(tool_handler),
        level_filter: Arc::new(LogLevelFilter::default()),
    };

    // Dropping the sender stops the REST server.
    let _http_shutdown = if config.server.http.enabled {
        let state = ApiServer::new(
            Arc::clone(&db),
            config.versioning.clone(),
            Arc::clone(&runner),
            builds,
        );
        match api::start_server(state, config.server.http.port).await {
            Ok((shutdown, addr)) => {
                info!(%addr, "REST API enabled");
                Some(shutdown)
            }
            Err(e) => {
                warn!(port = config.server.http.port, error = %e, "REST API failed to start");
                None
            }
        }
    } else {
        None
    };

    info!("Server ready, listening on stdio");
    let service = server.serve(stdio()).await?;
    service.waiting().await?;

    Ok(())
}

fn run_export(config: &Config, args: ExportArgs) -> Result<()> {
    let db = Database::open(&config.server.db_path)?;
    let snapshot = db.export_snapshot()?;
    let gzip = args.should_compress();

    match &args.output {
        Some(path) => {
            snapshot.write_to_file(path, gzip)?;
            eprintln!(
                "Exported {} templates, {} customers, {} compilations to {}{}",
                snapshot.templates.len(),
                snapshot.customers.len(),
                snapshot.compilations.len(),
                path.display(),
                if gzip { " (gzipped)" } else { "" }
            );
        }
        None => {
            let json_output = snapshot.to_json_pretty()?;
            let stdout = std::io::stdout();
            if gzip {
                use flate2::Compression;
                use flate2::write::GzEncoder;

                let mut encoder = GzEncoder::new(stdout.lock(), Compression::default());
                encoder.write_all(json_output.as_bytes())?;
                encoder.finish()?;
            } else {
                let mut out = stdout.lock();
                writeln!(out, "{}", json_output)?;
            }
        }
    }

    Ok(())
}

fn print_import_result(result: &ImportResult) {
    println!("  Imported:");
    for (kind, count) in &result.imported {
        println!("    {}: {}", kind, count);
    }
    if !result.skipped.is_empty() {
        println!("  Skipped:");
        for (kind, count) in &result.skipped {
            println!("    {}: {}", kind, count);
        }
    }
    if !result.warnings.is_empty() {
        println!("  Warnings:");
        for warning in &result.warnings {
            println!("    - {}", warning);
        }
    }
}

fn run_import(config: &Config, args: ImportArgs) -> Result<()> {
    let snapshot = Snapshot::from_file(&args.file)?;
    if !snapshot.is_schema_compatible() {
        bail!(
            "Snapshot schema version {} differs from current version {}",
            snapshot.schema_version,
            CURRENT_SCHEMA_VERSION
        );
    }

    let db = Database::open(&config.server.db_path)?;
    let mode = args.mode();

    if args.dry_run {
        // Replay into a scratch copy so conflicts are detected without writing.
        let scratch = Database::open_in_memory()?;
        scratch.import_snapshot(&db.export_snapshot()?, mode)?;
        let result = scratch.import_snapshot(&snapshot, mode)?;
        println!("Dry run results ({:?} on conflict):", mode);
        print_import_result(&result);
        return Ok(());
    }

    let result = db.import_snapshot(&snapshot, mode)?;
    println!(
        "Imported {} entities from {} ({} skipped)",
        result.total_imported(),
        args.file.display(),
        result.total_skipped()
    );
    print_import_result(&result);
    Ok(())
}

fn run_resolve(config: &Config, args: ResolveArgs) -> Result<()> {
    let db = Database::open(&config.server.db_path)?;
    let snapshot = db.resolve_compilation(&args.compilation)?;
    match OutputFormat::from(args.format) {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&snapshot)?),
        OutputFormat::Markdown => {
            print!("{}", format_snapshot_markdown(&snapshot, args.reveal_hidden))
        }
    }
    Ok(())
}
