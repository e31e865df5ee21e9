//! axum server exposing the store as JSON over HTTP.
//!
//! Routes mirror the MCP tools. Request and response bodies use the same
//! camelCase shapes as snapshot files.

use super::error::{ApiError, ApiResult};
use crate::build::{BuildRegistry, BuildReport, BuildRunner};
use crate::config::VersioningConfig;
use crate::db::Database;
use crate::db::compilations::{CompilationFilter, CompilationInput};
use crate::db::configs::{
    GlobalConfigInput, GlobalConfigPatch, ModuleConfigInput, ModuleConfigPatch, ModuleInput,
};
use crate::db::export::{ImportMode, ImportResult};
use crate::error::{Entity, ModelError, ToolError};
use crate::export::Snapshot;
use crate::lineage::GraphRow;
use crate::logging::Logger;
use crate::merge::MergePreview;
use crate::resolve::ResolvedSnapshot;
use crate::tools::builds::execute_build;
use crate::types::{
    Compilation, Customer, Environment, GlobalConfig, GlobalOverride, ModuleConfig,
    ModuleOverride, ProjectTemplate, Selection, TemplateModule, TemplateSummary, TemplateVersion,
    VersionStatus, VersionType,
};
use crate::validate::SchemaIssue;
use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{delete, get, patch, post, put},
};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// State shared across handlers.
#[derive(Clone)]
pub struct ApiServer {
    db: Arc<Database>,
    versioning: VersioningConfig,
    runner: Arc<dyn BuildRunner>,
    builds: BuildRegistry,
}

impl ApiServer {
    pub fn new(
        db: Arc<Database>,
        versioning: VersioningConfig,
        runner: Arc<dyn BuildRunner>,
        builds: BuildRegistry,
    ) -> Self {
        Self {
            db,
            versioning,
            runner,
            builds,
        }
    }

    fn db(&self) -> &Database {
        &self.db
    }
}

#[derive(serde::Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn api_root() -> impl IntoResponse {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "/api/health",
            "templates": "/api/templates",
            "versions": "/api/versions/{id}",
            "compilations": "/api/compilations",
            "customers": "/api/customers",
            "environments": "/api/environments",
            "export": "/api/export",
            "import": "/api/import"
        }
    }))
}

// Templates

#[derive(Deserialize)]
struct CreateTemplateBody {
    name: String,
    #[serde(default)]
    description: String,
}

#[derive(Deserialize)]
struct UpdateTemplateBody {
    name: Option<String>,
    description: Option<String>,
}

async fn list_templates(State(state): State<ApiServer>) -> ApiResult<Json<Vec<TemplateSummary>>> {
    Ok(Json(state.db().list_templates()?))
}

async fn create_template(
    State(state): State<ApiServer>,
    Json(body): Json<CreateTemplateBody>,
) -> ApiResult<(StatusCode, Json<ProjectTemplate>)> {
    let template = state.db().create_template(
        &body.name,
        &body.description,
        &state.versioning.initial_version,
    )?;
    Ok((StatusCode::CREATED, Json(template)))
}

async fn get_template(
    State(state): State<ApiServer>,
    Path(template_id): Path<String>,
) -> ApiResult<Json<ProjectTemplate>> {
    let template = state
        .db()
        .get_template(&template_id)?
        .ok_or_else(|| ModelError::not_found(Entity::Template, &template_id))?;
    Ok(Json(template))
}

async fn update_template(
    State(state): State<ApiServer>,
    Path(template_id): Path<String>,
    Json(body): Json<UpdateTemplateBody>,
) -> ApiResult<Json<ProjectTemplate>> {
    let template = state.db().update_template(
        &template_id,
        body.name.as_deref(),
        body.description.as_deref(),
    )?;
    Ok(Json(template))
}

async fn delete_template(
    State(state): State<ApiServer>,
    Path(template_id): Path<String>,
) -> ApiResult<StatusCode> {
    state.db().delete_template(&template_id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn template_graph(
    State(state): State<ApiServer>,
    Path(template_id): Path<String>,
) -> ApiResult<Json<Vec<GraphRow>>> {
    Ok(Json(state.db().version_graph(&template_id)?))
}

// Versions

#[derive(Deserialize)]
struct InitialVersionBody {
    #[serde(default)]
    description: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeriveVersionBody {
    version_type: VersionType,
    #[serde(default)]
    description: String,
    suffix: Option<String>,
}

#[derive(Deserialize)]
struct StatusBody {
    status: VersionStatus,
}

async fn list_versions(
    State(state): State<ApiServer>,
    Path(template_id): Path<String>,
) -> ApiResult<Json<Vec<TemplateVersion>>> {
    Ok(Json(state.db().list_versions(&template_id)?))
}

async fn create_initial_version(
    State(state): State<ApiServer>,
    Path(template_id): Path<String>,
    Json(body): Json<InitialVersionBody>,
) -> ApiResult<(StatusCode, Json<TemplateVersion>)> {
    let description = body
        .description
        .unwrap_or_else(|| "Initial version".to_string());
    let version = state.db().create_initial_version(
        &template_id,
        &state.versioning.initial_version,
        &description,
    )?;
    Ok((StatusCode::CREATED, Json(version)))
}

async fn get_version(
    State(state): State<ApiServer>,
    Path(version_id): Path<String>,
) -> ApiResult<Json<TemplateVersion>> {
    let version = state
        .db()
        .get_version(&version_id)?
        .ok_or_else(|| ModelError::not_found(Entity::Version, &version_id))?;
    Ok(Json(version))
}

async fn delete_version(
    State(state): State<ApiServer>,
    Path(version_id): Path<String>,
    Query(selection): Query<Selection>,
) -> ApiResult<Json<Selection>> {
    Ok(Json(state.db().delete_version(&version_id, &selection)?))
}

async fn derive_version(
    State(state): State<ApiServer>,
    Path(base_id): Path<String>,
    Json(body): Json<DeriveVersionBody>,
) -> ApiResult<(StatusCode, Json<TemplateVersion>)> {
    let version = state.db().create_version(
        &base_id,
        body.version_type,
        &body.description,
        body.suffix.as_deref(),
        state.versioning.branch_suffix_words,
    )?;
    Ok((StatusCode::CREATED, Json(version)))
}

async fn merge_preview(
    State(state): State<ApiServer>,
    Path(version_id): Path<String>,
) -> ApiResult<Json<MergePreview>> {
    Ok(Json(state.db().merge_version(&version_id)?))
}

async fn set_version_status(
    State(state): State<ApiServer>,
    Path(version_id): Path<String>,
    Json(body): Json<StatusBody>,
) -> ApiResult<Json<TemplateVersion>> {
    Ok(Json(state.db().set_version_status(&version_id, body.status)?))
}

async fn version_issues(
    State(state): State<ApiServer>,
    Path(version_id): Path<String>,
) -> ApiResult<Json<Vec<SchemaIssue>>> {
    Ok(Json(state.db().validate_version(&version_id)?))
}

// Schema

#[derive(Deserialize)]
struct SelectedBody {
    selected: bool,
}

async fn list_globals(
    State(state): State<ApiServer>,
    Path(version_id): Path<String>,
) -> ApiResult<Json<Vec<GlobalConfig>>> {
    Ok(Json(state.db().list_global_configs(&version_id)?))
}

async fn create_global(
    State(state): State<ApiServer>,
    Path(version_id): Path<String>,
    Json(input): Json<GlobalConfigInput>,
) -> ApiResult<(StatusCode, Json<GlobalConfig>)> {
    let global = state.db().create_global_config(&version_id, input)?;
    Ok((StatusCode::CREATED, Json(global)))
}

async fn update_global(
    State(state): State<ApiServer>,
    Path(global_id): Path<String>,
    Json(patch): Json<GlobalConfigPatch>,
) -> ApiResult<Json<GlobalConfig>> {
    Ok(Json(state.db().update_global_config(&global_id, patch)?))
}

async fn delete_global(
    State(state): State<ApiServer>,
    Path(global_id): Path<String>,
) -> ApiResult<StatusCode> {
    state.db().delete_global_config(&global_id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn global_usage(
    State(state): State<ApiServer>,
    Path(global_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let usage = state.db().global_usage_count(&global_id)?;
    Ok(Json(json!({ "globalId": global_id, "usage": usage })))
}

async fn list_modules(
    State(state): State<ApiServer>,
    Path(version_id): Path<String>,
) -> ApiResult<Json<Vec<TemplateModule>>> {
    Ok(Json(state.db().list_modules(&version_id)?))
}

async fn add_module(
    State(state): State<ApiServer>,
    Path(version_id): Path<String>,
    Json(input): Json<ModuleInput>,
) -> ApiResult<(StatusCode, Json<TemplateModule>)> {
    let module = state.db().add_module(&version_id, input)?;
    Ok((StatusCode::CREATED, Json(module)))
}

async fn remove_module(
    State(state): State<ApiServer>,
    Path(module_id): Path<String>,
) -> ApiResult<StatusCode> {
    state.db().remove_module(&module_id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn create_module_config(
    State(state): State<ApiServer>,
    Path(module_id): Path<String>,
    Json(input): Json<ModuleConfigInput>,
) -> ApiResult<(StatusCode, Json<ModuleConfig>)> {
    let config = state.db().create_module_config(&module_id, input)?;
    Ok((StatusCode::CREATED, Json(config)))
}

async fn update_module_config(
    State(state): State<ApiServer>,
    Path(config_id): Path<String>,
    Json(patch): Json<ModuleConfigPatch>,
) -> ApiResult<Json<ModuleConfig>> {
    Ok(Json(state.db().update_module_config(&config_id, patch)?))
}

async fn delete_module_config(
    State(state): State<ApiServer>,
    Path(config_id): Path<String>,
) -> ApiResult<StatusCode> {
    state.db().delete_module_config(&config_id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn select_module_config(
    State(state): State<ApiServer>,
    Path(config_id): Path<String>,
    Json(body): Json<SelectedBody>,
) -> ApiResult<Json<ModuleConfig>> {
    Ok(Json(state.db().set_config_selected(&config_id, body.selected)?))
}

// Compilations

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OverridesBody {
    #[serde(default)]
    global_configs: Vec<GlobalOverride>,
    #[serde(default)]
    module_configs: Vec<ModuleOverride>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct BuildBody {
    #[serde(default)]
    module_ids: Vec<String>,
}

async fn list_compilations(
    State(state): State<ApiServer>,
    Query(filter): Query<CompilationFilter>,
) -> ApiResult<Json<Vec<Compilation>>> {
    Ok(Json(state.db().list_compilations(&filter)?))
}

async fn create_compilation(
    State(state): State<ApiServer>,
    Json(input): Json<CompilationInput>,
) -> ApiResult<(StatusCode, Json<Compilation>)> {
    let compilation = state.db().create_compilation(input)?;
    Ok((StatusCode::CREATED, Json(compilation)))
}

async fn get_compilation(
    State(state): State<ApiServer>,
    Path(compilation_id): Path<String>,
) -> ApiResult<Json<Compilation>> {
    let compilation = state
        .db()
        .get_compilation(&compilation_id)?
        .ok_or_else(|| ModelError::not_found(Entity::Compilation, &compilation_id))?;
    Ok(Json(compilation))
}

async fn delete_compilation(
    State(state): State<ApiServer>,
    Path(compilation_id): Path<String>,
) -> ApiResult<StatusCode> {
    state.db().delete_compilation(&compilation_id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn replace_overrides(
    State(state): State<ApiServer>,
    Path(compilation_id): Path<String>,
    Json(body): Json<OverridesBody>,
) -> ApiResult<Json<Compilation>> {
    let compilation =
        state
            .db()
            .replace_overrides(&compilation_id, body.global_configs, body.module_configs)?;
    Ok(Json(compilation))
}

async fn resolve_compilation(
    State(state): State<ApiServer>,
    Path(compilation_id): Path<String>,
) -> ApiResult<Json<ResolvedSnapshot>> {
    Ok(Json(state.db().resolve_compilation(&compilation_id)?))
}

async fn run_build(
    State(state): State<ApiServer>,
    Path(compilation_id): Path<String>,
    Json(body): Json<BuildBody>,
) -> ApiResult<Json<BuildReport>> {
    let logger = Logger::new().with_name(format!("build:{}", compilation_id));
    let report = execute_build(
        state.db(),
        state.runner.as_ref(),
        &state.builds,
        &logger,
        &compilation_id,
        body.module_ids,
    )
    .await?;
    Ok(Json(report))
}

// Tenants

#[derive(Deserialize)]
struct NamedBody {
    name: String,
    #[serde(default)]
    description: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnvironmentQuery {
    customer_id: Option<String>,
}

async fn list_customers(State(state): State<ApiServer>) -> ApiResult<Json<Vec<Customer>>> {
    Ok(Json(state.db().list_customers()?))
}

async fn create_customer(
    State(state): State<ApiServer>,
    Json(body): Json<NamedBody>,
) -> ApiResult<(StatusCode, Json<Customer>)> {
    let customer = state.db().create_customer(&body.name, &body.description)?;
    Ok((StatusCode::CREATED, Json(customer)))
}

async fn delete_customer(
    State(state): State<ApiServer>,
    Path(customer_id): Path<String>,
) -> ApiResult<StatusCode> {
    state.db().delete_customer(&customer_id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_customer(
    State(state): State<ApiServer>,
    Path(customer_id): Path<String>,
) -> ApiResult<Json<Customer>> {
    let customer = state
        .db()
        .get_customer(&customer_id)?
        .ok_or_else(|| ModelError::not_found(Entity::Customer, &customer_id))?;
    Ok(Json(customer))
}

async fn customer_environments(
    State(state): State<ApiServer>,
    Path(customer_id): Path<String>,
) -> ApiResult<Json<Vec<Environment>>> {
    state
        .db()
        .get_customer(&customer_id)?
        .ok_or_else(|| ModelError::not_found(Entity::Customer, &customer_id))?;
    Ok(Json(state.db().list_environments(Some(&customer_id))?))
}

async fn create_environment(
    State(state): State<ApiServer>,
    Path(customer_id): Path<String>,
    Json(body): Json<NamedBody>,
) -> ApiResult<(StatusCode, Json<Environment>)> {
    let environment =
        state
            .db()
            .create_environment(&customer_id, &body.name, &body.description)?;
    Ok((StatusCode::CREATED, Json(environment)))
}

async fn list_environments(
    State(state): State<ApiServer>,
    Query(query): Query<EnvironmentQuery>,
) -> ApiResult<Json<Vec<Environment>>> {
    Ok(Json(state.db().list_environments(query.customer_id.as_deref())?))
}

async fn get_environment(
    State(state): State<ApiServer>,
    Path(environment_id): Path<String>,
) -> ApiResult<Json<Environment>> {
    let environment = state
        .db()
        .get_environment(&environment_id)?
        .ok_or_else(|| ModelError::not_found(Entity::Environment, &environment_id))?;
    Ok(Json(environment))
}

async fn delete_environment(
    State(state): State<ApiServer>,
    Path(environment_id): Path<String>,
) -> ApiResult<StatusCode> {
    state.db().delete_environment(&environment_id)?;
    Ok(StatusCode::NO_CONTENT)
}

// Snapshots

#[derive(Deserialize)]
struct ImportQuery {
    mode: Option<String>,
}

async fn export_snapshot(State(state): State<ApiServer>) -> ApiResult<Json<Snapshot>> {
    Ok(Json(state.db().export_snapshot()?))
}

async fn import_snapshot(
    State(state): State<ApiServer>,
    Query(query): Query<ImportQuery>,
    Json(snapshot): Json<Snapshot>,
) -> ApiResult<Json<ImportResult>> {
    let mode = match query.mode.as_deref() {
        None => ImportMode::default(),
        Some(raw) => ImportMode::from_str(raw).ok_or_else(|| {
            ApiError::from(ToolError::invalid_value("mode", "expected 'fail' or 'skip'"))
        })?,
    };
    Ok(Json(state.db().import_snapshot(&snapshot, mode)?))
}

/// Build the router with all routes.
pub fn build_router(state: ApiServer) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api", get(api_root))
        .route("/api/health", get(health))
        // Templates and versions
        .route("/api/templates", get(list_templates).post(create_template))
        .route(
            "/api/templates/{template_id}",
            get(get_template)
                .patch(update_template)
                .delete(delete_template),
        )
        .route("/api/templates/{template_id}/graph", get(template_graph))
        .route(
            "/api/templates/{template_id}/versions",
            get(list_versions).post(create_initial_version),
        )
        .route(
            "/api/versions/{version_id}",
            get(get_version).delete(delete_version),
        )
        .route("/api/versions/{version_id}/derive", post(derive_version))
        .route("/api/versions/{version_id}/merge-preview", get(merge_preview))
        .route("/api/versions/{version_id}/status", put(set_version_status))
        .route("/api/versions/{version_id}/issues", get(version_issues))
        // Schema
        .route(
            "/api/versions/{version_id}/globals",
            get(list_globals).post(create_global),
        )
        .route(
            "/api/versions/{version_id}/modules",
            get(list_modules).post(add_module),
        )
        .route(
            "/api/globals/{global_id}",
            patch(update_global).delete(delete_global),
        )
        .route("/api/globals/{global_id}/usage", get(global_usage))
        .route("/api/modules/{module_id}", delete(remove_module))
        .route("/api/modules/{module_id}/configs", post(create_module_config))
        .route(
            "/api/module-configs/{config_id}",
            patch(update_module_config).delete(delete_module_config),
        )
        .route(
            "/api/module-configs/{config_id}/selected",
            put(select_module_config),
        )
        // Compilations
        .route(
            "/api/compilations",
            get(list_compilations).post(create_compilation),
        )
        .route(
            "/api/compilations/{compilation_id}",
            get(get_compilation).delete(delete_compilation),
        )
        .route(
            "/api/compilations/{compilation_id}/overrides",
            put(replace_overrides),
        )
        .route(
            "/api/compilations/{compilation_id}/resolved",
            get(resolve_compilation),
        )
        .route("/api/compilations/{compilation_id}/builds", post(run_build))
        // Tenants
        .route("/api/customers", get(list_customers).post(create_customer))
        .route(
            "/api/customers/{customer_id}",
            get(get_customer).delete(delete_customer),
        )
        .route(
            "/api/customers/{customer_id}/environments",
            get(customer_environments).post(create_environment),
        )
        .route("/api/environments", get(list_environments))
        .route(
            "/api/environments/{environment_id}",
            get(get_environment).delete(delete_environment),
        )
        // Snapshots
        .route("/api/export", get(export_snapshot))
        .route("/api/import", post(import_snapshot))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server on the specified port.
///
/// Returns a oneshot sender that stops the server and the address it is
/// bound to. Port 0 picks a free port.
pub async fn start_server(
    state: ApiServer,
    port: u16,
) -> anyhow::Result<(oneshot::Sender<()>, SocketAddr)> {
    let app = build_router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    info!("REST server listening on http://{}", bound_addr);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                info!("REST server shutting down");
            })
            .await
        {
            // The MCP server keeps running without the REST surface.
            tracing::error!("REST server error: {}", e);
        }
    });

    Ok((shutdown_tx, bound_addr))
}
