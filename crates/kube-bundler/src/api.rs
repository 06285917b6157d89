//! HTTP API endpoints

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use kube_bundler_core::params::ParameterSetBuilder;
use kube_bundler_core::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use crate::AppState;

// ============================================================================
// Requests
// ============================================================================

/// Runtime parameters shared by every request body
///
/// Proxy and common data fields fall back to the service configuration.
#[derive(Default, Deserialize)]
#[serde(default)]
pub struct DeploymentParams {
    pub blueprint_image: Option<String>,
    pub blueprint_port: Option<String>,
    pub probe_image: Option<String>,
    pub probe_port: Option<String>,
    pub increment_port: Option<String>,
    pub single_model_port: Option<String>,
    pub single_target_port: Option<String>,
    pub proxy_host: Option<String>,
    pub proxy_port: Option<String>,
    pub common_data_user: Option<String>,
    pub common_data_url: Option<String>,
    pub common_data_password: Option<String>,
    pub solution_id: Option<String>,
    pub solution_revision_id: Option<String>,
    pub solution_revisions: SolutionRevisionMap,
}

impl DeploymentParams {
    fn into_builder(self, state: &AppState) -> ParameterSetBuilder {
        let config = &state.config;
        let fallback = |value: Option<String>, default: &Option<String>| {
            value.or_else(|| default.clone()).unwrap_or_default()
        };

        ParameterSet::builder()
            .blueprint_image(self.blueprint_image.unwrap_or_default())
            .blueprint_port(self.blueprint_port.unwrap_or_default())
            .probe_image(self.probe_image.unwrap_or_default())
            .probe_port(self.probe_port.unwrap_or_default())
            .increment_port(self.increment_port.unwrap_or_default())
            .single_model_port(self.single_model_port.unwrap_or_default())
            .single_target_port(self.single_target_port.unwrap_or_default())
            .proxy_host(fallback(self.proxy_host, &config.proxy_host))
            .proxy_port(fallback(self.proxy_port, &config.proxy_port))
            .common_data_user(fallback(self.common_data_user, &config.common_data_user))
            .common_data_url(fallback(self.common_data_url, &config.common_data_url))
            .common_data_password(fallback(self.common_data_password, &config.common_data_password))
            .solution_id(self.solution_id.unwrap_or_default())
            .solution_revision_id(self.solution_revision_id.unwrap_or_default())
            .solution_revisions(self.solution_revisions)
    }
}

#[derive(Deserialize)]
pub struct SingleRequest {
    pub image: String,
    pub port: String,
    #[serde(flatten)]
    pub params: DeploymentParams,
}

#[derive(Deserialize)]
pub struct CompositeManifestRequest {
    pub blueprint: serde_json::Value,
    #[serde(flatten)]
    pub params: DeploymentParams,
}

#[derive(Deserialize)]
pub struct CompositeBundleRequest {
    /// Folder under the solutions directory holding the passthrough files
    pub solution_folder: String,
    #[serde(default = "default_blueprint_json")]
    pub blueprint_json_name: String,
    #[serde(default = "default_docker_info_json")]
    pub docker_info_json_name: String,
    #[serde(default = "default_solution_yml")]
    pub solution_yml_name: String,
    #[serde(default = "default_data_broker_json")]
    pub data_broker_json_name: String,
    #[serde(flatten)]
    pub params: DeploymentParams,
}

fn default_blueprint_json() -> String {
    "blueprint.json".to_string()
}

fn default_docker_info_json() -> String {
    "dockerinfo.json".to_string()
}

fn default_solution_yml() -> String {
    "solution.yml".to_string()
}

fn default_data_broker_json() -> String {
    "dataBroker.json".to_string()
}

/// API response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self { success: true, data: Some(data), error: None }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self { success: false, data: None, error: Some(error.into()) }
    }
}

// ============================================================================
// Responses
// ============================================================================

fn error_response(err: BundleError) -> Response {
    tracing::error!("Request failed: {}", err);
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(ApiResponse::<()>::err(err.to_string()))).into_response()
}

fn text_response(content_type: &'static str, body: String) -> Response {
    ([(header::CONTENT_TYPE, content_type)], body).into_response()
}

/// Download name for a bundle: the solution id restricted to `[A-Za-z0-9._-]`,
/// or the request id when nothing usable remains
fn bundle_file_stem(solution_id: Option<&str>, request_id: Uuid) -> String {
    let stem: String = solution_id
        .unwrap_or_default()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '-' })
        .collect();
    if stem.trim_matches(|c| c == '-' || c == '.').is_empty() {
        request_id.to_string()
    } else {
        stem
    }
}

fn zip_response(file_stem: &str, bytes: Vec<u8>) -> Response {
    let disposition = format!("attachment; filename=\"{}.zip\"", file_stem);
    (
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Bytes::from(bytes),
    )
        .into_response()
}

/// Run blocking bundle work off the async executor
async fn run_blocking<T, F>(work: F) -> Result<T, BundleError>
where
    F: FnOnce() -> Result<T, BundleError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| BundleError::BundleWrite(format!("bundle task failed: {}", e)))?
}

/// Resolve a request's solution folder beneath the solutions directory
fn solution_folder(root: &Path, folder: &str) -> Result<PathBuf, BundleError> {
    let relative = Path::new(folder);
    let valid = !folder.is_empty()
        && relative.components().all(|c| matches!(c, Component::Normal(_)));
    if !valid {
        return Err(BundleError::InvalidParameter(format!(
            "solution folder {:?} must be a relative path inside the solutions directory",
            folder
        )));
    }
    Ok(root.join(relative))
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check() -> Json<ApiResponse<&'static str>> {
    Json(ApiResponse::ok("healthy"))
}

/// Compose the manifest for one model image
pub async fn single_manifest(State(state): State<Arc<AppState>>, Json(req): Json<SingleRequest>) -> Response {
    let params = req.params.into_builder(&state).build();
    match state.assembler.composer().compose_single(&req.image, &req.port, &params) {
        Ok(text) => text_response("text/yaml", text),
        Err(e) => error_response(e),
    }
}

/// Compose the manifest for an inline blueprint
pub async fn composite_manifest(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CompositeManifestRequest>,
) -> Response {
    let params = req.params.into_builder(&state).build();
    let blueprint = req.blueprint.to_string();
    match state.assembler.composer().compose_composite(&params, &blueprint) {
        Ok(text) => text_response("text/yaml", text),
        Err(e) => error_response(e),
    }
}

/// Build the environment descriptor
pub async fn environment(State(state): State<Arc<AppState>>, Json(req): Json<DeploymentParams>) -> Response {
    let params = req.into_builder(&state).build();
    match state.assembler.aggregator().build_environment(&params) {
        Ok(text) => text_response("text/plain", text),
        Err(e) => error_response(e),
    }
}

/// Build the composite bundle for a solution folder
pub async fn composite_bundle(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CompositeBundleRequest>,
) -> Response {
    let request_id = Uuid::new_v4();
    let folder = match solution_folder(&state.config.solutions_dir, &req.solution_folder) {
        Ok(folder) => folder,
        Err(e) => return error_response(e),
    };
    tracing::info!(request_id = %request_id, "Building composite bundle from {:?}", folder);

    let params = req
        .params
        .into_builder(&state)
        .folder_path(folder)
        .blueprint_json_name(req.blueprint_json_name)
        .docker_info_json_name(req.docker_info_json_name)
        .solution_yml_name(req.solution_yml_name)
        .data_broker_json_name(req.data_broker_json_name)
        .build();
    let file_stem = bundle_file_stem(params.solution_id(), request_id);

    let worker = state.clone();
    match run_blocking(move || worker.assembler.create_composite_bundle(&params)).await {
        Ok(bytes) => zip_response(&file_stem, bytes),
        Err(e) => error_response(e),
    }
}

/// Build the bundle for one model image
pub async fn single_bundle(State(state): State<Arc<AppState>>, Json(req): Json<SingleRequest>) -> Response {
    let request_id = Uuid::new_v4();
    tracing::info!(request_id = %request_id, "Building single bundle for {}", req.image);

    let params = req.params.into_builder(&state).build();
    let file_stem = bundle_file_stem(params.solution_id(), request_id);
    let (image, port) = (req.image, req.port);

    let worker = state.clone();
    match run_blocking(move || worker.assembler.create_single_bundle(&image, &port, &params)).await {
        Ok(bytes) => zip_response(&file_stem, bytes),
        Err(e) => error_response(e),
    }
}

/// Build the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/health", get(health_check))
        .route("/manifests/single", post(single_manifest))
        .route("/manifests/composite", post(composite_manifest))
        .route("/environment", post(environment))
        .route("/bundles/single", post(single_bundle))
        .route("/bundles/composite", post(composite_bundle));

    Router::new().nest("/api", api).with_state(state)
}
