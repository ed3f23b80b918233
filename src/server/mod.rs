//! Async HTTP Server Module
//!
//! Exposes a [`KnowledgeBaseService`] over HTTP using axum.
//!
//! # Routes
//!
//! - `GET    /get_systems_list` - names of the stored systems
//! - `GET    /get_fml_file/:name` - one system as an FML document
//! - `PUT    /put_fml_file` - upload a document, inline or from a server-side path
//! - `DELETE /delete_one_system/:name` - remove one system
//! - `DELETE /delete_systems_list` - remove every system
//! - `GET    /health` - health check
//!
//! # Example
//!
//! ```rust,ignore
//! use fmlkb::server::{ServerConfig, run_server};
//! use fmlkb::{CodecOptions, KnowledgeBaseService, MemoryStore};
//!
//! #[tokio::main]
//! async fn main() {
//!     let service = KnowledgeBaseService::new(Box::new(MemoryStore::new()), CodecOptions::default());
//!     run_server(service, ServerConfig::new(5000)).await.unwrap();
//! }
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config;
use crate::error::{ErrorCode, ErrorResponse, FmlError, FmlResult};
use crate::fml_bail;
use crate::service::KnowledgeBaseService;

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the async HTTP server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,
    /// Host to bind to (default: 127.0.0.1)
    pub host: String,
    /// Enable CORS for all origins
    pub cors_permissive: bool,
    /// Enable request tracing
    pub enable_tracing: bool,
    /// Maximum request body size in bytes
    pub max_body_size: usize,
}

impl ServerConfig {
    /// Create a new server configuration with the specified port
    pub fn new(port: u16) -> Self {
        Self {
            port,
            host: "127.0.0.1".to_string(),
            cors_permissive: true,
            enable_tracing: true,
            max_body_size: 10 * 1024 * 1024, // 10 MB
        }
    }

    /// Set the host to bind to
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set CORS permissiveness
    pub fn with_cors(mut self, permissive: bool) -> Self {
        self.cors_permissive = permissive;
        self
    }

    /// Get the socket address
    pub fn socket_addr(&self) -> FmlResult<SocketAddr> {
        format!("{}:{}", self.host, self.port).parse().map_err(|_| {
            FmlError::config(format!("invalid listen address {}:{}", self.host, self.port))
                .with_context("host", &self.host)
        })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from(&config::ServerConfig::default())
    }
}

impl From<&config::ServerConfig> for ServerConfig {
    fn from(config: &config::ServerConfig) -> Self {
        Self {
            port: config.port,
            host: config.host.clone(),
            cors_permissive: config.cors_enabled,
            enable_tracing: true,
            max_body_size: config.max_body_size,
        }
    }
}

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for the server
pub struct AppState {
    /// Uploads and deletes take the write lock
    pub service: RwLock<KnowledgeBaseService>,
    /// Server configuration
    pub config: ServerConfig,
}

impl AppState {
    /// Create new application state
    pub fn new(service: KnowledgeBaseService, config: ServerConfig) -> Self {
        Self {
            service: RwLock::new(service),
            config,
        }
    }
}

/// Type alias for shared state
pub type SharedState = Arc<AppState>;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Body of `PUT /put_fml_file`
#[derive(Debug, Deserialize)]
pub struct PutRequest {
    /// Path of a document on the server's filesystem
    #[serde(default)]
    pub file_path: Option<PathBuf>,
    /// Inline document
    #[serde(default)]
    pub fml: Option<String>,
}

impl IntoResponse for FmlError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if !self.is_client_error() {
            warn!(code = %self.code, "{}", self.message);
        }
        (status, Json(ErrorResponse::from(&self))).into_response()
    }
}

// ============================================================================
// Route Handlers
// ============================================================================

/// Handle GET /get_systems_list
async fn list_systems(State(state): State<SharedState>) -> Result<Response, FmlError> {
    let names = state.service.read().await.list_systems()?;
    if names.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }
    let count = names.len();
    Ok(Json(json!({ "systems": names, "count": count })).into_response())
}

/// Handle GET /get_fml_file/:name
async fn get_fml_file(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Result<Response, FmlError> {
    let fml = state
        .service
        .read()
        .await
        .fetch_fml(&name)?
        .ok_or_else(|| FmlError::system_not_found(&name))?;
    Ok(Json(json!({ "system": fml })).into_response())
}

/// Handle PUT /put_fml_file
async fn put_fml_file(
    State(state): State<SharedState>,
    Json(request): Json<PutRequest>,
) -> Result<Response, FmlError> {
    let mut service = state.service.write().await;
    let upload = match (request.fml, request.file_path) {
        (Some(fml), _) => service.put_fml(&fml)?,
        (None, Some(path)) => service.put_fml_file(&path)?,
        (None, None) => {
            fml_bail!(ErrorCode::ParseError, "request names neither 'fml' nor 'file_path'")
        }
    };
    Ok((StatusCode::CREATED, Json(upload)).into_response())
}

/// Handle DELETE /delete_one_system/:name
async fn delete_one_system(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Result<Response, FmlError> {
    if !state.service.write().await.delete_system(&name)? {
        return Err(FmlError::system_not_found(&name));
    }
    Ok(Json(json!({ "deleted": name })).into_response())
}

/// Handle DELETE /delete_systems_list
async fn delete_systems_list(State(state): State<SharedState>) -> Result<Response, FmlError> {
    let deleted = state.service.write().await.delete_all()?;
    Ok(Json(json!({ "deleted": deleted })).into_response())
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ============================================================================
// Server Setup
// ============================================================================

/// Create the router with all routes
pub fn create_router(state: SharedState) -> Router {
    let max_body_size = state.config.max_body_size;
    let cors_permissive = state.config.cors_permissive;
    let enable_tracing = state.config.enable_tracing;

    let mut router = Router::new()
        .route("/get_systems_list", get(list_systems))
        .route("/get_fml_file/:name", get(get_fml_file))
        .route("/put_fml_file", put(put_fml_file))
        .route("/delete_one_system/:name", delete(delete_one_system))
        .route("/delete_systems_list", delete(delete_systems_list))
        .route("/health", get(health_check))
        .layer(DefaultBodyLimit::max(max_body_size));

    if cors_permissive {
        let cors = CorsLayer::new()
            .allow_methods([Method::GET, Method::PUT, Method::DELETE, Method::OPTIONS])
            .allow_origin(Any)
            .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::AUTHORIZATION]);
        router = router.layer(cors);
    }
    if enable_tracing {
        router = router.layer(TraceLayer::new_for_http());
    }

    router.with_state(state)
}

/// Run the async HTTP server
///
/// Blocks until the server is shut down with Ctrl+C.
pub async fn run_server(service: KnowledgeBaseService, config: ServerConfig) -> FmlResult<()> {
    let addr = config.socket_addr()?;
    let state = Arc::new(AppState::new(service, config));
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "knowledge base listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server shut down");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C)
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "could not listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}

// ============================================================================
// Tests
// ============================================================================
