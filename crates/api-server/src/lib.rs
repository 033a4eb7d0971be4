//! HTTP surface for the dashboard: health check, the latest published
//! snapshot and the static frontend.

mod request_id;
mod security_headers;
mod snapshot_routes;

use std::path::{Path, PathBuf};

use axum::{
    extract::Request,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    Json, Router,
};
use serde_json::json;
use thiserror::Error;
use tower_http::{services::ServeDir, trace::TraceLayer};

use request_id::request_id_middleware;
use security_headers::security_headers_middleware;

#[derive(Clone)]
pub struct AppState {
    pub data_dir: PathBuf,
}

impl AppState {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub data_dir: PathBuf,
    pub frontend_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8000".to_string(),
            data_dir: PathBuf::from("data"),
            frontend_dir: PathBuf::from("frontend"),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: std::env::var("API_BIND_ADDR").unwrap_or(defaults.bind_addr),
            data_dir: std::env::var("SNAPSHOT_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            frontend_dir: std::env::var("FRONTEND_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.frontend_dir),
        }
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("No data file found.")]
    NoSnapshot,

    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid snapshot {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::NoSnapshot => StatusCode::NOT_FOUND,
            ApiError::Read { .. } | ApiError::Parse { .. } => {
                tracing::error!("Failed to serve snapshot: {}", self);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub fn router(state: AppState, frontend_dir: &Path) -> Router {
    let frontend = ServeDir::new(frontend_dir).append_index_html_on_directories(true);

    Router::new()
        .merge(snapshot_routes::snapshot_routes())
        .with_state(state)
        .fallback_service(frontend)
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
            tracing::info_span!(
                "http",
                method = %request.method(),
                uri = %request.uri(),
                request_id = tracing::field::Empty,
            )
        }))
}

pub async fn run_server() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "api_server=info,tower_http=info".into()),
        )
        .init();

    let config = ServerConfig::from_env();
    let app = router(AppState::new(&config.data_dir), &config.frontend_dir);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(
        "API server listening on {} (data: {}, frontend: {})",
        config.bind_addr,
        config.data_dir.display(),
        config.frontend_dir.display()
    );
    axum::serve(listener, app).await?;
    Ok(())
}
