//! HTTP route handlers.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use axum::middleware;
use axum::{
    extract::{Extension, Path, State},
    http::{HeaderValue, Method, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::{AuthorizationFlow, CredentialStore, FileCredentialStore, TokenRefresher};
use crate::config::Config;
use crate::export::SpreadsheetExporter;
use crate::google::{GoogleDriveProvider, GoogleOAuth};
use crate::jobs::{AnalysisRunner, JobStore, TaskNumberAllocator};
use crate::storage::{StorageError, StorageProvider};
use crate::youtube::YouTubeClient;

use super::auth::{self, PendingOAuth, SessionUser};
use super::types::*;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    /// Every job since startup
    pub jobs: Arc<JobStore>,
    pub allocator: TaskNumberAllocator,
    pub runner: Arc<AnalysisRunner>,
    pub oauth: Arc<dyn AuthorizationFlow>,
    pub credentials: Arc<dyn CredentialStore>,
    /// Started authorizations keyed by OAuth state
    pub pending_oauth: RwLock<HashMap<String, PendingOAuth>>,
}

/// Build the router around `state`.
pub fn router(state: Arc<AppState>) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/status/:job_id", get(get_status))
        .route("/auth/login", get(auth::login))
        .route("/auth/callback", get(auth::callback))
        .route("/auth/status", get(auth::status));

    let protected_routes = Router::new()
        .route("/analyze", post(analyze))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth::require_session,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(cors_layer(&state.config.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

/// Start the HTTP server.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let http = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(60))
        .build()?;

    let oauth = Arc::new(GoogleOAuth::new(
        http.clone(),
        config.oauth_client.clone(),
        config.oauth_redirect_uri(),
    ));
    let credentials: Arc<dyn CredentialStore> = Arc::new(FileCredentialStore::new(
        config.tokens_dir.clone(),
        Arc::clone(&oauth) as Arc<dyn TokenRefresher>,
    ));
    let storage: Arc<dyn StorageProvider> = Arc::new(GoogleDriveProvider::new(
        http.clone(),
        Arc::clone(&credentials),
    ));

    let youtube = Arc::new(YouTubeClient::new(http, config.youtube_api_key.clone()));
    let exporter = Arc::new(SpreadsheetExporter::new(
        Arc::clone(&storage),
        config.drive_parent_folder_id.clone(),
    ));

    let jobs = Arc::new(JobStore::new());
    let runner = Arc::new(AnalysisRunner::new(
        Arc::clone(&jobs),
        youtube.clone(),
        youtube,
        exporter,
    ));

    let state = Arc::new(AppState {
        allocator: TaskNumberAllocator::new(storage, config.drive_parent_folder_id.clone()),
        config: config.clone(),
        jobs,
        runner,
        oauth,
        credentials,
        pending_oauth: RwLock::new(HashMap::new()),
    });

    let app = router(Arc::clone(&state));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);

    let shutdown_state = Arc::clone(&state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal(shutdown_state).await;
        })
        .await?;

    Ok(())
}

/// Wait for SIGINT/SIGTERM. Running jobs are not waited for; they are lost with the process.
async fn shutdown_signal(state: Arc<AppState>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    let active = state.jobs.active_count().await;
    if active == 0 {
        tracing::info!("Shutdown signal received, no jobs in progress");
    } else {
        tracing::warn!("Shutdown signal received, abandoning {} jobs in progress", active);
    }
}

/// Health check endpoint.
async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        jobs: state.jobs.len().await,
    })
}

/// Submit channel URLs for analysis.
///
/// Returns as soon as the job is registered; the work runs in the background.
async fn analyze(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<SessionUser>,
    Json(req): Json<AnalyzeRequest>,
) -> Result<Json<JobResponse>, (StatusCode, String)> {
    let urls: Vec<String> = req
        .urls
        .iter()
        .map(|u| u.trim())
        .filter(|u| !u.is_empty())
        .map(str::to_string)
        .collect();
    if urls.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "No URLs provided".to_string()));
    }

    let allocation = state
        .allocator
        .allocate(&user.email)
        .await
        .map_err(|e| {
            tracing::warn!(user = %user.email, "Task number allocation failed: {}", e);
            let status = match &e {
                StorageError::NotAuthenticated(_) | StorageError::Auth(_) => {
                    StatusCode::UNAUTHORIZED
                }
                _ => StatusCode::BAD_GATEWAY,
            };
            (status, e.to_string())
        })?;

    let task_number = allocation.task_number;
    let job_id = state.jobs.create_job(task_number).await;
    tracing::info!(
        job_id = %job_id,
        user = %user.email,
        task_number,
        folder = %allocation.folder_name,
        "Job queued"
    );

    // Fire and forget: the job store carries the outcome.
    let _ = state
        .runner
        .spawn(job_id.clone(), urls, user.email, task_number);

    Ok(Json(JobResponse {
        job_id,
        task_number,
    }))
}

/// Poll a job. Unknown ids get a `failed` response rather than an HTTP error.
async fn get_status(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Json<StatusResponse> {
    match state.jobs.get_job(&job_id).await {
        Some(job) => Json(job.into()),
        None => Json(StatusResponse::not_found()),
    }
}
