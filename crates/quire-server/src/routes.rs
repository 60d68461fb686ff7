use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chrono::Utc;
use quire_core::protocol::{
    DeltaSyncRequest, DeltaSyncResponse, QueueSyncRequest, QueueSyncResponse, DELTA_SYNC_PATH,
    QUEUE_SYNC_PATH,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::{check_protocol_version, extract_bearer_token};
use crate::config::AppConfig;
use crate::engine::{AuthenticatedClient, MergeEngine};
use crate::error::AppError;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub engine: MergeEngine,
}

impl AppState {
    pub const fn new(config: Arc<AppConfig>, engine: MergeEngine) -> Self {
        Self { config, engine }
    }
}

pub fn app_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route(DELTA_SYNC_PATH, post(delta_sync))
        .route(QUEUE_SYNC_PATH, post(queue_sync))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_client));

    Router::new()
        .route("/healthz", get(healthz))
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
    min_protocol_version: u32,
}

async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
        min_protocol_version: state.config.min_protocol_version,
    })
}

/// Stale clients are turned away before their credentials are looked at.
async fn require_client(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    check_protocol_version(request.headers(), state.config.min_protocol_version)?;
    let token = extract_bearer_token(request.headers())?;
    let client = state.engine.authenticate(token).await?;
    request.extensions_mut().insert(client);
    Ok(next.run(request).await)
}

async fn delta_sync(
    State(state): State<AppState>,
    Extension(client): Extension<AuthenticatedClient>,
    payload: Result<Json<DeltaSyncRequest>, JsonRejection>,
) -> Result<Json<DeltaSyncResponse>, AppError> {
    let Json(request) = payload.map_err(|rejection| AppError::bad_request(rejection.body_text()))?;
    let response = state.engine.delta_sync(&client, &request).await?;
    tracing::info!(
        endpoint = "delta_sync",
        username = %client.username,
        submitted = request.notes.len(),
        full_sync_required = matches!(response, DeltaSyncResponse::RequireFullSync),
        "Handled delta sync"
    );
    Ok(Json(response))
}

async fn queue_sync(
    State(state): State<AppState>,
    Extension(client): Extension<AuthenticatedClient>,
    payload: Result<Json<QueueSyncRequest>, JsonRejection>,
) -> Result<Json<QueueSyncResponse>, AppError> {
    let Json(request) = payload.map_err(|rejection| AppError::bad_request(rejection.body_text()))?;
    let response = state.engine.queue_sync(&client, &request).await?;
    tracing::info!(
        endpoint = "queue_sync",
        username = %client.username,
        heads = request.note_heads.len(),
        "Handled queue sync"
    );
    Ok(Json(response))
}
