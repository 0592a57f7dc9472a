//! HTTP route definitions

use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::app::AppState;
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // CORS configuration - support multiple origins (comma-separated in CLIENT_ORIGIN)
    let allowed_origins: Vec<header::HeaderValue> = state
        .config
        .client_origin
        .split(',')
        .filter_map(|s| s.trim().parse::<header::HeaderValue>().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        // Entry point for the matchmaking collaborator
        .route("/internal/match-success", post(match_success_handler))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    active_rooms: usize,
    active_players: usize,
    active_drops: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        active_rooms: state.registry.active_rooms(),
        active_players: state.registry.total_players(),
        active_drops: state.drops.len(),
    })
}

// ============================================================================
// Match creation endpoint
// ============================================================================

#[derive(Deserialize)]
struct MatchSuccessRequest {
    game_id: Uuid,
    player_ids: Vec<Uuid>,
}

#[derive(Serialize)]
struct MatchSuccessResponse {
    status: &'static str,
    room_id: Uuid,
}

async fn match_success_handler(
    State(state): State<AppState>,
    Json(req): Json<MatchSuccessRequest>,
) -> Result<Json<MatchSuccessResponse>, AppError> {
    if req.player_ids.is_empty() {
        return Err(AppError::BadRequest("player_ids must not be empty".to_string()));
    }

    let created = state.sessions.on_match_success(req.game_id, &req.player_ids);

    Ok(Json(MatchSuccessResponse {
        status: if created { "created" } else { "exists" },
        room_id: req.game_id,
    }))
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
