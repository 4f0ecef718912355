use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use crate::state::AppState;

// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let reachable = state
        .coordinator
        .is_reachable(state.config.redis_connect_timeout)
        .await;
    let redis = if reachable {
        "connected"
    } else {
        "disconnected"
    };
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
        "redis": redis,
    }))
}
