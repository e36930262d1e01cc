use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};

use crate::infrastructure::AppState;

#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is healthy")
    )
)]
pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "pickup-audit",
        "version": env!("CARGO_PKG_VERSION"),
        "relay": if state.relay_enabled { "enabled" } else { "disabled" },
        "shutting_down": state.shutdown.is_cancelled()
    }))
}
