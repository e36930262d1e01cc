pub mod audit;
pub mod health;
pub mod logs;

use axum::{Router, middleware, routing::get};

use crate::infrastructure::AppState;

/// Routes mounted under `/api`. Everything except health is audited.
pub fn api_router(state: AppState) -> Router {
    let audited = Router::new()
        .route("/logs", get(logs::list_logs))
        .route("/logs/:id", get(logs::get_log))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            audit::record_admin_call,
        ));

    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .merge(audited)
        .with_state(state)
}
