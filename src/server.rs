use axum::routing::{get, post};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::SharedState;

pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health
        .route("/health", get(crate::routes::health::health))
        // Run lifecycle
        .route("/run/auth", post(crate::routes::run::run_auth))
        .route("/run/no-auth", post(crate::routes::run::run_no_auth))
        .route("/run/status", get(crate::routes::health::status))
        // Test table
        .route("/tests", get(crate::routes::tests::list_tests))
        .route("/tests/toggle", post(crate::routes::tests::toggle))
        // Verdicts
        .route("/verdicts", get(crate::routes::run::verdicts))
        .route("/verdicts/stream", get(crate::routes::run::verdict_stream))
        // Logs
        .route("/logs/history", get(crate::routes::logs::log_history))
        .route("/logs/stream", get(crate::routes::logs::log_stream))
        // Live status
        .route("/ws", get(crate::routes::ws::ws_handler))
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
