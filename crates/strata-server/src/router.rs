use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handler::{self, AppState};

/// Build the axum router with every Strata endpoint. Storage and maintenance
/// routes are mounted under `base_path` (e.g. `/api`, or `""` for the root).
pub fn build_router(state: AppState, base_path: &str, max_body_bytes: usize) -> Router {
    let api = Router::new()
        .route("/file", post(handler::create_file))
        .route(
            "/file/:id",
            get(handler::read_file)
                .put(handler::update_file)
                .delete(handler::delete_file),
        )
        .route("/maintenance-job/start", post(handler::start_job))
        .route("/maintenance-job/stop", post(handler::stop_job))
        .route("/maintenance-job/status", get(handler::job_status));

    let app = Router::new()
        .route("/v1/health", get(handler::health_handler))
        .route("/v1/info", get(handler::info_handler));
    let app = if base_path.is_empty() {
        app.merge(api)
    } else {
        app.nest(base_path, api)
    };

    app.layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
