//! Route configuration.

use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/v1/health", get(handlers::health_check))
        // Upload sessions
        .route("/v1/uploads", post(handlers::create_upload))
        .route(
            "/v1/uploads/{upload_id}",
            get(handlers::get_upload)
                .put(handlers::upload_chunk)
                .delete(handlers::delete_upload),
        )
        .route(
            "/v1/uploads/{upload_id}/commit",
            post(handlers::commit_upload),
        )
        // Committed artifacts
        .route("/v1/artifacts/{digest}", get(handlers::get_artifact));

    let mut router = Router::new().merge(api_routes);

    // When enabled, this endpoint should be network-restricted to the
    // Prometheus scraper. See crate::metrics.
    if state.config.server.metrics_enabled {
        crate::metrics::register_metrics();
        router = router.route("/metrics", get(metrics_handler));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
