use axum::{
    Router,
    routing::{get, post},
};

use super::AppState;
use super::handlers;

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route(
            "/bundles",
            post(handlers::handle_create_bundle).get(handlers::handle_list_bundles),
        )
        .route("/mcp-bundler", post(handlers::handle_create_bundle))
        .route("/bundles/{id}", get(handlers::handle_get_bundle))
        .route("/bundles/{id}/routes", get(handlers::handle_list_routes))
        .route("/routes/{id}", get(handlers::handle_get_route))
        .route("/execute", post(handlers::handle_execute))
        .route("/executor", post(handlers::handle_execute))
        .route("/tool-sources", post(handlers::handle_register_tool_source))
}
