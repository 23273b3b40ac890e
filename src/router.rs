use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::AppState;

/// Build the application router with all routes
pub fn build(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::healthcheck))
        // Synchronizer routes
        .route("/api/ports/sync", post(handlers::sync::sync_port))
        .route("/api/panel-ports/disconnect", post(handlers::sync::disconnect_panel_port))
        // Audit log
        .route(
            "/api/connection-history",
            get(handlers::connection_history::list_connection_history),
        )
        // Stored state
        .route("/api/switches/:id/ports", get(handlers::ports::list_switch_ports))
        .route("/api/panels/:panel_type/:id/ports", get(handlers::ports::list_panel_ports))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}
