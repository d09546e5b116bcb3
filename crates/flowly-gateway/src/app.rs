use axum::{routing::get, Router};
use flowly_core::config::{FlowlyConfig, TRAFFIC_PATH};
use flowly_hub::HubHandle;
use std::sync::Arc;
use tower_http::services::ServeDir;

/// Central shared state: passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub config: FlowlyConfig,
    pub hub: HubHandle,
}

impl AppState {
    pub fn new(config: FlowlyConfig, hub: HubHandle) -> Self {
        Self { config, hub }
    }
}

/// Assemble the full Axum router.
///
/// `GET /traffic` upgrades viewers, `POST /traffic` injects a frame, and
/// anything else is looked up in the static directory.
pub fn build_router(state: Arc<AppState>) -> Router {
    let static_files = ServeDir::new(&state.config.server.static_dir);

    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route(
            TRAFFIC_PATH,
            get(crate::ws::connection::ws_handler).post(crate::http::ingest::ingest_handler),
        )
        .fallback_service(static_files)
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
