//! Router construction.
//!
//! Builds the axum router with all routes and middleware.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::live_reload;
use crate::middleware::headers;
use crate::state::AppState;
use crate::static_files;

/// Create the application router.
///
/// # Arguments
///
/// * `state` - Shared application state
pub(crate) fn create_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new();

    // Live reload client and WebSocket
    if state.live_reload_enabled() {
        router = router
            .route(live_reload::SCRIPT_PATH, get(live_reload::client_script))
            .route(live_reload::SOCKET_PATH, get(live_reload::ws_handler));
    }

    // Static files under the root
    router = router.merge(static_files::static_router(
        &state.root,
        state.live_reload_enabled(),
    ));

    router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(headers::no_store_layer())
                .layer(headers::content_type_options_layer()),
        )
        .with_state(state)
}
