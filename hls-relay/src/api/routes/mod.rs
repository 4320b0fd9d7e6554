//! API route modules.

pub mod health;
pub mod manifest;
pub mod stream_proxy;

use axum::Router;
use tracing::error;

use crate::api::server::AppState;
use crate::gateway::GatewayError;

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(stream_proxy::router())
        .merge(manifest::router())
        .with_state(state)
}

/// Log a gateway failure with whatever stage and field context it carries.
pub(crate) fn log_gateway_error(err: &GatewayError, message: &str) {
    match err {
        GatewayError::Resolve(e) => error!(
            stage = e.stage().map(|s| s.as_str()),
            field = e.field(),
            error = %e,
            "{message}"
        ),
        other => error!(error = %other, "{message}"),
    }
}
