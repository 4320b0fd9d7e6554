//! `GET /{id}.m3u8`: resolve an id and serve its rewritten playlist.

use axum::{
    Router,
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
};

use crate::api::error::{ApiError, ApiResult};
use crate::api::routes::log_gateway_error;
use crate::api::server::AppState;

const PLAYLIST_SUFFIX: &str = ".m3u8";
const DEFAULT_PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

pub fn router() -> Router<AppState> {
    // Path segments can't mix a capture with a literal suffix, so the
    // extension is checked in the handler.
    Router::new().route("/{file}", get(serve_manifest))
}

async fn serve_manifest(
    State(state): State<AppState>,
    Path(file): Path<String>,
) -> ApiResult<Response> {
    let Some(id) = file
        .strip_suffix(PLAYLIST_SUFFIX)
        .filter(|id| !id.is_empty())
    else {
        return Err(ApiError::not_found(format!("No route for /{file}")));
    };

    let manifest = state.gateway.resolve_and_serve(id).await.map_err(|e| {
        log_gateway_error(&e, "Stream resolution failed");
        ApiError::internal(format!("Failed to process stream request: {e}"))
    })?;

    let content_type = manifest
        .content_type
        .unwrap_or_else(|| DEFAULT_PLAYLIST_CONTENT_TYPE.to_string());

    Ok(([(header::CONTENT_TYPE, content_type)], manifest.body).into_response())
}
