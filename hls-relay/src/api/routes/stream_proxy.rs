//! `GET /proxy-stream/{absolute url}`: serve URLs taken from rewritten playlists.
//!
//! The upstream URL is read from the raw request path so percent-escapes and
//! signing tokens reach the origin exactly as they appeared in the playlist.

use axum::{
    Router,
    body::Body,
    extract::{OriginalUri, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use futures::TryStreamExt;

use crate::api::error::{ApiError, ApiResult};
use crate::api::routes::log_gateway_error;
use crate::api::server::AppState;
use crate::gateway::{GatewayError, ProxyResponse};
use crate::playlist::PROXY_PREFIX;

pub fn router() -> Router<AppState> {
    // `{*url}` never matches an empty remainder.
    Router::new()
        .route("/proxy-stream", get(proxy_stream))
        .route("/proxy-stream/", get(proxy_stream))
        .route("/proxy-stream/{*url}", get(proxy_stream))
}

async fn proxy_stream(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
) -> ApiResult<Response> {
    let absolute_url = uri.path().strip_prefix(PROXY_PREFIX).unwrap_or_default();

    let proxied = state
        .gateway
        .proxy_segment(absolute_url, uri.query())
        .await
        .map_err(|e| match e {
            GatewayError::BadRequest => ApiError::bad_request(e.to_string()),
            _ => {
                log_gateway_error(&e, "Stream proxy failed");
                ApiError::internal(format!("Failed to proxy stream: {e}"))
            }
        })?;

    let content_type = proxied
        .content_type()
        .and_then(|v| HeaderValue::from_str(v).ok());

    let mut response = match proxied {
        ProxyResponse::Buffered { body, .. } => (StatusCode::OK, Body::from(body)).into_response(),
        ProxyResponse::Streamed {
            status, response, ..
        } => {
            // A failed upstream read surfaces as a body error and aborts the reply.
            let stream = response.bytes_stream().map_err(std::io::Error::other);
            (status, Body::from_stream(stream)).into_response()
        }
    };

    if let Some(value) = content_type {
        response.headers_mut().insert(header::CONTENT_TYPE, value);
    }
    Ok(response)
}
