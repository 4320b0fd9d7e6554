//! The two relay operations, independent of the HTTP front end.
//!
//! `resolve_and_serve` turns an id into a rewritten top-level playlist.
//! `proxy_segment` serves whatever a rewritten playlist points at: segments
//! through the cache, nested playlists rewritten again, anything else piped
//! straight through.

use bytes::Bytes;
use reqwest::{Response, StatusCode};
use std::sync::Arc;
use stream_resolver::{ResolveError, Stage, StreamResolver, Upstream};
use thiserror::Error;
use tracing::debug;

use crate::cache::SegmentCache;
use crate::playlist::{ManifestRewriter, RewriteError};

/// Query parameters copied from the client request onto the upstream URL.
/// They are upstream signing tokens and are forwarded without re-encoding.
pub const FORWARDED_PARAMS: [&str; 2] = ["md6", "expires"];

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Stream URL is required")]
    BadRequest,
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Rewrite(#[from] RewriteError),
}

/// How a proxied URL is handled, decided by its path extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Segment,
    Playlist,
    Other,
}

impl MediaKind {
    pub fn classify(url: &str) -> Self {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        if path.ends_with(".ts") {
            Self::Segment
        } else if path.ends_with(".m3u8") {
            Self::Playlist
        } else {
            Self::Other
        }
    }
}

#[derive(Debug, Clone)]
pub struct ManifestResponse {
    pub body: String,
    pub content_type: Option<String>,
    /// Upstream URL the playlist was fetched from.
    pub source_url: String,
}

#[derive(Debug)]
pub enum ProxyResponse {
    /// Fully buffered body: a segment (cached or fresh) or a rewritten playlist.
    Buffered {
        body: Bytes,
        content_type: Option<String>,
        cache_hit: bool,
    },
    /// Upstream response whose body has not been read yet.
    Streamed {
        status: StatusCode,
        content_type: Option<String>,
        response: Response,
    },
}

impl ProxyResponse {
    pub fn content_type(&self) -> Option<&str> {
        match self {
            Self::Buffered { content_type, .. } | Self::Streamed { content_type, .. } => {
                content_type.as_deref()
            }
        }
    }
}

/// Rebuild the upstream URL from the proxied path and the client's raw query.
pub fn upstream_url(absolute_url: &str, raw_query: Option<&str>) -> String {
    let forwarded: Vec<&str> = match raw_query {
        Some(query) => FORWARDED_PARAMS
            .iter()
            .filter_map(|name| {
                query
                    .split('&')
                    .find(|pair| pair.split('=').next() == Some(*name))
            })
            .collect(),
        None => Vec::new(),
    };

    if forwarded.is_empty() {
        return absolute_url.to_string();
    }

    let separator = if absolute_url.contains('?') { '&' } else { '?' };
    format!("{absolute_url}{separator}{}", forwarded.join("&"))
}

fn content_type_of(response: &Response) -> Option<String> {
    response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(ToOwned::to_owned)
}

pub struct ProxyGateway {
    resolver: Arc<dyn StreamResolver>,
    media: Upstream,
    cache: SegmentCache,
    rewriter: ManifestRewriter,
}

impl ProxyGateway {
    pub fn new(resolver: Arc<dyn StreamResolver>, media: Upstream, cache: SegmentCache) -> Self {
        Self {
            resolver,
            media,
            cache,
            rewriter: ManifestRewriter,
        }
    }

    pub fn cache(&self) -> &SegmentCache {
        &self.cache
    }

    /// Resolve `id`, fetch its playlist and rewrite it to point at the proxy.
    pub async fn resolve_and_serve(&self, id: &str) -> Result<ManifestResponse, GatewayError> {
        let manifest_url = self.resolver.resolve(id).await?;
        let (body, content_type) = self.fetch_rewritten(&manifest_url).await?;

        Ok(ManifestResponse {
            body,
            content_type,
            source_url: manifest_url,
        })
    }

    /// Serve one proxied URL taken from a rewritten playlist.
    pub async fn proxy_segment(
        &self,
        absolute_url: &str,
        raw_query: Option<&str>,
    ) -> Result<ProxyResponse, GatewayError> {
        if absolute_url.is_empty() {
            return Err(GatewayError::BadRequest);
        }
        let url = upstream_url(absolute_url, raw_query);

        match MediaKind::classify(absolute_url) {
            MediaKind::Segment => {
                if let Some(entry) = self.cache.get(&url) {
                    debug!(url = %url, "Serving cached TS segment");
                    return Ok(ProxyResponse::Buffered {
                        body: entry.payload,
                        content_type: entry.content_type,
                        cache_hit: true,
                    });
                }

                debug!(url = %url, "Fetching segment from source");
                let response = self.media.fetch(Stage::Segment, url.as_str()).await?;
                let content_type = content_type_of(&response);
                let body = response
                    .bytes()
                    .await
                    .map_err(|e| ResolveError::fetch(Stage::Segment, e))?;

                self.cache.put(url, body.clone(), content_type.clone());
                Ok(ProxyResponse::Buffered {
                    body,
                    content_type,
                    cache_hit: false,
                })
            }
            MediaKind::Playlist => {
                let (body, content_type) = self.fetch_rewritten(&url).await?;
                Ok(ProxyResponse::Buffered {
                    body: Bytes::from(body),
                    content_type,
                    cache_hit: false,
                })
            }
            MediaKind::Other => {
                debug!(url = %url, "Piping upstream body");
                let response = self.media.fetch(Stage::Segment, url.as_str()).await?;
                Ok(ProxyResponse::Streamed {
                    status: response.status(),
                    content_type: content_type_of(&response),
                    response,
                })
            }
        }
    }

    async fn fetch_rewritten(&self, url: &str) -> Result<(String, Option<String>), GatewayError> {
        let response = self.media.fetch(Stage::Manifest, url).await?;
        let content_type = content_type_of(&response);
        let text = response
            .text()
            .await
            .map_err(|e| ResolveError::fetch(Stage::Manifest, e))?;

        let body = self.rewriter.rewrite(&text, url)?;
        Ok((body, content_type))
    }
}
