use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, IntoUrl, Method, RequestBuilder, Response};
use std::str::FromStr;
use tracing::debug;

use super::default::DEFAULT_UA;
use super::error::{ResolveError, Stage};

/// HTTP helper that sends every request with one fixed header profile.
///
/// The upstream hosts reject requests that do not look like they come from a
/// browser embedding their player, so each fetch carries the same
/// impersonating headers and a `Referer` for the originating site.
#[derive(Debug, Clone)]
pub struct Upstream {
    client: Client,
    headers: HeaderMap,
}

impl Upstream {
    pub fn new(client: Client) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            HeaderValue::from_static(DEFAULT_UA),
        );
        Self { client, headers }
    }

    /// Full navigation profile used for the embed, script and player hops.
    pub fn page_profile(client: Client, referer: &str) -> Self {
        let mut upstream = Self::new(client);
        upstream.add_header_typed(
            reqwest::header::ACCEPT,
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        );
        upstream.add_header_typed(reqwest::header::ACCEPT_LANGUAGE, "en-US,en;q=0.5");
        upstream.add_header_typed(reqwest::header::REFERER, referer);
        upstream.add_header_typed(reqwest::header::UPGRADE_INSECURE_REQUESTS, "1");
        upstream.add_header_str("Sec-Fetch-Dest", "iframe");
        upstream.add_header_str("Sec-Fetch-Mode", "navigate");
        upstream.add_header_str("Sec-Fetch-Site", "cross-site");
        upstream.add_header_str("Priority", "u=4");
        upstream
    }

    /// Minimal profile used for manifests and media segments.
    pub fn media_profile(client: Client, referer: &str) -> Self {
        let mut upstream = Self::new(client);
        upstream.add_header_typed(reqwest::header::REFERER, referer);
        upstream
    }

    pub fn add_header_str<K: AsRef<str>, V: AsRef<str>>(&mut self, key: K, value: V) {
        match HeaderName::from_str(key.as_ref()) {
            Ok(name) => self.add_header_typed(name, value),
            Err(e) => {
                debug!(error = %e, "Invalid header name; skipping");
            }
        }
    }

    pub fn add_header_typed<K: Into<HeaderName>, V: AsRef<str>>(&mut self, key: K, value: V) {
        match HeaderValue::from_str(value.as_ref()) {
            Ok(value) => {
                self.headers.insert(key.into(), value);
            }
            Err(e) => {
                debug!(error = %e, "Invalid header value; skipping");
            }
        }
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn get<U: IntoUrl>(&self, url: U) -> RequestBuilder {
        self.request(Method::GET, url)
    }

    pub fn request<U: IntoUrl>(&self, method: Method, url: U) -> RequestBuilder {
        self.client
            .request(method, url)
            .headers(self.headers.clone())
    }

    /// GET `url` and fail with a `stage`-tagged error on network failure or
    /// a non-2xx status.
    pub async fn fetch<U: IntoUrl>(&self, stage: Stage, url: U) -> Result<Response, ResolveError> {
        let response = self
            .get(url)
            .send()
            .await
            .map_err(|e| ResolveError::fetch(stage, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ResolveError::UpstreamStatus { stage, status });
        }
        Ok(response)
    }

    pub async fn fetch_text<U: IntoUrl>(&self, stage: Stage, url: U) -> Result<String, ResolveError> {
        self.fetch(stage, url)
            .await?
            .text()
            .await
            .map_err(|e| ResolveError::fetch(stage, e))
    }
}
