//! Line-oriented playlist rewriting.
//!
//! Only media URI lines are touched; tags, comments, blank lines, ordering and
//! line terminators are passed through byte for byte.

use thiserror::Error;
use url::Url;

/// Path prefix under which rewritten URLs are served.
pub const PROXY_PREFIX: &str = "/proxy-stream/";

#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("invalid manifest url `{url}`: {source}")]
    InvalidSourceUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("manifest url `{0}` has no host")]
    MissingHost(String),
}

/// Where a playlist was fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteContext {
    /// Scheme, host and non-default port.
    pub origin: String,
    /// Directory part of the playlist path, without a trailing slash.
    pub base_path: String,
}

impl RewriteContext {
    pub fn from_source_url(source_url: &str) -> Result<Self, RewriteError> {
        let url = Url::parse(source_url).map_err(|source| RewriteError::InvalidSourceUrl {
            url: source_url.to_string(),
            source,
        })?;
        if !url.has_host() {
            return Err(RewriteError::MissingHost(source_url.to_string()));
        }

        let path = url.path();
        let base_path = match path.rfind('/') {
            Some(idx) => path[..idx].to_string(),
            None => String::new(),
        };

        Ok(Self {
            origin: url.origin().ascii_serialization(),
            base_path,
        })
    }

    /// Resolve a playlist URI against this context.
    pub fn absolutize(&self, uri: &str) -> String {
        if has_scheme(uri) {
            uri.to_string()
        } else if uri.starts_with('/') {
            format!("{}{}", self.origin, uri)
        } else {
            format!("{}{}/{}", self.origin, self.base_path, uri)
        }
    }
}

/// `scheme://` prefix per RFC 3986 scheme syntax.
fn has_scheme(uri: &str) -> bool {
    let Some((scheme, _)) = uri.split_once("://") else {
        return false;
    };
    let mut chars = scheme.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Split a line into its content and its terminator (`""`, `"\n"` or `"\r\n"`).
fn split_terminator(line: &str) -> (&str, &str) {
    if let Some(content) = line.strip_suffix("\r\n") {
        (content, "\r\n")
    } else if let Some(content) = line.strip_suffix('\n') {
        (content, "\n")
    } else {
        (line, "")
    }
}

/// Rewrites playlists so every media URI is served under [`PROXY_PREFIX`].
///
/// The prefix is fixed because the proxy route is mounted at the same path.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestRewriter;

impl ManifestRewriter {
    /// A line is rewritten when it is not a comment or tag, ends in a segment
    /// or playlist extension, and has not been rewritten already.
    pub fn is_candidate(&self, line: &str) -> bool {
        !line.starts_with('#')
            && !line.starts_with(PROXY_PREFIX)
            && (line.ends_with(".ts") || line.ends_with(".m3u8"))
    }

    pub fn proxied_url(&self, absolute_url: &str) -> String {
        format!("{PROXY_PREFIX}{absolute_url}")
    }

    /// Rewrite every media URI in `manifest` to go through the proxy prefix.
    pub fn rewrite(&self, manifest: &str, source_url: &str) -> Result<String, RewriteError> {
        let ctx = RewriteContext::from_source_url(source_url)?;
        Ok(self.rewrite_with(manifest, &ctx))
    }

    pub fn rewrite_with(&self, manifest: &str, ctx: &RewriteContext) -> String {
        let mut out = String::with_capacity(manifest.len() + manifest.len() / 2);

        for line in manifest.split_inclusive('\n') {
            let (content, terminator) = split_terminator(line);
            if self.is_candidate(content) {
                out.push_str(&self.proxied_url(&ctx.absolutize(content)));
                out.push_str(terminator);
            } else {
                out.push_str(line);
            }
        }

        out
    }
}
