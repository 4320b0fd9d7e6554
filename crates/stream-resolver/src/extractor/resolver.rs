//! Three-hop resolution of an embed id into a live manifest URL.
//!
//! embed page -> player script -> player page -> `source: '...m3u8'`.

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};
use url::Url;

use super::error::{ResolveError, Stage};
use super::patterns::{Field, PatternTable};
use super::upstream::Upstream;

pub const DEFAULT_EMBED_BASE: &str = "https://cdn.crichdplays.ru";
pub const DEFAULT_PLAYER_SCRIPT_URL: &str = "https://player002.vip/player2.js?v=7.061";

/// Anything that can turn an id into a manifest URL.
#[async_trait]
pub trait StreamResolver: Send + Sync {
    async fn resolve(&self, id: &str) -> Result<String, ResolveError>;
}

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Scheme and host serving `embed2.php`.
    pub embed_base: String,
    /// Known-good player script location.
    pub player_script_url: String,
    /// Look for the player script reference on the embed page before
    /// falling back to `player_script_url`.
    pub discover_player_script: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            embed_base: DEFAULT_EMBED_BASE.to_string(),
            player_script_url: DEFAULT_PLAYER_SCRIPT_URL.to_string(),
            discover_player_script: false,
        }
    }
}

impl ResolverConfig {
    /// `Referer` sent on every resolution hop.
    pub fn referer(&self) -> String {
        format!("{}/", self.embed_base.trim_end_matches('/'))
    }
}

/// Values gathered while walking the chain for a single id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionContext {
    pub id: String,
    pub fid: String,
    pub secure_token: String,
    pub expiry: String,
    pub player_script_url: String,
    pub player_page_url: String,
    pub manifest_url: String,
}

/// Resolver for the embed -> script -> player chain.
///
/// Every call walks the whole chain again, nothing is cached between calls
/// and nothing is retried.
pub struct EmbedChainResolver {
    upstream: Upstream,
    config: ResolverConfig,
    patterns: PatternTable,
}

impl EmbedChainResolver {
    pub fn new(client: Client, config: ResolverConfig) -> Self {
        let upstream = Upstream::page_profile(client, &config.referer());
        Self {
            upstream,
            config,
            patterns: PatternTable::default(),
        }
    }

    pub fn with_patterns(mut self, patterns: PatternTable) -> Self {
        self.patterns = patterns;
        self
    }

    fn embed_url(&self, id: &str) -> Result<Url, ResolveError> {
        let base = format!("{}/embed2.php", self.config.embed_base.trim_end_matches('/'));
        Url::parse_with_params(&base, &[("id", id)])
            .map_err(|e| ResolveError::InvalidUrl(format!("{base}: {e}")))
    }

    /// Walk the full chain for `id`, keeping every intermediate value.
    pub async fn resolve_context(&self, id: &str) -> Result<ResolutionContext, ResolveError> {
        let mut ctx = ResolutionContext {
            id: id.to_string(),
            ..Default::default()
        };

        let embed_html = self
            .upstream
            .fetch_text(Stage::Embed, self.embed_url(id)?)
            .await?;

        ctx.fid = self
            .patterns
            .require(Stage::Embed, &embed_html, Field::Fid)?
            .to_string();
        ctx.secure_token = self
            .patterns
            .require(Stage::Embed, &embed_html, Field::SecureToken)?
            .to_string();
        ctx.expiry = self
            .patterns
            .require(Stage::Embed, &embed_html, Field::ExpiryToken)?
            .to_string();
        ctx.player_script_url = self.player_script_url(&embed_html);

        debug!(
            id,
            fid = %ctx.fid,
            v_con = %ctx.secure_token,
            v_dt = %ctx.expiry,
            script = %ctx.player_script_url,
            "Extracted embed parameters"
        );

        let script = self
            .upstream
            .fetch_text(Stage::Script, ctx.player_script_url.as_str())
            .await?;
        let player_base = self
            .patterns
            .require(Stage::Script, &script, Field::PlayerPage)?;

        ctx.player_page_url = build_player_url(player_base, &ctx.fid, &ctx.secure_token, &ctx.expiry);
        let player_url = Url::parse(&ctx.player_page_url)
            .map_err(|e| ResolveError::InvalidUrl(format!("{}: {e}", ctx.player_page_url)))?;
        info!(id, player_url = %ctx.player_page_url, "Constructed player URL");

        let player_html = self.upstream.fetch_text(Stage::Player, player_url).await?;
        ctx.manifest_url = self
            .patterns
            .require(Stage::Player, &player_html, Field::ManifestUrl)?
            .to_string();
        info!(id, manifest_url = %ctx.manifest_url, "Resolved stream URL");

        Ok(ctx)
    }

    fn player_script_url(&self, embed_html: &str) -> String {
        if self.config.discover_player_script {
            if let Some(found) = self.patterns.extract_field(embed_html, Field::PlayerScript) {
                return found.to_string();
            }
            debug!("Player script reference not found on embed page; using pinned script");
        }
        self.config.player_script_url.clone()
    }
}

#[async_trait]
impl StreamResolver for EmbedChainResolver {
    async fn resolve(&self, id: &str) -> Result<String, ResolveError> {
        self.resolve_context(id).await.map(|ctx| ctx.manifest_url)
    }
}

/// Drop any query from `base` and attach the embed tokens.
pub fn build_player_url(base: &str, fid: &str, secure: &str, expires: &str) -> String {
    let clean = base.split('?').next().unwrap_or(base);
    format!("{clean}?v={fid}&secure={secure}&expires={expires}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::default::default_client;

    use axum::Router;
    use axum::extract::Query;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{MethodRouter, get};
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;

    const EMBED_OK: &str =
        r#"<script>fid="premium44"; v_con="sec123"; v_dt="1700000000";</script>"#;

    #[derive(Clone, Default)]
    struct Hits {
        embed: Arc<AtomicUsize>,
        script: Arc<AtomicUsize>,
        player: Arc<AtomicUsize>,
    }

    fn page(status: StatusCode, body: String, hits: Arc<AtomicUsize>) -> MethodRouter {
        get(move || {
            hits.fetch_add(1, Ordering::SeqCst);
            let body = body.clone();
            async move { (status, body) }
        })
    }

    fn local_patterns() -> PatternTable {
        PatternTable::default()
            .with_pattern(Field::PlayerPage, r#"src="(http://127\.0\.0\.1:\d+/[^"]+)""#)
            .unwrap()
            .with_pattern(
                Field::PlayerScript,
                r#"src="(http://127\.0\.0\.1:\d+/alt/[^"]+\.js[^"]*)""#,
            )
            .unwrap()
    }

    struct Upstreams {
        addr: SocketAddr,
        hits: Hits,
    }

    async fn spawn_upstream(embed: (StatusCode, &str), script: Option<&str>) -> Upstreams {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Hits::default();

        let script_body = match script {
            Some(body) => body.replace("{addr}", &addr.to_string()),
            None => format!(r#"frame.innerHTML = '<iframe src="http://{addr}/player.php?stale=1"></iframe>';"#),
        };
        let manifest = format!("var p = {{ source: 'http://{addr}/live/index.m3u8?md6=abc&expires=99', mute: true }};");
        let player_hits = hits.player.clone();

        let app = Router::new()
            .route(
                "/embed2.php",
                page(embed.0, embed.1.replace("{addr}", &addr.to_string()), hits.embed.clone()),
            )
            .route("/player2.js", page(StatusCode::OK, script_body.clone(), hits.script.clone()))
            .route("/alt/zplayer9.js", page(StatusCode::OK, script_body, hits.script.clone()))
            .route(
                "/player.php",
                get(move |Query(q): Query<HashMap<String, String>>, headers: HeaderMap| {
                    player_hits.fetch_add(1, Ordering::SeqCst);
                    let manifest = manifest.clone();
                    async move {
                        if q.get("v").map(String::as_str) == Some("offline") {
                            return (StatusCode::OK, "<html>stream offline</html>".to_string());
                        }
                        let ok = q.get("v").map(String::as_str) == Some("premium44")
                            && q.get("secure").map(String::as_str) == Some("sec123")
                            && q.get("expires").map(String::as_str) == Some("1700000000")
                            && !q.contains_key("stale")
                            && headers.contains_key("sec-fetch-mode");
                        if ok {
                            (StatusCode::OK, manifest)
                        } else {
                            (StatusCode::FORBIDDEN, String::new())
                        }
                    }
                }),
            );

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Upstreams { addr, hits }
    }

    fn resolver_for(addr: SocketAddr) -> EmbedChainResolver {
        let config = ResolverConfig {
            embed_base: format!("http://{addr}"),
            player_script_url: format!("http://{addr}/player2.js?v=7.061"),
            discover_player_script: false,
        };
        EmbedChainResolver::new(default_client().unwrap(), config).with_patterns(local_patterns())
    }

    #[test]
    fn test_build_player_url_strips_query() {
        assert_eq!(
            build_player_url("https://zplayer001.com/embed.php?x=1&y=2", "f", "s", "e"),
            "https://zplayer001.com/embed.php?v=f&secure=s&expires=e"
        );
        assert_eq!(
            build_player_url("https://zplayer001.com/embed.php", "f", "s", "e"),
            "https://zplayer001.com/embed.php?v=f&secure=s&expires=e"
        );
    }

    #[test]
    fn test_referer_has_single_trailing_slash() {
        let config = ResolverConfig {
            embed_base: "https://embed.example/".to_string(),
            ..Default::default()
        };
        assert_eq!(config.referer(), "https://embed.example/");
    }

    #[tokio::test]
    async fn test_resolves_full_chain() {
        let up = spawn_upstream((StatusCode::OK, EMBED_OK), None).await;
        let resolver = resolver_for(up.addr);

        let ctx = resolver.resolve_context("abc123").await.unwrap();
        assert_eq!(ctx.id, "abc123");
        assert_eq!(ctx.fid, "premium44");
        assert_eq!(ctx.secure_token, "sec123");
        assert_eq!(ctx.expiry, "1700000000");
        assert_eq!(
            ctx.player_page_url,
            format!("http://{}/player.php?v=premium44&secure=sec123&expires=1700000000", up.addr)
        );
        assert_eq!(
            ctx.manifest_url,
            format!("http://{}/live/index.m3u8?md6=abc&expires=99", up.addr)
        );

        let url = resolver.resolve("abc123").await.unwrap();
        assert_eq!(url, ctx.manifest_url);
        assert_eq!(up.hits.embed.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_missing_secure_token_stops_chain() {
        let up = spawn_upstream(
            (StatusCode::OK, r#"fid="premium44"; v_dt="1700000000";"#),
            None,
        )
        .await;
        let resolver = resolver_for(up.addr);

        let err = resolver.resolve("abc123").await.unwrap_err();
        assert!(matches!(
            err,
            ResolveError::Extraction {
                stage: Stage::Embed,
                field: "v_con"
            }
        ));
        assert_eq!(up.hits.embed.load(Ordering::SeqCst), 1);
        assert_eq!(up.hits.script.load(Ordering::SeqCst), 0);
        assert_eq!(up.hits.player.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_embed_status_error() {
        let up = spawn_upstream((StatusCode::NOT_FOUND, "gone"), None).await;
        let resolver = resolver_for(up.addr);

        let err = resolver.resolve("abc123").await.unwrap_err();
        match err {
            ResolveError::UpstreamStatus { stage, status } => {
                assert_eq!(stage, Stage::Embed);
                assert_eq!(status, StatusCode::NOT_FOUND);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(up.hits.script.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_script_without_player_url() {
        let up = spawn_upstream((StatusCode::OK, EMBED_OK), Some("console.log('nothing here');")).await;
        let resolver = resolver_for(up.addr);

        let err = resolver.resolve("abc123").await.unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Script));
        assert_eq!(err.field(), Some("player_page"));
        assert_eq!(up.hits.player.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_player_page_without_manifest() {
        let up = spawn_upstream(
            (StatusCode::OK, r#"fid="offline"; v_con="sec123"; v_dt="1700000000";"#),
            None,
        )
        .await;
        let resolver = resolver_for(up.addr);

        let err = resolver.resolve("abc123").await.unwrap_err();
        assert!(matches!(
            err,
            ResolveError::Extraction {
                stage: Stage::Player,
                field: "source"
            }
        ));
    }

    #[tokio::test]
    async fn test_player_status_error() {
        // Unknown fid makes the player page answer 403.
        let up = spawn_upstream(
            (StatusCode::OK, r#"fid="other"; v_con="sec123"; v_dt="1700000000";"#),
            None,
        )
        .await;
        let resolver = resolver_for(up.addr);

        let err = resolver.resolve("abc123").await.unwrap_err();
        assert!(matches!(
            err,
            ResolveError::UpstreamStatus {
                stage: Stage::Player,
                ..
            }
        ));
        assert_eq!(up.hits.player.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_pinned_script_ignores_page_reference() {
        let embed = r#"fid="premium44"; v_con="sec123"; v_dt="1700000000"; <script src="http://{addr}/alt/zplayer9.js?v=1"></script>"#;
        let up = spawn_upstream((StatusCode::OK, embed), None).await;
        let resolver = resolver_for(up.addr);

        let ctx = resolver.resolve_context("abc123").await.unwrap();
        assert_eq!(ctx.player_script_url, format!("http://{}/player2.js?v=7.061", up.addr));
    }

    #[tokio::test]
    async fn test_discovered_script_is_used() {
        let embed = r#"fid="premium44"; v_con="sec123"; v_dt="1700000000"; <script src="http://{addr}/alt/zplayer9.js?v=1"></script>"#;
        let up = spawn_upstream((StatusCode::OK, embed), None).await;
        let config = ResolverConfig {
            embed_base: format!("http://{}", up.addr),
            player_script_url: format!("http://{}/missing.js", up.addr),
            discover_player_script: true,
        };
        let resolver = EmbedChainResolver::new(default_client().unwrap(), config)
            .with_patterns(local_patterns());

        let ctx = resolver.resolve_context("abc123").await.unwrap();
        assert_eq!(ctx.player_script_url, format!("http://{}/alt/zplayer9.js?v=1", up.addr));
        assert!(ctx.manifest_url.ends_with("index.m3u8?md6=abc&expires=99"));
    }
}
