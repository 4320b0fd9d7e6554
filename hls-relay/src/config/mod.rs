//! Process configuration.
//!
//! Everything is read from environment variables (after `.env` is loaded by
//! `main`), falling back to defaults. Malformed values are logged and ignored.

use std::path::PathBuf;
use std::time::Duration;

use stream_resolver::ResolverConfig;
use tracing::warn;

use crate::api::server::ApiServerConfig;
use crate::error::{Error, Result};
use crate::logging::{LogFormat, LoggingSettings};

/// Default lifetime of a cached segment.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Default interval between expiry sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Default `Referer` for manifest and segment fetches.
pub const DEFAULT_MEDIA_REFERER: &str = "https://zplayer001.com/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    pub ttl: Duration,
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_CACHE_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub server: ApiServerConfig,
    pub cache: CacheConfig,
    pub resolver: ResolverConfig,
    pub media_referer: String,
    pub logging: LoggingSettings,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            server: ApiServerConfig::default(),
            cache: CacheConfig::default(),
            resolver: ResolverConfig::default(),
            media_referer: DEFAULT_MEDIA_REFERER.to_string(),
            logging: LoggingSettings::default(),
        }
    }
}

impl RelayConfig {
    /// Load the configuration from the process environment.
    ///
    /// Supported env vars:
    /// - `BIND_ADDRESS`, `PORT`, `ENABLE_CORS`
    /// - `CACHE_TTL_SECS`, `CACHE_SWEEP_INTERVAL_SECS`
    /// - `UPSTREAM_EMBED_BASE`, `UPSTREAM_PLAYER_SCRIPT`, `UPSTREAM_DISCOVER_SCRIPT`
    /// - `UPSTREAM_MEDIA_REFERER`
    /// - `LOG_DIR`, `LOG_FORMAT`
    pub fn from_env_or_default() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env_or_default`](Self::from_env_or_default) with an
    /// arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(bind_address) = non_empty("BIND_ADDRESS") {
            config.server.bind_address = bind_address;
        }
        if let Some(port) = parse_var(&non_empty, "PORT") {
            config.server.port = port;
        }
        if let Some(enable_cors) = parse_var(&non_empty, "ENABLE_CORS") {
            config.server.enable_cors = enable_cors;
        }

        if let Some(secs) = parse_var::<u64, _>(&non_empty, "CACHE_TTL_SECS") {
            config.cache.ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64, _>(&non_empty, "CACHE_SWEEP_INTERVAL_SECS") {
            config.cache.sweep_interval = Duration::from_secs(secs);
        }

        if let Some(base) = non_empty("UPSTREAM_EMBED_BASE") {
            config.resolver.embed_base = base;
        }
        if let Some(script) = non_empty("UPSTREAM_PLAYER_SCRIPT") {
            config.resolver.player_script_url = script;
        }
        if let Some(discover) = parse_var(&non_empty, "UPSTREAM_DISCOVER_SCRIPT") {
            config.resolver.discover_player_script = discover;
        }
        if let Some(referer) = non_empty("UPSTREAM_MEDIA_REFERER") {
            config.media_referer = referer;
        }

        if let Some(dir) = non_empty("LOG_DIR") {
            config.logging.log_dir = Some(PathBuf::from(dir));
        }
        if let Some(format) = parse_var::<LogFormat, _>(&non_empty, "LOG_FORMAT") {
            config.logging.format = format;
        }

        config
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache.ttl.is_zero() {
            return Err(Error::config("cache TTL must be greater than zero"));
        }
        if self.cache.sweep_interval.is_zero() {
            return Err(Error::config("cache sweep interval must be greater than zero"));
        }
        url::Url::parse(&self.resolver.embed_base).map_err(|e| {
            Error::config(format!(
                "invalid embed base `{}`: {e}",
                self.resolver.embed_base
            ))
        })?;
        url::Url::parse(&self.resolver.player_script_url).map_err(|e| {
            Error::config(format!(
                "invalid player script url `{}`: {e}",
                self.resolver.player_script_url
            ))
        })?;
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring malformed environment value");
            None
        }
    }
}
