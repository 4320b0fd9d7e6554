use std::sync::Arc;

use hls_relay::api::{ApiServer, AppState};
use hls_relay::{ProxyGateway, RelayConfig, SegmentCache, logging};
use stream_resolver::extractor::default_client;
use stream_resolver::{EmbedChainResolver, Upstream};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = RelayConfig::from_env_or_default();
    config.validate()?;

    let _log_guard = logging::init_logging(&config.logging)?;

    let client = default_client()?;
    let resolver = EmbedChainResolver::new(client.clone(), config.resolver.clone());
    let media = Upstream::media_profile(client, &config.media_referer);

    let shutdown = CancellationToken::new();
    let cache = SegmentCache::start(config.cache, &shutdown);
    let gateway = ProxyGateway::new(Arc::new(resolver), media, cache);

    let server = ApiServer::new(config.server.clone(), AppState::new(Arc::new(gateway)))
        .with_cancel_token(shutdown.clone());

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            return;
        }
        tracing::info!("Received Ctrl-C, stopping");
        shutdown.cancel();
    });

    tracing::info!(
        ttl_secs = config.cache.ttl.as_secs(),
        embed_base = %config.resolver.embed_base,
        "hls-relay starting"
    );
    server.run().await?;

    Ok(())
}
