use std::sync::OnceLock;

use reqwest::{Client, ClientBuilder};
use tracing::debug;

pub const DEFAULT_UA: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:135.0) Gecko/20100101 Firefox/135.0";

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Another crate installed one first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Client builder shared by every upstream fetch.
///
/// No connect or request timeout is set. A slow upstream is a slow response.
pub fn create_client_builder() -> ClientBuilder {
    install_rustls_provider();

    Client::builder()
        .tcp_nodelay(true)
        .pool_max_idle_per_host(20)
}

pub fn default_client() -> Result<Client, reqwest::Error> {
    create_client_builder().build()
}
