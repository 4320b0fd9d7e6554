//! hls-relay library crate.
//!
//! Resolves embed ids into live HLS playlists and relays them, rewriting
//! every media URI to go back through this server and caching TS segments.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod playlist;

pub use cache::SegmentCache;
pub use config::RelayConfig;
pub use error::{Error, Result};
pub use gateway::{GatewayError, ProxyGateway};
