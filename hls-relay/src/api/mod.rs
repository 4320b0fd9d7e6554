//! HTTP front end.
//!
//! Serves rewritten playlists by id, proxies segment URLs through the cache,
//! and exposes a health probe.

pub mod error;
pub mod routes;
pub mod server;

pub use server::{ApiServer, ApiServerConfig, AppState};
