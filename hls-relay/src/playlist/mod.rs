//! HLS playlist handling.

pub mod rewriter;

pub use rewriter::{ManifestRewriter, PROXY_PREFIX, RewriteContext, RewriteError};
