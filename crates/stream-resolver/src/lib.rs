//! Resolution of embed identifiers into live HLS manifest URLs.
//!
//! The upstream site hides its manifest behind an embed page, a player
//! script and a player page. [`EmbedChainResolver`] walks that chain with a
//! browser-like header profile and pulls the needed values out of each body
//! with the patterns in [`PatternTable`].

pub mod extractor;

pub use extractor::error::{ResolveError, Stage};
pub use extractor::patterns::{Field, PatternTable};
pub use extractor::resolver::{
    EmbedChainResolver, ResolutionContext, ResolverConfig, StreamResolver,
};
pub use extractor::upstream::Upstream;
