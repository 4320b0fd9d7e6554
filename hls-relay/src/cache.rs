//! Time-bounded segment cache.
//!
//! Maps an upstream segment URL to its buffered bytes and content type.
//! Entries are readable for `ttl` after insertion and are physically removed
//! by a background sweep that runs every `sweep_interval`.

use bytes::Bytes;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::config::CacheConfig;

/// A buffered segment. Immutable once inserted.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub payload: Bytes,
    pub content_type: Option<String>,
    pub inserted_at: Instant,
    pub ttl: Duration,
}

impl CacheEntry {
    fn new(payload: Bytes, content_type: Option<String>, ttl: Duration) -> Self {
        Self {
            payload,
            content_type,
            inserted_at: Instant::now(),
            ttl,
        }
    }

    /// Entries are visible in `[inserted_at, inserted_at + ttl)`.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted_at) >= self.ttl
    }
}

/// Thread-safe segment cache.
///
/// Cloning is cheap and every clone shares the same entries.
#[derive(Debug, Clone)]
pub struct SegmentCache {
    entries: Arc<DashMap<String, CacheEntry>>,
    ttl: Duration,
    sweep_interval: Duration,
    cancel_token: CancellationToken,
}

impl SegmentCache {
    /// Create a cache without a sweep task. Expired entries are still
    /// invisible to readers, they are just never reclaimed in the background.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl: config.ttl,
            sweep_interval: config.sweep_interval,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Create a cache and start its sweep task.
    ///
    /// The task stops when `parent` is cancelled or [`shutdown`](Self::shutdown)
    /// is called. Must be called from within a tokio runtime.
    pub fn start(config: CacheConfig, parent: &CancellationToken) -> Self {
        let mut cache = Self::new(config);
        cache.cancel_token = parent.child_token();
        cache.spawn_sweeper();
        cache
    }

    fn spawn_sweeper(&self) {
        let cache = self.clone();
        let period = self.sweep_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cache.cancel_token.cancelled() => {
                        debug!("Segment cache sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let removed = cache.sweep();
                        if removed > 0 {
                            debug!(removed, remaining = cache.len(), "Swept expired segments");
                        }
                    }
                }
            }
        });
    }

    /// Stop the sweep task.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }

    /// Look up a live entry. Expired entries behave exactly like missing ones.
    pub fn get(&self, url: &str) -> Option<CacheEntry> {
        let now = Instant::now();
        let entry = self.entries.get(url)?;

        if entry.is_expired_at(now) {
            drop(entry); // Release the shard lock before removing
            self.entries.remove_if(url, |_, e| e.is_expired_at(now));
            trace!(url, "Segment cache entry expired");
            return None;
        }

        Some(entry.clone())
    }

    /// Insert or overwrite the entry for `url`.
    pub fn put(&self, url: impl Into<String>, payload: Bytes, content_type: Option<String>) {
        let entry = CacheEntry::new(payload, content_type, self.ttl);
        self.entries.insert(url.into(), entry);
    }

    /// Remove every expired entry, returning how many were dropped.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired_at(now));
        before.saturating_sub(self.entries.len())
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
