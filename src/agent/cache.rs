//! Content-addressed cache for expensive per-media analysis.
//!
//! Transcription and vision results are memoized under a hash of the raw
//! input, so byte-identical media is analyzed once regardless of filename
//! or timestamp. Entries expire after a fixed TTL; expired entries are
//! purged lazily on lookup and proactively by a background sweep.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::agent::config::MediaCacheConfig;

/// Kind of analysis an entry holds. Part of the cache key, so identical
/// bytes can never collide across kinds.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Speech-to-text output for raw audio bytes.
    Transcription,
    /// Vision description (optionally merged with OCR) for an image locator.
    Image,
}

impl MediaKind {
    const fn tag(self) -> &'static str {
        match self {
            Self::Transcription => "transcription",
            Self::Image => "image",
        }
    }
}

/// One immutable cache entry.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct CacheEntry {
    kind: MediaKind,
    value: String,
    created_at: DateTime<Utc>,
}

/// Thread-safe, content-addressed analysis cache with TTL and an optional
/// JSON snapshot on disk.
pub struct MediaCache {
    config: MediaCacheConfig,
    entries: DashMap<String, CacheEntry>,
    // Mutations mark the cache dirty; the snapshot is written by the
    // sweep, an explicit flush, or drop. This is a durability
    // optimization, not a source of truth, so losing the tail is fine.
    dirty: AtomicBool,
}

impl MediaCache {
    /// Create a cache, loading the snapshot if one is configured.
    ///
    /// A missing snapshot starts the cache empty; an unreadable or corrupt
    /// snapshot is logged and also degrades to empty. Answers never depend
    /// on cache availability, only latency and cost do.
    #[must_use]
    pub fn new(config: MediaCacheConfig) -> Self {
        let entries = DashMap::new();
        if let Some(path) = &config.snapshot_path {
            match std::fs::read_to_string(path) {
                Ok(raw) => match serde_json::from_str::<BTreeMap<String, CacheEntry>>(&raw) {
                    Ok(snapshot) => {
                        for (key, entry) in snapshot {
                            entries.insert(key, entry);
                        }
                    }
                    Err(e) => {
                        tracing::warn!("corrupt cache snapshot, starting empty: {e}");
                    }
                },
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!("unreadable cache snapshot, starting empty: {e}");
                }
            }
        }
        Self {
            config,
            entries,
            dirty: AtomicBool::new(false),
        }
    }

    /// Derive the content-addressed key for an input.
    fn cache_key(kind: MediaKind, input: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(kind.tag().as_bytes());
        hasher.update(b":");
        hasher.update(input);
        hex::encode(hasher.finalize())
    }

    /// Look up a previous analysis result.
    ///
    /// Returns `None` for missing entries and for expired ones; an expired
    /// entry is removed on the way out.
    #[must_use]
    pub fn lookup(&self, input: &[u8], kind: MediaKind) -> Option<String> {
        let key = Self::cache_key(kind, input);
        {
            let Some(entry) = self.entries.get(&key) else {
                return None;
            };
            if !self.is_expired(&entry) {
                return Some(entry.value.clone());
            }
        }
        self.entries.remove(&key);
        self.dirty.store(true, Ordering::Relaxed);
        None
    }

    /// Store an analysis result. Last write wins; identical inputs are
    /// assumed to produce identical outputs, so no reconciliation happens.
    pub fn store(&self, input: &[u8], kind: MediaKind, value: impl Into<String>) {
        let key = Self::cache_key(kind, input);
        self.entries.insert(
            key,
            CacheEntry {
                kind,
                value: value.into(),
                created_at: Utc::now(),
            },
        );
        self.dirty.store(true, Ordering::Relaxed);
    }

    /// Remove all expired entries. Returns how many were purged.
    pub fn purge_expired(&self) -> usize {
        // Counted inside the closure: a concurrent store between a
        // before/after length read would skew the difference.
        let mut purged = 0;
        self.entries.retain(|_, entry| {
            let keep = !self.is_expired(entry);
            if !keep {
                purged += 1;
            }
            keep
        });
        if purged > 0 {
            tracing::debug!("purged {purged} expired cache entries");
            self.dirty.store(true, Ordering::Relaxed);
        }
        self.flush();
        purged
    }

    /// Write the snapshot if anything changed since the last write.
    /// Snapshot failures are logged and swallowed.
    pub fn flush(&self) {
        if self.dirty.swap(false, Ordering::Relaxed) {
            self.persist();
        }
    }

    /// Number of live entries (expired ones included until purged).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Spawn the hourly background sweep.
    pub fn spawn_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let cache = Arc::clone(self);
        let period = cache.config.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // First tick completes immediately; skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                cache.purge_expired();
            }
        })
    }

    fn is_expired(&self, entry: &CacheEntry) -> bool {
        let age = Utc::now().signed_duration_since(entry.created_at);
        match age.to_std() {
            Ok(age) => age > self.config.ttl,
            // created_at in the future (clock skew): keep the entry.
            Err(_) => false,
        }
    }

    fn persist(&self) {
        let Some(path) = &self.config.snapshot_path else {
            return;
        };
        let snapshot: BTreeMap<String, CacheEntry> = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        let result = serde_json::to_string(&snapshot)
            .map_err(std::io::Error::other)
            .and_then(|json| std::fs::write(path, json));
        if let Err(e) = result {
            tracing::warn!("failed to write cache snapshot: {e}");
        }
    }
}

impl Drop for MediaCache {
    fn drop(&mut self) {
        self.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn memory_cache(ttl: Duration) -> MediaCache {
        MediaCache::new(MediaCacheConfig::default().with_ttl(ttl))
    }

    #[test]
    fn test_store_then_lookup() {
        let cache = memory_cache(Duration::from_secs(60));
        cache.store(b"audio-bytes", MediaKind::Transcription, "hello world");
        assert_eq!(
            cache.lookup(b"audio-bytes", MediaKind::Transcription),
            Some("hello world".to_string())
        );
        assert_eq!(cache.lookup(b"other-bytes", MediaKind::Transcription), None);
    }

    #[test]
    fn test_kinds_never_collide() {
        let cache = memory_cache(Duration::from_secs(60));
        cache.store(b"same-input", MediaKind::Transcription, "transcript");
        cache.store(b"same-input", MediaKind::Image, "description");
        assert_eq!(
            cache.lookup(b"same-input", MediaKind::Transcription),
            Some("transcript".to_string())
        );
        assert_eq!(
            cache.lookup(b"same-input", MediaKind::Image),
            Some("description".to_string())
        );
    }

    #[test]
    fn test_expired_entry_is_removed_on_lookup() {
        let cache = memory_cache(Duration::ZERO);
        cache.store(b"stale", MediaKind::Image, "old");
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.lookup(b"stale", MediaKind::Image), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_purge_expired() {
        let cache = memory_cache(Duration::ZERO);
        cache.store(b"a", MediaKind::Image, "1");
        cache.store(b"b", MediaKind::Transcription, "2");
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.purge_expired(), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_purge_keeps_live_entries() {
        let cache = memory_cache(Duration::from_secs(60));
        cache.store(b"fresh", MediaKind::Image, "still good");
        assert_eq!(cache.purge_expired(), 0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_store_is_last_write_wins() {
        let cache = memory_cache(Duration::from_secs(60));
        cache.store(b"key", MediaKind::Image, "first");
        cache.store(b"key", MediaKind::Image, "second");
        assert_eq!(cache.len(), 1);
        assert_eq!(
            cache.lookup(b"key", MediaKind::Image),
            Some("second".to_string())
        );
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("media-cache.json");
        let config = MediaCacheConfig::default().with_snapshot_path(&path);

        let cache = MediaCache::new(config.clone());
        cache.store(b"voice", MediaKind::Transcription, "persisted");
        drop(cache);

        let reloaded = MediaCache::new(config);
        assert_eq!(
            reloaded.lookup(b"voice", MediaKind::Transcription),
            Some("persisted".to_string())
        );
    }

    #[test]
    fn test_corrupt_snapshot_degrades_to_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("media-cache.json");
        std::fs::write(&path, "{not json").expect("write");

        let cache = MediaCache::new(MediaCacheConfig::default().with_snapshot_path(&path));
        assert!(cache.is_empty());
    }
}
