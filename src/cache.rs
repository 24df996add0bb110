use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::RwLock;
use tracing::debug;

/// Configuration for the audio cache
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum cache size in bytes (default: 256MB)
    pub max_size_bytes: u64,
    /// Maximum number of cached tracks (default: 32)
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            max_size_bytes: 256 * 1024 * 1024,
            max_entries: 32,
        }
    }
}

/// Metadata about a cached track body
#[derive(Debug, Clone)]
struct CacheEntry {
    data: Arc<Vec<u8>>,
    /// Last access time (for LRU)
    last_accessed: SystemTime,
}

/// In-memory LRU cache of fetched audio, keyed by locator.
///
/// Preloads write into it and the output reads from it, so a warmed track
/// starts without another network round trip.
#[derive(Clone, Default)]
pub struct AudioCache {
    config: CacheConfig,
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    current_size: Arc<RwLock<u64>>,
}

impl AudioCache {
    pub fn new(config: CacheConfig) -> Self {
        AudioCache {
            config,
            entries: Arc::new(RwLock::new(HashMap::new())),
            current_size: Arc::new(RwLock::new(0)),
        }
    }

    /// Get a track body from cache if it exists
    pub async fn get(&self, url: &str) -> Option<Arc<Vec<u8>>> {
        let mut entries = self.entries.write().await;
        match entries.get_mut(url) {
            Some(entry) => {
                entry.last_accessed = SystemTime::now();
                debug!("AudioCache: Cache hit for {}", url);
                Some(entry.data.clone())
            }
            None => {
                debug!("AudioCache: Cache miss for {}", url);
                None
            }
        }
    }

    pub async fn contains(&self, url: &str) -> bool {
        self.entries.read().await.contains_key(url)
    }

    /// Put a track body into the cache, evicting least recently used entries
    pub async fn put(&self, url: &str, data: Arc<Vec<u8>>) {
        let size = data.len() as u64;
        if size > self.config.max_size_bytes {
            debug!(
                "AudioCache: Not caching {} ({} bytes exceeds limit)",
                url, size
            );
            return;
        }

        let mut entries = self.entries.write().await;
        let mut current_size = self.current_size.write().await;

        if let Some(old_entry) = entries.remove(url) {
            *current_size = current_size.saturating_sub(old_entry.data.len() as u64);
        }

        while (*current_size + size > self.config.max_size_bytes
            || entries.len() >= self.config.max_entries)
            && !entries.is_empty()
        {
            Self::evict_lru(&mut entries, &mut current_size);
        }

        entries.insert(
            url.to_string(),
            CacheEntry {
                data,
                last_accessed: SystemTime::now(),
            },
        );
        *current_size += size;

        debug!(
            "AudioCache: Cached {} ({} bytes, total cache: {} bytes)",
            url, size, *current_size
        );
    }

    /// Get current cache statistics
    pub async fn get_stats(&self) -> CacheStats {
        let entries = self.entries.read().await;
        let current_size = self.current_size.read().await;

        CacheStats {
            total_entries: entries.len(),
            total_size_bytes: *current_size,
            max_size_bytes: self.config.max_size_bytes,
            max_entries: self.config.max_entries,
        }
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
        *self.current_size.write().await = 0;
    }

    fn evict_lru(entries: &mut HashMap<String, CacheEntry>, current_size: &mut u64) {
        let lru_url = entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_accessed)
            .map(|(url, _)| url.clone());

        if let Some(url) = lru_url {
            if let Some(entry) = entries.remove(&url) {
                *current_size = current_size.saturating_sub(entry.data.len() as u64);
                debug!("AudioCache: Evicted {} ({} bytes)", url, entry.data.len());
            }
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub total_entries: usize,
    pub total_size_bytes: u64,
    pub max_size_bytes: u64,
    pub max_entries: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_and_get() {
        let cache = AudioCache::new(CacheConfig::default());
        cache.put("a", Arc::new(vec![1, 2, 3])).await;

        assert_eq!(cache.get("a").await.unwrap().as_slice(), &[1, 2, 3]);
        assert!(cache.get("b").await.is_none());
        assert_eq!(cache.get_stats().await.total_size_bytes, 3);
    }

    #[tokio::test]
    async fn test_evicts_least_recently_used() {
        let cache = AudioCache::new(CacheConfig {
            max_size_bytes: 10,
            max_entries: 2,
        });
        cache.put("a", Arc::new(vec![0; 4])).await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        cache.put("b", Arc::new(vec![0; 4])).await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        // Touch "a" so "b" becomes the eviction candidate
        cache.get("a").await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        cache.put("c", Arc::new(vec![0; 4])).await;

        assert!(cache.contains("a").await);
        assert!(!cache.contains("b").await);
        assert!(cache.contains("c").await);
        assert_eq!(cache.get_stats().await.total_size_bytes, 8);
    }

    #[tokio::test]
    async fn test_oversized_body_is_not_cached() {
        let cache = AudioCache::new(CacheConfig {
            max_size_bytes: 2,
            max_entries: 4,
        });
        cache.put("big", Arc::new(vec![0; 3])).await;
        assert!(!cache.contains("big").await);
    }
}
