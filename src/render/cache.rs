use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
    time::Instant,
};

use crate::fingerprint::ObjectFingerprint;

/// Cache key: content fingerprint plus the pixel size the sprite was
/// rasterized at. Resolution is content at raster time; the same shape at
/// a different zoom is a different sprite.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RasterKey {
    pub fingerprint: ObjectFingerprint,
    pub width: u32,
    pub height: u32,
}

/// Rasterized sprite in premultiplied RGBA8.
#[derive(Clone, Debug)]
pub struct CachedRaster {
    pub width: u32,
    pub height: u32,
    pub rgba8_premul: Arc<Vec<u8>>,
}

struct Entry {
    raster: CachedRaster,
    last_used: Instant,
    hit_count: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub capacity: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Bounded memoization of rasterized sprites, evicting the least recently
/// used entry past capacity. Correctness never depends on it; only
/// throughput does.
pub struct RasterCache {
    entries: HashMap<RasterKey, Entry>,
    lru: VecDeque<RasterKey>,
    capacity: usize,
    hits: u64,
    misses: u64,
}

impl RasterCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            lru: VecDeque::new(),
            capacity: capacity.max(1),
            hits: 0,
            misses: 0,
        }
    }

    pub fn get(&mut self, key: &RasterKey) -> Option<CachedRaster> {
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.last_used = Instant::now();
                entry.hit_count += 1;
                self.hits += 1;
                let raster = entry.raster.clone();
                self.touch(*key);
                Some(raster)
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn put(&mut self, key: RasterKey, raster: CachedRaster) {
        self.entries.insert(
            key,
            Entry {
                raster,
                last_used: Instant::now(),
                hit_count: 0,
            },
        );
        self.touch(key);
        while self.entries.len() > self.capacity {
            if let Some(old) = self.lru.pop_front() {
                self.entries.remove(&old);
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.lru.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.entries.len(),
            capacity: self.capacity,
        }
    }

    /// Hit count of one entry, if cached. Observability only.
    pub fn hit_count(&self, key: &RasterKey) -> Option<u64> {
        self.entries.get(key).map(|e| e.hit_count)
    }

    fn touch(&mut self, key: RasterKey) {
        if let Some(pos) = self.lru.iter().position(|k| *k == key) {
            self.lru.remove(pos);
        }
        self.lru.push_back(key);
    }
}

impl Default for RasterCache {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(n: u64) -> RasterKey {
        RasterKey {
            fingerprint: ObjectFingerprint { hi: n, lo: !n },
            width: 16,
            height: 16,
        }
    }

    fn raster() -> CachedRaster {
        CachedRaster {
            width: 16,
            height: 16,
            rgba8_premul: Arc::new(vec![0u8; 16 * 16 * 4]),
        }
    }

    #[test]
    fn get_after_put_hits() {
        let mut cache = RasterCache::new(4);
        assert!(cache.get(&key(1)).is_none());
        cache.put(key(1), raster());
        assert!(cache.get(&key(1)).is_some());
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn eviction_removes_least_recently_used() {
        let mut cache = RasterCache::new(2);
        cache.put(key(1), raster());
        cache.put(key(2), raster());
        // Touch 1 so 2 becomes the eviction candidate.
        assert!(cache.get(&key(1)).is_some());
        cache.put(key(3), raster());
        assert!(cache.get(&key(2)).is_none());
        assert!(cache.get(&key(1)).is_some());
        assert!(cache.get(&key(3)).is_some());
        assert_eq!(cache.stats().entries, 2);
    }

    #[test]
    fn hit_count_tracks_per_entry_use() {
        let mut cache = RasterCache::new(4);
        cache.put(key(1), raster());
        cache.get(&key(1));
        cache.get(&key(1));
        assert_eq!(cache.hit_count(&key(1)), Some(2));
    }
}
