//! Bounded in-memory page cache (spec.md §4.3), keyed by
//! `(resource, page_kind, level, index, offset)` as spec.md specifies so
//! that two different index families (or two levels of the same
//! family) never collide even if they happen to share a numeric
//! offset. Grounded in `rdms::clru`'s `Config`/`Stats` shape, but
//! implemented with a safe `parking_lot::Mutex<lru::LruCache<..>>`
//! instead of `clru`'s hand-rolled lock-free structure, which depends
//! on a sibling crate (`cmap`) that isn't a resolvable dependency here.

use lru::LruCache;
use parking_lot::Mutex;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::codec::page::Page;
use crate::codec::PageKind;

/// Cache key: resource ids are assigned by [crate::session::Database],
/// `level`/`index` locate the slot within the page tree for page kinds
/// that aren't leaves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PageCacheKey {
    pub resource: u32,
    pub kind: PageKind,
    pub level: u16,
    pub index: u64,
    pub offset: u64,
}

/// Builder-style configuration, following `rdms::robt::config::Config`
/// and `rdms::wral::Config`.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    capacity: usize,
    shards: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config { capacity: 4096, shards: 16 }
    }
}

impl Config {
    pub fn new() -> Self {
        Config::default()
    }

    pub fn set_capacity(&mut self, capacity: usize) -> &mut Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn set_shards(&mut self, shards: usize) -> &mut Self {
        self.shards = shards.max(1);
        self
    }
}

#[derive(Debug, Default)]
pub struct Stats {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub evictions: u64,
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "hits:{} misses:{} inserts:{} evictions:{}",
            self.hits, self.misses, self.inserts, self.evictions
        )
    }
}

struct Shard {
    lru: Mutex<LruCache<PageCacheKey, Page>>,
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    evictions: AtomicU64,
}

/// Sharded LRU cache of decoded pages. Sharding by key hash (rather
/// than one global mutex) keeps concurrent readers from serializing on
/// the same lock (spec.md §9 locking guidance).
pub struct PageCache {
    shards: Vec<Shard>,
}

impl PageCache {
    pub fn new(config: Config) -> Self {
        let per_shard = (config.capacity / config.shards).max(1);
        let cap = NonZeroUsize::new(per_shard).unwrap();
        let shards = (0..config.shards)
            .map(|_| Shard {
                lru: Mutex::new(LruCache::new(cap)),
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                inserts: AtomicU64::new(0),
                evictions: AtomicU64::new(0),
            })
            .collect();
        PageCache { shards }
    }

    fn shard_for(&self, key: &PageCacheKey) -> &Shard {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        key.hash(&mut hasher);
        let idx = (hasher.finish() as usize) % self.shards.len();
        &self.shards[idx]
    }

    pub fn get(&self, key: &PageCacheKey) -> Option<Page> {
        let shard = self.shard_for(key);
        let mut lru = shard.lru.lock();
        match lru.get(key) {
            Some(page) => {
                shard.hits.fetch_add(1, Ordering::Relaxed);
                Some(page.clone())
            }
            None => {
                shard.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn put(&self, key: PageCacheKey, page: Page) {
        let shard = self.shard_for(&key);
        let mut lru = shard.lru.lock();
        shard.inserts.fetch_add(1, Ordering::Relaxed);
        if lru.len() == lru.cap().get() && !lru.contains(&key) {
            shard.evictions.fetch_add(1, Ordering::Relaxed);
        }
        lru.put(key, page);
    }

    pub fn invalidate(&self, key: &PageCacheKey) {
        let shard = self.shard_for(key);
        shard.lru.lock().pop(key);
    }

    pub fn to_stats(&self) -> Stats {
        let mut stats = Stats::default();
        for shard in &self.shards {
            stats.hits += shard.hits.load(Ordering::Relaxed);
            stats.misses += shard.misses.load(Ordering::Relaxed);
            stats.inserts += shard.inserts.load(Ordering::Relaxed);
            stats.evictions += shard.evictions.load(Ordering::Relaxed);
        }
        stats
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod mod_test;
