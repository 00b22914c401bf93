use super::*;
use crate::codec::page::UberPage;

fn key(offset: u64) -> PageCacheKey {
    PageCacheKey { resource: 1, kind: PageKind::Uber, level: 0, index: 0, offset }
}

#[test]
fn test_put_then_get_hits() {
    let cache = PageCache::new(Config::new());
    let page = Page::Uber(UberPage::empty());
    cache.put(key(10), page.clone());
    assert_eq!(cache.get(&key(10)), Some(page));
    let stats = cache.to_stats();
    assert_eq!(stats.hits, 1);
}

#[test]
fn test_miss_on_unknown_key() {
    let cache = PageCache::new(Config::new());
    assert_eq!(cache.get(&key(999)), None);
    assert_eq!(cache.to_stats().misses, 1);
}

#[test]
fn test_invalidate_removes_entry() {
    let cache = PageCache::new(Config::new());
    let page = Page::Uber(UberPage::empty());
    cache.put(key(1), page);
    cache.invalidate(&key(1));
    assert_eq!(cache.get(&key(1)), None);
}

#[test]
fn test_small_capacity_evicts() {
    let mut config = Config::new();
    config.set_capacity(1).set_shards(1);
    let cache = PageCache::new(config);
    cache.put(key(1), Page::Uber(UberPage::empty()));
    cache.put(key(2), Page::Uber(UberPage::empty()));
    assert_eq!(cache.get(&key(1)), None);
    assert!(cache.get(&key(2)).is_some());
}
