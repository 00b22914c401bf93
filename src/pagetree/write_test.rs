use super::*;
use crate::cache::Config as CacheConfig;
use crate::codec::node::NodeRecord;
use crate::pagetree::read::PageReadTransaction;

fn new_cache() -> Arc<PageCache> {
    Arc::new(PageCache::new(CacheConfig::new()))
}

#[test]
fn test_create_put_commit_then_read_back() {
    let dir = tempfile::tempdir().unwrap();
    let resource_path = dir.path().join("r.sirix");
    let log_path = dir.path().join("r.txlog");

    let mut wtx = PageWriteTransaction::create(
        resource_path.clone(),
        4096,
        8,
        4,
        100,
        1,
        new_cache(),
        log_path.clone(),
    )
    .unwrap();

    let key = wtx.allocate_node_key();
    wtx.put_record(IndexFamily::Record, key, NodeRecord::document_root(1)).unwrap();
    let revision = wtx.commit(1_700_000_000_000).unwrap();
    assert_eq!(revision, 1);

    let mut rtx = PageReadTransaction::begin(&resource_path, None, 1, new_cache()).unwrap();
    assert_eq!(rtx.revision(), 1);
    let got = rtx.get_record(key).unwrap().unwrap();
    assert_eq!(got, NodeRecord::document_root(1));
}

#[test]
fn test_second_revision_preserves_first() {
    let dir = tempfile::tempdir().unwrap();
    let resource_path = dir.path().join("r.sirix");
    let log_path = dir.path().join("r.txlog");
    let cache = new_cache();

    let mut wtx =
        PageWriteTransaction::create(resource_path.clone(), 4096, 8, 4, 100, 1, cache.clone(), log_path.clone())
            .unwrap();
    let key0 = wtx.allocate_node_key();
    wtx.put_record(IndexFamily::Record, key0, NodeRecord::document_root(1)).unwrap();
    wtx.commit(1).unwrap();

    let mut wtx2 = PageWriteTransaction::open(resource_path.clone(), 1, cache.clone(), log_path.clone()).unwrap();
    let key1 = wtx2.allocate_node_key();
    assert_eq!(key1, key0 + 1);
    wtx2.put_record(IndexFamily::Record, key1, NodeRecord::tombstone(key1, 2)).unwrap();
    let rev2 = wtx2.commit(2).unwrap();
    assert_eq!(rev2, 2);

    let mut rtx1 = PageReadTransaction::begin(&resource_path, Some(1), 1, cache.clone()).unwrap();
    assert!(rtx1.get_record(key1).unwrap().is_none());
    assert_eq!(rtx1.get_record(key0).unwrap().unwrap(), NodeRecord::document_root(1));

    let mut rtx2 = PageReadTransaction::begin(&resource_path, Some(2), 1, cache).unwrap();
    assert!(rtx2.get_record(key1).unwrap().unwrap().is_tombstone());
    assert_eq!(rtx2.get_record(key0).unwrap().unwrap(), NodeRecord::document_root(1));
}

#[test]
fn test_many_records_across_buckets() {
    let dir = tempfile::tempdir().unwrap();
    let resource_path = dir.path().join("r.sirix");
    let log_path = dir.path().join("r.txlog");
    let cache = new_cache();

    let mut wtx =
        PageWriteTransaction::create(resource_path.clone(), 4096, 8, 4, 100, 1, cache.clone(), log_path).unwrap();
    let mut keys = vec![];
    for _ in 0..50 {
        let key = wtx.allocate_node_key();
        wtx.put_record(IndexFamily::Record, key, NodeRecord::document_root(1)).unwrap();
        keys.push(key);
    }
    wtx.commit(1).unwrap();

    let mut rtx = PageReadTransaction::begin(&resource_path, None, 1, cache).unwrap();
    for key in keys {
        assert!(rtx.get_record(key).unwrap().is_some());
    }
}
