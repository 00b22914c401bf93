//! End-to-end scenarios S1-S6.

use std::sync::Arc;

use sirix_core::avl::SearchMode;
use sirix_core::cache::{Config as CacheConfig, PageCache};
use sirix_core::codec::{IndexFamily, DOCUMENT_NODE_KEY, NULL_NODE_KEY};
use sirix_core::nodetx::{Config as NodeTxConfig, NodeWriteTransaction, QName};
use sirix_core::pagetree::read::PageReadTransaction;

fn new_cache() -> Arc<PageCache> {
    Arc::new(PageCache::new(CacheConfig::new()))
}

fn new_wtx(dir: &std::path::Path, resource_id: u32) -> NodeWriteTransaction {
    NodeWriteTransaction::create(
        dir.join("r.sirix"),
        4096,
        8,
        4,
        100,
        resource_id,
        new_cache(),
        dir.join("r.txlog"),
        NodeTxConfig::default(),
    )
    .unwrap()
}

#[test]
fn s1_insert_single_element_as_document_child() {
    let dir = tempfile::tempdir().unwrap();
    let mut wtx = new_wtx(dir.path(), 1);

    let a = wtx.insert_element_as_first_child(DOCUMENT_NODE_KEY, QName::local("a")).unwrap();
    let revision = wtx.commit(0).unwrap();
    assert_eq!(revision, 1);

    let mut rtx = PageReadTransaction::begin(dir.path().join("r.sirix"), Some(1), 1, new_cache()).unwrap();
    let doc = rtx.get_record(DOCUMENT_NODE_KEY).unwrap().unwrap();
    assert_eq!(doc.strct.as_ref().unwrap().child_count, 1);

    let a_rec = rtx.get_record(a).unwrap().unwrap();
    assert_eq!(a_rec.node.parent_key, DOCUMENT_NODE_KEY);
    assert_eq!(a_rec.strct.as_ref().unwrap().left_sibling, NULL_NODE_KEY);
    assert_eq!(a_rec.strct.as_ref().unwrap().right_sibling, NULL_NODE_KEY);
    assert_eq!(a_rec.strct.as_ref().unwrap().first_child, NULL_NODE_KEY);
    assert_eq!(a_rec.strct.as_ref().unwrap().descendant_count, 0);
}

#[test]
fn s2_remove_is_invisible_to_earlier_revision() {
    let dir = tempfile::tempdir().unwrap();
    let mut wtx = new_wtx(dir.path(), 1);

    let a = wtx.insert_element_as_first_child(DOCUMENT_NODE_KEY, QName::local("a")).unwrap();
    let b = wtx.insert_element_as_first_child(a, QName::local("b")).unwrap();
    let c = wtx.insert_element_as_right_sibling(b, QName::local("c")).unwrap();
    let rev1 = wtx.commit(0).unwrap();

    wtx.remove(b).unwrap();
    let rev2 = wtx.commit(0).unwrap();
    assert!(rev2 > rev1);

    let path = dir.path().join("r.sirix");
    let mut rtx1 = PageReadTransaction::begin(&path, Some(rev1), 1, new_cache()).unwrap();
    let a_rev1 = rtx1.get_record(a).unwrap().unwrap();
    assert_eq!(a_rev1.strct.as_ref().unwrap().child_count, 2);

    let mut rtx2 = PageReadTransaction::begin(&path, Some(rev2), 1, new_cache()).unwrap();
    let a_rev2 = rtx2.get_record(a).unwrap().unwrap();
    assert_eq!(a_rev2.strct.as_ref().unwrap().child_count, 1);
    let c_rev2 = rtx2.get_record(c).unwrap().unwrap();
    assert_eq!(c_rev2.strct.as_ref().unwrap().left_sibling, NULL_NODE_KEY);
}

#[test]
fn s3_cas_index_equal_and_greater() {
    let dir = tempfile::tempdir().unwrap();
    let mut wtx = new_wtx(dir.path(), 1);

    let a = wtx.insert_element_as_first_child(DOCUMENT_NODE_KEY, QName::local("a")).unwrap();
    let b1 = wtx.insert_element_as_first_child(a, QName::local("b")).unwrap();
    let t1 = wtx.insert_text_as_first_child(b1, b"x").unwrap();
    let b2 = wtx.insert_element_as_right_sibling(b1, QName::local("b")).unwrap();
    let t2 = wtx.insert_text_as_first_child(b2, b"y").unwrap();
    let b3 = wtx.insert_element_as_right_sibling(b2, QName::local("b")).unwrap();
    let t3 = wtx.insert_text_as_first_child(b3, b"x").unwrap();

    let mut equal_x = wtx.search_index(IndexFamily::Cas, b"x", SearchMode::Equal).unwrap().unwrap();
    equal_x.sort();
    let mut expected = vec![t1, t3];
    expected.sort();
    assert_eq!(equal_x, expected);

    let greater_x = wtx.search_index(IndexFamily::Cas, b"x", SearchMode::Greater).unwrap().unwrap();
    assert_eq!(greater_x, vec![t2]);
}

#[test]
fn s4_move_into_own_descendant_fails_and_state_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("r.sirix");
    let mut wtx = new_wtx(dir.path(), 1);

    let root = wtx.insert_element_as_first_child(DOCUMENT_NODE_KEY, QName::local("root")).unwrap();
    let mid = wtx.insert_element_as_first_child(root, QName::local("mid")).unwrap();
    let seven = wtx.insert_element_as_first_child(mid, QName::local("seven")).unwrap();
    let three = wtx.insert_element_as_first_child(seven, QName::local("three")).unwrap();

    let result = wtx.move_subtree_to_first_child(seven, three);
    assert!(result.is_err());
    wtx.validate_invariants().unwrap();
    wtx.commit(0).unwrap();

    let mut rtx = PageReadTransaction::begin(&path, None, 1, new_cache()).unwrap();
    let three_rec = rtx.get_record(three).unwrap().unwrap();
    assert_eq!(three_rec.node.parent_key, seven);
    let seven_rec = rtx.get_record(seven).unwrap().unwrap();
    assert_eq!(seven_rec.strct.as_ref().unwrap().first_child, three);
}

#[test]
fn s5_ten_thousand_text_nodes_round_trip_and_file_size() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("r.sirix");
    let mut wtx = NodeWriteTransaction::create(
        path.clone(),
        4096,
        128,
        8,
        100,
        1,
        new_cache(),
        dir.path().join("r.txlog"),
        NodeTxConfig::default(),
    )
    .unwrap();

    let root = wtx.insert_element_as_first_child(DOCUMENT_NODE_KEY, QName::local("root")).unwrap();
    let value = b"123456789012"; // 12 bytes
    assert_eq!(value.len(), 12);

    let mut keys = Vec::with_capacity(10_000);
    let mut prev = wtx.insert_text_as_first_child(root, value).unwrap();
    keys.push(prev);
    for _ in 1..10_000 {
        let key = wtx.insert_text_as_right_sibling(prev, value).unwrap();
        keys.push(key);
        prev = key;
    }
    wtx.commit(0).unwrap();

    let uncompressed = 10_000u64 * value.len() as u64;
    let file_size = std::fs::metadata(&path).unwrap().len();
    assert!(file_size < (uncompressed as f64 * 1.5) as u64 || file_size < 50 * 1024 * 1024);

    let mut rtx = PageReadTransaction::begin(&path, None, 1, new_cache()).unwrap();
    for key in keys {
        let rec = rtx.get_record(key).unwrap().unwrap();
        assert_eq!(rec.val.unwrap().value, value);
    }
}

#[test]
fn s6_reader_isolated_from_later_commit() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("r.sirix");
    let mut wtx = new_wtx(dir.path(), 1);

    let root = wtx.insert_element_as_first_child(DOCUMENT_NODE_KEY, QName::local("root")).unwrap();
    let mut keys = Vec::new();
    let mut prev = wtx.insert_element_as_first_child(root, QName::local("n")).unwrap();
    keys.push(prev);
    for _ in 1..500 {
        let key = wtx.insert_element_as_right_sibling(prev, QName::local("n")).unwrap();
        keys.push(key);
        prev = key;
    }
    let pinned_revision = wtx.commit(0).unwrap();

    let mut reader = PageReadTransaction::begin(&path, Some(pinned_revision), 1, new_cache()).unwrap();
    let mut snapshot = Vec::new();
    for &key in &keys {
        snapshot.push(reader.get_record(key).unwrap().unwrap());
    }

    for &key in &keys {
        wtx.remove(key).unwrap();
    }
    wtx.commit(0).unwrap();

    for (key, before) in keys.iter().zip(snapshot.iter()) {
        let rec = reader.get_record(*key).unwrap().unwrap();
        assert_eq!(rec.node.node_key, before.node.node_key);
        assert_eq!(rec.node.parent_key, before.node.parent_key);
        assert!(!rec.is_tombstone());
    }
}
