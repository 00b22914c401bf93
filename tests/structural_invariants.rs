//! Properties 4 and 6 (spec.md §8): structural invariants hold after
//! every mutation and after a commit+reopen round trip, and every
//! interior node's `descendant_count` equals `size(subtree) - 1`.

use std::sync::Arc;

use sirix_core::cache::{Config as CacheConfig, PageCache};
use sirix_core::codec::DOCUMENT_NODE_KEY;
use sirix_core::nodetx::{Config as NodeTxConfig, NodeWriteTransaction, QName};
use sirix_core::pagetree::read::PageReadTransaction;
use sirix_core::record::cursor::{NodeCursor, ResourceCursor};

fn new_cache() -> Arc<PageCache> {
    Arc::new(PageCache::new(CacheConfig::new()))
}

/// Counts the subtree size (including `cursor`'s current node) by
/// walking first-child/right-sibling pointers, independent of any
/// stored `descendant_count` field.
fn subtree_size(cursor: &mut ResourceCursor<'_>) -> usize {
    let mut size = 1;
    if cursor.move_to_first_child().unwrap() {
        loop {
            size += subtree_size(cursor);
            if !cursor.move_to_right_sibling().unwrap() {
                break;
            }
        }
        cursor.move_to_parent().unwrap();
    }
    size
}

#[test]
fn descendant_count_matches_actual_subtree_size_after_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("r.sirix");
    let mut wtx = NodeWriteTransaction::create(
        path.clone(),
        4096,
        8,
        4,
        100,
        1,
        new_cache(),
        dir.path().join("r.txlog"),
        NodeTxConfig::default(),
    )
    .unwrap();

    let html = wtx.insert_element_as_first_child(DOCUMENT_NODE_KEY, QName::local("html")).unwrap();
    let head = wtx.insert_element_as_first_child(html, QName::local("head")).unwrap();
    let title = wtx.insert_element_as_first_child(head, QName::local("title")).unwrap();
    let _title_text = wtx.insert_text_as_first_child(title, b"hi").unwrap();
    let body = wtx.insert_element_as_right_sibling(head, QName::local("body")).unwrap();
    let p1 = wtx.insert_element_as_first_child(body, QName::local("p")).unwrap();
    let _p1_text = wtx.insert_text_as_first_child(p1, b"one").unwrap();
    let _p2 = wtx.insert_element_as_right_sibling(p1, QName::local("p")).unwrap();

    wtx.validate_invariants().unwrap();
    wtx.commit(0).unwrap();

    let mut rtx = PageReadTransaction::begin(&path, None, 1, new_cache()).unwrap();
    for &key in &[DOCUMENT_NODE_KEY, html, head, title, body, p1] {
        let mut cursor = ResourceCursor::new(&mut rtx, key).unwrap();
        let stored = cursor.descendant_count();
        let actual = subtree_size(&mut cursor) as i64 - 1;
        assert_eq!(stored, actual, "node {} descendant_count mismatch", key);
    }
}

#[test]
fn invariants_hold_after_reopen_for_further_mutation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("r.sirix");
    let log_path = dir.path().join("r.txlog");
    let cache = new_cache();
    {
        let mut wtx = NodeWriteTransaction::create(
            path.clone(),
            4096,
            8,
            4,
            100,
            1,
            Arc::clone(&cache),
            log_path.clone(),
            NodeTxConfig::default(),
        )
        .unwrap();
        let a = wtx.insert_element_as_first_child(DOCUMENT_NODE_KEY, QName::local("a")).unwrap();
        wtx.insert_element_as_first_child(a, QName::local("b")).unwrap();
        wtx.commit(0).unwrap();
    }

    let mut wtx = NodeWriteTransaction::open(path, 1, Arc::clone(&cache), log_path, NodeTxConfig::default()).unwrap();
    wtx.validate_invariants().unwrap();
    let c = wtx.insert_element_as_first_child(DOCUMENT_NODE_KEY, QName::local("c")).unwrap();
    wtx.insert_text_as_first_child(c, b"late").unwrap();
    wtx.validate_invariants().unwrap();
}

/// Name keys are content hashes (spec.md §3.1): two elements named
/// "p" anywhere in the tree or across a reopen must resolve to the
/// very same key, never collide with a different string's key, and
/// must still be resolvable by a reader once the writer that interned
/// them is gone (spec.md §4.1 `get_name`).
#[test]
fn name_keys_are_stable_unique_and_resolvable_after_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("r.sirix");
    let log_path = dir.path().join("r.txlog");
    let cache = new_cache();

    let (p1, p2, div, div_key, p_key) = {
        let mut wtx = NodeWriteTransaction::create(
            path.clone(),
            4096,
            8,
            4,
            100,
            1,
            Arc::clone(&cache),
            log_path.clone(),
            NodeTxConfig::default(),
        )
        .unwrap();
        let p1 = wtx.insert_element_as_first_child(DOCUMENT_NODE_KEY, QName::local("p")).unwrap();
        let div = wtx.insert_element_as_right_sibling(p1, QName::local("div")).unwrap();
        let p2 = wtx.insert_element_as_first_child(div, QName::local("p")).unwrap();
        wtx.validate_invariants().unwrap();
        let div_key = wtx.name_key_of(div).unwrap().unwrap();
        let p_key = wtx.name_key_of(p1).unwrap().unwrap();
        wtx.commit(0).unwrap();
        (p1, p2, div, div_key, p_key)
    };

    let mut wtx = NodeWriteTransaction::open(path.clone(), 1, Arc::clone(&cache), log_path, NodeTxConfig::default()).unwrap();
    let p1_key_after_reopen = wtx.name_key_of(p1).unwrap().unwrap();
    assert_eq!(p1_key_after_reopen, p_key, "name key for \"p\" must survive reopen unchanged");
    let p3 = wtx.insert_element_as_first_child(DOCUMENT_NODE_KEY, QName::local("p")).unwrap();
    assert_eq!(wtx.name_key_of(p3).unwrap().unwrap(), p_key, "every \"p\" element shares one content-addressed key");
    let div_key_after = wtx.name_key_of(div).unwrap().unwrap();
    assert_eq!(div_key_after, div_key, "name key for \"div\" must survive reopen unchanged");
    assert_ne!(p_key, div_key, "distinct strings must never share a name key");
    drop(wtx);

    let mut rtx = PageReadTransaction::begin(&path, None, 1, Arc::clone(&cache)).unwrap();
    assert_eq!(rtx.get_name(p_key).unwrap().as_deref(), Some("p"));
    assert_eq!(rtx.get_name(div_key).unwrap().as_deref(), Some("div"));
    let _ = p2;
}
