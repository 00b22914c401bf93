//! Property 5 (spec.md §8): a reader pinned at revision `R` sees
//! identical bytes for every key before and after a concurrent commit
//! that mutates arbitrary nodes, including inserts, removes and value
//! edits mixed together.

use std::sync::Arc;

use sirix_core::cache::{Config as CacheConfig, PageCache};
use sirix_core::codec::DOCUMENT_NODE_KEY;
use sirix_core::nodetx::{Config as NodeTxConfig, NodeWriteTransaction, QName};
use sirix_core::pagetree::read::PageReadTransaction;

fn new_cache() -> Arc<PageCache> {
    Arc::new(PageCache::new(CacheConfig::new()))
}

#[test]
fn pinned_reader_unaffected_by_inserts_removes_and_edits() {
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

    let root = wtx.insert_element_as_first_child(DOCUMENT_NODE_KEY, QName::local("root")).unwrap();
    let keep_a = wtx.insert_element_as_first_child(root, QName::local("keep")).unwrap();
    let keep_text = wtx.insert_text_as_first_child(keep_a, b"stable").unwrap();
    let to_remove = wtx.insert_element_as_right_sibling(keep_a, QName::local("gone")).unwrap();
    let to_edit = wtx.insert_element_as_right_sibling(to_remove, QName::local("edited")).unwrap();
    let to_edit_text = wtx.insert_text_as_first_child(to_edit, b"before").unwrap();
    let pinned_revision = wtx.commit(0).unwrap();

    let mut reader = PageReadTransaction::begin(&path, Some(pinned_revision), 1, new_cache()).unwrap();
    let before_root = reader.get_record(root).unwrap().unwrap();
    let before_keep = reader.get_record(keep_a).unwrap().unwrap();
    let before_keep_text = reader.get_record(keep_text).unwrap().unwrap();
    let before_edit = reader.get_record(to_edit).unwrap().unwrap();
    let before_edit_text = reader.get_record(to_edit_text).unwrap().unwrap();
    let before_removed = reader.get_record(to_remove).unwrap().unwrap();
    assert_eq!(before_removed.strct.as_ref().unwrap().left_sibling, keep_a);

    // Concurrent-equivalent mutation: the single writer commits a new
    // revision that removes, edits and inserts after the reader pinned.
    wtx.remove(to_remove).unwrap();
    wtx.set_value(to_edit_text, b"after".to_vec()).unwrap();
    let new_sibling = wtx.insert_element_as_right_sibling(to_edit, QName::local("fresh")).unwrap();
    let _ = new_sibling;
    wtx.commit(0).unwrap();

    assert_eq!(reader.get_record(root).unwrap().unwrap(), before_root);
    assert_eq!(reader.get_record(keep_a).unwrap().unwrap(), before_keep);
    assert_eq!(reader.get_record(keep_text).unwrap().unwrap(), before_keep_text);
    assert_eq!(reader.get_record(to_edit).unwrap().unwrap(), before_edit);
    assert_eq!(reader.get_record(to_edit_text).unwrap().unwrap(), before_edit_text);
    assert_eq!(reader.get_record(to_remove).unwrap().unwrap(), before_removed);
}
