use super::*;
use crate::cache::{Config as CacheConfig, PageCache};
use crate::codec::node::{NameNodeDelegate, NodeDelegate, StructNodeDelegate};
use crate::codec::DOCUMENT_NODE_KEY;
use crate::pagetree::write::PageWriteTransaction;
use std::sync::Arc;

fn build_doc_with_one_element(resource_path: &std::path::Path, log_path: &std::path::Path) {
    let cache = Arc::new(PageCache::new(CacheConfig::new()));
    let mut wtx = PageWriteTransaction::create(resource_path, 4096, 8, 4, 100, 1, cache, log_path).unwrap();

    let elem_key = wtx.allocate_node_key();

    let mut root = NodeRecord::document_root(1);
    root.strct = Some(StructNodeDelegate {
        first_child: elem_key,
        left_sibling: NULL_NODE_KEY,
        right_sibling: NULL_NODE_KEY,
        child_count: 1,
        descendant_count: 1,
    });
    let elem = NodeRecord {
        kind: NodeKind::Element,
        node: NodeDelegate::new(elem_key, DOCUMENT_NODE_KEY, 1),
        strct: Some(StructNodeDelegate::empty()),
        name: Some(NameNodeDelegate { prefix_key: -1, local_name_key: 7, uri_key: -1, path_node_key: NULL_NODE_KEY }),
        val: None,
        avl: None,
        elem: Some(crate::codec::node::ElementDelegate::empty()),
        index_root: None,
        path: None,
    };

    wtx.put_record(IndexFamily::Record, DOCUMENT_NODE_KEY, root).unwrap();
    wtx.put_record(IndexFamily::Record, elem_key, elem).unwrap();
    wtx.commit(1).unwrap();
}

#[test]
fn test_cursor_navigates_parent_and_child() {
    let dir = tempfile::tempdir().unwrap();
    let resource_path = dir.path().join("r.sirix");
    let log_path = dir.path().join("r.txlog");
    build_doc_with_one_element(&resource_path, &log_path);

    let cache = Arc::new(PageCache::new(CacheConfig::new()));
    let mut rtx = PageReadTransaction::begin(&resource_path, None, 1, cache).unwrap();
    let mut cursor = ResourceCursor::new(&mut rtx, DOCUMENT_NODE_KEY).unwrap();

    assert_eq!(cursor.kind(), NodeKind::DocumentRoot);
    assert!(cursor.move_to_first_child().unwrap());
    assert_eq!(cursor.kind(), NodeKind::Element);
    assert_eq!(cursor.name().unwrap().1, 7);
    assert!(!cursor.has_left_sibling());
    assert!(!cursor.has_first_child());

    assert!(cursor.move_to_parent().unwrap());
    assert_eq!(cursor.node_key(), DOCUMENT_NODE_KEY);
}

#[test]
fn test_move_to_null_returns_false() {
    let dir = tempfile::tempdir().unwrap();
    let resource_path = dir.path().join("r.sirix");
    let log_path = dir.path().join("r.txlog");
    build_doc_with_one_element(&resource_path, &log_path);

    let cache = Arc::new(PageCache::new(CacheConfig::new()));
    let mut rtx = PageReadTransaction::begin(&resource_path, None, 1, cache).unwrap();
    let mut cursor = ResourceCursor::new(&mut rtx, DOCUMENT_NODE_KEY).unwrap();
    assert!(!cursor.move_to_parent().unwrap());
    assert_eq!(cursor.node_key(), DOCUMENT_NODE_KEY);
}
