use super::*;
use crate::codec::node::NodeRecord;

#[test]
fn test_indirect_page_roundtrip() {
    let mut page = IndirectPage::new(128);
    page.set(0, Some(10));
    page.set(5, Some(9999));
    let buf = page.encode();
    let got = IndirectPage::decode(&buf).unwrap();
    assert_eq!(got, page);
}

#[test]
fn test_record_page_merge_shadows_older() {
    let mut older = RecordPage::new();
    older.upsert(3, NodeRecord::document_root(1));
    older.upsert(7, NodeRecord::tombstone(7, 1));

    let mut newer = RecordPage::new();
    newer.upsert(3, NodeRecord::tombstone(3, 2));

    let merged = older.merge_newer(&newer);
    assert!(merged.get(3).unwrap().is_tombstone());
    assert!(merged.get(7).unwrap().is_tombstone());
    assert_eq!(merged.len(), 2);
}

#[test]
fn test_record_page_roundtrip() {
    let mut page = RecordPage::new();
    page.upsert(1, NodeRecord::document_root(1));
    page.upsert(2, NodeRecord::tombstone(2, 1));
    let buf = page.encode();
    let got = RecordPage::decode(&buf).unwrap();
    assert_eq!(got, page);
}

#[test]
fn test_record_page_delta_base_roundtrip() {
    let mut page = RecordPage::delta_on(128, 1);
    page.upsert(9, NodeRecord::tombstone(9, 2));
    let buf = page.encode();
    let got = RecordPage::decode(&buf).unwrap();
    assert_eq!(got, page);
    assert_eq!(got.base, Some(128));
    assert_eq!(got.version, 1);
}

#[test]
fn test_revision_root_page_roundtrip() {
    let page = RevisionRootPage {
        revision: 3,
        timestamp_millis: 1_700_000_000_000,
        max_node_key: 42,
        record_root: Some(128),
        name_index_root: None,
        path_index_root: Some(256),
        cas_index_root: None,
        path_summary_root: Some(512),
        name_dict_root: Some(1024),
        full_dump: true,
    };
    let buf = page.encode();
    let got = RevisionRootPage::decode(&buf).unwrap();
    assert_eq!(got, page);
}

#[test]
fn test_uber_page_roundtrip() {
    let page = UberPage { revision_count: 4, max_node_key: 99, revision_index_root: Some(64) };
    let buf = page.encode();
    let got = UberPage::decode(&buf).unwrap();
    assert_eq!(got, page);
}

#[test]
fn test_page_enum_roundtrip() {
    let page = Page::Uber(UberPage::empty());
    let buf = page.encode();
    let got = Page::decode(&buf).unwrap();
    assert_eq!(got, page);
}
