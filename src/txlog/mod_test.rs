use super::*;
use crate::codec::page::UberPage;

#[test]
fn test_put_get_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let mut log = TransactionLog::create(dir.path().join("tx.log"), Config::new()).unwrap();

    let page = Page::Uber(UberPage::empty());
    log.put(LogKey::Uber, page.clone()).unwrap();
    assert_eq!(log.get(&LogKey::Uber), Some(&page));
    assert_eq!(log.to_stats().puts, 1);
}

#[test]
fn test_delete_removes_from_index() {
    let dir = tempfile::tempdir().unwrap();
    let mut log = TransactionLog::create(dir.path().join("tx.log"), Config::new()).unwrap();
    log.put(LogKey::Uber, Page::Uber(UberPage::empty())).unwrap();
    log.delete(&LogKey::Uber);
    assert_eq!(log.get(&LogKey::Uber), None);
}

#[test]
fn test_clear_truncates() {
    let dir = tempfile::tempdir().unwrap();
    let mut log = TransactionLog::create(dir.path().join("tx.log"), Config::new()).unwrap();
    log.put(LogKey::Uber, Page::Uber(UberPage::empty())).unwrap();
    log.sync().unwrap();
    log.clear().unwrap();
    assert_eq!(log.get(&LogKey::Uber), None);
    assert_eq!(log.iter().count(), 0);
}
