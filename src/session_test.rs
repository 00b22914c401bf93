use super::*;
use crate::nodetx::QName;
use crate::Error;

#[test]
fn test_create_then_reopen_resource() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path(), CacheConfig::new()).unwrap();

    let resource = db.create_resource("docs", ResourceConfig::default()).unwrap();
    {
        let mut writer = resource.open_writer(NodeTxConfig::default()).unwrap();
        writer.insert_element_as_first_child(crate::codec::DOCUMENT_NODE_KEY, QName::local("root")).unwrap();
        writer.commit(0).unwrap();
    }

    let reopened = db.open_resource("docs").unwrap();
    let mut reader = reopened.open_reader(None).unwrap();
    assert_eq!(reader.revision(), 2);
}

#[test]
fn test_second_writer_rejected_while_first_is_open() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path(), CacheConfig::new()).unwrap();
    let resource = db.create_resource("docs", ResourceConfig::default()).unwrap();

    let _first = resource.open_writer(NodeTxConfig::default()).unwrap();
    let second = resource.open_writer(NodeTxConfig::default());
    assert!(matches!(second, Err(Error::InvariantViolation(_, _))));
}

#[test]
fn test_writer_slot_frees_on_drop() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path(), CacheConfig::new()).unwrap();
    let resource = db.create_resource("docs", ResourceConfig::default()).unwrap();

    {
        let _writer = resource.open_writer(NodeTxConfig::default()).unwrap();
    }
    let second = resource.open_writer(NodeTxConfig::default());
    assert!(second.is_ok());
}

#[test]
fn test_readers_coexist_with_writer() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path(), CacheConfig::new()).unwrap();
    let resource = db.create_resource("docs", ResourceConfig::default()).unwrap();

    let _writer = resource.open_writer(NodeTxConfig::default()).unwrap();
    let reader_a = resource.open_reader(None).unwrap();
    let reader_b = resource.open_reader(None).unwrap();
    assert_eq!(resource.reader_count(), 2);
    drop(reader_a);
    drop(reader_b);
    assert_eq!(resource.reader_count(), 0);
}

#[test]
fn test_create_duplicate_resource_name_fails() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path(), CacheConfig::new()).unwrap();
    db.create_resource("docs", ResourceConfig::default()).unwrap();
    let again = db.create_resource("docs", ResourceConfig::default());
    assert!(matches!(again, Err(Error::InvariantViolation(_, _))));
}
