use super::*;

#[test]
fn test_create_and_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("resource.sirix");
    let os_path: ffi::OsString = path.into_os_string();

    {
        let mut fd = create_file_rw(&os_path).unwrap();
        sync_write(&mut fd, b"hello").unwrap();
    }

    let mut fd = open_file_rw(&os_path).unwrap();
    use std::io::{Read, Seek, SeekFrom};
    fd.seek(SeekFrom::Start(0)).unwrap();
    let mut buf = vec![0u8; 5];
    fd.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"hello");
}

#[test]
fn test_open_file_r_rejects_missing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.sirix");
    let os_path: ffi::OsString = path.into_os_string();
    assert!(open_file_r(&os_path).is_err());
}
