use super::*;

#[test]
fn test_header_roundtrip() {
    let mut header = Header::new(4096, 128, 4, 100);
    header.uber_offset = 123_456;
    let buf = header.encode();
    assert_eq!(buf.len(), HEADER_SIZE as usize);
    let got = Header::decode(&buf).unwrap();
    assert_eq!(got, header);
}

#[test]
fn test_bad_magic_rejected() {
    let mut buf = Header::new(4096, 128, 4, 100).encode();
    buf[0] = b'X';
    assert!(Header::decode(&buf).is_err());
}

#[test]
fn test_unsupported_version_rejected() {
    let mut buf = Header::new(4096, 128, 4, 100).encode();
    buf[8..12].copy_from_slice(&99u32.to_be_bytes());
    assert!(Header::decode(&buf).is_err());
}
