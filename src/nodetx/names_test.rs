use super::*;

#[test]
fn test_hash_name_is_deterministic() {
    assert_eq!(hash_name("foo"), hash_name("foo"));
    assert_ne!(hash_name("foo"), hash_name("bar"));
}

#[test]
fn test_hash_name_never_collides_with_sentinel() {
    assert!(hash_name("") >= 0);
    assert!(hash_name("anything") >= 0);
}

#[test]
fn test_cache_remember_and_resolve() {
    let mut dict = NameDictionary::new();
    let key = hash_name("title");
    assert_eq!(dict.resolve_cached(key), None);
    dict.remember(key, "title");
    assert_eq!(dict.resolve_cached(key), Some("title"));
}

#[test]
fn test_resolve_cached_rejects_sentinel() {
    let dict = NameDictionary::new();
    assert_eq!(dict.resolve_cached(-1), None);
}
