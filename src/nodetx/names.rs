//! QName interning for [super::NodeWriteTransaction]. Keys are a
//! content hash of the string (spec.md §3.1), so they are stable across
//! reopen and never reused for a different string; [super::NodeWriteTransaction]
//! persists the string<->key mapping into the `NameDict` family so
//! readers can resolve a key back to its string after the writer closes
//! (spec.md §4.1 `get_name`).

use std::collections::HashMap;

const FNV_OFFSET: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// A qualified name: `local` is mandatory, `prefix`/`uri` are absent
/// for unqualified names (spec.md §3.2 `NameNodeDelegate`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QName {
    pub prefix: Option<String>,
    pub local: String,
    pub uri: Option<String>,
}

impl QName {
    pub fn local(local: impl Into<String>) -> Self {
        QName { prefix: None, local: local.into(), uri: None }
    }

    pub fn with_uri(local: impl Into<String>, uri: impl Into<String>) -> Self {
        QName { prefix: None, local: local.into(), uri: Some(uri.into()) }
    }
}

/// Content-addressed key for `s`: a 32-bit FNV-1a hash, masked to stay
/// non-negative so it never collides with the `-1` "absent" sentinel
/// [crate::codec::node::NameNodeDelegate] uses.
pub fn hash_name(s: &str) -> i32 {
    let mut h = FNV_OFFSET;
    for &b in s.as_bytes() {
        h ^= b as u32;
        h = h.wrapping_mul(FNV_PRIME);
    }
    (h & 0x7fff_ffff) as i32
}

/// In-memory cache over the persisted name dictionary: every key this
/// process has already interned or resolved this session, so repeated
/// use of the same name doesn't round-trip through the page tree. Keys
/// are deterministic (spec.md §3.1), so the cache never needs
/// invalidating across a reopen — a cache miss just means falling
/// through to the persisted `NameDict` family.
#[derive(Default)]
pub struct NameDictionary {
    cache: HashMap<i32, String>,
}

impl NameDictionary {
    pub fn new() -> Self {
        NameDictionary { cache: HashMap::new() }
    }

    /// Key `s` would intern to, without touching the cache or the page
    /// tree.
    pub fn key_for(&self, s: &str) -> i32 {
        hash_name(s)
    }

    /// Record that `key` resolves to `s`, for [Self::resolve] to find
    /// without a page-tree read.
    pub fn remember(&mut self, key: i32, s: &str) {
        self.cache.entry(key).or_insert_with(|| s.to_string());
    }

    /// Resolve a key already known to this cache. Returns `None` on a
    /// cache miss — the caller falls back to the persisted dictionary,
    /// not to "name never existed".
    pub fn resolve_cached(&self, key: i32) -> Option<&str> {
        if key < 0 {
            return None;
        }
        self.cache.get(&key).map(|s| s.as_str())
    }
}

#[cfg(test)]
#[path = "names_test.rs"]
mod names_test;
