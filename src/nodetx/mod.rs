//! Translates XQuery-shaped mutations into record operations (spec.md
//! §4.8). Grounded in `rdms::llrb::index::Index::{set,insert,remove,
//! write}`'s single-writer-lock + translate-to-page-ops +
//! auto-commit-on-threshold shape; the threshold itself is a
//! `Footprint`-style dirty-mutation counter, the way `rdms::db::Entry::
//! footprint` drives `rdms`'s own write-back policy.

pub mod names;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::avl::{AvlStore, AvlTree, References, SearchMode};
use crate::cache::PageCache;
use crate::codec::node::{
    AvlNodeDelegate, ElementDelegate, NameNodeDelegate, NodeDelegate, NodeKind, NodeRecord,
    StructNodeDelegate, ValNodeDelegate,
};
use crate::codec::{IndexFamily, DOCUMENT_NODE_KEY, NULL_NODE_KEY};
use crate::pagetree::read::PageReadTransaction;
use crate::pagetree::write::PageWriteTransaction;
use crate::Result;

pub use names::{NameDictionary, QName};

/// Node key of the fixed [crate::codec::node::NodeKind::IndexRoot]
/// pointer record within each index family (spec.md §4.6; DESIGN.md).
const INDEX_ROOT_KEY: i64 = 0;

fn opt(key: i64) -> Option<i64> {
    if key == NULL_NODE_KEY {
        None
    } else {
        Some(key)
    }
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut h = FNV_OFFSET;
    for &b in bytes {
        h ^= b as u64;
        h = h.wrapping_mul(FNV_PRIME);
    }
    h
}

/// A node's own content hash — kind tag plus name keys plus value
/// bytes, deliberately excluding children. Structural and value
/// changes propagate as an XOR delta up the ancestor chain
/// (`propagate_hash_delta`) rather than recomputing every ancestor from
/// scratch, so each ancestor's `hash` field ends up holding the XOR of
/// its own content hash with every live descendant's (spec.md §4.8
/// item 3).
fn content_hash(kind: NodeKind, name: Option<&NameNodeDelegate>, value: Option<&[u8]>) -> u64 {
    let mut buf = vec![kind.tag()];
    if let Some(n) = name {
        buf.extend_from_slice(&n.prefix_key.to_be_bytes());
        buf.extend_from_slice(&n.local_name_key.to_be_bytes());
        buf.extend_from_slice(&n.uri_key.to_be_bytes());
    }
    if let Some(v) = value {
        buf.extend_from_slice(v);
    }
    fnv1a(&buf)
}

/// Adapts one record family of a [PageWriteTransaction] to the
/// storage-agnostic [AvlStore] seam `avl::mod` defines, so the AVL
/// rebalance/search logic never needs to know about pages.
pub struct PageAvlStore<'a> {
    wtx: &'a mut PageWriteTransaction,
    family: IndexFamily,
    revision: u32,
}

impl<'a> PageAvlStore<'a> {
    pub fn new(wtx: &'a mut PageWriteTransaction, family: IndexFamily, revision: u32) -> Self {
        PageAvlStore { wtx, family, revision }
    }
}

impl<'a> AvlStore for PageAvlStore<'a> {
    fn load(&mut self, key: i64) -> Result<Option<AvlNodeDelegate>> {
        Ok(self.wtx.get_record(self.family, key)?.and_then(|r| r.avl))
    }

    fn store(&mut self, key: i64, node: AvlNodeDelegate) -> Result<()> {
        self.wtx.put_record(self.family, key, NodeRecord::avl_node(key, self.revision, node))
    }

    fn delete(&mut self, key: i64) -> Result<()> {
        self.wtx.remove_record(self.family, key)
    }

    fn alloc(&mut self) -> i64 {
        self.wtx.allocate_node_key()
    }
}

/// Auto-commit thresholds (spec.md §4.8 item 5): the write transaction
/// commits on its own once the mutation counter exceeds this.
#[derive(Clone, Debug)]
pub struct Config {
    pub auto_commit_mutations: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config { auto_commit_mutations: 10_000 }
    }
}

impl Config {
    pub fn set_auto_commit_mutations(&mut self, n: usize) -> &mut Self {
        self.auto_commit_mutations = n;
        self
    }
}

/// One long-lived node-level write transaction (spec.md §4.8, §5): at
/// most one exists per resource. Wraps a [PageWriteTransaction] and
/// translates structural mutations into record writes, rolling-hash
/// propagation and secondary-index maintenance. Auto-commit reopens
/// the underlying page write transaction at the freshly committed
/// revision so the same `NodeWriteTransaction` keeps serving callers
/// across many commits, mirroring `rdms::llrb::index::Index`'s single
/// long-lived writer lock.
pub struct NodeWriteTransaction {
    wtx: Option<PageWriteTransaction>,
    path: PathBuf,
    log_path: PathBuf,
    resource_id: u32,
    cache: Arc<PageCache>,
    names: NameDictionary,
    config: Config,
    mutation_count: usize,
}

impl NodeWriteTransaction {
    /// Create a brand-new resource and commit an empty revision 1
    /// containing only the document root.
    pub fn create<P: AsRef<Path>>(
        path: P,
        page_size: u32,
        fan_out: u32,
        window: u32,
        full_dump_every: u32,
        resource_id: u32,
        cache: Arc<PageCache>,
        log_path: P,
        config: Config,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let log_path = log_path.as_ref().to_path_buf();
        let mut wtx = PageWriteTransaction::create(
            &path,
            page_size,
            fan_out,
            window,
            full_dump_every,
            resource_id,
            Arc::clone(&cache),
            &log_path,
        )?;
        wtx.put_record(IndexFamily::Record, DOCUMENT_NODE_KEY, NodeRecord::document_root(wtx.revision()))?;
        log::info!("created resource at {:?}", path);
        Ok(NodeWriteTransaction {
            wtx: Some(wtx),
            path,
            log_path,
            resource_id,
            cache,
            names: NameDictionary::new(),
            config,
            mutation_count: 0,
        })
    }

    /// Open an existing resource for the single writer.
    pub fn open<P: AsRef<Path>>(
        path: P,
        resource_id: u32,
        cache: Arc<PageCache>,
        log_path: P,
        config: Config,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let log_path = log_path.as_ref().to_path_buf();
        let wtx = PageWriteTransaction::open(&path, resource_id, Arc::clone(&cache), &log_path)?;
        log::info!("opened resource {:?} for writing, next revision {}", path, wtx.revision());
        Ok(NodeWriteTransaction {
            wtx: Some(wtx),
            path,
            log_path,
            resource_id,
            cache,
            names: NameDictionary::new(),
            config,
            mutation_count: 0,
        })
    }

    fn wtx(&mut self) -> &mut PageWriteTransaction {
        self.wtx.as_mut().expect("write transaction already closed")
    }

    pub fn revision(&self) -> u32 {
        self.wtx.as_ref().expect("write transaction already closed").revision()
    }

    pub fn names(&self) -> &NameDictionary {
        &self.names
    }

    // -- name dictionary -----------------------------------------------------------

    /// Intern `s`, persisting a `NameDict` entry the first time this key
    /// is seen so any reader can resolve it later (spec.md §4.1
    /// `get_name`). Keys are content hashes (spec.md §3.1), so interning
    /// the same string twice, even across a reopen, yields the same key.
    fn intern_name(&mut self, s: &str) -> Result<i32> {
        let key = self.names.key_for(s);
        self.ensure_name_persisted(key, s)?;
        Ok(key)
    }

    fn intern_name_opt(&mut self, s: Option<&str>) -> Result<i32> {
        match s {
            Some(s) => self.intern_name(s),
            None => Ok(NULL_NODE_KEY as i32),
        }
    }

    /// Persist that `key` (already known, e.g. copied verbatim from
    /// another resource's content-hash key) resolves to `value`, unless
    /// an entry already exists.
    fn ensure_name_persisted(&mut self, key: i32, value: &str) -> Result<()> {
        if self.names.resolve_cached(key).is_some() {
            return Ok(());
        }
        if self.wtx().get_record(IndexFamily::NameDict, key as i64)?.is_some() {
            self.names.remember(key, value);
            return Ok(());
        }
        let revision = self.wtx().revision();
        self.wtx()
            .put_record(IndexFamily::NameDict, key as i64, NodeRecord::name_entry(key as i64, revision, value))?;
        self.names.remember(key, value);
        Ok(())
    }

    /// Resolve `key` back to its string, falling back from this
    /// writer's cache to the persisted `NameDict` family.
    fn resolve_name(&mut self, key: i32) -> Result<Option<String>> {
        if key < 0 {
            return Ok(None);
        }
        if let Some(s) = self.names.resolve_cached(key) {
            return Ok(Some(s.to_string()));
        }
        match self.wtx().get_record(IndexFamily::NameDict, key as i64)? {
            Some(rec) if rec.kind == NodeKind::NameEntry => {
                let s = rec.as_name_entry()?;
                self.names.remember(key, &s);
                Ok(Some(s))
            }
            _ => Ok(None),
        }
    }

    /// Public counterpart to [PageReadTransaction::get_name] for callers
    /// holding only a writer.
    pub fn get_name(&mut self, key: i32) -> Result<Option<String>> {
        self.resolve_name(key)
    }

    /// The content-hash key of `key`'s own local name, if it carries
    /// one (spec.md §3.1).
    pub fn name_key_of(&mut self, key: i64) -> Result<Option<i32>> {
        Ok(self.get(key)?.name.map(|n| n.local_name_key))
    }

    /// Fold every staged change into a new durable revision. Because
    /// writer exclusivity keeps exactly one [NodeWriteTransaction] per
    /// resource alive at a time (spec.md §5), this reopens a fresh
    /// [PageWriteTransaction] against the file it just wrote so the
    /// same handle can keep mutating across many commits.
    pub fn commit(&mut self, timestamp_millis: i64) -> Result<u32> {
        let wtx = self.wtx.take().expect("write transaction already closed");
        let revision = wtx.commit(timestamp_millis)?;
        log::info!("committed revision {}", revision);
        self.mutation_count = 0;
        self.wtx = Some(PageWriteTransaction::open(
            &self.path,
            self.resource_id,
            Arc::clone(&self.cache),
            &self.log_path,
        )?);
        Ok(revision)
    }

    /// Discard every staged change since the last commit (spec.md §5:
    /// the sole cancellation mechanism) and reopen at the revision the
    /// writer began on.
    pub fn abort(&mut self) -> Result<()> {
        let wtx = self.wtx.take().expect("write transaction already closed");
        wtx.abort();
        self.mutation_count = 0;
        self.wtx = Some(PageWriteTransaction::open(
            &self.path,
            self.resource_id,
            Arc::clone(&self.cache),
            &self.log_path,
        )?);
        Ok(())
    }

    fn bump(&mut self) -> Result<()> {
        self.mutation_count += 1;
        if self.mutation_count >= self.config.auto_commit_mutations {
            log::info!("auto-commit threshold reached at {} mutations", self.mutation_count);
            self.commit(0)?;
        }
        Ok(())
    }

    fn get(&mut self, key: i64) -> Result<NodeRecord> {
        match self.wtx().get_record(IndexFamily::Record, key)? {
            Some(r) if !r.is_tombstone() => Ok(r),
            Some(_) => err_at!(KeyNotFound, msg: "node {} is deleted", key),
            None => err_at!(KeyNotFound, msg: "node {} does not exist", key),
        }
    }

    fn put(&mut self, key: i64, rec: NodeRecord) -> Result<()> {
        self.wtx().put_record(IndexFamily::Record, key, rec)
    }

    // -- secondary index helpers -------------------------------------------------

    fn index_put(&mut self, family: IndexFamily, key_bytes: Vec<u8>, reference: i64) -> Result<()> {
        let revision = self.wtx().revision();
        let root = self.wtx().get_record(family, INDEX_ROOT_KEY)?.and_then(|r| r.as_index_root());
        let new_root = {
            let store = PageAvlStore::new(self.wtx(), family, revision);
            let mut tree = AvlTree::with_root(store, root);
            tree.index(&key_bytes, reference)?;
            tree.root()
        };
        self.wtx().put_record(family, INDEX_ROOT_KEY, NodeRecord::index_root_pointer(INDEX_ROOT_KEY, revision, new_root))
    }

    fn index_remove(&mut self, family: IndexFamily, key_bytes: &[u8], reference: i64) -> Result<bool> {
        let revision = self.wtx().revision();
        let root = self.wtx().get_record(family, INDEX_ROOT_KEY)?.and_then(|r| r.as_index_root());
        let (new_root, removed) = {
            let store = PageAvlStore::new(self.wtx(), family, revision);
            let mut tree = AvlTree::with_root(store, root);
            let removed = tree.remove(key_bytes, reference)?;
            (tree.root(), removed)
        };
        self.wtx().put_record(family, INDEX_ROOT_KEY, NodeRecord::index_root_pointer(INDEX_ROOT_KEY, revision, new_root))?;
        Ok(removed)
    }

    /// Search a secondary index directly (exposed for embedders; spec.md
    /// §4.6's five search modes).
    pub fn search_index(&mut self, family: IndexFamily, key_bytes: &[u8], mode: SearchMode) -> Result<Option<Vec<i64>>> {
        let revision = self.wtx().revision();
        let root = self.wtx().get_record(family, INDEX_ROOT_KEY)?.and_then(|r| r.as_index_root());
        let store = PageAvlStore::new(self.wtx(), family, revision);
        let mut tree = AvlTree::with_root(store, root);
        tree.search(key_bytes, mode)
    }

    /// Root-to-`node_key` chain of `local_name_key`s, in document order.
    /// Shared by [Self::path_key_for] (document-tree side) and
    /// [Self::check_named_path_link] (path-summary side) so both walk
    /// the same notion of "path".
    fn name_chain(&mut self, node_key: i64) -> Result<Vec<i32>> {
        let mut chain = Vec::new();
        let mut cur = node_key;
        while cur != NULL_NODE_KEY {
            let rec = self.get(cur)?;
            if let Some(name) = &rec.name {
                chain.push(name.local_name_key);
            }
            cur = rec.node.parent_key;
        }
        chain.reverse();
        Ok(chain)
    }

    /// Builds the root-to-node path key used by the path index: the
    /// big-endian `local_name_key` of every named ancestor, `/`-joined.
    fn path_key_for(&mut self, node_key: i64) -> Result<Vec<u8>> {
        let chain = self.name_chain(node_key)?;
        let mut bytes = Vec::new();
        for k in chain {
            bytes.extend_from_slice(&k.to_be_bytes());
            bytes.push(b'/');
        }
        Ok(bytes)
    }

    // -- path-summary tree -----------------------------------------------------------
    //
    // spec.md §3.3 invariant 5: every named node links to a PathSummary
    // node whose own parent chain mirrors the document's name chain.
    // Content-hash-addressed by `(parent_path_node_key, local_name_key,
    // summarized_kind)`, the same trick fix 1/2 use for name keys, so
    // the tree never needs sibling/child pointers or rebalancing: two
    // document nodes on the same path always resolve to the same
    // PathSummary node instead of allocating a new one.

    fn path_node_hash(parent: i64, local_name_key: i32, kind_tag: u8) -> i64 {
        let mut buf = Vec::with_capacity(13);
        buf.extend_from_slice(&parent.to_be_bytes());
        buf.extend_from_slice(&local_name_key.to_be_bytes());
        buf.push(kind_tag);
        (fnv1a(&buf) & 0x7fff_ffff_ffff_ffff) as i64
    }

    /// The PathSummary node key a node whose own parent is
    /// `parent_key` should link to, or [NULL_NODE_KEY] at the document
    /// root.
    fn parent_path_node_key(&mut self, parent_key: i64) -> Result<i64> {
        if parent_key == NULL_NODE_KEY || parent_key == DOCUMENT_NODE_KEY {
            return Ok(NULL_NODE_KEY);
        }
        let parent = self.get(parent_key)?;
        Ok(parent.name.as_ref().map(|n| n.path_node_key).unwrap_or(NULL_NODE_KEY))
    }

    /// Finds or creates the PathSummary node for `(parent, local_name_key,
    /// summarized_kind)`, bumping its reference count on reuse.
    fn path_node_for(&mut self, parent: i64, local_name_key: i32, summarized_kind: NodeKind) -> Result<i64> {
        let key = Self::path_node_hash(parent, local_name_key, summarized_kind.tag());
        let revision = self.wtx().revision();
        match self.wtx().get_record(IndexFamily::PathSummary, key)? {
            Some(mut rec) if !rec.is_tombstone() => {
                if let Some(p) = rec.path.as_mut() {
                    p.reference_count += 1;
                }
                self.wtx().put_record(IndexFamily::PathSummary, key, rec)?;
                Ok(key)
            }
            _ => {
                let level = if parent == NULL_NODE_KEY {
                    1
                } else {
                    match self.wtx().get_record(IndexFamily::PathSummary, parent)? {
                        Some(p) => p.path.as_ref().map(|pd| pd.level + 1).unwrap_or(1),
                        None => 1,
                    }
                };
                let rec = NodeRecord::path_node(key, parent, revision, level, local_name_key, summarized_kind);
                self.wtx().put_record(IndexFamily::PathSummary, key, rec)?;
                Ok(key)
            }
        }
    }

    /// Links `key` (already attached, so its `parent_key` is final) to
    /// its PathSummary node.
    fn link_path_node(&mut self, key: i64, summarized_kind: NodeKind) -> Result<()> {
        let mut node = self.get(key)?;
        let local_name_key = match &node.name {
            Some(n) => n.local_name_key,
            None => return Ok(()),
        };
        let parent_key = node.node.parent_key;
        let parent_path_node = self.parent_path_node_key(parent_key)?;
        let path_node_key = self.path_node_for(parent_path_node, local_name_key, summarized_kind)?;
        if let Some(n) = node.name.as_mut() {
            n.path_node_key = path_node_key;
        }
        self.put(key, node)
    }

    /// Re-links `key` and every descendant named node to the
    /// PathSummary tree, in parent-before-child order. Used after
    /// `deep_copy`, which builds a subtree under a placeholder parent
    /// before the caller attaches it at its real location, so the path
    /// links computed during the copy would otherwise be wrong.
    fn relink_path_summary(&mut self, key: i64) -> Result<()> {
        let rec = self.get(key)?;
        if rec.name.is_some() {
            self.link_path_node(key, rec.kind)?;
        }
        if let Some(elem) = rec.elem.clone() {
            for attr_key in elem.attributes {
                self.relink_path_summary(attr_key)?;
            }
            for ns_key in elem.namespaces {
                self.relink_path_summary(ns_key)?;
            }
        }
        if let Some(strct) = &rec.strct {
            let mut child = strct.first_child;
            while child != NULL_NODE_KEY {
                let child_rec = self.get(child)?;
                let next = child_rec.strct.as_ref().map(|s| s.right_sibling).unwrap_or(NULL_NODE_KEY);
                self.relink_path_summary(child)?;
                child = next;
            }
        }
        Ok(())
    }

    /// Decrements a PathSummary node's reference count on removal.
    /// Never physically deletes it: a reference count of zero just
    /// means no live document node currently uses that path, which is
    /// fine to leave in place for the next node that revisits it.
    fn path_node_unref(&mut self, path_node_key: i64) -> Result<()> {
        if path_node_key == NULL_NODE_KEY {
            return Ok(());
        }
        if let Some(mut rec) = self.wtx().get_record(IndexFamily::PathSummary, path_node_key)? {
            if let Some(p) = rec.path.as_mut() {
                p.reference_count = (p.reference_count - 1).max(0);
            }
            self.wtx().put_record(IndexFamily::PathSummary, path_node_key, rec)?;
        }
        Ok(())
    }

    /// Root-to-`path_node_key` chain of `local_name_key`s through the
    /// PathSummary tree, mirroring [Self::name_chain] on the document
    /// side.
    fn path_summary_name_chain(&mut self, path_node_key: i64) -> Result<Vec<i32>> {
        let mut chain = Vec::new();
        let mut cur = path_node_key;
        while cur != NULL_NODE_KEY {
            let rec = match self.wtx().get_record(IndexFamily::PathSummary, cur)? {
                Some(r) if !r.is_tombstone() => r,
                _ => return err_at!(Corruption, msg: "path-summary node {} missing", cur),
            };
            if let Some(name) = &rec.name {
                chain.push(name.local_name_key);
            }
            cur = rec.node.parent_key;
        }
        chain.reverse();
        Ok(chain)
    }

    /// spec.md §3.3 invariant 5: every named node's `path_node_key`
    /// resolves to a PathSummary node whose own name chain matches the
    /// document's.
    fn check_named_path_link(&mut self, key: i64) -> Result<()> {
        let rec = self.get(key)?;
        let name = match &rec.name {
            Some(n) => n.clone(),
            None => return Ok(()),
        };
        if name.path_node_key == NULL_NODE_KEY {
            return err_at!(InvariantViolation, msg: "node {} has no path-summary link", key);
        }
        let expected = self.name_chain(key)?;
        let actual = self.path_summary_name_chain(name.path_node_key)?;
        if expected != actual {
            return err_at!(
                InvariantViolation,
                msg: "node {} path-summary chain mismatch: document={:?} path-summary={:?}",
                key,
                expected,
                actual
            );
        }
        Ok(())
    }

    // -- ancestor-chain bookkeeping -----------------------------------------------

    fn propagate_descendant_delta(&mut self, start: i64, delta: i64) -> Result<()> {
        let mut cur = start;
        while cur != NULL_NODE_KEY {
            let mut node = self.get(cur)?;
            let parent = node.node.parent_key;
            if let Some(s) = node.strct.as_mut() {
                s.descendant_count += delta;
            }
            self.put(cur, node)?;
            cur = parent;
        }
        Ok(())
    }

    fn propagate_hash_delta(&mut self, start: i64, delta: u64) -> Result<()> {
        if delta == 0 {
            return Ok(());
        }
        let mut cur = start;
        while cur != NULL_NODE_KEY {
            let mut node = self.get(cur)?;
            let parent = node.node.parent_key;
            node.node.hash ^= delta;
            self.put(cur, node)?;
            cur = parent;
        }
        Ok(())
    }

    // -- structural attach/detach --------------------------------------------------

    fn attach_as_first_child(&mut self, parent_key: i64, mut node: NodeRecord) -> Result<()> {
        let mut parent = self.get(parent_key)?;
        if !parent.kind.is_struct() {
            return err_at!(InvariantViolation, msg: "node {} cannot hold children", parent_key);
        }
        let old_first = parent.strct.as_ref().map(|s| s.first_child).unwrap_or(NULL_NODE_KEY);
        let node_key = node.node.node_key;
        node.node.parent_key = parent_key;
        if let Some(s) = node.strct.as_mut() {
            s.left_sibling = NULL_NODE_KEY;
            s.right_sibling = old_first;
        }
        if old_first != NULL_NODE_KEY {
            let mut first = self.get(old_first)?;
            if let Some(s) = first.strct.as_mut() {
                s.left_sibling = node_key;
            }
            self.put(old_first, first)?;
        }
        if let Some(s) = parent.strct.as_mut() {
            s.first_child = node_key;
            s.child_count += 1;
        }
        let added_descendants = node.strct.as_ref().map(|s| s.descendant_count).unwrap_or(0);
        let hash = node.node.hash;
        self.put(parent_key, parent)?;
        self.put(node_key, node)?;
        self.propagate_descendant_delta(parent_key, added_descendants + 1)?;
        self.propagate_hash_delta(parent_key, hash)?;
        Ok(())
    }

    fn attach_as_right_sibling(&mut self, sibling_key: i64, mut node: NodeRecord) -> Result<()> {
        let mut sibling = self.get(sibling_key)?;
        if sibling.strct.is_none() {
            return err_at!(InvariantViolation, msg: "node {} has no sibling chain", sibling_key);
        }
        let parent_key = sibling.node.parent_key;
        let old_right = sibling.strct.as_ref().map(|s| s.right_sibling).unwrap_or(NULL_NODE_KEY);
        let node_key = node.node.node_key;
        node.node.parent_key = parent_key;
        if let Some(s) = node.strct.as_mut() {
            s.left_sibling = sibling_key;
            s.right_sibling = old_right;
        }
        if let Some(s) = sibling.strct.as_mut() {
            s.right_sibling = node_key;
        }
        self.put(sibling_key, sibling)?;
        if old_right != NULL_NODE_KEY {
            let mut right = self.get(old_right)?;
            if let Some(s) = right.strct.as_mut() {
                s.left_sibling = node_key;
            }
            self.put(old_right, right)?;
        }
        if parent_key != NULL_NODE_KEY {
            let mut parent = self.get(parent_key)?;
            if let Some(s) = parent.strct.as_mut() {
                s.child_count += 1;
            }
            self.put(parent_key, parent)?;
        }
        let added_descendants = node.strct.as_ref().map(|s| s.descendant_count).unwrap_or(0);
        let hash = node.node.hash;
        self.put(node_key, node)?;
        if parent_key != NULL_NODE_KEY {
            self.propagate_descendant_delta(parent_key, added_descendants + 1)?;
            self.propagate_hash_delta(parent_key, hash)?;
        }
        Ok(())
    }

    /// Reduced to `attach_as_right_sibling` on `sibling`'s current left
    /// neighbor (or `attach_as_first_child` if it has none), avoiding a
    /// second copy of the pointer-relinking logic above.
    fn attach_as_left_sibling(&mut self, sibling_key: i64, node: NodeRecord) -> Result<()> {
        let sibling = self.get(sibling_key)?;
        let left = sibling.strct.as_ref().map(|s| s.left_sibling).unwrap_or(NULL_NODE_KEY);
        if left != NULL_NODE_KEY {
            self.attach_as_right_sibling(left, node)
        } else {
            self.attach_as_first_child(sibling.node.parent_key, node)
        }
    }

    /// Unlinks `key` from its parent/siblings, decrementing ancestor
    /// `descendant_count`/`hash` accordingly, and returns the node with
    /// its own sibling/parent pointers cleared. Does not persist the
    /// node itself — the caller either reattaches it or tombstones it.
    fn detach(&mut self, key: i64) -> Result<NodeRecord> {
        let mut node = self.get(key)?;
        let parent_key = node.node.parent_key;
        if parent_key == NULL_NODE_KEY {
            return err_at!(InvariantViolation, msg: "node {} has no parent to detach from", key);
        }
        let mut parent = self.get(parent_key)?;
        let left = node.strct.as_ref().map(|s| s.left_sibling).unwrap_or(NULL_NODE_KEY);
        let right = node.strct.as_ref().map(|s| s.right_sibling).unwrap_or(NULL_NODE_KEY);

        if left != NULL_NODE_KEY {
            let mut l = self.get(left)?;
            if let Some(s) = l.strct.as_mut() {
                s.right_sibling = right;
            }
            self.put(left, l)?;
        } else if let Some(s) = parent.strct.as_mut() {
            s.first_child = right;
        }
        if right != NULL_NODE_KEY {
            let mut r = self.get(right)?;
            if let Some(s) = r.strct.as_mut() {
                s.left_sibling = left;
            }
            self.put(right, r)?;
        }

        let removed_descendants = node.strct.as_ref().map(|s| s.descendant_count).unwrap_or(0);
        if let Some(s) = parent.strct.as_mut() {
            s.child_count -= 1;
        }
        self.put(parent_key, parent)?;
        self.propagate_descendant_delta(parent_key, -(removed_descendants + 1))?;
        self.propagate_hash_delta(parent_key, node.node.hash)?;

        if let Some(s) = node.strct.as_mut() {
            s.left_sibling = NULL_NODE_KEY;
            s.right_sibling = NULL_NODE_KEY;
        }
        node.node.parent_key = NULL_NODE_KEY;
        Ok(node)
    }

    // -- insertion ------------------------------------------------------------------

    fn make_element(&mut self, name: &QName) -> Result<NodeRecord> {
        let key = self.wtx().allocate_node_key();
        let revision = self.wtx().revision();
        let prefix_key = self.intern_name_opt(name.prefix.as_deref())?;
        let local_name_key = self.intern_name(&name.local)?;
        let uri_key = self.intern_name_opt(name.uri.as_deref())?;
        let name_delegate = NameNodeDelegate { prefix_key, local_name_key, uri_key, path_node_key: NULL_NODE_KEY };
        let hash = content_hash(NodeKind::Element, Some(&name_delegate), None);
        let mut node = NodeDelegate::new(key, NULL_NODE_KEY, revision);
        node.hash = hash;
        Ok(NodeRecord {
            kind: NodeKind::Element,
            node,
            strct: Some(StructNodeDelegate::empty()),
            name: Some(name_delegate),
            val: None,
            avl: None,
            elem: Some(ElementDelegate::empty()),
            index_root: None,
            path: None,
        })
    }

    fn index_element_name(&mut self, key: i64, name: &QName) -> Result<()> {
        self.index_put(IndexFamily::Name, name.local.as_bytes().to_vec(), key)?;
        let path_bytes = self.path_key_for(key)?;
        self.index_put(IndexFamily::Path, path_bytes, key)
    }

    pub fn insert_element_as_first_child(&mut self, parent: i64, name: QName) -> Result<i64> {
        let node = self.make_element(&name)?;
        let key = node.node.node_key;
        self.attach_as_first_child(parent, node)?;
        self.link_path_node(key, NodeKind::Element)?;
        self.index_element_name(key, &name)?;
        self.bump()?;
        Ok(key)
    }

    pub fn insert_element_as_left_sibling(&mut self, sibling: i64, name: QName) -> Result<i64> {
        let node = self.make_element(&name)?;
        let key = node.node.node_key;
        self.attach_as_left_sibling(sibling, node)?;
        self.link_path_node(key, NodeKind::Element)?;
        self.index_element_name(key, &name)?;
        self.bump()?;
        Ok(key)
    }

    pub fn insert_element_as_right_sibling(&mut self, sibling: i64, name: QName) -> Result<i64> {
        let node = self.make_element(&name)?;
        let key = node.node.node_key;
        self.attach_as_right_sibling(sibling, node)?;
        self.link_path_node(key, NodeKind::Element)?;
        self.index_element_name(key, &name)?;
        self.bump()?;
        Ok(key)
    }

    fn make_text(&mut self, value: &[u8]) -> NodeRecord {
        let key = self.wtx().allocate_node_key();
        let revision = self.wtx().revision();
        let hash = content_hash(NodeKind::Text, None, Some(value));
        let mut node = NodeDelegate::new(key, NULL_NODE_KEY, revision);
        node.hash = hash;
        NodeRecord {
            kind: NodeKind::Text,
            node,
            strct: Some(StructNodeDelegate::empty()),
            name: None,
            val: Some(ValNodeDelegate { compressed: false, value: value.to_vec() }),
            avl: None,
            elem: None,
            index_root: None,
            path: None,
        }
    }

    pub fn insert_text_as_first_child(&mut self, parent: i64, value: &[u8]) -> Result<i64> {
        let node = self.make_text(value);
        let key = node.node.node_key;
        self.attach_as_first_child(parent, node)?;
        self.index_put(IndexFamily::Cas, value.to_vec(), key)?;
        self.bump()?;
        Ok(key)
    }

    pub fn insert_text_as_left_sibling(&mut self, sibling: i64, value: &[u8]) -> Result<i64> {
        let node = self.make_text(value);
        let key = node.node.node_key;
        self.attach_as_left_sibling(sibling, node)?;
        self.index_put(IndexFamily::Cas, value.to_vec(), key)?;
        self.bump()?;
        Ok(key)
    }

    pub fn insert_text_as_right_sibling(&mut self, sibling: i64, value: &[u8]) -> Result<i64> {
        let node = self.make_text(value);
        let key = node.node.node_key;
        self.attach_as_right_sibling(sibling, node)?;
        self.index_put(IndexFamily::Cas, value.to_vec(), key)?;
        self.bump()?;
        Ok(key)
    }

    /// Attributes and namespaces attach directly to their owning
    /// element's [ElementDelegate] key lists rather than the sibling
    /// chain (spec.md §3.3: they are non-struct nodes).
    pub fn insert_attribute(&mut self, parent_element: i64, name: QName, value: &[u8]) -> Result<i64> {
        let mut parent = self.get(parent_element)?;
        if !parent.kind.is_element() {
            return err_at!(InvariantViolation, msg: "node {} is not an element", parent_element);
        }
        let key = self.wtx().allocate_node_key();
        let revision = self.wtx().revision();
        let prefix_key = self.intern_name_opt(name.prefix.as_deref())?;
        let local_name_key = self.intern_name(&name.local)?;
        let uri_key = self.intern_name_opt(name.uri.as_deref())?;
        let name_delegate = NameNodeDelegate { prefix_key, local_name_key, uri_key, path_node_key: NULL_NODE_KEY };
        let hash = content_hash(NodeKind::Attribute, Some(&name_delegate), Some(value));
        let mut node_delegate = NodeDelegate::new(key, parent_element, revision);
        node_delegate.hash = hash;
        let rec = NodeRecord {
            kind: NodeKind::Attribute,
            node: node_delegate,
            strct: None,
            name: Some(name_delegate),
            val: Some(ValNodeDelegate { compressed: false, value: value.to_vec() }),
            avl: None,
            elem: None,
            index_root: None,
            path: None,
        };
        self.put(key, rec)?;
        self.link_path_node(key, NodeKind::Attribute)?;

        if let Some(elem) = parent.elem.as_mut() {
            elem.attributes.add_node_key(key);
        }
        self.put(parent_element, parent)?;
        self.propagate_hash_delta(parent_element, hash)?;

        self.index_put(IndexFamily::Name, name.local.as_bytes().to_vec(), key)?;
        self.index_put(IndexFamily::Cas, value.to_vec(), key)?;
        self.bump()?;
        Ok(key)
    }

    pub fn insert_namespace(&mut self, parent_element: i64, name: QName) -> Result<i64> {
        let mut parent = self.get(parent_element)?;
        if !parent.kind.is_element() {
            return err_at!(InvariantViolation, msg: "node {} is not an element", parent_element);
        }
        let key = self.wtx().allocate_node_key();
        let revision = self.wtx().revision();
        let prefix_key = self.intern_name_opt(name.prefix.as_deref())?;
        let local_name_key = self.intern_name(&name.local)?;
        let uri_key = self.intern_name_opt(name.uri.as_deref())?;
        let name_delegate = NameNodeDelegate { prefix_key, local_name_key, uri_key, path_node_key: NULL_NODE_KEY };
        let hash = content_hash(NodeKind::Namespace, Some(&name_delegate), None);
        let mut node_delegate = NodeDelegate::new(key, parent_element, revision);
        node_delegate.hash = hash;
        let rec = NodeRecord {
            kind: NodeKind::Namespace,
            node: node_delegate,
            strct: None,
            name: Some(name_delegate),
            val: None,
            avl: None,
            elem: None,
            index_root: None,
            path: None,
        };
        self.put(key, rec)?;
        self.link_path_node(key, NodeKind::Namespace)?;

        if let Some(elem) = parent.elem.as_mut() {
            elem.namespaces.add_node_key(key);
        }
        self.put(parent_element, parent)?;
        self.propagate_hash_delta(parent_element, hash)?;
        self.bump()?;
        Ok(key)
    }

    // -- move / copy / mutate --------------------------------------------------------

    fn is_ancestor(&mut self, maybe_ancestor: i64, node_key: i64) -> Result<bool> {
        let mut cur = node_key;
        loop {
            let rec = self.get(cur)?;
            let parent = rec.node.parent_key;
            if parent == NULL_NODE_KEY {
                return Ok(false);
            }
            if parent == maybe_ancestor {
                return Ok(true);
            }
            cur = parent;
        }
    }

    fn check_move(&mut self, from_key: i64, target: i64) -> Result<()> {
        if from_key == target || self.is_ancestor(from_key, target)? {
            return err_at!(InvariantViolation, msg: "cannot move node {} into its own subtree at {}", from_key, target);
        }
        Ok(())
    }

    pub fn move_subtree_to_first_child(&mut self, from_key: i64, target: i64) -> Result<()> {
        self.check_move(from_key, target)?;
        let node = self.detach(from_key)?;
        self.attach_as_first_child(target, node)?;
        self.relink_path_summary(from_key)?;
        self.bump()
    }

    pub fn move_subtree_to_left_sibling(&mut self, from_key: i64, target: i64) -> Result<()> {
        self.check_move(from_key, target)?;
        let node = self.detach(from_key)?;
        self.attach_as_left_sibling(target, node)?;
        self.relink_path_summary(from_key)?;
        self.bump()
    }

    pub fn move_subtree_to_right_sibling(&mut self, from_key: i64, target: i64) -> Result<()> {
        self.check_move(from_key, target)?;
        let node = self.detach(from_key)?;
        self.attach_as_right_sibling(target, node)?;
        self.relink_path_summary(from_key)?;
        self.bump()
    }

    /// Makes sure every name key `name` references has a `NameDict`
    /// entry in this resource. Name keys are content hashes of the
    /// string (spec.md §3.1), so a key copied verbatim from another
    /// resource already addresses the right string here too; it just
    /// needs its own persisted entry so readers of this resource can
    /// resolve it independently.
    fn reindex_name_keys(&mut self, reader: &mut PageReadTransaction, name: &NameNodeDelegate) -> Result<()> {
        for key in [name.prefix_key, name.local_name_key, name.uri_key] {
            if key >= 0 && self.names.resolve_cached(key).is_none() {
                if let Some(s) = reader.get_name(key)? {
                    self.ensure_name_persisted(key, &s)?;
                }
            }
        }
        Ok(())
    }

    fn deep_copy_leaf(&mut self, reader: &mut PageReadTransaction, source_key: i64, new_parent: i64) -> Result<i64> {
        let src = match reader.get_record(source_key)? {
            Some(r) if !r.is_tombstone() => r,
            _ => return err_at!(KeyNotFound, msg: "source node {} does not exist", source_key),
        };
        if let Some(name) = &src.name {
            self.reindex_name_keys(reader, name)?;
        }
        let key = self.wtx().allocate_node_key();
        let revision = self.wtx().revision();
        let hash = content_hash(src.kind, src.name.as_ref(), src.val.as_ref().map(|v| v.value.as_slice()));
        let mut node = NodeDelegate::new(key, new_parent, revision);
        node.hash = hash;
        let rec = NodeRecord {
            kind: src.kind,
            node,
            strct: None,
            name: src.name.clone(),
            val: src.val.clone(),
            avl: None,
            elem: None,
            index_root: None,
            path: None,
        };
        if let Some(val) = &rec.val {
            self.index_put(IndexFamily::Cas, val.value.clone(), key)?;
        }
        self.put(key, rec)?;
        Ok(key)
    }

    /// Deep-copies the subtree rooted at `source_key` (read through
    /// `reader`, possibly a different resource or revision) under
    /// `new_parent`, recreating every descendant with freshly allocated
    /// keys. Returns the new subtree's root key; the caller attaches it
    /// with `attach_as_*` and then calls [Self::relink_path_summary],
    /// since `new_parent` here is usually a placeholder the caller
    /// reparents afterward. Name keys are copied verbatim and
    /// reindexed into this resource's own `NameDict` (name keys are
    /// content hashes, so the same key addresses the same string in
    /// any resource); the name-index (`IndexFamily::Name`) itself is
    /// not rebuilt for copies, since `insert_element_as_*` already
    /// builds it for freshly-created elements and a full re-derivation
    /// for copies would walk every copied name again for marginal
    /// value.
    fn deep_copy(&mut self, reader: &mut PageReadTransaction, source_key: i64, new_parent: i64) -> Result<i64> {
        let src = match reader.get_record(source_key)? {
            Some(r) if !r.is_tombstone() => r,
            _ => return err_at!(KeyNotFound, msg: "source node {} does not exist", source_key),
        };
        if let Some(name) = &src.name {
            self.reindex_name_keys(reader, name)?;
        }
        let is_struct = src.strct.is_some();
        let key = self.wtx().allocate_node_key();
        let revision = self.wtx().revision();
        let hash = content_hash(src.kind, src.name.as_ref(), src.val.as_ref().map(|v| v.value.as_slice()));
        let mut node = NodeDelegate::new(key, new_parent, revision);
        node.hash = hash;
        let rec = NodeRecord {
            kind: src.kind,
            node,
            strct: if is_struct { Some(StructNodeDelegate::empty()) } else { None },
            name: src.name.clone(),
            val: src.val.clone(),
            avl: None,
            elem: src.elem.as_ref().map(|_| ElementDelegate::empty()),
            index_root: None,
            path: None,
        };
        if let Some(val) = &rec.val {
            self.index_put(IndexFamily::Cas, val.value.clone(), key)?;
        }
        self.put(key, rec)?;

        if let Some(elem) = src.elem.clone() {
            for attr_key in elem.attributes {
                let copied = self.deep_copy_leaf(reader, attr_key, key)?;
                let copied_hash = self.get(copied)?.node.hash;
                let mut parent = self.get(key)?;
                if let Some(e) = parent.elem.as_mut() {
                    e.attributes.add_node_key(copied);
                }
                parent.node.hash ^= copied_hash;
                self.put(key, parent)?;
            }
            for ns_key in elem.namespaces {
                let copied = self.deep_copy_leaf(reader, ns_key, key)?;
                let copied_hash = self.get(copied)?.node.hash;
                let mut parent = self.get(key)?;
                if let Some(e) = parent.elem.as_mut() {
                    e.namespaces.add_node_key(copied);
                }
                parent.node.hash ^= copied_hash;
                self.put(key, parent)?;
            }
        }

        if is_struct {
            let mut src_children = Vec::new();
            let mut child = src.strct.as_ref().unwrap().first_child;
            while child != NULL_NODE_KEY {
                let child_src = match reader.get_record(child)? {
                    Some(r) => r,
                    None => break,
                };
                let next = child_src.strct.as_ref().map(|s| s.right_sibling).unwrap_or(NULL_NODE_KEY);
                src_children.push(child);
                child = next;
            }
            let child_count = src_children.len() as i64;

            let mut first_child = NULL_NODE_KEY;
            let mut prev = NULL_NODE_KEY;
            let mut descendant_total = 0i64;
            for child_key in src_children {
                let copied_key = self.deep_copy(reader, child_key, key)?;
                let mut copied = self.get(copied_key)?;
                let copied_desc = copied.strct.as_ref().map(|s| s.descendant_count).unwrap_or(0);
                let copied_hash = copied.node.hash;
                if let Some(s) = copied.strct.as_mut() {
                    s.left_sibling = prev;
                }
                self.put(copied_key, copied)?;
                if prev != NULL_NODE_KEY {
                    let mut prev_rec = self.get(prev)?;
                    if let Some(s) = prev_rec.strct.as_mut() {
                        s.right_sibling = copied_key;
                    }
                    self.put(prev, prev_rec)?;
                } else {
                    first_child = copied_key;
                }
                let mut parent = self.get(key)?;
                parent.node.hash ^= copied_hash;
                self.put(key, parent)?;
                descendant_total += copied_desc + 1;
                prev = copied_key;
            }

            let mut parent_rec = self.get(key)?;
            if let Some(s) = parent_rec.strct.as_mut() {
                s.first_child = first_child;
                s.child_count = child_count;
                s.descendant_count = descendant_total;
            }
            self.put(key, parent_rec)?;
        }
        Ok(key)
    }

    pub fn copy_subtree_as_first_child(&mut self, reader: &mut PageReadTransaction, source_key: i64, target: i64) -> Result<i64> {
        let new_key = self.deep_copy(reader, source_key, NULL_NODE_KEY)?;
        let node = self.get(new_key)?;
        self.attach_as_first_child(target, node)?;
        self.relink_path_summary(new_key)?;
        self.bump()?;
        Ok(new_key)
    }

    pub fn copy_subtree_as_left_sibling(&mut self, reader: &mut PageReadTransaction, source_key: i64, target: i64) -> Result<i64> {
        let new_key = self.deep_copy(reader, source_key, NULL_NODE_KEY)?;
        let node = self.get(new_key)?;
        self.attach_as_left_sibling(target, node)?;
        self.relink_path_summary(new_key)?;
        self.bump()?;
        Ok(new_key)
    }

    pub fn copy_subtree_as_right_sibling(&mut self, reader: &mut PageReadTransaction, source_key: i64, target: i64) -> Result<i64> {
        let new_key = self.deep_copy(reader, source_key, NULL_NODE_KEY)?;
        let node = self.get(new_key)?;
        self.attach_as_right_sibling(target, node)?;
        self.relink_path_summary(new_key)?;
        self.bump()?;
        Ok(new_key)
    }

    pub fn set_value(&mut self, key: i64, value: Vec<u8>) -> Result<()> {
        let mut node = self.get(key)?;
        if !node.kind.has_value() {
            return err_at!(InvariantViolation, msg: "node {} does not carry a value", key);
        }
        let old_value = node.val.as_ref().map(|v| v.value.clone());
        let old_hash = content_hash(node.kind, node.name.as_ref(), old_value.as_deref());
        let new_hash = content_hash(node.kind, node.name.as_ref(), Some(&value));
        if let Some(old) = &old_value {
            self.index_remove(IndexFamily::Cas, old, key)?;
        }
        node.val = Some(ValNodeDelegate { compressed: false, value: value.clone() });
        node.node.hash ^= old_hash ^ new_hash;
        let parent = node.node.parent_key;
        self.put(key, node)?;
        self.index_put(IndexFamily::Cas, value, key)?;
        self.propagate_hash_delta(parent, old_hash ^ new_hash)?;
        self.bump()
    }

    pub fn set_name(&mut self, key: i64, name: QName) -> Result<()> {
        let mut node = self.get(key)?;
        let kind = node.kind;
        if !kind.has_name() {
            return err_at!(InvariantViolation, msg: "node {} does not carry a name", key);
        }
        let old_name = node.name.clone();
        if let Some(old) = &old_name {
            if let Some(local) = self.resolve_name(old.local_name_key)? {
                self.index_remove(IndexFamily::Name, local.as_bytes(), key)?;
            }
            self.path_node_unref(old.path_node_key)?;
        }
        let prefix_key = self.intern_name_opt(name.prefix.as_deref())?;
        let local_name_key = self.intern_name(&name.local)?;
        let uri_key = self.intern_name_opt(name.uri.as_deref())?;
        let new_name = NameNodeDelegate { prefix_key, local_name_key, uri_key, path_node_key: NULL_NODE_KEY };
        let old_hash = content_hash(kind, old_name.as_ref(), node.val.as_ref().map(|v| v.value.as_slice()));
        let new_hash = content_hash(kind, Some(&new_name), node.val.as_ref().map(|v| v.value.as_slice()));
        node.name = Some(new_name);
        node.node.hash ^= old_hash ^ new_hash;
        let parent = node.node.parent_key;
        self.put(key, node)?;
        self.link_path_node(key, kind)?;
        self.index_put(IndexFamily::Name, name.local.as_bytes().to_vec(), key)?;
        self.propagate_hash_delta(parent, old_hash ^ new_hash)?;
        self.bump()
    }

    /// Tombstones `key` and its entire subtree (struct children plus
    /// any owned attributes/namespaces), removing each from whatever
    /// secondary indexes it participated in (spec.md §3.4 `remove_entry`).
    pub fn remove(&mut self, key: i64) -> Result<()> {
        if key == DOCUMENT_NODE_KEY {
            return err_at!(InvariantViolation, msg: "cannot remove the document root");
        }
        let node = self.detach(key)?;
        self.tombstone_subtree(key, &node)?;
        self.bump()
    }

    fn tombstone_subtree(&mut self, key: i64, node: &NodeRecord) -> Result<()> {
        if let Some(val) = &node.val {
            self.index_remove(IndexFamily::Cas, &val.value, key)?;
        }
        if matches!(node.kind, NodeKind::Element | NodeKind::Attribute | NodeKind::Namespace) {
            if let Some(name) = &node.name {
                if let Some(local) = self.resolve_name(name.local_name_key)? {
                    self.index_remove(IndexFamily::Name, local.as_bytes(), key)?;
                }
                self.path_node_unref(name.path_node_key)?;
            }
        }
        if node.kind.is_element() {
            let path_bytes = self.path_key_for(key)?;
            self.index_remove(IndexFamily::Path, &path_bytes, key)?;
        }
        if let Some(elem) = node.elem.clone() {
            for attr_key in elem.attributes {
                let attr = self.get(attr_key)?;
                self.tombstone_subtree(attr_key, &attr)?;
            }
            for ns_key in elem.namespaces {
                let ns = self.get(ns_key)?;
                self.tombstone_subtree(ns_key, &ns)?;
            }
        }
        if let Some(strct) = &node.strct {
            let mut child = strct.first_child;
            while child != NULL_NODE_KEY {
                let child_rec = self.get(child)?;
                let next = child_rec.strct.as_ref().map(|s| s.right_sibling).unwrap_or(NULL_NODE_KEY);
                self.tombstone_subtree(child, &child_rec)?;
                child = next;
            }
        }
        let revision = self.wtx().revision();
        self.wtx().put_record(IndexFamily::Record, key, NodeRecord::tombstone(key, revision))
    }

    // -- self-check -------------------------------------------------------------------

    fn check_avl_balance(&mut self, family: IndexFamily, key: Option<i64>) -> Result<i32> {
        let k = match key {
            None => return Ok(0),
            Some(k) => k,
        };
        let revision = self.wtx().revision();
        let node = {
            let mut store = PageAvlStore::new(self.wtx(), family, revision);
            store.load(k)?
        };
        let node = match node {
            Some(n) => n,
            None => return err_at!(Corruption, msg: "avl node {} missing during validation", k),
        };
        let lh = self.check_avl_balance(family, opt(node.left))?;
        let rh = self.check_avl_balance(family, opt(node.right))?;
        if (lh - rh).abs() > 1 {
            return err_at!(InvariantViolation, msg: "avl node {} in {:?} index unbalanced: lh={} rh={}", k, family, lh, rh);
        }
        Ok(1 + lh.max(rh))
    }

    fn check_struct_subtree(&mut self, key: i64, expected_parent: i64) -> Result<i64> {
        let rec = self.get(key)?;
        if rec.node.parent_key != expected_parent {
            return err_at!(InvariantViolation, msg: "node {} parent_key mismatch", key);
        }
        self.check_named_path_link(key)?;
        if let Some(elem) = &rec.elem {
            for &attr_key in &elem.attributes {
                let attr = self.get(attr_key)?;
                if attr.node.parent_key != key {
                    return err_at!(InvariantViolation, msg: "attribute {} not owned by element {}", attr_key, key);
                }
                self.check_named_path_link(attr_key)?;
            }
            for &ns_key in &elem.namespaces {
                let ns = self.get(ns_key)?;
                if ns.node.parent_key != key {
                    return err_at!(InvariantViolation, msg: "namespace {} not owned by element {}", ns_key, key);
                }
                self.check_named_path_link(ns_key)?;
            }
        }
        let strct = match &rec.strct {
            Some(s) => s.clone(),
            None => return Ok(0),
        };
        let mut count = 0;
        let mut descendants = 0;
        let mut cur = strct.first_child;
        let mut prev = NULL_NODE_KEY;
        while cur != NULL_NODE_KEY {
            let child = self.get(cur)?;
            let left = child.strct.as_ref().map(|s| s.left_sibling).unwrap_or(NULL_NODE_KEY);
            if left != prev {
                return err_at!(InvariantViolation, msg: "node {} left_sibling broken doubly-linked chain", cur);
            }
            let child_descendants = self.check_struct_subtree(cur, key)?;
            descendants += child_descendants + 1;
            count += 1;
            prev = cur;
            cur = child.strct.as_ref().map(|s| s.right_sibling).unwrap_or(NULL_NODE_KEY);
        }
        if strct.child_count != count {
            return err_at!(InvariantViolation, msg: "node {} child_count {} != actual {}", key, strct.child_count, count);
        }
        if strct.descendant_count != descendants {
            return err_at!(
                InvariantViolation,
                msg: "node {} descendant_count {} != actual {}",
                key,
                strct.descendant_count,
                descendants
            );
        }
        Ok(descendants)
    }

    /// Randomized/on-demand consistency self-check (SPEC_FULL.md item
    /// 5): walks the whole document tree checking spec.md §3.3
    /// invariants 2-5, then checks AVL balance for every index family.
    /// Grounded in `rdms::llrb::Index::validate`'s whole-tree walk.
    pub fn validate_invariants(&mut self) -> Result<()> {
        self.check_struct_subtree(DOCUMENT_NODE_KEY, NULL_NODE_KEY)?;
        for family in [IndexFamily::Name, IndexFamily::Path, IndexFamily::Cas] {
            let revision = self.wtx().revision();
            let root = self.wtx().get_record(family, INDEX_ROOT_KEY)?.and_then(|r| r.as_index_root());
            self.check_avl_balance(family, root)?;
        }
        Ok(())
    }
}
