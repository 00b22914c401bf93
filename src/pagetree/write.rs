//! Copy-on-write page-tree mutation (spec.md §4.2, §4.5). Grounded in
//! `rdms::llrb::index::Index`'s single-writer-lock-then-clone-path-then
//! -atomic-swap shape, lifted from a key-value tree to this crate's
//! fan-out indirect-page tree: every mutated leaf and every indirect
//! page on the path down to it is cloned before being touched, and
//! nothing in the previous revision is ever overwritten in place.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use crate::cache::PageCache;
use crate::codec::page::{IndirectPage, Page, RecordPage, RevisionRootPage, UberPage};
use crate::codec::{IndexFamily, NodeRecord};
use crate::io::{header::Header, ResourceFile};
use crate::pagetree::{materialize_leaf, Geometry};
use crate::txlog::{key::LogKey, Config as LogConfig, TransactionLog};
use crate::{Error, Result};

fn empty_revision_root() -> RevisionRootPage {
    RevisionRootPage {
        revision: 0,
        timestamp_millis: 0,
        max_node_key: crate::codec::DOCUMENT_NODE_KEY,
        record_root: None,
        name_index_root: None,
        path_index_root: None,
        cas_index_root: None,
        path_summary_root: None,
        name_dict_root: None,
        full_dump: true,
    }
}

/// One open write transaction against a resource file. Exactly one may
/// be open at a time per resource (spec.md §5, enforced by the
/// exclusive lock [ResourceFile::open_writer] takes).
pub struct PageWriteTransaction {
    resource: ResourceFile,
    #[allow(dead_code)]
    cache: Arc<PageCache>,
    #[allow(dead_code)]
    resource_id: u32,
    geometry: Geometry,
    window: u32,
    full_dump_every: u32,

    base_uber: UberPage,
    base_revision_root: RevisionRootPage,
    new_revision: u32,

    log: TransactionLog,

    leaf_dirty: HashMap<(IndexFamily, u64), RecordPage>,
    touched_slots: HashMap<(IndexFamily, u64), BTreeSet<u64>>,
    indirect_dirty: HashMap<(IndexFamily, u32, u64), IndirectPage>,

    next_node_key: i64,
    committed: bool,
}

impl PageWriteTransaction {
    /// Create a brand-new resource file with an empty revision 0.
    pub fn create<P: AsRef<Path>>(
        path: P,
        page_size: u32,
        fan_out: u32,
        window: u32,
        full_dump_every: u32,
        resource_id: u32,
        cache: Arc<PageCache>,
        log_path: P,
    ) -> Result<PageWriteTransaction> {
        let resource = ResourceFile::create(path, page_size, fan_out, window, full_dump_every)?;
        let geometry = Geometry::new(fan_out);
        let log = TransactionLog::create(log_path, LogConfig::new())?;

        Ok(PageWriteTransaction {
            resource,
            cache,
            resource_id,
            geometry,
            window,
            full_dump_every,
            base_uber: UberPage::empty(),
            base_revision_root: empty_revision_root(),
            new_revision: 1,
            log,
            leaf_dirty: HashMap::new(),
            touched_slots: HashMap::new(),
            indirect_dirty: HashMap::new(),
            next_node_key: crate::codec::DOCUMENT_NODE_KEY + 1,
            committed: false,
        })
    }

    /// Open an existing resource for the single writer, based on the
    /// latest committed revision.
    pub fn open<P: AsRef<Path>>(
        path: P,
        resource_id: u32,
        cache: Arc<PageCache>,
        log_path: P,
    ) -> Result<PageWriteTransaction> {
        let mut resource = ResourceFile::open_writer(path)?;
        let header = *resource.header();
        let geometry = Geometry::new(header.fan_out);
        let log = TransactionLog::create(log_path, LogConfig::new())?;

        let base_uber = if header.uber_offset == 0 {
            UberPage::empty()
        } else {
            UberPage::decode(&resource.read_page(header.uber_offset)?)?
        };

        let base_revision_root = if base_uber.revision_count == 0 {
            empty_revision_root()
        } else {
            let rr_offset = locate_latest_revision_root(&mut resource, &geometry, &base_uber)?;
            RevisionRootPage::decode(&resource.read_page(rr_offset)?)?
        };

        let next_node_key = base_revision_root.max_node_key + 1;

        Ok(PageWriteTransaction {
            resource,
            cache,
            resource_id,
            geometry,
            window: header.window,
            full_dump_every: header.full_dump_every,
            new_revision: base_revision_root.revision + 1,
            base_uber,
            base_revision_root,
            log,
            leaf_dirty: HashMap::new(),
            touched_slots: HashMap::new(),
            indirect_dirty: HashMap::new(),
            next_node_key,
            committed: false,
        })
    }

    pub fn allocate_node_key(&mut self) -> i64 {
        let key = self.next_node_key;
        self.next_node_key += 1;
        key
    }

    pub fn revision(&self) -> u32 {
        self.new_revision
    }

    fn load_leaf(&mut self, family: IndexFamily, bucket: u64) -> Result<RecordPage> {
        if let Some(page) = self.leaf_dirty.get(&(family, bucket)) {
            return Ok(page.clone());
        }
        let offset = self.find_committed_leaf_offset(family, bucket)?;
        let page = match offset {
            Some(offset) => materialize_leaf(&mut self.resource, offset, self.window)?,
            None => RecordPage::new(),
        };
        Ok(page)
    }

    fn find_committed_leaf_offset(&mut self, family: IndexFamily, bucket: u64) -> Result<Option<u64>> {
        let mut offset = match Geometry::family_root(&self.base_revision_root, family) {
            Some(offset) => offset,
            None => return Ok(None),
        };
        for &idx in &self.geometry.path_indices(bucket) {
            let page = IndirectPage::decode(&self.resource.read_page(offset)?)?;
            match page.get(idx) {
                Some(next) => offset = next,
                None => return Ok(None),
            }
        }
        Ok(Some(offset))
    }

    /// Read a record as it currently stands within this (uncommitted)
    /// transaction: staged edits shadow the committed base.
    pub fn get_record(&mut self, family: IndexFamily, node_key: i64) -> Result<Option<NodeRecord>> {
        let bucket = self.geometry.bucket_of(node_key);
        let slot = self.geometry.slot_of(node_key);
        let page = self.load_leaf(family, bucket)?;
        Ok(page.get(slot).cloned())
    }

    /// Stage a record write, copy-on-write cloning the leaf page and
    /// every indirect page on the path to it if this is the first touch
    /// this transaction (spec.md §4.2, §4.5).
    pub fn put_record(&mut self, family: IndexFamily, node_key: i64, record: NodeRecord) -> Result<()> {
        let bucket = self.geometry.bucket_of(node_key);
        let slot = self.geometry.slot_of(node_key);

        let mut page = self.load_leaf(family, bucket)?;
        page.upsert(slot, record);
        self.leaf_dirty.insert((family, bucket), page.clone());
        self.touched_slots.entry((family, bucket)).or_default().insert(slot);
        self.log.put(LogKey::Leaf { kind: family.page_kind(), bucket }, Page::Record(family.page_kind(), page))?;

        self.ensure_dirty_path(family, bucket)?;
        Ok(())
    }

    pub fn remove_record(&mut self, family: IndexFamily, node_key: i64) -> Result<()> {
        let revision = self.new_revision;
        self.put_record(family, node_key, NodeRecord::tombstone(node_key, revision))
    }

    /// Make sure every indirect page from the family root down to the
    /// deepest level addressing `bucket` has a writer-local copy
    /// (cloned from the committed base, or freshly allocated if the
    /// tree didn't reach this deep yet).
    fn ensure_dirty_path(&mut self, family: IndexFamily, bucket: u64) -> Result<()> {
        let indices = self.geometry.path_indices(bucket);
        let fan_out = self.geometry.fan_out as u64;

        let mut parent_index: u64 = 0;
        for (level, &slot) in indices.iter().enumerate() {
            let level = level as u32;
            if !self.indirect_dirty.contains_key(&(family, level, parent_index)) {
                let existing_offset = if level == 0 {
                    Geometry::family_root(&self.base_revision_root, family)
                } else {
                    self.indirect_dirty
                        .get(&(family, level - 1, parent_index / fan_out))
                        .and_then(|p| p.get((parent_index % fan_out) as usize))
                };
                let page = match existing_offset {
                    Some(offset) => IndirectPage::decode(&self.resource.read_page(offset)?)?,
                    None => IndirectPage::new(self.geometry.fan_out as usize),
                };
                self.indirect_dirty.insert((family, level, parent_index), page.clone());
                self.log.put(
                    LogKey::Indirect(crate::txlog::key::IndirectPageLogKey::new(
                        family.page_kind(),
                        level as u16,
                        parent_index,
                    )),
                    Page::Indirect(page),
                )?;
            }
            parent_index = parent_index * fan_out + slot as u64;
        }
        Ok(())
    }

    /// Fold every staged page into the resource file, decide full-dump
    /// vs. delta for each touched leaf (spec.md §4.5: a full dump every
    /// `full_dump_every` revisions), write a fresh revision root and
    /// uber page, and atomically advance the trailer pointer.
    pub fn commit(mut self, timestamp_millis: i64) -> Result<u32> {
        self.log.sync()?;

        let is_full_dump =
            self.new_revision % self.full_dump_every.max(1) == 0 || self.base_revision_root.revision == 0;
        let fan_out = self.geometry.fan_out as u64;
        let levels = self.geometry.levels;

        let families: Vec<IndexFamily> = self
            .leaf_dirty
            .keys()
            .map(|(f, _)| *f)
            .chain(self.indirect_dirty.keys().map(|(f, _, _)| *f))
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        let mut written_leaves: HashMap<(IndexFamily, u64), u64> = HashMap::new();
        let mut new_roots: HashMap<IndexFamily, Option<u64>> = HashMap::new();

        for family in &families {
            let root = write_indirect_recursive(
                &mut self.resource,
                &mut self.indirect_dirty,
                &mut self.leaf_dirty,
                &self.touched_slots,
                &mut written_leaves,
                *family,
                0,
                0,
                levels,
                fan_out,
                is_full_dump,
                self.window,
            )?;
            new_roots.insert(*family, root);
        }

        let mut new_rr = self.base_revision_root.clone();
        new_rr.revision = self.new_revision;
        new_rr.timestamp_millis = timestamp_millis;
        new_rr.max_node_key = self.next_node_key - 1;
        new_rr.full_dump = is_full_dump;
        for (family, root) in &new_roots {
            Geometry::set_family_root(&mut new_rr, *family, *root);
        }

        let rr_bytes = Page::RevisionRoot(new_rr).encode();
        let rr_offset = self.resource.append_page(&rr_bytes)?;

        let mut new_uber = self.base_uber.clone();
        new_uber.revision_count = self.new_revision;
        new_uber.max_node_key = self.next_node_key - 1;
        new_uber.revision_index_root = insert_revision_index(
            &mut self.resource,
            &self.geometry,
            new_uber.revision_index_root,
            self.new_revision,
            rr_offset,
        )?;

        let uber_bytes = Page::Uber(new_uber).encode();
        let uber_offset = self.resource.append_page(&uber_bytes)?;
        self.resource.commit_uber_offset(uber_offset)?;

        self.log.clear()?;
        self.committed = true;
        Ok(self.new_revision)
    }

    pub fn to_header(&self) -> Header {
        *self.resource.header()
    }

    /// Discard every staged page. Nothing was written to the resource
    /// file (only to the transaction log), so this is just a drop.
    pub fn abort(self) {
        drop(self)
    }
}

impl Drop for PageWriteTransaction {
    fn drop(&mut self) {
        if !self.committed {
            log::warn!("write transaction for revision {} dropped without commit", self.new_revision);
        }
    }
}

/// Recursively write every dirty indirect page under `(family, level,
/// index)` bottom-up, resolving each dirty child's fresh offset before
/// writing the parent, and return the (possibly unchanged) offset for
/// this slot. `(family, 0, 0)` is always dirty for any family present
/// in the caller's `families` list, since [PageWriteTransaction::ensure_dirty_path]
/// always stages the root first.
#[allow(clippy::too_many_arguments)]
fn write_indirect_recursive(
    resource: &mut ResourceFile,
    indirect_dirty: &mut HashMap<(IndexFamily, u32, u64), IndirectPage>,
    leaf_dirty: &mut HashMap<(IndexFamily, u64), RecordPage>,
    touched_slots: &HashMap<(IndexFamily, u64), BTreeSet<u64>>,
    written_leaves: &mut HashMap<(IndexFamily, u64), u64>,
    family: IndexFamily,
    level: u32,
    index: u64,
    levels: u32,
    fan_out: u64,
    is_full_dump: bool,
    window: u32,
) -> Result<Option<u64>> {
    let mut page = match indirect_dirty.remove(&(family, level, index)) {
        Some(page) => page,
        None => err_at!(Fatal, msg: "indirect page ({:?},{},{}) not staged before write", family, level, index)?,
    };

    for slot in 0..page.fan_out() {
        let child_index = index * fan_out + slot as u64;
        if level + 1 < levels {
            if indirect_dirty.contains_key(&(family, level + 1, child_index)) {
                let child_offset = write_indirect_recursive(
                    resource,
                    indirect_dirty,
                    leaf_dirty,
                    touched_slots,
                    written_leaves,
                    family,
                    level + 1,
                    child_index,
                    levels,
                    fan_out,
                    is_full_dump,
                    window,
                )?;
                page.set(slot, child_offset);
            }
        } else if let Some(leaf) = leaf_dirty.remove(&(family, child_index)) {
            let offset = if let Some(&already) = written_leaves.get(&(family, child_index)) {
                already
            } else {
                let base_offset = page.get(slot);
                let base_version = match base_offset {
                    Some(offset) => Some(RecordPage::decode(&resource.read_page(offset)?)?.version),
                    None => None,
                };
                let next_version = base_version.unwrap_or(0) + 1;
                let force_full = is_full_dump || base_offset.is_none() || next_version >= window.max(1);
                let to_write = if force_full {
                    let mut full = leaf;
                    full.base = None;
                    full.version = 0;
                    full
                } else {
                    let mut delta = RecordPage::delta_on(base_offset.unwrap(), next_version);
                    if let Some(slots) = touched_slots.get(&(family, child_index)) {
                        for &s in slots {
                            if let Some(rec) = leaf.get(s) {
                                delta.upsert(s, rec.clone());
                            }
                        }
                    }
                    delta
                };
                let bytes = Page::Record(family.page_kind(), to_write).encode();
                let offset = resource.append_page(&bytes)?;
                written_leaves.insert((family, child_index), offset);
                offset
            };
            page.set(slot, Some(offset));
        }
    }

    let bytes = Page::Indirect(page).encode();
    let offset = resource.append_page(&bytes)?;
    Ok(Some(offset))
}

fn insert_revision_index(
    resource: &mut ResourceFile,
    geometry: &Geometry,
    root: Option<u64>,
    revision: u32,
    rr_offset: u64,
) -> Result<Option<u64>> {
    let indices = geometry.path_indices(revision as u64);
    let mut pages: Vec<IndirectPage> = Vec::with_capacity(indices.len());

    let mut offset = root;
    for &idx in &indices {
        let page = match offset {
            Some(off) => IndirectPage::decode(&resource.read_page(off)?)?,
            None => IndirectPage::new(geometry.fan_out as usize),
        };
        offset = page.get(idx);
        pages.push(page);
    }

    let mut child_offset = rr_offset;
    for (depth, mut page) in pages.into_iter().enumerate().rev() {
        let idx = indices[depth];
        page.set(idx, Some(child_offset));
        let bytes = Page::Indirect(page).encode();
        child_offset = resource.append_page(&bytes)?;
    }
    Ok(Some(child_offset))
}

fn locate_latest_revision_root(
    resource: &mut ResourceFile,
    geometry: &Geometry,
    uber: &UberPage,
) -> Result<u64> {
    let mut offset = match uber.revision_index_root {
        Some(offset) => offset,
        None => err_at!(PageNotFound, msg: "revision index is empty")?,
    };
    for &idx in &geometry.path_indices(uber.revision_count as u64) {
        let page = IndirectPage::decode(&resource.read_page(offset)?)?;
        match page.get(idx) {
            Some(next) => offset = next,
            None => err_at!(PageNotFound, msg: "latest revision not indexed")?,
        }
    }
    Ok(offset)
}

#[cfg(test)]
#[path = "write_test.rs"]
mod write_test;
