//! Read-only, revision-pinned view over a resource file (spec.md §4.1).
//! Grounded in `rdms::robt::reader::Reader`: a shared-locked file handle
//! plus an immutable root, except the "root" here is whichever
//! revision the caller pinned at `begin`, not necessarily the latest.

use std::path::Path;
use std::sync::Arc;

use crate::cache::{PageCache, PageCacheKey};
use crate::codec::page::{Page, RevisionRootPage, UberPage};
use crate::codec::{IndexFamily, NodeRecord, PageKind};
use crate::io::ResourceFile;
use crate::pagetree::{materialize_leaf, Geometry};
use crate::{Error, Result};

/// A snapshot-isolated reader pinned to one revision. Unaffected by any
/// commits made after `begin` (spec.md §5).
pub struct PageReadTransaction {
    resource: ResourceFile,
    cache: Arc<PageCache>,
    resource_id: u32,
    geometry: Geometry,
    window: u32,
    revision_root: RevisionRootPage,
}

impl PageReadTransaction {
    /// Pin `revision` (or the latest committed revision if `None`) and
    /// open a read-only handle for it.
    pub fn begin<P: AsRef<Path>>(
        path: P,
        revision: Option<u32>,
        resource_id: u32,
        cache: Arc<PageCache>,
    ) -> Result<PageReadTransaction> {
        let mut resource = ResourceFile::open_reader(path)?;
        let header = *resource.header();
        let geometry = Geometry::new(header.fan_out);

        if header.uber_offset == 0 {
            err_at!(PageNotFound, msg: "resource has no committed revisions")?;
        }
        let uber = UberPage::decode(&resource.read_page(header.uber_offset)?)?;

        let target = revision.unwrap_or(uber.revision_count);
        if target == 0 || target > uber.revision_count {
            err_at!(InvalidArgument, msg: "revision {} does not exist", target)?;
        }

        let rr_offset = Self::lookup_revision_root_offset(&mut resource, &geometry, &uber, target)?;
        let revision_root = RevisionRootPage::decode(&resource.read_page(rr_offset)?)?;

        Ok(PageReadTransaction {
            resource,
            cache,
            resource_id,
            geometry,
            window: header.window,
            revision_root,
        })
    }

    fn lookup_revision_root_offset(
        resource: &mut ResourceFile,
        geometry: &Geometry,
        uber: &UberPage,
        revision: u32,
    ) -> Result<u64> {
        let mut offset = match uber.revision_index_root {
            Some(offset) => offset,
            None => err_at!(PageNotFound, msg: "revision index is empty")?,
        };
        let indices = geometry.path_indices(revision as u64);
        for (depth, &idx) in indices.iter().enumerate() {
            let page = crate::codec::page::IndirectPage::decode(&resource.read_page(offset)?)?;
            match page.get(idx) {
                Some(next) => offset = next,
                None => err_at!(PageNotFound, msg: "revision {} not indexed at depth {}", revision, depth)?,
            }
        }
        Ok(offset)
    }

    pub fn revision(&self) -> u32 {
        self.revision_root.revision
    }

    pub fn max_node_key(&self) -> i64 {
        self.revision_root.max_node_key
    }

    /// Look up a record by full node key in the default record tree.
    pub fn get_record(&mut self, node_key: i64) -> Result<Option<NodeRecord>> {
        self.get_record_in(IndexFamily::Record, node_key)
    }

    /// Look up a record by full node key in an arbitrary index family
    /// tree (used by the AVL index, which is itself stored as a
    /// record-page family keyed by the AVL node's synthetic key).
    pub fn get_record_in(&mut self, family: IndexFamily, node_key: i64) -> Result<Option<NodeRecord>> {
        let bucket = self.geometry.bucket_of(node_key);
        let slot = self.geometry.slot_of(node_key);
        let leaf_offset = match self.find_leaf_offset(family, bucket)? {
            Some(offset) => offset,
            None => return Ok(None),
        };

        let cache_key = PageCacheKey {
            resource: self.resource_id,
            kind: family.page_kind(),
            level: u16::MAX,
            index: bucket,
            offset: leaf_offset,
        };
        let page = match self.cache.get(&cache_key) {
            Some(Page::Record(_, page)) => page,
            _ => {
                let page = materialize_leaf(&mut self.resource, leaf_offset, self.window)?;
                self.cache.put(cache_key, Page::Record(family.page_kind(), page.clone()));
                page
            }
        };

        Ok(page.get(slot).cloned())
    }

    /// Resolve a name key back to its interned string (spec.md §4.1),
    /// reading the persisted name-dictionary entry from the `NameDict`
    /// family rather than relying on any in-memory writer state.
    pub fn get_name(&mut self, key: i32) -> Result<Option<String>> {
        if key < 0 {
            return Ok(None);
        }
        match self.get_record_in(IndexFamily::NameDict, key as i64)? {
            Some(rec) if rec.kind == crate::codec::node::NodeKind::NameEntry => Ok(Some(rec.as_name_entry()?)),
            _ => Ok(None),
        }
    }

    fn find_leaf_offset(&mut self, family: IndexFamily, bucket: u64) -> Result<Option<u64>> {
        let mut offset = match Geometry::family_root(&self.revision_root, family) {
            Some(offset) => offset,
            None => return Ok(None),
        };
        for &idx in &self.geometry.path_indices(bucket) {
            let cache_key = PageCacheKey {
                resource: self.resource_id,
                kind: PageKind::Indirect,
                level: 0,
                index: offset,
                offset,
            };
            let page = match self.cache.get(&cache_key) {
                Some(Page::Indirect(page)) => page,
                _ => {
                    let page = crate::codec::page::IndirectPage::decode(&self.resource.read_page(offset)?)?;
                    self.cache.put(cache_key, Page::Indirect(page.clone()));
                    page
                }
            };
            match page.get(idx) {
                Some(next) => offset = next,
                None => return Ok(None),
            }
        }
        Ok(Some(offset))
    }
}

#[cfg(test)]
#[path = "read_test.rs"]
mod read_test;
