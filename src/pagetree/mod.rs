//! Shared indirect-tree indexing math (spec.md §3.2, §4.1-§4.2): how a
//! 64-bit key is decomposed into the sequence of fan-out slots a page
//! read/write transaction must walk to reach its leaf record page.

pub mod read;
pub mod write;

pub use read::PageReadTransaction;
pub use write::PageWriteTransaction;

/// Describes how keys are sliced across the indirect-page tree for one
/// open resource. `fan_out` must be a power of two (spec.md default is
/// 128); `levels` is derived so that the tree addresses the full
/// 64-bit key space rather than hard-coding a level count that would
/// only cover a fraction of it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Geometry {
    pub fan_out: u32,
    pub bits_per_level: u32,
    pub levels: u32,
}

impl Geometry {
    pub fn new(fan_out: u32) -> Self {
        assert!(fan_out.is_power_of_two(), "fan_out must be a power of two");
        let bits_per_level = fan_out.trailing_zeros();
        // One level's worth of bits addresses the slot *within* a leaf
        // record page; the remaining bits are covered by indirect
        // levels above it.
        let remaining_bits = 64 - bits_per_level;
        let levels = (remaining_bits + bits_per_level - 1) / bits_per_level;
        Geometry { fan_out, bits_per_level, levels }
    }

    /// Which leaf bucket a full node key falls into.
    pub fn bucket_of(&self, key: i64) -> u64 {
        (key as u64) >> self.bits_per_level
    }

    /// Slot within the leaf bucket's record page.
    pub fn slot_of(&self, key: i64) -> u64 {
        (key as u64) & ((1u64 << self.bits_per_level) - 1)
    }

    /// Sequence of indirect-page slot indices to walk, most-significant
    /// digit first, to reach the leaf page holding `bucket`.
    pub fn path_indices(&self, bucket: u64) -> Vec<usize> {
        let mut indices = Vec::with_capacity(self.levels as usize);
        for level in (0..self.levels).rev() {
            let shift = level * self.bits_per_level;
            let digit = (bucket >> shift) & ((1u64 << self.bits_per_level) - 1);
            indices.push(digit as usize);
        }
        indices
    }

    /// Retrieve a family-tree root's family accessor for
    /// [crate::codec::page::RevisionRootPage].
    pub fn family_root(
        rr: &crate::codec::page::RevisionRootPage,
        family: crate::codec::IndexFamily,
    ) -> Option<u64> {
        use crate::codec::IndexFamily::*;
        match family {
            Record => rr.record_root,
            Name => rr.name_index_root,
            Path => rr.path_index_root,
            Cas => rr.cas_index_root,
            PathSummary => rr.path_summary_root,
            NameDict => rr.name_dict_root,
        }
    }

    pub fn set_family_root(
        rr: &mut crate::codec::page::RevisionRootPage,
        family: crate::codec::IndexFamily,
        offset: Option<u64>,
    ) {
        use crate::codec::IndexFamily::*;
        match family {
            Record => rr.record_root = offset,
            Name => rr.name_index_root = offset,
            Path => rr.path_index_root = offset,
            Cas => rr.cas_index_root = offset,
            PathSummary => rr.path_summary_root = offset,
            NameDict => rr.name_dict_root = offset,
        }
    }
}

/// Walk the on-disk chain of delta pages starting at `offset` back to
/// the nearest full dump or `window` hops, whichever comes first, then
/// merge oldest-to-newest into one materialized [crate::codec::page::RecordPage]
/// (spec.md §4.5).
pub fn materialize_leaf(
    resource: &mut crate::io::ResourceFile,
    offset: u64,
    window: u32,
) -> crate::Result<crate::codec::page::RecordPage> {
    use crate::codec::page::RecordPage;

    let mut chain = Vec::new();
    let mut cur = Some(offset);
    let mut hops = 0u32;
    while let Some(off) = cur {
        let bytes = resource.read_page(off)?;
        let page = RecordPage::decode(&bytes)?;
        let base = page.base;
        chain.push(page);
        hops += 1;
        if base.is_none() || hops >= window.max(1) {
            break;
        }
        cur = base;
    }
    chain.reverse();
    let mut merged = chain.remove(0);
    merged.base = None;
    for page in &chain {
        merged = merged.merge_newer(page);
    }
    Ok(merged)
}
