//! On-disk format for pages (spec.md §6.2): indirect pages form the
//! fan-out tree that addresses record/name/path/CAS/path-summary
//! leaves; the uber page and revision-root page linearize revisions on
//! top of that tree.

use crate::codec::node::NodeRecord;
use crate::util::varint;
use crate::{Error, Result};

/// An indirect page: `fan_out` slots, each either empty or an 8-byte
/// offset to the next page down (another indirect page, or a leaf
/// record/name/path/CAS/path-summary page).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndirectPage {
    pub slots: Vec<Option<u64>>,
}

impl IndirectPage {
    pub fn new(fan_out: usize) -> Self {
        IndirectPage { slots: vec![None; fan_out] }
    }

    pub fn fan_out(&self) -> usize {
        self.slots.len()
    }

    pub fn get(&self, idx: usize) -> Option<u64> {
        self.slots[idx]
    }

    pub fn set(&mut self, idx: usize, offset: Option<u64>) {
        self.slots[idx] = offset;
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + self.slots.len() * 9);
        buf.extend_from_slice(&(self.slots.len() as u32).to_be_bytes());
        for slot in &self.slots {
            match slot {
                Some(offset) => {
                    buf.push(1);
                    buf.extend_from_slice(&offset.to_be_bytes());
                }
                None => {
                    buf.push(0);
                    buf.extend_from_slice(&0u64.to_be_bytes());
                }
            }
        }
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<IndirectPage> {
        if buf.len() < 4 {
            err_at!(Corruption, msg: "truncated indirect page")?;
        }
        let fan_out = u32::from_be_bytes(buf[0..4].try_into().unwrap()) as usize;
        let mut slots = Vec::with_capacity(fan_out);
        let mut off = 4;
        for _ in 0..fan_out {
            if buf.len() < off + 9 {
                err_at!(Corruption, msg: "truncated indirect page slot")?;
            }
            let present = buf[off];
            let offset = u64::from_be_bytes(buf[off + 1..off + 9].try_into().unwrap());
            slots.push(if present == 1 { Some(offset) } else { None });
            off += 9;
        }
        Ok(IndirectPage { slots })
    }
}

/// A leaf page holding up to `page_size` records, keyed by the
/// low-order slice of the full node key (spec.md §4.5). Entries are
/// kept sorted by `intra_key` so merge and lookup are both binary
/// searches; a present entry whose [NodeRecord::is_tombstone] is true
/// records a deletion rather than absence, so a sliding-window merge
/// over older deltas can tell "deleted in this window" apart from
/// "never touched, fall through to the next delta".
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct RecordPage {
    pub entries: Vec<(u64, NodeRecord)>,
    /// Offset of the page this one deltas against, `None` when this
    /// page is a full materialized dump (spec.md §4.5: "every
    /// `full_dump_every` revisions, write a full page instead of a
    /// delta"). A read transaction walks `base` at most `window` hops
    /// back, merging oldest to newest, to materialize the current
    /// state of a bucket.
    pub base: Option<u64>,
    /// Delta depth since the last full dump of this leaf: 0 on a full
    /// page, `base.version + 1` on a delta. Tracked per-leaf so a
    /// bucket touched only on off-cadence revisions still gets forced
    /// to a full dump before its chain exceeds the read-side window,
    /// rather than relying solely on the global per-commit cadence.
    pub version: u32,
}

impl RecordPage {
    pub fn new() -> Self {
        RecordPage { entries: Vec::new(), base: None, version: 0 }
    }

    pub fn delta_on(base: u64, version: u32) -> Self {
        RecordPage { entries: Vec::new(), base: Some(base), version }
    }

    fn find(&self, intra_key: u64) -> std::result::Result<usize, usize> {
        self.entries.binary_search_by_key(&intra_key, |(k, _)| *k)
    }

    pub fn get(&self, intra_key: u64) -> Option<&NodeRecord> {
        self.find(intra_key).ok().map(|i| &self.entries[i].1)
    }

    pub fn upsert(&mut self, intra_key: u64, record: NodeRecord) {
        match self.find(intra_key) {
            Ok(i) => self.entries[i].1 = record,
            Err(i) => self.entries.insert(i, (intra_key, record)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge `newer` on top of `self` (which is older), newer entries
    /// shadowing older ones at the same `intra_key`. Used to collapse a
    /// sliding window of `W` delta pages down to one materialized page
    /// (spec.md §4.5).
    pub fn merge_newer(&self, newer: &RecordPage) -> RecordPage {
        let mut merged = self.clone();
        for (key, record) in &newer.entries {
            merged.upsert(*key, record.clone());
        }
        merged.version = newer.version;
        merged
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        encode_offset(&mut buf, self.base);
        buf.extend_from_slice(&self.version.to_be_bytes());
        buf.extend_from_slice(&(self.entries.len() as u32).to_be_bytes());
        for (intra_key, record) in &self.entries {
            varint::write_u64(&mut buf, *intra_key);
            let body = record.encode();
            varint::write_u64(&mut buf, body.len() as u64);
            buf.extend_from_slice(&body);
        }
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<RecordPage> {
        let mut off = 0;
        let base = decode_offset(buf, &mut off)?;
        if buf.len() < off + 4 {
            err_at!(Corruption, msg: "truncated record page version")?;
        }
        let version = u32::from_be_bytes(buf[off..off + 4].try_into().unwrap());
        off += 4;
        if buf.len() < off + 4 {
            err_at!(Corruption, msg: "truncated record page")?;
        }
        let count = u32::from_be_bytes(buf[off..off + 4].try_into().unwrap());
        off += 4;
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let (intra_key, n) = varint::read_u64(&buf[off..])?;
            off += n;
            let (body_len, n) = varint::read_u64(&buf[off..])?;
            off += n;
            let body_len = body_len as usize;
            if buf.len() < off + body_len {
                err_at!(Corruption, msg: "truncated record page entry body")?;
            }
            let (record, consumed) = NodeRecord::decode(&buf[off..off + body_len])?;
            if consumed != body_len {
                err_at!(Corruption, msg: "record body length mismatch")?;
            }
            off += body_len;
            entries.push((intra_key, record));
        }
        Ok(RecordPage { entries, base, version })
    }
}

/// Root of one committed revision (spec.md §4.2, §4.8): pointers to the
/// top of the record-tree and of each secondary-index tree as they
/// stood when this revision was committed, plus the allocation
/// watermark needed to resume node-key allocation after reopen.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RevisionRootPage {
    pub revision: u32,
    pub timestamp_millis: i64,
    pub max_node_key: i64,
    pub record_root: Option<u64>,
    pub name_index_root: Option<u64>,
    pub path_index_root: Option<u64>,
    pub cas_index_root: Option<u64>,
    pub path_summary_root: Option<u64>,
    pub name_dict_root: Option<u64>,
    /// True when this revision was written as a full materialized dump
    /// rather than a delta over the prior window (spec.md §4.5, full
    /// dump every `full_dump_every` revisions).
    pub full_dump: bool,
}

fn encode_offset(buf: &mut Vec<u8>, offset: Option<u64>) {
    match offset {
        Some(o) => {
            buf.push(1);
            buf.extend_from_slice(&o.to_be_bytes());
        }
        None => {
            buf.push(0);
            buf.extend_from_slice(&0u64.to_be_bytes());
        }
    }
}

fn decode_offset(buf: &[u8], off: &mut usize) -> Result<Option<u64>> {
    if buf.len() < *off + 9 {
        err_at!(Corruption, msg: "truncated offset field")?;
    }
    let present = buf[*off];
    let value = u64::from_be_bytes(buf[*off + 1..*off + 9].try_into().unwrap());
    *off += 9;
    Ok(if present == 1 { Some(value) } else { None })
}

impl RevisionRootPage {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.revision.to_be_bytes());
        buf.extend_from_slice(&self.timestamp_millis.to_be_bytes());
        buf.extend_from_slice(&self.max_node_key.to_be_bytes());
        encode_offset(&mut buf, self.record_root);
        encode_offset(&mut buf, self.name_index_root);
        encode_offset(&mut buf, self.path_index_root);
        encode_offset(&mut buf, self.cas_index_root);
        encode_offset(&mut buf, self.path_summary_root);
        encode_offset(&mut buf, self.name_dict_root);
        buf.push(self.full_dump as u8);
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<RevisionRootPage> {
        if buf.len() < 4 + 8 + 8 {
            err_at!(Corruption, msg: "truncated revision root page")?;
        }
        let revision = u32::from_be_bytes(buf[0..4].try_into().unwrap());
        let timestamp_millis = i64::from_be_bytes(buf[4..12].try_into().unwrap());
        let max_node_key = i64::from_be_bytes(buf[12..20].try_into().unwrap());
        let mut off = 20;
        let record_root = decode_offset(buf, &mut off)?;
        let name_index_root = decode_offset(buf, &mut off)?;
        let path_index_root = decode_offset(buf, &mut off)?;
        let cas_index_root = decode_offset(buf, &mut off)?;
        let path_summary_root = decode_offset(buf, &mut off)?;
        let name_dict_root = decode_offset(buf, &mut off)?;
        if buf.len() < off + 1 {
            err_at!(Corruption, msg: "truncated revision root page tail")?;
        }
        let full_dump = buf[off] != 0;
        Ok(RevisionRootPage {
            revision,
            timestamp_millis,
            max_node_key,
            record_root,
            name_index_root,
            path_index_root,
            cas_index_root,
            path_summary_root,
            name_dict_root,
            full_dump,
        })
    }
}

/// Top of the whole resource file (spec.md §6.1): addresses every
/// committed revision root through its own indirect tree, keyed by
/// revision number, so opening an arbitrary past revision is a tree
/// walk rather than a linear scan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UberPage {
    pub revision_count: u32,
    pub max_node_key: i64,
    pub revision_index_root: Option<u64>,
}

impl UberPage {
    pub fn empty() -> Self {
        UberPage { revision_count: 0, max_node_key: crate::codec::DOCUMENT_NODE_KEY, revision_index_root: None }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.revision_count.to_be_bytes());
        buf.extend_from_slice(&self.max_node_key.to_be_bytes());
        encode_offset(&mut buf, self.revision_index_root);
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<UberPage> {
        if buf.len() < 4 + 8 {
            err_at!(Corruption, msg: "truncated uber page")?;
        }
        let revision_count = u32::from_be_bytes(buf[0..4].try_into().unwrap());
        let max_node_key = i64::from_be_bytes(buf[4..12].try_into().unwrap());
        let mut off = 12;
        let revision_index_root = decode_offset(buf, &mut off)?;
        Ok(UberPage { revision_count, max_node_key, revision_index_root })
    }
}

/// Tagged union over every page kind, used by the cache and the
/// transaction log which store pages generically (spec.md §4.3, §4.4).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Page {
    Uber(UberPage),
    RevisionRoot(RevisionRootPage),
    Indirect(IndirectPage),
    /// A leaf page; the [super::PageKind] records which family
    /// (record/name/path/CAS/path-summary) it belongs to, since all
    /// five families share the same [RecordPage] wire shape.
    Record(super::PageKind, RecordPage),
}

impl Page {
    pub fn kind(&self) -> super::PageKind {
        use super::PageKind;
        match self {
            Page::Uber(_) => PageKind::Uber,
            Page::RevisionRoot(_) => PageKind::RevisionRoot,
            Page::Indirect(_) => PageKind::Indirect,
            Page::Record(kind, _) => *kind,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![self.kind().tag()];
        match self {
            Page::Uber(p) => buf.extend_from_slice(&p.encode()),
            Page::RevisionRoot(p) => buf.extend_from_slice(&p.encode()),
            Page::Indirect(p) => buf.extend_from_slice(&p.encode()),
            Page::Record(_, p) => buf.extend_from_slice(&p.encode()),
        }
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Page> {
        if buf.is_empty() {
            err_at!(Corruption, msg: "empty page")?;
        }
        let kind = super::PageKind::from_tag(buf[0])?;
        let body = &buf[1..];
        Ok(match kind {
            super::PageKind::Uber => Page::Uber(UberPage::decode(body)?),
            super::PageKind::RevisionRoot => Page::RevisionRoot(RevisionRootPage::decode(body)?),
            super::PageKind::Indirect => Page::Indirect(IndirectPage::decode(body)?),
            super::PageKind::Record
            | super::PageKind::Name
            | super::PageKind::Path
            | super::PageKind::Cas
            | super::PageKind::PathSummary
            | super::PageKind::NameDict => Page::Record(kind, RecordPage::decode(body)?),
        })
    }
}

#[cfg(test)]
#[path = "page_test.rs"]
mod page_test;
