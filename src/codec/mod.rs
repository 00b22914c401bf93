//! Binary (de)serialization for every page kind and every record kind
//! (spec.md §6.2, §6.3). Grounded in `rdms::robt::entry` and
//! `rdms::db::entry`'s explicit encode/decode style, but using a bespoke
//! fixed/varint byte layout rather than CBOR, since the on-disk format is
//! part of the specification (round-trip law: `decode(encode(x)) == x`
//! for every page and node kind).

pub mod node;
pub mod page;

pub use node::{NodeDelegate, NodeKind, NodeRecord, StructNodeDelegate};
pub use page::{IndirectPage, Page, RecordPage, RevisionRootPage, UberPage};

/// Reserved node-key sentinels (spec.md §3.1).
pub const NULL_NODE_KEY: i64 = -1;
pub const DOCUMENT_NODE_KEY: i64 = 0;

/// One-byte tag at the head of every serialized page (spec.md §6.2).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum PageKind {
    Uber = 0,
    RevisionRoot = 1,
    Indirect = 2,
    Record = 3,
    Name = 4,
    Path = 5,
    Cas = 6,
    PathSummary = 7,
    /// The persisted name dictionary (spec.md §3.1, §3.2): content-hash
    /// key to interned string, independent of the `Name` family's AVL
    /// search tree over element/attribute name strings.
    NameDict = 8,
}

impl PageKind {
    pub fn from_tag(tag: u8) -> crate::Result<PageKind> {
        use PageKind::*;
        Ok(match tag {
            0 => Uber,
            1 => RevisionRoot,
            2 => Indirect,
            3 => Record,
            4 => Name,
            5 => Path,
            6 => Cas,
            7 => PathSummary,
            8 => NameDict,
            tag => err_at!(Corruption, msg: "unknown page kind tag {}", tag)?,
        })
    }

    pub fn tag(self) -> u8 {
        self as u8
    }
}

/// Identifies one of the index families that each own their own
/// indirect sub-tree under the revision root (spec.md §4.1): name, path,
/// CAS, path-summary and the name dictionary. Kept distinct from
/// [PageKind] because a single `index` number (spec.md §4.1) selects
/// *which* name/path/CAS tree when an application opens more than one
/// secondary index of the same family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IndexFamily {
    Record,
    Name,
    Path,
    Cas,
    PathSummary,
    NameDict,
}

impl IndexFamily {
    pub fn page_kind(self) -> PageKind {
        match self {
            IndexFamily::Record => PageKind::Record,
            IndexFamily::Name => PageKind::Name,
            IndexFamily::Path => PageKind::Path,
            IndexFamily::Cas => PageKind::Cas,
            IndexFamily::PathSummary => PageKind::PathSummary,
            IndexFamily::NameDict => PageKind::NameDict,
        }
    }
}
