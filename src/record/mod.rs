//! Record-level view over the page-tree: the tagged [NodeKind]/
//! [NodeRecord] model (spec.md §3.2) and the [cursor::NodeCursor] trait
//! that the rest of the system (shredders, XQuery evaluators, diff
//! algorithms — all out of scope here) uses to walk a revision.

pub mod cursor;

pub use crate::codec::node::{NodeDelegate, NodeKind, NodeRecord, StructNodeDelegate};
pub use cursor::{NodeCursor, ResourceCursor};
