//! Cursor abstraction over a pinned revision (spec.md §6.4): the
//! embedding API surface through which shredders, XQuery evaluators and
//! diff algorithms navigate a document without knowing anything about
//! pages, offsets or the sliding window.

use crate::codec::node::{NodeKind, NodeRecord};
use crate::codec::{IndexFamily, NULL_NODE_KEY};
use crate::pagetree::read::PageReadTransaction;
use crate::{Error, Result};

/// Minimal navigation contract every concrete cursor implements.
/// Movement methods return `Ok(false)` rather than an error when the
/// requested neighbor doesn't exist (spec.md §3.3: absent pointers are
/// [NULL_NODE_KEY], not an error condition) and leave the cursor
/// positioned on the current node in that case.
pub trait NodeCursor {
    fn node_key(&self) -> i64;
    fn move_to(&mut self, node_key: i64) -> Result<bool>;
    fn move_to_parent(&mut self) -> Result<bool>;
    fn move_to_first_child(&mut self) -> Result<bool>;
    fn move_to_left_sibling(&mut self) -> Result<bool>;
    fn move_to_right_sibling(&mut self) -> Result<bool>;

    fn kind(&self) -> NodeKind;
    fn name(&self) -> Option<(i32, i32, i32)>;
    fn value(&self) -> Option<&[u8]>;

    fn has_parent(&self) -> bool;
    fn has_first_child(&self) -> bool;
    fn has_left_sibling(&self) -> bool;
    fn has_right_sibling(&self) -> bool;

    fn child_count(&self) -> i64;
    fn descendant_count(&self) -> i64;
}

/// Concrete cursor reading through a [PageReadTransaction].
pub struct ResourceCursor<'a> {
    rtx: &'a mut PageReadTransaction,
    current: NodeRecord,
}

impl<'a> ResourceCursor<'a> {
    pub fn new(rtx: &'a mut PageReadTransaction, start: i64) -> Result<Self> {
        let current = Self::fetch(rtx, start)?;
        Ok(ResourceCursor { rtx, current })
    }

    fn fetch(rtx: &mut PageReadTransaction, node_key: i64) -> Result<NodeRecord> {
        match rtx.get_record_in(IndexFamily::Record, node_key)? {
            Some(record) if !record.is_tombstone() => Ok(record),
            Some(_) => err_at!(KeyNotFound, msg: "node {} is deleted", node_key),
            None => err_at!(KeyNotFound, msg: "node {} does not exist", node_key),
        }
    }

    fn try_move(&mut self, target: i64) -> Result<bool> {
        if target == NULL_NODE_KEY {
            return Ok(false);
        }
        self.current = Self::fetch(self.rtx, target)?;
        Ok(true)
    }

    /// Resolves a key returned by [NodeCursor::name] back to its string
    /// (spec.md §4.1 `get_name`), reading the persisted name dictionary
    /// rather than any writer-side cache.
    pub fn resolve_name(&mut self, key: i32) -> Result<Option<String>> {
        self.rtx.get_name(key)
    }
}

impl<'a> NodeCursor for ResourceCursor<'a> {
    fn node_key(&self) -> i64 {
        self.current.node.node_key
    }

    fn move_to(&mut self, node_key: i64) -> Result<bool> {
        self.try_move(node_key)
    }

    fn move_to_parent(&mut self) -> Result<bool> {
        self.try_move(self.current.node.parent_key)
    }

    fn move_to_first_child(&mut self) -> Result<bool> {
        let target = self.current.strct.as_ref().map(|s| s.first_child).unwrap_or(NULL_NODE_KEY);
        self.try_move(target)
    }

    fn move_to_left_sibling(&mut self) -> Result<bool> {
        let target = self.current.strct.as_ref().map(|s| s.left_sibling).unwrap_or(NULL_NODE_KEY);
        self.try_move(target)
    }

    fn move_to_right_sibling(&mut self) -> Result<bool> {
        let target = self.current.strct.as_ref().map(|s| s.right_sibling).unwrap_or(NULL_NODE_KEY);
        self.try_move(target)
    }

    fn kind(&self) -> NodeKind {
        self.current.kind
    }

    fn name(&self) -> Option<(i32, i32, i32)> {
        self.current.name.as_ref().map(|n| (n.prefix_key, n.local_name_key, n.uri_key))
    }

    fn value(&self) -> Option<&[u8]> {
        self.current.val.as_ref().map(|v| v.value.as_slice())
    }

    fn has_parent(&self) -> bool {
        self.current.node.parent_key != NULL_NODE_KEY
    }

    fn has_first_child(&self) -> bool {
        self.current.strct.as_ref().map(|s| s.first_child != NULL_NODE_KEY).unwrap_or(false)
    }

    fn has_left_sibling(&self) -> bool {
        self.current.strct.as_ref().map(|s| s.left_sibling != NULL_NODE_KEY).unwrap_or(false)
    }

    fn has_right_sibling(&self) -> bool {
        self.current.strct.as_ref().map(|s| s.right_sibling != NULL_NODE_KEY).unwrap_or(false)
    }

    fn child_count(&self) -> i64 {
        self.current.strct.as_ref().map(|s| s.child_count).unwrap_or(0)
    }

    fn descendant_count(&self) -> i64 {
        self.current.strct.as_ref().map(|s| s.descendant_count).unwrap_or(0)
    }
}

#[cfg(test)]
#[path = "cursor_test.rs"]
mod cursor_test;
