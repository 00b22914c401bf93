//! AVL-tree secondary-index layer (spec.md §4.6-§4.7), stored as
//! `AVLNode` records inside its own page family under the current
//! revision root. Grounded in `rdms::llrb::index::Index`'s recursive
//! descend/rewrite/rebalance shape (see [node]), with the LLRB
//! red/black balance criterion replaced by AVL height-balance — an
//! explicit spec-mandated redesign (DESIGN.md open question 1).
//!
//! The tree itself is storage-agnostic: [AvlStore] is the seam a
//! concrete page-tree transaction plugs into (see
//! [crate::nodetx::PageAvlStore]), so the rebalance and search logic
//! below can be exercised directly against an in-memory store in
//! tests without going through the whole resource-file stack.

pub mod node;

use std::cmp::Ordering;

use crate::codec::node::AvlNodeDelegate;
use crate::Result;

/// Storage seam for AVL nodes, keyed by the same node-key space as
/// every other record kind (spec.md §3.2 lists `AVLNode` alongside
/// `Element`/`Text`/etc. as one of the concrete node kinds sharing
/// that numbering).
pub trait AvlStore {
    fn load(&mut self, key: i64) -> Result<Option<AvlNodeDelegate>>;
    fn store(&mut self, key: i64, node: AvlNodeDelegate) -> Result<()>;
    fn delete(&mut self, key: i64) -> Result<()>;
    fn alloc(&mut self) -> i64;
}

/// Search modes supported over an index (spec.md §4.6).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchMode {
    Equal,
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
}

/// The `References` capability (spec.md §4.7): a duplicate-free, sorted
/// set of node keys, stored in a vector for binary-search add/remove/
/// contains. Grounded in `rdms::db::Entry`'s sorted-Vec-of-versions
/// style, adapted here to a flat set instead of a version chain.
pub trait References {
    fn add_node_key(&mut self, key: i64) -> bool;
    fn remove_node_key(&mut self, key: i64) -> bool;
    fn contains_node_key(&self, key: i64) -> bool;
}

impl References for Vec<i64> {
    fn add_node_key(&mut self, key: i64) -> bool {
        match self.binary_search(&key) {
            Ok(_) => false,
            Err(i) => {
                self.insert(i, key);
                true
            }
        }
    }

    fn remove_node_key(&mut self, key: i64) -> bool {
        match self.binary_search(&key) {
            Ok(i) => {
                self.remove(i);
                true
            }
            Err(_) => false,
        }
    }

    fn contains_node_key(&self, key: i64) -> bool {
        self.binary_search(&key).is_ok()
    }
}

/// An AVL secondary index rooted at `root` (`None` when empty).
/// `S` is the backing store, borrowed for the duration of an
/// `index`/`remove`/`search` call.
pub struct AvlTree<S: AvlStore> {
    store: S,
    root: Option<i64>,
}

impl<S: AvlStore> AvlTree<S> {
    pub fn new(store: S) -> Self {
        AvlTree { store, root: None }
    }

    pub fn with_root(store: S, root: Option<i64>) -> Self {
        AvlTree { store, root }
    }

    pub fn root(&self) -> Option<i64> {
        self.root
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// `index(k, v)` (spec.md §4.6): insert `key` with reference
    /// `reference`, or merge `reference` into the existing entry's
    /// `References` set on an exact key match. Clears the final root's
    /// `changed` flag on exit, per spec.md's rebalance bookkeeping.
    pub fn index(&mut self, key: &[u8], reference: i64) -> Result<()> {
        let new_root = self.do_index(self.root, key, reference)?;
        self.root = Some(new_root);
        self.clear_root_changed()?;
        Ok(())
    }

    fn do_index(&mut self, cur: Option<i64>, key: &[u8], reference: i64) -> Result<i64> {
        let node_key = match cur {
            None => {
                let k = self.store.alloc();
                self.store.store(k, AvlNodeDelegate::leaf(key.to_vec(), reference))?;
                return Ok(k);
            }
            Some(k) => k,
        };
        let mut existing = node::must_load(&mut self.store, node_key)?;
        match key.cmp(existing.key.as_slice()) {
            Ordering::Less => {
                let new_left = self.do_index(node::opt(existing.left), key, reference)?;
                existing.left = new_left;
                self.store.store(node_key, existing)?;
            }
            Ordering::Greater => {
                let new_right = self.do_index(node::opt(existing.right), key, reference)?;
                existing.right = new_right;
                self.store.store(node_key, existing)?;
            }
            Ordering::Equal => {
                existing.references.add_node_key(reference);
                existing.changed = true;
                self.store.store(node_key, existing)?;
                return Ok(node_key);
            }
        }
        node::rebalance(&mut self.store, node_key)
    }

    /// `remove(k, nodeKey)` (spec.md §4.6-§4.7, open question 1):
    /// drops `reference` from the matching key's `References` set and,
    /// once that set becomes empty, physically removes the AVL node
    /// (see DESIGN.md). Returns whether `reference` was present.
    pub fn remove(&mut self, key: &[u8], reference: i64) -> Result<bool> {
        let (new_root, removed) = self.do_remove(self.root, key, reference)?;
        self.root = new_root;
        if self.root.is_some() {
            self.clear_root_changed()?;
        }
        Ok(removed)
    }

    fn do_remove(&mut self, cur: Option<i64>, key: &[u8], reference: i64) -> Result<(Option<i64>, bool)> {
        let node_key = match cur {
            None => return Ok((None, false)),
            Some(k) => k,
        };
        let mut node = node::must_load(&mut self.store, node_key)?;
        let removed = match key.cmp(node.key.as_slice()) {
            Ordering::Less => {
                let (new_left, removed) = self.do_remove(node::opt(node.left), key, reference)?;
                node.left = node::or_null(new_left);
                self.store.store(node_key, node)?;
                removed
            }
            Ordering::Greater => {
                let (new_right, removed) = self.do_remove(node::opt(node.right), key, reference)?;
                node.right = node::or_null(new_right);
                self.store.store(node_key, node)?;
                removed
            }
            Ordering::Equal => {
                let removed = node.references.remove_node_key(reference);
                if !removed {
                    self.store.store(node_key, node)?;
                    return Ok((Some(node_key), false));
                }
                if !node.references.is_empty() {
                    node.changed = true;
                    self.store.store(node_key, node)?;
                    return Ok((Some(node_key), true));
                }
                // empty reference set: physically remove this node (DESIGN.md open question 1).
                let new_subtree = self.splice_out(node_key, &node)?;
                return Ok((new_subtree, true));
            }
        };
        let rebalanced = node::rebalance(&mut self.store, node_key)?;
        Ok((Some(rebalanced), removed))
    }

    /// Remove `node_key` (whose `References` are already empty) from
    /// the tree, returning the new subtree root.
    fn splice_out(&mut self, node_key: i64, node: &AvlNodeDelegate) -> Result<Option<i64>> {
        let left = node::opt(node.left);
        let right = node::opt(node.right);
        self.store.delete(node_key)?;

        let replacement = match (left, right) {
            (None, None) => None,
            (Some(l), None) => Some(l),
            (None, Some(r)) => Some(r),
            (Some(_), Some(r)) => {
                // successor = leftmost node of the right subtree
                let (successor_key, new_right) = self.remove_leftmost(r)?;
                let mut succ = node::must_load(&mut self.store, successor_key)?;
                succ.left = node::or_null(left);
                succ.right = node::or_null(new_right);
                self.store.store(successor_key, succ)?;
                Some(node::rebalance(&mut self.store, successor_key)?)
            }
        };
        Ok(replacement)
    }

    /// Detach and return the leftmost node under `subtree`, plus the
    /// new (rebalanced) root of what remains.
    fn remove_leftmost(&mut self, subtree: i64) -> Result<(i64, Option<i64>)> {
        let node = node::must_load(&mut self.store, subtree)?;
        match node::opt(node.left) {
            None => Ok((subtree, node::opt(node.right))),
            Some(left) => {
                let (leftmost, new_left) = self.remove_leftmost(left)?;
                let mut n = node;
                n.left = node::or_null(new_left);
                self.store.store(subtree, n)?;
                Ok((leftmost, Some(node::rebalance(&mut self.store, subtree)?)))
            }
        }
    }

    fn clear_root_changed(&mut self) -> Result<()> {
        if let Some(r) = self.root {
            let mut node = node::must_load(&mut self.store, r)?;
            node.changed = false;
            self.store.store(r, node)?;
        }
        Ok(())
    }

    /// BST descent recording the best-so-far candidate for `mode`
    /// (spec.md §4.6). Returns the matching node's `References`, if
    /// any.
    pub fn search(&mut self, key: &[u8], mode: SearchMode) -> Result<Option<Vec<i64>>> {
        let mut cur = self.root;
        let mut best: Option<i64> = None;
        while let Some(node_key) = cur {
            let node = node::must_load(&mut self.store, node_key)?;
            let ord = key.cmp(node.key.as_slice());
            match (mode, ord) {
                (SearchMode::Equal, Ordering::Equal) => return Ok(Some(node.references.clone())),
                (SearchMode::Equal, Ordering::Less) => cur = node::opt(node.left),
                (SearchMode::Equal, Ordering::Greater) => cur = node::opt(node.right),

                (SearchMode::Greater, Ordering::Less) => {
                    best = Some(node_key);
                    cur = node::opt(node.left);
                }
                (SearchMode::Greater, _) => cur = node::opt(node.right),

                (SearchMode::GreaterOrEqual, Ordering::Equal) => return Ok(Some(node.references.clone())),
                (SearchMode::GreaterOrEqual, Ordering::Less) => {
                    best = Some(node_key);
                    cur = node::opt(node.left);
                }
                (SearchMode::GreaterOrEqual, Ordering::Greater) => cur = node::opt(node.right),

                (SearchMode::Less, Ordering::Greater) => {
                    best = Some(node_key);
                    cur = node::opt(node.right);
                }
                (SearchMode::Less, _) => cur = node::opt(node.left),

                (SearchMode::LessOrEqual, Ordering::Equal) => return Ok(Some(node.references.clone())),
                (SearchMode::LessOrEqual, Ordering::Greater) => {
                    best = Some(node_key);
                    cur = node::opt(node.right);
                }
                (SearchMode::LessOrEqual, Ordering::Less) => cur = node::opt(node.left),
            }
        }
        match best {
            Some(node_key) => Ok(Some(node::must_load(&mut self.store, node_key)?.references)),
            None => Ok(None),
        }
    }
}

/// A plain in-memory [AvlStore], handy for unit tests that exercise
/// rebalancing without a resource file.
#[cfg(test)]
pub(crate) struct MemStore {
    pub nodes: std::collections::HashMap<i64, AvlNodeDelegate>,
    pub next_key: i64,
}

#[cfg(test)]
impl MemStore {
    pub fn new(start_key: i64) -> Self {
        MemStore { nodes: std::collections::HashMap::new(), next_key: start_key }
    }
}

#[cfg(test)]
impl AvlStore for MemStore {
    fn load(&mut self, key: i64) -> Result<Option<AvlNodeDelegate>> {
        Ok(self.nodes.get(&key).cloned())
    }

    fn store(&mut self, key: i64, node: AvlNodeDelegate) -> Result<()> {
        self.nodes.insert(key, node);
        Ok(())
    }

    fn delete(&mut self, key: i64) -> Result<()> {
        self.nodes.remove(&key);
        Ok(())
    }

    fn alloc(&mut self) -> i64 {
        let k = self.next_key;
        self.next_key += 1;
        k
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod mod_test;
