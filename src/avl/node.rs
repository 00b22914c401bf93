//! Height bookkeeping and rotations for the AVL index (spec.md §4.6).
//! Grounded in `rdms::llrb::index`'s `rotate_left`/`rotate_right`/
//! `fixup` shape — recursive descent, rewrite-node-and-return-new-
//! subtree-root on the way back up — with the red/black criterion
//! swapped for AVL's `|height(left) - height(right)| <= 1`.

use super::AvlStore;
use crate::codec::node::AvlNodeDelegate;
use crate::codec::NULL_NODE_KEY;
use crate::Result;

pub(super) fn opt(key: i64) -> Option<i64> {
    if key == NULL_NODE_KEY {
        None
    } else {
        Some(key)
    }
}

pub(super) fn or_null(key: Option<i64>) -> i64 {
    key.unwrap_or(NULL_NODE_KEY)
}

pub(super) fn must_load<S: AvlStore>(store: &mut S, key: i64) -> Result<AvlNodeDelegate> {
    match store.load(key)? {
        Some(node) => Ok(node),
        None => err_at!(Corruption, msg: "avl node {} referenced but missing", key),
    }
}

pub(super) fn height_of<S: AvlStore>(store: &mut S, key: Option<i64>) -> Result<i32> {
    match key {
        None => Ok(0),
        Some(k) => Ok(must_load(store, k)?.height),
    }
}

fn recompute_height<S: AvlStore>(store: &mut S, node: &mut AvlNodeDelegate) -> Result<()> {
    let lh = height_of(store, opt(node.left))?;
    let rh = height_of(store, opt(node.right))?;
    node.height = 1 + lh.max(rh);
    Ok(())
}

fn balance_factor<S: AvlStore>(store: &mut S, node: &AvlNodeDelegate) -> Result<i32> {
    let lh = height_of(store, opt(node.left))?;
    let rh = height_of(store, opt(node.right))?;
    Ok(lh - rh)
}

//            node                      left
//            /  \                      /  \
//          left  c                  l-l   node
//          / \                            /  \
//       l-l  l-r                        l-r    c
pub(super) fn rotate_right<S: AvlStore>(store: &mut S, node_key: i64) -> Result<i64> {
    let mut node = must_load(store, node_key)?;
    let left_key = node.left;
    let mut left = must_load(store, left_key)?;

    node.left = left.right;
    left.right = node_key;

    recompute_height(store, &mut node)?;
    store.store(node_key, node)?;
    recompute_height(store, &mut left)?;
    store.store(left_key, left)?;
    Ok(left_key)
}

//          node                         right
//          /  \                         /  \
//         a   right                  node   r-r
//             /  \                   /  \
//           r-l  r-r                a   r-l
pub(super) fn rotate_left<S: AvlStore>(store: &mut S, node_key: i64) -> Result<i64> {
    let mut node = must_load(store, node_key)?;
    let right_key = node.right;
    let mut right = must_load(store, right_key)?;

    node.right = right.left;
    right.left = node_key;

    recompute_height(store, &mut node)?;
    store.store(node_key, node)?;
    recompute_height(store, &mut right)?;
    store.store(right_key, right)?;
    Ok(right_key)
}

/// Recompute `node_key`'s height and, if it has become unbalanced,
/// apply the appropriate single or double rotation. Returns the key
/// that is now the root of this subtree (unchanged unless a rotation
/// happened). Marks the returned root `changed` per spec.md §4.6's
/// rebalance-walk bookkeeping.
pub(super) fn rebalance<S: AvlStore>(store: &mut S, node_key: i64) -> Result<i64> {
    let mut node = must_load(store, node_key)?;
    recompute_height(store, &mut node)?;
    node.changed = true;
    store.store(node_key, node.clone())?;

    let balance = balance_factor(store, &node)?;

    let new_root = if balance > 1 {
        let left = must_load(store, node.left)?;
        if balance_factor(store, &left)? < 0 {
            let new_left = rotate_left(store, node.left)?;
            let mut n = must_load(store, node_key)?;
            n.left = new_left;
            store.store(node_key, n)?;
        }
        rotate_right(store, node_key)?
    } else if balance < -1 {
        let right = must_load(store, node.right)?;
        if balance_factor(store, &right)? > 0 {
            let new_right = rotate_right(store, node.right)?;
            let mut n = must_load(store, node_key)?;
            n.right = new_right;
            store.store(node_key, n)?;
        }
        rotate_left(store, node_key)?
    } else {
        node_key
    };

    let mut root = must_load(store, new_root)?;
    root.changed = true;
    store.store(new_root, root)?;
    Ok(new_root)
}
