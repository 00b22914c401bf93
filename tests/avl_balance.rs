//! Property 3 (spec.md §8): after any sequence of index/remove
//! operations, every AVL index stays height-balanced (`validate_invariants`
//! walks every family and asserts `|height(left) - height(right)| <= 1`)
//! and keeps the document tree's structural invariants intact.

use std::sync::Arc;

use proptest::prelude::*;

use sirix_core::cache::{Config as CacheConfig, PageCache};
use sirix_core::codec::DOCUMENT_NODE_KEY;
use sirix_core::nodetx::{Config as NodeTxConfig, NodeWriteTransaction, QName};

fn new_cache() -> Arc<PageCache> {
    Arc::new(PageCache::new(CacheConfig::new()))
}

#[derive(Clone, Debug)]
enum Op {
    Insert(u8),
    RemoveOldest,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![3 => (0u8..6).prop_map(Op::Insert), 1 => Just(Op::RemoveOldest),]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn cas_index_stays_balanced_under_random_insert_remove(ops in prop::collection::vec(op_strategy(), 1..80)) {
        let dir = tempfile::tempdir().unwrap();
        let mut wtx = NodeWriteTransaction::create(
            dir.path().join("r.sirix"),
            4096,
            8,
            4,
            100,
            1,
            new_cache(),
            dir.path().join("r.txlog"),
            NodeTxConfig::default(),
        )
        .unwrap();
        let root = wtx.insert_element_as_first_child(DOCUMENT_NODE_KEY, QName::local("root")).unwrap();

        let mut live = Vec::new();
        for op in ops {
            match op {
                Op::Insert(b) => {
                    let value = vec![b];
                    let key = if let Some(&prev) = live.last() {
                        wtx.insert_text_as_right_sibling(prev, &value).unwrap()
                    } else {
                        wtx.insert_text_as_first_child(root, &value).unwrap()
                    };
                    live.push(key);
                }
                Op::RemoveOldest => {
                    if !live.is_empty() {
                        let key = live.remove(0);
                        wtx.remove(key).unwrap();
                    }
                }
            }
            wtx.validate_invariants().unwrap();
        }
    }
}
