use super::*;

fn check_balanced(tree: &mut AvlTree<MemStore>, key: Option<i64>) -> i32 {
    match key {
        None => 0,
        Some(k) => {
            let node = tree.store.nodes.get(&k).unwrap().clone();
            let lh = check_balanced(tree, node::opt(node.left));
            let rh = check_balanced(tree, node::opt(node.right));
            assert!((lh - rh).abs() <= 1, "node {} unbalanced: lh={} rh={}", k, lh, rh);
            1 + lh.max(rh)
        }
    }
}

fn in_order(tree: &AvlTree<MemStore>, key: Option<i64>, out: &mut Vec<Vec<u8>>) {
    if let Some(k) = key {
        let node = tree.store.nodes.get(&k).unwrap().clone();
        in_order(tree, node::opt(node.left), out);
        out.push(node.key.clone());
        in_order(tree, node::opt(node.right), out);
    }
}

#[test]
fn test_index_merges_duplicate_key() {
    let mut tree = AvlTree::new(MemStore::new(1));
    tree.index(b"x", 10).unwrap();
    tree.index(b"x", 3).unwrap();
    let refs = tree.search(b"x", SearchMode::Equal).unwrap().unwrap();
    assert_eq!(refs, vec![3, 10]);
}

#[test]
fn test_search_modes_match_scenario_s3() {
    // S3: insert "x", "y", "x" as CAS index values.
    let mut tree = AvlTree::new(MemStore::new(1));
    tree.index(b"x", 100).unwrap();
    tree.index(b"y", 200).unwrap();
    tree.index(b"x", 300).unwrap();

    let eq_x = tree.search(b"x", SearchMode::Equal).unwrap().unwrap();
    assert_eq!(eq_x, vec![100, 300]);

    let gt_x = tree.search(b"x", SearchMode::Greater).unwrap().unwrap();
    assert_eq!(gt_x, vec![200]);
}

#[test]
fn test_search_modes_greater_or_equal_and_less() {
    let mut tree = AvlTree::new(MemStore::new(1));
    for (k, r) in [("a", 1), ("c", 2), ("e", 3), ("g", 4)] {
        tree.index(k.as_bytes(), r).unwrap();
    }
    assert_eq!(tree.search(b"c", SearchMode::GreaterOrEqual).unwrap().unwrap(), vec![2]);
    assert_eq!(tree.search(b"d", SearchMode::GreaterOrEqual).unwrap().unwrap(), vec![3]);
    assert_eq!(tree.search(b"d", SearchMode::LessOrEqual).unwrap().unwrap(), vec![2]);
    assert_eq!(tree.search(b"f", SearchMode::Less).unwrap().unwrap(), vec![3]);
    assert!(tree.search(b"z", SearchMode::Greater).unwrap().is_none());
    assert!(tree.search(b"a", SearchMode::Less).unwrap().is_none());
}

#[test]
fn test_balance_after_ascending_inserts() {
    let mut tree = AvlTree::new(MemStore::new(1));
    for i in 0..200i64 {
        let key = format!("{:06}", i);
        tree.index(key.as_bytes(), i).unwrap();
    }
    let root = tree.root();
    let height = check_balanced(&mut tree, root);
    // a balanced tree over 200 keys has height well under a degenerate
    // list's 200; log2(200) ~ 7.6
    assert!(height < 20, "height {} too large for a balanced tree", height);

    let mut ordered = Vec::new();
    in_order(&tree, tree.root(), &mut ordered);
    let mut expected: Vec<Vec<u8>> = (0..200i64).map(|i| format!("{:06}", i).into_bytes()).collect();
    expected.sort();
    assert_eq!(ordered, expected);
}

#[test]
fn test_balance_after_descending_inserts() {
    let mut tree = AvlTree::new(MemStore::new(1));
    for i in (0..200i64).rev() {
        let key = format!("{:06}", i);
        tree.index(key.as_bytes(), i).unwrap();
    }
    let root = tree.root();
    check_balanced(&mut tree, root);
}

#[test]
fn test_remove_last_reference_physically_removes_node() {
    let mut tree = AvlTree::new(MemStore::new(1));
    tree.index(b"a", 1).unwrap();
    tree.index(b"b", 2).unwrap();

    let removed = tree.remove(b"a", 1).unwrap();
    assert!(removed);
    assert!(tree.search(b"a", SearchMode::Equal).unwrap().is_none());
    assert_eq!(tree.store.nodes.len(), 1);
}

#[test]
fn test_remove_one_of_several_references_keeps_node() {
    let mut tree = AvlTree::new(MemStore::new(1));
    tree.index(b"a", 1).unwrap();
    tree.index(b"a", 2).unwrap();

    assert!(tree.remove(b"a", 1).unwrap());
    let refs = tree.search(b"a", SearchMode::Equal).unwrap().unwrap();
    assert_eq!(refs, vec![2]);
    assert_eq!(tree.store.nodes.len(), 1);
}

#[test]
fn test_remove_missing_reference_returns_false() {
    let mut tree = AvlTree::new(MemStore::new(1));
    tree.index(b"a", 1).unwrap();
    assert!(!tree.remove(b"a", 99).unwrap());
}

#[test]
fn test_remove_node_with_two_children_stays_balanced() {
    let mut tree = AvlTree::new(MemStore::new(1));
    for (k, r) in [("c", 1), ("a", 2), ("e", 3), ("b", 4), ("d", 5), ("f", 6)] {
        tree.index(k.as_bytes(), r).unwrap();
    }
    assert!(tree.remove(b"c", 1).unwrap());
    let root = tree.root();
    check_balanced(&mut tree, root);
    let mut ordered = Vec::new();
    in_order(&tree, tree.root(), &mut ordered);
    assert_eq!(ordered, vec![b"a".to_vec(), b"b".to_vec(), b"d".to_vec(), b"e".to_vec(), b"f".to_vec()]);
}

#[test]
fn test_references_trait_sorted_dedup() {
    let mut refs: Vec<i64> = Vec::new();
    assert!(refs.add_node_key(5));
    assert!(refs.add_node_key(2));
    assert!(!refs.add_node_key(5));
    assert_eq!(refs, vec![2, 5]);
    assert!(refs.contains_node_key(2));
    assert!(refs.remove_node_key(2));
    assert!(!refs.contains_node_key(2));
}
