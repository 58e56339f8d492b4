use std::{format, ops::Range, string::String, vec, vec::Vec};

use proptest::prelude::*;

use crate::model::{self, TestNode};

use super::*;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn tree_of(keys: &[u32]) -> AvlTree<TestNode> {
    let mut tree: AvlTree<TestNode> = AvlTree::new();

    for &key in keys {
        assert!(tree.insert(TestNode::new(key, key * 10)).is_none());
        tree.assert_invariants();
    }

    tree
}

// Returns the key and balance factor of the node reached by following `path` from the root, where
// each `L` or `R` steps to the left or right child.
fn node_at(tree: &AvlTree<TestNode>, path: &str) -> (u32, i8) {
    let mut cur = tree.root.expect("tree is empty");

    for step in path.chars() {
        let links = unsafe { tree.links(cur) };
        cur = match step {
            'L' => links.left(),
            'R' => links.right(),
            _ => panic!("invalid path step {step:?}"),
        }
        .unwrap_or_else(|| panic!("no node at {path:?}"));
    }

    unsafe { (cur.as_ref().key, tree.links(cur).balance()) }
}

fn assert_leaf(tree: &AvlTree<TestNode>, path: &str, key: u32) {
    assert_eq!(node_at(tree, path), (key, 0), "at {path:?}");

    let mut cur = tree.root.unwrap();
    for step in path.chars() {
        let links = unsafe { tree.links(cur) };
        cur = (if step == 'L' { links.left() } else { links.right() }).unwrap();
    }
    assert!(unsafe { tree.links(cur).is_leaf() }, "{key} is not a leaf");
}

// Returns `(key, value, balance)` for every node in preorder, which pins down the shape of the
// tree along with all of its contents.
fn snapshot(tree: &AvlTree<TestNode>) -> Vec<(u32, u32, i8)> {
    fn walk(tree: &AvlTree<TestNode>, node: Link<TestNode>, out: &mut Vec<(u32, u32, i8)>) {
        let Some(node) = node else {
            return;
        };

        unsafe {
            let links = tree.links(node);
            out.push((node.as_ref().key, node.as_ref().value, links.balance()));
            walk(tree, links.left(), out);
            walk(tree, links.right(), out);
        }
    }

    let mut out = Vec::new();
    walk(tree, tree.root, &mut out);
    out
}

fn permutations(keys: &[u32]) -> Vec<Vec<u32>> {
    if keys.len() <= 1 {
        return vec![keys.to_vec()];
    }

    let mut out = Vec::new();
    for (i, &first) in keys.iter().enumerate() {
        let mut rest = keys.to_vec();
        rest.remove(i);

        for mut perm in permutations(&rest) {
            perm.insert(0, first);
            out.push(perm);
        }
    }

    out
}

fn insert_find_all(keys: &[u32]) {
    let tree = tree_of(keys);

    for key in keys {
        let node = tree.find_raw(key).expect("item not found");
        assert_eq!(unsafe { node.as_ref().key() }, key);
    }

    assert_eq!(tree.len(), keys.len());
}

#[test]
fn zero_elems_find() {
    insert_find_all(&[]);
}

#[test]
fn single_elem_find() {
    insert_find_all(&[0]);
}

#[test]
fn two_elems_find() {
    insert_find_all(&[0, 1]);
    insert_find_all(&[1, 0]);
}

#[test]
fn three_elems_find() {
    insert_find_all(&[0, 1, 2]);
    insert_find_all(&[0, 2, 1]);
    insert_find_all(&[1, 0, 2]);
    insert_find_all(&[1, 2, 0]);
    insert_find_all(&[2, 0, 1]);
    insert_find_all(&[2, 1, 0]);
}

#[test]
fn up_to_seven_elems_find() {
    for n in 4..=7 {
        let keys: Vec<u32> = (0..n).collect();
        for perm in permutations(&keys) {
            insert_find_all(&perm);
        }
    }
}

fn insert_remove_all(keys: &[u32], removal_order: &[u32]) {
    let mut tree = tree_of(keys);

    for key in removal_order {
        let node = tree.remove(key).expect("item not found");
        assert_eq!(node.key, *key);
        assert_eq!(node.value, *key * 10);
        tree.assert_invariants();
    }

    assert!(tree.is_empty());
    assert!(tree.root.is_none());
}

#[test]
fn remove_one() {
    insert_remove_all(&[0], &[0]);
}

#[test]
fn remove_two() {
    insert_remove_all(&[0, 1], &[0, 1]);
    insert_remove_all(&[0, 1], &[1, 0]);
    insert_remove_all(&[1, 0], &[0, 1]);
    insert_remove_all(&[1, 0], &[1, 0]);
}

#[test]
fn remove_all_orders() {
    for n in 3..=5 {
        let keys: Vec<u32> = (0..n).collect();
        let perms = permutations(&keys);

        for insert_order in &perms {
            for removal_order in &perms {
                insert_remove_all(insert_order, removal_order);
            }
        }
    }
}

#[test]
fn left_left_single_rotation() {
    let tree = tree_of(&[3, 2, 1]);

    assert_eq!(node_at(&tree, ""), (2, 0));
    assert_leaf(&tree, "L", 1);
    assert_leaf(&tree, "R", 3);
}

#[test]
fn left_right_double_rotation() {
    let tree = tree_of(&[3, 1, 2]);

    assert_eq!(node_at(&tree, ""), (2, 0));
    assert_leaf(&tree, "L", 1);
    assert_leaf(&tree, "R", 3);
}

#[test]
fn right_right_single_rotation() {
    let tree = tree_of(&[1, 2, 3]);

    assert_eq!(node_at(&tree, ""), (2, 0));
    assert_leaf(&tree, "L", 1);
    assert_leaf(&tree, "R", 3);
}

#[test]
fn right_left_double_rotation() {
    let tree = tree_of(&[1, 3, 2]);

    assert_eq!(node_at(&tree, ""), (2, 0));
    assert_leaf(&tree, "L", 1);
    assert_leaf(&tree, "R", 3);
}

#[test]
fn insertion_rotates_once() {
    // 5 is left-heavy after 3 arrives; inserting 4 tips it over through a left-right double
    // rotation at 5 that leaves 8 exactly as balanced as it was before the insertion.
    let mut tree = tree_of(&[8, 5, 9, 3, 10]);
    assert_eq!(node_at(&tree, ""), (8, 0));
    assert_eq!(node_at(&tree, "L"), (5, 1));

    tree.insert(TestNode::new(4, 40));
    tree.assert_invariants();

    assert_eq!(node_at(&tree, ""), (8, 0));
    assert_eq!(node_at(&tree, "L"), (4, 0));
    assert_leaf(&tree, "LL", 3);
    assert_leaf(&tree, "LR", 5);
    assert_eq!(node_at(&tree, "R"), (9, -1));
    assert_leaf(&tree, "RR", 10);
}

#[test]
fn duplicate_insert_overwrites_in_place() {
    let mut tree = tree_of(&[4, 2, 6, 1, 3, 5, 7, 8]);
    let before = snapshot(&tree);

    let old = tree
        .insert(TestNode::new(6, 600))
        .expect("existing key must be replaced");
    assert_eq!((old.key, old.value), (6, 60));
    tree.assert_invariants();

    let after = snapshot(&tree);
    assert_eq!(before.len(), after.len());
    for (b, a) in before.iter().zip(&after) {
        if b.0 == 6 {
            assert_eq!(*a, (6, 600, b.2));
        } else {
            assert_eq!(a, b);
        }
    }

    assert_eq!(tree.get(&6).map(|node| node.get_ref().value), Some(600));
    assert_eq!(tree.len(), 8);
}

#[test]
fn removing_absent_key_is_a_no_op() {
    let mut tree = tree_of(&[4, 2, 6, 1, 3, 5, 7]);
    let before = snapshot(&tree);

    assert!(tree.remove(&0).is_none());
    assert!(tree.remove(&100).is_none());
    tree.assert_invariants();

    assert_eq!(before, snapshot(&tree));
    assert_eq!(tree.len(), 7);

    let mut empty: AvlTree<TestNode> = AvlTree::new();
    assert!(empty.remove(&0).is_none());
    assert!(empty.is_empty());
}

#[test]
fn insert_then_remove_everything() {
    let keys: Vec<u32> = (0..200).map(|i| (i * 37) % 200).collect();
    let mut tree = tree_of(&keys);
    assert_eq!(tree.len(), 200);

    for key in keys.iter().rev() {
        assert_eq!(tree.remove(key).map(|node| node.key), Some(*key));
        tree.assert_invariants();
    }

    assert!(tree.root.is_none());
    assert_eq!(tree.height(), 0);
}

#[test]
fn two_child_removal_takes_predecessor_contents() {
    let mut tree = tree_of(&[2, 1, 3]);

    let removed = tree.remove(&2).unwrap();
    assert_eq!((removed.key, removed.value), (2, 20));
    tree.assert_invariants();

    // The root kept its position and now carries the predecessor's key; the predecessor's
    // position went away.
    assert_eq!(node_at(&tree, ""), (1, -1));
    assert_eq!(tree.root.map(|r| unsafe { tree.links(r).left() }), Some(None));
    assert_leaf(&tree, "R", 3);
    assert_eq!(tree.get(&1).map(|node| node.get_ref().value), Some(10));
}

/// Fixture for a deletion that rotates at two levels.
///
/// Inserting `8 5 11 3 7 10 12 2 4 6 9 1` in that order performs no rotations and yields a
/// minimal tree of height 5 that is left-heavy at every internal node:
///
/// ```text
///                 8:1
///           /            \
///         5:1            11:1
///       /     \         /    \
///     3:1     7:1     10:1   12:0
///    /   \    /       /
///  2:1  4:0  6:0    9:0
///  /
/// 1:0
/// ```
///
/// Removing the leaf 12 makes 11 doubly left-heavy. The right rotation at 11 shortens that
/// subtree, which makes 8 doubly left-heavy in turn and forces a second right rotation at the
/// root.
const CASCADE_FIXTURE: [u32; 12] = [8, 5, 11, 3, 7, 10, 12, 2, 4, 6, 9, 1];

#[test]
fn deletion_cascades_through_two_rotations() {
    init_tracing();

    let mut tree = tree_of(&CASCADE_FIXTURE);
    assert_eq!(node_at(&tree, ""), (8, 1));
    assert_eq!(node_at(&tree, "L"), (5, 1));
    assert_eq!(node_at(&tree, "R"), (11, 1));
    assert_eq!(node_at(&tree, "RL"), (10, 1));
    assert_leaf(&tree, "RR", 12);
    assert_eq!(tree.height(), 5);

    assert_eq!(tree.remove(&12).map(|node| node.key), Some(12));
    tree.assert_invariants();

    // First rotation: 10 replaced 11, which became 10's right child.
    assert_eq!(node_at(&tree, "RR"), (10, 0));
    assert_leaf(&tree, "RRL", 9);
    assert_leaf(&tree, "RRR", 11);

    // Second rotation: 5 replaced 8 as the root, and 8 took over 5's old right subtree.
    assert_eq!(node_at(&tree, ""), (5, 0));
    assert_eq!(node_at(&tree, "L"), (3, 1));
    assert_eq!(node_at(&tree, "LL"), (2, 1));
    assert_leaf(&tree, "LLL", 1);
    assert_leaf(&tree, "LR", 4);
    assert_eq!(node_at(&tree, "R"), (8, 0));
    assert_eq!(node_at(&tree, "RL"), (7, 1));
    assert_leaf(&tree, "RLL", 6);

    assert_eq!(tree.height(), 4);
}

#[test]
fn height_preserving_rotation_stops_the_retrace() {
    // Removing 1 leaves 2 doubly right-heavy over the balanced 4. The left rotation at 2 keeps the
    // subtree height, so the root's balance factor must not change.
    let mut tree = tree_of(&[6, 2, 9, 1, 4, 8, 10, 3, 5, 7]);
    assert_eq!(node_at(&tree, ""), (6, 0));
    assert_eq!(node_at(&tree, "L"), (2, -1));
    assert_eq!(node_at(&tree, "LR"), (4, 0));

    tree.remove(&1);
    tree.assert_invariants();

    assert_eq!(node_at(&tree, ""), (6, 0));
    assert_eq!(node_at(&tree, "L"), (4, 1));
    assert_eq!(node_at(&tree, "LL"), (2, -1));
    assert_leaf(&tree, "LLR", 3);
    assert_leaf(&tree, "LR", 5);
}

#[test]
fn rotation_without_child_is_a_no_op() {
    let mut tree = tree_of(&[2, 1]);
    let before = snapshot(&tree);
    let root = tree.root.unwrap();
    let leaf = unsafe { tree.links(root).left().unwrap() };

    unsafe {
        assert!(tree.rotate_left(root).is_none());
        assert!(tree.rotate_right(leaf).is_none());
        assert!(tree.rotate_left(leaf).is_none());
    }

    assert_eq!(before, snapshot(&tree));
    tree.assert_invariants();
}

#[test]
fn predecessor_and_successor() {
    let tree = tree_of(&[4, 2, 6, 1, 3, 5, 7]);

    for key in 1..=7u32 {
        let node = tree.find_raw(&key).unwrap();
        let pred = unsafe { tree.predecessor_raw(node).map(|p| p.as_ref().key) };
        let succ = unsafe { tree.successor_raw(node).map(|s| s.as_ref().key) };

        assert_eq!(pred, key.checked_sub(1).filter(|&k| k >= 1));
        assert_eq!(succ, Some(key + 1).filter(|&k| k <= 7));
    }
}

#[test]
fn first_last_and_pop() {
    let mut tree = tree_of(&[5, 3, 8, 1, 4]);

    assert_eq!(tree.first().map(|n| n.get_ref().key), Some(1));
    assert_eq!(tree.last().map(|n| n.get_ref().key), Some(8));

    assert_eq!(tree.pop_first().map(|n| n.key), Some(1));
    tree.assert_invariants();
    assert_eq!(tree.pop_last().map(|n| n.key), Some(8));
    tree.assert_invariants();

    let keys: Vec<u32> = tree.iter().map(|n| n.key).collect();
    assert_eq!(keys, [3, 4, 5]);
}

#[test]
fn iter_both_ends() {
    let tree = tree_of(&[4, 2, 6, 1, 3, 5, 7]);

    let forward: Vec<u32> = tree.iter().map(|n| n.key).collect();
    assert_eq!(forward, [1, 2, 3, 4, 5, 6, 7]);

    let backward: Vec<u32> = tree.iter().rev().map(|n| n.key).collect();
    assert_eq!(backward, [7, 6, 5, 4, 3, 2, 1]);

    let mut iter = tree.iter();
    assert_eq!(iter.len(), 7);
    assert_eq!(iter.next().map(|n| n.key), Some(1));
    assert_eq!(iter.next_back().map(|n| n.key), Some(7));
    assert_eq!(iter.len(), 5);
    let middle: Vec<u32> = iter.map(|n| n.key).collect();
    assert_eq!(middle, [2, 3, 4, 5, 6]);
}

#[test]
fn sequential_inserts_stay_logarithmic() {
    let keys: Vec<u32> = (0..1000).collect();
    let tree = tree_of(&keys);

    // An AVL tree with n nodes is shorter than 1.4405 * log2(n + 2).
    assert!(tree.height() <= 14, "height {}", tree.height());
}

#[test]
fn clear_empties_the_tree() {
    let mut tree = tree_of(&[4, 2, 6, 1, 3, 5, 7]);

    tree.clear();
    assert!(tree.is_empty());
    assert!(tree.first().is_none());
    tree.assert_invariants();

    tree.insert(TestNode::new(1, 10));
    tree.assert_invariants();
    assert_eq!(tree.len(), 1);
}

#[cfg(feature = "std")]
#[test]
fn dotgraph_labels_balance_factors() {
    let tree = tree_of(&[2, 1, 3, 4]);

    let mut out = String::new();
    tree.dotgraph("t", &mut out).unwrap();

    assert!(out.starts_with("digraph \"graph-t\""));
    assert!(out.contains("[label=\"2:-1\"]"));
    assert!(out.contains("[label=\"3:-1\"]"));
    assert!(out.contains("[label=\"4:0\"]"));
    assert!(out.contains("\"grapht-2\" -> \"grapht-3\";"));

    let mut empty = String::new();
    AvlTree::<TestNode>::new().dotgraph("e", &mut empty).unwrap();
    assert_eq!(empty, "digraph \"graph-e\" {}");
}

#[cfg(feature = "alloc")]
#[test]
fn map_basic_operations() {
    let mut map = AvlMap::new();
    assert!(map.is_empty());

    for (i, word) in ["delta", "alpha", "echo", "charlie", "bravo"].iter().enumerate() {
        assert_eq!(map.insert(*word, i), None);
        map.assert_invariants();
    }

    assert_eq!(map.len(), 5);
    assert_eq!(map.get("charlie"), Some(&3));
    assert!(map.contains_key("echo"));
    assert!(!map.contains_key("foxtrot"));

    assert_eq!(map.insert("charlie", 30), Some(3));
    assert_eq!(map.get("charlie"), Some(&30));
    assert_eq!(map.len(), 5);

    *map.get_mut("alpha").unwrap() += 100;
    assert_eq!(map.get("alpha"), Some(&101));

    assert_eq!(map.remove("delta"), Some(0));
    assert_eq!(map.remove("delta"), None);
    map.assert_invariants();

    let keys: Vec<&str> = map.keys().copied().collect();
    assert_eq!(keys, ["alpha", "bravo", "charlie", "echo"]);

    assert_eq!(map.first_key_value(), Some((&"alpha", &101)));
    assert_eq!(map.last_key_value(), Some((&"echo", &2)));
    assert_eq!(map.pop_first(), Some(("alpha", 101)));
    assert_eq!(map.pop_last(), Some(("echo", 2)));
    map.assert_invariants();

    let values: Vec<usize> = map.values().copied().collect();
    assert_eq!(values, [4, 30]);

    map.clear();
    assert!(map.is_empty());
}

#[cfg(feature = "alloc")]
#[test]
fn map_collect_and_debug() {
    let map: AvlMap<u32, char> = [(3, 'c'), (1, 'a'), (2, 'b'), (1, 'z')].into_iter().collect();
    map.assert_invariants();

    assert_eq!(map.len(), 3);
    assert_eq!(format!("{map:?}"), "{1: 'z', 2: 'b', 3: 'c'}");
    assert_eq!(map.iter().next_back(), Some((&3, &'c')));
    assert_eq!(map.height(), 2);
}

#[cfg(feature = "alloc")]
#[test]
fn map_drops_every_value() {
    use std::rc::Rc;

    let counter = Rc::new(());
    {
        let mut map = AvlMap::new();
        for key in 0..50u32 {
            map.insert(key, Rc::clone(&counter));
        }
        assert!(map.insert(7, Rc::clone(&counter)).is_some());
        assert!(map.remove(&3).is_some());

        // 49 in the map plus the original.
        assert_eq!(Rc::strong_count(&counter), 50);
    }

    assert_eq!(Rc::strong_count(&counter), 1);
}

#[test]
fn arbitrary_ops_match_btree() {
    use arbitrary::{Arbitrary, Unstructured};

    let bytes: Vec<u8> = (0..4096u32)
        .map(|i| (i.wrapping_mul(2_654_435_761) >> 13) as u8)
        .collect();
    let mut data = Unstructured::new(&bytes);

    let mut ops = Vec::new();
    while !data.is_empty() {
        ops.push(model::Op::arbitrary(&mut data).unwrap());
    }

    assert!(!ops.is_empty());
    model::run_btree_equivalence(ops);
}

#[cfg(miri)]
const FUZZ_RANGE: Range<usize> = 0..10;

#[cfg(not(miri))]
const FUZZ_RANGE: Range<usize> = 0..1000;

proptest::proptest! {
    #![proptest_config(ProptestConfig {
        max_shrink_iters: 65536,
        .. ProptestConfig::default()
    })]

    #[test]
    fn btree_equivalence(ops in proptest::collection::vec(model::op_strategy(), FUZZ_RANGE)) {
        model::run_btree_equivalence(ops);
    }
}
