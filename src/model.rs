//! A reference model for [`AvlTree`], checked against [`BTreeMap`].
//!
//! Used by the property tests and by the fuzz targets.

use std::{boxed::Box, collections::BTreeMap, mem, ptr::NonNull, vec::Vec};

use arbitrary::Arbitrary;
use cordyceps::Linked;
use proptest::strategy::{Just, Strategy};

use crate::{AvlTree, Links, TreeNode};

#[derive(Debug)]
#[repr(C)]
pub struct TestNode {
    pub links: Links<TestNode>,
    pub key: u32,
    pub value: u32,
}

impl TestNode {
    pub fn new(key: u32, value: u32) -> Box<TestNode> {
        Box::new(TestNode {
            links: Links::new(),
            key,
            value,
        })
    }
}

unsafe impl Linked<Links<TestNode>> for TestNode {
    type Handle = Box<TestNode>;

    fn into_ptr(r: Self::Handle) -> NonNull<Self> {
        NonNull::new(Box::into_raw(r)).unwrap()
    }

    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
        unsafe { Box::from_raw(ptr.as_ptr()) }
    }

    unsafe fn links(ptr: NonNull<Self>) -> NonNull<Links<TestNode>> {
        // SAFETY: Self is #[repr(C)] and `links` is first field
        ptr.cast()
    }
}

impl TreeNode<Links<TestNode>> for TestNode {
    type Key = u32;

    fn key(&self) -> &Self::Key {
        &self.key
    }

    fn swap_payload(&mut self, other: &mut Self) {
        mem::swap(&mut self.key, &mut other.key);
        mem::swap(&mut self.value, &mut other.value);
    }
}

#[derive(Copy, Clone, Debug, Arbitrary)]
pub enum ItemValue {
    Index(usize),
    Random(u32),
}

proptest::prop_compose! {
    fn index_strategy()(
        index in 0usize..1000,
    ) -> ItemValue {
        ItemValue::Index(index)
    }
}

proptest::prop_compose! {
    fn random_strategy()(
        random in 0u32..1000,
    ) -> ItemValue {
        ItemValue::Random(random)
    }
}

fn value_strategy() -> impl Strategy<Value = ItemValue> {
    proptest::prop_oneof![index_strategy(), random_strategy()]
}

#[derive(Copy, Clone, Debug, Arbitrary)]
pub enum Op {
    Insert(ItemValue, u32),
    Get(ItemValue),
    Remove(ItemValue),
    First,
    PopFirst,
    Last,
    PopLast,
    Clear,
}

impl Op {
    fn finalize(self, sorted: &[u32]) -> FinalOp {
        // Indices pick a key already in the tree, so that removals and overwrites actually hit.
        fn get_key(v: &[u32], i: ItemValue) -> u32 {
            match i {
                ItemValue::Index(idx) => {
                    if v.is_empty() {
                        idx as u32
                    } else {
                        v[idx % v.len()]
                    }
                }
                ItemValue::Random(v) => v,
            }
        }

        match self {
            Op::Insert(item, value) => FinalOp::Insert(get_key(sorted, item), value),
            Op::Get(item) => FinalOp::Get(get_key(sorted, item)),
            Op::Remove(item) => FinalOp::Remove(get_key(sorted, item)),
            Op::First => FinalOp::First,
            Op::PopFirst => FinalOp::PopFirst,
            Op::Last => FinalOp::Last,
            Op::PopLast => FinalOp::PopLast,
            Op::Clear => FinalOp::Clear,
        }
    }
}

#[derive(Copy, Clone, Debug)]
enum FinalOp {
    Insert(u32, u32),
    Get(u32),
    Remove(u32),
    First,
    PopFirst,
    Last,
    PopLast,
    Clear,
}

pub fn op_strategy() -> impl Strategy<Value = Op> {
    proptest::prop_oneof![
        10 => (value_strategy(), proptest::num::u32::ANY)
            .prop_map(|(item, value)| Op::Insert(item, value)),
        3 => value_strategy().prop_map(Op::Get),
        6 => value_strategy().prop_map(Op::Remove),
        1 => Just(Op::First),
        1 => Just(Op::PopFirst),
        1 => Just(Op::Last),
        1 => Just(Op::PopLast),
        1 => Just(Op::Clear),
    ]
}

pub fn run_btree_equivalence(ops: Vec<Op>) {
    let mut btree = BTreeMap::new();
    let mut avl: AvlTree<TestNode> = AvlTree::new();

    #[inline]
    #[allow(clippy::boxed_local)]
    fn node_entry(node: Box<TestNode>) -> (u32, u32) {
        (node.key, node.value)
    }

    #[inline]
    fn ref_entry(node: &TestNode) -> (u32, u32) {
        (node.key, node.value)
    }

    for (op_id, op) in ops.into_iter().enumerate() {
        let sorted_keys: Vec<u32> = btree.keys().copied().collect();
        let final_op = op.finalize(&sorted_keys);

        match final_op {
            FinalOp::Insert(key, value) => {
                let from_btree = btree.insert(key, value).map(|old| (key, old));
                let from_avl = avl.insert(TestNode::new(key, value)).map(node_entry);

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::Get(key) => {
                let from_btree = btree.get(&key).map(|&value| (key, value));
                let from_avl = avl.get(&key).map(|node| ref_entry(node.get_ref()));

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::Remove(key) => {
                let from_btree = btree.remove(&key).map(|value| (key, value));
                let from_avl = avl.remove(&key).map(node_entry);

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::First => {
                let from_btree = btree.first_key_value().map(|(&k, &v)| (k, v));
                let from_avl = avl.first().map(|node| ref_entry(node.get_ref()));

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::PopFirst => {
                let from_btree = btree.pop_first();
                let from_avl = avl.pop_first().map(node_entry);

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::Last => {
                let from_btree = btree.last_key_value().map(|(&k, &v)| (k, v));
                let from_avl = avl.last().map(|node| ref_entry(node.get_ref()));

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::PopLast => {
                let from_btree = btree.pop_last();
                let from_avl = avl.pop_last().map(node_entry);

                assert_eq!(from_btree, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::Clear => {
                btree.clear();
                avl.clear();
            }
        }

        avl.assert_invariants();
        assert_eq!(btree.len(), avl.len());
        assert!(btree
            .iter()
            .map(|(&k, &v)| (k, v))
            .eq(avl.iter().map(ref_entry)));
    }
}
