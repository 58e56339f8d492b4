//! An intrusive AVL tree.
#![no_std]

// Conventions used in comments:
// - The height of a subtree `x` is denoted `h(x)`. A missing subtree has height 0.
// - The balance factor of a node `x` is `b(x) = h(left(x)) - h(right(x))`.
// - A node is left-heavy if `b(x) > 0` and right-heavy if `b(x) < 0`.
//
// The fundamental invariants of an AVL tree are:
// 1. Keys are strictly increasing in in-order traversal.
// 2. All balance factors are -1, 0 or 1.
// 3. Every child's parent link points at the node that owns it.
//
// Balance factors are stored in each node's links and updated incrementally. They are never
// recomputed from subtree heights. While a retrace is in progress a single node may reach a
// balance factor of -2 or 2; that node is rotated before the retrace moves on.

#[cfg(feature = "alloc")]
extern crate alloc;
#[cfg(any(test, feature = "std"))]
extern crate std;

use core::{
    borrow::Borrow, cell::UnsafeCell, fmt, marker::PhantomPinned, mem, ops::Not, pin::Pin,
    ptr::NonNull,
};

use cordyceps::Linked;

mod balance;
#[cfg(feature = "std")]
mod debug;
pub mod iter;
#[cfg(feature = "alloc")]
pub mod map;
#[cfg(any(test, feature = "model"))]
pub mod model;
mod substrate;

#[cfg(test)]
mod tests;

pub use iter::Iter;
#[cfg(feature = "alloc")]
pub use map::AvlMap;

/// A node that can be linked into an [`AvlTree`], ordered by the key it exposes.
pub trait TreeNode<L>: Linked<L> {
    type Key: Ord + fmt::Debug;

    /// Returns the key this node is ordered by.
    fn key(&self) -> &Self::Key;

    /// Exchanges the key and payload of `self` with those of `other`.
    ///
    /// The tree calls this when an item with an existing key is inserted, and when a node with two
    /// children is removed: the node trades contents with its in-order predecessor, whose position
    /// is then spliced out instead.
    ///
    /// Implementations must leave the links of both nodes untouched.
    fn swap_payload(&mut self, other: &mut Self);
}

/// An intrusive AVL tree.
///
/// Every node tracks the height difference of its two subtrees, and the tree is rebalanced with
/// single and double rotations after each insertion and removal. Lookups, insertions and removals
/// complete in _O(log(n))_ time.
pub struct AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    root: Link<T>,
    len: usize,
}

/// The links and balance factor embedded in each node of an [`AvlTree`].
pub struct Links<T: ?Sized> {
    inner: UnsafeCell<LinksInner<T>>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Dir {
    Left = 0,
    Right = 1,
}

impl Dir {
    /// The balance factor contribution of a subtree on this side.
    #[inline]
    fn sign(self) -> i8 {
        match self {
            Dir::Left => 1,
            Dir::Right => -1,
        }
    }
}

impl Not for Dir {
    type Output = Dir;

    fn not(self) -> Self::Output {
        match self {
            Dir::Left => Dir::Right,
            Dir::Right => Dir::Left,
        }
    }
}

#[repr(C)]
struct LinksInner<T: ?Sized> {
    parent: Link<T>,
    children: [Link<T>; 2],
    balance: i8,
    _unpin: PhantomPinned,
}

type Link<T> = Option<NonNull<T>>;

impl<T> AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    /// Returns a new empty tree.
    pub const fn new() -> AvlTree<T> {
        AvlTree { root: None, len: 0 }
    }

    /// Returns `true` if the tree contains no elements.
    pub const fn is_empty(&self) -> bool {
        let empty = self.len() == 0;

        if cfg!(debug_assertions) {
            // Can't use assert_eq!() in const fn.
            assert!(empty == self.root.is_none());
        }

        empty
    }

    /// Returns the number of elements in the tree.
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns the height of the tree.
    ///
    /// An empty tree has height 0 and a tree with a single element has height 1. This follows the
    /// taller subtree at each level, as indicated by the balance factors, and so completes in
    /// _O(log(n))_ time.
    pub fn height(&self) -> usize {
        let mut height = 0;
        let mut opt_cur = self.root;

        while let Some(cur) = opt_cur {
            height += 1;

            let links = unsafe { self.links(cur) };
            opt_cur = if links.balance() < 0 {
                links.right()
            } else {
                links.left()
            };
        }

        height
    }

    /// Panics if any of the tree invariants are violated.
    #[doc(hidden)]
    pub fn assert_invariants(&self) {
        let mut count = 0;

        if let Some(root) = self.root {
            unsafe {
                assert_eq!(self.links(root).parent(), None, "root must not have a parent");
                self.assert_invariants_at(root, None, None, &mut count);
            }
        }

        assert_eq!(count, self.len, "node count does not match length");
    }

    // Checks the subtree rooted at `node` and returns its height.
    //
    // All keys in the subtree must lie strictly between `lower` and `upper`.
    unsafe fn assert_invariants_at(
        &self,
        node: NonNull<T>,
        lower: Option<&T::Key>,
        upper: Option<&T::Key>,
        count: &mut usize,
    ) -> i32 {
        *count += 1;

        unsafe {
            let key = node.as_ref().key();

            if let Some(lower) = lower {
                assert!(lower < key, "{lower:?} must be ordered before {key:?}");
            }

            if let Some(upper) = upper {
                assert!(key < upper, "{key:?} must be ordered before {upper:?}");
            }

            let mut heights = [0; 2];

            for dir in [Dir::Left, Dir::Right] {
                if let Some(child) = self.links(node).child(dir) {
                    // Ensure child's parent link points to this node.
                    let parent = self
                        .links(child)
                        .parent()
                        .expect("child parent pointer not set");
                    assert_eq!(node, parent);

                    heights[dir as usize] = match dir {
                        Dir::Left => self.assert_invariants_at(child, lower, Some(key), count),
                        Dir::Right => self.assert_invariants_at(child, Some(key), upper, count),
                    };
                }
            }

            // Ensure the stored balance factor is exact and within bounds.
            let balance = self.links(node).balance();
            assert_eq!(
                i32::from(balance),
                heights[0] - heights[1],
                "stale balance factor at {key:?}"
            );
            assert!((-1..=1).contains(&balance), "{key:?} is out of balance");

            1 + heights[0].max(heights[1])
        }
    }

    /// Returns `true` if the tree contains an element with the given key.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        T::Key: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.find_raw(key).is_some()
    }

    /// Returns a reference to the element corresponding to `key`.
    pub fn get<Q>(&self, key: &Q) -> Option<Pin<&T>>
    where
        T::Key: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let ptr = self.find_raw(key)?;
        unsafe { Some(Pin::new_unchecked(ptr.as_ref())) }
    }

    /// Returns a pinned mutable reference to the element corresponding to `key`.
    ///
    /// Modifying the key of the returned element in a way that changes its ordering relative to
    /// other keys in the tree will leave the tree in an unspecified state.
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<Pin<&mut T>>
    where
        T::Key: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut ptr = self.find_raw(key)?;
        unsafe { Some(Pin::new_unchecked(ptr.as_mut())) }
    }

    /// Returns the minimum element of the tree.
    pub fn first(&self) -> Option<Pin<&T>> {
        let first = unsafe { self.min_in_subtree(self.root?) };
        unsafe { Some(Pin::new_unchecked(first.as_ref())) }
    }

    /// Returns the maximum element of the tree.
    pub fn last(&self) -> Option<Pin<&T>> {
        let last = unsafe { self.max_in_subtree(self.root?) };
        unsafe { Some(Pin::new_unchecked(last.as_ref())) }
    }

    /// Inserts an item into the tree.
    ///
    /// If the tree already contains an item with an equal key, the new item's payload is swapped
    /// into the existing node and the new handle, now carrying the old payload, is returned. The
    /// shape of the tree does not change in that case.
    ///
    /// This operation completes in _O(log(n))_ time.
    pub fn insert(&mut self, item: T::Handle) -> Option<T::Handle> {
        let ptr = T::into_ptr(item);

        unsafe {
            match self.search(ptr.as_ref().key()) {
                substrate::Search::Found(existing) => {
                    self.swap_contents(existing, ptr);
                    Some(T::from_ptr(ptr))
                }

                substrate::Search::Vacant(insert_as) => {
                    self.link_leaf(insert_as, ptr);
                    self.len += 1;
                    self.retrace_inserted(ptr);
                    None
                }
            }
        }
    }

    /// Removes the element corresponding to `key` from the tree.
    ///
    /// Returns `None`, leaving the tree untouched, if no such element exists.
    ///
    /// The returned handle carries the removed key and payload, but it may not be the same handle
    /// that was originally inserted with them: removing a node with two children moves its
    /// in-order predecessor's contents into it and unlinks the predecessor's node instead.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<T::Handle>
    where
        T::Key: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let node = self.find_raw(key)?;
        Some(unsafe { self.remove_at(node) })
    }

    /// Removes and returns the minimum element of the tree.
    pub fn pop_first(&mut self) -> Option<T::Handle> {
        let first = unsafe { self.min_in_subtree(self.root?) };
        Some(unsafe { self.remove_at(first) })
    }

    /// Removes and returns the maximum element of the tree.
    pub fn pop_last(&mut self) -> Option<T::Handle> {
        let last = unsafe { self.max_in_subtree(self.root?) };
        Some(unsafe { self.remove_at(last) })
    }

    /// Returns an iterator over the elements of the tree, in key order.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter::new(self)
    }

    /// Clears the tree, removing all elements.
    ///
    /// Elements are dropped in key order. No rebalancing takes place.
    pub fn clear(&mut self) {
        let mut next = self.root;

        while let Some(start) = next {
            unsafe {
                // The minimum has no left child and can always be spliced out.
                let min = self.min_in_subtree(start);
                next = match self.splice_out(min) {
                    Some((parent, _)) => Some(parent),
                    None => self.root,
                };

                self.len -= 1;
                drop(T::from_ptr(min));
            }
        }

        debug_assert!(self.root.is_none());
        debug_assert_eq!(self.len(), 0);
    }
}

impl<T> Default for AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    fn drop(&mut self) {
        self.clear();
    }
}

impl<T> fmt::Debug for AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(self.iter().map(|node| node.key()))
            .finish()
    }
}

impl<T: ?Sized> Links<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: UnsafeCell::new(LinksInner {
                parent: None,
                children: [None; 2],
                balance: 0,
                _unpin: PhantomPinned,
            }),
        }
    }

    #[cfg_attr(not(any(test, feature = "std")), allow(dead_code))]
    #[inline]
    fn is_leaf(&self) -> bool {
        self.left().is_none() && self.right().is_none()
    }

    #[inline]
    fn balance(&self) -> i8 {
        unsafe { (*self.inner.get()).balance }
    }

    #[inline]
    fn parent(&self) -> Link<T> {
        unsafe { (*self.inner.get()).parent }
    }

    #[inline]
    fn child(&self, dir: Dir) -> Link<T> {
        unsafe { (*self.inner.get()).children[dir as usize] }
    }

    #[inline]
    fn left(&self) -> Link<T> {
        self.child(Dir::Left)
    }

    #[inline]
    fn right(&self) -> Link<T> {
        self.child(Dir::Right)
    }

    #[inline]
    fn set_parent(&mut self, parent: Link<T>) -> Link<T> {
        mem::replace(&mut self.inner.get_mut().parent, parent)
    }

    #[inline]
    fn set_child(&mut self, dir: Dir, child: Link<T>) -> Link<T> {
        mem::replace(&mut self.inner.get_mut().children[dir as usize], child)
    }

    #[inline]
    fn set_balance(&mut self, balance: i8) {
        self.inner.get_mut().balance = balance;
    }

    // Resets the links to the unlinked state.
    #[inline]
    fn clear(&mut self) {
        let inner = self.inner.get_mut();
        inner.parent = None;
        inner.children = [None; 2];
        inner.balance = 0;
    }
}

impl<T: ?Sized> Default for Links<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for Links<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Links")
            .field("parent", &self.parent())
            .field("left", &self.left())
            .field("right", &self.right())
            .field("balance", &self.balance())
            .finish()
    }
}
