//! Retracing, rebalancing and rotation.
//!
//! Insertion and removal share the rotation machinery but deliberately do not share their retrace
//! loops. After an insertion a single (possibly double) rotation always restores the height the
//! subtree had before the insertion, so the walk stops there. After a removal a rotation may leave
//! the subtree one shorter than it was, and the walk has to keep going; in the worst case every
//! ancestor is rotated.

use core::ptr::NonNull;

use tracing::trace;

use crate::{AvlTree, Dir, Link, Links, TreeNode};

impl<T> AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    // Performs a bottom-up retrace of the tree after the insertion of the leaf `node`.
    //
    // Invariants:
    // - `node` is linked into the tree and has balance factor 0.
    // - Every other balance factor reflects the tree as it was before `node` was linked.
    pub(crate) unsafe fn retrace_inserted(&mut self, node: NonNull<T>) {
        debug_assert_eq!(unsafe { self.links(node).balance() }, 0);

        let mut child = node;

        while let Some(parent) = unsafe { self.links(child).parent() } {
            let dir = unsafe { self.which_child(parent, Some(child)) };
            let balance = unsafe { self.adjust_balance(parent, dir.sign()) };

            match balance {
                // The shorter side caught up. The subtree height is unchanged.
                0 => return,

                // The subtree grew by one. Ascend.
                -1 | 1 => child = parent,

                // One rotation restores the pre-insertion height of the subtree.
                _ => {
                    unsafe { self.rebalance(parent) };
                    return;
                }
            }
        }
    }

    // Performs a bottom-up retrace of the tree after a node was spliced out of the `from` side of
    // `parent`.
    pub(crate) unsafe fn retrace_removed(&mut self, parent: NonNull<T>, from: Dir) {
        let mut cur = parent;
        let mut from = from;

        loop {
            let balance = unsafe { self.adjust_balance(cur, -from.sign()) };

            let shrunk = match balance {
                // The removal was absorbed by the taller side. The subtree height is unchanged.
                -1 | 1 => return,

                // The taller side lost a level. The subtree is one shorter.
                0 => cur,

                _ => {
                    let root = unsafe { self.rebalance(cur) };

                    // A rotation around a child with balance factor 0 preserves the subtree
                    // height, leaving the new subtree root unbalanced by one.
                    if unsafe { self.links(root).balance() } != 0 {
                        trace!("retrace stops above a height-preserving rotation");
                        return;
                    }

                    root
                }
            };

            let Some(parent) = (unsafe { self.links(shrunk).parent() }) else {
                return;
            };

            from = unsafe { self.which_child(parent, Some(shrunk)) };
            cur = parent;
        }
    }

    // Restores the balance of `z`, whose balance factor is 2 or -2.
    //
    // Returns the node now occupying `z`'s former position.
    pub(crate) unsafe fn rebalance(&mut self, z: NonNull<T>) -> NonNull<T> {
        unsafe {
            let rotated = match self.links(z).balance() {
                2 => {
                    let y = self
                        .links(z)
                        .left()
                        .expect("left-heavy node must have a left child");

                    if self.links(y).balance() >= 0 {
                        trace!("rebalance: left-left");
                    } else {
                        trace!("rebalance: left-right");
                        self.rotate_left(y);
                    }

                    self.rotate_right(z)
                }

                -2 => {
                    let y = self
                        .links(z)
                        .right()
                        .expect("right-heavy node must have a right child");

                    if self.links(y).balance() <= 0 {
                        trace!("rebalance: right-right");
                    } else {
                        trace!("rebalance: right-left");
                        self.rotate_right(y);
                    }

                    self.rotate_left(z)
                }

                balance => unreachable!("rebalance called with balance factor {balance}"),
            };

            rotated.unwrap_or(z)
        }
    }

    /// Rotates the subtree rooted at `y` to the right, moving `y`'s left child up into its place.
    ///
    /// Returns the new subtree root, or `None` without modifying the tree if `y` has no left child.
    ///
    /// The balance factors of the two nodes whose subtrees change are updated in O(1):
    ///
    /// ```text
    /// b'(y) = b(y) - 1 - max(b(x), 0)
    /// b'(x) = b(x) - 1 + min(b'(y), 0)
    /// ```
    pub(crate) unsafe fn rotate_right(&mut self, y: NonNull<T>) -> Link<T> {
        unsafe { self.rotate(y, Dir::Right) }
    }

    /// Rotates the subtree rooted at `y` to the left, moving `y`'s right child up into its place.
    ///
    /// Returns the new subtree root, or `None` without modifying the tree if `y` has no right
    /// child.
    ///
    /// The balance factors of the two nodes whose subtrees change are updated in O(1):
    ///
    /// ```text
    /// b'(y) = b(y) + 1 - min(b(x), 0)
    /// b'(x) = b(x) + 1 + max(b'(y), 0)
    /// ```
    pub(crate) unsafe fn rotate_left(&mut self, y: NonNull<T>) -> Link<T> {
        unsafe { self.rotate(y, Dir::Left) }
    }

    // Performs a rotation in direction `dir`, moving `y` down and its `!dir` child `x` up.
    //
    // - `y` becomes the `dir` child of `x`.
    // - `across` goes from the `dir` child of `x` to the `!dir` child of `y`.
    //
    // The balance factor updates are written for a right rotation. A left rotation is its mirror
    // image, so its balance factors are negated on the way in and on the way out.
    unsafe fn rotate(&mut self, y: NonNull<T>, dir: Dir) -> Link<T> {
        unsafe {
            let x = self.links(y).child(!dir)?;
            let across = self.links(x).child(dir);

            self.links_mut(y).set_child(!dir, across);
            self.maybe_set_parent(across, Some(y));

            self.links_mut(x).set_child(dir, Some(y));
            let parent = self.links_mut(y).set_parent(Some(x));
            self.links_mut(x).set_parent(parent);
            self.replace_child_or_set_root(parent, y, Some(x));

            // Mirroring maps a left child's balance contribution onto a right child's.
            let mirror = -dir.sign();
            let x_balance = mirror * self.links(x).balance();
            let y_balance = mirror * self.links(y).balance();

            // The second update depends on the already updated `y_balance`.
            let y_balance = y_balance - 1 - x_balance.max(0);
            let x_balance = x_balance - 1 + y_balance.min(0);

            self.links_mut(y).set_balance(mirror * y_balance);
            self.links_mut(x).set_balance(mirror * x_balance);

            trace!(
                ?dir,
                y_balance = mirror * y_balance,
                x_balance = mirror * x_balance,
                "rotated"
            );

            Some(x)
        }
    }

    /// Removes `node` from the tree and returns the handle of the node that was unlinked.
    ///
    /// # Safety
    ///
    /// It is the caller's responsibility to ensure that `node` is an element of `self`, and not any
    /// other tree.
    pub(crate) unsafe fn remove_at(&mut self, node: NonNull<T>) -> T::Handle {
        unsafe {
            let links = self.links(node);

            // A node with two children trades contents with its predecessor, which has no right
            // child, and the predecessor's position is removed instead.
            let target = match (links.left(), links.right()) {
                (Some(_), Some(_)) => {
                    let pred = self
                        .predecessor_raw(node)
                        .expect("node with a left subtree must have a predecessor");
                    self.swap_contents(node, pred);
                    pred
                }

                _ => node,
            };

            let spliced = self.splice_out(target);
            self.len -= 1;

            if let Some((parent, from)) = spliced {
                self.retrace_removed(parent, from);
            }

            T::from_ptr(target)
        }
    }

    /// Exchanges the keys and payloads of `a` and `b` without moving either node.
    ///
    /// Balance factors describe positions in the tree rather than contents, so they stay where
    /// they are.
    pub(crate) unsafe fn swap_contents(&mut self, a: NonNull<T>, b: NonNull<T>) {
        debug_assert_ne!(a, b);

        unsafe { (*a.as_ptr()).swap_payload(&mut *b.as_ptr()) };
    }

    // Adds `diff` to the balance factor of `node`, returning the new balance factor.
    #[inline]
    unsafe fn adjust_balance(&mut self, node: NonNull<T>, diff: i8) -> i8 {
        unsafe {
            let links = self.links_mut(node);
            let balance = links.balance().checked_add(diff).unwrap();
            links.set_balance(balance);
            balance
        }
    }
}
