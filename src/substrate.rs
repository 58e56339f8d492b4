//! The unbalanced binary search tree underneath the AVL engine.
//!
//! Nothing in this module reads or writes balance factors. It provides ordered descent,
//! predecessor and successor lookup, and the raw link surgery that the balancing code builds on.

use core::{borrow::Borrow, cmp::Ordering, ptr::NonNull};

use crate::{AvlTree, Dir, Link, Links, TreeNode};

/// The outcome of an ordered descent from the root.
pub(crate) enum Search<T: ?Sized> {
    /// A node with the searched-for key exists.
    Found(NonNull<T>),
    /// No such node exists; a new one would be linked in as described.
    Vacant(InsertAs<T>),
}

pub(crate) enum InsertAs<T: ?Sized> {
    Root,
    Child { parent: NonNull<T>, dir: Dir },
}

impl<T> AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    #[inline]
    pub(crate) unsafe fn links<'a>(&self, node: NonNull<T>) -> &'a Links<T> {
        unsafe { T::links(node).as_ref() }
    }

    #[inline]
    pub(crate) unsafe fn links_mut<'a>(&mut self, node: NonNull<T>) -> &'a mut Links<T> {
        unsafe { T::links(node).as_mut() }
    }

    /// Returns the node corresponding to `key`, if any.
    pub(crate) fn find_raw<Q>(&self, key: &Q) -> Link<T>
    where
        T::Key: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        match self.search(key) {
            Search::Found(node) => Some(node),
            Search::Vacant(_) => None,
        }
    }

    /// Descends from the root towards `key`, tracking the last visited node as the prospective
    /// parent of a new node.
    pub(crate) fn search<Q>(&self, key: &Q) -> Search<T>
    where
        T::Key: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let Some(mut cur) = self.root else {
            return Search::Vacant(InsertAs::Root);
        };

        loop {
            let dir = unsafe {
                match key.cmp(cur.as_ref().key().borrow()) {
                    Ordering::Less => Dir::Left,
                    Ordering::Equal => return Search::Found(cur),
                    Ordering::Greater => Dir::Right,
                }
            };

            match unsafe { self.links(cur).child(dir) } {
                Some(child) => cur = child,
                None => return Search::Vacant(InsertAs::Child { parent: cur, dir }),
            }
        }
    }

    /// Links the unattached node `node` into the position found by [`search`](Self::search).
    ///
    /// The balance factors of `node`'s ancestors are not updated.
    pub(crate) unsafe fn link_leaf(&mut self, insert_as: InsertAs<T>, node: NonNull<T>) {
        unsafe {
            self.links_mut(node).clear();

            match insert_as {
                InsertAs::Root => {
                    debug_assert!(self.root.is_none());
                    self.root = Some(node);
                }

                InsertAs::Child { parent, dir } => {
                    debug_assert!(self.links(parent).child(dir).is_none());
                    self.links_mut(parent).set_child(dir, Some(node));
                    self.links_mut(node).set_parent(Some(parent));
                }
            }
        }
    }

    /// Unlinks `node`, which must have at most one child, by elevating its child (if any) into its
    /// position.
    ///
    /// Returns the former parent of `node` and the side of the parent it hung from, or `None` if
    /// `node` was the root. The links of `node` are cleared.
    pub(crate) unsafe fn splice_out(&mut self, node: NonNull<T>) -> Option<(NonNull<T>, Dir)> {
        unsafe {
            let links = self.links(node);
            debug_assert!(
                links.left().is_none() || links.right().is_none(),
                "only nodes with at most one child can be spliced out"
            );

            let parent = links.parent();
            let child = links.left().or(links.right());

            let side = parent.map(|p| (p, self.which_child(p, Some(node))));

            self.replace_child_or_set_root(parent, node, child);
            self.maybe_set_parent(child, parent);
            self.links_mut(node).clear();

            side
        }
    }

    // Returns the minimum node in the subtree rooted at `root`.
    #[inline]
    pub(crate) unsafe fn min_in_subtree(&self, root: NonNull<T>) -> NonNull<T> {
        let mut cur = root;

        while let Some(left) = unsafe { self.links(cur).left() } {
            cur = left;
        }

        cur
    }

    // Returns the maximum node in the subtree rooted at `root`.
    #[inline]
    pub(crate) unsafe fn max_in_subtree(&self, root: NonNull<T>) -> NonNull<T> {
        let mut cur = root;

        while let Some(right) = unsafe { self.links(cur).right() } {
            cur = right;
        }

        cur
    }

    /// Returns the node with the largest key smaller than that of `node`.
    pub(crate) unsafe fn predecessor_raw(&self, node: NonNull<T>) -> Link<T> {
        unsafe { self.neighbor_raw(node, Dir::Left) }
    }

    /// Returns the node with the smallest key larger than that of `node`.
    pub(crate) unsafe fn successor_raw(&self, node: NonNull<T>) -> Link<T> {
        unsafe { self.neighbor_raw(node, Dir::Right) }
    }

    // Returns the in-order neighbor of `node` in direction `dir`.
    //
    // If `node` has a `dir` subtree, the neighbor is the extreme node of that subtree nearest to
    // `node`. Otherwise it is the first ancestor reached from its `!dir` side.
    unsafe fn neighbor_raw(&self, node: NonNull<T>, dir: Dir) -> Link<T> {
        unsafe {
            if let Some(child) = self.links(node).child(dir) {
                return Some(match dir {
                    Dir::Left => self.max_in_subtree(child),
                    Dir::Right => self.min_in_subtree(child),
                });
            }

            let mut cur = node;
            loop {
                let parent = self.links(cur).parent()?;

                if self.which_child(parent, Some(cur)) == !dir {
                    return Some(parent);
                }

                cur = parent;
            }
        }
    }

    #[inline]
    pub(crate) unsafe fn which_child(&self, parent: NonNull<T>, child: Link<T>) -> Dir {
        if unsafe { self.links(parent).left() } == child {
            Dir::Left
        } else {
            Dir::Right
        }
    }

    #[inline]
    pub(crate) unsafe fn maybe_set_parent(&mut self, opt_node: Link<T>, parent: Link<T>) {
        let Some(node) = opt_node else {
            return;
        };

        unsafe { self.links_mut(node).set_parent(parent) };
    }

    #[inline]
    pub(crate) unsafe fn replace_child_or_set_root(
        &mut self,
        parent: Link<T>,
        old_child: NonNull<T>,
        new_child: Link<T>,
    ) {
        match parent {
            Some(parent) => unsafe { self.replace_child(parent, old_child, new_child) },
            None => self.root = new_child,
        }
    }

    // Replaces the child pointer of `parent` pointing at `old_child` with `new_child`.
    //
    // `new_child`'s parent pointer is not updated.
    //
    // # Safety
    //
    // The caller must ensure that the following conditions hold:
    // - `old_child` is a child node of `parent`.
    // - `new_child` is not a child node of `parent`.
    #[inline]
    unsafe fn replace_child(
        &mut self,
        parent: NonNull<T>,
        old_child: NonNull<T>,
        new_child: Link<T>,
    ) {
        unsafe {
            let dir = self.which_child(parent, Some(old_child));

            debug_assert_eq!(
                self.links(parent).child(dir),
                Some(old_child),
                "`old_child` must be a child of `parent`"
            );
            debug_assert!(
                new_child.is_none() || self.links(parent).child(!dir) != new_child,
                "`new_child` must not be a child of `parent`"
            );

            self.links_mut(parent).set_child(dir, new_child);
        }
    }
}
