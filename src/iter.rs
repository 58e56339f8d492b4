use core::iter::FusedIterator;

use crate::{AvlTree, Link, Links, TreeNode};

/// An iterator over the elements of an [`AvlTree`], in key order.
///
/// Each step walks to the in-order successor (or predecessor, from the back) of the last yielded
/// node, so a full traversal visits every link at most twice.
pub struct Iter<'tree, T: TreeNode<Links<T>> + ?Sized> {
    tree: &'tree AvlTree<T>,

    front: Link<T>,
    back: Link<T>,

    len: usize,
}

impl<'tree, T: TreeNode<Links<T>> + ?Sized> Iter<'tree, T> {
    pub(crate) fn new(tree: &'tree AvlTree<T>) -> Self {
        let (front, back) = match tree.root {
            Some(root) => unsafe {
                (
                    Some(tree.min_in_subtree(root)),
                    Some(tree.max_in_subtree(root)),
                )
            },
            None => (None, None),
        };

        Iter {
            tree,

            front,
            back,

            len: tree.len(),
        }
    }
}

impl<'tree, T: TreeNode<Links<T>> + ?Sized> Iterator for Iter<'tree, T> {
    type Item = &'tree T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.len == 0 {
            return None;
        }

        let cur = self.front?;
        self.len -= 1;
        self.front = unsafe { self.tree.successor_raw(cur) };

        Some(unsafe { cur.as_ref() })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.len, Some(self.len))
    }
}

impl<'tree, T: TreeNode<Links<T>> + ?Sized> DoubleEndedIterator for Iter<'tree, T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.len == 0 {
            return None;
        }

        let cur = self.back?;
        self.len -= 1;
        self.back = unsafe { self.tree.predecessor_raw(cur) };

        Some(unsafe { cur.as_ref() })
    }
}

impl<'tree, T: TreeNode<Links<T>> + ?Sized> ExactSizeIterator for Iter<'tree, T> {}

impl<'tree, T: TreeNode<Links<T>> + ?Sized> FusedIterator for Iter<'tree, T> {}

impl<'tree, T: TreeNode<Links<T>> + ?Sized> Clone for Iter<'tree, T> {
    fn clone(&self) -> Self {
        Iter {
            tree: self.tree,
            front: self.front,
            back: self.back,
            len: self.len,
        }
    }
}

impl<'tree, T: TreeNode<Links<T>> + ?Sized> IntoIterator for &'tree AvlTree<T> {
    type Item = &'tree T;
    type IntoIter = Iter<'tree, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
