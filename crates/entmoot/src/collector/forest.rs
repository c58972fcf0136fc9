//! Mergeable forest of heap-ordered trees.
//!
//! A Fibonacci-heap-style structure: a list of root trees with the minimum
//! root kept at the front. Insertion and merge are O(1); the trees are only
//! reshaped (linked by degree) when the minimum is removed or the forest is
//! filtered. All traversals use explicit worklists.

use std::collections::LinkedList;

/// Heap-ordered forest of `T`.
pub struct Forest<T> {
    roots: LinkedList<Tree<T>>,
    len: usize,
}

struct Tree<T> {
    item: T,
    degree: usize,
    children: LinkedList<Tree<T>>,
}

impl<T: Ord> Tree<T> {
    fn singleton(item: T) -> Self {
        Tree {
            item,
            degree: 0,
            children: LinkedList::new(),
        }
    }

    /// Make the larger root a child of the smaller.
    fn link(mut self, mut other: Tree<T>) -> Tree<T> {
        if other.item < self.item {
            std::mem::swap(&mut self, &mut other);
        }
        self.children.push_back(other);
        self.degree += 1;
        self
    }
}

impl<T: Ord> Default for Forest<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Ord> Forest<T> {
    /// An empty forest.
    pub fn new() -> Self {
        Forest {
            roots: LinkedList::new(),
            len: 0,
        }
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the forest is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert a singleton tree.
    pub fn push(&mut self, item: T) {
        self.push_root(Tree::singleton(item));
        self.len += 1;
    }

    fn push_root(&mut self, tree: Tree<T>) {
        match self.roots.front() {
            Some(min) if min.item <= tree.item => self.roots.push_back(tree),
            _ => self.roots.push_front(tree),
        }
    }

    /// Splice `other` into this forest.
    pub fn merge(&mut self, mut other: Forest<T>) {
        let other_is_smaller = match (self.roots.front(), other.roots.front()) {
            (Some(mine), Some(theirs)) => theirs.item < mine.item,
            (None, Some(_)) => true,
            _ => false,
        };
        if other_is_smaller {
            std::mem::swap(&mut self.roots, &mut other.roots);
        }
        self.roots.append(&mut other.roots);
        self.len += other.len;
    }

    /// The smallest item.
    pub fn peek_min(&self) -> Option<&T> {
        self.roots.front().map(|tree| &tree.item)
    }

    /// Remove and return the smallest item.
    pub fn pop_min(&mut self) -> Option<T> {
        let Tree {
            item, mut children, ..
        } = self.roots.pop_front()?;
        self.len -= 1;
        self.roots.append(&mut children);
        self.consolidate();
        Some(item)
    }

    /// Keep the items for which `keep` holds; return the others.
    pub fn retain(&mut self, mut keep: impl FnMut(&T) -> bool) -> Vec<T> {
        let mut removed = Vec::new();
        let mut kept = LinkedList::new();
        let mut work: Vec<Tree<T>> = std::mem::take(&mut self.roots).into_iter().collect();
        while let Some(Tree { item, children, .. }) = work.pop() {
            work.extend(children);
            if keep(&item) {
                kept.push_back(Tree::singleton(item));
            } else {
                removed.push(item);
            }
        }
        self.len = kept.len();
        self.roots = kept;
        self.consolidate();
        removed
    }

    /// Remove every item.
    pub fn drain(&mut self) -> Vec<T> {
        self.retain(|_| false)
    }

    /// References to every item, in no particular order.
    pub fn items(&self) -> Vec<&T> {
        let mut out = Vec::with_capacity(self.len);
        let mut work: Vec<&Tree<T>> = self.roots.iter().collect();
        while let Some(tree) = work.pop() {
            out.push(&tree.item);
            work.extend(tree.children.iter());
        }
        out
    }

    /// Link roots of equal degree until all degrees differ, then restore
    /// the minimum at the front.
    fn consolidate(&mut self) {
        let mut by_degree: Vec<Option<Tree<T>>> = Vec::new();
        while let Some(mut tree) = self.roots.pop_front() {
            loop {
                let degree = tree.degree;
                if by_degree.len() <= degree {
                    by_degree.resize_with(degree + 1, || None);
                }
                match by_degree[degree].take() {
                    Some(other) => tree = tree.link(other),
                    None => {
                        by_degree[degree] = Some(tree);
                        break;
                    }
                }
            }
        }
        for tree in by_degree.into_iter().flatten() {
            self.push_root(tree);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn forest(items: &[i32]) -> Forest<i32> {
        let mut forest = Forest::new();
        for &item in items {
            forest.push(item);
        }
        forest
    }

    #[test]
    fn test_push_tracks_minimum() {
        let forest = forest(&[5, 3, 9, 1, 7]);
        assert_eq!(forest.peek_min(), Some(&1));
        assert_eq!(forest.len(), 5);
    }

    #[test]
    fn test_pop_min_yields_sorted_order() {
        let mut forest = forest(&[8, 2, 6, 4, 10, 0, 3]);
        let mut out = Vec::new();
        while let Some(item) = forest.pop_min() {
            out.push(item);
        }
        assert_eq!(out, vec![0, 2, 3, 4, 6, 8, 10]);
        assert!(forest.is_empty());
    }

    #[test]
    fn test_merge_keeps_minimum_and_len() {
        let mut a = forest(&[4, 6]);
        let b = forest(&[5, 1]);
        a.merge(b);
        assert_eq!(a.peek_min(), Some(&1));
        assert_eq!(a.len(), 4);

        let mut empty = Forest::new();
        empty.merge(forest(&[3]));
        assert_eq!(empty.peek_min(), Some(&3));
    }

    #[test]
    fn test_retain_after_consolidation() {
        let mut forest = forest(&(0..100).collect::<Vec<_>>());
        assert_eq!(forest.pop_min(), Some(0));
        let removed = forest.retain(|n| n % 2 == 0);
        assert_eq!(removed.len(), 50);
        assert_eq!(forest.len(), 49);
        assert_eq!(forest.peek_min(), Some(&2));
        let mut items: Vec<i32> = forest.items().into_iter().copied().collect();
        items.sort_unstable();
        assert_eq!(items, (2..100).step_by(2).collect::<Vec<_>>());
    }
}
