//! Array-backed binary min-heap.
//!
//! Items are ordered by `(sort_index, id)`. The id tie-break keeps items with
//! equal sort keys in insertion order, which is what gives the scheduler its
//! FIFO behaviour within a priority level. There is no arbitrary removal:
//! callers delete logically and skip dead entries when they reach the top.

use std::cmp::Ordering;
use std::rc::Rc;

/// An entry that can live in a [`MinHeap`].
pub trait HeapNode {
    /// Primary ordering key.
    fn sort_index(&self) -> i64;

    /// Tie-breaker, monotonic in insertion order.
    fn id(&self) -> u64;
}

impl<T: HeapNode + ?Sized> HeapNode for Rc<T> {
    #[inline]
    fn sort_index(&self) -> i64 {
        (**self).sort_index()
    }

    #[inline]
    fn id(&self) -> u64 {
        (**self).id()
    }
}

#[inline]
fn compare<T: HeapNode>(
    a: &T,
    b: &T,
) -> Ordering {
    a.sort_index()
        .cmp(&b.sort_index())
        .then_with(|| a.id().cmp(&b.id()))
}

/// Binary min-heap keyed by [`HeapNode`].
#[derive(Debug, Clone)]
pub struct MinHeap<T> {
    items: Vec<T>,
}

impl<T: HeapNode> MinHeap<T> {
    /// Create an empty heap.
    #[inline]
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Smallest item, if any.
    #[inline]
    pub fn peek(&self) -> Option<&T> {
        self.items.first()
    }

    /// Insert an item.
    pub fn push(
        &mut self,
        node: T,
    ) {
        self.items.push(node);
        let last = self.items.len() - 1;
        self.sift_up(last);
    }

    /// Remove and return the smallest item.
    pub fn pop(&mut self) -> Option<T> {
        if self.items.is_empty() {
            return None;
        }
        let first = self.items.swap_remove(0);
        if !self.items.is_empty() {
            self.sift_down(0);
        }
        Some(first)
    }

    /// Number of items.
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the heap holds no items.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn sift_up(
        &mut self,
        mut index: usize,
    ) {
        while index > 0 {
            let parent = (index - 1) >> 1;
            if compare(&self.items[parent], &self.items[index]) == Ordering::Greater {
                self.items.swap(parent, index);
                index = parent;
            } else {
                return;
            }
        }
    }

    fn sift_down(
        &mut self,
        mut index: usize,
    ) {
        let length = self.items.len();
        let half = length >> 1;
        while index < half {
            let left = (index + 1) * 2 - 1;
            let right = left + 1;

            let mut smallest = index;
            if compare(&self.items[left], &self.items[smallest]) == Ordering::Less {
                smallest = left;
            }
            if right < length && compare(&self.items[right], &self.items[smallest]) == Ordering::Less {
                smallest = right;
            }
            if smallest == index {
                return;
            }
            self.items.swap(index, smallest);
            index = smallest;
        }
    }
}

impl<T: HeapNode> Default for MinHeap<T> {
    fn default() -> Self {
        Self::new()
    }
}
