//! Fixed-capacity FIFO buffer.

use std::collections::vec_deque::{self, VecDeque};

/// Bounded FIFO: pushing onto a full buffer evicts the oldest item.
#[derive(Debug, Clone, PartialEq)]
pub struct RingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// Creates an empty buffer. A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends an item, returning the evicted oldest item if the buffer was full.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() == self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest item.
    pub fn oldest(&self) -> Option<&T> {
        self.items.front()
    }

    /// Most recently pushed item.
    pub fn latest(&self) -> Option<&T> {
        self.items.back()
    }

    /// Item at `index`, counted from the oldest.
    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    /// Iterates from oldest to newest.
    pub fn iter(&self) -> vec_deque::Iter<'_, T> {
        self.items.iter()
    }

    /// Iterates over the newest `count` items, oldest first.
    pub fn newest(&self, count: usize) -> vec_deque::Iter<'_, T> {
        let start = self.items.len().saturating_sub(count);
        self.items.range(start..)
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Copies the contents, oldest first.
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

impl<'a, T> IntoIterator for &'a RingBuffer<T> {
    type Item = &'a T;
    type IntoIter = vec_deque::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_evicts_oldest_when_full() {
        let mut buffer = RingBuffer::new(3);
        assert_eq!(buffer.push(-1), None);
        assert_eq!(buffer.push(-2), None);
        assert_eq!(buffer.push(3), None);
        assert!(buffer.is_full());
        assert_eq!(buffer.push(4), Some(-1));
        assert_eq!(buffer.push(5), Some(-2));
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.to_vec(), vec![3, 4, 5]);
    }

    #[test]
    fn test_newest_window() {
        let mut buffer = RingBuffer::new(5);
        for i in 0..5 {
            buffer.push(i);
        }
        let tail: Vec<_> = buffer.newest(2).copied().collect();
        assert_eq!(tail, vec![3, 4]);
        let all: Vec<_> = buffer.newest(10).copied().collect();
        assert_eq!(all, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let mut buffer = RingBuffer::new(0);
        assert_eq!(buffer.capacity(), 1);
        buffer.push('a');
        assert_eq!(buffer.push('b'), Some('a'));
        assert_eq!(buffer.latest(), Some(&'b'));
        assert_eq!(buffer.oldest(), Some(&'b'));
    }
}
