//! Fixed-capacity FIFO buffer used by every sample store in the crate.
//!
//! A [`RingBuffer`] keeps items in insertion order and never grows past its
//! capacity: pushing into a full buffer evicts the oldest item first. The
//! metric store, the request sample buffer and the error log all sit on top of
//! it, each behind its own lock.
//!
//! The buffer itself has no interior mutability. It is `Send`/`Sync` when `T`
//! is.

use std::collections::VecDeque;

/// A fixed-capacity buffer with strict oldest-first eviction.
///
/// # Examples
///
/// ```rust
/// use rampart_common::collections::RingBuffer;
///
/// let mut buffer = RingBuffer::new(3);
/// for value in 1..=4 {
///     buffer.push(value);
/// }
///
/// assert_eq!(buffer.iter().copied().collect::<Vec<_>>(), vec![2, 3, 4]);
/// assert_eq!(buffer.tail(2), vec![3, 4]);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RingBuffer<T> {
    buf: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// Creates a buffer holding at most `capacity` items.
    ///
    /// A capacity of zero is clamped to `1`.
    #[inline]
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { buf: VecDeque::with_capacity(capacity), capacity }
    }

    /// Appends an item, returning the evicted oldest item when the buffer was
    /// already full.
    #[inline]
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.is_full() { self.buf.pop_front() } else { None };
        self.buf.push_back(item);
        evicted
    }

    /// Number of items currently stored.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns `true` when the buffer has no items.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Returns `true` when the next push will evict.
    #[inline]
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    /// Maximum number of items the buffer holds.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Removes all items, keeping the capacity.
    #[inline]
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Iterates from oldest to newest.
    #[inline]
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator {
        self.buf.iter()
    }

    /// The newest `count` items, oldest first.
    #[inline]
    pub fn tail_iter(&self, count: usize) -> impl Iterator<Item = &T> {
        self.buf.iter().skip(self.buf.len().saturating_sub(count))
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Clones the newest `count` items, oldest first.
    #[must_use]
    pub fn tail(&self, count: usize) -> Vec<T> {
        self.tail_iter(count).cloned().collect()
    }

    /// Clones the whole buffer, oldest first.
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.buf.iter().cloned().collect()
    }
}

impl<'a, T> IntoIterator for &'a RingBuffer<T> {
    type Item = &'a T;
    type IntoIter = std::collections::vec_deque::Iter<'a, T>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.buf.iter()
    }
}
