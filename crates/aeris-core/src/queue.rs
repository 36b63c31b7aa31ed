//! Fixed-capacity queues used for log lines and station events.
//!
//! Both queues drop the *newest* item when full: on a station that has been
//! wedged long enough to fill a queue, the oldest entries are the ones that
//! explain how it got there.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;

/// A bounded FIFO over a [`heapless::Vec`].
///
/// Not thread safe on its own; wrap it in [`ThreadSafeQueue`] to share it
/// between tasks.
#[derive(Debug)]
pub struct BoundedQueue<T, const N: usize> {
    items: heapless::Vec<T, N>,
}

impl<T, const N: usize> BoundedQueue<T, N> {
    /// Creates an empty queue.
    pub const fn new() -> Self {
        Self {
            items: heapless::Vec::new(),
        }
    }

    /// Appends an item, returning `false` (and dropping the item) when the
    /// queue is already holding `N` entries.
    #[must_use]
    pub fn add(&mut self, item: T) -> bool {
        self.items.push(item).is_ok()
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the queue holds no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterates the queued items oldest first.
    pub fn iter(&self) -> core::slice::Iter<'_, T> {
        self.items.iter()
    }

    /// Removes all items.
    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<T, const N: usize> Default for BoundedQueue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> IntoIterator for BoundedQueue<T, N> {
    type Item = T;
    type IntoIter = <heapless::Vec<T, N> as IntoIterator>::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a, T, const N: usize> IntoIterator for &'a BoundedQueue<T, N> {
    type Item = &'a T;
    type IntoIter = core::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// A [`BoundedQueue`] behind a blocking mutex, shareable as a `static`.
///
/// Producers [`add`](Self::add) from any task or interrupt context the mutex
/// supports; a single consumer periodically [`consume`](Self::consume)s the
/// whole backlog in one critical section.
pub struct ThreadSafeQueue<M: RawMutex, T, const N: usize> {
    inner: Mutex<M, RefCell<BoundedQueue<T, N>>>,
}

impl<M: RawMutex, T, const N: usize> ThreadSafeQueue<M, T, N> {
    /// Creates an empty queue. Usable in `static` initializers.
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(BoundedQueue::new())),
        }
    }

    /// Appends an item, returning `false` when the queue was full.
    #[must_use]
    pub fn add(&self, item: T) -> bool {
        self.inner.lock(|queue| queue.borrow_mut().add(item))
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.inner.lock(|queue| queue.borrow().len())
    }

    /// Whether the queue holds no items.
    pub fn is_empty(&self) -> bool {
        self.inner.lock(|queue| queue.borrow().is_empty())
    }

    /// Takes the entire backlog, leaving the queue empty.
    pub fn consume(&self) -> BoundedQueue<T, N> {
        self.inner
            .lock(|queue| core::mem::take(&mut *queue.borrow_mut()))
    }
}

impl<M: RawMutex, T, const N: usize> Default for ThreadSafeQueue<M, T, N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

    use super::*;

    #[test]
    fn bounded_queue_rejects_items_past_capacity() {
        let mut queue: BoundedQueue<u8, 4> = BoundedQueue::new();
        for i in 0..4 {
            assert!(queue.add(i));
        }
        assert!(!queue.add(99));
        assert_eq!(queue.len(), 4);
        assert_eq!(queue.iter().copied().collect::<heapless::Vec<u8, 4>>(), [
            0, 1, 2, 3
        ]);
    }

    #[test]
    fn consume_drains_in_insertion_order() {
        let queue: ThreadSafeQueue<CriticalSectionRawMutex, u32, 8> = ThreadSafeQueue::new();
        assert!(queue.add(10));
        assert!(queue.add(20));
        assert!(queue.add(30));

        let drained: heapless::Vec<u32, 8> = queue.consume().into_iter().collect();
        assert_eq!(drained, [10, 20, 30]);
        assert!(queue.is_empty());
    }

    #[test]
    fn items_added_after_a_drain_appear_in_the_next_drain() {
        let queue: ThreadSafeQueue<CriticalSectionRawMutex, u32, 2> = ThreadSafeQueue::new();
        assert!(queue.add(1));
        assert_eq!(queue.consume().len(), 1);

        assert!(queue.add(2));
        assert!(queue.add(3));
        let drained: heapless::Vec<u32, 2> = queue.consume().into_iter().collect();
        assert_eq!(drained, [2, 3]);
    }

    #[test]
    fn full_queue_drops_the_newest_item() {
        let queue: ThreadSafeQueue<CriticalSectionRawMutex, u32, 2> = ThreadSafeQueue::new();
        assert!(queue.add(1));
        assert!(queue.add(2));
        assert!(!queue.add(3));

        let drained: heapless::Vec<u32, 2> = queue.consume().into_iter().collect();
        assert_eq!(drained, [1, 2]);
    }
}
