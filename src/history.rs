use std::collections::VecDeque;

/// Default number of past classifications kept per area.
pub const DEFAULT_HISTORY_SIZE: usize = 10;

/// Bounded, newest-first rolling window.
///
/// - Pushing `None` is a no-op and does not shift the window
/// - Once `capacity` entries are held, each push evicts the oldest one
/// - Iteration never consumes entries
#[derive(Clone, Debug)]
pub struct RingBuffer<T> {
    buffer: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// Capacity is clamped to at least one entry.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, value: impl Into<Option<T>>) {
        let Some(value) = value.into() else {
            return;
        };
        while self.buffer.len() >= self.capacity {
            self.buffer.pop_back();
        }
        self.buffer.push_front(value);
    }

    /// Entries from newest to oldest.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.buffer.iter()
    }

    /// The newest `n` entries, newest first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &T> + '_ {
        self.buffer.iter().take(n)
    }

    pub fn latest(&self) -> Option<&T> {
        self.buffer.front()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> Default for RingBuffer<T> {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_SIZE)
    }
}
