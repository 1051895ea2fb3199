//! Bounded publish queue
//!
//! Holds state publishes while the broker is unreachable. When full, the
//! oldest entry is dropped to make room. Entries leave in arrival order.

use std::collections::VecDeque;

/// A publish waiting for the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedPublish {
    pub topic: String,
    pub payload: String,
}

/// Fixed-capacity FIFO that drops its oldest entry on overflow
#[derive(Debug)]
pub struct PublishQueue {
    items: VecDeque<QueuedPublish>,
    capacity: usize,
    dropped: u64,
}

impl PublishQueue {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    /// Append an entry, returning the evicted oldest entry if the queue was full
    pub fn push(&mut self, item: QueuedPublish) -> Option<QueuedPublish> {
        let evicted = if self.items.len() >= self.capacity {
            self.dropped += 1;
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    /// Put an entry back at the head after a failed send
    pub fn requeue_front(&mut self, item: QueuedPublish) {
        if self.items.len() >= self.capacity {
            self.dropped += 1;
            return;
        }
        self.items.push_front(item);
    }

    pub fn pop(&mut self) -> Option<QueuedPublish> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries dropped because the queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
