use crate::backpressure::{admit, Admission, OverflowMode};
use std::collections::VecDeque;

/// Result of offering a value to a [`BufferSlot`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Offer<T> {
    /// The value was appended
    Accepted,
    /// The value was appended after evicting the returned front value
    Evicted(T),
    /// The arriving value was discarded and is handed back
    Rejected(T),
    /// No capacity and the mode treats that as fatal; the value is handed back
    Overflow(T),
}

/// Ordered pending values bounded by the overflow mode's capacity.
///
/// Not synchronized: the flow controller owns it behind its lock.
#[derive(Debug)]
pub struct BufferSlot<T> {
    queue: VecDeque<T>,
    mode: OverflowMode,
}

impl<T> BufferSlot<T> {
    /// Create an empty slot for the given mode
    pub fn new(mode: OverflowMode) -> Self {
        Self {
            queue: VecDeque::with_capacity(mode.capacity().min(1024)),
            mode,
        }
    }

    /// Apply the mode's admission rule to an arriving value.
    ///
    /// `len() <= capacity()` holds after every call.
    pub fn offer(&mut self, value: T) -> Offer<T> {
        match admit(self.mode, self.queue.len()) {
            Admission::Accept => {
                self.queue.push_back(value);
                Offer::Accepted
            }
            Admission::EvictOldest => match self.queue.pop_front() {
                Some(evicted) => {
                    self.queue.push_back(value);
                    Offer::Evicted(evicted)
                }
                None => Offer::Rejected(value),
            },
            Admission::RejectNew => Offer::Rejected(value),
            Admission::Overflow => Offer::Overflow(value),
        }
    }

    /// Remove the earliest pending value
    pub fn pop(&mut self) -> Option<T> {
        self.queue.pop_front()
    }

    /// Drop every pending value, returning how many there were
    pub fn clear(&mut self) -> usize {
        let dropped = self.queue.len();
        self.queue.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Get the capacity of the slot
    pub fn capacity(&self) -> usize {
        self.mode.capacity()
    }

    pub fn mode(&self) -> OverflowMode {
        self.mode
    }

    /// Get the utilization of the slot as a percentage (0-100)
    pub fn utilization(&self) -> u32 {
        match self.capacity() {
            0 => 100,
            capacity => ((self.len() * 100) / capacity).min(100) as u32,
        }
    }

    /// Pending values front to back
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.queue.iter()
    }
}
