//! Virtual clock with a single queue of absolute-time events.
//!
//! Events due at the same instant come out in the order they were pushed.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

#[derive(Debug)]
struct Entry<E> {
    at_ms: u64,
    seq: u64,
    event: E,
}

impl<E> PartialEq for Entry<E> {
    fn eq(&self, other: &Self) -> bool {
        self.at_ms == other.at_ms && self.seq == other.seq
    }
}

impl<E> Eq for Entry<E> {}

impl<E> PartialOrd for Entry<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for Entry<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.at_ms, self.seq).cmp(&(other.at_ms, other.seq))
    }
}

#[derive(Debug)]
pub struct Schedule<E> {
    now_ms: u64,
    next_seq: u64,
    queue: BinaryHeap<Reverse<Entry<E>>>,
}

impl<E> Default for Schedule<E> {
    fn default() -> Self {
        Self {
            now_ms: 0,
            next_seq: 0,
            queue: BinaryHeap::new(),
        }
    }
}

impl<E> Schedule<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> u64 {
        self.now_ms
    }

    /// Enqueue `event` at absolute time `at_ms`. Times in the past are clamped to now.
    pub fn push(&mut self, at_ms: u64, event: E) {
        let entry = Entry {
            at_ms: at_ms.max(self.now_ms),
            seq: self.next_seq,
            event,
        };
        self.next_seq += 1;
        self.queue.push(Reverse(entry));
    }

    /// Time of the earliest queued event.
    pub fn next_deadline(&self) -> Option<u64> {
        self.queue.peek().map(|Reverse(e)| e.at_ms)
    }

    /// Pop the earliest event if it is due at or before `until_ms`,
    /// moving the clock to that event's time.
    pub fn pop_due(&mut self, until_ms: u64) -> Option<(u64, E)> {
        if self.next_deadline()? > until_ms {
            return None;
        }
        let Reverse(entry) = self.queue.pop()?;
        self.now_ms = entry.at_ms;
        Some((entry.at_ms, entry.event))
    }

    /// Move the clock forward. The clock never goes backwards.
    pub fn advance_to(&mut self, at_ms: u64) {
        self.now_ms = self.now_ms.max(at_ms);
    }

    /// Drop every queued event. The clock keeps its position.
    pub fn clear(&mut self) {
        self.queue.clear();
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
