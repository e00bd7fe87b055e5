//! Time-ordered event queue.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::interpreter::traits::{Event, Scheduler};

/// A queued event. Ordered by due time, then by insertion order.
#[derive(Debug, Clone, Copy)]
struct Pending {
    time: u64,
    seq: u64,
    event: Event,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.time, self.seq).cmp(&(other.time, other.seq))
    }
}

/// Discrete-event queue implementing [`Scheduler`].
///
/// Events due at the same time are delivered in the order they were
/// scheduled.
#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<Reverse<Pending>>,
    now: u64,
    seq: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove the earliest event and advance time to it.
    pub fn pop(&mut self) -> Option<(u64, Event)> {
        let Reverse(p) = self.heap.pop()?;
        self.now = p.time;
        Some((p.time, p.event))
    }

    /// Due time of the earliest event.
    pub fn peek_time(&self) -> Option<u64> {
        self.heap.peek().map(|Reverse(p)| p.time)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Drop every event and rewind time to zero.
    pub fn clear(&mut self) {
        self.heap.clear();
        self.now = 0;
        self.seq = 0;
    }
}

impl Scheduler for EventQueue {
    fn schedule(&mut self, event: Event, delay: u64) {
        let time = self.now.saturating_add(delay);
        self.heap.push(Reverse(Pending {
            time,
            seq: self.seq,
            event,
        }));
        self.seq += 1;
    }

    fn now(&self) -> u64 {
        self.now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ProcessId;

    #[test]
    fn test_time_order_then_fifo() {
        let mut q = EventQueue::new();
        let (a, b, c) = (ProcessId(0), ProcessId(1), ProcessId(2));
        q.schedule(Event::step(a, 0), 10);
        q.schedule(Event::step(b, 0), 5);
        q.schedule(Event::step(c, 0), 10);

        assert_eq!(q.peek_time(), Some(5));
        assert_eq!(q.pop(), Some((5, Event::step(b, 0))));
        assert_eq!(q.now(), 5);
        assert_eq!(q.pop(), Some((10, Event::step(a, 0))));
        assert_eq!(q.pop(), Some((10, Event::step(c, 0))));
        assert!(q.pop().is_none());
    }

    #[test]
    fn test_delay_relative_to_now() {
        let mut q = EventQueue::new();
        q.schedule(Event::step(ProcessId(0), 0), 7);
        q.pop();
        q.schedule(Event::wake(ProcessId(0), 0), 0);
        q.schedule(Event::step(ProcessId(0), 1), 3);
        assert_eq!(q.pop().map(|(t, _)| t), Some(7));
        assert_eq!(q.pop().map(|(t, _)| t), Some(10));

        q.clear();
        assert!(q.is_empty());
        assert_eq!(q.now(), 0);
    }
}
