//! Discrete-event timer queue.
//!
//! Callbacks are represented as plain event values of type `E`. Firing order
//! is by scheduled time, then by scheduling order, so two events due at the
//! same instant run in the order they were scheduled.

use crate::time::SimTime;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// Handle to a pending timer, used to cancel it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

pub struct TimerQueue<E> {
    heap: BinaryHeap<Reverse<(SimTime, u64)>>,
    pending: HashMap<u64, E>,
    next_seq: u64,
}

impl<E> TimerQueue<E> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            pending: HashMap::new(),
            next_seq: 0,
        }
    }

    pub fn schedule(&mut self, at: SimTime, event: E) -> TimerHandle {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse((at, seq)));
        self.pending.insert(seq, event);
        TimerHandle(seq)
    }

    /// Cancels a pending timer. Returns false if it already fired or was cancelled.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        self.pending.remove(&handle.0).is_some()
    }

    pub fn is_pending(&self, handle: TimerHandle) -> bool {
        self.pending.contains_key(&handle.0)
    }

    /// Number of live (not cancelled, not fired) timers.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Scheduled time of the earliest live timer.
    pub fn next_deadline(&mut self) -> Option<SimTime> {
        self.skip_cancelled();
        self.heap.peek().map(|Reverse((at, _))| *at)
    }

    /// Pops the earliest live timer due at or before `now`.
    pub fn pop_due(&mut self, now: SimTime) -> Option<(SimTime, TimerHandle, E)> {
        self.skip_cancelled();
        let Reverse((at, seq)) = *self.heap.peek()?;
        if at > now {
            return None;
        }
        self.heap.pop();
        let event = self.pending.remove(&seq)?;
        Some((at, TimerHandle(seq), event))
    }

    /// Drops every pending timer.
    pub fn clear(&mut self) {
        self.heap.clear();
        self.pending.clear();
    }

    fn skip_cancelled(&mut self) {
        while let Some(Reverse((_, seq))) = self.heap.peek() {
            if self.pending.contains_key(seq) {
                break;
            }
            self.heap.pop();
        }
    }
}

impl<E> Default for TimerQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_in_time_then_schedule_order() {
        let mut q = TimerQueue::new();
        q.schedule(SimTime::from_micros(20), "late");
        q.schedule(SimTime::from_micros(10), "first");
        q.schedule(SimTime::from_micros(10), "second");

        let now = SimTime::from_micros(30);
        let order: Vec<&str> = std::iter::from_fn(|| q.pop_due(now).map(|(_, _, e)| e)).collect();
        assert_eq!(order, vec!["first", "second", "late"]);
        assert!(q.is_empty());
    }

    #[test]
    fn not_due_is_kept() {
        let mut q = TimerQueue::new();
        q.schedule(SimTime::from_micros(50), 1u32);
        assert!(q.pop_due(SimTime::from_micros(49)).is_none());
        assert_eq!(q.next_deadline(), Some(SimTime::from_micros(50)));
        assert!(q.pop_due(SimTime::from_micros(50)).is_some());
    }

    #[test]
    fn cancelled_timer_never_fires() {
        let mut q = TimerQueue::new();
        let h = q.schedule(SimTime::from_micros(5), 'a');
        q.schedule(SimTime::from_micros(6), 'b');
        assert!(q.cancel(h));
        assert!(!q.cancel(h));
        assert!(!q.is_pending(h));

        let (_, _, e) = q.pop_due(SimTime::from_micros(10)).unwrap();
        assert_eq!(e, 'b');
        assert!(q.pop_due(SimTime::from_micros(10)).is_none());
    }
}
