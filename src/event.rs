//! Event queue and virtual clock (spec component: event queue & clock).
//!
//! Events are kept in a [`std::collections::BinaryHeap`] of `Reverse<Event<M>>`
//! so the smallest `(time, priority, sequence)` triple pops first. Scheduling
//! an event into the past is rejected with [`Error::invariant`]; cancelling
//! one is O(log n) amortized via a lazy-deletion flag shared with the
//! returned [`EventHandle`], following the same `Rc<RefCell<..>>` ownership
//! style the kernel uses for shared simulation state.

use std::cell::Cell;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::rc::Rc;

use educe::Educe;

use crate::time::Time;
use crate::utils::prelude::*;

/// One entry in the event queue. Ordered by `(time, priority, seq)`; `message`
/// never participates in ordering.
#[derive(Educe)]
#[educe(PartialEq, Eq, PartialOrd, Ord)]
struct Event<M> {
    time: Time,
    priority: i32,
    seq: u64,
    #[educe(PartialEq(ignore), PartialOrd(ignore), Ord(ignore))]
    cancelled: Rc<Cell<bool>>,
    #[educe(PartialEq(ignore), PartialOrd(ignore), Ord(ignore))]
    message: M,
}

/// A handle returned by [`EventQueue::schedule`]. Dropping it has no effect;
/// calling [`EventHandle::cancel`] marks the event so it is skipped, silently,
/// whenever the queue reaches it.
#[derive(Debug, Clone)]
pub struct EventHandle {
    cancelled: Rc<Cell<bool>>,
}

impl EventHandle {
    pub fn cancel(&self) {
        self.cancelled.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }
}

/// A min-heap of pending events keyed by `(time, priority, insertion order)`,
/// plus the simulation's current time.
pub struct EventQueue<M> {
    heap: BinaryHeap<std::cmp::Reverse<Event<M>>>,
    now: Time,
    next_seq: u64,
}

impl<M> Default for EventQueue<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> EventQueue<M> {
    pub fn new() -> Self {
        EventQueue {
            heap: BinaryHeap::new(),
            now: Time::ZERO,
            next_seq: 0,
        }
    }

    pub fn now(&self) -> Time {
        self.now
    }

    pub fn is_empty(&self) -> bool {
        self.heap.iter().all(|e| e.0.cancelled.get())
    }

    /// Schedules `message` to fire at `time` with the given `priority`
    /// (smaller fires first among events at the same time). Fails if
    /// `time < self.now()`.
    pub fn schedule(&mut self, time: Time, priority: i32, message: M) -> Result<EventHandle> {
        if time < self.now {
            return Err(Error::invariant(format!(
                "cannot schedule event at {:?} when clock is already at {:?}",
                time.0, self.now.0
            )));
        }
        let cancelled = Rc::new(Cell::new(false));
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(std::cmp::Reverse(Event {
            time,
            priority,
            seq,
            cancelled: cancelled.clone(),
            message,
        }));
        Ok(EventHandle { cancelled })
    }

    /// Pops and returns the next non-cancelled event, advancing `now` to its
    /// time. Cancelled events encountered along the way are dropped silently.
    pub fn pop_next(&mut self) -> Option<(Time, M)> {
        loop {
            let std::cmp::Reverse(ev) = self.heap.pop()?;
            if ev.cancelled.get() {
                continue;
            }
            self.now = ev.time;
            return Some((ev.time, ev.message));
        }
    }

    pub fn len(&self) -> usize {
        self.heap.iter().filter(|e| !e.0.cancelled.get()).count()
    }
}

impl<M> PartialEq for Event<M> {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.priority == other.priority && self.seq == other.seq
    }
}

impl<M> Eq for Event<M> {}

impl<M> PartialOrd for Event<M> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<M> Ord for Event<M> {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.time, self.priority, self.seq).cmp(&(other.time, other.priority, other.seq))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_in_time_then_priority_then_insertion_order() {
        let mut q: EventQueue<&'static str> = EventQueue::new();
        q.schedule(Time(2.0), 0, "b").unwrap();
        q.schedule(Time(1.0), 5, "low-prio-at-1").unwrap();
        q.schedule(Time(1.0), 0, "high-prio-at-1").unwrap();
        q.schedule(Time(1.0), 0, "second-high-prio-at-1").unwrap();

        let order: Vec<_> = std::iter::from_fn(|| q.pop_next()).map(|(_, m)| m).collect();
        assert_eq!(
            order,
            vec!["high-prio-at-1", "second-high-prio-at-1", "low-prio-at-1", "b"]
        );
    }

    #[test]
    fn rejects_scheduling_into_the_past() {
        let mut q: EventQueue<()> = EventQueue::new();
        q.schedule(Time(5.0), 0, ()).unwrap();
        q.pop_next();
        assert!(q.schedule(Time(4.0), 0, ()).is_err());
    }

    #[test]
    fn cancelled_event_is_skipped() {
        let mut q: EventQueue<&'static str> = EventQueue::new();
        let handle = q.schedule(Time(1.0), 0, "cancel-me").unwrap();
        q.schedule(Time(2.0), 0, "keep-me").unwrap();
        handle.cancel();

        assert_eq!(q.pop_next(), Some((Time(2.0), "keep-me")));
        assert_eq!(q.pop_next(), None);
    }
}
