//! Pending events ordered by deadline

use crate::dispatcher::Thunk;
use crate::util::Cancellable;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Instant;

/// A unit of work: a thunk and the instant at which it becomes due.
///
/// An event is consumed exactly once by the dispatcher, either by
/// invoking it or by skipping it when its token has been cancelled.
pub(crate) struct ScheduledEvent {
    deadline: Instant,
    thunk: Thunk,
    cancellable: Cancellable,
}

impl ScheduledEvent {
    pub(crate) fn new(deadline: Instant, thunk: Thunk, cancellable: Cancellable) -> Self {
        Self {
            deadline,
            thunk,
            cancellable,
        }
    }

    pub(crate) fn deadline(&self) -> Instant {
        self.deadline
    }

    pub(crate) fn cancelled(&self) -> bool {
        self.cancellable.cancelled()
    }

    pub(crate) fn into_thunk(self) -> Thunk {
        self.thunk
    }
}

// BinaryHeap is a max-heap, so the ordering is reversed to keep the
// earliest deadline on top. Only the deadline participates.

impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        other.deadline.cmp(&self.deadline)
    }
}

/// A min-heap of `ScheduledEvent`s keyed by deadline.
///
/// Events that share a deadline come out in no particular order. The
/// queue performs no synchronization of its own; the dispatch logic
/// that owns it decides how it is shared.
#[derive(Default)]
pub(crate) struct DeadlineQueue {
    heap: BinaryHeap<ScheduledEvent>,
}

impl DeadlineQueue {
    pub(crate) fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
        }
    }

    /// Adds an event. Deadlines in the past are accepted and are due
    /// immediately.
    pub(crate) fn insert(&mut self, event: ScheduledEvent) {
        self.heap.push(event);
    }

    /// The smallest deadline currently queued.
    pub(crate) fn peek_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(ScheduledEvent::deadline)
    }

    /// Removes and returns the event with the smallest deadline.
    pub(crate) fn pop_earliest(&mut self) -> Option<ScheduledEvent> {
        self.heap.pop()
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Removes every queued event without running it, returning how
    /// many were discarded.
    pub(crate) fn drain(&mut self) -> usize {
        let len = self.len();
        self.heap.clear();
        len
    }
}
