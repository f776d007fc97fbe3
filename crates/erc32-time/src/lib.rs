//! Event scheduler driving the ERC32 simulator's simulated-cycle clock.
//!
//! The scheduler owns a single monotonically advancing cycle counter and a
//! priority queue of `(deadline_cycle, kind, arg)` entries. It does not know
//! how to "fire" an event — that requires mutable access to the rest of the
//! machine — so callers drain due events with [`Scheduler::pop_due`] and
//! dispatch them, or use [`Scheduler::advance_to`] to do both in one loop.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// One pending entry: fire `kind` with `arg` once the cycle counter reaches
/// `deadline_cycle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scheduled<K> {
    pub deadline_cycle: u64,
    pub kind: K,
    pub arg: i32,
}

/// Internal queue entry. Ties on `deadline_cycle` break by insertion order
/// (`seq`), so two events scheduled for the same cycle fire in the order
/// they were enqueued.
struct Entry<K> {
    deadline_cycle: u64,
    seq: u64,
    kind: K,
    arg: i32,
}

impl<K> PartialEq for Entry<K> {
    fn eq(&self, other: &Self) -> bool {
        self.deadline_cycle == other.deadline_cycle && self.seq == other.seq
    }
}
impl<K> Eq for Entry<K> {}

impl<K> Ord for Entry<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse so the earliest deadline (and,
        // on ties, the earliest insertion) pops first.
        other
            .deadline_cycle
            .cmp(&self.deadline_cycle)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}
impl<K> PartialOrd for Entry<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Fatal configuration error: the queue grew past its configured maximum
/// depth. Per spec this aborts the simulator; it is never guest-observable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueOverflow {
    pub max_depth: usize,
}

impl std::fmt::Display for QueueOverflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "event queue exceeded max depth ({})", self.max_depth)
    }
}
impl std::error::Error for QueueOverflow {}

/// Default queue depth cap. Far above anything a correctly configured
/// simulator should ever reach; exists only to catch runaway rescheduling
/// bugs in a component (e.g. a timer that reschedules itself twice).
pub const DEFAULT_MAX_QUEUE_DEPTH: usize = 4096;

pub struct Scheduler<K> {
    cycle: u64,
    heap: BinaryHeap<Entry<K>>,
    next_seq: u64,
    max_depth: usize,
}

impl<K> Default for Scheduler<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Scheduler<K> {
    pub fn new() -> Self {
        Self::with_max_depth(DEFAULT_MAX_QUEUE_DEPTH)
    }

    pub fn with_max_depth(max_depth: usize) -> Self {
        Scheduler {
            cycle: 0,
            heap: BinaryHeap::new(),
            next_seq: 0,
            max_depth,
        }
    }

    /// Current simulated cycle.
    pub fn now(&self) -> u64 {
        self.cycle
    }

    pub fn pending_len(&self) -> usize {
        self.heap.len()
    }

    /// Enqueue `kind` to fire at `now() + delta`.
    ///
    /// Rescheduling the same `kind` while one is already queued is allowed
    /// at this layer; callers that must keep "at most one live" per kind
    /// (timers, UART events) call [`Scheduler::cancel`] first.
    pub fn schedule(&mut self, delta: u64, kind: K, arg: i32) -> Result<(), QueueOverflow> {
        if self.heap.len() >= self.max_depth {
            return Err(QueueOverflow {
                max_depth: self.max_depth,
            });
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Entry {
            deadline_cycle: self.cycle.saturating_add(delta),
            seq,
            kind,
            arg,
        });
        Ok(())
    }

    /// Remove every pending entry matching `kind`.
    pub fn cancel(&mut self, kind: &K)
    where
        K: PartialEq,
    {
        let remaining: Vec<Entry<K>> = self
            .heap
            .drain()
            .filter(|e| &e.kind != kind)
            .collect();
        self.heap.extend(remaining);
    }

    pub fn cancel_all(&mut self) {
        self.heap.clear();
    }

    pub fn has_pending(&self, kind: &K) -> bool
    where
        K: PartialEq,
    {
        self.heap.iter().any(|e| &e.kind == kind)
    }

    /// Pop the earliest-queued entry if its deadline is `<= deadline`,
    /// advancing the cycle counter to that deadline. Returns `None` (and
    /// leaves the counter untouched) once no entry is due.
    pub fn pop_due(&mut self, deadline: u64) -> Option<Scheduled<K>> {
        let due = matches!(self.heap.peek(), Some(e) if e.deadline_cycle <= deadline);
        if !due {
            return None;
        }
        let entry = self.heap.pop().expect("peeked Some above");
        self.cycle = self.cycle.max(entry.deadline_cycle);
        Some(Scheduled {
            deadline_cycle: entry.deadline_cycle,
            kind: entry.kind,
            arg: entry.arg,
        })
    }

    /// Drain and dispatch every event due by `deadline`, then advance the
    /// clock the rest of the way to `deadline` even if nothing fired.
    /// `dispatch` may call back into `schedule`/`cancel` on the scheduler
    /// it is given; freshly scheduled events at or before `deadline` are
    /// drained before `advance_to` returns.
    pub fn advance_to(&mut self, deadline: u64, mut dispatch: impl FnMut(&mut Self, Scheduled<K>)) {
        while let Some(ev) = self.pop_due(deadline) {
            dispatch(self, ev);
        }
        self.cycle = self.cycle.max(deadline);
    }
}
