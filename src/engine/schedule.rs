//! The deadline schedule.
//!
//! Every query in the engine has an absolute deadline. The schedule keeps
//! them ordered so the event loop knows how long it may wait for readiness
//! and which queries have run out of time.
//!
//! Queries are removed from the schedule when they complete. Since a binary
//! heap can’t drop arbitrary entries, removal only forgets the query in a
//! side table. The heap entry goes stale and is skipped once it reaches the
//! top.

use super::query::QueryId;
use std::cmp;
use std::collections::{BinaryHeap, HashMap};
use std::time::Instant;

//------------ Deadline ------------------------------------------------------

/// A heap entry.
///
/// The ordering is reversed so that the standard max-heap pops the
/// earliest deadline first.
#[derive(Clone, Copy, Debug)]
struct Deadline(Instant, QueryId);

impl PartialOrd for Deadline {
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Deadline {
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        other.0.cmp(&self.0).then_with(|| other.1.cmp(&self.1))
    }
}

impl PartialEq for Deadline {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0 && self.1 == other.1
    }
}

impl Eq for Deadline {}

//------------ DeadlineSchedule ----------------------------------------------

/// A min-ordered queue of query deadlines.
#[derive(Debug, Default)]
pub(crate) struct DeadlineSchedule {
    /// The deadlines, earliest on top. May contain stale entries.
    heap: BinaryHeap<Deadline>,

    /// The live deadline of each scheduled query.
    live: HashMap<QueryId, Instant>,
}

impl DeadlineSchedule {
    /// Creates a new, empty schedule.
    pub fn new() -> Self {
        Default::default()
    }

    /// Returns the number of scheduled queries.
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// Returns whether there are no scheduled queries.
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Schedules `id` to expire at `deadline`.
    ///
    /// If the query is scheduled already, its deadline is replaced.
    pub fn insert(&mut self, id: QueryId, deadline: Instant) {
        self.live.insert(id, deadline);
        self.heap.push(Deadline(deadline, id));
    }

    /// Removes `id` from the schedule.
    ///
    /// Returns whether the query was scheduled.
    pub fn remove(&mut self, id: QueryId) -> bool {
        let res = self.live.remove(&id).is_some();
        if res {
            self.clean_head();
        }
        res
    }

    /// Removes and returns the first query whose deadline is not after
    /// `now`.
    pub fn pop_expired(&mut self, now: Instant) -> Option<QueryId> {
        self.clean_head();
        let top = *self.heap.peek()?;
        if top.0 > now {
            return None;
        }
        self.heap.pop();
        self.live.remove(&top.1);
        Some(top.1)
    }

    /// Returns the earliest live deadline.
    pub fn next_deadline(&mut self) -> Option<Instant> {
        self.clean_head();
        self.heap.peek().map(|top| top.0)
    }

    /// Removes all queries.
    pub fn clear(&mut self) {
        self.heap.clear();
        self.live.clear();
    }

    /// Drops stale entries from the top of the heap.
    fn clean_head(&mut self) {
        while let Some(top) = self.heap.peek() {
            if self.live.get(&top.1) == Some(&top.0) {
                break;
            }
            self.heap.pop();
        }
    }
}

//============ Testing =======================================================
