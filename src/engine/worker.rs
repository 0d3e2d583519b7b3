//! The event loop and the state it shares with the engine handle.
//!
//! All worker threads of an engine run the same loop over the same
//! [`Shared`] state. Each iteration expires overdue queries, waits for
//! readiness bounded by the nearest deadline, dispatches ready sockets to
//! their queries, and finally picks up work left by other threads and
//! newly submitted queries.
//!
//! When there is more than one worker, each iteration only handles its
//! share of the ready sockets and queued work and leaves the rest to its
//! siblings. The share is rounded up so a worker woken for a non-empty
//! queue always makes progress.

use super::cell::{Outcome, ResultCell};
use super::config::{Config, QueryParams};
use super::error::Error;
use super::query::{QueryId, QueryMachine, Step};
use super::schedule::DeadlineSchedule;
use super::selector::{Selector, WAKE_TOKEN};
use crate::base::Message;
use mio::{Events, Token};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

//------------ QuerySlot -----------------------------------------------------

/// A query tracked by the engine.
pub(crate) struct QuerySlot {
    /// The engine-internal ID.
    id: QueryId,

    /// The cell the query completes into.
    cell: Arc<ResultCell>,

    /// The protocol state.
    machine: Mutex<QueryMachine>,
}

//------------ Shared --------------------------------------------------------

/// The state shared by the engine handle and all its workers.
pub(crate) struct Shared {
    /// The readiness multiplexer.
    selector: Selector,

    /// The number of workers.
    workers: usize,

    /// The capacity of each worker’s event buffer.
    events_capacity: usize,

    /// The deadlines of all tracked queries.
    schedule: Mutex<DeadlineSchedule>,

    /// All queries that haven’t completed yet.
    queries: Mutex<HashMap<QueryId, Arc<QuerySlot>>>,

    /// Submitted queries not started yet.
    incoming: Mutex<VecDeque<Arc<QuerySlot>>>,

    /// Ready tokens left for another iteration.
    overflow: Mutex<VecDeque<Token>>,

    /// Set once the engine is shutting down.
    shutdown: AtomicBool,

    /// The ID for the next query.
    next_id: AtomicUsize,
}

/// # Creation and Submission
///
impl Shared {
    pub fn new(config: &Config) -> io::Result<Self> {
        Ok(Shared {
            selector: Selector::new()?,
            workers: config.workers(),
            events_capacity: config.events_capacity(),
            schedule: Mutex::new(DeadlineSchedule::new()),
            queries: Mutex::new(HashMap::new()),
            incoming: Mutex::new(VecDeque::new()),
            overflow: Mutex::new(VecDeque::new()),
            shutdown: AtomicBool::new(false),
            next_id: AtomicUsize::new(0),
        })
    }

    /// Adds a new query and hands it to the event loop.
    ///
    /// Returns the cell the query will complete into.
    pub fn submit(
        self: &Arc<Self>,
        request: Message,
        params: QueryParams,
    ) -> Result<Arc<ResultCell>, Error> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cell = Arc::new(ResultCell::new());
        let slot = Arc::new(QuerySlot {
            id,
            cell: cell.clone(),
            machine: Mutex::new(QueryMachine::new(id, request, params)),
        });
        let weak = Arc::downgrade(self);
        cell.set_cancel_hook(move || cancel_query(&weak, id));
        {
            // Checking under the lock makes sure shutdown sees the query.
            let mut queries = self.queries.lock();
            if self.is_shutdown() {
                return Err(Error::Shutdown);
            }
            queries.insert(id, slot.clone());
        }
        self.schedule
            .lock()
            .insert(id, Instant::now() + params.timeout());
        self.incoming.lock().push_back(slot);
        self.selector.wake();
        trace!(query = id, "query submitted");
        Ok(cell)
    }

    /// Returns the number of queries that haven’t completed yet.
    pub fn pending(&self) -> usize {
        self.queries.lock().len()
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

/// # Shutdown
///
impl Shared {
    /// Marks the engine as shutting down and wakes the workers.
    ///
    /// Returns `false` if shutdown had been started before.
    pub fn begin_shutdown(&self) -> bool {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.selector.wake();
        true
    }

    /// Fails all queries still tracked.
    ///
    /// This must only be called once all workers have stopped.
    pub fn fail_remaining(&self) {
        let slots: Vec<_> = self.queries.lock().drain().collect();
        self.schedule.lock().clear();
        self.incoming.lock().clear();
        self.overflow.lock().clear();
        for (id, slot) in slots {
            slot.machine.lock().abandon(&self.selector);
            if slot.cell.complete(Outcome::Failed(Error::Shutdown)) {
                debug!(query = id, "query failed by shutdown");
            }
        }
    }
}

/// # Event Loop
///
impl Shared {
    /// Runs the event loop until the engine shuts down.
    pub fn run(&self) {
        let mut events = Events::with_capacity(self.events_capacity);
        let mut ready = Vec::with_capacity(self.events_capacity);
        loop {
            if self.is_shutdown() {
                break;
            }
            self.expire(Instant::now());

            if let Err(err) =
                self.selector.select(&mut events, || self.poll_timeout())
            {
                if err.kind() != io::ErrorKind::Interrupted {
                    warn!("waiting for readiness failed: {}", err);
                }
                continue;
            }

            ready.extend(
                events
                    .iter()
                    .map(|event| event.token())
                    .filter(|token| *token != WAKE_TOKEN),
            );
            let share = self.share(ready.len());
            if ready.len() > share {
                self.overflow.lock().extend(ready.drain(share..));
                self.selector.wake();
            }
            for token in ready.drain(..) {
                self.dispatch(token);
            }

            for token in self.take_share(&self.overflow) {
                self.dispatch(token);
            }

            for slot in self.take_share(&self.incoming) {
                self.start(&slot);
            }
        }

        // Pass the shutdown on to a sibling that may be waiting.
        self.selector.wake();
    }

    /// Returns how long the next wait may take.
    fn poll_timeout(&self) -> Option<Duration> {
        let deadline = self.schedule.lock().next_deadline()?;
        Some(deadline.saturating_duration_since(Instant::now()))
    }

    /// Returns how many of `len` items one iteration should take on.
    fn share(&self, len: usize) -> usize {
        (len + self.workers - 1) / self.workers
    }

    /// Takes this iteration’s share of a work queue.
    ///
    /// Wakes a sibling if work remains.
    fn take_share<T>(&self, queue: &Mutex<VecDeque<T>>) -> Vec<T> {
        let mut queue = queue.lock();
        let share = self.share(queue.len());
        let res: Vec<_> = queue.drain(..share).collect();
        if !queue.is_empty() {
            self.selector.wake();
        }
        res
    }

    /// Fails all queries whose deadline has passed.
    fn expire(&self, now: Instant) {
        loop {
            let id = match self.schedule.lock().pop_expired(now) {
                Some(id) => id,
                None => break,
            };
            let slot = match self.queries.lock().remove(&id) {
                Some(slot) => slot,
                None => continue,
            };
            slot.machine.lock().abandon(&self.selector);
            if slot.cell.complete(Outcome::Failed(Error::Timeout)) {
                debug!(query = id, "query timed out");
            }
        }
    }

    /// Starts a newly submitted query.
    fn start(&self, slot: &QuerySlot) {
        let step = {
            let mut machine = slot.machine.lock();
            if slot.cell.is_finished() {
                return;
            }
            machine.start(&self.selector)
        };
        self.finish(slot, step);
    }

    /// Lets the query registered under `token` make progress.
    fn dispatch(&self, token: Token) {
        let id = token.0;
        let slot = match self.queries.lock().get(&id) {
            Some(slot) => slot.clone(),
            None => {
                trace!(query = id, "readiness for finished query");
                return;
            }
        };
        let step = {
            let mut machine = slot.machine.lock();
            if slot.cell.is_finished() {
                machine.abandon(&self.selector);
                drop(machine);
                self.forget(id);
                return;
            }
            machine.ready(&self.selector)
        };
        self.finish(&slot, step);
    }

    /// Completes the query if it is done.
    fn finish(&self, slot: &QuerySlot, step: Step) {
        let res = match step {
            Step::Pending => return,
            Step::Done(res) => res,
        };
        self.forget(slot.id);
        let outcome = match res {
            Ok(response) => Outcome::Response(response),
            Err(err) => Outcome::Failed(err),
        };
        slot.cell.complete(outcome);
    }

    /// Stops tracking a query.
    fn forget(&self, id: QueryId) {
        self.queries.lock().remove(&id);
        self.schedule.lock().remove(id);
    }
}

/// The cancel hook of a query.
///
/// Runs on the thread cancelling the query.
fn cancel_query(shared: &Weak<Shared>, id: QueryId) {
    let shared = match shared.upgrade() {
        Some(shared) => shared,
        None => return,
    };
    shared.schedule.lock().remove(id);
    let slot = shared.queries.lock().remove(&id);
    if let Some(slot) = slot {
        slot.machine.lock().abandon(&shared.selector);
    }
    shared.selector.wake();
    debug!(query = id, "query cancelled");
}

//============ Testing =======================================================
