//! The single-assignment cell a query completes into.
//!
//! A [`ResultCell`] starts out pending and transitions exactly once into
//! one of the three terminal [`Outcome`]s. The event loop is the producer
//! for responses, failures, and timeouts; any thread holding a
//! [`QueryHandle`] may race it with a cancellation. Whoever gets there
//! first wins and every later attempt is a no-op.

use super::error::Error;
use crate::base::Message;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

//------------ Outcome -------------------------------------------------------

/// The final result of a query.
#[derive(Clone, Debug)]
pub enum Outcome {
    /// A response matching the request was received.
    Response(Message),

    /// The query failed.
    Failed(Error),

    /// The query was cancelled before it completed.
    Cancelled,
}

impl Outcome {
    /// Returns the response if there is one.
    pub fn response(&self) -> Option<&Message> {
        match self {
            Outcome::Response(msg) => Some(msg),
            _ => None,
        }
    }

    /// Returns the error if the query failed.
    pub fn error(&self) -> Option<&Error> {
        match self {
            Outcome::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// Returns whether the query was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled)
    }
}

//------------ ResultCell ----------------------------------------------------

/// A callback run once the cell completes.
type Continuation = Box<dyn FnOnce(&Outcome) + Send>;

/// A callback run when the cell is cancelled.
type CancelHook = Box<dyn FnOnce() + Send>;

/// A single-assignment completion cell.
pub(crate) struct ResultCell {
    state: Mutex<CellState>,
    cond: Condvar,
}

struct CellState {
    /// The outcome once there is one.
    outcome: Option<Outcome>,

    /// Continuations waiting for the outcome.
    continuations: Vec<Continuation>,

    /// Cleanup to run on cancellation.
    cancel_hook: Option<CancelHook>,
}

impl ResultCell {
    pub fn new() -> Self {
        ResultCell {
            state: Mutex::new(CellState {
                outcome: None,
                continuations: Vec::new(),
                cancel_hook: None,
            }),
            cond: Condvar::new(),
        }
    }

    /// Sets the hook run when the cell gets cancelled.
    pub fn set_cancel_hook(&self, hook: impl FnOnce() + Send + 'static) {
        let mut state = self.state.lock();
        if state.outcome.is_none() {
            state.cancel_hook = Some(Box::new(hook));
        }
    }

    /// Completes the cell.
    ///
    /// Returns `false` if the cell was already complete, in which case
    /// `outcome` is dropped.
    pub fn complete(&self, outcome: Outcome) -> bool {
        let continuations = {
            let mut state = self.state.lock();
            if state.outcome.is_some() {
                return false;
            }
            state.outcome = Some(outcome.clone());
            state.cancel_hook = None;
            self.cond.notify_all();
            std::mem::take(&mut state.continuations)
        };
        for f in continuations {
            f(&outcome)
        }
        true
    }

    /// Cancels the cell.
    ///
    /// Runs the cancel hook on the calling thread. Returns `false` if the
    /// cell was already complete.
    pub fn cancel(&self) -> bool {
        let (hook, continuations) = {
            let mut state = self.state.lock();
            if state.outcome.is_some() {
                return false;
            }
            state.outcome = Some(Outcome::Cancelled);
            self.cond.notify_all();
            (
                state.cancel_hook.take(),
                std::mem::take(&mut state.continuations),
            )
        };
        if let Some(hook) = hook {
            hook()
        }
        let outcome = Outcome::Cancelled;
        for f in continuations {
            f(&outcome)
        }
        true
    }

    pub fn is_finished(&self) -> bool {
        self.state.lock().outcome.is_some()
    }

    pub fn try_outcome(&self) -> Option<Outcome> {
        self.state.lock().outcome.clone()
    }

    /// Blocks until the cell is complete.
    pub fn wait(&self) -> Outcome {
        let mut state = self.state.lock();
        loop {
            if let Some(outcome) = state.outcome.as_ref() {
                return outcome.clone();
            }
            self.cond.wait(&mut state);
        }
    }

    /// Blocks until the cell is complete or `timeout` has passed.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Outcome> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(outcome) = state.outcome.as_ref() {
                return Some(outcome.clone());
            }
            if self.cond.wait_until(&mut state, deadline).timed_out() {
                return state.outcome.clone();
            }
        }
    }

    /// Runs `f` once the cell is complete.
    ///
    /// If the cell is complete already, `f` runs right away on the calling
    /// thread. Otherwise it runs on whichever thread completes the cell.
    pub fn on_complete(&self, f: impl FnOnce(&Outcome) + Send + 'static) {
        let outcome = {
            let mut state = self.state.lock();
            match state.outcome.as_ref() {
                Some(outcome) => outcome.clone(),
                None => {
                    state.continuations.push(Box::new(f));
                    return;
                }
            }
        };
        f(&outcome)
    }
}

//------------ QueryHandle ---------------------------------------------------

/// A handle to a submitted query.
///
/// The handle can be cloned freely. Dropping all handles does not cancel
/// the query; it runs to completion and the outcome is discarded.
#[derive(Clone)]
pub struct QueryHandle {
    /// The message ID of the request.
    id: u16,

    /// The cell the query completes into.
    cell: Arc<ResultCell>,
}

impl QueryHandle {
    pub(crate) fn new(id: u16, cell: Arc<ResultCell>) -> Self {
        QueryHandle { id, cell }
    }

    /// Returns the message ID of the request.
    pub fn id(&self) -> u16 {
        self.id
    }

    /// Blocks until the query is complete and returns its outcome.
    pub fn wait(&self) -> Outcome {
        self.cell.wait()
    }

    /// Blocks for at most `timeout` waiting for the outcome.
    ///
    /// Returns `None` if the query is still running afterwards. The query
    /// itself is not affected by this timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Outcome> {
        self.cell.wait_timeout(timeout)
    }

    /// Returns the outcome if the query has completed.
    pub fn try_outcome(&self) -> Option<Outcome> {
        self.cell.try_outcome()
    }

    /// Returns whether the query has completed.
    pub fn is_finished(&self) -> bool {
        self.cell.is_finished()
    }

    /// Cancels the query.
    ///
    /// Any socket the query holds is closed and the query stops taking
    /// part in the event loop. Returns `true` if this call cancelled the
    /// query and `false` if the query had completed already.
    pub fn cancel(&self) -> bool {
        self.cell.cancel()
    }

    /// Registers a closure to be run with the outcome.
    ///
    /// If the query has completed already, the closure runs immediately on
    /// the current thread. Otherwise it runs on the thread completing the
    /// query, which usually is an event loop thread, so it should not
    /// block.
    pub fn on_complete(&self, f: impl FnOnce(&Outcome) + Send + 'static) {
        self.cell.on_complete(f)
    }
}

impl fmt::Debug for QueryHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("QueryHandle")
            .field("id", &self.id)
            .field("finished", &self.cell.is_finished())
            .finish()
    }
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::base::MessageBuilder;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn response() -> Message {
        let mut builder = MessageBuilder::new();
        builder.header_mut().set_id(7);
        builder.header_mut().set_qr(true);
        builder.into_message()
    }

    #[test]
    fn complete_once() {
        let cell = ResultCell::new();
        assert!(!cell.is_finished());
        assert!(cell.complete(Outcome::Response(response())));
        assert!(!cell.complete(Outcome::Failed(Error::Timeout)));
        assert!(!cell.cancel());
        assert_eq!(cell.try_outcome().unwrap().response().unwrap().id(), 7);
    }

    #[test]
    fn cancel_runs_hook_once() {
        let hits = Arc::new(AtomicUsize::new(0));
        let cell = ResultCell::new();
        let hook_hits = hits.clone();
        cell.set_cancel_hook(move || {
            hook_hits.fetch_add(1, Ordering::SeqCst);
        });
        assert!(cell.cancel());
        assert!(!cell.cancel());
        assert!(!cell.complete(Outcome::Failed(Error::Timeout)));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(cell.wait().is_cancelled());
    }

    #[test]
    fn hook_not_run_after_completion() {
        let hits = Arc::new(AtomicUsize::new(0));
        let cell = ResultCell::new();
        let hook_hits = hits.clone();
        cell.set_cancel_hook(move || {
            hook_hits.fetch_add(1, Ordering::SeqCst);
        });
        assert!(cell.complete(Outcome::Failed(Error::Timeout)));
        assert!(!cell.cancel());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn continuations() {
        let hits = Arc::new(AtomicUsize::new(0));
        let cell = ResultCell::new();
        let early = hits.clone();
        cell.on_complete(move |outcome| {
            assert!(outcome.error().unwrap().is_timeout());
            early.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        cell.complete(Outcome::Failed(Error::Timeout));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        let late = hits.clone();
        cell.on_complete(move |_| {
            late.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn wait_across_threads() {
        let cell = Arc::new(ResultCell::new());
        assert!(cell.wait_timeout(Duration::from_millis(10)).is_none());
        let producer = cell.clone();
        let join = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.complete(Outcome::Response(response()))
        });
        let handle = QueryHandle::new(7, cell);
        let outcome = handle.wait();
        assert_eq!(outcome.response().unwrap().id(), 7);
        assert!(join.join().unwrap());
        assert!(handle.is_finished());
        assert!(!handle.cancel());
    }

    #[test]
    fn racing_completers() {
        let cell = Arc::new(ResultCell::new());
        let winners = Arc::new(AtomicUsize::new(0));
        let threads: Vec<_> = (0..8)
            .map(|i| {
                let cell = cell.clone();
                let winners = winners.clone();
                thread::spawn(move || {
                    let won = if i % 2 == 0 {
                        cell.cancel()
                    } else {
                        cell.complete(Outcome::Failed(Error::Timeout))
                    };
                    if won {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(winners.load(Ordering::SeqCst), 1);
    }
}
