//! The readiness multiplexer shared by all event loop threads.
//!
//! A [`Selector`] wraps a mio [`Poll`]. Only one thread at a time can wait
//! on the poll but any thread can register sockets through a cloned
//! [`Registry`]. This opens a window: a socket registered while a thread
//! is about to enter its wait may not be seen by that wait, leaving the
//! query to sit until some unrelated event or deadline comes along.
//!
//! The window is closed with a gate. Every registration first wakes the
//! poll and then takes the gate. The waiting thread takes the gate right
//! before it starts to wait and lets go of it right away. So either the
//! registration happened before the wait started, or the wake request is
//! pending when it does and the wait returns immediately.

use mio::event::Source;
use mio::{Events, Interest, Poll, Registry, Token, Waker};
use parking_lot::Mutex;
use std::io;
use std::time::Duration;
use tracing::warn;

//------------ Constants -----------------------------------------------------

/// The token used by the waker.
///
/// Query tokens are derived from query IDs which never get this high.
pub(crate) const WAKE_TOKEN: Token = Token(usize::MAX);

//------------ Selector ------------------------------------------------------

pub(crate) struct Selector {
    /// The poll, held by the thread currently waiting.
    poll: Mutex<Poll>,

    /// A registry for the poll usable without holding the poll.
    registry: Registry,

    /// Interrupts a wait in progress.
    waker: Waker,

    /// The registration gate.
    gate: Mutex<()>,
}

impl Selector {
    pub fn new() -> io::Result<Self> {
        let poll = Poll::new()?;
        let registry = poll.registry().try_clone()?;
        let waker = Waker::new(poll.registry(), WAKE_TOKEN)?;
        Ok(Selector {
            poll: Mutex::new(poll),
            registry,
            waker,
            gate: Mutex::new(()),
        })
    }

    /// Interrupts the current or next wait.
    pub fn wake(&self) {
        if let Err(err) = self.waker.wake() {
            warn!("failed to wake event loop: {}", err);
        }
    }

    /// Registers a socket for the given interest.
    pub fn register<S>(
        &self,
        source: &mut S,
        token: Token,
        interest: Interest,
    ) -> io::Result<()>
    where
        S: Source + ?Sized,
    {
        self.wake();
        let _gate = self.gate.lock();
        self.registry.register(source, token, interest)
    }

    /// Re-arms a registered socket, possibly with a different interest.
    ///
    /// Re-arming makes a socket that is still ready report again, so a
    /// handler that did only part of its work gets called again.
    pub fn reregister<S>(
        &self,
        source: &mut S,
        token: Token,
        interest: Interest,
    ) -> io::Result<()>
    where
        S: Source + ?Sized,
    {
        self.wake();
        let _gate = self.gate.lock();
        self.registry.reregister(source, token, interest)
    }

    /// Removes a socket from the multiplexer.
    pub fn deregister<S>(&self, source: &mut S) -> io::Result<()>
    where
        S: Source + ?Sized,
    {
        self.wake();
        let _gate = self.gate.lock();
        self.registry.deregister(source)
    }

    /// Waits for readiness events.
    ///
    /// The timeout is determined by calling `timeout` once the poll has
    /// been acquired so that deadlines added while another thread was
    /// waiting are taken into account. A timeout of `None` waits until an
    /// event arrives or the selector is woken.
    pub fn select<F>(&self, events: &mut Events, timeout: F) -> io::Result<()>
    where
        F: FnOnce() -> Option<Duration>,
    {
        let mut poll = self.poll.lock();
        let timeout = timeout();
        drop(self.gate.lock());
        poll.poll(events, timeout)
    }
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn wake_interrupts_wait() {
        let selector = Arc::new(Selector::new().unwrap());
        let waker = selector.clone();
        let join = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            waker.wake();
        });
        let mut events = Events::with_capacity(16);
        let start = Instant::now();
        selector.select(&mut events, || None).unwrap();
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(events.iter().any(|event| event.token() == WAKE_TOKEN));
        join.join().unwrap();
    }

    #[test]
    fn register_while_waiting() {
        let selector = Arc::new(Selector::new().unwrap());
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let mut sock = mio::net::UdpSocket::bind(addr).unwrap();

        let registrar = selector.clone();
        let join = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            registrar
                .register(&mut sock, Token(3), Interest::WRITABLE)
                .unwrap();
            sock
        });

        // The first wait returns because of the wake issued by the
        // registration. The socket is writable right away, so a second
        // wait must see it.
        let mut events = Events::with_capacity(16);
        let mut seen = false;
        for _ in 0..2 {
            selector
                .select(&mut events, || Some(Duration::from_secs(5)))
                .unwrap();
            if events.iter().any(|event| event.token() == Token(3)) {
                seen = true;
                break;
            }
        }
        assert!(seen);
        let mut sock = join.join().unwrap();
        selector.deregister(&mut sock).unwrap();
    }
}
