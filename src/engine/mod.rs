//! A readiness-driven query engine.
//!
//! The [`Engine`] sends DNS requests to name servers and collects their
//! responses. It runs any number of queries concurrently on a small, fixed
//! pool of background threads that share a single readiness multiplexer.
//! Callers never do any I/O themselves: they [submit][Engine::submit] a
//! request and get a [`QueryHandle`] back which they can wait on, attach
//! a continuation to, or cancel.
//!
//! Each query first tries UDP. If the UDP exchange fails for any reason, if
//! the response has the wrong message ID, or if it is truncated, the query
//! is retried over TCP. With [`QueryMode::TcpOnly`], UDP is skipped
//! entirely. Errors from the UDP attempt are kept and returned together
//! with the TCP error should that fail, too.
//!
//! Every query has a deadline. A query still running when its deadline
//! passes fails with [`Error::Timeout`] and its socket is closed.
//!
//! ```no_run
//! use domain_engine::base::{Name, Rtype};
//! use domain_engine::engine::{Engine, Outcome, QueryParams, RequestMessage};
//!
//! let engine = Engine::new().unwrap();
//! let request = RequestMessage::new((
//!     "example.com".parse::<Name>().unwrap(), Rtype::A
//! ));
//! let params = QueryParams::new("192.0.2.53:53".parse().unwrap());
//! match engine.query(&request, params) {
//!     Outcome::Response(response) => println!("{:?}", response),
//!     Outcome::Failed(err) => println!("query failed: {}", err),
//!     Outcome::Cancelled => unreachable!(),
//! }
//! ```

pub use self::cell::{Outcome, QueryHandle};
pub use self::config::{Config, QueryMode, QueryParams};
pub use self::error::Error;
pub use self::request::{ComposeRequest, RequestMessage};

mod cell;
mod config;
mod error;
mod query;
mod request;
mod schedule;
mod selector;
mod worker;

use self::worker::Shared;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

//------------ Engine --------------------------------------------------------

/// A query engine.
///
/// The engine is a cheaply cloneable handle. All clones share the same
/// worker threads. Once the last clone is dropped, the engine is shut
/// down.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    /// The state shared with the workers.
    shared: Arc<Shared>,

    /// The worker threads.
    workers: Mutex<Vec<JoinHandle<()>>>,

    /// The configuration the engine was created with.
    config: Config,
}

/// # Creation
///
impl Engine {
    /// Creates a new engine with the default configuration.
    pub fn new() -> Result<Self, Error> {
        Self::with_config(Config::default())
    }

    /// Creates a new engine with the given configuration.
    pub fn with_config(config: Config) -> Result<Self, Error> {
        let shared = Arc::new(Shared::new(&config)?);
        let mut workers = Vec::with_capacity(config.workers());
        for n in 0..config.workers() {
            let worker = shared.clone();
            let spawned = thread::Builder::new()
                .name(format!("domain-engine-{}", n))
                .spawn(move || worker.run());
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(err) => {
                    shared.begin_shutdown();
                    for handle in workers {
                        let _ = handle.join();
                    }
                    return Err(err.into());
                }
            }
        }
        debug!(workers = config.workers(), "query engine started");
        Ok(Engine {
            inner: Arc::new(EngineInner {
                shared,
                workers: Mutex::new(workers),
                config,
            }),
        })
    }
}

/// # Queries
///
impl Engine {
    /// Returns the configuration of the engine.
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Returns query parameters for `server` using the engine’s defaults.
    pub fn query_params(&self, server: std::net::SocketAddr) -> QueryParams {
        self.inner.config.query_params(server)
    }

    /// Submits a request.
    ///
    /// Fails right away if the request can’t be composed or the engine
    /// has been shut down. Otherwise the query runs in the background and
    /// the returned handle can be used to wait for its outcome.
    pub fn submit<CR: ComposeRequest + ?Sized>(
        &self,
        request: &CR,
        params: QueryParams,
    ) -> Result<QueryHandle, Error> {
        if self.inner.shared.is_shutdown() {
            return Err(Error::Shutdown);
        }
        let request = request.to_message()?;
        let id = request.id();
        let cell = self.inner.shared.submit(request, params)?;
        Ok(QueryHandle::new(id, cell))
    }

    /// Submits a request and waits for its outcome.
    pub fn query<CR: ComposeRequest + ?Sized>(
        &self,
        request: &CR,
        params: QueryParams,
    ) -> Outcome {
        match self.submit(request, params) {
            Ok(handle) => handle.wait(),
            Err(err) => Outcome::Failed(err),
        }
    }

    /// Returns the number of queries that haven’t completed yet.
    pub fn pending(&self) -> usize {
        self.inner.shared.pending()
    }

    /// Shuts down the engine.
    ///
    /// Stops all worker threads and waits for them to finish. Queries
    /// that haven’t completed by then fail with [`Error::Shutdown`]. New
    /// queries can’t be submitted anymore. Calling this more than once
    /// has no further effect.
    pub fn shutdown(&self) {
        self.inner.shutdown()
    }
}

impl EngineInner {
    fn shutdown(&self) {
        if !self.shared.begin_shutdown() {
            return;
        }
        let workers = std::mem::take(&mut *self.workers.lock());
        let current = thread::current().id();
        for handle in workers {
            // A continuation running on a worker may drop the last handle.
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                warn!("query engine worker panicked");
            }
        }
        self.shared.fail_remaining();
        debug!("query engine shut down");
    }
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        self.shutdown()
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.inner.config)
            .field("pending", &self.pending())
            .finish()
    }
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::base::{Message, MessageBuilder};
    use std::net::SocketAddr;

    fn request() -> Message {
        let mut builder = MessageBuilder::new();
        builder.header_mut().set_id(99);
        builder.into_message()
    }

    #[test]
    fn shutdown_is_idempotent() {
        let engine = Engine::new().unwrap();
        engine.shutdown();
        engine.shutdown();
        let server: SocketAddr = "127.0.0.1:53".parse().unwrap();
        let res = engine.submit(&request(), QueryParams::new(server));
        assert!(matches!(res, Err(Error::Shutdown)));
        assert!(matches!(
            engine.query(&request(), QueryParams::new(server)),
            Outcome::Failed(Error::Shutdown)
        ));
    }

    #[test]
    fn worker_threads() {
        let mut config = Config::new();
        config.set_workers(3);
        let engine = Engine::with_config(config).unwrap();
        assert_eq!(engine.inner.workers.lock().len(), 3);
        let names: Vec<_> = engine
            .inner
            .workers
            .lock()
            .iter()
            .map(|handle| handle.thread().name().map(String::from))
            .collect();
        assert_eq!(names[2].as_deref(), Some("domain-engine-2"));
        assert_eq!(engine.pending(), 0);
    }
}
