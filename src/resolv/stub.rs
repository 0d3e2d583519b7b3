//! A synchronous stub resolver.
//!
//! The [`StubResolver`] asks the name servers of a [`ResolvConf`] for the
//! answer to a single question. It runs its queries on a query engine
//! owned by the resolver and blocks the calling thread until an answer
//! has arrived or all attempts have failed.

use super::conf::ResolvConf;
use crate::base::{Message, Name, Question, Rcode, Rtype};
use crate::engine::{
    Config, Engine, Error, Outcome, QueryMode, RequestMessage,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

//------------ StubResolver --------------------------------------------------

/// A DNS stub resolver.
///
/// The resolver tries each configured server in turn and goes through the
/// whole list `attempts` times. The first response that isn’t a server
/// failure is returned. A response with a SERVFAIL or REFUSED rcode makes
/// the resolver move on to the next server but is returned if nothing
/// better turns up.
#[derive(Debug)]
pub struct StubResolver {
    /// The engine running the queries.
    engine: Engine,

    /// The resolver configuration.
    conf: ResolvConf,

    /// The index of the server to start with if rotating.
    next_server: AtomicUsize,
}

impl StubResolver {
    /// Creates a resolver using the system configuration.
    pub fn new() -> Result<Self, Error> {
        Self::from_conf(ResolvConf::system())
    }

    /// Creates a resolver using the given configuration.
    pub fn from_conf(mut conf: ResolvConf) -> Result<Self, Error> {
        conf.finalize();
        let mut config = Config::new();
        config.set_timeout(conf.timeout);
        if conf.options.use_vc {
            config.set_mode(QueryMode::TcpOnly);
        }
        Ok(StubResolver {
            engine: Engine::with_config(config)?,
            conf,
            next_server: AtomicUsize::new(0),
        })
    }

    /// Returns the resolver configuration.
    pub fn conf(&self) -> &ResolvConf {
        &self.conf
    }

    /// Returns the engine used by the resolver.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Asks for the records of type `qtype` at `qname`.
    pub fn query(&self, qname: &Name, qtype: Rtype) -> Result<Message, Error> {
        let question = Question::new_in(qname.clone(), qtype);
        let mut request = RequestMessage::new(question);
        request.set_recursion_desired(self.conf.options.recurse);
        if self.conf.options.use_edns0 {
            request.set_udp_payload_size(Some(
                self.engine.config().udp_payload_size(),
            ));
        }

        let servers = &self.conf.servers;
        let start = if self.conf.options.rotate {
            self.next_server.fetch_add(1, Ordering::Relaxed) % servers.len()
        } else {
            0
        };

        let mut fallback = None;
        let mut last_err = None;
        for attempt in 0..self.conf.attempts {
            for i in 0..servers.len() {
                let server = servers[(start + i) % servers.len()];
                request.set_random_id();
                let params = self.engine.query_params(server);
                match self.engine.query(&request, params) {
                    Outcome::Response(response) => {
                        if is_server_failure(&response) {
                            debug!(
                                %server,
                                attempt,
                                rcode = %response.header().rcode(),
                                "server failure, trying next server"
                            );
                            fallback = Some(response);
                            continue;
                        }
                        return Ok(response);
                    }
                    Outcome::Failed(err) => {
                        debug!(%server, attempt, "query failed: {}", err);
                        last_err = Some(err);
                    }
                    Outcome::Cancelled => {}
                }
            }
        }
        match fallback {
            Some(response) => Ok(response),
            None => Err(last_err.unwrap_or(Error::Timeout)),
        }
    }
}

/// Returns whether the server failed to answer the question.
fn is_server_failure(response: &Message) -> bool {
    matches!(response.header().rcode(), Rcode::SERVFAIL | Rcode::REFUSED)
}
