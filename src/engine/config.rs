//! Configuration of the engine and of individual queries.

use std::cmp;
use std::net::SocketAddr;
use std::time::Duration;

//------------ Configuration Constants ---------------------------------------

/// Configuration limits for the number of worker threads.
const WORKERS: DefMinMax<usize> = DefMinMax::new(1, 1, 64);

/// Configuration limits for the number of readiness events per wait.
const EVENTS_CAPACITY: DefMinMax<usize> = DefMinMax::new(256, 16, 65536);

/// Configuration limits for the query timeout.
const TIMEOUT: DefMinMax<Duration> = DefMinMax::new(
    Duration::from_secs(5),
    Duration::from_millis(1),
    Duration::from_secs(60),
);

/// Configuration limits for the UDP payload size.
///
/// See draft-ietf-dnsop-avoid-fragmentation for the default.
const UDP_PAYLOAD_SIZE: DefMinMax<u16> = DefMinMax::new(1232, 512, 4096);

//------------ QueryMode -----------------------------------------------------

/// Which transports a query uses.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub enum QueryMode {
    /// Try UDP first and fall back to TCP if that fails.
    ///
    /// A truncated response, a response with the wrong ID, or any I/O
    /// error on the UDP socket lead to a second attempt over TCP.
    #[default]
    PreferUdp,

    /// Only use TCP.
    TcpOnly,
}

//------------ Config --------------------------------------------------------

/// Configuration for a query engine.
#[derive(Clone, Debug)]
pub struct Config {
    /// Number of event loop threads.
    workers: usize,

    /// Maximum number of readiness events collected per wait.
    events_capacity: usize,

    /// Default timeout for queries.
    timeout: Duration,

    /// Default UDP payload size.
    udp_payload_size: u16,

    /// Default query mode.
    mode: QueryMode,
}

impl Config {
    /// Creates a new config with default values.
    pub fn new() -> Self {
        Default::default()
    }

    /// Returns the number of worker threads.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Sets the number of worker threads.
    ///
    /// The workers share a single multiplexer. A single worker is enough
    /// for almost all workloads since each readiness event only causes a
    /// single non-blocking operation.
    ///
    /// If this value is too small or too large, it will be capped.
    pub fn set_workers(&mut self, value: usize) {
        self.workers = WORKERS.limit(value)
    }

    /// Returns the maximum number of events processed per wait.
    pub fn events_capacity(&self) -> usize {
        self.events_capacity
    }

    /// Sets the maximum number of events processed per wait.
    ///
    /// If this value is too small or too large, it will be capped.
    pub fn set_events_capacity(&mut self, value: usize) {
        self.events_capacity = EVENTS_CAPACITY.limit(value)
    }

    /// Returns the default query timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Sets the default query timeout.
    ///
    /// The timeout covers the whole query including a possible fallback
    /// to TCP. If this value is too small or too large, it will be capped.
    pub fn set_timeout(&mut self, value: Duration) {
        self.timeout = TIMEOUT.limit(value)
    }

    /// Returns the default UDP payload size.
    pub fn udp_payload_size(&self) -> u16 {
        self.udp_payload_size
    }

    /// Sets the default UDP payload size.
    ///
    /// If this value is too small or too large, it will be capped.
    pub fn set_udp_payload_size(&mut self, value: u16) {
        self.udp_payload_size = UDP_PAYLOAD_SIZE.limit(value)
    }

    /// Returns the default query mode.
    pub fn mode(&self) -> QueryMode {
        self.mode
    }

    /// Sets the default query mode.
    pub fn set_mode(&mut self, mode: QueryMode) {
        self.mode = mode
    }

    /// Returns query parameters for `server` using the defaults.
    pub fn query_params(&self, server: SocketAddr) -> QueryParams {
        QueryParams {
            server,
            udp_payload_size: self.udp_payload_size,
            timeout: self.timeout,
            mode: self.mode,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: WORKERS.default(),
            events_capacity: EVENTS_CAPACITY.default(),
            timeout: TIMEOUT.default(),
            udp_payload_size: UDP_PAYLOAD_SIZE.default(),
            mode: QueryMode::default(),
        }
    }
}

//------------ QueryParams ---------------------------------------------------

/// The parameters of a single query.
#[derive(Clone, Copy, Debug)]
pub struct QueryParams {
    /// The name server to send the query to.
    server: SocketAddr,

    /// Size of the receive buffer for UDP responses.
    udp_payload_size: u16,

    /// Time after which the query fails.
    timeout: Duration,

    /// The transports to use.
    mode: QueryMode,
}

impl QueryParams {
    /// Creates parameters for `server` with the crate defaults.
    pub fn new(server: SocketAddr) -> Self {
        Config::default().query_params(server)
    }

    /// Returns the server address.
    pub fn server(&self) -> SocketAddr {
        self.server
    }

    /// Returns the UDP payload size.
    pub fn udp_payload_size(&self) -> u16 {
        self.udp_payload_size
    }

    /// Sets the UDP payload size.
    ///
    /// This is the size of the buffer a UDP response is read into. Longer
    /// datagrams are cut short by the operating system.
    pub fn set_udp_payload_size(&mut self, value: u16) {
        self.udp_payload_size = UDP_PAYLOAD_SIZE.limit(value)
    }

    /// Returns the timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Sets the timeout.
    pub fn set_timeout(&mut self, value: Duration) {
        self.timeout = TIMEOUT.limit(value)
    }

    /// Returns the query mode.
    pub fn mode(&self) -> QueryMode {
        self.mode
    }

    /// Sets the query mode.
    pub fn set_mode(&mut self, mode: QueryMode) {
        self.mode = mode
    }

    /// Returns the params with a different timeout.
    pub fn with_timeout(mut self, value: Duration) -> Self {
        self.set_timeout(value);
        self
    }

    /// Returns the params with a different query mode.
    pub fn with_mode(mut self, mode: QueryMode) -> Self {
        self.set_mode(mode);
        self
    }

    /// Returns the params with a different UDP payload size.
    pub fn with_udp_payload_size(mut self, value: u16) -> Self {
        self.set_udp_payload_size(value);
        self
    }
}

//------------ DefMinMax -----------------------------------------------------

/// The default, minimum, and maximum values for a config variable.
#[derive(Clone, Copy)]
struct DefMinMax<T> {
    def: T,
    min: T,
    max: T,
}

impl<T> DefMinMax<T> {
    const fn new(def: T, min: T, max: T) -> Self {
        Self { def, min, max }
    }

    fn default(self) -> T {
        self.def
    }

    fn limit(self, value: T) -> T
    where
        T: Ord,
    {
        cmp::max(self.min, cmp::min(self.max, value))
    }
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn limits() {
        let mut config = Config::new();
        assert_eq!(config.workers(), 1);
        config.set_workers(0);
        assert_eq!(config.workers(), 1);
        config.set_workers(1000);
        assert_eq!(config.workers(), 64);
        config.set_timeout(Duration::ZERO);
        assert_eq!(config.timeout(), Duration::from_millis(1));
        config.set_udp_payload_size(100);
        assert_eq!(config.udp_payload_size(), 512);
        config.set_events_capacity(1 << 20);
        assert_eq!(config.events_capacity(), 65536);
    }

    #[test]
    fn query_params() {
        let server = SocketAddr::from(([127, 0, 0, 1], 53));
        let mut config = Config::new();
        config.set_mode(QueryMode::TcpOnly);
        config.set_timeout(Duration::from_secs(2));
        let params = config.query_params(server);
        assert_eq!(params.server(), server);
        assert_eq!(params.mode(), QueryMode::TcpOnly);
        assert_eq!(params.timeout(), Duration::from_secs(2));
        assert_eq!(params.udp_payload_size(), 1232);

        let params = QueryParams::new(server)
            .with_timeout(Duration::from_millis(50))
            .with_udp_payload_size(9000);
        assert_eq!(params.mode(), QueryMode::PreferUdp);
        assert_eq!(params.timeout(), Duration::from_millis(50));
        assert_eq!(params.udp_payload_size(), 4096);
    }
}
