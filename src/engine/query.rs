//! The per-query protocol state machine.
//!
//! A [`QueryMachine`] drives a single request through the exchange with a
//! name server. It first tries UDP. If that fails in any way, if the
//! response is truncated, or if it has the wrong message ID, the machine
//! starts over with TCP. Failures on UDP are only recorded. Failures on TCP
//! are final since there is nothing left to fall back to.
//!
//! The machine never blocks. Each call to [`QueryMachine::ready`] performs
//! exactly one non-blocking I/O operation for the current phase and then
//! either finishes, moves on to the next phase, or re-arms the socket for
//! the same readiness again. The event loop calls it whenever the socket
//! registered under the query’s token reports readiness.

use super::config::{QueryMode, QueryParams};
use super::error::Error;
use super::selector::Selector;
use crate::base::Message;
use bytes::Bytes;
use mio::event::Source;
use mio::net::{TcpStream, UdpSocket};
use mio::{Interest, Token};
use std::io::{self, IoSlice, Read, Write};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::{fmt, mem};
use tracing::{debug, trace, warn};

//------------ QueryId -------------------------------------------------------

/// The engine-internal identifier of a query.
///
/// This doubles as the token its socket is registered under.
pub(crate) type QueryId = usize;

//------------ Step ----------------------------------------------------------

/// What happened after the machine made progress.
#[derive(Debug)]
pub(crate) enum Step {
    /// The query is waiting for readiness.
    Pending,

    /// The query is finished and its socket has been released.
    Done(Result<Message, Error>),
}

//------------ Phase ---------------------------------------------------------

/// The protocol phase a query is in.
enum Phase {
    /// The machine hasn’t been started yet.
    Idle,

    /// Waiting to send the request over UDP.
    UdpWrite,

    /// Waiting for the response over UDP.
    UdpRead,

    /// Waiting for the TCP connection to be established.
    TcpConnect,

    /// Writing the length-prefixed request to the TCP stream.
    TcpWrite {
        /// Octets written so far including the length prefix.
        written: usize,
    },

    /// Reading the length-prefixed response from the TCP stream.
    TcpRead(StreamReader),

    /// The machine is finished or was abandoned.
    Closed,
}

impl Phase {
    fn name(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::UdpWrite => "UDP write",
            Phase::UdpRead => "UDP read",
            Phase::TcpConnect => "TCP connect",
            Phase::TcpWrite { .. } => "TCP write",
            Phase::TcpRead(_) => "TCP read",
            Phase::Closed => "closed",
        }
    }
}

//------------ Channel -------------------------------------------------------

/// The socket a query currently uses.
enum Channel {
    Udp(UdpSocket),
    Tcp(TcpStream),
}

impl Channel {
    fn source(&mut self) -> &mut dyn Source {
        match self {
            Channel::Udp(sock) => sock,
            Channel::Tcp(sock) => sock,
        }
    }
}

//------------ QueryMachine --------------------------------------------------

/// The state of a single query.
pub(crate) struct QueryMachine {
    /// The engine-internal ID and token.
    id: QueryId,

    /// The request to send.
    request: Message,

    /// Where and how to send it.
    params: QueryParams,

    /// The current phase.
    phase: Phase,

    /// The socket, if one is open.
    channel: Option<Channel>,

    /// Whether the socket is registered with the selector.
    registered: bool,

    /// The errors recorded so far.
    errors: Vec<Error>,
}

impl QueryMachine {
    pub fn new(id: QueryId, request: Message, params: QueryParams) -> Self {
        QueryMachine {
            id,
            request,
            params,
            phase: Phase::Idle,
            channel: None,
            registered: false,
            errors: Vec::new(),
        }
    }

    /// Returns the token the query’s sockets are registered under.
    fn token(&self) -> Token {
        Token(self.id)
    }

    /// Starts the query at its initial phase.
    ///
    /// Does nothing if the query has been started before.
    pub fn start(&mut self, selector: &Selector) -> Step {
        if !matches!(self.phase, Phase::Idle) {
            return Step::Pending;
        }
        trace!(
            query = self.id,
            server = %self.params.server(),
            mode = ?self.params.mode(),
            "starting query"
        );
        match self.params.mode() {
            QueryMode::PreferUdp => self.udp_connect(selector),
            QueryMode::TcpOnly => self.tcp_connect(selector),
        }
    }

    /// Makes progress after the socket reported readiness.
    pub fn ready(&mut self, selector: &Selector) -> Step {
        if self.channel.is_none() {
            return Step::Pending;
        }
        match self.phase {
            Phase::UdpWrite => self.udp_write(selector),
            Phase::UdpRead => self.udp_read(selector),
            Phase::TcpConnect => self.tcp_connected(selector),
            Phase::TcpWrite { .. } => self.tcp_write(selector),
            Phase::TcpRead(_) => self.tcp_read(selector),
            Phase::Idle | Phase::Closed => Step::Pending,
        }
    }

    /// Closes the socket and stops the machine.
    pub fn abandon(&mut self, selector: &Selector) {
        self.release(selector);
        self.phase = Phase::Closed;
    }

    /// Deregisters and closes the current socket if there is one.
    fn release(&mut self, selector: &Selector) {
        if let Some(mut channel) = self.channel.take() {
            if self.registered {
                if let Err(err) = selector.deregister(channel.source()) {
                    warn!(
                        query = self.id,
                        "failed to deregister socket: {}", err
                    );
                }
                self.registered = false;
            }
        }
    }

    /// Arms the current socket for `interest`.
    fn arm(
        &mut self,
        selector: &Selector,
        interest: Interest,
    ) -> Result<(), Error> {
        let token = self.token();
        let channel = match self.channel.as_mut() {
            Some(channel) => channel,
            None => return Ok(()),
        };
        let res = if self.registered {
            selector.reregister(channel.source(), token, interest)
        } else {
            selector.register(channel.source(), token, interest)
        };
        res.map_err(|err| Error::Register(Arc::new(err)))?;
        self.registered = true;
        Ok(())
    }

    /// Arms the socket for the UDP phases.
    ///
    /// A failure to register counts as a UDP failure.
    fn arm_udp(&mut self, selector: &Selector, interest: Interest) -> Step {
        match self.arm(selector, interest) {
            Ok(()) => Step::Pending,
            Err(err) => self.fallback(selector, Some(err)),
        }
    }

    /// Arms the socket for the TCP phases.
    fn arm_tcp(&mut self, selector: &Selector, interest: Interest) -> Step {
        match self.arm(selector, interest) {
            Ok(()) => Step::Pending,
            Err(err) => self.fail(selector, err),
        }
    }

    /// Gives up on UDP and starts over with TCP.
    fn fallback(&mut self, selector: &Selector, err: Option<Error>) -> Step {
        match err {
            Some(err) => {
                debug!(
                    query = self.id,
                    "UDP attempt failed, retrying over TCP: {}", err
                );
                self.errors.push(err);
            }
            None => {
                debug!(query = self.id, "truncated response, retrying over TCP")
            }
        }
        self.tcp_connect(selector)
    }

    /// Finishes the query with an error.
    ///
    /// All errors recorded so far are bundled with `err`.
    fn fail(&mut self, selector: &Selector, err: Error) -> Step {
        self.abandon(selector);
        let mut errors = mem::take(&mut self.errors);
        errors.push(err.clone());
        let err = Error::bundle(errors).unwrap_or(err);
        debug!(query = self.id, "query failed: {}", err);
        Step::Done(Err(err))
    }

    /// Finishes the query with a response.
    fn succeed(&mut self, selector: &Selector, response: Message) -> Step {
        debug!(
            query = self.id,
            phase = self.phase.name(),
            "query answered"
        );
        self.abandon(selector);
        Step::Done(Ok(response))
    }
}

/// # UDP
///
impl QueryMachine {
    /// Opens a UDP socket connected to the server.
    fn udp_connect(&mut self, selector: &Selector) -> Step {
        let server = self.params.server();
        let local: SocketAddr = match server {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let sock = match UdpSocket::bind(local) {
            Ok(sock) => sock,
            Err(err) => {
                return self
                    .fallback(selector, Some(Error::UdpBind(Arc::new(err))))
            }
        };
        if let Err(err) = sock.connect(server) {
            return self
                .fallback(selector, Some(Error::UdpConnect(Arc::new(err))));
        }
        self.channel = Some(Channel::Udp(sock));
        self.phase = Phase::UdpWrite;
        trace!(query = self.id, "UDP socket open");
        self.arm_udp(selector, Interest::WRITABLE)
    }

    fn udp_write(&mut self, selector: &Selector) -> Step {
        let sock = match self.channel.as_ref() {
            Some(Channel::Udp(sock)) => sock,
            _ => return Step::Pending,
        };
        let res = sock.send(self.request.as_slice());
        match res {
            Ok(sent) if sent == self.request.as_slice().len() => {
                trace!(query = self.id, sent, "UDP request sent");
                self.phase = Phase::UdpRead;
                self.arm_udp(selector, Interest::READABLE)
            }
            Ok(_) => self.fallback(selector, Some(Error::UdpShortSend)),
            Err(err) if is_retry(&err) => {
                self.arm_udp(selector, Interest::WRITABLE)
            }
            Err(err) => {
                self.fallback(selector, Some(Error::UdpSend(Arc::new(err))))
            }
        }
    }

    fn udp_read(&mut self, selector: &Selector) -> Step {
        let sock = match self.channel.as_ref() {
            Some(Channel::Udp(sock)) => sock,
            _ => return Step::Pending,
        };
        let mut buf = vec![0; usize::from(self.params.udp_payload_size())];
        let len = match sock.recv(&mut buf) {
            Ok(len) => len,
            Err(err) if is_retry(&err) => {
                return self.arm_udp(selector, Interest::READABLE)
            }
            Err(err) => {
                return self
                    .fallback(selector, Some(Error::UdpReceive(Arc::new(err))))
            }
        };
        buf.truncate(len);
        trace!(query = self.id, len, "UDP response received");
        let response = match Message::from_octets(Bytes::from(buf)) {
            Ok(response) if response.id() == self.request.id() => response,
            _ => {
                return self
                    .fallback(selector, Some(Error::WrongReplyForQuery))
            }
        };
        if response.is_truncated() {
            return self.fallback(selector, None);
        }
        self.succeed(selector, response)
    }
}

/// # TCP
///
impl QueryMachine {
    /// Opens a TCP connection to the server.
    ///
    /// Any UDP socket still open is released first.
    fn tcp_connect(&mut self, selector: &Selector) -> Step {
        self.release(selector);
        let sock = match TcpStream::connect(self.params.server()) {
            Ok(sock) => sock,
            Err(err) => {
                return self.fail(selector, Error::TcpConnect(Arc::new(err)))
            }
        };
        self.channel = Some(Channel::Tcp(sock));
        self.phase = Phase::TcpConnect;
        trace!(query = self.id, "TCP connect in progress");
        self.arm_tcp(selector, Interest::WRITABLE)
    }

    /// Checks whether the connection has been established.
    fn tcp_connected(&mut self, selector: &Selector) -> Step {
        let sock = match self.channel.as_ref() {
            Some(Channel::Tcp(sock)) => sock,
            _ => return Step::Pending,
        };
        match sock.take_error() {
            Ok(None) => {}
            Ok(Some(err)) | Err(err) => {
                return self.fail(selector, Error::TcpConnect(Arc::new(err)))
            }
        }
        match sock.peer_addr() {
            Ok(_) => {
                trace!(query = self.id, "TCP connected");
                self.phase = Phase::TcpWrite { written: 0 };
                self.tcp_write(selector)
            }
            Err(err)
                if err.kind() == io::ErrorKind::NotConnected
                    || is_retry(&err) =>
            {
                self.arm_tcp(selector, Interest::WRITABLE)
            }
            Err(err) => self.fail(selector, Error::TcpConnect(Arc::new(err))),
        }
    }

    /// Writes the length prefix and request as a single gathered write.
    fn tcp_write(&mut self, selector: &Selector) -> Step {
        let written = match self.phase {
            Phase::TcpWrite { written } => written,
            _ => return Step::Pending,
        };
        let body = self.request.as_slice();
        let prefix = match u16::try_from(body.len()) {
            Ok(len) => len.to_be_bytes(),
            Err(_) => {
                let err = io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "request too long for stream transport",
                );
                return self
                    .fail(selector, Error::StreamWriteError(Arc::new(err)));
            }
        };
        let total = prefix.len() + body.len();
        let (head, tail) = if written < prefix.len() {
            (&prefix[written..], body)
        } else {
            (&[][..], &body[written - prefix.len()..])
        };
        let sock = match self.channel.as_mut() {
            Some(Channel::Tcp(sock)) => sock,
            _ => return Step::Pending,
        };
        let res = sock.write_vectored(&[IoSlice::new(head), IoSlice::new(tail)]);
        match res {
            Ok(0) => {
                let err = io::Error::from(io::ErrorKind::WriteZero);
                self.fail(selector, Error::StreamWriteError(Arc::new(err)))
            }
            Ok(len) => {
                let written = written + len;
                trace!(query = self.id, written, total, "TCP request written");
                if written < total {
                    self.phase = Phase::TcpWrite { written };
                    self.arm_tcp(selector, Interest::WRITABLE)
                } else {
                    self.phase = Phase::TcpRead(StreamReader::new());
                    self.arm_tcp(selector, Interest::READABLE)
                }
            }
            Err(err) if is_retry(&err) => {
                self.arm_tcp(selector, Interest::WRITABLE)
            }
            Err(err) => {
                self.fail(selector, Error::StreamWriteError(Arc::new(err)))
            }
        }
    }

    /// Reads the next part of the length-prefixed response.
    fn tcp_read(&mut self, selector: &Selector) -> Step {
        let (sock, reader) = match (self.channel.as_mut(), &mut self.phase) {
            (Some(Channel::Tcp(sock)), Phase::TcpRead(reader)) => {
                (sock, reader)
            }
            _ => return Step::Pending,
        };
        let res = sock.read(reader.buf());
        let body = match res {
            Ok(0) => {
                return self.fail(selector, Error::StreamUnexpectedEndOfData)
            }
            Ok(len) => {
                trace!(query = self.id, len, "TCP data received");
                match reader.advance(len) {
                    Some(body) => body,
                    None => return self.arm_tcp(selector, Interest::READABLE),
                }
            }
            Err(err) if is_retry(&err) => {
                return self.arm_tcp(selector, Interest::READABLE)
            }
            Err(err) => {
                return self
                    .fail(selector, Error::StreamReadError(Arc::new(err)))
            }
        };
        let response = match Message::from_octets(body) {
            Ok(response) => response,
            Err(_) => return self.fail(selector, Error::ShortMessage),
        };
        if response.id() != self.request.id() {
            return self.fail(selector, Error::WrongReplyForQuery);
        }
        self.succeed(selector, response)
    }
}

impl fmt::Debug for QueryMachine {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("QueryMachine")
            .field("id", &self.id)
            .field("server", &self.params.server())
            .field("phase", &self.phase.name())
            .field("registered", &self.registered)
            .field("errors", &self.errors)
            .finish()
    }
}

/// Returns whether an I/O error means to try again later.
fn is_retry(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

//------------ StreamReader --------------------------------------------------

/// Assembles a length-prefixed message from partial reads.
struct StreamReader {
    /// The length prefix.
    len: [u8; 2],

    /// How much of the length prefix has been read.
    len_read: usize,

    /// The message body, allocated once the prefix is complete.
    body: Vec<u8>,

    /// How much of the body has been read.
    body_read: usize,
}

impl StreamReader {
    fn new() -> Self {
        StreamReader {
            len: [0; 2],
            len_read: 0,
            body: Vec::new(),
            body_read: 0,
        }
    }

    /// Returns the buffer the next read should go into.
    ///
    /// This is never empty while the message is incomplete.
    fn buf(&mut self) -> &mut [u8] {
        if self.len_read < self.len.len() {
            &mut self.len[self.len_read..]
        } else {
            &mut self.body[self.body_read..]
        }
    }

    /// Accounts for `len` octets read into the last buffer.
    ///
    /// Returns the body once it is complete.
    fn advance(&mut self, len: usize) -> Option<Bytes> {
        if self.len_read < self.len.len() {
            self.len_read += len;
            if self.len_read < self.len.len() {
                return None;
            }
            self.body = vec![0; usize::from(u16::from_be_bytes(self.len))];
        } else {
            self.body_read += len;
        }
        if self.body_read < self.body.len() {
            None
        } else {
            Some(mem::take(&mut self.body).into())
        }
    }
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::base::MessageBuilder;

    impl QueryMachine {
        /// Returns the octets written so far and in total while writing
        /// the request over TCP.
        pub(crate) fn tcp_write_progress(&self) -> Option<(usize, usize)> {
            match self.phase {
                Phase::TcpWrite { written } => {
                    Some((written, self.request.as_slice().len() + 2))
                }
                _ => None,
            }
        }

        /// Limits the send buffer of the TCP socket.
        pub(crate) fn set_send_buffer_size(&self, size: usize) {
            if let Some(Channel::Tcp(sock)) = self.channel.as_ref() {
                socket2::SockRef::from(sock)
                    .set_send_buffer_size(size)
                    .unwrap();
            }
        }

        pub(crate) fn is_closed(&self) -> bool {
            self.channel.is_none() && matches!(self.phase, Phase::Closed)
        }
    }

    fn machine() -> QueryMachine {
        let params = QueryParams::new(([127, 0, 0, 1], 53).into());
        QueryMachine::new(0, MessageBuilder::new().into_message(), params)
    }

    fn io_error() -> Arc<io::Error> {
        Arc::new(io::Error::from(io::ErrorKind::ConnectionRefused))
    }

    #[test]
    fn fail_keeps_single_error() {
        let selector = Selector::new().unwrap();
        let mut machine = machine();
        match machine.fail(&selector, Error::TcpConnect(io_error())) {
            Step::Done(Err(Error::TcpConnect(_))) => {}
            other => panic!("unexpected step {:?}", other),
        }
        assert!(machine.is_closed());
    }

    #[test]
    fn fail_bundles_recorded_errors() {
        let selector = Selector::new().unwrap();
        let mut machine = machine();
        machine.errors.push(Error::UdpConnect(io_error()));
        let err = match machine.fail(&selector, Error::TcpConnect(io_error()))
        {
            Step::Done(Err(err)) => err,
            other => panic!("unexpected step {:?}", other),
        };
        let causes = err.causes();
        assert_eq!(causes.len(), 2);
        assert!(matches!(causes[0], Error::UdpConnect(_)));
        assert!(matches!(causes[1], Error::TcpConnect(_)));
        assert!(machine.errors.is_empty());
    }

    fn feed(reader: &mut StreamReader, data: &[u8]) -> Option<Bytes> {
        let buf = reader.buf();
        buf[..data.len()].copy_from_slice(data);
        reader.advance(data.len())
    }

    #[test]
    fn stream_reader_partial() {
        let mut reader = StreamReader::new();
        assert!(feed(&mut reader, &[0]).is_none());
        assert!(feed(&mut reader, &[5]).is_none());
        assert_eq!(reader.buf().len(), 5);
        assert!(feed(&mut reader, b"ab").is_none());
        assert_eq!(reader.buf().len(), 3);
        assert_eq!(feed(&mut reader, b"cde").unwrap().as_ref(), b"abcde");
    }

    #[test]
    fn stream_reader_empty_body() {
        let mut reader = StreamReader::new();
        assert_eq!(feed(&mut reader, &[0, 0]).unwrap().len(), 0);
    }

    #[test]
    fn stream_reader_prefix_only() {
        let mut reader = StreamReader::new();
        assert_eq!(reader.buf().len(), 2);
        assert!(feed(&mut reader, &[1, 0]).is_none());
        assert_eq!(reader.buf().len(), 256);
    }
}
