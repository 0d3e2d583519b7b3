//! A scriptable name server for driving the engine in tests.
//!
//! The server listens on the same port for UDP and TCP and answers every
//! query in a way chosen by the test. It counts what it sees and reports
//! closed TCP connections so tests can check that the engine let go of
//! its sockets.
#![allow(dead_code)]

use bytes::Bytes;
use domain_engine::base::{Class, Message, MessageBuilder, Rcode, Rtype};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// The address returned in answers over UDP.
pub const UDP_ADDR: [u8; 4] = [192, 0, 2, 1];

/// The address returned in answers over TCP.
pub const TCP_ADDR: [u8; 4] = [192, 0, 2, 2];

/// Installs a log subscriber controlled by `RUST_LOG`.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_thread_ids(true)
        .with_test_writer()
        .try_init()
        .ok();
}

//------------ Behaviour -----------------------------------------------------

/// How the server reacts to queries over UDP.
#[derive(Clone, Copy, Debug)]
pub enum Udp {
    /// Answer with `UDP_ADDR`.
    Answer,

    /// Answer with the TC bit set and no records.
    Truncated,

    /// Answer with a different message ID.
    WrongId,

    /// Answer with something that isn’t a DNS message.
    Garbage,

    /// Answer with the given rcode.
    Rcode(Rcode),

    /// Never answer.
    Silent,
}

/// How the server reacts to connections over TCP.
#[derive(Clone, Copy, Debug)]
pub enum Tcp {
    /// Don’t listen at all, so connections are refused.
    Refuse,

    /// Answer with `TCP_ADDR`.
    Answer,

    /// Answer with `TCP_ADDR`, spreading the response over three writes.
    Split,

    /// Answer with a different message ID.
    WrongId,

    /// Read the request, then close the connection.
    Close,

    /// Read the request but never answer.
    Silent,

    /// Don’t read anything for a while.
    Stall,
}

//------------ TestServer ----------------------------------------------------

pub struct TestServer {
    addr: SocketAddr,
    udp_queries: Arc<AtomicUsize>,
    tcp_connections: Arc<AtomicUsize>,
    udp_peers: Arc<Mutex<Vec<SocketAddr>>>,
    closed: Mutex<mpsc::Receiver<()>>,
    stop: Arc<AtomicBool>,
}

impl TestServer {
    pub fn start(udp: Udp, tcp: Tcp) -> Self {
        let (udp_sock, listener) = bind_pair(&tcp);
        let addr = udp_sock.local_addr().unwrap();
        let udp_queries = Arc::new(AtomicUsize::new(0));
        let tcp_connections = Arc::new(AtomicUsize::new(0));
        let udp_peers = Arc::new(Mutex::new(Vec::new()));
        let stop = Arc::new(AtomicBool::new(false));
        let (closed_tx, closed_rx) = mpsc::channel();

        {
            let queries = udp_queries.clone();
            let peers = udp_peers.clone();
            let stop = stop.clone();
            thread::spawn(move || {
                serve_udp(udp_sock, udp, queries, peers, stop)
            });
        }
        if let Some(listener) = listener {
            let connections = tcp_connections.clone();
            let stop = stop.clone();
            thread::spawn(move || {
                serve_tcp(listener, tcp, connections, closed_tx, stop)
            });
        }

        TestServer {
            addr,
            udp_queries,
            tcp_connections,
            udp_peers,
            closed: Mutex::new(closed_rx),
            stop,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn udp_queries(&self) -> usize {
        self.udp_queries.load(Ordering::SeqCst)
    }

    pub fn tcp_connections(&self) -> usize {
        self.tcp_connections.load(Ordering::SeqCst)
    }

    /// Returns the client addresses of UDP queries seen so far.
    pub fn udp_peers(&self) -> Vec<SocketAddr> {
        self.udp_peers.lock().unwrap().clone()
    }

    /// Waits for a TCP client to close its connection.
    pub fn wait_closed(&self, timeout: Duration) -> bool {
        self.closed.lock().unwrap().recv_timeout(timeout).is_ok()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}

/// Binds a UDP socket and, if needed, a TCP listener on the same port.
fn bind_pair(tcp: &Tcp) -> (UdpSocket, Option<TcpListener>) {
    for _ in 0..50 {
        let udp = UdpSocket::bind("127.0.0.1:0").unwrap();
        if matches!(tcp, Tcp::Refuse) {
            return (udp, None);
        }
        if let Ok(listener) = TcpListener::bind(udp.local_addr().unwrap()) {
            return (udp, Some(listener));
        }
    }
    panic!("no port free for both UDP and TCP");
}

fn serve_udp(
    sock: UdpSocket,
    behaviour: Udp,
    queries: Arc<AtomicUsize>,
    peers: Arc<Mutex<Vec<SocketAddr>>>,
    stop: Arc<AtomicBool>,
) {
    sock.set_read_timeout(Some(Duration::from_millis(50))).unwrap();
    let mut buf = vec![0; 65535];
    while !stop.load(Ordering::SeqCst) {
        let (len, peer) = match sock.recv_from(&mut buf) {
            Ok(some) => some,
            Err(_) => continue,
        };
        queries.fetch_add(1, Ordering::SeqCst);
        peers.lock().unwrap().push(peer);
        let request = &buf[..len];
        let id = request_id(request);
        let reply = match behaviour {
            Udp::Answer => answer(request, id, Rcode::NOERROR, false, UDP_ADDR),
            Udp::Truncated => {
                answer(request, id, Rcode::NOERROR, true, UDP_ADDR)
            }
            Udp::WrongId => answer(
                request,
                id.wrapping_add(1),
                Rcode::NOERROR,
                false,
                UDP_ADDR,
            ),
            Udp::Garbage => vec![1, 2, 3],
            Udp::Rcode(rcode) => answer(request, id, rcode, false, UDP_ADDR),
            Udp::Silent => continue,
        };
        let _ = sock.send_to(&reply, peer);
    }
}

fn serve_tcp(
    listener: TcpListener,
    behaviour: Tcp,
    connections: Arc<AtomicUsize>,
    closed: mpsc::Sender<()>,
    stop: Arc<AtomicBool>,
) {
    listener.set_nonblocking(true).unwrap();
    while !stop.load(Ordering::SeqCst) {
        let stream = match listener.accept() {
            Ok((stream, _)) => stream,
            Err(_) => {
                thread::sleep(Duration::from_millis(5));
                continue;
            }
        };
        connections.fetch_add(1, Ordering::SeqCst);
        let closed = closed.clone();
        thread::spawn(move || {
            let _ = handle_tcp(stream, behaviour, closed);
        });
    }
}

fn handle_tcp(
    mut stream: TcpStream,
    behaviour: Tcp,
    closed: mpsc::Sender<()>,
) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_nodelay(true)?;
    if let Tcp::Stall = behaviour {
        thread::sleep(Duration::from_millis(300));
        wait_eof(&mut stream);
        let _ = closed.send(());
        return Ok(());
    }

    let mut len = [0u8; 2];
    stream.read_exact(&mut len)?;
    let mut request = vec![0; usize::from(u16::from_be_bytes(len))];
    stream.read_exact(&mut request)?;
    let id = request_id(&request);

    let reply = match behaviour {
        Tcp::Answer | Tcp::Split => {
            answer(&request, id, Rcode::NOERROR, false, TCP_ADDR)
        }
        Tcp::WrongId => answer(
            &request,
            id.wrapping_add(1),
            Rcode::NOERROR,
            false,
            TCP_ADDR,
        ),
        Tcp::Close => return Ok(()),
        _ => {
            wait_eof(&mut stream);
            let _ = closed.send(());
            return Ok(());
        }
    };
    let mut framed = (reply.len() as u16).to_be_bytes().to_vec();
    framed.extend_from_slice(&reply);
    if let Tcp::Split = behaviour {
        stream.write_all(&framed[..1])?;
        thread::sleep(Duration::from_millis(30));
        stream.write_all(&framed[1..2])?;
        thread::sleep(Duration::from_millis(30));
        stream.write_all(&framed[2..])?;
    } else {
        stream.write_all(&framed)?;
    }
    wait_eof(&mut stream);
    let _ = closed.send(());
    Ok(())
}

/// Reads until the peer closes the connection.
fn wait_eof(stream: &mut TcpStream) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(10)));
    let mut buf = [0u8; 1024];
    loop {
        match stream.read(&mut buf) {
            Ok(0) | Err(_) => return,
            Ok(_) => {}
        }
    }
}

//------------ Messages ------------------------------------------------------

fn request_id(request: &[u8]) -> u16 {
    u16::from_be_bytes([request[0], request[1]])
}

/// Creates a response to `request`.
pub fn answer(
    request: &[u8],
    id: u16,
    rcode: Rcode,
    truncated: bool,
    addr: [u8; 4],
) -> Vec<u8> {
    let request = Message::from_octets(Bytes::copy_from_slice(request)).unwrap();
    let question = request.first_question().unwrap().unwrap();
    let mut builder = MessageBuilder::new();
    let header = builder.header_mut();
    header.set_id(id);
    header.set_qr(true);
    header.set_rd(request.header().rd());
    header.set_ra(true);
    header.set_tc(truncated);
    header.set_rcode(rcode);
    builder.push_question(&question).unwrap();
    if !truncated && rcode == Rcode::NOERROR {
        builder
            .push_answer(question.qname(), Rtype::A, Class::IN, 300, &addr)
            .unwrap();
    }
    builder.into_message().into_octets().to_vec()
}

/// Returns the address of the single A record in an answer.
pub fn answer_addr(response: &Message) -> [u8; 4] {
    assert_eq!(response.header_counts().ancount(), 1);
    let octets = response.as_slice();
    let mut addr = [0; 4];
    addr.copy_from_slice(&octets[octets.len() - 4..]);
    addr
}
