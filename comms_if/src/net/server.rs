//! # Server Socket
//!
//! A framed TCP server which accepts any number of concurrent client
//! connections. The arm controller runs one of these per channel (command
//! and video).

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{info, warn};
use std::collections::HashMap;
use std::io;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::frame::{self, FrameError};
use super::{FRAME_TIMEOUT, RECV_TIMEOUT, SEND_TIMEOUT};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Sleep between polls of the non-blocking accept loop.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A framed TCP server with a concurrent connection registry.
///
/// Connections are inserted on accept and removed on close or on the first
/// failed write, so a dead peer never disturbs a broadcast to the others.
pub struct ServerSocket {
    inner: Arc<ServerInner>,
    accept_handle: Mutex<Option<JoinHandle<()>>>,
    receive_handles: Mutex<Vec<JoinHandle<()>>>,
}

struct ServerInner {
    /// Port requested at construction. May be 0, in which case the OS picks
    /// one and `local_port` reports it after `start`.
    port: u16,

    running: AtomicBool,

    local_port: Mutex<Option<u16>>,

    /// Registry of active connections, keyed by peer address.
    connections: Mutex<HashMap<SocketAddr, TcpStream>>,

    /// Handlers invoked with `(payload, peer)` for every complete inbound
    /// message from any client.
    callbacks: Mutex<Vec<Box<dyn Fn(&[u8], SocketAddr) + Send + Sync>>>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors which can occur in the [`ServerSocket`].
#[derive(Debug, thiserror::Error)]
pub enum ServerSocketError {
    #[error("Could not bind to port {0}: {1}")]
    BindError(u16, io::Error),

    #[error("The server is already running")]
    AlreadyRunning,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ServerSocket {
    /// Create a new server socket for the given port. The socket does not
    /// listen until [`ServerSocket::start`] is called.
    pub fn new(port: u16) -> Self {
        Self {
            inner: Arc::new(ServerInner {
                port,
                running: AtomicBool::new(false),
                local_port: Mutex::new(None),
                connections: Mutex::new(HashMap::new()),
                callbacks: Mutex::new(Vec::new()),
            }),
            accept_handle: Mutex::new(None),
            receive_handles: Mutex::new(Vec::new()),
        }
    }

    /// Bind, listen, and start accepting connections on a background thread.
    pub fn start(self: &Arc<Self>) -> Result<(), ServerSocketError> {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return Err(ServerSocketError::AlreadyRunning);
        }

        let listener = TcpListener::bind(("0.0.0.0", self.inner.port))
            .map_err(|e| ServerSocketError::BindError(self.inner.port, e))?;
        listener
            .set_nonblocking(true)
            .map_err(|e| ServerSocketError::BindError(self.inner.port, e))?;

        if let Ok(addr) = listener.local_addr() {
            *self.inner.local_port.lock().unwrap() = Some(addr.port());
        }

        let server = self.clone();
        let handle = thread::spawn(move || server.accept_loop(listener));
        *self.accept_handle.lock().unwrap() = Some(handle);

        Ok(())
    }

    /// The port the server is actually bound to, once started.
    pub fn local_port(&self) -> Option<u16> {
        *self.inner.local_port.lock().unwrap()
    }

    /// Register a handler invoked for every complete inbound message from any
    /// client.
    pub fn on_receive<F: Fn(&[u8], SocketAddr) + Send + Sync + 'static>(&self, callback: F) {
        self.inner
            .callbacks
            .lock()
            .unwrap()
            .push(Box::new(callback));
    }

    /// Broadcast one framed message to all connected clients.
    ///
    /// A write failure on one connection removes only that connection from
    /// the registry; it is never fatal to the server or to the other peers.
    pub fn send(&self, data: &[u8]) {
        self.send_impl(data, None)
    }

    /// Send one framed message to a single connected client.
    pub fn send_to(&self, data: &[u8], target: SocketAddr) {
        self.send_impl(data, Some(target))
    }

    /// Stop accepting, close all active connections and join all worker
    /// threads.
    pub fn stop(&self) {
        self.inner.running.store(false, Ordering::SeqCst);

        // Closing the streams unblocks any in-progress reads
        for (addr, stream) in self.inner.connections.lock().unwrap().drain() {
            stream.shutdown(Shutdown::Both).ok();
            info!("Closed connection from {}", addr);
        }

        let handle = self.accept_handle.lock().unwrap().take();
        if let Some(handle) = handle {
            handle.join().ok();
        }

        let handles: Vec<_> = self.receive_handles.lock().unwrap().drain(..).collect();
        for handle in handles {
            handle.join().ok();
        }
    }

    fn send_impl(&self, data: &[u8], target: Option<SocketAddr>) {
        let mut connections = self.inner.connections.lock().unwrap();
        let mut failed: Vec<SocketAddr> = Vec::new();

        for (addr, stream) in connections.iter_mut() {
            if let Some(target) = target {
                if *addr != target {
                    continue;
                }
            }

            if let Err(e) = frame::write_frame(stream, data) {
                warn!("Send to {} failed, dropping the connection: {}", addr, e);
                failed.push(*addr);
            }
        }

        for addr in failed {
            if let Some(stream) = connections.remove(&addr) {
                stream.shutdown(Shutdown::Both).ok();
            }
        }
    }

    /// Accept connections until the server is stopped, spawning one receive
    /// thread per connection.
    fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        while self.inner.running.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((stream, addr)) => {
                    info!("Opened connection from {}", addr);

                    if stream.set_read_timeout(Some(RECV_TIMEOUT)).is_err()
                        || stream.set_write_timeout(Some(SEND_TIMEOUT)).is_err()
                    {
                        warn!("Could not configure the connection from {}", addr);
                        continue;
                    }
                    stream.set_nodelay(true).ok();

                    let reader = match stream.try_clone() {
                        Ok(s) => s,
                        Err(e) => {
                            warn!("Could not clone the connection from {}: {}", addr, e);
                            continue;
                        }
                    };

                    self.inner.connections.lock().unwrap().insert(addr, stream);

                    let inner = self.inner.clone();
                    let handle = thread::spawn(move || receive_loop(inner, reader, addr));

                    // Reap the threads of connections which have since
                    // dropped, so the list doesn't grow without bound
                    let mut handles = self.receive_handles.lock().unwrap();
                    handles.retain(|h| !h.is_finished());
                    handles.push(handle);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) => {
                    if self.inner.running.load(Ordering::SeqCst) {
                        warn!("Error while accepting a connection: {}", e);
                    }
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Read frames from one connection until it drops or the server stops,
/// dispatching each complete message to the registered handlers.
fn receive_loop(inner: Arc<ServerInner>, mut stream: TcpStream, addr: SocketAddr) {
    while inner.running.load(Ordering::SeqCst) {
        match frame::read_frame(&mut stream, FRAME_TIMEOUT) {
            Ok(payload) => {
                for callback in inner.callbacks.lock().unwrap().iter() {
                    callback(&payload, addr);
                }
            }
            Err(FrameError::TimedOut) => continue,
            Err(_) => break,
        }
    }

    // Normal disconnect path, remove ourselves from the registry
    if let Some(stream) = inner.connections.lock().unwrap().remove(&addr) {
        stream.shutdown(Shutdown::Both).ok();
        info!("Closed connection from {}", addr);
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::net::ClientSocket;
    use std::time::Instant;

    fn wait_until<F: Fn() -> bool>(timeout: Duration, cond: F) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(20));
        }
        cond()
    }

    fn started_server() -> Arc<ServerSocket> {
        let server = Arc::new(ServerSocket::new(0));
        server.start().unwrap();
        server
    }

    #[test]
    fn test_broadcast_reaches_all_clients() {
        let server = started_server();
        let port = server.local_port().unwrap();

        let mut client_a = TcpStream::connect(("127.0.0.1", port)).unwrap();
        let mut client_b = TcpStream::connect(("127.0.0.1", port)).unwrap();
        client_a.set_read_timeout(Some(RECV_TIMEOUT)).unwrap();
        client_b.set_read_timeout(Some(RECV_TIMEOUT)).unwrap();

        // Wait for the accept loop to register both
        assert!(wait_until(Duration::from_secs(2), || {
            server.inner.connections.lock().unwrap().len() == 2
        }));

        server.send(b"telemetry");

        for client in [&mut client_a, &mut client_b].iter_mut() {
            let payload = frame::read_frame(*client, Duration::from_secs(2)).unwrap();
            assert_eq!(payload, b"telemetry");
        }

        server.stop();
    }

    #[test]
    fn test_dead_peer_does_not_break_broadcast() {
        let server = started_server();
        let port = server.local_port().unwrap();

        let client_a = TcpStream::connect(("127.0.0.1", port)).unwrap();
        let mut client_b = TcpStream::connect(("127.0.0.1", port)).unwrap();
        client_b.set_read_timeout(Some(RECV_TIMEOUT)).unwrap();

        assert!(wait_until(Duration::from_secs(2), || {
            server.inner.connections.lock().unwrap().len() == 2
        }));

        // Kill one peer without telling the server
        client_a.shutdown(Shutdown::Both).unwrap();
        drop(client_a);
        thread::sleep(Duration::from_millis(50));

        // Two sends: the first may only discover the failure, the second must
        // go out cleanly to the survivor
        server.send(b"one");
        server.send(b"two");

        let payload = frame::read_frame(&mut client_b, Duration::from_secs(2)).unwrap();
        assert_eq!(payload, b"one");
        let payload = frame::read_frame(&mut client_b, Duration::from_secs(2)).unwrap();
        assert_eq!(payload, b"two");

        server.stop();
    }

    #[test]
    fn test_inbound_messages_dispatch_with_peer() {
        let server = started_server();
        let port = server.local_port().unwrap();

        let received: Arc<Mutex<Vec<(Vec<u8>, SocketAddr)>>> = Arc::new(Mutex::new(Vec::new()));
        let received_clone = received.clone();
        server.on_receive(move |payload, peer| {
            received_clone.lock().unwrap().push((payload.to_vec(), peer));
        });

        let mut client = TcpStream::connect(("127.0.0.1", port)).unwrap();
        let local = client.local_addr().unwrap();

        frame::write_frame(&mut client, b"cmd 1").unwrap();
        frame::write_frame(&mut client, b"cmd 2").unwrap();

        assert!(wait_until(Duration::from_secs(2), || {
            received.lock().unwrap().len() == 2
        }));

        let received = received.lock().unwrap();
        assert_eq!(received[0], (b"cmd 1".to_vec(), local));
        assert_eq!(received[1], (b"cmd 2".to_vec(), local));

        server.stop();
    }

    #[test]
    fn test_finished_receive_threads_are_reaped() {
        let server = started_server();
        let port = server.local_port().unwrap();

        // Churn a few short-lived connections
        for _ in 0..3 {
            let client = TcpStream::connect(("127.0.0.1", port)).unwrap();
            assert!(wait_until(Duration::from_secs(2), || {
                server.inner.connections.lock().unwrap().len() == 1
            }));

            client.shutdown(Shutdown::Both).unwrap();
            drop(client);
            assert!(wait_until(Duration::from_secs(2), || {
                server.inner.connections.lock().unwrap().is_empty()
            }));
        }

        // Let the last receive thread fully exit before the next accept
        thread::sleep(Duration::from_millis(100));

        let _client = TcpStream::connect(("127.0.0.1", port)).unwrap();
        assert!(wait_until(Duration::from_secs(2), || {
            server.inner.connections.lock().unwrap().len() == 1
        }));

        // Only the live connection's thread is still tracked
        assert_eq!(server.receive_handles.lock().unwrap().len(), 1);

        server.stop();
    }

    #[test]
    fn test_client_socket_against_server() {
        let server = started_server();
        let port = server.local_port().unwrap();

        let received: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
        let received_clone = received.clone();
        server.on_receive(move |payload, _| {
            received_clone.lock().unwrap().push(payload.to_vec());
        });

        let client = ClientSocket::new("127.0.0.1", port);
        client.start();
        assert!(wait_until(Duration::from_secs(5), || client.is_connected()));

        // Client to server
        assert!(client.send(b"hello server"));
        assert!(wait_until(Duration::from_secs(2), || {
            !received.lock().unwrap().is_empty()
        }));
        assert_eq!(received.lock().unwrap()[0], b"hello server");

        // Server to client
        server.send(b"hello client");
        let payload = loop {
            match client.receive() {
                Some(p) => break p,
                None => continue,
            }
        };
        assert_eq!(payload, b"hello client");

        client.stop();
        server.stop();
    }
}
