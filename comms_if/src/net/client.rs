//! # Client Socket
//!
//! A framed TCP client which transparently reconnects to its endpoint. Used
//! by operator consoles to reach the arm controller's command and video
//! channels.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{info, trace, warn};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use super::frame::{self, FrameError};
use super::{FRAME_TIMEOUT, RECONNECT_INTERVAL, RECV_TIMEOUT, SEND_TIMEOUT};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A reconnecting framed TCP client.
///
/// Once started the socket keeps itself connected: any disconnect wakes a
/// background reconnect loop which retries at [`RECONNECT_INTERVAL`] until
/// the endpoint accepts or [`ClientSocket::stop`] is called.
///
/// Clones share the same underlying connection.
#[derive(Clone)]
pub struct ClientSocket {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    addr: String,
    port: u16,

    /// Connection state, guarded together so the stream can never be observed
    /// while the connected flag disagrees with it.
    state: Mutex<ConnState>,

    /// Notified whenever the connection comes up. `send` waits on this when
    /// called while disconnected.
    connected_cond: Condvar,

    closed_by_user: AtomicBool,
    reconnecting: AtomicBool,

    reconnect_handle: Mutex<Option<JoinHandle<()>>>,

    callbacks: Mutex<Vec<Box<dyn Fn(bool) + Send + Sync>>>,
}

#[derive(Default)]
struct ConnState {
    stream: Option<TcpStream>,
    connected: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ClientSocket {
    /// Create a new client socket for the given endpoint. The socket does not
    /// attempt to connect until [`ClientSocket::start`] is called.
    pub fn new(addr: &str, port: u16) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                addr: addr.to_string(),
                port,
                state: Mutex::new(ConnState::default()),
                connected_cond: Condvar::new(),
                closed_by_user: AtomicBool::new(false),
                reconnecting: AtomicBool::new(false),
                reconnect_handle: Mutex::new(None),
                callbacks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Open the socket and enable automatic reconnection.
    pub fn start(&self) {
        ClientInner::spawn_reconnect(&self.inner);
    }

    /// Check if the socket is currently connected.
    pub fn is_connected(&self) -> bool {
        !self.inner.closed_by_user.load(Ordering::Relaxed)
            && self.inner.state.lock().unwrap().connected
    }

    /// Close the socket and stop any automatic reconnection attempts.
    pub fn stop(&self) {
        self.inner.closed_by_user.store(true, Ordering::Relaxed);

        {
            let state = self.inner.state.lock().unwrap();
            if let Some(ref stream) = state.stream {
                stream.shutdown(Shutdown::Both).ok();
            }
        }

        // Wake any senders waiting for a connection
        self.inner.connected_cond.notify_all();

        let handle = self.inner.reconnect_handle.lock().unwrap().take();
        if let Some(handle) = handle {
            handle.join().ok();
        }
    }

    /// Try to send one framed message through the socket.
    ///
    /// If the socket is disconnected this waits up to [`SEND_TIMEOUT`] for
    /// the reconnect loop to bring the connection back up. Returns `true`
    /// when the message was written, `false` on timeout or any I/O error.
    pub fn send(&self, data: &[u8]) -> bool {
        if self.inner.closed_by_user.load(Ordering::Relaxed) {
            return false;
        }

        // Wait for the connection if needed, then grab a handle to the stream
        let mut stream = {
            let state = self.inner.state.lock().unwrap();

            let (state, _) = self
                .inner
                .connected_cond
                .wait_timeout_while(state, SEND_TIMEOUT, |s| {
                    !s.connected && !self.inner.closed_by_user.load(Ordering::Relaxed)
                })
                .unwrap();

            if !state.connected {
                return false;
            }

            match state.stream.as_ref().map(|s| s.try_clone()) {
                Some(Ok(s)) => s,
                _ => return false,
            }
        };

        match frame::write_frame(&mut stream, data) {
            Ok(()) => true,
            Err(e) => {
                warn!("Send on {}:{} failed: {}", self.inner.addr, self.inner.port, e);
                self.inner.set_connected(false, None);
                false
            }
        }
    }

    /// Try to receive one complete framed message.
    ///
    /// Returns `None` on timeout, which is not an error - the caller is
    /// expected to poll. A connection reset or OS error flips the socket to
    /// disconnected, which wakes the background reconnect loop.
    pub fn receive(&self) -> Option<Vec<u8>> {
        let mut stream = {
            let state = self.inner.state.lock().unwrap();
            if !state.connected {
                return None;
            }
            match state.stream.as_ref().map(|s| s.try_clone()) {
                Some(Ok(s)) => s,
                _ => return None,
            }
        };

        match frame::read_frame(&mut stream, FRAME_TIMEOUT) {
            Ok(payload) => Some(payload),
            Err(FrameError::TimedOut) => None,
            Err(e) => {
                trace!(
                    "Receive on {}:{} failed: {}",
                    self.inner.addr,
                    self.inner.port,
                    e
                );
                self.inner.set_connected(false, None);
                None
            }
        }
    }

    /// Register a callback invoked with the new state whenever the connection
    /// state of the socket changes.
    pub fn on_change<F: Fn(bool) + Send + Sync + 'static>(&self, callback: F) {
        self.inner
            .callbacks
            .lock()
            .unwrap()
            .push(Box::new(callback));
    }
}

impl ClientInner {
    /// Update the connected flag and do all of the necessary bookkeeping:
    /// waking blocked senders, informing callbacks and restarting the
    /// reconnect loop.
    fn set_connected(self: &Arc<Self>, connected: bool, stream: Option<TcpStream>) {
        let changed = {
            let mut state = self.state.lock().unwrap();
            let changed = state.connected != connected;

            state.connected = connected;
            match stream {
                Some(s) => state.stream = Some(s),
                None if !connected => {
                    if let Some(s) = state.stream.take() {
                        s.shutdown(Shutdown::Both).ok();
                    }
                }
                None => (),
            }

            changed
        };

        if changed {
            if connected {
                info!("Socket {}:{} connected.", self.addr, self.port);
                self.connected_cond.notify_all();
            } else {
                warn!("Socket {}:{} disconnected.", self.addr, self.port);
            }

            for callback in self.callbacks.lock().unwrap().iter() {
                callback(connected);
            }
        }

        if !connected && !self.closed_by_user.load(Ordering::Relaxed) {
            Self::spawn_reconnect(self);
        }
    }

    /// Spawn the reconnect loop, unless one is already running.
    fn spawn_reconnect(inner: &Arc<Self>) {
        if inner.reconnecting.swap(true, Ordering::SeqCst) {
            return;
        }

        let inner_clone = inner.clone();
        let handle = thread::spawn(move || inner_clone.reconnect_loop());

        *inner.reconnect_handle.lock().unwrap() = Some(handle);
    }

    /// Automatically reconnect the socket until connected or closed.
    fn reconnect_loop(self: Arc<Self>) {
        while !self.closed_by_user.load(Ordering::Relaxed)
            && !self.state.lock().unwrap().connected
        {
            match self.try_connect() {
                Ok(stream) => {
                    self.set_connected(true, Some(stream));
                }
                Err(_) => {
                    thread::sleep(RECONNECT_INTERVAL);
                }
            }
        }

        self.reconnecting.store(false, Ordering::SeqCst);

        // A disconnect may have raced with the loop exiting, in which case its
        // spawn attempt saw the reconnecting flag still raised. Re-check so
        // that disconnect is not lost.
        if !self.closed_by_user.load(Ordering::Relaxed) && !self.state.lock().unwrap().connected {
            Self::spawn_reconnect(&self);
        }
    }

    /// Perform a single connection attempt.
    fn try_connect(&self) -> std::io::Result<TcpStream> {
        let addr: SocketAddr = (self.addr.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::AddrNotAvailable,
                    "Endpoint resolved to no addresses",
                )
            })?;

        let stream = TcpStream::connect_timeout(&addr, RECV_TIMEOUT)?;
        stream.set_read_timeout(Some(RECV_TIMEOUT))?;
        stream.set_write_timeout(Some(SEND_TIMEOUT))?;
        stream.set_nodelay(true).ok();

        Ok(stream)
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use std::net::TcpListener;
    use std::time::{Duration, Instant};

    /// Grab a localhost port which is currently free.
    fn free_port() -> u16 {
        TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

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

    #[test]
    fn test_send_fails_without_server() {
        let client = ClientSocket::new("127.0.0.1", free_port());
        client.start();

        let start = Instant::now();
        assert!(!client.send(b"into the void"));
        // Must have waited for the connect notification before giving up
        assert!(start.elapsed() >= SEND_TIMEOUT);

        client.stop();
    }

    #[test]
    fn test_reconnect_convergence() {
        let port = free_port();

        let client = ClientSocket::new("127.0.0.1", port);
        client.start();

        // No server yet, a few attempts will fail
        thread::sleep(3 * RECONNECT_INTERVAL);
        assert!(!client.is_connected());

        // Bring the server up, the client must converge on its own
        let listener = TcpListener::bind(("127.0.0.1", port)).unwrap();
        assert!(wait_until(Duration::from_secs(5), || client.is_connected()));

        drop(listener);
        client.stop();
    }

    #[test]
    fn test_on_change_fires() {
        let port = free_port();
        let listener = TcpListener::bind(("127.0.0.1", port)).unwrap();

        let client = ClientSocket::new("127.0.0.1", port);

        let events = Arc::new(Mutex::new(Vec::new()));
        let events_clone = events.clone();
        client.on_change(move |connected| {
            events_clone.lock().unwrap().push(connected);
        });

        client.start();
        assert!(wait_until(Duration::from_secs(5), || client.is_connected()));

        // Kill the server side of the connection
        let (server_stream, _) = listener.accept().unwrap();
        drop(listener);
        server_stream.shutdown(Shutdown::Both).ok();
        drop(server_stream);

        // The client notices the disconnect on its next receive attempt
        assert!(wait_until(Duration::from_secs(5), || {
            client.receive();
            !client.is_connected()
        }));

        client.stop();

        let events = events.lock().unwrap();
        assert_eq!(events.first(), Some(&true));
        assert!(events.contains(&false));
    }
}
