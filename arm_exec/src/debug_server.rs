//! # Debug Server Module
//!
//! The controller's side of the console link: one framed TCP server for the
//! JSON command channel and one for the raw video channel. State updates are
//! broadcast to every connected console; video frames likewise.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::net::SocketAddr;
use std::sync::Arc;

use comms_if::net::{ServerSocket, ServerSocketError};
use comms_if::tc::StateUpdate;

use crate::arm::TelemetrySink;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Command and video channel servers.
pub struct DebugServer {
    command: Arc<ServerSocket>,
    video: Arc<ServerSocket>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl DebugServer {
    pub fn new(command_port: u16, video_port: u16) -> Self {
        Self {
            command: Arc::new(ServerSocket::new(command_port)),
            video: Arc::new(ServerSocket::new(video_port)),
        }
    }

    /// Start both channels. `on_cmd` is invoked with the raw payload and
    /// peer address of every message arriving on the command channel.
    pub fn start<F>(&self, on_cmd: F) -> Result<(), ServerSocketError>
    where
        F: Fn(&[u8], SocketAddr) + Send + Sync + 'static,
    {
        self.command.on_receive(on_cmd);
        self.command.start()?;
        self.video.start()?;
        Ok(())
    }

    /// Stop both channels and close all console connections.
    pub fn stop(&self) {
        self.command.stop();
        self.video.stop();
    }

    /// Broadcast a state update to all connected consoles.
    pub fn send_update(&self, update: &StateUpdate) {
        self.command.send(update.to_json().as_bytes());
    }

    /// Send a state update to a single console.
    pub fn send_update_to(&self, update: &StateUpdate, peer: SocketAddr) {
        self.command.send_to(update.to_json().as_bytes(), peer);
    }

    /// Broadcast a JPEG frame on the video channel.
    pub fn send_video_frame(&self, frame: &[u8]) {
        self.video.send(frame);
    }

    /// The port the command channel is bound to, once started.
    pub fn command_port(&self) -> Option<u16> {
        self.command.local_port()
    }

    /// The port the video channel is bound to, once started.
    pub fn video_port(&self) -> Option<u16> {
        self.video.local_port()
    }
}

impl TelemetrySink for DebugServer {
    fn send_update(&self, update: &StateUpdate) {
        DebugServer::send_update(self, update)
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use comms_if::eqpt::arm::{ArmPose, JointId};
    use comms_if::net::frame;
    use std::net::TcpStream;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    fn wait_until<F: Fn() -> bool>(timeout: Duration, cond: F) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        cond()
    }

    #[test]
    fn test_update_and_video_channels() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let received_clone = received.clone();

        let server = DebugServer::new(0, 0);
        server
            .start(move |payload, _| {
                received_clone.lock().unwrap().push(payload.to_vec());
            })
            .unwrap();

        let mut command = TcpStream::connect(("127.0.0.1", server.command_port().unwrap())).unwrap();
        let mut video = TcpStream::connect(("127.0.0.1", server.video_port().unwrap())).unwrap();
        command
            .set_read_timeout(Some(Duration::from_millis(100)))
            .unwrap();
        video
            .set_read_timeout(Some(Duration::from_millis(100)))
            .unwrap();

        // Command in: a console sends a raw envelope, the callback sees it
        frame::write_frame(&mut command, br#"{"type": "GET_UPD", "data": {}}"#).unwrap();
        assert!(wait_until(Duration::from_secs(2), || {
            !received.lock().unwrap().is_empty()
        }));

        // Update out: a broadcast update arrives framed and parseable
        let update = StateUpdate {
            angles: Some(ArmPose::from_angles(vec![(JointId::Base, 12.0)])),
            ..Default::default()
        };

        // The accept loop may not have registered the connection yet when
        // the first send goes out, so retry until a frame arrives
        let payload = loop {
            server.send_update(&update);
            match frame::read_frame(&mut command, Duration::from_millis(200)) {
                Ok(p) => break p,
                Err(_) => continue,
            }
        };
        let parsed = StateUpdate::from_json(std::str::from_utf8(&payload).unwrap()).unwrap();
        assert_eq!(parsed, update);

        // Video out
        let jpeg = vec![0xFFu8, 0xD8, 0xFF, 0xE0];
        let payload = loop {
            server.send_video_frame(&jpeg);
            match frame::read_frame(&mut video, Duration::from_millis(200)) {
                Ok(p) => break p,
                Err(_) => continue,
            }
        };
        assert_eq!(payload, jpeg);

        server.stop();
    }
}
