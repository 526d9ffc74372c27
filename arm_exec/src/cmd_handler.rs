//! # Command Handler Module
//!
//! Dispatches commands arriving on the command channel. Manual motion
//! commands are refused while the autopilot is running, so an operator can
//! never fight the supervisor over the arm.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use log::{info, warn};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

// Internal
use comms_if::tc::{DebugCmd, StateUpdate};
use util::session::Session;

use crate::auto::AutoPilot;
use crate::ctrl::Controller;
use crate::debug_server::DebugServer;
use crate::vision::FrameStore;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Decodes and executes commands from the consoles.
pub struct CommandHandler {
    ctrl: Arc<Controller>,
    autopilot: Arc<AutoPilot>,
    server: Arc<DebugServer>,
    frames: Arc<FrameStore>,
    session: Session,

    /// Sequence number of the next saved picture.
    picture_seq: AtomicU32,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl CommandHandler {
    pub fn new(
        ctrl: Arc<Controller>,
        autopilot: Arc<AutoPilot>,
        server: Arc<DebugServer>,
        frames: Arc<FrameStore>,
        session: Session,
    ) -> Self {
        Self {
            ctrl,
            autopilot,
            server,
            frames,
            session,
            picture_seq: AtomicU32::new(0),
        }
    }

    /// Decode and execute one raw command payload.
    ///
    /// Malformed payloads are logged and dropped; they never take the
    /// executable down.
    pub fn exec_cmd(&self, raw: &[u8], peer: SocketAddr) {
        let text = match std::str::from_utf8(raw) {
            Ok(t) => t,
            Err(_) => {
                warn!("Dropping a non-UTF-8 command from {}", peer);
                return;
            }
        };

        let cmd = match DebugCmd::from_json(text) {
            Ok(c) => c,
            Err(e) => {
                warn!("Dropping an invalid command from {}: {}", peer, e);
                return;
            }
        };

        match cmd {
            DebugCmd::GetUpdate => {
                self.server.send_update_to(&self.full_snapshot(), peer);
            }
            DebugCmd::SetAngles { angles } => {
                if self.autopilot.is_running() {
                    warn!("Ignoring SET_ANG from {}: the autopilot is running", peer);
                    return;
                }

                if let Err(e) = self.ctrl.set_angles(&angles) {
                    warn!("SET_ANG from {} failed: {}", peer, e);
                }
            }
            DebugCmd::SetGrabber { closed } => {
                if self.autopilot.is_running() {
                    warn!("Ignoring SET_GRB from {}: the autopilot is running", peer);
                    return;
                }

                if let Err(e) = self.ctrl.set_grabber(closed) {
                    warn!("SET_GRB from {} failed: {}", peer, e);
                }
            }
            DebugCmd::SetAutopilot { enabled } => {
                if enabled {
                    self.autopilot.start();
                } else {
                    self.autopilot.stop();
                }
            }
            DebugCmd::TakePicture => self.save_picture(peer),
        }
    }

    /// A full snapshot of the arm's state.
    fn full_snapshot(&self) -> StateUpdate {
        StateUpdate {
            angles: Some(self.ctrl.current_angles()),
            autopilot: Some(self.autopilot.state().to_string()),
            grabber: Some(self.ctrl.grabber_closed()),
        }
    }

    /// Save the latest camera frame into the session directory.
    fn save_picture(&self, peer: SocketAddr) {
        let frame = match self.frames.latest() {
            Some(f) => f,
            None => {
                warn!("TAK_PIC from {}: no frame has been captured yet", peer);
                return;
            }
        };

        let seq = self.picture_seq.fetch_add(1, Ordering::SeqCst);
        let path = format!("pictures/picture_{:04}.jpg", seq);

        match self.session.save_raw(&path, &frame) {
            Ok(()) => info!("Saved {} ({} bytes)", path, frame.len()),
            Err(e) => warn!("Could not save {}: {}", path, e),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
