//! # Network Module
//!
//! This module provides the framed TCP transport used between the arm
//! controller and operator consoles. Two channels exist, each on its own
//! port: the command channel (JSON envelopes) and the video channel (raw
//! JPEG frames). Both use the same length-prefixed framing.
//!
//! The [`ServerSocket`] lives in the controller and accepts any number of
//! console connections. The [`ClientSocket`] lives in a console and
//! transparently reconnects whenever the link drops.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

pub mod frame;

mod client;
mod server;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::time::Duration;

// ------------------------------------------------------------------------------------------------
// EXPORTS
// ------------------------------------------------------------------------------------------------

pub use client::ClientSocket;
pub use frame::FrameError;
pub use server::{ServerSocket, ServerSocketError};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Maximum time a `ClientSocket::send` will wait for the connection to come
/// (back) up before giving up.
pub const SEND_TIMEOUT: Duration = Duration::from_millis(800);

/// Timeout on individual socket read calls. Frame reads retry across read
/// calls up to [`FRAME_TIMEOUT`].
pub const RECV_TIMEOUT: Duration = Duration::from_millis(600);

/// Time between connection attempts of the client's reconnect loop.
pub const RECONNECT_INTERVAL: Duration = Duration::from_millis(500);

/// Total budget for assembling one complete frame. If the declared payload
/// hasn't arrived in full within this window the frame is discarded.
pub const FRAME_TIMEOUT: Duration = Duration::from_millis(2000);

/// Upper bound on the declared length of a single frame. A peer declaring
/// more than this is assumed to be desynchronised and is disconnected.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Network parameters shared by the controller and console executables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetParams {
    /// Address of the arm controller, as seen from a console.
    pub server_addr: String,

    /// TCP port of the command channel.
    pub command_port: u16,

    /// TCP port of the video channel.
    pub video_port: u16,
}
