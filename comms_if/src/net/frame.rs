//! # Frame Codec
//!
//! One frame on the wire is a 4-byte big-endian length prefix followed by
//! exactly that many payload bytes. A receiver either assembles the full
//! declared payload or reports failure; partial payloads are never delivered
//! to the application layer.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use super::MAX_FRAME_LEN;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors which can occur while reading a frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame could not be assembled within the timeout budget. Any
    /// partial payload has been discarded.
    #[error("Timed out while waiting for a complete frame")]
    TimedOut,

    /// The peer declared a frame longer than [`MAX_FRAME_LEN`], which means
    /// the stream is desynchronised.
    #[error("Peer declared a frame of {0} bytes, which exceeds the maximum")]
    TooLong(usize),

    /// The underlying stream was closed or reset.
    #[error("The connection was lost: {0}")]
    Disconnected(io::Error),
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Write one frame (length prefix + payload) to the stream.
pub fn write_frame<W: Write>(stream: &mut W, payload: &[u8]) -> io::Result<()> {
    if payload.len() > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("Payload of {} bytes exceeds the maximum frame length", payload.len()),
        ));
    }

    stream.write_u32::<BigEndian>(payload.len() as u32)?;
    stream.write_all(payload)?;
    stream.flush()
}

/// Read one complete frame from the stream.
///
/// The read is retried across the stream's own read timeout until either the
/// full declared payload has been assembled or `timeout` has elapsed. The
/// stream must have a read timeout set, otherwise a silent peer will block
/// this call indefinitely.
pub fn read_frame<R: Read>(stream: &mut R, timeout: Duration) -> Result<Vec<u8>, FrameError> {
    let deadline = Instant::now() + timeout;

    // Read the 4 byte length prefix
    let mut header = [0u8; 4];
    read_exact_deadline(stream, &mut header, deadline)?;

    let len = BigEndian::read_u32(&header) as usize;
    if len > MAX_FRAME_LEN {
        return Err(FrameError::TooLong(len));
    }

    // Read the payload, accumulating partial reads
    let mut payload = vec![0u8; len];
    read_exact_deadline(stream, &mut payload, deadline)?;

    Ok(payload)
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Fill `buf` completely, retrying timed-out reads until `deadline`.
fn read_exact_deadline<R: Read>(
    stream: &mut R,
    buf: &mut [u8],
    deadline: Instant,
) -> Result<(), FrameError> {
    let mut filled = 0;

    while filled < buf.len() {
        match stream.read(&mut buf[filled..]) {
            // A zero-length read on a TCP stream means the peer closed
            Ok(0) => {
                return Err(FrameError::Disconnected(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "Peer closed the connection",
                )))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::TimedOut =>
            {
                if Instant::now() >= deadline {
                    return Err(FrameError::TimedOut);
                }
            }
            Err(e) => return Err(FrameError::Disconnected(e)),
        }
    }

    Ok(())
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
