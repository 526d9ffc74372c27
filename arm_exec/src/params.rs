//! # Arm Executable Parameters

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Deserialize;
use std::collections::HashMap;

use comms_if::eqpt::arm::JointId;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ArmExecParams {
    /// TCP port the command channel listens on.
    pub command_port: u16,

    /// TCP port the video channel listens on.
    pub video_port: u16,

    /// Period of one step of the trajectory control loop, in seconds.
    pub control_period_s: f64,

    /// Configuration of each of the arm's joints.
    pub joints: HashMap<JointId, JointConfig>,

    /// Configuration of the grabber.
    pub grabber: GrabberConfig,

    /// Angles (degrees) the arm drives to on startup.
    pub initial_pose: HashMap<JointId, f64>,
}

/// Configuration of a single logical joint.
#[derive(Debug, Clone, Deserialize)]
pub struct JointConfig {
    /// Softest angle the joint may be commanded to, in degrees.
    pub min_angle: f64,

    /// Largest angle the joint may be commanded to, in degrees.
    pub max_angle: f64,

    /// Full mechanical range of the servo, in degrees.
    pub actuation_range: f64,

    /// Driver board port(s) backing this joint.
    pub ports: JointPorts,

    /// True if the (single) servo is mounted in reverse. For dual joints the
    /// first port is always the mirrored one.
    #[serde(default)]
    pub mirrored: bool,
}

/// Configuration of the grabber, a two-position joint.
#[derive(Debug, Clone, Deserialize)]
pub struct GrabberConfig {
    /// Driver board port of the grabber servo.
    pub port: u8,

    /// Full mechanical range of the servo, in degrees.
    pub actuation_range: f64,

    pub min_angle: f64,
    pub max_angle: f64,

    /// Angle of the open position, in degrees.
    pub open_angle: f64,

    /// Angle of the closed position, in degrees.
    pub closed_angle: f64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// The physical ports backing a joint.
///
/// Most joints are one servo on one port. The shoulder is a pair of servos
/// mounted facing each other, which must be driven together with the first
/// one mirrored.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
pub enum JointPorts {
    Single(u8),
    Dual(u8, u8),
}
