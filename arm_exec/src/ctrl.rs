//! # Controller Module
//!
//! The motion facade: everything above the arm (command handler, autopilot)
//! moves it through the [`Controller`], which combines the joint controller
//! with the kinematics solver.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::sync::{Arc, Mutex};

use comms_if::eqpt::arm::ArmPose;

use crate::arm::{ArmError, RobotArm};
use crate::kinematics::{Kinematics, WristOrientation};
use crate::locations::Location;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Joint velocity used for all facade moves, in degrees per second.
const DEFAULT_VELOCITY: f64 = 25.0;

/// Height above a target at which [`Controller::hover_above`] positions the
/// grabber, in centimeters.
const HOVER_HEIGHT_CM: f64 = 8.0;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Motion facade over the arm and the kinematics solver.
pub struct Controller {
    arm: Arc<Mutex<RobotArm>>,
    kinematics: Box<dyn Kinematics>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Controller {
    pub fn new(arm: Arc<Mutex<RobotArm>>, kinematics: Box<dyn Kinematics>) -> Self {
        Self { arm, kinematics }
    }

    /// Move the arm to a named location.
    pub fn go_to_location(&self, location: &Location) -> Result<(), ArmError> {
        self.set_angles(&location.pose())
    }

    /// Move the joints named in `pose` to their target angles. Blocks for
    /// the duration of the motion.
    pub fn set_angles(&self, pose: &ArmPose) -> Result<(), ArmError> {
        self.arm.lock().unwrap().set_arm(pose, DEFAULT_VELOCITY)
    }

    /// Move the grabber tip to a world-space coordinate.
    pub fn move_to_coordinate(
        &self,
        target: [f64; 3],
        wrist: WristOrientation,
    ) -> Result<(), ArmError> {
        let pose = self.kinematics.inverse(target, wrist);
        self.set_angles(&pose)
    }

    /// Move the grabber tip to a point directly above a world-space
    /// coordinate.
    pub fn hover_above(&self, target: [f64; 3], wrist: WristOrientation) -> Result<(), ArmError> {
        let hover = [target[0], target[1], target[2] + HOVER_HEIGHT_CM];
        self.move_to_coordinate(hover, wrist)
    }

    /// Open or close the grabber.
    pub fn set_grabber(&self, closed: bool) -> Result<(), ArmError> {
        self.arm.lock().unwrap().set_grabber(closed)
    }

    /// Current angles of all joints.
    pub fn current_angles(&self) -> ArmPose {
        self.arm.lock().unwrap().get_current_angles(None)
    }

    /// True if the grabber is currently closed.
    pub fn grabber_closed(&self) -> bool {
        self.arm.lock().unwrap().grabber_closed()
    }
}
