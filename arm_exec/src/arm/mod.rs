//! # Robot Arm Module
//!
//! This module provides the joint/trajectory controller of the arm. The
//! [`RobotArm`] owns the logical joints, the grabber and the servo driver,
//! and converts target poses into velocity-bounded, cosine-eased actuation
//! sequences.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod joint;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use log::warn;
use std::collections::HashMap;
use std::f64::consts::PI;
use std::sync::Arc;
use std::time::{Duration, Instant};

// Internal
use comms_if::eqpt::arm::{ArmPose, JointId};
use comms_if::tc::StateUpdate;

use crate::params::ArmExecParams;
use crate::servo_ctrl::{ServoDriver, ServoError};

// ------------------------------------------------------------------------------------------------
// EXPORTS
// ------------------------------------------------------------------------------------------------

pub use joint::{Grabber, Joint};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Fastest permitted joint velocity, in degrees per second. Requests above
/// this are clamped down.
pub const MAX_VELOCITY: f64 = 30.0;

/// A telemetry snapshot is emitted once every this many trajectory steps (and
/// unconditionally at the end of a trajectory).
const TELEMETRY_STEP_INTERVAL: u64 = 10;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Consumer of arm state telemetry.
///
/// Implemented by the debug server, which pushes snapshots to all connected
/// consoles, and by recording stubs in tests.
pub trait TelemetrySink: Send + Sync {
    fn send_update(&self, update: &StateUpdate);
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The joint/trajectory controller.
pub struct RobotArm {
    joints: HashMap<JointId, Joint>,
    grabber: Grabber,

    driver: Box<dyn ServoDriver + Send>,
    telem: Arc<dyn TelemetrySink>,

    /// Period of one step of the control loop.
    control_period: Duration,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors which can occur while controlling the arm.
#[derive(Debug, thiserror::Error)]
pub enum ArmError {
    #[error("No joint {0:?} is configured on this arm")]
    UnknownJoint(JointId),

    #[error("Servo driver error: {0}")]
    Driver(#[from] ServoError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl RobotArm {
    /// Build the arm from its parameters and drive every joint to its initial
    /// angle.
    pub fn new(
        params: &ArmExecParams,
        mut driver: Box<dyn ServoDriver + Send>,
        telem: Arc<dyn TelemetrySink>,
    ) -> Result<Self, ArmError> {
        let mut joints = HashMap::new();

        for (joint_id, config) in &params.joints {
            let initial_angle = params.initial_pose.get(joint_id).copied().unwrap_or(0.0);
            let mut joint = Joint::new(config.clone(), initial_angle);

            // Push the initial angle out to the servos so the logical state
            // matches the physical one
            joint.set_angle(initial_angle, driver.as_mut())?;

            joints.insert(*joint_id, joint);
        }

        let mut grabber = Grabber::new(params.grabber.clone());
        grabber.set_open(driver.as_mut())?;

        Ok(Self {
            joints,
            grabber,
            driver,
            telem,
            control_period: Duration::from_secs_f64(params.control_period_s),
        })
    }

    /// Clamp every angle of a pose to its joint's commandable range.
    ///
    /// Fails with [`ArmError::UnknownJoint`] if the pose names a joint this
    /// arm doesn't have, before any motion takes place.
    pub fn bound(&self, pose: &ArmPose) -> Result<ArmPose, ArmError> {
        let mut bounded = ArmPose::new();

        for (joint_id, angle) in pose.iter() {
            let joint = self
                .joints
                .get(&joint_id)
                .ok_or(ArmError::UnknownJoint(joint_id))?;
            bounded.set(joint_id, joint.bound(angle));
        }

        Ok(bounded)
    }

    /// Drive the joints named in `target` to their target angles.
    ///
    /// The motion is smooth and velocity-bounded: each moving joint follows a
    /// cosine-eased trajectory sized so its peak velocity is `v_max` deg/s,
    /// and all joints share the duration of the slowest one so they arrive
    /// together. Blocks the caller for the full duration of the motion.
    pub fn set_arm(&mut self, target: &ArmPose, v_max: f64) -> Result<(), ArmError> {
        let v_max = if v_max > MAX_VELOCITY {
            warn!(
                "Requested velocity of {} deg/s exceeds the maximum of {} deg/s, clamping",
                v_max, MAX_VELOCITY
            );
            MAX_VELOCITY
        } else {
            v_max
        };

        let target = self.bound(target)?;

        // Starting angles and per-joint durations of the joints which
        // actually move
        let mut start_angles: HashMap<JointId, f64> = HashMap::new();
        let mut durations: HashMap<JointId, f64> = HashMap::new();

        for (joint_id, end_angle) in target.iter() {
            let current = self.joints[&joint_id].current_angle;
            if (end_angle - current).abs() > 0.0 {
                start_angles.insert(joint_id, current);
                durations.insert(joint_id, move_duration((end_angle - current).abs(), v_max));
            }
        }

        if durations.is_empty() {
            return Ok(());
        }

        // All joints move over the duration of the slowest one
        let max_duration = durations.values().cloned().fold(0.0, f64::max);

        let dtime = self.control_period.as_secs_f64();
        let steps = (max_duration / dtime).ceil() as u64;

        for step in 1..=steps {
            let step_start = Instant::now();
            let elapsed = step as f64 * dtime;

            for (joint_id, duration) in &durations {
                let angle = angle_smooth(
                    start_angles[joint_id],
                    target.get(*joint_id).unwrap_or(0.0),
                    *duration,
                    elapsed,
                );

                self.joints
                    .get_mut(joint_id)
                    .unwrap()
                    .set_angle(angle, self.driver.as_mut())?;
            }

            if step % TELEMETRY_STEP_INTERVAL == 0 {
                self.send_angles_update();
            }

            // Soft real time: if this step overran its slot just move on to
            // the next one
            let spent = step_start.elapsed();
            if spent < self.control_period {
                std::thread::sleep(self.control_period - spent);
            }
        }

        self.send_angles_update();

        Ok(())
    }

    /// Open or close the grabber.
    pub fn set_grabber(&mut self, closed: bool) -> Result<(), ArmError> {
        if closed {
            self.grabber.set_closed(self.driver.as_mut())?;
        } else {
            self.grabber.set_open(self.driver.as_mut())?;
        }

        self.telem.send_update(&StateUpdate {
            grabber: Some(closed),
            ..Default::default()
        });

        Ok(())
    }

    /// Get the current angles of the requested joints, or of all joints if
    /// `None`.
    pub fn get_current_angles(&self, joint_ids: Option<&[JointId]>) -> ArmPose {
        let mut pose = ArmPose::new();

        match joint_ids {
            Some(ids) => {
                for joint_id in ids {
                    if let Some(joint) = self.joints.get(joint_id) {
                        pose.set(*joint_id, joint.current_angle);
                    }
                }
            }
            None => {
                for (joint_id, joint) in &self.joints {
                    pose.set(*joint_id, joint.current_angle);
                }
            }
        }

        pose
    }

    /// True if the grabber is currently closed.
    pub fn grabber_closed(&self) -> bool {
        self.grabber.closed
    }

    fn send_angles_update(&self) {
        self.telem.send_update(&StateUpdate {
            angles: Some(self.get_current_angles(None)),
            ..Default::default()
        });
    }
}

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Duration of a cosine-eased move over `diff_deg` degrees with a peak
/// velocity of `v_max` deg/s, in seconds.
///
/// The easing profile's peak velocity is `(diff * pi) / (2 * duration)`, so
/// solving for the duration at which the peak equals `v_max` gives
/// `(diff * pi) / (2 * v_max)`.
pub fn move_duration(diff_deg: f64, v_max: f64) -> f64 {
    (diff_deg * PI) / (2.0 * v_max)
}

/// Position along a cosine-eased trajectory from `start_angle` to
/// `end_angle` lasting `duration_s`, at `elapsed_s` seconds in.
///
/// Returns exactly `end_angle` once `elapsed_s >= duration_s`.
pub fn angle_smooth(start_angle: f64, end_angle: f64, duration_s: f64, elapsed_s: f64) -> f64 {
    if elapsed_s >= duration_s {
        return end_angle;
    }

    let moving_angle = (end_angle - start_angle).abs();
    let phase = (elapsed_s / duration_s) * PI;
    let progress = -0.5 * phase.cos() + 0.5;

    if end_angle > start_angle {
        start_angle + progress * moving_angle
    } else {
        start_angle - progress * moving_angle
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::params::{GrabberConfig, JointConfig, JointPorts};
    use std::sync::Mutex;

    /// Driver which records every actuation, shared with the test body.
    struct RecordingDriver(Arc<Mutex<Vec<(u8, f64)>>>);

    impl ServoDriver for RecordingDriver {
        fn actuate(
            &mut self,
            port: u8,
            raw_angle_deg: f64,
            _actuation_range_deg: f64,
        ) -> Result<(), ServoError> {
            self.0.lock().unwrap().push((port, raw_angle_deg));
            Ok(())
        }
    }

    /// Sink which records every telemetry update.
    struct RecordingSink(Mutex<Vec<StateUpdate>>);

    impl TelemetrySink for RecordingSink {
        fn send_update(&self, update: &StateUpdate) {
            self.0.lock().unwrap().push(update.clone());
        }
    }

    /// A two-joint arm with small ranges, so trajectory tests stay short.
    fn test_params() -> ArmExecParams {
        let mut joints = HashMap::new();
        joints.insert(
            JointId::Base,
            JointConfig {
                min_angle: 0.0,
                max_angle: 4.0,
                actuation_range: 270.0,
                ports: JointPorts::Single(0),
                mirrored: false,
            },
        );
        joints.insert(
            JointId::Elbow,
            JointConfig {
                min_angle: 0.0,
                max_angle: 2.0,
                actuation_range: 180.0,
                ports: JointPorts::Single(3),
                mirrored: false,
            },
        );

        let mut initial_pose = HashMap::new();
        initial_pose.insert(JointId::Base, 0.0);
        initial_pose.insert(JointId::Elbow, 0.0);

        ArmExecParams {
            command_port: 0,
            video_port: 0,
            control_period_s: 0.005,
            joints,
            grabber: GrabberConfig {
                port: 6,
                actuation_range: 180.0,
                min_angle: 80.0,
                max_angle: 100.0,
                open_angle: 80.0,
                closed_angle: 100.0,
            },
            initial_pose,
        }
    }

    fn test_arm() -> (RobotArm, Arc<Mutex<Vec<(u8, f64)>>>, Arc<RecordingSink>) {
        let actuations = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::new(RecordingSink(Mutex::new(Vec::new())));

        let arm = RobotArm::new(
            &test_params(),
            Box::new(RecordingDriver(actuations.clone())),
            sink.clone(),
        )
        .unwrap();

        (arm, actuations, sink)
    }

    #[test]
    fn test_easing_endpoints() {
        // Exactly at the start, at the midpoint and past the end
        assert!((angle_smooth(10.0, 90.0, 4.0, 0.0) - 10.0).abs() < 1e-9);
        assert!((angle_smooth(10.0, 90.0, 4.0, 2.0) - 50.0).abs() < 1e-9);
        assert_eq!(angle_smooth(10.0, 90.0, 4.0, 4.0), 90.0);
        assert_eq!(angle_smooth(10.0, 90.0, 4.0, 100.0), 90.0);

        // Decreasing moves mirror increasing ones
        assert!((angle_smooth(90.0, 10.0, 4.0, 2.0) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_easing_is_monotonic() {
        let mut previous = 0.0;
        for step in 0..=100 {
            let angle = angle_smooth(0.0, 45.0, 1.0, step as f64 / 100.0);
            assert!(angle >= previous);
            previous = angle;
        }
    }

    #[test]
    fn test_move_duration() {
        // A full 180 deg sweep at the maximum velocity takes 3*pi seconds
        let duration = move_duration(180.0, MAX_VELOCITY);
        assert!((duration - 9.42477796).abs() < 1e-6);

        // Duration scales linearly with distance
        assert!((move_duration(90.0, MAX_VELOCITY) - duration / 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_set_arm_reaches_target() {
        let (mut arm, actuations, sink) = test_arm();
        actuations.lock().unwrap().clear();

        arm.set_arm(
            &ArmPose::from_angles(vec![(JointId::Base, 4.0), (JointId::Elbow, 2.0)]),
            MAX_VELOCITY,
        )
        .unwrap();

        let angles = arm.get_current_angles(None);
        assert_eq!(angles.get(JointId::Base), Some(4.0));
        assert_eq!(angles.get(JointId::Elbow), Some(2.0));

        // The joints were stepped, not teleported
        let base_steps = actuations
            .lock()
            .unwrap()
            .iter()
            .filter(|(port, _)| *port == 0)
            .count();
        assert!(base_steps > 1);

        // The final telemetry update carries the full pose
        let updates = sink.0.lock().unwrap();
        let last = updates.last().unwrap();
        assert_eq!(last.angles.as_ref().unwrap().get(JointId::Base), Some(4.0));
    }

    #[test]
    fn test_set_arm_bounds_target() {
        let (mut arm, _, _) = test_arm();

        arm.set_arm(
            &ArmPose::from_angles(vec![(JointId::Elbow, 500.0)]),
            MAX_VELOCITY,
        )
        .unwrap();

        assert_eq!(arm.get_current_angles(None).get(JointId::Elbow), Some(2.0));
    }

    #[test]
    fn test_set_arm_rejects_unknown_joint() {
        let (mut arm, actuations, _) = test_arm();
        actuations.lock().unwrap().clear();

        let result = arm.set_arm(
            &ArmPose::from_angles(vec![(JointId::Base, 1.0), (JointId::Wrist, 90.0)]),
            MAX_VELOCITY,
        );

        assert!(matches!(result, Err(ArmError::UnknownJoint(JointId::Wrist))));

        // The validation failed before any motion
        assert!(actuations.lock().unwrap().is_empty());
        assert_eq!(arm.get_current_angles(None).get(JointId::Base), Some(0.0));
    }

    #[test]
    fn test_set_arm_noop_on_zero_diff() {
        let (mut arm, actuations, _) = test_arm();
        actuations.lock().unwrap().clear();

        arm.set_arm(
            &ArmPose::from_angles(vec![(JointId::Base, 0.0)]),
            MAX_VELOCITY,
        )
        .unwrap();

        assert!(actuations.lock().unwrap().is_empty());
    }

    #[test]
    fn test_set_grabber_telemetry() {
        let (mut arm, _, sink) = test_arm();

        arm.set_grabber(true).unwrap();
        assert!(arm.grabber_closed());

        let updates = sink.0.lock().unwrap();
        assert_eq!(updates.last().unwrap().grabber, Some(true));
    }
}
