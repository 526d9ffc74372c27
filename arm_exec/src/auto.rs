//! # Autopilot Module
//!
//! The autopilot is a background supervisor which runs the
//! identify / pick up / transport / place cycle until it is told to stop.
//!
//! Cancellation is cooperative through a single flag: the worker checks it
//! at every phase boundary and at every poll iteration inside a phase, so
//! stopping never pre-empts a motion mid-trajectory and never deadlocks
//! against the state lock.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use log::{error, info};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

// Internal
use comms_if::eqpt::arm::JointId;
use comms_if::tc::StateUpdate;

use crate::arm::{ArmError, TelemetrySink};
use crate::ctrl::Controller;
use crate::kinematics::WristOrientation;
use crate::locations::{
    deposit_location, HOVER_ABOVE_INPUT, HOVER_ABOVE_PUZZLES, INPUT_AREA_CAM_VIEW,
};
use crate::transform::{board_to_world, camera_to_board};
use crate::vision::{FrameStore, ObjectClassifier, RecognizedObject};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Interval between classification attempts, and granularity of cancellable
/// waits.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Time the arm is left to settle after arriving at the camera viewpoint,
/// before classifying.
const SETTLE_TIME: Duration = Duration::from_secs(2);

/// Pause after closing the grabber, giving it time to get a firm grip.
const GRIP_TIME: Duration = Duration::from_secs(1);

/// The grabber is driven this far below the detected object centre, so it
/// closes around the piece rather than on top of it.
const GRAB_DEPTH_CM: f64 = 2.0;

/// Offset applied to the base when approaching the camera viewpoint. The
/// view pose is always approached from the same side, so gear backlash
/// doesn't shift the calibrated image frame.
const CAM_VIEW_APPROACH_OFFSET_DEG: f64 = -10.0;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// State of the autopilot supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoPilotState {
    Stopped,
    Starting,
    Started,
    Stopping,
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The autopilot supervisor.
pub struct AutoPilot {
    inner: Arc<AutoInner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

struct AutoInner {
    ctrl: Arc<Controller>,
    classifier: Arc<dyn ObjectClassifier>,
    frames: Arc<FrameStore>,
    telem: Arc<dyn TelemetrySink>,

    state: Mutex<AutoPilotState>,

    /// Cancellation token for the worker. Only ever read by the worker,
    /// only ever raised by `stop`/`start`.
    cancel: AtomicBool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl fmt::Display for AutoPilotState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            AutoPilotState::Stopped => "STOPPED",
            AutoPilotState::Starting => "STARTING",
            AutoPilotState::Started => "STARTED",
            AutoPilotState::Stopping => "STOPPING",
        };
        write!(f, "{}", name)
    }
}

impl AutoPilot {
    pub fn new(
        ctrl: Arc<Controller>,
        classifier: Arc<dyn ObjectClassifier>,
        frames: Arc<FrameStore>,
        telem: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            inner: Arc::new(AutoInner {
                ctrl,
                classifier,
                frames,
                telem,
                state: Mutex::new(AutoPilotState::Stopped),
                cancel: AtomicBool::new(false),
            }),
            worker: Mutex::new(None),
        }
    }

    /// True if the autopilot is currently running (or starting up).
    pub fn is_running(&self) -> bool {
        matches!(
            *self.inner.state.lock().unwrap(),
            AutoPilotState::Starting | AutoPilotState::Started
        )
    }

    /// Current state of the supervisor.
    pub fn state(&self) -> AutoPilotState {
        *self.inner.state.lock().unwrap()
    }

    /// Start the autopilot. If it is already running it is stopped and
    /// restarted.
    pub fn start(&self) {
        // Wind down any previous worker first
        self.join_worker();

        self.inner.cancel.store(false, Ordering::SeqCst);
        self.inner.set_state(AutoPilotState::Starting);

        let inner = self.inner.clone();
        let handle = thread::spawn(move || inner.run());
        *self.worker.lock().unwrap() = Some(handle);
    }

    /// Stop the autopilot, blocking until the worker has observed the
    /// cancellation and exited. Idempotent.
    pub fn stop(&self) {
        self.join_worker();
    }

    /// Drain the worker: mark the supervisor as stopping, raise the cancel
    /// flag and wait for the worker to exit, leaving the state at `Stopped`.
    fn join_worker(&self) {
        let handle = self.worker.lock().unwrap().take();

        if let Some(handle) = handle {
            if self.is_running() {
                self.inner.set_state(AutoPilotState::Stopping);
            }
            self.inner.cancel.store(true, Ordering::SeqCst);
            handle.join().ok();
        }

        self.inner.set_state(AutoPilotState::Stopped);
    }
}

impl AutoInner {
    /// Update the state, log it and push it to all connected consoles.
    fn set_state(&self, state: AutoPilotState) {
        let mut current = self.state.lock().unwrap();
        if *current == state {
            return;
        }
        *current = state;
        drop(current);

        info!("Autopilot state: {}", state);
        self.telem.send_update(&StateUpdate {
            autopilot: Some(state.to_string()),
            ..Default::default()
        });
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    /// Sleep for `duration`, returning early if cancelled.
    fn wait(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while !self.cancelled() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return;
            }
            thread::sleep(remaining.min(POLL_INTERVAL));
        }
    }

    /// Worker entry point: run pick and place cycles until cancelled.
    fn run(self: Arc<Self>) {
        self.set_state(AutoPilotState::Started);

        while !self.cancelled() {
            if let Err(e) = self.run_cycle() {
                error!("Autopilot cycle failed: {}", e);
                self.set_state(AutoPilotState::Stopped);
                return;
            }
        }
    }

    /// One full identify / pick up / transport / place cycle. Each phase is
    /// skipped if the cancel flag was raised in the meantime.
    fn run_cycle(&self) -> Result<(), ArmError> {
        let object = match self.identify_object()? {
            Some(o) => o,
            None => return Ok(()),
        };
        if self.cancelled() {
            return Ok(());
        }

        self.pickup_object(&object)?;
        if self.cancelled() {
            return Ok(());
        }

        self.wait(GRIP_TIME);
        if self.cancelled() {
            return Ok(());
        }

        // Transport to the puzzle area
        info!("Moving {} to the puzzle area", object.label);
        self.ctrl.go_to_location(&HOVER_ABOVE_PUZZLES)?;
        if self.cancelled() {
            return Ok(());
        }

        self.place_object(&object)?;

        Ok(())
    }

    /// Park the arm at the input area viewpoint and classify frames until an
    /// object is recognised (or the autopilot is cancelled).
    fn identify_object(&self) -> Result<Option<RecognizedObject>, ArmError> {
        // Approach the viewpoint from a consistent direction
        let mut approach = INPUT_AREA_CAM_VIEW.pose();
        if let Some(base) = approach.get(JointId::Base) {
            approach.set(JointId::Base, base + CAM_VIEW_APPROACH_OFFSET_DEG);
        }
        self.ctrl.set_angles(&approach)?;
        self.ctrl.go_to_location(&INPUT_AREA_CAM_VIEW)?;

        self.wait(SETTLE_TIME);

        while !self.cancelled() {
            info!("Identifying object");

            if let Some(frame) = self.frames.latest() {
                if let Some(object) = self.classifier.classify(&frame) {
                    info!(
                        "Recognised a {} at {:?} (confidence {:.2})",
                        object.label, object.center, object.confidence
                    );
                    return Ok(Some(object));
                }
            }

            self.wait(POLL_INTERVAL);
        }

        Ok(None)
    }

    /// Move down onto the recognised object and close the grabber around it.
    fn pickup_object(&self, object: &RecognizedObject) -> Result<(), ArmError> {
        info!("Picking up the {}", object.label);

        let board = camera_to_board(object.center);
        let mut world = board_to_world(board);
        world[2] -= GRAB_DEPTH_CM;

        if self.cancelled() {
            return Ok(());
        }
        self.ctrl.hover_above(world, WristOrientation::Vertical)?;

        if self.cancelled() {
            return Ok(());
        }
        self.ctrl
            .move_to_coordinate(world, WristOrientation::Vertical)?;
        self.ctrl.set_grabber(true)?;

        self.wait(GRIP_TIME);

        self.ctrl.go_to_location(&HOVER_ABOVE_INPUT)
    }

    /// Lower the object onto its deposit location and release it.
    fn place_object(&self, object: &RecognizedObject) -> Result<(), ArmError> {
        let location = deposit_location(object.label);
        info!("Placing the {} at {}", object.label, location.name);

        self.ctrl.go_to_location(&location)?;
        self.ctrl.set_grabber(false)
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::arm::RobotArm;
    use crate::kinematics::PlanarKinematics;
    use crate::params::{ArmExecParams, GrabberConfig, JointConfig, JointPorts};
    use crate::servo_ctrl::{ServoDriver, ServoError};
    use crate::vision::Shape;
    use std::collections::HashMap;

    struct NullDriver;

    impl ServoDriver for NullDriver {
        fn actuate(&mut self, _: u8, _: f64, _: f64) -> Result<(), ServoError> {
            Ok(())
        }
    }

    struct RecordingSink(Mutex<Vec<StateUpdate>>);

    impl TelemetrySink for RecordingSink {
        fn send_update(&self, update: &StateUpdate) {
            self.0.lock().unwrap().push(update.clone());
        }
    }

    struct FixedClassifier(Option<RecognizedObject>);

    impl ObjectClassifier for FixedClassifier {
        fn classify(&self, _frame: &[u8]) -> Option<RecognizedObject> {
            self.0.clone()
        }
    }

    /// All five joints with a 1 degree range, so every location move clamps
    /// to a trajectory that completes in well under a second.
    fn test_params() -> ArmExecParams {
        let mut joints = HashMap::new();
        for joint_id in JointId::all().iter() {
            joints.insert(
                *joint_id,
                JointConfig {
                    min_angle: 0.0,
                    max_angle: 1.0,
                    actuation_range: 180.0,
                    ports: JointPorts::Single(0),
                    mirrored: false,
                },
            );
        }

        ArmExecParams {
            command_port: 0,
            video_port: 0,
            control_period_s: 0.002,
            joints,
            grabber: GrabberConfig {
                port: 6,
                actuation_range: 180.0,
                min_angle: 80.0,
                max_angle: 100.0,
                open_angle: 80.0,
                closed_angle: 100.0,
            },
            initial_pose: HashMap::new(),
        }
    }

    fn autopilot_with(
        classifier: Arc<dyn ObjectClassifier>,
    ) -> (AutoPilot, Arc<RecordingSink>, Arc<FrameStore>) {
        let sink = Arc::new(RecordingSink(Mutex::new(Vec::new())));

        let arm = RobotArm::new(&test_params(), Box::new(NullDriver), sink.clone()).unwrap();
        let ctrl = Arc::new(Controller::new(
            Arc::new(Mutex::new(arm)),
            Box::new(PlanarKinematics),
        ));

        let frames = Arc::new(FrameStore::new());
        let autopilot = AutoPilot::new(ctrl, classifier, frames.clone(), sink.clone());

        (autopilot, sink, frames)
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
    fn test_full_cycle_grabs_and_releases() {
        let classifier = Arc::new(FixedClassifier(Some(RecognizedObject {
            center: (1000.0, 500.0),
            label: Shape::Square,
            confidence: 0.9,
        })));

        let (autopilot, sink, frames) = autopilot_with(classifier);
        frames.put(vec![0xFF, 0xD8]);

        autopilot.start();
        assert!(autopilot.is_running());

        // Wait until a full cycle has run: the grabber closed and opened
        // again
        assert!(wait_until(Duration::from_secs(20), || {
            let updates = sink.0.lock().unwrap();
            let grabs: Vec<bool> = updates.iter().filter_map(|u| u.grabber).collect();
            grabs.contains(&true) && grabs.last() == Some(&false)
        }));

        autopilot.stop();
        assert!(!autopilot.is_running());
        assert_eq!(autopilot.state(), AutoPilotState::Stopped);
    }

    #[test]
    fn test_stop_while_identifying() {
        // A classifier which never recognises anything keeps the worker in
        // the identify poll loop
        let (autopilot, sink, frames) = autopilot_with(Arc::new(FixedClassifier(None)));
        frames.put(vec![0xFF, 0xD8]);

        autopilot.start();
        assert!(wait_until(Duration::from_secs(10), || {
            autopilot.state() == AutoPilotState::Started
        }));

        autopilot.stop();
        assert_eq!(autopilot.state(), AutoPilotState::Stopped);

        // Nothing was ever grabbed
        let updates = sink.0.lock().unwrap();
        assert!(updates.iter().all(|u| u.grabber.is_none()));
    }

    #[test]
    fn test_restart_replaces_worker() {
        let (autopilot, _, frames) = autopilot_with(Arc::new(FixedClassifier(None)));
        frames.put(vec![0xFF, 0xD8]);

        autopilot.start();
        autopilot.start();
        assert!(autopilot.is_running());

        autopilot.stop();
        autopilot.stop();
        assert_eq!(autopilot.state(), AutoPilotState::Stopped);
    }

    #[test]
    fn test_restart_drains_through_stopping() {
        let (autopilot, sink, frames) = autopilot_with(Arc::new(FixedClassifier(None)));
        frames.put(vec![0xFF, 0xD8]);

        autopilot.start();
        assert!(wait_until(Duration::from_secs(10), || {
            autopilot.state() == AutoPilotState::Started
        }));

        // Restarting a running autopilot winds the old worker down first
        autopilot.start();
        assert!(wait_until(Duration::from_secs(10), || {
            autopilot.state() == AutoPilotState::Started
        }));

        autopilot.stop();

        let updates = sink.0.lock().unwrap();
        let states: Vec<String> = updates.iter().filter_map(|u| u.autopilot.clone()).collect();
        assert_eq!(
            states,
            [
                "STARTING", "STARTED", "STOPPING", "STOPPED", "STARTING", "STARTED", "STOPPING",
                "STOPPED"
            ]
        );
    }

    #[test]
    fn test_state_updates_are_pushed() {
        let (autopilot, sink, _) = autopilot_with(Arc::new(FixedClassifier(None)));

        autopilot.start();
        assert!(wait_until(Duration::from_secs(10), || {
            autopilot.state() == AutoPilotState::Started
        }));
        autopilot.stop();

        let updates = sink.0.lock().unwrap();
        let states: Vec<String> = updates.iter().filter_map(|u| u.autopilot.clone()).collect();
        assert!(states.contains(&"STARTING".to_string()));
        assert!(states.contains(&"STARTED".to_string()));
        assert_eq!(states.last(), Some(&"STOPPED".to_string()));
    }
}
