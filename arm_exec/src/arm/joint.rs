//! Logical joints and their mapping onto physical servos.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use util::maths::clamp;

use crate::params::{GrabberConfig, JointConfig, JointPorts};
use crate::servo_ctrl::{ServoDriver, ServoError};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A single logical joint of the arm.
///
/// A joint tracks its current logical angle and knows how to translate it into
/// physical servo actuations: mirrored servos are driven at
/// `actuation_range - angle`, and dual joints replicate the same logical angle
/// onto two ports with the first one mirrored.
pub struct Joint {
    config: JointConfig,

    /// The logical angle the joint was last driven to, in degrees.
    pub current_angle: f64,
}

/// The grabber, a two-position joint at the head of the arm.
pub struct Grabber {
    config: GrabberConfig,

    pub closed: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Joint {
    pub fn new(config: JointConfig, initial_angle: f64) -> Self {
        let mut joint = Self {
            config,
            current_angle: 0.0,
        };
        joint.current_angle = joint.bound(initial_angle);
        joint
    }

    /// Clamp an angle to this joint's commandable range.
    pub fn bound(&self, angle: f64) -> f64 {
        clamp(angle, self.config.min_angle, self.config.max_angle)
    }

    /// Drive the joint to the given logical angle.
    pub fn set_angle(
        &mut self,
        angle: f64,
        driver: &mut dyn ServoDriver,
    ) -> Result<(), ServoError> {
        let angle = self.bound(angle);

        match self.config.ports {
            JointPorts::Single(port) => {
                self.actuate_servo(port, angle, self.config.mirrored, driver)?;
            }
            JointPorts::Dual(mirrored_port, straight_port) => {
                self.actuate_servo(mirrored_port, angle, true, driver)?;
                self.actuate_servo(straight_port, angle, false, driver)?;
            }
        }

        self.current_angle = angle;
        Ok(())
    }

    /// Drive one physical servo, applying the actuation hard-limit and any
    /// mirroring.
    fn actuate_servo(
        &self,
        port: u8,
        angle: f64,
        mirrored: bool,
        driver: &mut dyn ServoDriver,
    ) -> Result<(), ServoError> {
        let raw = clamp(angle, 0.0, self.config.actuation_range);
        let raw = if mirrored {
            self.config.actuation_range - raw
        } else {
            raw
        };

        driver.actuate(port, raw, self.config.actuation_range)
    }
}

impl Grabber {
    pub fn new(config: GrabberConfig) -> Self {
        Self {
            config,
            closed: false,
        }
    }

    pub fn set_closed(&mut self, driver: &mut dyn ServoDriver) -> Result<(), ServoError> {
        self.set_angle(self.config.closed_angle, driver)?;
        self.closed = true;
        Ok(())
    }

    pub fn set_open(&mut self, driver: &mut dyn ServoDriver) -> Result<(), ServoError> {
        self.set_angle(self.config.open_angle, driver)?;
        self.closed = false;
        Ok(())
    }

    fn set_angle(&mut self, angle: f64, driver: &mut dyn ServoDriver) -> Result<(), ServoError> {
        let angle = clamp(angle, self.config.min_angle, self.config.max_angle);
        driver.actuate(self.config.port, angle, self.config.actuation_range)
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// A driver which records every actuation it is asked to perform.
    pub struct RecordingDriver(pub Arc<Mutex<Vec<(u8, f64)>>>);

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

    fn single_config(mirrored: bool) -> JointConfig {
        JointConfig {
            min_angle: 0.0,
            max_angle: 180.0,
            actuation_range: 180.0,
            ports: JointPorts::Single(3),
            mirrored,
        }
    }

    #[test]
    fn test_bound_clamps() {
        let joint = Joint::new(single_config(false), 90.0);
        assert_eq!(joint.bound(-20.0), 0.0);
        assert_eq!(joint.bound(200.0), 180.0);
        assert_eq!(joint.bound(45.0), 45.0);
    }

    #[test]
    fn test_mirrored_servo_inverts() {
        let actuations = Arc::new(Mutex::new(Vec::new()));
        let mut driver = RecordingDriver(actuations.clone());

        let mut joint = Joint::new(single_config(true), 90.0);
        joint.set_angle(30.0, &mut driver).unwrap();

        assert_eq!(*actuations.lock().unwrap(), vec![(3, 150.0)]);
        assert_eq!(joint.current_angle, 30.0);
    }

    #[test]
    fn test_dual_joint_drives_both_ports() {
        let actuations = Arc::new(Mutex::new(Vec::new()));
        let mut driver = RecordingDriver(actuations.clone());

        let mut joint = Joint::new(
            JointConfig {
                min_angle: 38.0,
                max_angle: 90.0,
                actuation_range: 180.0,
                ports: JointPorts::Dual(1, 2),
                mirrored: false,
            },
            90.0,
        );
        joint.set_angle(60.0, &mut driver).unwrap();

        // First port mirrored, second straight
        assert_eq!(*actuations.lock().unwrap(), vec![(1, 120.0), (2, 60.0)]);
    }

    #[test]
    fn test_grabber_positions() {
        let actuations = Arc::new(Mutex::new(Vec::new()));
        let mut driver = RecordingDriver(actuations.clone());

        let mut grabber = Grabber::new(GrabberConfig {
            port: 6,
            actuation_range: 180.0,
            min_angle: 80.0,
            max_angle: 100.0,
            open_angle: 80.0,
            closed_angle: 100.0,
        });

        grabber.set_closed(&mut driver).unwrap();
        assert!(grabber.closed);
        grabber.set_open(&mut driver).unwrap();
        assert!(!grabber.closed);

        assert_eq!(*actuations.lock().unwrap(), vec![(6, 100.0), (6, 80.0)]);
    }
}
