//! # Kinematics Module
//!
//! Inverse/forward kinematics for the arm. The solver sits behind the
//! [`Kinematics`] trait so the controller doesn't care which implementation
//! is in use; [`PlanarKinematics`] is the shipped solver: base rotation plus
//! a two-link law-of-cosines solution in the vertical plane of the target.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::eqpt::arm::{ArmPose, JointId};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Height of the base turntable above the table, in centimeters.
const BASE_HEIGHT_CM: f64 = 6.0;

/// Height of the shoulder pivot above the base, in centimeters.
const SHOULDER_HEIGHT_CM: f64 = 3.0;

/// Length of the upper arm (shoulder to elbow), in centimeters.
const SHOULDER_LENGTH_CM: f64 = 22.0;

/// Length of the forearm (elbow to wrist), in centimeters.
const ELBOW_LENGTH_CM: f64 = 15.0;

/// Length of the wrist segment (wrist to grabber tip), in centimeters.
const WRIST_LENGTH_CM: f64 = 10.0;

/// Margin kept away from the exact edges of the reachable annulus, where the
/// law-of-cosines solution degenerates.
const REACH_MARGIN_CM: f64 = 1e-3;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Requested orientation of the wrist segment at the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WristOrientation {
    /// Grabber pointing straight down, used for picking off the table.
    Vertical,

    /// Grabber continuing horizontally outwards.
    Horizontal,
}

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// An inverse/forward kinematics solver for the arm.
pub trait Kinematics: Send + Sync {
    /// Compute the joint angles placing the grabber tip at `target`
    /// (world-space centimeters, origin at the centre of the base on the
    /// table).
    ///
    /// Targets outside the arm's reach are clamped to the nearest reachable
    /// point rather than rejected.
    fn inverse(&self, target: [f64; 3], wrist: WristOrientation) -> ArmPose;

    /// Compute the world-space position of the grabber tip for a pose.
    fn forward(&self, pose: &ArmPose) -> [f64; 3];
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The shipped solver.
///
/// Angle conventions:
/// - `Base` is the azimuth of the target in degrees, in `[0, 360)`.
/// - `Shoulder` is the elevation of the upper arm above the horizontal.
/// - `Elbow` is the interior angle between upper arm and forearm (180 means
///   the links are collinear).
/// - `Wrist` is the interior angle between forearm and wrist segment.
/// - `WristTurn` is left at its neutral 90 degrees.
pub struct PlanarKinematics;

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Kinematics for PlanarKinematics {
    fn inverse(&self, target: [f64; 3], wrist: WristOrientation) -> ArmPose {
        let [x, y, z] = target;

        let base_deg = azimuth_deg(x, y);

        // Work in the vertical plane of the target: d out along the azimuth,
        // h up from the shoulder pivot
        let d = (x * x + y * y).sqrt();
        let h = z - (BASE_HEIGHT_CM + SHOULDER_HEIGHT_CM);

        // Subtract the wrist segment to get the two-link target (the wrist
        // pivot), then clamp it into the annulus the two links can reach
        let (mut wd, mut wh) = match wrist {
            WristOrientation::Vertical => (d, h + WRIST_LENGTH_CM),
            WristOrientation::Horizontal => (d - WRIST_LENGTH_CM, h),
        };

        let max_reach = SHOULDER_LENGTH_CM + ELBOW_LENGTH_CM - REACH_MARGIN_CM;
        let min_reach = (SHOULDER_LENGTH_CM - ELBOW_LENGTH_CM).abs() + REACH_MARGIN_CM;

        let mut rho = (wd * wd + wh * wh).sqrt();
        if rho > max_reach {
            let scale = max_reach / rho;
            wd *= scale;
            wh *= scale;
            rho = max_reach;
        } else if rho < min_reach {
            // A target right at the shoulder pivot has no defined direction,
            // push it out along the horizontal
            if rho < REACH_MARGIN_CM {
                wd = min_reach;
                wh = 0.0;
            } else {
                let scale = min_reach / rho;
                wd *= scale;
                wh *= scale;
            }
            rho = min_reach;
        }

        // Law of cosines for the elbow interior angle and the shoulder's
        // offset above the line to the wrist pivot
        let l1 = SHOULDER_LENGTH_CM;
        let l2 = ELBOW_LENGTH_CM;

        let cos_elbow = ((l1 * l1 + l2 * l2 - rho * rho) / (2.0 * l1 * l2)).clamp(-1.0, 1.0);
        let elbow_deg = cos_elbow.acos().to_degrees();

        let cos_offset = ((l1 * l1 + rho * rho - l2 * l2) / (2.0 * l1 * rho)).clamp(-1.0, 1.0);
        let shoulder_deg = (wh.atan2(wd) + cos_offset.acos()).to_degrees();

        // Forearm elevation follows from the shoulder and elbow, the wrist
        // angle then fixes the requested tip orientation
        let forearm_deg = shoulder_deg - (180.0 - elbow_deg);
        let wrist_deg = match wrist {
            WristOrientation::Vertical => 90.0 - forearm_deg,
            WristOrientation::Horizontal => 180.0 - forearm_deg,
        };

        ArmPose::from_angles(vec![
            (JointId::Base, base_deg),
            (JointId::Shoulder, shoulder_deg),
            (JointId::Elbow, elbow_deg),
            (JointId::Wrist, wrist_deg),
            (JointId::WristTurn, 90.0),
        ])
    }

    fn forward(&self, pose: &ArmPose) -> [f64; 3] {
        let base_deg = pose.get(JointId::Base).unwrap_or(0.0);
        let shoulder_deg = pose.get(JointId::Shoulder).unwrap_or(90.0);
        let elbow_deg = pose.get(JointId::Elbow).unwrap_or(180.0);
        let wrist_deg = pose.get(JointId::Wrist).unwrap_or(180.0);

        // Elevation of each segment
        let upper_deg = shoulder_deg;
        let forearm_deg = upper_deg - (180.0 - elbow_deg);
        let tip_deg = forearm_deg - (180.0 - wrist_deg);

        let d = SHOULDER_LENGTH_CM * upper_deg.to_radians().cos()
            + ELBOW_LENGTH_CM * forearm_deg.to_radians().cos()
            + WRIST_LENGTH_CM * tip_deg.to_radians().cos();
        let h = BASE_HEIGHT_CM
            + SHOULDER_HEIGHT_CM
            + SHOULDER_LENGTH_CM * upper_deg.to_radians().sin()
            + ELBOW_LENGTH_CM * forearm_deg.to_radians().sin()
            + WRIST_LENGTH_CM * tip_deg.to_radians().sin();

        let az = base_deg.to_radians();
        [d * az.cos(), d * az.sin(), h]
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Azimuth of `(x, y)` in degrees, normalised to `[0, 360)`.
fn azimuth_deg(x: f64, y: f64) -> f64 {
    let deg = y.atan2(x).to_degrees();
    if deg < 0.0 {
        deg + 360.0
    } else {
        deg
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn planar_distance(p: [f64; 3]) -> f64 {
        (p[0] * p[0] + p[1] * p[1]).sqrt()
    }

    #[test]
    fn test_forward_inverse_consistency() {
        let kin = PlanarKinematics;

        // Well inside the reachable annulus
        let targets = vec![
            [14.14, 14.14, 4.0],
            [-10.0, 20.0, 8.0],
            [5.0, -25.0, 3.0],
        ];

        for target in targets {
            for wrist in [WristOrientation::Vertical, WristOrientation::Horizontal].iter() {
                let pose = kin.inverse(target, *wrist);
                let reached = kin.forward(&pose);

                for axis in 0..3 {
                    assert!(
                        (reached[axis] - target[axis]).abs() < 0.01,
                        "axis {} of {:?} ({:?}): expected {}, reached {}",
                        axis,
                        target,
                        wrist,
                        target[axis],
                        reached[axis]
                    );
                }
            }
        }
    }

    #[test]
    fn test_vertical_wrist_points_down() {
        let kin = PlanarKinematics;

        let pose = kin.inverse([20.0, 0.0, 4.0], WristOrientation::Vertical);

        // Tip elevation must be -90 deg: forearm - (180 - wrist) == -90
        let forearm = pose.get(JointId::Shoulder).unwrap()
            - (180.0 - pose.get(JointId::Elbow).unwrap());
        let tip = forearm - (180.0 - pose.get(JointId::Wrist).unwrap());
        assert!((tip + 90.0).abs() < 1e-6);
    }

    #[test]
    fn test_unreachable_target_is_clamped() {
        let kin = PlanarKinematics;

        let pose = kin.inverse([100.0, 0.0, 4.0], WristOrientation::Horizontal);
        let reached = kin.forward(&pose);

        // All angles finite, and the tip within the arm's absolute reach
        for (_, angle) in pose.iter() {
            assert!(angle.is_finite());
        }
        let max_reach = SHOULDER_LENGTH_CM + ELBOW_LENGTH_CM + WRIST_LENGTH_CM;
        assert!(planar_distance(reached) <= max_reach + 0.01);

        // Azimuth towards the requested target is preserved
        assert!((reached[1]).abs() < 1e-6);
        assert!(reached[0] > 0.0);
    }

    #[test]
    fn test_azimuth_normalisation() {
        assert!((azimuth_deg(1.0, 0.0) - 0.0).abs() < 1e-9);
        assert!((azimuth_deg(0.0, 1.0) - 90.0).abs() < 1e-9);
        assert!((azimuth_deg(0.0, -1.0) - 270.0).abs() < 1e-9);
    }
}
