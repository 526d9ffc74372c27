//! # Locations Module
//!
//! Named joint-space poses of interest: the camera viewpoints, the hover
//! waypoints and the deposit location of each puzzle shape. These were
//! taught in by jogging the arm and recording the angles.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::eqpt::arm::{ArmPose, JointId};

use crate::vision::Shape;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A named joint-space pose.
#[derive(Debug, Clone)]
pub struct Location {
    pub name: &'static str,

    base: f64,
    shoulder: f64,
    elbow: f64,
    wrist: f64,
    wrist_turn: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Location {
    const fn new(
        base: f64,
        shoulder: f64,
        elbow: f64,
        wrist: f64,
        wrist_turn: f64,
        name: &'static str,
    ) -> Self {
        Self {
            name,
            base,
            shoulder,
            elbow,
            wrist,
            wrist_turn,
        }
    }

    /// The pose of this location.
    pub fn pose(&self) -> ArmPose {
        ArmPose::from_angles(vec![
            (JointId::Base, self.base),
            (JointId::Shoulder, self.shoulder),
            (JointId::Elbow, self.elbow),
            (JointId::Wrist, self.wrist),
            (JointId::WristTurn, self.wrist_turn),
        ])
    }
}

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Pose from which the camera overlooks the input area.
pub const INPUT_AREA_CAM_VIEW: Location =
    Location::new(85.0, 101.0, 60.0, 106.0, 90.0, "Input area cam view");

/// Hover waypoint above the input area, cleared of the pieces.
pub const HOVER_ABOVE_INPUT: Location =
    Location::new(84.0, 95.0, 60.0, 40.0, 90.0, "Hover above input");

/// Hover waypoint above the puzzle area.
pub const HOVER_ABOVE_PUZZLES: Location =
    Location::new(172.0, 95.0, 58.0, 25.0, 90.0, "Hover above puzzle");

const OCTAGON: Location = Location::new(175.0, 114.0, 88.0, 60.0, 90.0, "Octagon");
const ELLIPSE: Location = Location::new(156.0, 126.0, 60.0, 41.0, 69.0, "Ellipse");
const SQUARE: Location = Location::new(148.0, 113.0, 79.0, 43.0, 68.0, "Square");
const CIRCLE: Location = Location::new(194.7, 142.0, 25.7, 31.7, 120.0, "Circle");
const SEMICIRCLE: Location = Location::new(175.0, 102.0, 105.0, 60.0, 90.0, "Semicircle");
const TRIANGLE: Location = Location::new(206.8, 106.0, 89.0, 50.0, 120.0, "Triangle");
const RECTANGLE: Location = Location::new(198.4, 126.0, 59.0, 40.0, 115.0, "Rectangle");
const DIAMOND: Location = Location::new(175.0, 130.0, 52.0, 48.0, 90.0, "Diamond");
const PENTAGON: Location = Location::new(161.0, 138.0, 30.0, 34.0, 80.0, "Pentagon");

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// The deposit location for a shape on the puzzle board.
pub fn deposit_location(shape: Shape) -> Location {
    match shape {
        Shape::Octagon => OCTAGON,
        Shape::Ellipse => ELLIPSE,
        Shape::Square => SQUARE,
        Shape::Circle => CIRCLE,
        Shape::Semicircle => SEMICIRCLE,
        Shape::Triangle => TRIANGLE,
        Shape::Rectangle => RECTANGLE,
        Shape::Diamond => DIAMOND,
        Shape::Pentagon => PENTAGON,
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_every_shape_has_a_deposit_location() {
        for shape in Shape::all().iter() {
            let location = deposit_location(*shape);
            assert_eq!(location.pose().len(), 5);
        }
    }

    #[test]
    fn test_pose_carries_all_joints() {
        let pose = INPUT_AREA_CAM_VIEW.pose();
        for joint_id in JointId::all().iter() {
            assert!(pose.get(*joint_id).is_some());
        }
    }
}
