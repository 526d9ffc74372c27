//! # Arm Equipment Data
//!
//! Definitions of the joints which make up the arm and the pose maps which are
//! exchanged between the trajectory controller, the kinematics layer and the
//! debug protocol.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// IDs of all joints available to the arm.
///
/// The grabber is not included here as it is a two-position joint driven by
/// its own command rather than an angle map.
#[derive(Serialize, Deserialize, Debug, Hash, Eq, PartialEq, Copy, Clone)]
pub enum JointId {
    Base,
    Shoulder,
    Elbow,
    Wrist,
    WristTurn,
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A mapping from joint ID to angle in degrees.
///
/// Poses are treated as immutable values once built. A pose containing only a
/// subset of the arm's joints is valid and commands motion of the named
/// joints only.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(transparent)]
pub struct ArmPose(HashMap<JointId, f64>);

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl JointId {
    /// All joint IDs, in no particular order.
    pub fn all() -> [JointId; 5] {
        [
            JointId::Base,
            JointId::Shoulder,
            JointId::Elbow,
            JointId::Wrist,
            JointId::WristTurn,
        ]
    }
}

impl FromStr for JointId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "base" => Ok(JointId::Base),
            "shoulder" => Ok(JointId::Shoulder),
            "elbow" => Ok(JointId::Elbow),
            "wrist" => Ok(JointId::Wrist),
            "wrist_turn" | "wristturn" => Ok(JointId::WristTurn),
            _ => Err(format!("\"{}\" is not a recognised joint ID", s)),
        }
    }
}

impl ArmPose {
    /// Create an empty pose.
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    /// Build a pose from an iterator of `(JointId, f64)` pairs.
    pub fn from_angles<I: IntoIterator<Item = (JointId, f64)>>(angles: I) -> Self {
        Self(angles.into_iter().collect())
    }

    /// Get the angle of the given joint, or `None` if the pose doesn't
    /// contain it.
    pub fn get(&self, joint_id: JointId) -> Option<f64> {
        self.0.get(&joint_id).copied()
    }

    /// Set the angle of the given joint.
    pub fn set(&mut self, joint_id: JointId, angle_deg: f64) {
        self.0.insert(joint_id, angle_deg);
    }

    /// Iterate over `(JointId, angle)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (JointId, f64)> + '_ {
        self.0.iter().map(|(id, angle)| (*id, *angle))
    }

    /// The joint IDs contained in this pose.
    pub fn joint_ids(&self) -> Vec<JointId> {
        self.0.keys().copied().collect()
    }

    /// Number of joints in this pose.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if the pose contains no joints.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_pose_json_keys() {
        let pose = ArmPose::from_angles(vec![(JointId::Base, 10.0), (JointId::Elbow, 20.5)]);

        let json = serde_json::to_string(&pose).unwrap();
        let parsed: ArmPose = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.get(JointId::Base), Some(10.0));
        assert_eq!(parsed.get(JointId::Elbow), Some(20.5));
        assert_eq!(parsed.len(), 2);
    }

    #[test]
    fn test_joint_id_from_str() {
        assert_eq!(JointId::from_str("base").unwrap(), JointId::Base);
        assert_eq!(JointId::from_str("wrist_turn").unwrap(), JointId::WristTurn);
        assert!(JointId::from_str("knee").is_err());
    }
}
