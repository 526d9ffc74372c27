//! # Vision Module
//!
//! Boundary types and traits for the camera and the shape classifier. The
//! actual capture and classification pipelines live outside this executable;
//! here they are represented by the [`Camera`] and [`ObjectClassifier`]
//! traits so the autopilot and command handler can be driven by stubs.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// The puzzle shapes the classifier can recognise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Shape {
    Octagon,
    Ellipse,
    Square,
    Circle,
    Semicircle,
    Triangle,
    Rectangle,
    Diamond,
    Pentagon,
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// An object found in a camera frame.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizedObject {
    /// Centre of the object in the camera frame, in pixels.
    pub center: (f64, f64),

    /// The recognised shape.
    pub label: Shape,

    /// Classifier confidence in `[0, 1]`.
    pub confidence: f64,
}

/// Latest JPEG frame captured from the camera, shared between the camera
/// poll loop, the video channel and the picture command.
#[derive(Default)]
pub struct FrameStore {
    frame: Mutex<Option<Vec<u8>>>,
}

/// A camera which never produces a frame. Used when running without
/// hardware.
pub struct NullCamera;

/// A classifier which never recognises anything.
pub struct NullClassifier;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Source of JPEG-encoded camera frames.
pub trait Camera: Send + Sync {
    /// Capture one frame, or `None` if no frame is available yet.
    fn capture(&self) -> Option<Vec<u8>>;
}

/// The shape classifier boundary.
pub trait ObjectClassifier: Send + Sync {
    /// Classify the given JPEG frame, returning the most confident object
    /// found, if any.
    fn classify(&self, frame: &[u8]) -> Option<RecognizedObject>;
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Shape {
    pub fn all() -> [Shape; 9] {
        [
            Shape::Octagon,
            Shape::Ellipse,
            Shape::Square,
            Shape::Circle,
            Shape::Semicircle,
            Shape::Triangle,
            Shape::Rectangle,
            Shape::Diamond,
            Shape::Pentagon,
        ]
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl FrameStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored frame.
    pub fn put(&self, frame: Vec<u8>) {
        *self.frame.lock().unwrap() = Some(frame);
    }

    /// Get a copy of the latest frame, if one has been captured yet.
    pub fn latest(&self) -> Option<Vec<u8>> {
        self.frame.lock().unwrap().clone()
    }
}

impl Camera for NullCamera {
    fn capture(&self) -> Option<Vec<u8>> {
        None
    }
}

impl ObjectClassifier for NullClassifier {
    fn classify(&self, _frame: &[u8]) -> Option<RecognizedObject> {
        None
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_frame_store() {
        let store = FrameStore::new();
        assert!(store.latest().is_none());

        store.put(vec![1, 2, 3]);
        assert_eq!(store.latest(), Some(vec![1, 2, 3]));

        // Later frames replace earlier ones
        store.put(vec![4]);
        assert_eq!(store.latest(), Some(vec![4]));
    }
}
