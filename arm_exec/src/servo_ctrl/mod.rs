//! # Servo Controller Module
//!
//! This module provides a unified servo control interface which can abstract over different types
//! of servo driver boards. The arm talks to its servos exclusively through the [`ServoDriver`]
//! trait, so the real PCA9685 board can be swapped for the [`DummyServoDriver`] when running
//! without hardware.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// [`ServoDriver`] implementation for the Adafruit PCA9685 16 channel servo driver board.
pub mod pca9685;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::trace;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Trait to provide a unified API for accessing servo driver boards.
pub trait ServoDriver {
    /// Drive the servo on `port` to a physical angle.
    ///
    /// ## Arguments
    /// - `port` - The driver board port the servo is wired to
    /// - `raw_angle_deg` - The physical angle to drive to, in degrees. Any mirroring has already
    ///   been applied by the caller. Values outside `[0, actuation_range_deg]` will be rejected.
    /// - `actuation_range_deg` - The full mechanical range of the servo, in degrees
    fn actuate(
        &mut self,
        port: u8,
        raw_angle_deg: f64,
        actuation_range_deg: f64,
    ) -> Result<(), ServoError>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A [`ServoDriver`] which drives nothing and logs every actuation at trace level.
///
/// Used when the executable is started with `--no-board`, and in tests.
pub struct DummyServoDriver;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum ServoError {
    #[error("An I2C error occured")]
    I2c,

    #[error("Port {0} does not exist on the driver board")]
    InvalidPort(u8),

    #[error("Angle {0} deg is outside the servo's actuation range of {1} deg")]
    AngleOutOfRange(f64, f64),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ServoDriver for DummyServoDriver {
    fn actuate(
        &mut self,
        port: u8,
        raw_angle_deg: f64,
        actuation_range_deg: f64,
    ) -> Result<(), ServoError> {
        if raw_angle_deg < 0.0 || raw_angle_deg > actuation_range_deg {
            return Err(ServoError::AngleOutOfRange(
                raw_angle_deg,
                actuation_range_deg,
            ));
        }

        trace!("Servo {} to {:.2} deg", port, raw_angle_deg);
        Ok(())
    }
}
