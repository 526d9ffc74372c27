//! [`ServoDriver`] implementation for the PCA9685 driver

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use embedded_hal::blocking::i2c::{Write, WriteRead};
use pwm_pca9685::{Channel, Pca9685};

use util::maths::lin_map;

use super::{ServoDriver, ServoError};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

const MAX_PWM: f64 = 4096.0;

/// PWM period at the 50 Hz update rate the board must be configured with, in microseconds.
const PWM_PERIOD_US: f64 = 20_000.0;

/// Pulse width commanding the servo's zero position, in microseconds.
const MIN_PULSE_US: f64 = 500.0;

/// Pulse width commanding the servo's full-range position, in microseconds.
const MAX_PULSE_US: f64 = 2500.0;

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<I2C, E> ServoDriver for Pca9685<I2C>
where
    I2C: Write<Error = E> + WriteRead<Error = E>,
{
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

        let channel = channel_from_port(port).ok_or(ServoError::InvalidPort(port))?;

        // Map the angle onto the servo's pulse width range, then onto the
        // board's 12 bit counter
        let pulse_us = lin_map(
            (0.0, actuation_range_deg),
            (MIN_PULSE_US, MAX_PULSE_US),
            raw_angle_deg,
        );
        let off_count = ((pulse_us / PWM_PERIOD_US) * MAX_PWM) as u16;

        self.set_channel_on(channel, 0)
            .and_then(|_| self.set_channel_off(channel, off_count))
            .map_err(|e| match e {
                pwm_pca9685::Error::I2C(_) => ServoError::I2c,
                pwm_pca9685::Error::InvalidInputData => {
                    ServoError::AngleOutOfRange(raw_angle_deg, actuation_range_deg)
                }
            })
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn channel_from_port(port: u8) -> Option<Channel> {
    let channel = match port {
        0 => Channel::C0,
        1 => Channel::C1,
        2 => Channel::C2,
        3 => Channel::C3,
        4 => Channel::C4,
        5 => Channel::C5,
        6 => Channel::C6,
        7 => Channel::C7,
        8 => Channel::C8,
        9 => Channel::C9,
        10 => Channel::C10,
        11 => Channel::C11,
        12 => Channel::C12,
        13 => Channel::C13,
        14 => Channel::C14,
        15 => Channel::C15,
        _ => return None,
    };

    Some(channel)
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
