//! # Transform Module
//!
//! Conversions between the camera frame (pixels), the board frame
//! (centimeters, origin at the bottom left of the board) and world space
//! (centimeters, origin at the centre of the arm's base).
//!
//! The calibration constants below were measured with the arm parked at the
//! input area camera view pose.

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Real width of the board, in centimeters.
pub const BOARD_WIDTH_CM: f64 = 30.0;

/// Real depth of the board, in centimeters.
pub const BOARD_DEPTH_CM: f64 = 21.0;

// World-space coordinates of the board corners (top left, top right, bottom
// left, bottom right).
const WD_TL: [f64; 3] = [10.73, -35.11, 4.90];
const WD_TR: [f64; 3] = [-13.11, -35.73, 5.67];
const WD_BL: [f64; 3] = [13.03, -16.67, 2.16];
const WD_BR: [f64; 3] = [-18.22, -15.84, 2.86];

// Pixel coordinates of the board corners in the camera frame.
const IMG_TL: [f64; 2] = [257.0, 5.0];
const IMG_TR: [f64; 2] = [1793.0, 0.0];
const IMG_BL: [f64; 2] = [260.0, 1060.0];
const IMG_BR: [f64; 2] = [1808.0, 1060.0];

// ------------------------------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Convert a camera frame position (pixels) to a board position
/// (centimeters, `(0, 0)` at the bottom left of the board).
pub fn camera_to_board(p: (f64, f64)) -> (f64, f64) {
    let width_px = (IMG_BR[0] - IMG_BL[0] + IMG_TR[0] - IMG_TL[0]) / 2.0;
    let height_px = (IMG_BL[1] - IMG_TL[1] + IMG_BR[1] - IMG_TR[1]) / 2.0;

    let x = (p.0 - IMG_BL[0]) / width_px * BOARD_WIDTH_CM;
    let y = (1.0 - (p.1 - IMG_TL[1]) / height_px) * BOARD_DEPTH_CM;

    (x, y)
}

/// Convert a board position (centimeters, `(0, 0)` at the bottom left) to
/// world coordinates for the kinematics solver.
///
/// The board is not axis-aligned in world space, so the position is
/// interpolated bilinearly between the measured corner coordinates.
pub fn board_to_world(p: (f64, f64)) -> [f64; 3] {
    let x = p.0 / BOARD_WIDTH_CM;
    let y = p.1 / BOARD_DEPTH_CM;

    // Left edge interpolated bottom-to-top, then offset along the
    // (y-interpolated) left-to-right direction
    let of_top = sub(WD_TL, WD_TR);
    let of_bottom = sub(WD_BL, WD_BR);

    let basis = add(scale(WD_TL, y), scale(WD_BL, 1.0 - y));
    let offset = add(scale(of_top, y), scale(of_bottom, 1.0 - y));

    sub(basis, scale(offset, x))
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn add(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

fn sub(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn scale(a: [f64; 3], s: f64) -> [f64; 3] {
    [a[0] * s, a[1] * s, a[2] * s]
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn assert_close(a: [f64; 3], b: [f64; 3]) {
        for axis in 0..3 {
            assert!(
                (a[axis] - b[axis]).abs() < 1e-3,
                "axis {}: {} vs {}",
                axis,
                a[axis],
                b[axis]
            );
        }
    }

    #[test]
    fn test_board_center_maps_to_corner_average() {
        let center = board_to_world((BOARD_WIDTH_CM / 2.0, BOARD_DEPTH_CM / 2.0));
        let expected = scale(add(add(WD_TL, WD_TR), add(WD_BL, WD_BR)), 0.25);
        assert_close(center, expected);
    }

    #[test]
    fn test_board_bottom_center() {
        let bottom = board_to_world((BOARD_WIDTH_CM / 2.0, 0.0));
        let expected = scale(add(WD_BL, WD_BR), 0.5);
        assert_close(bottom, expected);
    }

    #[test]
    fn test_board_corners() {
        assert_close(board_to_world((0.0, 0.0)), WD_BL);
        assert_close(board_to_world((0.0, BOARD_DEPTH_CM)), WD_TL);
        assert_close(board_to_world((BOARD_WIDTH_CM, 0.0)), WD_BR);
        assert_close(board_to_world((BOARD_WIDTH_CM, BOARD_DEPTH_CM)), WD_TR);
    }

    #[test]
    fn test_camera_corners_map_to_board_corners() {
        // The pixel corners don't form a perfect rectangle, so allow a small
        // tolerance in centimeters
        let (x, y) = camera_to_board((IMG_BL[0], IMG_BL[1]));
        assert!(x.abs() < 0.2 && y.abs() < 0.2);

        let (x, y) = camera_to_board((IMG_TR[0], IMG_TR[1]));
        assert!((x - BOARD_WIDTH_CM).abs() < 0.5);
        assert!((y - BOARD_DEPTH_CM).abs() < 0.2);
    }
}
