use std::f32::consts::PI;
use swarm_common::BoundaryMode;

/// Applies the field topology to a freshly integrated position.
///
/// Returns the corrected `(x, y, heading)`; the result always lies inside
/// `[0, width] x [0, height]`.
#[inline]
pub fn apply_boundary(
    mode: BoundaryMode,
    mut x: f32,
    mut y: f32,
    mut heading: f32,
    width: f32,
    height: f32,
) -> (f32, f32, f32) {
    if !x.is_finite() {
        x = width * 0.5;
    }
    if !y.is_finite() {
        y = height * 0.5;
    }

    match mode {
        BoundaryMode::Toroidal => {
            x = x.rem_euclid(width);
            y = y.rem_euclid(height);
        }
        BoundaryMode::Bounce => {
            if x < 0.0 || x > width {
                x = x.clamp(0.0, width);
                heading = PI - heading;
            }
            if y < 0.0 || y > height {
                y = y.clamp(0.0, height);
                heading = -heading;
            }
        }
        BoundaryMode::Klein => {
            // Leaving through a vertical edge re-enters on the far side, mirrored top-to-bottom.
            if x < 0.0 || x >= width {
                let laps = (x / width).floor();
                x = x.rem_euclid(width);
                if laps.rem_euclid(2.0) != 0.0 {
                    y = height - y;
                    heading = -heading;
                }
            }
            y = y.rem_euclid(height);
        }
    }

    // rem_euclid can round up to exactly the modulus; the closed range still holds.
    (x.clamp(0.0, width), y.clamp(0.0, height), heading)
}
