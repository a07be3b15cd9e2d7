//! Planar geometry aliases for tracked positions and body axes.

use nalgebra::Vector2;

/// Tracked position in image pixels.
pub type Point2 = Vector2<f64>;

/// Unit forward axis for a heading given in degrees.
pub fn forward_axis(heading_deg: f64) -> Vector2<f64> {
    let rad = heading_deg.to_radians();
    Vector2::new(rad.cos(), rad.sin()).normalize()
}

/// Forward axis rotated 90° counter-clockwise.
pub fn transverse_axis(forward: &Vector2<f64>) -> Vector2<f64> {
    Vector2::new(-forward.y, forward.x)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_axis_unit_length() {
        for deg in [0.0, 37.0, 90.0, 181.5, -45.0] {
            assert!((forward_axis(deg).norm() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_transverse_is_ccw() {
        let fwd = forward_axis(0.0);
        let perp = transverse_axis(&fwd);
        assert!(perp.x.abs() < 1e-12);
        assert!((perp.y - 1.0).abs() < 1e-12);
        assert!(fwd.dot(&perp).abs() < 1e-12);
    }
}
