use ndarray::Array1;

use crate::error::{KinResult, KinematicsError};
use crate::interpolation::fill_gaps;
use crate::types::Point2;

/// Exponentially weighted moving average
/// `s[0] = x[0]`, `s[i] = alpha * x[i] + (1 - alpha) * s[i-1]`
pub struct EwmaSmoother {
    alpha: f64,
    state: Option<f64>,
}

impl EwmaSmoother {
    /// Create a new smoother; alpha close to 1 means minimal smoothing
    pub fn new(alpha: f64) -> KinResult<Self> {
        if !(alpha > 0.0 && alpha <= 1.0) {
            return Err(KinematicsError::invalid(format!(
                "EWMA alpha must be in (0, 1], got {alpha}"
            )));
        }
        Ok(EwmaSmoother { alpha, state: None })
    }

    /// Feed one sample, returning the smoothed value
    pub fn apply(&mut self, value: f64) -> f64 {
        let smoothed = match self.state {
            None => value,
            Some(prev) => self.alpha * value + (1.0 - self.alpha) * prev,
        };
        self.state = Some(smoothed);
        smoothed
    }

    pub fn reset(&mut self) {
        self.state = None;
    }
}

/// Smooth a whole series with a fresh [`EwmaSmoother`].
pub fn ewma(series: &[f64], alpha: f64) -> KinResult<Vec<f64>> {
    let mut smoother = EwmaSmoother::new(alpha)?;
    Ok(series.iter().map(|&v| smoother.apply(v)).collect())
}

/// Round to a fixed number of decimal places.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let scale = 10f64.powi(decimals as i32);
    (value * scale).round() / scale
}

/// Population z-score of each sample; non-finite samples are ignored for the
/// statistics and scored as NaN.
///
/// A series with zero spread scores 0 everywhere.
pub fn z_scores(series: &[f64]) -> Vec<f64> {
    let valid: Array1<f64> = series.iter().copied().filter(|v| v.is_finite()).collect();
    let mean = match valid.mean() {
        Some(m) => m,
        None => return vec![f64::NAN; series.len()],
    };
    let std = valid.std(0.0);
    series
        .iter()
        .map(|&v| {
            if !v.is_finite() {
                f64::NAN
            } else if std > 0.0 {
                (v - mean) / std
            } else {
                0.0
            }
        })
        .collect()
}

/// Flags samples with `|z| >= z_thresh`.
pub fn detect_outliers(series: &[f64], z_thresh: f64) -> Vec<bool> {
    z_scores(series)
        .into_iter()
        .map(|z| z.is_finite() && z.abs() >= z_thresh)
        .collect()
}

/// Replace outliers with interpolated values, then EWMA-smooth.
pub fn smooth_scalar(series: &[f64], alpha: f64, z_thresh: f64) -> KinResult<Vec<f64>> {
    if !(z_thresh > 0.0) {
        return Err(KinematicsError::invalid(format!(
            "z threshold must be positive, got {z_thresh}"
        )));
    }
    let outliers = detect_outliers(series, z_thresh);
    let masked: Vec<Option<f64>> = series
        .iter()
        .zip(&outliers)
        .map(|(&v, &outlier)| if outlier { None } else { Some(v) })
        .collect();
    let cleaned = fill_gaps(&masked)?;
    ewma(&cleaned, alpha)
}

/// [`smooth_scalar`] applied to each axis of a point series on its own.
pub fn smooth_points(points: &[Point2], alpha: f64, z_thresh: f64) -> KinResult<Vec<Point2>> {
    let xs: Vec<f64> = points.iter().map(|p| p.x).collect();
    let ys: Vec<f64> = points.iter().map(|p| p.y).collect();
    let xs = smooth_scalar(&xs, alpha, z_thresh)?;
    let ys = smooth_scalar(&ys, alpha, z_thresh)?;
    Ok(xs
        .into_iter()
        .zip(ys)
        .map(|(x, y)| Point2::new(x, y))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_single_value() {
        let mut smoother = EwmaSmoother::new(0.2).unwrap();
        assert_eq!(smoother.apply(5.0), 5.0);
    }

    #[test]
    fn test_recurrence() {
        let out = ewma(&[0.0, 10.0, 10.0], 0.5).unwrap();
        assert_eq!(out, vec![0.0, 5.0, 7.5]);
    }

    #[test]
    fn test_alpha_one_is_identity() {
        let series = vec![3.0, -1.0, 8.0, 2.0];
        assert_eq!(ewma(&series, 1.0).unwrap(), series);
    }

    #[test]
    fn test_reset_restarts_from_next_sample() {
        let mut smoother = EwmaSmoother::new(0.5).unwrap();
        smoother.apply(0.0);
        smoother.apply(10.0);
        smoother.reset();
        assert_eq!(smoother.apply(4.0), 4.0);
    }

    #[test]
    fn test_invalid_alpha() {
        assert!(EwmaSmoother::new(0.0).is_err());
        assert!(EwmaSmoother::new(1.01).is_err());
        assert!(EwmaSmoother::new(f64::NAN).is_err());
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(1.234567, 5), 1.23457);
        assert_eq!(round_to(-0.000004, 5), -0.0);
    }

    #[test]
    fn test_z_scores_population_std() {
        let z = z_scores(&[1.0, 2.0, 3.0, 4.0]);
        // mean 2.5, std sqrt(1.25)
        assert_abs_diff_eq!(z[0], -1.5 / 1.25f64.sqrt(), epsilon = 1e-12);
        assert_abs_diff_eq!(z[3], 1.5 / 1.25f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_z_scores_constant_series() {
        let z = z_scores(&[7.0; 10]);
        assert!(z.iter().all(|&v| v == 0.0));
        assert!(detect_outliers(&[7.0; 10], 2.5).iter().all(|&o| !o));
    }

    #[test]
    fn test_z_scores_ignore_missing() {
        let z = z_scores(&[1.0, f64::NAN, 3.0]);
        assert!(z[1].is_nan());
        assert_abs_diff_eq!(z[0], -1.0, epsilon = 1e-12);
    }

    fn ramp_with_spike() -> Vec<f64> {
        let mut series: Vec<f64> = (0..50).map(|i| i as f64).collect();
        series[25] = 500.0;
        series
    }

    #[test]
    fn test_spike_removed_before_smoothing() {
        let series = ramp_with_spike();
        assert!(detect_outliers(&series, 2.5)[25]);
        let cleaned = smooth_scalar(&series, 1.0, 2.5).unwrap();
        // alpha = 1 leaves only the outlier replacement visible
        assert_abs_diff_eq!(cleaned[25], 25.0, epsilon = 1e-9);
        assert_eq!(cleaned.len(), series.len());
    }

    #[test]
    fn test_single_spike_leaves_no_outliers_after_smoothing() {
        let smoothed = smooth_scalar(&ramp_with_spike(), 0.2, 2.5).unwrap();
        assert!(smoothed.iter().all(|v| v.is_finite()));
        assert!(detect_outliers(&smoothed, 2.5).iter().all(|&o| !o));
    }

    #[test]
    fn test_edge_outlier_takes_neighbour() {
        let mut series = vec![1.0; 20];
        series[0] = 100.0;
        let cleaned = smooth_scalar(&series, 1.0, 2.5).unwrap();
        assert_eq!(cleaned[0], 1.0);
    }

    #[test]
    fn test_points_axes_filtered_independently() {
        let mut points: Vec<Point2> = (0..30).map(|i| Point2::new(i as f64, 5.0)).collect();
        points[10].x = 1000.0;
        let smoothed = smooth_points(&points, 1.0, 2.5).unwrap();
        assert_abs_diff_eq!(smoothed[10].x, 10.0, epsilon = 1e-9);
        // y was constant and must be untouched
        assert!(smoothed.iter().all(|p| p.y == 5.0));
    }
}
