//! Gap filling for tracked series.
//!
//! Missing samples are explicit (`None`, or a non-finite value) and are
//! replaced by linear interpolation over the sample index between the
//! nearest valid neighbours. Gaps at either end take the nearest valid value.

use crate::error::{KinResult, KinematicsError};
use crate::types::Point2;

fn is_valid(sample: &Option<f64>) -> bool {
    matches!(sample, Some(v) if v.is_finite())
}

/// Fill every missing entry of `series`.
///
/// Errors with `DataError` when the series has no valid sample at all.
pub fn fill_gaps(series: &[Option<f64>]) -> KinResult<Vec<f64>> {
    let valid: Vec<(usize, f64)> = series
        .iter()
        .enumerate()
        .filter(|(_, s)| is_valid(s))
        .filter_map(|(i, s)| s.map(|v| (i, v)))
        .collect();

    let (first_idx, first_val) = *valid.first().ok_or_else(|| {
        KinematicsError::data(format!(
            "cannot interpolate a series of {} samples with no valid entries",
            series.len()
        ))
    })?;
    let (last_idx, last_val) = valid[valid.len() - 1];

    let mut out = Vec::with_capacity(series.len());
    let mut next = 0; // index into `valid` of the first valid sample at or after i
    for (i, sample) in series.iter().enumerate() {
        if is_valid(sample) {
            out.push(sample.unwrap_or_default());
            next += 1;
            continue;
        }
        if i < first_idx {
            out.push(first_val);
        } else if i > last_idx {
            out.push(last_val);
        } else {
            let (i0, v0) = valid[next - 1];
            let (i1, v1) = valid[next];
            let t = (i - i0) as f64 / (i1 - i0) as f64;
            out.push(v0 + (v1 - v0) * t);
        }
    }
    Ok(out)
}

/// Convert raw headings (radians) to degrees and fill the gaps.
pub fn angle_series(headings_rad: &[Option<f64>]) -> KinResult<Vec<f64>> {
    let degrees: Vec<Option<f64>> = headings_rad
        .iter()
        .map(|h| h.map(f64::to_degrees))
        .collect();
    fill_gaps(&degrees)
}

/// Fill each axis of a point series independently.
pub fn point_series(points: &[[Option<f64>; 2]]) -> KinResult<Vec<Point2>> {
    let xs: Vec<Option<f64>> = points.iter().map(|p| p[0]).collect();
    let ys: Vec<Option<f64>> = points.iter().map(|p| p[1]).collect();
    let xs = fill_gaps(&xs).map_err(|e| axis_error("x", e))?;
    let ys = fill_gaps(&ys).map_err(|e| axis_error("y", e))?;
    Ok(xs
        .into_iter()
        .zip(ys)
        .map(|(x, y)| Point2::new(x, y))
        .collect())
}

fn axis_error(axis: &str, err: KinematicsError) -> KinematicsError {
    match err {
        KinematicsError::DataError(msg) => KinematicsError::data(format!("{axis} axis: {msg}")),
        other => other,
    }
}
