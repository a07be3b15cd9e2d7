//! Body-angle and body-frame velocity features for one trial window.
//!
//! Inputs are already gap-filled and smoothed: headings in degrees,
//! positions in pixels, both one entry per frame.

use crate::config::{frames_for, KinematicsConfig};
use crate::error::{KinResult, KinematicsError};
use crate::smoothing::{ewma, round_to};
use crate::types::{forward_axis, transverse_axis, FeatureSeries, Point2};

/// Shortest signed rotation from `prev` to `next`, in `(-180, 180]` degrees.
pub fn wrap_delta(prev: f64, next: f64) -> f64 {
    let delta = (next - prev + 180.0).rem_euclid(360.0) - 180.0;
    if delta <= -180.0 {
        delta + 360.0
    } else {
        delta
    }
}

/// Remove ±360° wraparound, keeping continuous rotation.
pub fn unwrap_angles(angles: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(angles.len());
    let Some(&first) = angles.first() else {
        return out;
    };
    out.push(first);
    let mut acc = first;
    for pair in angles.windows(2) {
        acc += wrap_delta(pair[0], pair[1]);
        out.push(acc);
    }
    out
}

/// Subtract `series[ref_idx]` from every sample.
fn subtract_reference(series: &mut [f64], ref_idx: usize) {
    if let Some(&reference) = series.get(ref_idx) {
        series.iter_mut().for_each(|v| *v -= reference);
    }
}

/// Unwrapped heading relative to the frame `angle_reference_s` into the trial.
///
/// The reference index is clamped to the last sample for short windows.
pub fn body_angles(angles_deg: &[f64], fps: f64, reference_s: f64) -> KinResult<Vec<f64>> {
    if angles_deg.is_empty() {
        return Err(KinematicsError::data("body angle of an empty series"));
    }
    let mut unwrapped = unwrap_angles(angles_deg);
    let ref_idx = frames_for(reference_s, fps).min(unwrapped.len() - 1);
    subtract_reference(&mut unwrapped, ref_idx);
    Ok(unwrapped)
}

/// Finite-difference angular velocity (deg/s).
///
/// The first difference is skipped, so the output has `len - 2` samples.
pub fn angular_velocity(angles: &[f64], fps: f64) -> Vec<f64> {
    if angles.len() < 2 {
        return Vec::new();
    }
    let dt = 1.0 / fps;
    (2..angles.len())
        .map(|i| (angles[i] - angles[i - 1]) / dt)
        .collect()
}

/// In-line and transverse velocity components (mm/s).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BodyVelocity {
    pub in_line: Vec<f64>,
    pub transverse: Vec<f64>,
}

/// Project each frame-to-frame displacement onto the body axes of the later
/// frame, scaled to mm/s. No smoothing or baseline.
pub fn decompose_velocity(
    positions: &[Point2],
    headings_deg: &[f64],
    fps: f64,
    pixels_per_mm: f64,
) -> KinResult<BodyVelocity> {
    if positions.len() != headings_deg.len() {
        return Err(KinematicsError::invalid(format!(
            "position/heading length mismatch: {} vs {}",
            positions.len(),
            headings_deg.len()
        )));
    }
    let scale = fps / pixels_per_mm;
    let mut velocity = BodyVelocity::default();
    for i in 1..positions.len() {
        let delta = positions[i] - positions[i - 1];
        let forward = forward_axis(headings_deg[i]);
        let transverse = transverse_axis(&forward);
        velocity.in_line.push(delta.dot(&forward) * scale);
        velocity.transverse.push(delta.dot(&transverse) * scale);
    }
    Ok(velocity)
}

/// Body-frame velocity, EWMA-smoothed and baseline-normalized.
///
/// The baseline index falls back to 0 when it lies past the end.
pub fn body_velocity(
    positions: &[Point2],
    headings_deg: &[f64],
    fps: f64,
    config: &KinematicsConfig,
) -> KinResult<BodyVelocity> {
    let raw = decompose_velocity(positions, headings_deg, fps, config.pixels_per_mm)?;
    let finish = |series: &[f64]| -> KinResult<Vec<f64>> {
        let mut smoothed: Vec<f64> = ewma(series, config.velocity_alpha)?
            .into_iter()
            .map(|v| round_to(v, config.round_decimals))
            .collect();
        let mut ref_idx = frames_for(config.velocity_reference_s, fps);
        if ref_idx >= smoothed.len() {
            ref_idx = 0;
        }
        subtract_reference(&mut smoothed, ref_idx);
        Ok(smoothed)
    };
    Ok(BodyVelocity {
        in_line: finish(&raw.in_line)?,
        transverse: finish(&raw.transverse)?,
    })
}

/// All four feature series for one smoothed window.
pub fn compute_features(
    positions: &[Point2],
    headings_deg: &[f64],
    fps: f64,
    config: &KinematicsConfig,
) -> KinResult<FeatureSeries> {
    let body_angle = body_angles(headings_deg, fps, config.angle_reference_s)?;
    let angular_velocity = angular_velocity(&body_angle, fps);
    let velocity = body_velocity(positions, headings_deg, fps, config)?;
    Ok(FeatureSeries {
        lateral_velocity: velocity.transverse,
        forward_velocity: velocity.in_line,
        body_angle,
        angular_velocity,
    })
}
