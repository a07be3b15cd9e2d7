//! Analysis parameters.
//!
//! Every timing constant is expressed in seconds and converted to a frame
//! count against the recording's frame rate with [`frames_for`].

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{KinResult, KinematicsError};

/// Stimulation frequencies used in the protocol (Hz).
pub const DEFAULT_FREQUENCIES: [u32; 5] = [10, 20, 30, 40, 50];

/// Past this, `10^decimals` no longer scales an f64 meaningfully.
pub const MAX_ROUND_DECIMALS: u32 = 15;

/// Camera calibration for the arena rig.
pub const DEFAULT_PIXELS_PER_MM: f64 = 4.1033;

/// `round(seconds * fps)` as a frame count.
pub fn frames_for(seconds: f64, fps: f64) -> usize {
    let frames = (seconds * fps).round();
    if frames.is_finite() && frames > 0.0 {
        frames as usize
    } else {
        0
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Seconds kept before the marker
    pub pre_stim_s: f64,
    /// Seconds kept from the marker onward
    pub post_stim_s: f64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            pre_stim_s: 0.15,
            post_stim_s: 1.25,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    pub position_alpha: f64,
    pub angle_alpha: f64,
    pub z_thresh: f64,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            position_alpha: 0.2,
            angle_alpha: 0.2,
            z_thresh: 2.5,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KinematicsConfig {
    pub pixels_per_mm: f64,
    /// EWMA factor applied to body-frame velocities
    pub velocity_alpha: f64,
    /// Baseline frame offset for body angle
    pub angle_reference_s: f64,
    /// Baseline frame offset for velocities
    pub velocity_reference_s: f64,
    pub round_decimals: u32,
}

impl Default for KinematicsConfig {
    fn default() -> Self {
        Self {
            pixels_per_mm: DEFAULT_PIXELS_PER_MM,
            velocity_alpha: 0.25,
            angle_reference_s: 0.15,
            velocity_reference_s: 0.1,
            round_decimals: 5,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Sample distance for the tracking-jump check
    pub jump_lag: usize,
    pub jump_limit_deg: f64,
    /// Final-angle limit for Right/Left trials
    pub return_limit_deg: f64,
    /// Minimum allowed forward velocity for Both trials (mm/s)
    pub backward_velocity_limit: f64,
    /// Response slice is `[start/span, end/span)` of the trial length
    pub response_start_s: f64,
    pub response_end_s: f64,
    pub response_span_s: f64,
    pub turning_response_deg: f64,
    pub elytra_response_mm_s: f64,
    /// Also drop trials that fail `turning_fail` / `elytra_fail`
    pub apply_response_policies: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            jump_lag: 5,
            jump_limit_deg: 40.0,
            return_limit_deg: 5.0,
            backward_velocity_limit: -5.0,
            response_start_s: 0.15,
            response_end_s: 0.65,
            response_span_s: 1.15,
            turning_response_deg: 3.0,
            elytra_response_mm_s: 3.0,
            apply_response_policies: false,
        }
    }
}

impl GateConfig {
    /// Index range of the response slice for a series of length `len`.
    pub fn response_range(&self, len: usize) -> std::ops::Range<usize> {
        let n = len as f64;
        let start = (self.response_start_s / self.response_span_s * n) as usize;
        let end = (self.response_end_s / self.response_span_s * n) as usize;
        start.min(len)..end.min(len)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub frequencies: Vec<u32>,
    pub window: WindowConfig,
    pub smoothing: SmoothingConfig,
    pub kinematics: KinematicsConfig,
    pub gate: GateConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            frequencies: DEFAULT_FREQUENCIES.to_vec(),
            window: WindowConfig::default(),
            smoothing: SmoothingConfig::default(),
            kinematics: KinematicsConfig::default(),
            gate: GateConfig::default(),
        }
    }
}

impl AnalysisConfig {
    /// Load from JSON; omitted fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> KinResult<Self> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let config: AnalysisConfig = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    /// Whether `frequency` belongs to the configured stimulation protocol.
    pub fn tracks_frequency(&self, frequency: u32) -> bool {
        self.frequencies.contains(&frequency)
    }

    pub fn validate(&self) -> KinResult<()> {
        check_alpha("smoothing.position_alpha", self.smoothing.position_alpha)?;
        check_alpha("smoothing.angle_alpha", self.smoothing.angle_alpha)?;
        check_alpha("kinematics.velocity_alpha", self.kinematics.velocity_alpha)?;
        check_positive("smoothing.z_thresh", self.smoothing.z_thresh)?;
        check_positive("kinematics.pixels_per_mm", self.kinematics.pixels_per_mm)?;
        check_positive("gate.response_span_s", self.gate.response_span_s)?;
        check_non_negative("window.pre_stim_s", self.window.pre_stim_s)?;
        check_positive("window.post_stim_s", self.window.post_stim_s)?;
        check_non_negative("kinematics.angle_reference_s", self.kinematics.angle_reference_s)?;
        check_non_negative(
            "kinematics.velocity_reference_s",
            self.kinematics.velocity_reference_s,
        )?;
        if self.kinematics.round_decimals > MAX_ROUND_DECIMALS {
            return Err(KinematicsError::invalid(format!(
                "kinematics.round_decimals must be at most {MAX_ROUND_DECIMALS}, got {}",
                self.kinematics.round_decimals
            )));
        }
        if self.frequencies.is_empty() {
            return Err(KinematicsError::invalid("frequencies must not be empty"));
        }
        if self.gate.jump_lag == 0 {
            return Err(KinematicsError::invalid("gate.jump_lag must be at least 1"));
        }
        if self.gate.response_start_s > self.gate.response_end_s {
            return Err(KinematicsError::invalid(
                "gate.response_start_s must not exceed gate.response_end_s",
            ));
        }
        Ok(())
    }
}

fn check_alpha(name: &str, alpha: f64) -> KinResult<()> {
    if alpha > 0.0 && alpha <= 1.0 {
        Ok(())
    } else {
        Err(KinematicsError::invalid(format!(
            "{name} must be in (0, 1], got {alpha}"
        )))
    }
}

fn check_positive(name: &str, value: f64) -> KinResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(KinematicsError::invalid(format!(
            "{name} must be positive, got {value}"
        )))
    }
}

fn check_non_negative(name: &str, value: f64) -> KinResult<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(KinematicsError::invalid(format!(
            "{name} must be non-negative, got {value}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_frames_for_rounds_half_up() {
        assert_eq!(frames_for(0.15, 50.0), 8);
        assert_eq!(frames_for(1.25, 50.0), 63);
        assert_eq!(frames_for(0.1, 100.0), 10);
        assert_eq!(frames_for(0.0, 100.0), 0);
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = AnalysisConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.frequencies, vec![10, 20, 30, 40, 50]);
        assert_eq!(config.kinematics.pixels_per_mm, 4.1033);
    }

    #[test]
    fn test_bad_alpha_rejected() {
        let mut config = AnalysisConfig::default();
        config.smoothing.angle_alpha = 0.0;
        assert!(config.validate().is_err());
        config.smoothing.angle_alpha = 1.5;
        assert!(config.validate().is_err());
        config.smoothing.angle_alpha = 1.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_round_decimals_bounded() {
        let mut config = AnalysisConfig::default();
        config.kinematics.round_decimals = MAX_ROUND_DECIMALS;
        assert!(config.validate().is_ok());
        config.kinematics.round_decimals = 16;
        assert!(config.validate().is_err());
        config.kinematics.round_decimals = u32::MAX;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_frequency_set() {
        let mut config = AnalysisConfig::default();
        assert!(config.tracks_frequency(20));
        assert!(!config.tracks_frequency(25));
        config.frequencies.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_response_range() {
        let gate = GateConfig::default();
        // 140 samples: [18.26.., 79.13..) -> [18, 79)
        assert_eq!(gate.response_range(140), 18..79);
        assert_eq!(gate.response_range(0), 0..0);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"frequencies": [5, 15], "smoothing": {{"z_thresh": 3.0}}}}"#
        )
        .unwrap();
        let config = AnalysisConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.frequencies, vec![5, 15]);
        assert_eq!(config.smoothing.z_thresh, 3.0);
        assert_eq!(config.smoothing.position_alpha, 0.2);
        assert_eq!(config.window, WindowConfig::default());
    }

    #[test]
    fn test_invalid_json_config_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"kinematics": {{"pixels_per_mm": -1.0}}}}"#).unwrap();
        assert!(matches!(
            AnalysisConfig::from_json_file(file.path()),
            Err(KinematicsError::InvalidParameters(_))
        ));
    }
}
