pub mod geometry;

pub use geometry::*;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{KinResult, KinematicsError};

/// Which electrode pair delivered the stimulation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Side {
    Right,
    Left,
    /// Both elytra (forward-drive stimulation)
    Both,
    /// Marker present but no electrode assigned (sham trial)
    None,
}

impl Side {
    pub fn parse(token: &str) -> Option<Side> {
        match token.trim() {
            "Right" | "right" => Some(Side::Right),
            "Left" | "left" => Some(Side::Left),
            "Both" | "both" => Some(Side::Both),
            "None" | "none" => Some(Side::None),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Right => "Right",
            Side::Left => "Left",
            Side::Both => "Both",
            Side::None => "None",
        }
    }

    /// Summary category the side is counted under, if any.
    pub fn category(&self) -> Option<StimulusCategory> {
        match self {
            Side::Right | Side::Left => Some(StimulusCategory::Turning),
            Side::Both => Some(StimulusCategory::Elytra),
            Side::None => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StimulusCategory {
    /// One-sided antenna stimulation (Right/Left)
    Turning,
    /// Bilateral elytra stimulation (Both)
    Elytra,
}

/// Class of stimulation events: side and pulse frequency (Hz).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StimulusKey {
    pub side: Side,
    pub frequency: u32,
}

impl StimulusKey {
    pub fn new(side: Side, frequency: u32) -> Self {
        StimulusKey { side, frequency }
    }

    /// Parse a stimulation annotation such as `"Right, 20"`.
    ///
    /// Anything that is not exactly a known side and an integer frequency
    /// yields `None`, meaning no stimulation on that frame.
    pub fn parse(token: &str) -> Option<StimulusKey> {
        let token = token.trim();
        if token.is_empty() {
            return None;
        }
        let (side, frequency) = token.split_once(',')?;
        let side = Side::parse(side)?;
        let frequency: u32 = frequency.trim().parse().ok()?;
        Some(StimulusKey { side, frequency })
    }
}

impl fmt::Display for StimulusKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.side, self.frequency)
    }
}

/// Tracked pose for one frame. Any component may be missing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub x: Option<f64>,
    pub y: Option<f64>,
    /// Heading in radians
    pub heading: Option<f64>,
}

impl Pose {
    pub fn new(x: f64, y: f64, heading: f64) -> Self {
        Pose {
            x: Some(x),
            y: Some(y),
            heading: Some(heading),
        }
    }

    pub fn missing() -> Self {
        Pose::default()
    }

    pub fn is_missing(&self) -> bool {
        self.x.is_none() && self.y.is_none() && self.heading.is_none()
    }

    /// True when at least one component is a finite number.
    pub fn has_valid_sample(&self) -> bool {
        [self.x, self.y, self.heading]
            .iter()
            .any(|c| matches!(c, Some(v) if v.is_finite()))
    }
}

/// One decoded sample of a recording.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameRecord {
    pub time: f64,
    pub pose: Pose,
    pub stimulus: Option<StimulusKey>,
}

/// A full decoded recording (one input file).
#[derive(Clone, Debug)]
pub struct Recording {
    pub source: String,
    pub frames: Vec<FrameRecord>,
    pub fps: f64,
}

impl Recording {
    /// Build a recording, deriving the frame rate from the mean time step.
    ///
    /// A recording whose poses carry no finite component at all is a
    /// `DataError`.
    pub fn new(source: impl Into<String>, frames: Vec<FrameRecord>) -> KinResult<Self> {
        let source = source.into();
        let fps = mean_frame_rate(&frames).map_err(|e| match e {
            KinematicsError::DataError(msg) => KinematicsError::data(format!("{source}: {msg}")),
            other => other,
        })?;
        if !frames.iter().any(|f| f.pose.has_valid_sample()) {
            return Err(KinematicsError::data(format!(
                "{source}: none of {} frames has a valid pose sample",
                frames.len()
            )));
        }
        Ok(Recording {
            source,
            frames,
            fps,
        })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn poses(&self) -> Vec<Pose> {
        self.frames.iter().map(|f| f.pose).collect()
    }

    pub fn markers(&self) -> Vec<Option<StimulusKey>> {
        self.frames.iter().map(|f| f.stimulus).collect()
    }

    pub fn stimulus_flags(&self) -> Vec<bool> {
        self.frames.iter().map(|f| f.stimulus.is_some()).collect()
    }
}

/// `1 / mean(t[i] - t[i-1])`, skipping non-finite steps.
pub fn mean_frame_rate(frames: &[FrameRecord]) -> KinResult<f64> {
    if frames.len() < 2 {
        return Err(KinematicsError::data(format!(
            "need at least 2 frames to derive a frame rate, got {}",
            frames.len()
        )));
    }
    let steps: Vec<f64> = frames
        .windows(2)
        .map(|w| w[1].time - w[0].time)
        .filter(|dt| dt.is_finite())
        .collect();
    if steps.is_empty() {
        return Err(KinematicsError::data("no finite time steps"));
    }
    let mean_dt = steps.iter().sum::<f64>() / steps.len() as f64;
    let fps = 1.0 / mean_dt;
    if !fps.is_finite() || fps <= 0.0 {
        return Err(KinematicsError::data(format!(
            "non-positive frame rate (mean dt = {mean_dt})"
        )));
    }
    Ok(fps)
}

/// Contiguous slice of a recording around one stimulation marker.
#[derive(Clone, Debug)]
pub struct EventWindow {
    pub key: StimulusKey,
    /// Index of the marker frame in the source recording
    pub trigger_index: usize,
    /// Index of the first frame of the window in the source recording
    pub start: usize,
    pub poses: Vec<Pose>,
}

impl EventWindow {
    pub fn len(&self) -> usize {
        self.poses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }

    pub fn headings(&self) -> Vec<Option<f64>> {
        self.poses.iter().map(|p| p.heading).collect()
    }

    pub fn positions(&self) -> Vec<[Option<f64>; 2]> {
        self.poses.iter().map(|p| [p.x, p.y]).collect()
    }
}

/// Per-trial kinematic features, all baseline-normalized.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureSeries {
    /// Transverse velocity (mm/s)
    pub lateral_velocity: Vec<f64>,
    /// In-line velocity (mm/s)
    pub forward_velocity: Vec<f64>,
    /// Unwrapped heading relative to the reference frame (degrees)
    pub body_angle: Vec<f64>,
    /// Degrees per second
    pub angular_velocity: Vec<f64>,
}
