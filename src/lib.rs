//! Stimulation-locked kinematics for tracked walking trials.
//!
//! A [`Recording`] is cut into windows around each stimulation marker,
//! gap-filled and smoothed, reduced to body-angle and body-frame velocity
//! series, gated for tracking artefacts and accumulated per stimulus class.

pub mod config;
pub mod error;
pub mod gate;
pub mod interpolation;
pub mod kinematics;
pub mod loader;
pub mod pipeline;
pub mod report;
pub mod segmentation;
pub mod smoothing;
pub mod types;

pub use config::AnalysisConfig;
pub use error::{KinResult, KinematicsError};
pub use gate::{RejectReason, Verdict};
pub use pipeline::{Pipeline, ResultCollections, RunSummary, TrialAccumulator};
pub use report::{PeakStats, ResultsExport};
pub use types::{EventWindow, FeatureSeries, FrameRecord, Pose, Recording, Side, StimulusKey};
