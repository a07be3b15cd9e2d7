//! Batch orchestration: recording -> windows -> features -> gate -> collections.
//!
//! All run state lives in a [`TrialAccumulator`] owned by the caller. Files
//! can be processed into separate accumulators and combined with
//! [`TrialAccumulator::merge`]; order within each key is preserved.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::AnalysisConfig;
use crate::error::KinResult;
use crate::gate::{classify, response_failure, RejectReason, Verdict};
use crate::interpolation::{angle_series, point_series};
use crate::kinematics::compute_features;
use crate::loader::load_recording;
use crate::segmentation::{first_seen_order, segment_recording};
use crate::smoothing::{smooth_points, smooth_scalar};
use crate::types::{EventWindow, FeatureSeries, Recording, StimulusCategory, StimulusKey};

/// Accepted series per stimulus key, in processing order.
pub type SeriesCollection = BTreeMap<StimulusKey, Vec<Vec<f64>>>;

/// The four per-key feature collections.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResultCollections {
    pub lateral_velocity: SeriesCollection,
    pub forward_velocity: SeriesCollection,
    pub body_angle: SeriesCollection,
    pub angular_velocity: SeriesCollection,
}

impl ResultCollections {
    /// Make sure `key` is present in every collection, even with no trials.
    pub fn ensure_key(&mut self, key: StimulusKey) {
        for collection in self.collections_mut() {
            collection.entry(key).or_default();
        }
    }

    pub fn push(&mut self, key: StimulusKey, features: FeatureSeries) {
        self.lateral_velocity
            .entry(key)
            .or_default()
            .push(features.lateral_velocity);
        self.forward_velocity
            .entry(key)
            .or_default()
            .push(features.forward_velocity);
        self.body_angle.entry(key).or_default().push(features.body_angle);
        self.angular_velocity
            .entry(key)
            .or_default()
            .push(features.angular_velocity);
    }

    /// Number of accepted trials stored under `key`.
    pub fn trial_count(&self, key: &StimulusKey) -> usize {
        self.body_angle.get(key).map_or(0, Vec::len)
    }

    pub fn total_trials(&self) -> usize {
        self.body_angle.values().map(Vec::len).sum()
    }

    pub fn merge(&mut self, other: ResultCollections) {
        merge_collection(&mut self.lateral_velocity, other.lateral_velocity);
        merge_collection(&mut self.forward_velocity, other.forward_velocity);
        merge_collection(&mut self.body_angle, other.body_angle);
        merge_collection(&mut self.angular_velocity, other.angular_velocity);
    }

    fn collections_mut(&mut self) -> [&mut SeriesCollection; 4] {
        [
            &mut self.lateral_velocity,
            &mut self.forward_velocity,
            &mut self.body_angle,
            &mut self.angular_velocity,
        ]
    }
}

fn merge_collection(into: &mut SeriesCollection, other: SeriesCollection) {
    for (key, mut trials) in other {
        into.entry(key).or_default().append(&mut trials);
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedFile {
    pub path: String,
    pub error: String,
}

/// Run-wide counters.
///
/// The per-frequency lists hold `1` for an accepted trial and `0` for a
/// rejected one, in processing order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub turning_succ_no: usize,
    pub turning_fail_no: usize,
    pub elytra_succ_no: usize,
    pub elytra_fail_no: usize,
    pub turning_success_freq: BTreeMap<u32, Vec<u8>>,
    pub elytra_success_freq: BTreeMap<u32, Vec<u8>>,
    pub rejections: BTreeMap<RejectReason, usize>,
    pub files_processed: usize,
    pub windows_processed: usize,
    /// Windows that could not be processed (e.g. no valid samples)
    pub window_errors: usize,
    /// Windows whose frequency is not in the configured set
    pub untracked_windows: usize,
    pub failed_files: Vec<FailedFile>,
}

impl RunSummary {
    pub fn record(&mut self, key: &StimulusKey, verdict: Verdict) {
        let success = match verdict {
            Verdict::Accept => 1,
            Verdict::Reject(reason) => {
                *self.rejections.entry(reason).or_default() += 1;
                0
            }
        };
        let (succ, fail, freq) = match key.side.category() {
            Some(StimulusCategory::Turning) => (
                &mut self.turning_succ_no,
                &mut self.turning_fail_no,
                &mut self.turning_success_freq,
            ),
            Some(StimulusCategory::Elytra) => (
                &mut self.elytra_succ_no,
                &mut self.elytra_fail_no,
                &mut self.elytra_success_freq,
            ),
            None => return,
        };
        if success == 1 {
            *succ += 1;
        } else {
            *fail += 1;
        }
        freq.entry(key.frequency).or_default().push(success);
    }

    pub fn turning_success_rate(&self) -> Option<f64> {
        success_rate(self.turning_succ_no, self.turning_fail_no)
    }

    pub fn elytra_success_rate(&self) -> Option<f64> {
        success_rate(self.elytra_succ_no, self.elytra_fail_no)
    }

    pub fn total_rejected(&self) -> usize {
        self.rejections.values().sum()
    }

    pub fn merge(&mut self, other: RunSummary) {
        self.turning_succ_no += other.turning_succ_no;
        self.turning_fail_no += other.turning_fail_no;
        self.elytra_succ_no += other.elytra_succ_no;
        self.elytra_fail_no += other.elytra_fail_no;
        for (freq, mut list) in other.turning_success_freq {
            self.turning_success_freq.entry(freq).or_default().append(&mut list);
        }
        for (freq, mut list) in other.elytra_success_freq {
            self.elytra_success_freq.entry(freq).or_default().append(&mut list);
        }
        for (reason, count) in other.rejections {
            *self.rejections.entry(reason).or_default() += count;
        }
        self.files_processed += other.files_processed;
        self.windows_processed += other.windows_processed;
        self.window_errors += other.window_errors;
        self.untracked_windows += other.untracked_windows;
        self.failed_files.extend(other.failed_files);
    }
}

fn success_rate(succ: usize, fail: usize) -> Option<f64> {
    let total = succ + fail;
    (total > 0).then(|| succ as f64 / total as f64)
}

/// Accumulation state for one batch run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrialAccumulator {
    pub collections: ResultCollections,
    pub summary: RunSummary,
}

impl TrialAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&mut self, other: TrialAccumulator) {
        self.collections.merge(other.collections);
        self.summary.merge(other.summary);
    }
}

/// Outcome of processing one window.
#[derive(Clone, Debug, PartialEq)]
pub struct TrialResult {
    pub features: FeatureSeries,
    pub verdict: Verdict,
}

pub struct Pipeline {
    config: AnalysisConfig,
}

impl Pipeline {
    pub fn new(config: AnalysisConfig) -> KinResult<Self> {
        config.validate()?;
        Ok(Pipeline { config })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Interpolate, smooth and compute features for one window.
    pub fn extract_features(&self, window: &EventWindow, fps: f64) -> KinResult<FeatureSeries> {
        let smoothing = &self.config.smoothing;
        let headings = angle_series(&window.headings())?;
        let positions = point_series(&window.positions())?;

        let positions = smooth_points(&positions, smoothing.position_alpha, smoothing.z_thresh)?;
        let headings = smooth_scalar(&headings, smoothing.angle_alpha, smoothing.z_thresh)?;

        compute_features(&positions, &headings, fps, &self.config.kinematics)
    }

    /// Features plus gate decision for one window.
    pub fn evaluate_window(&self, window: &EventWindow, fps: f64) -> KinResult<TrialResult> {
        let features = self.extract_features(window, fps)?;
        let gate = &self.config.gate;
        let mut verdict = classify(
            &features.body_angle,
            &features.forward_velocity,
            &window.key,
            gate,
        );
        if verdict.is_accept() && gate.apply_response_policies {
            if let Some(reason) = response_failure(
                &features.body_angle,
                &features.forward_velocity,
                &window.key,
                gate,
            ) {
                verdict = Verdict::Reject(reason);
            }
        }
        Ok(TrialResult { features, verdict })
    }

    /// Segment one recording and fold every window into `acc`.
    ///
    /// Keys are visited in the order they first occur in the recording.
    /// Windows without usable samples are logged and counted; they do not
    /// stop the file.
    pub fn process_recording(&self, recording: &Recording, acc: &mut TrialAccumulator) -> KinResult<()> {
        let windows = segment_recording(recording, &self.config.window)?;
        let window_count: usize = windows.values().map(Vec::len).sum();
        log::info!(
            "{}: {} frames at {:.1} fps, {} stimulus windows",
            recording.source,
            recording.len(),
            recording.fps,
            window_count
        );

        for key in first_seen_order(&windows) {
            let key_windows = windows.get(&key).map(Vec::as_slice).unwrap_or_default();
            if !self.config.tracks_frequency(key.frequency) {
                log::warn!(
                    "{}: {} {key} windows use a frequency outside {:?}",
                    recording.source,
                    key_windows.len(),
                    self.config.frequencies
                );
                acc.summary.untracked_windows += key_windows.len();
            }
            for window in key_windows {
                acc.summary.windows_processed += 1;
                acc.collections.ensure_key(key);
                let trial = match self.evaluate_window(window, recording.fps) {
                    Ok(trial) => trial,
                    Err(e) if e.is_data_error() => {
                        log::warn!(
                            "{}: window at frame {} ({key}) failed: {e}",
                            recording.source,
                            window.trigger_index
                        );
                        acc.summary.window_errors += 1;
                        continue;
                    }
                    Err(e) => return Err(e),
                };
                acc.summary.record(&key, trial.verdict);
                match trial.verdict {
                    Verdict::Accept => acc.collections.push(key, trial.features),
                    Verdict::Reject(reason) => log::debug!(
                        "{}: rejected {key} trial at frame {}: {reason}",
                        recording.source,
                        window.trigger_index
                    ),
                }
            }
        }
        acc.summary.files_processed += 1;
        Ok(())
    }

    /// Load and process one file into `acc`.
    pub fn process_file(&self, path: &Path, acc: &mut TrialAccumulator) -> KinResult<()> {
        let recording = load_recording(path)?;
        self.process_recording(&recording, acc)
    }

    /// Process every file in order. A failing file is logged, recorded in
    /// the summary and skipped.
    pub fn run<P: AsRef<Path>>(&self, paths: &[P]) -> TrialAccumulator {
        let mut acc = TrialAccumulator::new();
        for path in paths {
            let path = path.as_ref();
            if let Err(e) = self.process_file(path, &mut acc) {
                log::warn!("Failed {}: {}", path.display(), e);
                acc.summary.failed_files.push(FailedFile {
                    path: path.display().to_string(),
                    error: e.to_string(),
                });
            }
        }
        let summary = &acc.summary;
        log::info!(
            "Run complete: {} files ({} failed), {} windows, {} accepted, {} rejected, {} errors",
            summary.files_processed,
            summary.failed_files.len(),
            summary.windows_processed,
            acc.collections.total_trials(),
            summary.total_rejected(),
            summary.window_errors
        );
        acc
    }
}
