//! Peak-response reduction and JSON export of a finished run.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::Utc;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::config::{AnalysisConfig, GateConfig};
use crate::error::KinResult;
use crate::pipeline::{ResultCollections, RunSummary, SeriesCollection, TrialAccumulator};
use crate::types::{Side, StimulusKey};

/// One of the four per-trial feature series.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Measure {
    LateralVelocity,
    ForwardVelocity,
    BodyAngle,
    AngularVelocity,
}

impl Measure {
    pub const ALL: [Measure; 4] = [
        Measure::LateralVelocity,
        Measure::ForwardVelocity,
        Measure::BodyAngle,
        Measure::AngularVelocity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Measure::LateralVelocity => "lateral_velocity",
            Measure::ForwardVelocity => "forward_velocity",
            Measure::BodyAngle => "body_angle",
            Measure::AngularVelocity => "angular_velocity",
        }
    }

    pub fn collection<'a>(&self, collections: &'a ResultCollections) -> &'a SeriesCollection {
        match self {
            Measure::LateralVelocity => &collections.lateral_velocity,
            Measure::ForwardVelocity => &collections.forward_velocity,
            Measure::BodyAngle => &collections.body_angle,
            Measure::AngularVelocity => &collections.angular_velocity,
        }
    }
}

/// Signed sample with the largest magnitude.
fn largest_magnitude(values: &[f64]) -> Option<f64> {
    values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(None, |best: Option<f64>, v| match best {
            Some(b) if b.abs() >= v.abs() => Some(b),
            _ => Some(v),
        })
}

fn finite_min(values: &[f64]) -> Option<f64> {
    values.iter().copied().filter(|v| v.is_finite()).reduce(f64::min)
}

fn finite_max(values: &[f64]) -> Option<f64> {
    values.iter().copied().filter(|v| v.is_finite()).reduce(f64::max)
}

/// Reduce the response slice of one trial to its peak value.
///
/// Right trials turn negative, so their peak is the minimum; Left trials take
/// the maximum. For Both, forward velocity uses the absolute maximum and the
/// other measures the signed extreme. Side None has no peak.
pub fn trial_peak(series: &[f64], side: Side, measure: Measure, config: &GateConfig) -> Option<f64> {
    let slice = &series[config.response_range(series.len())];
    match side {
        Side::Right => finite_min(slice),
        Side::Left => finite_max(slice),
        Side::Both if measure == Measure::ForwardVelocity => finite_max(slice).map(f64::abs),
        Side::Both => largest_magnitude(slice),
        Side::None => None,
    }
}

/// Peak value of every accepted trial, per measure and key.
pub type PeakResponses = BTreeMap<Measure, BTreeMap<StimulusKey, Vec<f64>>>;

/// Keys with side None or a frequency outside the configured set are left out.
pub fn peak_responses(collections: &ResultCollections, config: &AnalysisConfig) -> PeakResponses {
    let mut peaks = PeakResponses::new();
    for measure in Measure::ALL {
        let per_key = peaks.entry(measure).or_default();
        for (key, trials) in measure.collection(collections) {
            if key.side == Side::None || !config.tracks_frequency(key.frequency) {
                continue;
            }
            let values = trials
                .iter()
                .filter_map(|trial| trial_peak(trial, key.side, measure, &config.gate))
                .collect();
            per_key.insert(*key, values);
        }
    }
    peaks
}

/// Summary statistics over a set of peak values.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeakStats {
    pub mean: f64,
    /// Population standard deviation
    pub std: f64,
    pub count: usize,
}

impl PeakStats {
    pub fn from_values(values: &[f64]) -> Option<PeakStats> {
        let arr = Array1::from(values.to_vec());
        let mean = arr.mean()?;
        Some(PeakStats {
            mean,
            std: arr.std(0.0),
            count: arr.len(),
        })
    }
}

/// Statistics per measure, keyed by display names for JSON output.
pub fn peak_statistics(peaks: &PeakResponses) -> BTreeMap<String, BTreeMap<String, PeakStats>> {
    peaks
        .iter()
        .map(|(measure, per_key)| {
            let stats = per_key
                .iter()
                .filter_map(|(key, values)| {
                    PeakStats::from_values(values).map(|s| (key.to_string(), s))
                })
                .collect();
            (measure.as_str().to_string(), stats)
        })
        .collect()
}

fn keyed_by_name(collection: &SeriesCollection) -> BTreeMap<String, Vec<Vec<f64>>> {
    collection
        .iter()
        .map(|(key, trials)| (key.to_string(), trials.clone()))
        .collect()
}

/// Everything a run produced, ready for serialization.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResultsExport {
    pub generated_at: String,
    pub lateral_velocity: BTreeMap<String, Vec<Vec<f64>>>,
    pub forward_velocity: BTreeMap<String, Vec<Vec<f64>>>,
    pub body_angle: BTreeMap<String, Vec<Vec<f64>>>,
    pub angular_velocity: BTreeMap<String, Vec<Vec<f64>>>,
    pub summary: RunSummary,
    pub turning_success_rate: Option<f64>,
    pub elytra_success_rate: Option<f64>,
    pub peak_responses: BTreeMap<String, BTreeMap<String, PeakStats>>,
}

impl ResultsExport {
    /// Per-frequency success lists and peak statistics cover only the
    /// configured frequencies; counters and collections cover every trial.
    pub fn new(acc: &TrialAccumulator, config: &AnalysisConfig) -> Self {
        let collections = &acc.collections;
        let peaks = peak_responses(collections, config);
        let mut summary = acc.summary.clone();
        summary
            .turning_success_freq
            .retain(|freq, _| config.tracks_frequency(*freq));
        summary
            .elytra_success_freq
            .retain(|freq, _| config.tracks_frequency(*freq));
        ResultsExport {
            generated_at: Utc::now().to_rfc3339(),
            lateral_velocity: keyed_by_name(&collections.lateral_velocity),
            forward_velocity: keyed_by_name(&collections.forward_velocity),
            body_angle: keyed_by_name(&collections.body_angle),
            angular_velocity: keyed_by_name(&collections.angular_velocity),
            summary,
            turning_success_rate: acc.summary.turning_success_rate(),
            elytra_success_rate: acc.summary.elytra_success_rate(),
            peak_responses: peak_statistics(&peaks),
        }
    }

    pub fn to_json(&self) -> KinResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> KinResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_json()?)?;
        log::info!("Wrote results to {}", path.display());
        Ok(())
    }
}
