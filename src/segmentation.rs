//! Event segmentation around stimulation markers.
//!
//! Every flagged frame opens a window of `pre_frames` before and
//! `post_frames` from the marker. Windows that would run past either end of
//! the recording are skipped.

use std::collections::BTreeMap;

use crate::config::{frames_for, WindowConfig};
use crate::error::{KinResult, KinematicsError};
use crate::types::{EventWindow, Pose, Recording, StimulusKey};

/// Windows grouped by stimulus class, each list in scan order.
pub type StimulusWindows = BTreeMap<StimulusKey, Vec<EventWindow>>;

/// Window extent in frames for a given frame rate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowBounds {
    pub pre_frames: usize,
    pub post_frames: usize,
}

impl WindowBounds {
    pub fn new(config: &WindowConfig, fps: f64) -> Self {
        WindowBounds {
            pre_frames: frames_for(config.pre_stim_s, fps),
            post_frames: frames_for(config.post_stim_s, fps),
        }
    }

    /// `[trigger - pre, trigger + post)` if it fits in `total` frames.
    pub fn range_for(&self, trigger: usize, total: usize) -> Option<std::ops::Range<usize>> {
        let start = trigger.checked_sub(self.pre_frames)?;
        let end = trigger + self.post_frames;
        (end <= total).then_some(start..end)
    }
}

/// Extract every in-bounds window, in scan order.
pub fn extract_windows(
    poses: &[Pose],
    markers: &[Option<StimulusKey>],
    occurred: &[bool],
    bounds: WindowBounds,
) -> KinResult<Vec<EventWindow>> {
    if poses.len() != markers.len() || poses.len() != occurred.len() {
        return Err(KinematicsError::invalid(format!(
            "misaligned columns: {} poses, {} markers, {} flags",
            poses.len(),
            markers.len(),
            occurred.len()
        )));
    }

    let mut windows = Vec::new();
    for (trigger, _) in occurred.iter().enumerate().filter(|(_, flag)| **flag) {
        let Some(key) = markers[trigger] else {
            log::debug!("stimulus flag without a marker at frame {trigger}");
            continue;
        };
        let Some(range) = bounds.range_for(trigger, poses.len()) else {
            log::debug!(
                "skipping {key} at frame {trigger}: window runs outside {} frames",
                poses.len()
            );
            continue;
        };
        windows.push(EventWindow {
            key,
            trigger_index: trigger,
            start: range.start,
            poses: poses[range].to_vec(),
        });
    }
    Ok(windows)
}

/// Group windows by stimulus key, preserving order within each key.
pub fn group_by_key(windows: Vec<EventWindow>) -> StimulusWindows {
    let mut grouped = StimulusWindows::new();
    for window in windows {
        grouped.entry(window.key).or_default().push(window);
    }
    grouped
}

/// Segment aligned columns into keyed windows.
pub fn segment(
    poses: &[Pose],
    markers: &[Option<StimulusKey>],
    occurred: &[bool],
    fps: f64,
    config: &WindowConfig,
) -> KinResult<StimulusWindows> {
    let bounds = WindowBounds::new(config, fps);
    let windows = extract_windows(poses, markers, occurred, bounds)?;
    Ok(group_by_key(windows))
}

pub fn segment_recording(recording: &Recording, config: &WindowConfig) -> KinResult<StimulusWindows> {
    segment(
        &recording.poses(),
        &recording.markers(),
        &recording.stimulus_flags(),
        recording.fps,
        config,
    )
}

/// Keys ordered by the frame of their first window in the recording.
pub fn first_seen_order(windows: &StimulusWindows) -> Vec<StimulusKey> {
    let mut firsts: Vec<(usize, StimulusKey)> = windows
        .iter()
        .filter_map(|(key, list)| list.first().map(|w| (w.trigger_index, *key)))
        .collect();
    firsts.sort();
    firsts.into_iter().map(|(_, key)| key).collect()
}
