//! Decoding of tracked trial recordings.
//!
//! A recording is a CSV with a header row and at least the columns
//! `time` (seconds), `pose` (`[x, y, heading_rad]`, elements may be `None`)
//! and optionally `arduino_data` (`"Right, 20"` style stimulation marks).
//! Files ending in `.gz` are decompressed on the fly.

use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use csv::ReaderBuilder;
use flate2::read::GzDecoder;

use crate::error::{KinResult, KinematicsError};
use crate::types::{FrameRecord, Pose, Recording, StimulusKey};

const TIME_COLUMN: &str = "time";
const POSE_COLUMN: &str = "pose";
const STIMULUS_COLUMN: &str = "arduino_data";

fn is_recording_name(name: &str) -> bool {
    name.ends_with(".csv") || name.ends_with(".csv.gz")
}

/// List recordings in `dir`, sorted by file name.
pub fn find_recordings(dir: impl AsRef<Path>) -> KinResult<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir.as_ref())? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if is_recording_name(name) {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

fn open_reader(path: &Path) -> KinResult<Box<dyn Read>> {
    let file = File::open(path)?;
    if path.extension().map(|e| e == "gz").unwrap_or(false) {
        Ok(Box::new(BufReader::new(GzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

fn parse_component(token: &str) -> Result<Option<f64>, String> {
    let token = token.trim().trim_matches(|c| c == '\'' || c == '"');
    match token {
        "" | "None" | "none" | "null" | "nan" | "NaN" => Ok(None),
        _ => token
            .parse::<f64>()
            .map(|v| v.is_finite().then_some(v))
            .map_err(|_| format!("invalid pose component {token:?}")),
    }
}

/// Parse a pose cell such as `[12.5, 40.1, 1.57]` or `[None, None, None]`.
///
/// An empty or `None` cell is a fully missing pose; a two-element list has a
/// missing heading.
pub fn parse_pose(cell: &str) -> Result<Pose, String> {
    let cell = cell.trim();
    if matches!(cell, "" | "None" | "nan" | "NaN") {
        return Ok(Pose::missing());
    }
    let inner = cell
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .or_else(|| cell.strip_prefix('(').and_then(|s| s.strip_suffix(')')))
        .ok_or_else(|| format!("pose {cell:?} is not a bracketed list"))?;
    let parts: Vec<&str> = inner.split(',').collect();
    if parts.len() < 2 || parts.len() > 3 {
        return Err(format!(
            "pose {cell:?} has {} elements, expected 2 or 3",
            parts.len()
        ));
    }
    Ok(Pose {
        x: parse_component(parts[0])?,
        y: parse_component(parts[1])?,
        heading: match parts.get(2) {
            Some(part) => parse_component(part)?,
            None => None,
        },
    })
}

/// Decode one recording file.
pub fn load_recording(path: impl AsRef<Path>) -> KinResult<Recording> {
    let path = path.as_ref();
    let decode_err = |row: usize, reason: String| KinematicsError::Decode {
        path: path.to_path_buf(),
        row,
        reason,
    };

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(open_reader(path)?);

    let headers = reader.headers()?.clone();
    let column = |name: &str| headers.iter().position(|h| h.trim() == name);
    let time_idx = column(TIME_COLUMN)
        .ok_or_else(|| decode_err(0, format!("missing `{TIME_COLUMN}` column")))?;
    let pose_idx = column(POSE_COLUMN)
        .ok_or_else(|| decode_err(0, format!("missing `{POSE_COLUMN}` column")))?;
    let stim_idx = column(STIMULUS_COLUMN);
    if stim_idx.is_none() {
        log::warn!(
            "{}: no `{STIMULUS_COLUMN}` column, recording has no stimulation events",
            path.display()
        );
    }

    let mut frames = Vec::new();
    for (row_idx, result) in reader.records().enumerate() {
        let row = row_idx + 1;
        let record = result?;
        let time_cell = record
            .get(time_idx)
            .ok_or_else(|| decode_err(row, "missing time cell".to_string()))?;
        let time: f64 = time_cell
            .trim()
            .parse()
            .map_err(|_| decode_err(row, format!("invalid time {time_cell:?}")))?;
        let pose = parse_pose(record.get(pose_idx).unwrap_or("")).map_err(|e| decode_err(row, e))?;
        let stimulus = stim_idx
            .and_then(|idx| record.get(idx))
            .and_then(StimulusKey::parse);
        frames.push(FrameRecord {
            time,
            pose,
            stimulus,
        });
    }

    Recording::new(path.display().to_string(), frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Side;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    const SAMPLE: &str = "time,pose,arduino_data\n\
        0.00,\"[10.0, 20.0, 0.5]\",\n\
        0.02,\"[11.0, None, 0.6]\",\"Right, 20\"\n\
        0.04,\"[None, None, None]\",garbage\n\
        0.06,\"[13.0, 23.0, None]\",\"Both, 50\"\n";

    #[test]
    fn test_parse_pose_variants() {
        assert_eq!(parse_pose("[1.5, -2, 0.25]").unwrap(), Pose::new(1.5, -2.0, 0.25));
        let pose = parse_pose("[None, 3.0, nan]").unwrap();
        assert_eq!(pose.x, None);
        assert_eq!(pose.y, Some(3.0));
        assert_eq!(pose.heading, None);
        assert!(parse_pose("None").unwrap().is_missing());
        assert!(parse_pose("").unwrap().is_missing());
        assert_eq!(parse_pose("(4, 5)").unwrap().heading, None);
    }

    #[test]
    fn test_parse_pose_rejects_garbage() {
        assert!(parse_pose("[1, 2, 3, 4]").is_err());
        assert!(parse_pose("1, 2, 3").is_err());
        assert!(parse_pose("[a, 2, 3]").is_err());
    }

    #[test]
    fn test_load_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trial.csv");
        fs::write(&path, SAMPLE).unwrap();

        let recording = load_recording(&path).unwrap();
        assert_eq!(recording.len(), 4);
        assert!((recording.fps - 50.0).abs() < 1e-6);
        assert_eq!(recording.frames[1].pose.y, None);
        assert_eq!(
            recording.frames[1].stimulus,
            Some(StimulusKey::new(Side::Right, 20))
        );
        // Malformed stimulation degrades to no stimulation
        assert_eq!(recording.frames[2].stimulus, None);
        assert!(recording.frames[2].pose.is_missing());
        assert_eq!(recording.stimulus_flags(), vec![false, true, false, true]);
    }

    #[test]
    fn test_load_gzip_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trial.csv.gz");
        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        encoder.write_all(SAMPLE.as_bytes()).unwrap();
        encoder.finish().unwrap();

        let recording = load_recording(&path).unwrap();
        assert_eq!(recording.len(), 4);
        assert_eq!(
            recording.frames[3].stimulus,
            Some(StimulusKey::new(Side::Both, 50))
        );
    }

    #[test]
    fn test_missing_pose_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        fs::write(&path, "time,arduino_data\n0.0,\n0.1,\n").unwrap();
        let err = load_recording(&path).unwrap_err();
        assert!(matches!(err, KinematicsError::Decode { row: 0, .. }));
    }

    #[test]
    fn test_bad_time_reports_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad_time.csv");
        fs::write(&path, "time,pose\n0.0,\"[1, 2, 3]\"\nsoon,\"[1, 2, 3]\"\n").unwrap();
        let err = load_recording(&path).unwrap_err();
        assert!(matches!(err, KinematicsError::Decode { row: 2, .. }));
    }

    #[test]
    fn test_find_recordings_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.csv", "a.csv.gz", "notes.txt", "c.json"] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        fs::create_dir(dir.path().join("nested.csv")).unwrap();
        let found: Vec<String> = find_recordings(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(found, vec!["a.csv.gz", "b.csv"]);
    }
}
