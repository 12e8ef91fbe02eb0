//! Reading pose-estimator output written as OpenPose-style JSON, one file per frame.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Result, TrackError};
use crate::skeleton::Skeleton;

#[derive(Debug, Deserialize)]
struct PoseFrame {
    #[serde(default)]
    people: Vec<PosePerson>,
}

#[derive(Debug, Deserialize)]
struct PosePerson {
    /// Flat `[x, y, confidence, ...]` array
    #[serde(default)]
    pose_keypoints_2d: Vec<f32>,
}

/// Parse one frame. People without body keypoints are skipped.
pub fn parse_frame(json: &str) -> Result<Vec<Skeleton>> {
    let frame: PoseFrame = serde_json::from_str(json)?;
    frame
        .people
        .iter()
        .filter(|p| !p.pose_keypoints_2d.is_empty())
        .map(|p| Skeleton::from_flat(&p.pose_keypoints_2d))
        .collect()
}

pub fn read_frame<P: AsRef<Path>>(path: P) -> Result<Vec<Skeleton>> {
    let data = fs::read_to_string(path.as_ref())?;
    parse_frame(&data).map_err(|e| match e {
        TrackError::Parse(msg) => TrackError::Parse(format!("{}: {}", path.as_ref().display(), msg)),
        other => other,
    })
}

/// All `*.json` files in `dir`, sorted by file name. Position in the list is the frame number.
pub fn list_frames<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
    let mut frames = Vec::new();
    for entry in fs::read_dir(dir.as_ref())? {
        let path = entry?.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("json") {
            frames.push(path);
        }
    }
    frames.sort();
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame() {
        let json = r#"{
            "version": 1.3,
            "people": [
                { "person_id": [-1], "pose_keypoints_2d": [1.0, 2.0, 0.9, 3.0, 4.0, 0.0] },
                { "person_id": [-1], "pose_keypoints_2d": [] }
            ]
        }"#;
        let skeletons = parse_frame(json).unwrap();
        assert_eq!(skeletons.len(), 1);
        assert_eq!(skeletons[0].len(), 2);
        assert_eq!(skeletons[0].joints()[0].confidence, 0.9);
    }

    #[test]
    fn test_parse_empty_and_bad_frames() {
        assert!(parse_frame(r#"{ "people": [] }"#).unwrap().is_empty());
        assert!(parse_frame(r#"{}"#).unwrap().is_empty());
        assert!(matches!(
            parse_frame(r#"{ "people": [ { "pose_keypoints_2d": [1.0, 2.0] } ] }"#),
            Err(TrackError::Parse(_))
        ));
        assert!(matches!(parse_frame("not json"), Err(TrackError::Serialization(_))));
    }

    #[test]
    fn test_list_frames_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b_000001_keypoints.json", "b_000000_keypoints.json", "notes.txt"] {
            fs::write(dir.path().join(name), r#"{ "people": [] }"#).unwrap();
        }
        let frames = list_frames(dir.path()).unwrap();
        let names: Vec<_> = frames
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["b_000000_keypoints.json", "b_000001_keypoints.json"]);
    }
}
