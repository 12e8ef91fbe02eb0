use serde::{Deserialize, Serialize};
use std::fs;

use crate::counter::Gate;
use crate::error::{Result, TrackError};

/// Identity tracker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Joints at or below this confidence are untrusted
    pub confidence_threshold: f32,
    /// Minimum trusted joints for a skeleton to be tracked at all
    pub nodes_to_trust: usize,
    /// Loss window length in frames
    pub frames_to_lost: u64,
    /// Max mean joint displacement (pixels) to accept as the same person
    pub distance_threshold: f32,
    /// Joints per skeleton (25 for BODY_25)
    pub joint_count: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            nodes_to_trust: 5,
            frames_to_lost: 10,
            distance_threshold: 50.0,
            joint_count: 25,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.frames_to_lost == 0 {
            return Err(TrackError::Config("frames_to_lost must be at least 1".into()));
        }
        if !(self.distance_threshold > 0.0) {
            return Err(TrackError::Config(format!(
                "distance_threshold must be positive, got {}",
                self.distance_threshold
            )));
        }
        if self.joint_count == 0 {
            return Err(TrackError::Config("joint_count must be at least 1".into()));
        }
        if !self.confidence_threshold.is_finite() {
            return Err(TrackError::Config("confidence_threshold must be finite".into()));
        }
        Ok(())
    }
}

/// Counting gate: a line from `start` to `end`, doubled into two parallel edges when `width > 0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub start: [f64; 2],
    pub end: [f64; 2],
    pub width: f64,
}

impl GateConfig {
    /// Zero-length gates and negative widths are rejected.
    pub fn validate(&self) -> Result<()> {
        Gate::from_config(self).map(|_| ())
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            start: [10.0, 10.0],
            end: [300.0, 200.0],
            width: 10.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tracker: TrackerConfig,
    pub gate: GateConfig,
}

impl Config {
    /// Load from a JSON file.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)?;
        let cfg: Config = serde_json::from_str(&data)?;
        cfg.tracker.validate()?;
        cfg.gate.validate()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_file_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "tracker": {{ "distance_threshold": 80.0 }}, "gate": {{ "width": 0.0 }} }}"#
        )
        .unwrap();

        let cfg = Config::from_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(cfg.tracker.distance_threshold, 80.0);
        assert_eq!(cfg.tracker.frames_to_lost, 10);
        assert_eq!(cfg.tracker.joint_count, 25);
        assert_eq!(cfg.gate.width, 0.0);
        assert_eq!(cfg.gate.end, [300.0, 200.0]);
    }

    #[test]
    fn test_invalid_tracker_config() {
        let mut cfg = TrackerConfig::default();
        assert!(cfg.validate().is_ok());
        cfg.frames_to_lost = 0;
        assert!(cfg.validate().is_err());

        let cfg = TrackerConfig { distance_threshold: 0.0, ..Default::default() };
        assert!(matches!(cfg.validate(), Err(TrackError::Config(_))));
    }

    #[test]
    fn test_invalid_gate_rejected_on_load() {
        for gate in [
            r#"{ "start": [5.0, 5.0], "end": [5.0, 5.0] }"#,
            r#"{ "width": -2.0 }"#,
        ] {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            write!(file, r#"{{ "gate": {} }}"#, gate).unwrap();
            assert!(Config::from_file(file.path().to_str().unwrap()).is_err());
        }
        assert!(GateConfig::default().validate().is_ok());
    }

    #[test]
    fn test_missing_file() {
        assert!(Config::from_file("/nonexistent/posetrack.json").is_err());
    }
}
