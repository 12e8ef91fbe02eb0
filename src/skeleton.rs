use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackError};
use crate::utils;

/// A single joint detection in pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Joint {
    pub x: f32,
    pub y: f32,
    /// 0.0 means the joint was not observed
    pub confidence: f32,
}

impl Joint {
    pub fn new(x: f32, y: f32, confidence: f32) -> Self {
        Self { x, y, confidence }
    }

    pub fn position(&self) -> Point2<f32> {
        Point2::new(self.x, self.y)
    }

    pub fn is_observed(&self) -> bool {
        self.confidence != 0.0
    }

    pub fn is_trusted(&self, threshold: f32) -> bool {
        self.confidence > threshold
    }
}

/// One person's joints for one frame. Index `i` always names the same body part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Skeleton {
    joints: Vec<Joint>,
}

impl Skeleton {
    pub fn new(joints: Vec<Joint>) -> Self {
        Self { joints }
    }

    /// Build from a flat `[x0, y0, c0, x1, y1, c1, ...]` keypoint array.
    pub fn from_flat(values: &[f32]) -> Result<Self> {
        if values.len() % 3 != 0 {
            return Err(TrackError::Parse(format!(
                "keypoint array length {} is not a multiple of 3",
                values.len()
            )));
        }
        let joints = values
            .chunks_exact(3)
            .map(|c| Joint::new(c[0], c[1], c[2]))
            .collect();
        Ok(Self { joints })
    }

    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    pub fn len(&self) -> usize {
        self.joints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    /// Number of joints whose confidence is strictly above `threshold`.
    pub fn trusted_count(&self, threshold: f32) -> usize {
        self.joints.iter().filter(|j| j.is_trusted(threshold)).count()
    }

    /// Confidence-weighted centroid of all observed joints.
    ///
    /// Returns a zero-confidence joint when nothing was observed, meaning
    /// "no reliable position".
    pub fn average(&self) -> Joint {
        let mut x = 0.0f32;
        let mut y = 0.0f32;
        let mut weight = 0.0f32;
        for joint in self.joints.iter().filter(|j| j.is_observed()) {
            x += joint.x * joint.confidence;
            y += joint.y * joint.confidence;
            weight += joint.confidence;
        }
        if weight == 0.0 {
            return Joint::default();
        }
        Joint::new(x / weight, y / weight, 1.0)
    }

    /// Centroid as a point, or `None` for the no-position sentinel.
    pub fn centroid(&self) -> Option<Point2<f64>> {
        let avg = self.average();
        avg.is_observed()
            .then(|| Point2::new(f64::from(avg.x), f64::from(avg.y)))
    }

    /// Mean displacement over joints trusted in both skeletons.
    ///
    /// `None` when no joint index is trusted on both sides or the mean is not finite;
    /// such a pair is never matched.
    pub fn distance(&self, other: &Skeleton, threshold: f32) -> Option<f32> {
        let mut total = 0.0f32;
        let mut samples = 0usize;
        for (a, b) in self.joints.iter().zip(other.joints.iter()) {
            if !a.is_trusted(threshold) || !b.is_trusted(threshold) {
                continue;
            }
            total += utils::point_distance(&a.position(), &b.position());
            samples += 1;
        }
        if samples == 0 {
            return None;
        }
        let mean = total / samples as f32;
        mean.is_finite().then_some(mean)
    }
}
