use serde::Serialize;

use crate::error::Result;
use crate::skeleton::{Joint, Skeleton};
use crate::store::TrackStore;

/// One persisted observation of a track.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackRecord {
    pub frame: u64,
    pub skeleton: Skeleton,
}

/// A persistent identity and its full history, ordered by frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Track {
    pub id: u64,
    pub history: Vec<TrackRecord>,
}

impl Track {
    pub fn load<S: TrackStore>(store: &S, id: u64) -> Result<Self> {
        let history = store
            .history(id)?
            .into_iter()
            .map(|(frame, skeleton)| TrackRecord { frame, skeleton })
            .collect();
        Ok(Self { id, history })
    }

    pub fn first_frame(&self) -> Option<u64> {
        self.history.first().map(|r| r.frame)
    }

    pub fn last_frame(&self) -> Option<u64> {
        self.history.last().map(|r| r.frame)
    }

    /// Copy of this track with unobserved joints filled in.
    ///
    /// Per joint index, a zero-confidence record between two observed ones is
    /// interpolated linearly by frame number (position and confidence). Records
    /// before the first observation copy it, records after the last copy that.
    /// A joint never observed on this track is left as is.
    pub fn interpolated(&self) -> Track {
        let rows: Vec<Vec<Joint>> = self
            .history
            .iter()
            .map(|r| r.skeleton.joints().to_vec())
            .collect();
        let mut filled = rows.clone();
        let joint_count = rows.iter().map(Vec::len).max().unwrap_or(0);

        for j in 0..joint_count {
            let observed: Vec<usize> = rows
                .iter()
                .enumerate()
                .filter(|(_, row)| row.get(j).map_or(false, Joint::is_observed))
                .map(|(k, _)| k)
                .collect();
            if observed.is_empty() {
                continue;
            }

            for (k, row) in filled.iter_mut().enumerate() {
                let Some(slot) = row.get_mut(j) else {
                    continue;
                };
                if slot.is_observed() {
                    continue;
                }
                // First observed record after k
                let split = observed.partition_point(|&o| o < k);
                let prev = split.checked_sub(1).map(|i| observed[i]);
                let next = observed.get(split).copied();
                *slot = match (prev, next) {
                    (Some(p), Some(q)) => self.lerp(&rows, j, p, q, k),
                    (Some(p), None) => rows[p][j],
                    (None, Some(q)) => rows[q][j],
                    (None, None) => continue,
                };
            }
        }

        let history = self
            .history
            .iter()
            .zip(filled)
            .map(|(r, joints)| TrackRecord { frame: r.frame, skeleton: Skeleton::new(joints) })
            .collect();
        Track { id: self.id, history }
    }

    fn lerp(&self, rows: &[Vec<Joint>], j: usize, p: usize, q: usize, k: usize) -> Joint {
        let (a, b) = (rows[p][j], rows[q][j]);
        let (fp, fq, fk) = (self.history[p].frame, self.history[q].frame, self.history[k].frame);
        let t = (fk - fp) as f32 / (fq - fp) as f32;
        Joint::new(
            a.x + (b.x - a.x) * t,
            a.y + (b.y - a.y) * t,
            a.confidence + (b.confidence - a.confidence) * t,
        )
    }
}
