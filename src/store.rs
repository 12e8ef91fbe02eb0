//! Persistent track history.
//!
//! The tracker re-derives all of its windows from these queries every frame, so any
//! store that answers them consistently (read-your-writes) makes a run replayable.

use std::collections::{BTreeMap, BTreeSet};

use crate::counter::Counts;
use crate::error::{Result, TrackError};
use crate::skeleton::Skeleton;

/// Resolved `(frame, track id) -> skeleton` assignments.
pub trait TrackStore {
    /// Append one assignment. Fails if `(frame, track_id)` already exists.
    fn insert(&mut self, frame: u64, track_id: u64, skeleton: &Skeleton) -> Result<()>;

    /// Write a whole frame's assignments, all or nothing.
    fn commit_frame(&mut self, frame: u64, assignments: &[(u64, Skeleton)]) -> Result<()>;

    /// For each id with a record in `[lo, hi]`, its record from the highest frame in range.
    fn latest_in_range(&self, lo: i64, hi: i64) -> Result<BTreeMap<u64, Skeleton>>;

    /// For each id with a record in `[lo, hi]`, its lowest-frame record.
    fn earliest_in_range(&self, lo: i64, hi: i64) -> Result<BTreeMap<u64, Skeleton>>;

    /// Whether any assignment was committed at exactly `frame`.
    fn exists_at(&self, frame: u64) -> Result<bool>;

    /// Highest frame with a committed assignment.
    fn max_frame(&self) -> Result<Option<u64>>;

    /// Number of ids ever assigned.
    fn distinct_id_count(&self) -> Result<u64>;

    /// Every record of one track, ordered by frame.
    fn history(&self, track_id: u64) -> Result<Vec<(u64, Skeleton)>>;

    /// All ids ever assigned, ascending.
    fn track_ids(&self) -> Result<Vec<u64>>;
}

/// Per-frame crossing counts, so a replayed frame reports what was counted the first time.
pub trait CountStore {
    /// Record the counts after `frame`. Fails if that frame already has counts.
    fn save_counts(&mut self, frame: u64, counts: &Counts) -> Result<()>;

    fn counts_at(&self, frame: u64) -> Result<Option<Counts>>;
}

/// Clamp a signed query range to frame numbers. Negative lower bounds become 0;
/// a range lying entirely below 0 (or inverted) is empty.
pub(crate) fn frame_range(lo: i64, hi: i64) -> Option<(u64, u64)> {
    if hi < 0 {
        return None;
    }
    let lo = lo.max(0) as u64;
    let hi = hi as u64;
    (lo <= hi).then_some((lo, hi))
}

/// Reject assignment sets that repeat a track id within one frame.
pub(crate) fn check_unique(frame: u64, assignments: &[(u64, Skeleton)]) -> Result<()> {
    let mut seen = BTreeSet::new();
    for (track_id, _) in assignments {
        if !seen.insert(*track_id) {
            return Err(TrackError::DuplicateAssignment { frame, track_id: *track_id });
        }
    }
    Ok(())
}

/// In-process store for tests and runs that need no file on disk.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    frames: BTreeMap<u64, BTreeMap<u64, Skeleton>>,
    /// track id -> frame of its first record
    first_seen: BTreeMap<u64, u64>,
    counts: BTreeMap<u64, Counts>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of persisted records.
    pub fn len(&self) -> usize {
        self.frames.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    fn contains(&self, frame: u64, track_id: u64) -> bool {
        self.frames
            .get(&frame)
            .map_or(false, |row| row.contains_key(&track_id))
    }

    fn put(&mut self, frame: u64, track_id: u64, skeleton: Skeleton) {
        self.frames.entry(frame).or_default().insert(track_id, skeleton);
        let first = self.first_seen.entry(track_id).or_insert(frame);
        *first = (*first).min(frame);
    }
}

impl TrackStore for MemoryStore {
    fn insert(&mut self, frame: u64, track_id: u64, skeleton: &Skeleton) -> Result<()> {
        if self.contains(frame, track_id) {
            return Err(TrackError::DuplicateAssignment { frame, track_id });
        }
        self.put(frame, track_id, skeleton.clone());
        Ok(())
    }

    fn commit_frame(&mut self, frame: u64, assignments: &[(u64, Skeleton)]) -> Result<()> {
        check_unique(frame, assignments)?;
        if let Some((track_id, _)) = assignments.iter().find(|(id, _)| self.contains(frame, *id)) {
            return Err(TrackError::DuplicateAssignment { frame, track_id: *track_id });
        }
        for (track_id, skeleton) in assignments {
            self.put(frame, *track_id, skeleton.clone());
        }
        Ok(())
    }

    fn latest_in_range(&self, lo: i64, hi: i64) -> Result<BTreeMap<u64, Skeleton>> {
        let mut latest = BTreeMap::new();
        if let Some((lo, hi)) = frame_range(lo, hi) {
            // Ascending frames, so later records overwrite earlier ones
            for row in self.frames.range(lo..=hi).map(|(_, row)| row) {
                for (id, skeleton) in row {
                    latest.insert(*id, skeleton.clone());
                }
            }
        }
        Ok(latest)
    }

    fn earliest_in_range(&self, lo: i64, hi: i64) -> Result<BTreeMap<u64, Skeleton>> {
        let mut earliest = BTreeMap::new();
        let Some((lo, hi)) = frame_range(lo, hi) else {
            return Ok(earliest);
        };
        let ids: BTreeSet<u64> = self
            .frames
            .range(lo..=hi)
            .flat_map(|(_, row)| row.keys().copied())
            .collect();
        for id in ids {
            let skeleton = self
                .first_seen
                .get(&id)
                .and_then(|frame| self.frames.get(frame))
                .and_then(|row| row.get(&id));
            if let Some(skeleton) = skeleton {
                earliest.insert(id, skeleton.clone());
            }
        }
        Ok(earliest)
    }

    fn exists_at(&self, frame: u64) -> Result<bool> {
        Ok(self.frames.get(&frame).map_or(false, |row| !row.is_empty()))
    }

    fn max_frame(&self) -> Result<Option<u64>> {
        Ok(self.frames.keys().next_back().copied())
    }

    fn distinct_id_count(&self) -> Result<u64> {
        Ok(self.first_seen.len() as u64)
    }

    fn history(&self, track_id: u64) -> Result<Vec<(u64, Skeleton)>> {
        Ok(self
            .frames
            .iter()
            .filter_map(|(frame, row)| row.get(&track_id).map(|s| (*frame, s.clone())))
            .collect())
    }

    fn track_ids(&self) -> Result<Vec<u64>> {
        Ok(self.first_seen.keys().copied().collect())
    }
}

impl CountStore for MemoryStore {
    fn save_counts(&mut self, frame: u64, counts: &Counts) -> Result<()> {
        if self.counts.contains_key(&frame) {
            return Err(TrackError::DuplicateCounts { frame });
        }
        self.counts.insert(frame, *counts);
        Ok(())
    }

    fn counts_at(&self, frame: u64) -> Result<Option<Counts>> {
        Ok(self.counts.get(&frame).copied())
    }
}
