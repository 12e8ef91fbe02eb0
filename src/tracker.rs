use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, warn};

use crate::config::TrackerConfig;
use crate::error::{Result, TrackError};
use crate::skeleton::Skeleton;
use crate::store::TrackStore;

/// Per-frame views of the track history, re-derived from the store on every call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackWindows {
    /// Latest skeleton per track within `[f - (L-1), f]`
    pub current: BTreeMap<u64, Skeleton>,
    /// Latest skeleton per track within `[f - L, f - 1]`
    pub back: BTreeMap<u64, Skeleton>,
    /// First observation of every track with a record in `[f - L, f]`
    pub first: BTreeMap<u64, Skeleton>,
    /// Tracks in `back` but not in `current`: dropping out this frame
    pub lost: Vec<u64>,
}

impl TrackWindows {
    fn load<S: TrackStore>(store: &S, frame: u64, frames_to_lost: u64) -> Result<Self> {
        let f = frame as i64;
        let l = frames_to_lost as i64;

        let back = store.latest_in_range(f - l, f - 1)?;
        let current = store.latest_in_range(f - (l - 1), f)?;
        let first = store.earliest_in_range(f - l, f)?;
        let lost = back
            .keys()
            .filter(|id| !current.contains_key(id))
            .copied()
            .collect();

        Ok(Self { current, back, first, lost })
    }
}

/// Re-identifies skeletons across frames by greedy nearest-neighbour matching
/// against the previous loss window, persisting every resolved assignment.
pub struct SkeletonTracker<S: TrackStore> {
    config: TrackerConfig,
    store: S,
    windows: TrackWindows,
    /// Highest frame handled so far
    last_frame: Option<u64>,
}

impl<S: TrackStore> SkeletonTracker<S> {
    /// Frames already in `store` count as handled, so a resumed run cannot write behind them.
    pub fn new(config: TrackerConfig, store: S) -> Result<Self> {
        config.validate()?;
        let last_frame = store.max_frame()?;
        if let Some(last) = last_frame {
            info!("resuming after committed frame {}", last);
        }
        Ok(Self {
            config,
            store,
            windows: TrackWindows::default(),
            last_frame,
        })
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// For writes that ride alongside the track history, such as per-frame counts.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Windows computed by the last `track` call
    pub fn windows(&self) -> &TrackWindows {
        &self.windows
    }

    /// Tracks active as of the last `track` call
    pub fn current(&self) -> &BTreeMap<u64, Skeleton> {
        &self.windows.current
    }

    /// Resolve one frame's skeletons to track ids and return the current window.
    ///
    /// Frames already committed to the store are replayed without recomputation.
    pub fn track(&mut self, observation: &[Skeleton], frame: u64) -> Result<&BTreeMap<u64, Skeleton>> {
        self.check_input(observation, frame)?;

        self.windows = TrackWindows::load(&self.store, frame, self.config.frames_to_lost)?;

        if self.store.exists_at(frame)? {
            debug!("frame {} already committed, replaying", frame);
        } else {
            let assignments = self.assign(observation)?;
            if !assignments.is_empty() {
                self.store.commit_frame(frame, &assignments)?;
            }
            self.windows = TrackWindows::load(&self.store, frame, self.config.frames_to_lost)?;
        }

        for id in &self.windows.lost {
            debug!("track {} lost at frame {}", id, frame);
        }

        self.last_frame = Some(self.last_frame.map_or(frame, |last| last.max(frame)));
        Ok(&self.windows.current)
    }

    /// Fail fast on caller bugs before anything is read or written.
    fn check_input(&self, observation: &[Skeleton], frame: u64) -> Result<()> {
        let expected = self.config.joint_count;
        if let Some(bad) = observation.iter().find(|s| s.len() != expected) {
            return Err(TrackError::SkeletonLength { expected, found: bad.len() });
        }

        if i64::try_from(frame).is_err() {
            return Err(TrackError::Config(format!("frame {} exceeds {}", frame, i64::MAX)));
        }

        if let Some(last) = self.last_frame {
            // Behind the history only a replay is allowed: a committed frame, or one with nothing to commit
            if frame < last && !self.store.exists_at(frame)? && self.has_trusted(observation) {
                return Err(TrackError::NonMonotonicFrame { frame, last });
            }
            if frame > last + 1 {
                warn!("frame gap: jumped from {} to {}", last, frame);
            }
        }
        Ok(())
    }

    fn has_trusted(&self, observation: &[Skeleton]) -> bool {
        observation
            .iter()
            .any(|s| s.trusted_count(self.config.confidence_threshold) >= self.config.nodes_to_trust)
    }

    /// Greedy first-come-first-served assignment in input order.
    fn assign(&self, observation: &[Skeleton]) -> Result<Vec<(u64, Skeleton)>> {
        let mut next_id = self.store.distinct_id_count()?;
        let mut claimed = BTreeSet::new();
        let mut assignments = Vec::with_capacity(observation.len());

        for skeleton in observation {
            let trusted = skeleton.trusted_count(self.config.confidence_threshold);
            if trusted < self.config.nodes_to_trust {
                debug!(
                    "skipping skeleton with {} trusted joints (need {})",
                    trusted, self.config.nodes_to_trust
                );
                continue;
            }

            let track_id = match self.nearest_back_track(skeleton, &claimed) {
                Some((id, distance)) => {
                    debug!("matched track {} at distance {:.1}", id, distance);
                    id
                }
                None => {
                    let id = next_id;
                    next_id += 1;
                    info!("new track {}", id);
                    id
                }
            };

            claimed.insert(track_id);
            assignments.push((track_id, skeleton.clone()));
        }

        Ok(assignments)
    }

    /// Closest unclaimed back-window track under the distance threshold. Ties keep the lower id.
    fn nearest_back_track(&self, skeleton: &Skeleton, claimed: &BTreeSet<u64>) -> Option<(u64, f32)> {
        let mut best: Option<(u64, f32)> = None;
        for (id, back) in &self.windows.back {
            if claimed.contains(id) {
                continue;
            }
            let Some(distance) = back.distance(skeleton, self.config.confidence_threshold) else {
                continue;
            };
            if distance >= self.config.distance_threshold {
                continue;
            }
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((*id, distance));
            }
        }
        best
    }
}
