use std::collections::BTreeSet;

use nalgebra::{Point2, Vector2};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::GateConfig;
use crate::error::{Result, TrackError};
use crate::skeleton::Skeleton;
use crate::store::CountStore;
use crate::tracker::TrackWindows;
use crate::utils;

/// Direction of a gate crossing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossingEvent {
    /// From the right-hand side of the gate direction to the left-hand side
    Up,
    Down,
    Nothing,
}

/// One finite counting line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub start: Point2<f64>,
    pub end: Point2<f64>,
}

impl Edge {
    pub fn new(start: Point2<f64>, end: Point2<f64>) -> Self {
        Self { start, end }
    }

    /// Classify the movement `from -> to` against this edge.
    pub fn crossing(&self, from: &Point2<f64>, to: &Point2<f64>) -> CrossingEvent {
        if !utils::path_meets_segment(from, to, &self.start, &self.end) {
            return CrossingEvent::Nothing;
        }
        let from_above = utils::side_of(&self.start, &self.end, from) > 0.0;
        let to_above = utils::side_of(&self.start, &self.end, to) > 0.0;
        match (from_above, to_above) {
            (false, true) => CrossingEvent::Up,
            (true, false) => CrossingEvent::Down,
            _ => CrossingEvent::Nothing,
        }
    }
}

/// A single edge, or two parallel edges `width` apart that must agree.
#[derive(Debug, Clone, PartialEq)]
pub struct Gate {
    edges: Vec<Edge>,
}

impl Gate {
    pub fn new(start: Point2<f64>, end: Point2<f64>, width: f64) -> Result<Self> {
        if !width.is_finite() || width < 0.0 {
            return Err(TrackError::Config(format!("gate width must be >= 0, got {}", width)));
        }
        let dir = end - start;
        let len = dir.norm();
        if !(len > 0.0) {
            return Err(TrackError::Config("gate start and end must differ".into()));
        }

        if width == 0.0 {
            return Ok(Self { edges: vec![Edge::new(start, end)] });
        }

        let normal = Vector2::new(-dir.y, dir.x) / len;
        let offset = normal * (width * 0.5);
        Ok(Self {
            edges: vec![
                Edge::new(start - offset, end - offset),
                Edge::new(start + offset, end + offset),
            ],
        })
    }

    pub fn from_config(cfg: &GateConfig) -> Result<Self> {
        Self::new(
            Point2::new(cfg.start[0], cfg.start[1]),
            Point2::new(cfg.end[0], cfg.end[1]),
            cfg.width,
        )
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Event reported only when every edge reports the same one.
    pub fn crossing(&self, from: &Point2<f64>, to: &Point2<f64>) -> CrossingEvent {
        let mut events = self.edges.iter().map(|edge| edge.crossing(from, to));
        let Some(first) = events.next() else {
            return CrossingEvent::Nothing;
        };
        if events.all(|e| e == first) {
            first
        } else {
            CrossingEvent::Nothing
        }
    }
}

/// Snapshot of the running counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub up: u64,
    pub down: u64,
    pub static_up: u64,
    pub static_down: u64,
    pub dynamic_up: u64,
    pub dynamic_down: u64,
}

/// Counts tracks crossing a gate, split into a live part recomputed each frame
/// and a finalized part accumulated as tracks are lost.
#[derive(Debug, Clone)]
pub struct LineCounter {
    gate: Gate,
    static_up: u64,
    static_down: u64,
    dynamic_up: u64,
    dynamic_down: u64,
    /// Lost tracks already folded into the static counts
    finalized: BTreeSet<u64>,
}

impl LineCounter {
    pub fn new(gate: Gate) -> Self {
        Self {
            gate,
            static_up: 0,
            static_down: 0,
            dynamic_up: 0,
            dynamic_down: 0,
            finalized: BTreeSet::new(),
        }
    }

    pub fn gate(&self) -> &Gate {
        &self.gate
    }

    /// Fold one frame of tracker state into the counts. Call once per frame after tracking.
    pub fn update_count(&mut self, windows: &TrackWindows) {
        // An id leaves `lost` for good once it drops out of `back`
        self.finalized.retain(|id| windows.back.contains_key(id));

        self.dynamic_up = 0;
        self.dynamic_down = 0;
        for (id, current) in &windows.current {
            let Some(first) = windows.first.get(id) else {
                continue;
            };
            match self.judge(first, current) {
                CrossingEvent::Up => self.dynamic_up += 1,
                CrossingEvent::Down => self.dynamic_down += 1,
                CrossingEvent::Nothing => {}
            }
        }

        for id in &windows.lost {
            if !self.finalized.insert(*id) {
                continue;
            }
            let (Some(first), Some(back)) = (windows.first.get(id), windows.back.get(id)) else {
                continue;
            };
            match self.judge(first, back) {
                CrossingEvent::Up => {
                    self.static_up += 1;
                    info!("track {} finalized as up", id);
                }
                CrossingEvent::Down => {
                    self.static_down += 1;
                    info!("track {} finalized as down", id);
                }
                CrossingEvent::Nothing => {}
            }
        }
    }

    /// Take over counts recorded for the frame `windows` was loaded at.
    pub fn restore(&mut self, counts: &Counts, windows: &TrackWindows) {
        self.static_up = counts.static_up;
        self.static_down = counts.static_down;
        self.dynamic_up = counts.dynamic_up;
        self.dynamic_down = counts.dynamic_down;
        self.finalized = windows.lost.iter().copied().collect();
    }

    /// Counts for `frame`: read back if already recorded, otherwise computed and saved.
    pub fn record<C: CountStore>(
        &mut self,
        frame: u64,
        windows: &TrackWindows,
        store: &mut C,
    ) -> Result<Counts> {
        if let Some(saved) = store.counts_at(frame)? {
            debug!("counts for frame {} already recorded, restoring", frame);
            self.restore(&saved, windows);
            return Ok(saved);
        }
        self.update_count(windows);
        let counts = self.counts();
        store.save_counts(frame, &counts)?;
        Ok(counts)
    }

    fn judge(&self, from: &Skeleton, to: &Skeleton) -> CrossingEvent {
        match (from.centroid(), to.centroid()) {
            (Some(a), Some(b)) => self.gate.crossing(&a, &b),
            _ => CrossingEvent::Nothing,
        }
    }

    pub fn up_count(&self) -> u64 {
        self.static_up + self.dynamic_up
    }

    pub fn down_count(&self) -> u64 {
        self.static_down + self.dynamic_down
    }

    pub fn counts(&self) -> Counts {
        Counts {
            up: self.up_count(),
            down: self.down_count(),
            static_up: self.static_up,
            static_down: self.static_down,
            dynamic_up: self.dynamic_up,
            dynamic_down: self.dynamic_down,
        }
    }
}
