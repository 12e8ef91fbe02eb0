pub mod config;
pub mod counter;
pub mod error;
pub mod pose_input;
pub mod skeleton;
pub mod sqlite_store;
pub mod store;
pub mod track;
pub mod tracker;
pub mod utils;

// Re-export main types
pub use crate::config::{Config, GateConfig, TrackerConfig};
pub use crate::counter::{Counts, CrossingEvent, Gate, LineCounter};
pub use crate::error::{Result, TrackError};
pub use crate::skeleton::{Joint, Skeleton};
pub use crate::sqlite_store::SqliteStore;
pub use crate::store::{CountStore, MemoryStore, TrackStore};
pub use crate::track::Track;
pub use crate::tracker::{SkeletonTracker, TrackWindows};
