//! Error types for tracking and counting

use thiserror::Error;

/// Result type for tracker, counter and store operations
pub type Result<T> = std::result::Result<T, TrackError>;

#[derive(Error, Debug)]
pub enum TrackError {
    /// A skeleton does not carry the configured number of joints
    #[error("skeleton has {found} joints, expected {expected}")]
    SkeletonLength { expected: usize, found: usize },

    /// A new frame arrived after a later one was already processed
    #[error("frame {frame} arrived after frame {last}")]
    NonMonotonicFrame { frame: u64, last: u64 },

    #[error("invalid configuration: {0}")]
    Config(String),

    /// The store already holds this (frame, track) pair
    #[error("track {track_id} already assigned at frame {frame}")]
    DuplicateAssignment { frame: u64, track_id: u64 },

    #[error("counts already recorded for frame {frame}")]
    DuplicateCounts { frame: u64 },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed pose input
    #[error("parse error: {0}")]
    Parse(String),
}

impl TrackError {
    /// Store failures leave committed frames intact, so the same frame may be retried.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            TrackError::DuplicateAssignment { .. }
                | TrackError::DuplicateCounts { .. }
                | TrackError::Database(_)
                | TrackError::Serialization(_)
                | TrackError::Io(_)
        )
    }
}
