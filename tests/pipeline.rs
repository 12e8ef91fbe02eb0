use posetrack::{
    CountStore, Gate, Joint, LineCounter, MemoryStore, Skeleton, SkeletonTracker, SqliteStore, TrackStore,
    TrackerConfig,
};
use nalgebra::Point2;

fn person(x: f32, y: f32) -> Skeleton {
    Skeleton::new(vec![Joint::new(x, y, 0.9); 25])
}

/// Frames 0..=20: one person walks down across y = 100, another walks up.
fn walkers(frame: u64) -> Vec<Skeleton> {
    if frame > 20 {
        return Vec::new();
    }
    let f = frame as f32;
    vec![person(100.0, 50.0 + 5.0 * f), person(300.0, 150.0 - 5.5 * f)]
}

fn gate() -> Gate {
    Gate::new(Point2::new(0.0, 100.0), Point2::new(400.0, 100.0), 10.0).unwrap()
}

fn run_scenario<S: TrackStore>(store: S) -> S {
    let mut tracker = SkeletonTracker::new(TrackerConfig::default(), store).unwrap();
    let mut counter = LineCounter::new(gate());

    for frame in 0..=40u64 {
        tracker.track(&walkers(frame), frame).unwrap();
        counter.update_count(tracker.windows());

        let counts = counter.counts();
        match frame {
            20..=29 => {
                assert_eq!((counts.dynamic_up, counts.dynamic_down), (1, 1), "frame {}", frame);
                assert_eq!((counts.static_up, counts.static_down), (0, 0), "frame {}", frame);
            }
            30..=40 => {
                assert_eq!((counts.dynamic_up, counts.dynamic_down), (0, 0), "frame {}", frame);
                assert_eq!((counts.static_up, counts.static_down), (1, 1), "frame {}", frame);
            }
            _ => {}
        }
        if frame >= 20 {
            assert_eq!((counter.up_count(), counter.down_count()), (1, 1), "frame {}", frame);
        }
    }

    // A newcomer long after both walkers aged out gets a fresh id
    let current = tracker.track(&[person(100.0, 50.0)], 41).unwrap();
    assert_eq!(current.keys().copied().collect::<Vec<_>>(), vec![2]);
    tracker.into_store()
}

#[test]
fn test_memory_pipeline() {
    let store = run_scenario(MemoryStore::new());
    assert_eq!(store.distinct_id_count().unwrap(), 3);
    assert_eq!(store.len(), 21 * 2 + 1);
}

#[test]
fn test_sqlite_pipeline() {
    let store = run_scenario(SqliteStore::in_memory().unwrap());
    assert_eq!(store.distinct_id_count().unwrap(), 3);
    assert_eq!(store.history(0).unwrap().len(), 21);
}

#[test]
fn test_resume_from_file_replays_committed_frames() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tracks.sqlite3");

    let mut first_run = Vec::new();
    {
        let mut tracker = SkeletonTracker::new(TrackerConfig::default(), SqliteStore::open(&path).unwrap()).unwrap();
        for frame in 0..10 {
            first_run.push(tracker.track(&walkers(frame), frame).unwrap().clone());
        }
    }

    // Second process replays the same frames, then carries on
    let mut tracker = SkeletonTracker::new(TrackerConfig::default(), SqliteStore::open(&path).unwrap()).unwrap();
    for frame in 0..10 {
        let current = tracker.track(&walkers(frame), frame).unwrap();
        assert_eq!(current, &first_run[frame as usize]);
    }
    let current = tracker.track(&walkers(10), 10).unwrap();
    assert_eq!(current.keys().copied().collect::<Vec<_>>(), vec![0, 1]);
    assert_eq!(tracker.store().distinct_id_count().unwrap(), 2);
    assert_eq!(tracker.store().history(1).unwrap().len(), 11);
}

#[test]
fn test_resumed_count_restores_recorded_counts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tracks.sqlite3");

    {
        let mut tracker = SkeletonTracker::new(TrackerConfig::default(), SqliteStore::open(&path).unwrap()).unwrap();
        let mut counter = LineCounter::new(gate());
        for frame in 0..=25u64 {
            tracker.track(&walkers(frame), frame).unwrap();
            let windows = tracker.windows().clone();
            counter.record(frame, &windows, tracker.store_mut()).unwrap();
        }
    }

    let mut tracker = SkeletonTracker::new(TrackerConfig::default(), SqliteStore::open(&path).unwrap()).unwrap();
    let mut counter = LineCounter::new(gate());
    for frame in 0..=40u64 {
        tracker.track(&walkers(frame), frame).unwrap();
        let windows = tracker.windows().clone();
        let counts = counter.record(frame, &windows, tracker.store_mut()).unwrap();
        assert_eq!(Some(counts), tracker.store().counts_at(frame).unwrap(), "frame {}", frame);
        if frame >= 20 {
            assert_eq!((counts.up, counts.down), (1, 1), "frame {}", frame);
        }
    }
    let counts = counter.counts();
    assert_eq!((counts.static_up, counts.static_down), (1, 1));
    assert_eq!((counts.dynamic_up, counts.dynamic_down), (0, 0));
}
