//! SQLite-backed track store

use std::collections::BTreeMap;
use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::counter::Counts;
use crate::error::{Result, TrackError};
use crate::skeleton::Skeleton;
use crate::store::{check_unique, frame_range, CountStore, TrackStore};

const LATEST_SQL: &str = "SELECT t.people, t.skeleton FROM people_with_tracking t
     JOIN (SELECT people, MAX(frame) AS frame FROM people_with_tracking
           WHERE ?1 <= frame AND frame <= ?2 GROUP BY people) m
       ON t.people = m.people AND t.frame = m.frame";

const EARLIEST_SQL: &str = "SELECT t.people, t.skeleton FROM people_with_tracking t
     JOIN (SELECT people, MIN(frame) AS frame FROM people_with_tracking
           WHERE people IN (SELECT people FROM people_with_tracking WHERE ?1 <= frame AND frame <= ?2)
           GROUP BY people) m
       ON t.people = m.people AND t.frame = m.frame";

/// Track store persisted in a `people_with_tracking` table, with per-frame
/// counts in `people_count`.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) a database file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;",
        )?;
        debug!("opened track store at {:?}", path.as_ref());
        Self::with_connection(conn)
    }

    /// Create an in-memory database
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS people_with_tracking (
                frame INTEGER NOT NULL,
                people INTEGER NOT NULL,
                skeleton TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_tracking_frame ON people_with_tracking(frame);
            CREATE INDEX IF NOT EXISTS idx_tracking_people ON people_with_tracking(people);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_tracking_frame_people
                ON people_with_tracking(frame, people);
            CREATE TABLE IF NOT EXISTS people_count (
                frame INTEGER PRIMARY KEY,
                static_up INTEGER NOT NULL,
                static_down INTEGER NOT NULL,
                dynamic_up INTEGER NOT NULL,
                dynamic_down INTEGER NOT NULL
            );",
        )?;
        Ok(())
    }

    fn query_map(&self, sql: &str, lo: i64, hi: i64) -> Result<BTreeMap<u64, Skeleton>> {
        let mut out = BTreeMap::new();
        let Some((lo, hi)) = frame_range(lo, hi) else {
            return Ok(out);
        };
        let mut stmt = self.conn.prepare_cached(sql)?;
        let rows = stmt.query_map(params![lo as i64, hi as i64], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (id, json) = row?;
            out.insert(id as u64, serde_json::from_str(&json)?);
        }
        Ok(out)
    }
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation)
}

/// Map a unique-index violation to the domain error
fn duplicate_or(err: rusqlite::Error, frame: u64, track_id: u64) -> TrackError {
    if is_constraint_violation(&err) {
        TrackError::DuplicateAssignment { frame, track_id }
    } else {
        TrackError::Database(err)
    }
}

impl TrackStore for SqliteStore {
    fn insert(&mut self, frame: u64, track_id: u64, skeleton: &Skeleton) -> Result<()> {
        let json = serde_json::to_string(skeleton)?;
        self.conn
            .execute(
                "INSERT INTO people_with_tracking (frame, people, skeleton) VALUES (?1, ?2, ?3)",
                params![frame as i64, track_id as i64, json],
            )
            .map_err(|e| duplicate_or(e, frame, track_id))?;
        Ok(())
    }

    fn commit_frame(&mut self, frame: u64, assignments: &[(u64, Skeleton)]) -> Result<()> {
        check_unique(frame, assignments)?;
        // Dropping the transaction without commit rolls every insert back
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO people_with_tracking (frame, people, skeleton) VALUES (?1, ?2, ?3)",
            )?;
            for (track_id, skeleton) in assignments {
                let json = serde_json::to_string(skeleton)?;
                stmt.execute(params![frame as i64, *track_id as i64, json])
                    .map_err(|e| duplicate_or(e, frame, *track_id))?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn latest_in_range(&self, lo: i64, hi: i64) -> Result<BTreeMap<u64, Skeleton>> {
        self.query_map(LATEST_SQL, lo, hi)
    }

    fn earliest_in_range(&self, lo: i64, hi: i64) -> Result<BTreeMap<u64, Skeleton>> {
        self.query_map(EARLIEST_SQL, lo, hi)
    }

    fn exists_at(&self, frame: u64) -> Result<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM people_with_tracking WHERE frame = ?1 LIMIT 1",
                params![frame as i64],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn max_frame(&self) -> Result<Option<u64>> {
        let frame: Option<i64> =
            self.conn
                .query_row("SELECT MAX(frame) FROM people_with_tracking", [], |row| row.get(0))?;
        Ok(frame.map(|f| f as u64))
    }

    fn distinct_id_count(&self) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT people) FROM people_with_tracking",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn history(&self, track_id: u64) -> Result<Vec<(u64, Skeleton)>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT frame, skeleton FROM people_with_tracking WHERE people = ?1 ORDER BY frame ASC",
        )?;
        let rows = stmt.query_map(params![track_id as i64], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut history = Vec::new();
        for row in rows {
            let (frame, json) = row?;
            history.push((frame as u64, serde_json::from_str(&json)?));
        }
        Ok(history)
    }

    fn track_ids(&self) -> Result<Vec<u64>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT DISTINCT people FROM people_with_tracking ORDER BY people ASC")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .map(|id| id.map(|id| id as u64))
            .collect::<rusqlite::Result<Vec<u64>>>()?;
        Ok(ids)
    }
}

impl CountStore for SqliteStore {
    fn save_counts(&mut self, frame: u64, counts: &Counts) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO people_count (frame, static_up, static_down, dynamic_up, dynamic_down)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    frame as i64,
                    counts.static_up as i64,
                    counts.static_down as i64,
                    counts.dynamic_up as i64,
                    counts.dynamic_down as i64
                ],
            )
            .map_err(|e| {
                if is_constraint_violation(&e) {
                    TrackError::DuplicateCounts { frame }
                } else {
                    TrackError::Database(e)
                }
            })?;
        Ok(())
    }

    fn counts_at(&self, frame: u64) -> Result<Option<Counts>> {
        let row = self
            .conn
            .query_row(
                "SELECT static_up, static_down, dynamic_up, dynamic_down FROM people_count WHERE frame = ?1",
                params![frame as i64],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)? as u64,
                        row.get::<_, i64>(1)? as u64,
                        row.get::<_, i64>(2)? as u64,
                        row.get::<_, i64>(3)? as u64,
                    ))
                },
            )
            .optional()?;
        Ok(row.map(|(static_up, static_down, dynamic_up, dynamic_down)| Counts {
            up: static_up + dynamic_up,
            down: static_down + dynamic_down,
            static_up,
            static_down,
            dynamic_up,
            dynamic_down,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::tests::uniform;

    #[test]
    fn test_roundtrip_queries() {
        let mut store = SqliteStore::in_memory().unwrap();
        store.insert(0, 0, &uniform(3, 1.0, 0.0, 0.9)).unwrap();
        store.insert(1, 0, &uniform(3, 2.0, 0.0, 0.9)).unwrap();
        store.insert(2, 1, &uniform(3, 7.0, 0.0, 0.9)).unwrap();

        let latest = store.latest_in_range(0, 2).unwrap();
        assert_eq!(latest[&0].joints()[0].x, 2.0);
        assert_eq!(latest[&1].joints()[0].x, 7.0);

        let earliest = store.earliest_in_range(1, 2).unwrap();
        assert_eq!(earliest[&0].joints()[0].x, 1.0);
        assert_eq!(earliest.len(), 2);

        assert!(store.exists_at(1).unwrap());
        assert!(!store.exists_at(3).unwrap());
        assert_eq!(store.distinct_id_count().unwrap(), 2);
        assert_eq!(store.track_ids().unwrap(), vec![0, 1]);
        assert_eq!(store.history(0).unwrap().len(), 2);
        assert!(store.latest_in_range(-3, -1).unwrap().is_empty());
        assert_eq!(store.max_frame().unwrap(), Some(2));
    }

    #[test]
    fn test_empty_store_has_no_max_frame() {
        let store = SqliteStore::in_memory().unwrap();
        assert_eq!(store.max_frame().unwrap(), None);
    }

    #[test]
    fn test_counts_persist_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracks.sqlite3");
        let counts = Counts { up: 3, down: 2, static_up: 1, static_down: 2, dynamic_up: 2, dynamic_down: 0 };
        {
            let mut store = SqliteStore::open(&path).unwrap();
            store.save_counts(7, &counts).unwrap();
            let err = store.save_counts(7, &Counts::default()).unwrap_err();
            assert!(matches!(err, TrackError::DuplicateCounts { frame: 7 }));
        }
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.counts_at(7).unwrap(), Some(counts));
        assert_eq!(store.counts_at(8).unwrap(), None);
    }

    #[test]
    fn test_duplicate_insert() {
        let mut store = SqliteStore::in_memory().unwrap();
        store.insert(4, 2, &uniform(3, 1.0, 0.0, 0.9)).unwrap();
        let err = store.insert(4, 2, &uniform(3, 1.0, 0.0, 0.9)).unwrap_err();
        assert!(matches!(err, TrackError::DuplicateAssignment { frame: 4, track_id: 2 }));
    }

    #[test]
    fn test_commit_frame_rolls_back() {
        let mut store = SqliteStore::in_memory().unwrap();
        store.insert(3, 1, &uniform(3, 1.0, 0.0, 0.9)).unwrap();

        let batch = vec![(0, uniform(3, 0.0, 0.0, 0.9)), (1, uniform(3, 0.0, 0.0, 0.9))];
        assert!(store.commit_frame(3, &batch).is_err());
        // The insert of id 0 must have been rolled back
        assert_eq!(store.distinct_id_count().unwrap(), 1);
        assert!(store.history(0).unwrap().is_empty());
    }

    #[test]
    fn test_file_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracks.sqlite3");
        {
            let mut store = SqliteStore::open(&path).unwrap();
            store.commit_frame(0, &[(0, uniform(3, 5.0, 5.0, 0.9))]).unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert!(store.exists_at(0).unwrap());
        assert_eq!(store.history(0).unwrap()[0].1, uniform(3, 5.0, 5.0, 0.9));
    }
}
