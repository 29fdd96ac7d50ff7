//! # ValocracyDB: Persistent Storage Engine
//!
//! The persistence layer for a Valocracy deployment, built on sled's
//! embedded key-value store.
//!
//! ## Tree Layout
//!
//! | Tree       | Key                | Value                          |
//! |------------|--------------------|--------------------------------|
//! | `snapshot` | `latest`           | `bincode(snapshot)`            |
//! | `events`   | `sequence` (8B BE) | `bincode(event record)`        |
//! | `metadata` | key (UTF-8)        | value (bytes)                  |
//!
//! Sequences are stored as big-endian u64 so that sled's lexicographic
//! ordering matches numeric ordering and journal range scans work naturally.
//!
//! ## Atomicity
//!
//! A committed transaction produces a new snapshot and zero or more events.
//! [`ValocracyDB::commit`] writes all of them, plus the last-sequence marker,
//! inside one multi-tree sled transaction. Either everything lands on disk or
//! nothing does.

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Transactional, Tree};
use std::path::Path;

use crate::config::SNAPSHOT_VERSION;

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("corrupt database: {0}")]
    Corrupt(String),

    #[error("snapshot version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
}

pub type DbResult<T> = Result<T, DbError>;

/// Anything persisted into the event journal carries its own sequence number.
pub trait Sequenced {
    /// Position of this record in the journal. Strictly increasing.
    fn sequence(&self) -> u64;
}

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

const SNAPSHOT_KEY: &[u8] = b"latest";
const META_LAST_SEQUENCE: &[u8] = b"last_sequence";
const META_SNAPSHOT_VERSION: &[u8] = b"snapshot_version";

// ---------------------------------------------------------------------------
// ValocracyDB
// ---------------------------------------------------------------------------

/// Persistent storage for a deployment snapshot and its event journal.
///
/// Cheap to clone; sled handles are reference counted and safe to share
/// across threads.
#[derive(Debug, Clone)]
pub struct ValocracyDB {
    db: Db,
    snapshot: Tree,
    events: Tree,
    metadata: Tree,
}

impl ValocracyDB {
    /// Open or create a database at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Create a temporary database that is removed when dropped.
    pub fn open_temporary() -> DbResult<Self> {
        let config = sled::Config::new().temporary(true);
        let db = config.open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> DbResult<Self> {
        let snapshot = db.open_tree("snapshot")?;
        let events = db.open_tree("events")?;
        let metadata = db.open_tree("metadata")?;

        Ok(Self {
            db,
            snapshot,
            events,
            metadata,
        })
    }

    /// Returns `true` once a snapshot has been committed.
    pub fn is_initialized(&self) -> DbResult<bool> {
        Ok(self.snapshot.contains_key(SNAPSHOT_KEY)?)
    }

    /// Atomically persist a snapshot together with the events that produced it.
    ///
    /// Events must be in ascending sequence order. The last-sequence marker is
    /// only advanced when `events` is non-empty.
    pub fn commit<S, E>(&self, snapshot: &S, events: &[E]) -> DbResult<()>
    where
        S: Serialize,
        E: Serialize + Sequenced,
    {
        let snapshot_bytes =
            bincode::serialize(snapshot).map_err(|e| DbError::Serialization(e.to_string()))?;

        let mut encoded = Vec::with_capacity(events.len());
        for event in events {
            let bytes =
                bincode::serialize(event).map_err(|e| DbError::Serialization(e.to_string()))?;
            encoded.push((event.sequence().to_be_bytes().to_vec(), bytes));
        }
        let last_sequence = events.last().map(|e| e.sequence().to_be_bytes().to_vec());
        let version = SNAPSHOT_VERSION.to_be_bytes().to_vec();

        let result = (&self.snapshot, &self.events, &self.metadata).transaction(
            |(snapshot, journal, metadata)| {
                snapshot.insert(SNAPSHOT_KEY, snapshot_bytes.as_slice())?;
                for (key, value) in &encoded {
                    journal.insert(key.as_slice(), value.as_slice())?;
                }
                if let Some(seq) = &last_sequence {
                    metadata.insert(META_LAST_SEQUENCE, seq.as_slice())?;
                }
                metadata.insert(META_SNAPSHOT_VERSION, version.as_slice())?;
                Ok::<(), ConflictableTransactionError<()>>(())
            },
        );

        match result {
            Ok(()) => {}
            Err(TransactionError::Storage(e)) => return Err(DbError::Sled(e)),
            Err(TransactionError::Abort(())) => {
                return Err(DbError::Corrupt("commit transaction aborted".into()))
            }
        }

        self.db.flush()?;
        tracing::debug!(events = events.len(), "snapshot committed");
        Ok(())
    }

    /// Load the latest committed snapshot, if any.
    pub fn load_snapshot<S: DeserializeOwned>(&self) -> DbResult<Option<S>> {
        if let Some(raw) = self.metadata.get(META_SNAPSHOT_VERSION)? {
            let found = u32::from_be_bytes(
                raw.as_ref()
                    .try_into()
                    .map_err(|_| DbError::Corrupt("invalid snapshot version bytes".into()))?,
            );
            if found != SNAPSHOT_VERSION {
                return Err(DbError::VersionMismatch {
                    expected: SNAPSHOT_VERSION,
                    found,
                });
            }
        }

        match self.snapshot.get(SNAPSHOT_KEY)? {
            Some(bytes) => {
                let snapshot = bincode::deserialize(&bytes)
                    .map_err(|e| DbError::Serialization(e.to_string()))?;
                Ok(Some(snapshot))
            }
            None => Ok(None),
        }
    }

    /// Sequence number of the newest journal entry, if any.
    pub fn last_sequence(&self) -> DbResult<Option<u64>> {
        match self.metadata.get(META_LAST_SEQUENCE)? {
            Some(bytes) => Ok(Some(decode_sequence(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Journal entries with a sequence strictly greater than `after`,
    /// oldest first, at most `limit` of them.
    pub fn events_since<E: DeserializeOwned>(&self, after: u64, limit: usize) -> DbResult<Vec<E>> {
        let start = match after.checked_add(1) {
            Some(start) => start,
            None => return Ok(Vec::new()),
        };

        let mut out = Vec::new();
        for entry in self.events.range(start.to_be_bytes()..).take(limit) {
            let (_key, value) = entry?;
            let event =
                bincode::deserialize(&value).map_err(|e| DbError::Serialization(e.to_string()))?;
            out.push(event);
        }
        Ok(out)
    }

    /// Number of journal entries stored.
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Force a flush of all pending writes to disk.
    pub fn flush(&self) -> DbResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

fn decode_sequence(bytes: &[u8]) -> DbResult<u64> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| DbError::Corrupt("invalid sequence bytes".into()))?;
    Ok(u64::from_be_bytes(raw))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::collections::BTreeMap;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Ledger {
        total: u64,
        holders: BTreeMap<String, u64>,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Entry {
        seq: u64,
        note: String,
    }

    impl Sequenced for Entry {
        fn sequence(&self) -> u64 {
            self.seq
        }
    }

    fn ledger(total: u64) -> Ledger {
        let mut holders = BTreeMap::new();
        holders.insert("alice".to_string(), total);
        Ledger { total, holders }
    }

    fn entries(range: std::ops::RangeInclusive<u64>) -> Vec<Entry> {
        range
            .map(|seq| Entry {
                seq,
                note: format!("event {seq}"),
            })
            .collect()
    }

    #[test]
    fn open_temporary_database() {
        let db = ValocracyDB::open_temporary().expect("should create temp db");
        assert!(!db.is_initialized().unwrap());
        assert_eq!(db.event_count(), 0);
        assert!(db.last_sequence().unwrap().is_none());
        assert!(db.load_snapshot::<Ledger>().unwrap().is_none());
    }

    #[test]
    fn commit_and_load_snapshot() {
        let db = ValocracyDB::open_temporary().unwrap();
        db.commit(&ledger(1000), &entries(1..=2)).unwrap();

        assert!(db.is_initialized().unwrap());
        let loaded: Ledger = db.load_snapshot().unwrap().expect("snapshot");
        assert_eq!(loaded, ledger(1000));
        assert_eq!(db.event_count(), 2);
        assert_eq!(db.last_sequence().unwrap(), Some(2));
    }

    #[test]
    fn commit_without_events_keeps_sequence() {
        let db = ValocracyDB::open_temporary().unwrap();
        db.commit(&ledger(1), &entries(1..=3)).unwrap();
        db.commit::<_, Entry>(&ledger(2), &[]).unwrap();

        assert_eq!(db.last_sequence().unwrap(), Some(3));
        let loaded: Ledger = db.load_snapshot().unwrap().unwrap();
        assert_eq!(loaded.total, 2);
    }

    #[test]
    fn events_since_returns_ordered_tail() {
        let db = ValocracyDB::open_temporary().unwrap();
        db.commit(&ledger(1), &entries(1..=5)).unwrap();
        db.commit(&ledger(2), &entries(6..=12)).unwrap();

        let all: Vec<Entry> = db.events_since(0, 100).unwrap();
        assert_eq!(all.len(), 12);
        assert!(all.windows(2).all(|w| w[0].seq < w[1].seq));

        let tail: Vec<Entry> = db.events_since(10, 100).unwrap();
        assert_eq!(tail.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![11, 12]);

        let limited: Vec<Entry> = db.events_since(0, 3).unwrap();
        assert_eq!(limited.len(), 3);
        assert_eq!(limited[2].seq, 3);

        let none: Vec<Entry> = db.events_since(u64::MAX, 10).unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn persisted_across_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        {
            let db = ValocracyDB::open(dir.path()).expect("should open db");
            db.commit(&ledger(500), &entries(1..=1)).unwrap();
        }

        let db = ValocracyDB::open(dir.path()).expect("should reopen db");
        let loaded: Ledger = db.load_snapshot().unwrap().expect("snapshot survives");
        assert_eq!(loaded.total, 500);
        assert_eq!(db.last_sequence().unwrap(), Some(1));
        let journal: Vec<Entry> = db.events_since(0, 10).unwrap();
        assert_eq!(journal[0].note, "event 1");
    }

    #[test]
    fn version_mismatch_is_reported() {
        let db = ValocracyDB::open_temporary().unwrap();
        db.commit(&ledger(1), &entries(1..=1)).unwrap();
        db.metadata
            .insert(META_SNAPSHOT_VERSION, &(SNAPSHOT_VERSION + 1).to_be_bytes()[..])
            .unwrap();

        let err = db.load_snapshot::<Ledger>().unwrap_err();
        assert!(matches!(err, DbError::VersionMismatch { .. }));
    }

    #[test]
    fn flush_does_not_error() {
        let db = ValocracyDB::open_temporary().unwrap();
        db.commit(&ledger(1), &entries(1..=1)).unwrap();
        db.flush().expect("flush should succeed");
    }
}
