//! The shared database handle.

use crate::table::Table;
use crate::transaction::{ReadTransaction, WriteTransaction};
use crate::types::TableKey;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Callback invoked with the new commit version after a successful commit.
pub(crate) type CommitObserver = Arc<dyn Fn(u64) + Send + Sync>;

/// The committed state of the database at one commit version.
///
/// Snapshots are cloned wholesale when a transaction begins; the tables
/// stored here are small metadata tables, so the clone is cheap and buys
/// snapshot isolation with no further coordination.
#[derive(Debug, Clone)]
pub(crate) struct Snapshot {
    pub version: u64,
    pub tables: BTreeMap<TableKey, Table>,
    pub by_name: BTreeMap<String, TableKey>,
    pub next_table: u32,
    pub next_col: u64,
}

impl Snapshot {
    pub(crate) fn new() -> Self {
        Self {
            version: 0,
            tables: BTreeMap::new(),
            by_name: BTreeMap::new(),
            next_table: 1,
            next_col: 1,
        }
    }
}

pub(crate) struct Inner {
    pub committed: RwLock<Snapshot>,
    pub write_lock: Arc<Mutex<()>>,
    pub observers: RwLock<Vec<CommitObserver>>,
}

/// A shared handle to an in-memory metadata database.
///
/// The handle is cheap to clone and safe to share across threads. Reads run
/// against an isolated snapshot; writes are serialized through a single
/// writer lock and assign strictly monotonic commit versions. A rolled-back
/// transaction consumes no version.
#[derive(Clone)]
pub struct Database {
    inner: Arc<Inner>,
}

impl Database {
    /// Creates a new empty database.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                committed: RwLock::new(Snapshot::new()),
                write_lock: Arc::new(Mutex::new(())),
                observers: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Begins a read transaction against the current committed snapshot.
    #[must_use]
    pub fn begin_read(&self) -> ReadTransaction {
        ReadTransaction::new(self.inner.committed.read().clone())
    }

    /// Begins a write transaction.
    ///
    /// Blocks until the single writer lock is available. The lock is held
    /// until the transaction is committed or dropped.
    #[must_use]
    pub fn begin_write(&self) -> WriteTransaction {
        let guard = self.inner.write_lock.lock_arc();
        let working = self.inner.committed.read().clone();
        WriteTransaction::new(Arc::clone(&self.inner), guard, working)
    }

    /// Returns the current committed version.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.committed.read().version
    }

    /// Registers a callback invoked with the new commit version after every
    /// successful commit.
    ///
    /// Observers run after the writer lock has been released, so they may
    /// freely begin new transactions.
    pub fn observe_commits(&self, observer: impl Fn(u64) + Send + Sync + 'static) {
        self.inner.observers.write().push(Arc::new(observer));
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("version", &self.version())
            .finish()
    }
}
