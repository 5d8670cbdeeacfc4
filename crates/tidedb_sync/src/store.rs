//! The process-wide subscription store.

use crate::error::{SyncError, SyncResult};
use crate::mutable::MutableSubscriptionSet;
use crate::notification::{resolution_for, NotificationRequest, Resolution, StateNotification};
use crate::set::{SubscriptionSet, SubscriptionState};
use crate::subscription::Subscription;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Weak};
use tidedb_storage::{
    ColKey, ColumnSpec, ColumnType, Database, ReadTransaction, RowKey, StorageResult, TableKey,
    TableSpec, Value, WriteTransaction,
};
use tracing::debug;

const SUBSCRIPTIONS_TABLE: &str = "flx_subscriptions";
const SUBSCRIPTION_SETS_TABLE: &str = "flx_subscription_sets";

/// The consistent version snapshot returned by
/// [`SubscriptionStore::get_version_info`], read under one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionInfo {
    /// The highest committed subscription-set version.
    pub latest: i64,
    /// The version currently in the `Complete` state, or zero.
    pub active: i64,
    /// The newest version awaiting its download mark, or `active` if none.
    pub pending_mark: i64,
}

/// A pending subscription-set version, as returned by
/// [`SubscriptionStore::get_next_pending_version`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingSubscription {
    /// The subscription-set version.
    pub query_version: i64,
    /// The backend commit version it was persisted at.
    pub snapshot_version: i64,
}

/// Cached opaque keys for the two metadata tables.
#[derive(Debug, Clone, Copy)]
struct StoreKeys {
    sub_table: TableKey,
    sub_id: ColKey,
    sub_created_at: ColKey,
    sub_updated_at: ColKey,
    sub_name: ColKey,
    sub_class: ColKey,
    sub_query: ColKey,
    set_table: TableKey,
    set_version: ColKey,
    set_snapshot: ColKey,
    set_state: ColKey,
    set_error: ColKey,
    set_subs: ColKey,
}

/// One subscription-set row, decoded except for its subscription list.
#[derive(Debug, Clone)]
struct SetRecord {
    row: RowKey,
    version: i64,
    snapshot_version: i64,
    state: SubscriptionState,
    error_str: Option<String>,
}

/// Read operations shared by read and write transactions, so row decoding
/// works against whichever transaction the caller owns.
trait ReadOps {
    fn get(&self, table: TableKey, row: RowKey, col: ColKey) -> StorageResult<Value>;
    fn rows(&self, table: TableKey) -> StorageResult<Vec<RowKey>>;
    fn find_by_primary_key(&self, table: TableKey, value: &Value)
        -> StorageResult<Option<RowKey>>;
}

impl ReadOps for ReadTransaction {
    fn get(&self, table: TableKey, row: RowKey, col: ColKey) -> StorageResult<Value> {
        ReadTransaction::get(self, table, row, col)
    }
    fn rows(&self, table: TableKey) -> StorageResult<Vec<RowKey>> {
        ReadTransaction::rows(self, table)
    }
    fn find_by_primary_key(
        &self,
        table: TableKey,
        value: &Value,
    ) -> StorageResult<Option<RowKey>> {
        ReadTransaction::find_by_primary_key(self, table, value)
    }
}

impl ReadOps for WriteTransaction {
    fn get(&self, table: TableKey, row: RowKey, col: ColKey) -> StorageResult<Value> {
        WriteTransaction::get(self, table, row, col)
    }
    fn rows(&self, table: TableKey) -> StorageResult<Vec<RowKey>> {
        WriteTransaction::rows(self, table)
    }
    fn find_by_primary_key(
        &self,
        table: TableKey,
        value: &Value,
    ) -> StorageResult<Option<RowKey>> {
        WriteTransaction::find_by_primary_key(self, table, value)
    }
}

fn expect_int(value: Value) -> SyncResult<i64> {
    value
        .as_int()
        .ok_or_else(|| SyncError::logic("unexpected value type in subscription metadata"))
}

fn expect_string(value: Value) -> SyncResult<String> {
    match value {
        Value::String(s) => Ok(s),
        _ => Err(SyncError::logic(
            "unexpected value type in subscription metadata",
        )),
    }
}

fn expect_string_opt(value: Value) -> SyncResult<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        _ => Err(SyncError::logic(
            "unexpected value type in subscription metadata",
        )),
    }
}

/// The coordinator owning subscription persistence, version assignment, the
/// lifecycle state machine, and notification dispatch.
///
/// The store is shared across threads behind an `Arc`. Every state
/// transition runs inside a backend write transaction, and every commit of
/// the backing database schedules [`SubscriptionStore::report_progress`]
/// through a commit observer, so notification handles resolve no matter who
/// owned the transaction.
pub struct SubscriptionStore {
    db: Database,
    keys: StoreKeys,
    weak_self: Weak<SubscriptionStore>,
    /// Outstanding notification requests. Never call into the backend while
    /// holding this lock; collect first, release, then fulfil.
    pending_notifications: Mutex<Vec<NotificationRequest>>,
    /// In-memory bootstrap attempt counts per version, for the
    /// first-bootstrap-only cancellation rule. Session state, not persisted.
    bootstrap_attempts: Mutex<BTreeMap<i64, u32>>,
}

impl SubscriptionStore {
    /// Opens the store on a database, creating and seeding the metadata
    /// tables on first use.
    pub fn create(db: Database) -> SyncResult<Arc<Self>> {
        let keys = Self::initialize(&db)?;
        let store = Arc::new_cyclic(|weak| Self {
            db: db.clone(),
            keys,
            weak_self: weak.clone(),
            pending_notifications: Mutex::new(Vec::new()),
            bootstrap_attempts: Mutex::new(BTreeMap::new()),
        });
        let weak = Arc::downgrade(&store);
        db.observe_commits(move |_| {
            if let Some(store) = weak.upgrade() {
                store.report_progress();
            }
        });
        debug!("subscription store opened");
        Ok(store)
    }

    fn initialize(db: &Database) -> SyncResult<StoreKeys> {
        {
            let rt = db.begin_read();
            if let Some(keys) = Self::lookup_keys(&rt)? {
                return Ok(keys);
            }
        }

        let mut wt = db.begin_write();
        wt.get_or_add_table(
            TableSpec::new(
                SUBSCRIPTIONS_TABLE,
                vec![
                    ColumnSpec::new("id", ColumnType::ObjectId),
                    ColumnSpec::new("created_at", ColumnType::Timestamp),
                    ColumnSpec::new("updated_at", ColumnType::Timestamp),
                    ColumnSpec::nullable("name", ColumnType::String),
                    ColumnSpec::new("object_class_name", ColumnType::String),
                    ColumnSpec::new("query_str", ColumnType::String),
                ],
            )
            .with_primary_key("id"),
        )?;
        let set_table = wt.get_or_add_table(
            TableSpec::new(
                SUBSCRIPTION_SETS_TABLE,
                vec![
                    ColumnSpec::new("version", ColumnType::Int),
                    ColumnSpec::new("snapshot_version", ColumnType::Int),
                    ColumnSpec::new("state", ColumnType::Int),
                    ColumnSpec::nullable("error_str", ColumnType::String),
                    ColumnSpec::new("subscriptions", ColumnType::LinkList),
                ],
            )
            .with_primary_key("version"),
        )?;

        if wt.row_count(set_table)? == 0 {
            Self::seed_baseline(&mut wt, set_table)?;
        }
        wt.commit()?;
        debug!("subscription metadata tables initialized");

        let rt = db.begin_read();
        Self::lookup_keys(&rt)?
            .ok_or_else(|| SyncError::logic("subscription tables missing after initialization"))
    }

    /// Seeds the baseline empty set at version zero in `Complete` state, so
    /// there is always an active set.
    fn seed_baseline(wt: &mut WriteTransaction, set_table: TableKey) -> SyncResult<()> {
        let version = wt.col_key(set_table, "version")?;
        let snapshot = wt.col_key(set_table, "snapshot_version")?;
        let state = wt.col_key(set_table, "state")?;
        let subs = wt.col_key(set_table, "subscriptions")?;
        let row = wt.insert_row(set_table)?;
        wt.set(set_table, row, version, Value::Int(0))?;
        wt.set(set_table, row, snapshot, Value::Int(0))?;
        wt.set(
            set_table,
            row,
            state,
            Value::Int(SubscriptionState::Complete.to_ordinal()),
        )?;
        wt.set(set_table, row, subs, Value::LinkList(Vec::new()))?;
        Ok(())
    }

    fn lookup_keys(rt: &ReadTransaction) -> SyncResult<Option<StoreKeys>> {
        let (Some(sub_table), Some(set_table)) = (
            rt.table_by_name(SUBSCRIPTIONS_TABLE),
            rt.table_by_name(SUBSCRIPTION_SETS_TABLE),
        ) else {
            return Ok(None);
        };
        Ok(Some(StoreKeys {
            sub_table,
            sub_id: rt.col_key(sub_table, "id")?,
            sub_created_at: rt.col_key(sub_table, "created_at")?,
            sub_updated_at: rt.col_key(sub_table, "updated_at")?,
            sub_name: rt.col_key(sub_table, "name")?,
            sub_class: rt.col_key(sub_table, "object_class_name")?,
            sub_query: rt.col_key(sub_table, "query_str")?,
            set_table,
            set_version: rt.col_key(set_table, "version")?,
            set_snapshot: rt.col_key(set_table, "snapshot_version")?,
            set_state: rt.col_key(set_table, "state")?,
            set_error: rt.col_key(set_table, "error_str")?,
            set_subs: rt.col_key(set_table, "subscriptions")?,
        }))
    }

    fn weak(&self) -> Weak<SubscriptionStore> {
        self.weak_self.clone()
    }

    /// Decodes every subscription-set row, ordered by version.
    fn set_records<T: ReadOps>(&self, tx: &T) -> SyncResult<Vec<SetRecord>> {
        let keys = &self.keys;
        let mut records = Vec::new();
        for row in tx.rows(keys.set_table)? {
            let ordinal = expect_int(tx.get(keys.set_table, row, keys.set_state)?)?;
            records.push(SetRecord {
                row,
                version: expect_int(tx.get(keys.set_table, row, keys.set_version)?)?,
                snapshot_version: expect_int(tx.get(keys.set_table, row, keys.set_snapshot)?)?,
                state: SubscriptionState::from_ordinal(ordinal)?,
                error_str: expect_string_opt(tx.get(keys.set_table, row, keys.set_error)?)?,
            });
        }
        records.sort_by_key(|r| r.version);
        Ok(records)
    }

    fn find_version<T: ReadOps>(&self, tx: &T, version: i64) -> SyncResult<Option<SetRecord>> {
        let keys = &self.keys;
        let Some(row) = tx.find_by_primary_key(keys.set_table, &Value::Int(version))? else {
            return Ok(None);
        };
        let ordinal = expect_int(tx.get(keys.set_table, row, keys.set_state)?)?;
        Ok(Some(SetRecord {
            row,
            version,
            snapshot_version: expect_int(tx.get(keys.set_table, row, keys.set_snapshot)?)?,
            state: SubscriptionState::from_ordinal(ordinal)?,
            error_str: expect_string_opt(tx.get(keys.set_table, row, keys.set_error)?)?,
        }))
    }

    fn load_subscriptions<T: ReadOps>(
        &self,
        tx: &T,
        set_row: RowKey,
    ) -> SyncResult<Vec<Subscription>> {
        let keys = &self.keys;
        let links = match tx.get(keys.set_table, set_row, keys.set_subs)? {
            Value::LinkList(links) => links,
            _ => {
                return Err(SyncError::logic(
                    "unexpected value type in subscription metadata",
                ))
            }
        };
        let mut subs = Vec::with_capacity(links.len());
        for sub_row in links {
            let id = tx
                .get(keys.sub_table, sub_row, keys.sub_id)?
                .as_object_id()
                .ok_or_else(|| SyncError::logic("unexpected value type in subscription metadata"))?;
            let created_at = tx
                .get(keys.sub_table, sub_row, keys.sub_created_at)?
                .as_timestamp()
                .ok_or_else(|| SyncError::logic("unexpected value type in subscription metadata"))?;
            let updated_at = tx
                .get(keys.sub_table, sub_row, keys.sub_updated_at)?
                .as_timestamp()
                .ok_or_else(|| SyncError::logic("unexpected value type in subscription metadata"))?;
            let name = expect_string_opt(tx.get(keys.sub_table, sub_row, keys.sub_name)?)?;
            let class = expect_string(tx.get(keys.sub_table, sub_row, keys.sub_class)?)?;
            let query = expect_string(tx.get(keys.sub_table, sub_row, keys.sub_query)?)?;
            subs.push(Subscription::from_storage(
                id, created_at, updated_at, name, class, query,
            ));
        }
        Ok(subs)
    }

    fn load_set<T: ReadOps>(&self, tx: &T, record: &SetRecord) -> SyncResult<SubscriptionSet> {
        let subs = self.load_subscriptions(tx, record.row)?;
        Ok(SubscriptionSet::new(
            self.weak(),
            record.version,
            record.state,
            record.error_str.clone(),
            record.snapshot_version,
            subs,
            Some(record.row),
        ))
    }

    /// Returns the subscription set with the highest version, or an empty
    /// zero-version set if none exists.
    pub fn get_latest(&self) -> SyncResult<SubscriptionSet> {
        let rt = self.db.begin_read();
        let records = self.set_records(&rt)?;
        match records.last() {
            Some(record) => self.load_set(&rt, record),
            None => Ok(SubscriptionSet::empty(
                self.weak(),
                0,
                SubscriptionState::Complete,
            )),
        }
    }

    /// Returns the subscription set currently in `Complete` state, or an
    /// empty zero-version set if none is.
    pub fn get_active(&self) -> SyncResult<SubscriptionSet> {
        let rt = self.db.begin_read();
        let records = self.set_records(&rt)?;
        match records
            .iter()
            .rev()
            .find(|r| r.state == SubscriptionState::Complete)
        {
            Some(record) => self.load_set(&rt, record),
            None => Ok(SubscriptionSet::empty(
                self.weak(),
                0,
                SubscriptionState::Complete,
            )),
        }
    }

    /// Reads the latest, active, and pending-mark versions under a single
    /// transaction, so the three are mutually consistent.
    pub fn get_version_info(&self) -> SyncResult<VersionInfo> {
        let rt = self.db.begin_read();
        let records = self.set_records(&rt)?;
        let latest = records.last().map_or(0, |r| r.version);
        let active = records
            .iter()
            .rev()
            .find(|r| r.state == SubscriptionState::Complete)
            .map_or(0, |r| r.version);
        let pending_mark = records
            .iter()
            .rev()
            .find(|r| r.state == SubscriptionState::AwaitingMark)
            .map_or(active, |r| r.version);
        Ok(VersionInfo {
            latest,
            active,
            pending_mark,
        })
    }

    /// Returns the subscription set with the given version.
    pub fn get_by_version(&self, version: i64) -> SyncResult<SubscriptionSet> {
        let rt = self.db.begin_read();
        match self.find_version(&rt, version)? {
            Some(record) => self.load_set(&rt, &record),
            None => Err(SyncError::KeyNotFound { version }),
        }
    }

    /// Re-reads a set by version for [`SubscriptionSet::refresh`]; a version
    /// below the latest whose row is gone refreshes as `Superseded`.
    pub(crate) fn get_refreshed(&self, version: i64) -> SyncResult<SubscriptionSet> {
        let rt = self.db.begin_read();
        match self.find_version(&rt, version)? {
            Some(record) => self.load_set(&rt, &record),
            None => {
                let latest = self.set_records(&rt)?.last().map_or(0, |r| r.version);
                if version <= latest {
                    Ok(SubscriptionSet::empty(
                        self.weak(),
                        version,
                        SubscriptionState::Superseded,
                    ))
                } else {
                    Err(SyncError::KeyNotFound { version })
                }
            }
        }
    }

    /// Returns every set still making progress (Pending, Bootstrapping, or
    /// AwaitingMark), oldest first.
    pub fn get_pending_subscriptions(&self) -> SyncResult<Vec<SubscriptionSet>> {
        let rt = self.db.begin_read();
        let records = self.set_records(&rt)?;
        records
            .iter()
            .filter(|r| r.state.is_pending())
            .map(|r| self.load_set(&rt, r))
            .collect()
    }

    /// Returns the smallest pending version strictly greater than
    /// `last_query_version`, if any.
    pub fn get_next_pending_version(
        &self,
        last_query_version: i64,
    ) -> SyncResult<Option<PendingSubscription>> {
        let rt = self.db.begin_read();
        let records = self.set_records(&rt)?;
        Ok(records
            .iter()
            .find(|r| r.version > last_query_version && r.state.is_pending())
            .map(|r| PendingSubscription {
                query_version: r.version,
                snapshot_version: r.snapshot_version,
            }))
    }

    /// Returns the object classes named by the latest set's subscriptions,
    /// read under the caller's transaction.
    pub fn get_tables_for_latest(&self, rt: &ReadTransaction) -> SyncResult<BTreeSet<String>> {
        let records = self.set_records(rt)?;
        match records.last() {
            Some(record) => Ok(self
                .load_subscriptions(rt, record.row)?
                .iter()
                .map(|s| s.object_class_name().to_string())
                .collect()),
            None => Ok(BTreeSet::new()),
        }
    }

    /// Returns true if the database has commits newer than `version`.
    #[must_use]
    pub fn would_refresh(&self, version: u64) -> bool {
        self.db.version() > version
    }

    fn set_row_state(
        &self,
        wt: &mut WriteTransaction,
        row: RowKey,
        state: SubscriptionState,
        error_str: Option<&str>,
    ) -> SyncResult<()> {
        let keys = &self.keys;
        wt.set(
            keys.set_table,
            row,
            keys.set_state,
            Value::Int(state.to_ordinal()),
        )?;
        let error_value = match error_str {
            Some(message) => Value::String(message.to_string()),
            None => Value::Null,
        };
        wt.set(keys.set_table, row, keys.set_error, error_value)?;
        Ok(())
    }

    /// Marks `query_version` as having begun bootstrapping, inside the
    /// caller's write transaction. No effect if the version is already past
    /// bootstrapping; fails if it is errored or superseded.
    pub fn begin_bootstrap(
        &self,
        wt: &mut WriteTransaction,
        query_version: i64,
    ) -> SyncResult<()> {
        let record = self
            .find_version(wt, query_version)?
            .ok_or(SyncError::KeyNotFound {
                version: query_version,
            })?;
        match record.state {
            SubscriptionState::Pending | SubscriptionState::Bootstrapping => {
                self.set_row_state(wt, record.row, SubscriptionState::Bootstrapping, None)?;
                *self
                    .bootstrap_attempts
                    .lock()
                    .entry(query_version)
                    .or_insert(0) += 1;
                debug!(version = query_version, "bootstrap started");
                Ok(())
            }
            SubscriptionState::AwaitingMark | SubscriptionState::Complete => Ok(()),
            state => Err(SyncError::logic(format!(
                "cannot begin bootstrap for subscription set version {query_version} in state {state}"
            ))),
        }
    }

    /// Marks `query_version` as having received its final bootstrap
    /// message, advancing it to `AwaitingMark` inside the caller's write
    /// transaction. No effect if already past; fails if errored or
    /// superseded.
    pub fn complete_bootstrap(
        &self,
        wt: &mut WriteTransaction,
        query_version: i64,
    ) -> SyncResult<()> {
        let record = self
            .find_version(wt, query_version)?
            .ok_or(SyncError::KeyNotFound {
                version: query_version,
            })?;
        match record.state {
            SubscriptionState::Pending | SubscriptionState::Bootstrapping => {
                self.set_row_state(wt, record.row, SubscriptionState::AwaitingMark, None)?;
                debug!(version = query_version, "bootstrap complete, awaiting mark");
                Ok(())
            }
            SubscriptionState::AwaitingMark | SubscriptionState::Complete => Ok(()),
            state => Err(SyncError::logic(format!(
                "cannot complete bootstrap for subscription set version {query_version} in state {state}"
            ))),
        }
    }

    /// Rolls `query_version` back from `Bootstrapping` to `Pending`, but
    /// only for the version's first bootstrap attempt; later cancellations
    /// and other states are no-ops.
    pub fn cancel_bootstrap(
        &self,
        wt: &mut WriteTransaction,
        query_version: i64,
    ) -> SyncResult<()> {
        let record = self
            .find_version(wt, query_version)?
            .ok_or(SyncError::KeyNotFound {
                version: query_version,
            })?;
        if record.state == SubscriptionState::Bootstrapping {
            let attempts = self
                .bootstrap_attempts
                .lock()
                .get(&query_version)
                .copied()
                .unwrap_or(0);
            if attempts <= 1 {
                self.set_row_state(wt, record.row, SubscriptionState::Pending, None)?;
                debug!(version = query_version, "first bootstrap cancelled");
            }
        }
        Ok(())
    }

    /// Records a server error against `query_version` in its own write
    /// transaction. Fails if the version is already complete or superseded.
    pub fn set_error(&self, query_version: i64, error_str: &str) -> SyncResult<()> {
        let mut wt = self.db.begin_write();
        let record = self
            .find_version(&wt, query_version)?
            .ok_or(SyncError::KeyNotFound {
                version: query_version,
            })?;
        match record.state {
            SubscriptionState::Complete | SubscriptionState::Superseded => {
                Err(SyncError::logic(format!(
                    "subscription set version {query_version} in state {} cannot receive an error",
                    record.state
                )))
            }
            _ => {
                self.set_row_state(&mut wt, record.row, SubscriptionState::Error, Some(error_str))?;
                debug!(version = query_version, error = error_str, "subscription set errored");
                wt.commit()?;
                Ok(())
            }
        }
    }

    /// Reports that a download mark arrived: the newest set awaiting its
    /// mark advances to `Complete` and everything older is superseded. A
    /// no-op when no set is awaiting a mark.
    pub fn download_complete(&self) -> SyncResult<()> {
        let mut wt = self.db.begin_write();
        let records = self.set_records(&wt)?;
        let Some(record) = records
            .iter()
            .rev()
            .find(|r| r.state == SubscriptionState::AwaitingMark)
        else {
            return Ok(());
        };
        self.set_row_state(&mut wt, record.row, SubscriptionState::Complete, None)?;
        self.supersede_older_than(&mut wt, record.version)?;
        debug!(version = record.version, "subscription set complete");
        wt.commit()?;
        Ok(())
    }

    /// Supersedes every set strictly older than `version` that was still in
    /// a live state, dropping its subscription rows to bound space.
    fn supersede_older_than(&self, wt: &mut WriteTransaction, version: i64) -> SyncResult<()> {
        let keys = self.keys;
        for record in self.set_records(wt)? {
            if record.version >= version || record.state.is_terminal() {
                continue;
            }
            let links = match wt.get(keys.set_table, record.row, keys.set_subs)? {
                Value::LinkList(links) => links,
                _ => Vec::new(),
            };
            for sub_row in links {
                wt.delete_row(keys.sub_table, sub_row)?;
            }
            wt.set(
                keys.set_table,
                record.row,
                keys.set_subs,
                Value::LinkList(Vec::new()),
            )?;
            self.set_row_state(wt, record.row, SubscriptionState::Superseded, None)?;
            debug!(version = record.version, "subscription set superseded");
        }
        self.bootstrap_attempts.lock().retain(|v, _| *v >= version);
        Ok(())
    }

    /// Transitions the active set directly to `Complete` without the normal
    /// bootstrap flow, for client-reset recovery. Returns its version.
    pub fn mark_active_as_complete(&self, wt: &mut WriteTransaction) -> SyncResult<i64> {
        let records = self.set_records(wt)?;
        let record = records
            .iter()
            .rev()
            .find(|r| {
                matches!(
                    r.state,
                    SubscriptionState::Complete | SubscriptionState::AwaitingMark
                )
            })
            .ok_or_else(|| SyncError::logic("no active subscription set to mark complete"))?;
        if record.state != SubscriptionState::Complete {
            self.set_row_state(wt, record.row, SubscriptionState::Complete, None)?;
        }
        self.supersede_older_than(wt, record.version)?;
        debug!(version = record.version, "active set marked complete");
        Ok(record.version)
    }

    /// Clones the active set as a new latest version in `Complete` state,
    /// superseding intermediate pending versions. A no-op returning the
    /// active version when nothing newer than it exists.
    pub fn set_active_as_latest(&self, wt: &mut WriteTransaction) -> SyncResult<i64> {
        let records = self.set_records(wt)?;
        let latest = records.last().map_or(0, |r| r.version);
        let active = records
            .iter()
            .rev()
            .find(|r| {
                matches!(
                    r.state,
                    SubscriptionState::Complete | SubscriptionState::AwaitingMark
                )
            })
            .ok_or_else(|| SyncError::logic("no active subscription set to restore"))?;
        if active.version == latest && active.state == SubscriptionState::Complete {
            return Ok(active.version);
        }

        let subs = self.load_subscriptions(wt, active.row)?;
        let new_version = latest + 1;
        let snapshot_version = wt.commit_version() as i64;
        self.insert_set_row(
            wt,
            new_version,
            snapshot_version,
            SubscriptionState::Complete,
            &subs,
        )?;
        self.supersede_older_than(wt, new_version)?;
        debug!(
            from = active.version,
            to = new_version,
            "active set restored as latest"
        );
        Ok(new_version)
    }

    /// Truncates all subscription data, re-seeds the baseline set, and
    /// resolves every outstanding notification as superseded.
    pub fn reset(&self, wt: &mut WriteTransaction) -> SyncResult<()> {
        wt.clear_table(self.keys.sub_table)?;
        wt.clear_table(self.keys.set_table)?;
        Self::seed_baseline(wt, self.keys.set_table)?;
        self.bootstrap_attempts.lock().clear();

        let drained: Vec<NotificationRequest> =
            std::mem::take(&mut *self.pending_notifications.lock());
        for request in drained {
            let _ = request.tx.send(Err(SyncError::Superseded {
                version: request.version,
            }));
        }
        debug!("subscription store reset");
        Ok(())
    }

    /// Persists an uncommitted draft as the next version. Called by
    /// [`MutableSubscriptionSet::commit`] with the draft's own write
    /// transaction.
    pub(crate) fn commit_draft(
        &self,
        mut tr: WriteTransaction,
        subs: Vec<Subscription>,
    ) -> SyncResult<SubscriptionSet> {
        let records = self.set_records(&tr)?;
        let version = records.last().map_or(0, |r| r.version) + 1;
        let snapshot_version = tr.commit_version() as i64;
        let row = self.insert_set_row(
            &mut tr,
            version,
            snapshot_version,
            SubscriptionState::Pending,
            &subs,
        )?;
        let count = subs.len();
        tr.commit()?;
        debug!(version, subscriptions = count, "committed subscription set");
        Ok(SubscriptionSet::new(
            self.weak(),
            version,
            SubscriptionState::Pending,
            None,
            snapshot_version,
            subs,
            Some(row),
        ))
    }

    fn insert_set_row(
        &self,
        wt: &mut WriteTransaction,
        version: i64,
        snapshot_version: i64,
        state: SubscriptionState,
        subs: &[Subscription],
    ) -> SyncResult<RowKey> {
        let keys = self.keys;
        let mut links = Vec::with_capacity(subs.len());
        for sub in subs {
            let sub_row = wt.insert_row(keys.sub_table)?;
            wt.set(keys.sub_table, sub_row, keys.sub_id, Value::ObjectId(sub.id()))?;
            wt.set(
                keys.sub_table,
                sub_row,
                keys.sub_created_at,
                Value::Timestamp(sub.created_at()),
            )?;
            wt.set(
                keys.sub_table,
                sub_row,
                keys.sub_updated_at,
                Value::Timestamp(sub.updated_at()),
            )?;
            let name_value = match sub.name() {
                Some(name) => Value::String(name.to_string()),
                None => Value::Null,
            };
            wt.set(keys.sub_table, sub_row, keys.sub_name, name_value)?;
            wt.set(
                keys.sub_table,
                sub_row,
                keys.sub_class,
                Value::from(sub.object_class_name()),
            )?;
            wt.set(
                keys.sub_table,
                sub_row,
                keys.sub_query,
                Value::from(sub.query_string()),
            )?;
            links.push(sub_row);
        }

        let row = wt.insert_row(keys.set_table)?;
        wt.set(keys.set_table, row, keys.set_version, Value::Int(version))?;
        wt.set(
            keys.set_table,
            row,
            keys.set_snapshot,
            Value::Int(snapshot_version),
        )?;
        wt.set(
            keys.set_table,
            row,
            keys.set_state,
            Value::Int(state.to_ordinal()),
        )?;
        wt.set(
            keys.set_table,
            row,
            keys.set_subs,
            Value::LinkList(links),
        )?;
        Ok(row)
    }

    /// Begins an editable draft based on `set`, taking the backend's write
    /// lock for the draft's lifetime.
    pub(crate) fn make_mutable_copy(
        &self,
        set: &SubscriptionSet,
    ) -> SyncResult<MutableSubscriptionSet> {
        let store = self
            .weak_self
            .upgrade()
            .ok_or_else(|| SyncError::logic("the subscription store has been closed"))?;
        let tr = self.db.begin_write();
        Ok(MutableSubscriptionSet::new(
            store,
            tr,
            set.iter().cloned().collect(),
        ))
    }

    /// Returns a handle resolved when the set at `version` reaches
    /// `notify_when` or any later state, or with an error if it errors out
    /// or is superseded first. Already-passed states resolve immediately.
    pub fn get_state_change_notification(
        &self,
        version: i64,
        notify_when: SubscriptionState,
    ) -> StateNotification {
        let rt = self.db.begin_read();
        let current = match self.find_version(&rt, version) {
            Ok(Some(record)) => Some((record.state, record.error_str)),
            Ok(None) => {
                let latest = match self.set_records(&rt) {
                    Ok(records) => records.last().map_or(0, |r| r.version),
                    Err(err) => return StateNotification::resolved(Err(err)),
                };
                if version <= latest {
                    return StateNotification::resolved(Err(SyncError::Superseded { version }));
                }
                // A version that has not been committed yet; park the
                // request until it shows up.
                None
            }
            Err(err) => return StateNotification::resolved(Err(err)),
        };
        if let Some((state, error_str)) = current {
            if let Some(resolution) =
                resolution_for(version, state, error_str.as_deref(), notify_when)
            {
                return StateNotification::resolved(resolution);
            }
        }

        let (tx, handle) = StateNotification::channel();
        self.pending_notifications.lock().push(NotificationRequest {
            version,
            notify_when,
            tx,
        });
        // A commit may have landed between the snapshot above and parking
        // the request; re-scan so it cannot be missed.
        self.report_progress();
        handle
    }

    /// Resolves any outstanding notifications whose set has reached (or
    /// passed) its awaited state. Safe to call redundantly; runs after every
    /// backend commit via the commit observer.
    pub fn report_progress(&self) {
        let rt = self.db.begin_read();
        let Ok(records) = self.set_records(&rt) else {
            return;
        };
        let by_version: BTreeMap<i64, (SubscriptionState, Option<String>)> = records
            .iter()
            .map(|r| (r.version, (r.state, r.error_str.clone())))
            .collect();
        let latest = records.last().map_or(0, |r| r.version);

        let mut to_fire: Vec<(Sender<Resolution>, Resolution)> = Vec::new();
        {
            let mut pending = self.pending_notifications.lock();
            pending.retain(|request| {
                let resolution = match by_version.get(&request.version) {
                    Some((state, error_str)) => resolution_for(
                        request.version,
                        *state,
                        error_str.as_deref(),
                        request.notify_when,
                    ),
                    None if request.version <= latest => Some(Err(SyncError::Superseded {
                        version: request.version,
                    })),
                    None => None,
                };
                match resolution {
                    Some(resolution) => {
                        to_fire.push((request.tx.clone(), resolution));
                        false
                    }
                    None => true,
                }
            });
        }
        // Fulfil outside the lock; waiters may re-enter the store.
        for (tx, resolution) in to_fire {
            let _ = tx.send(resolution);
        }
    }

    /// Resolves every outstanding notification with the given status without
    /// touching persisted state; used at shutdown.
    pub fn notify_all_state_change_notifications(&self, status: SyncError) {
        let drained: Vec<NotificationRequest> =
            std::mem::take(&mut *self.pending_notifications.lock());
        for request in drained {
            let _ = request.tx.send(Err(status.clone()));
        }
    }

    /// The database this store persists into.
    #[must_use]
    pub fn database(&self) -> &Database {
        &self.db
    }
}

impl std::fmt::Debug for SubscriptionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionStore")
            .field("pending_notifications", &self.pending_notifications.lock().len())
            .finish()
    }
}
