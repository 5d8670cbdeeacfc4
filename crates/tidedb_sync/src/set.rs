//! Immutable subscription-set snapshots and their lifecycle states.

use crate::error::{SyncError, SyncResult};
use crate::mutable::MutableSubscriptionSet;
use crate::notification::StateNotification;
use crate::query::Query;
use crate::store::SubscriptionStore;
use crate::subscription::Subscription;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Weak;
use tidedb_storage::RowKey;

/// The lifecycle state of a subscription set.
///
/// ```text
///                  ┌── → Error ──→ Superseded
///                  │         ▲
///  Uncommitted → Pending → Bootstrapping → AwaitingMark → Complete → Superseded
///                  ▲           │
///                  └───────────┘  (cancel_bootstrap, first bootstrap only)
/// ```
///
/// The numeric ordinals are the on-disk encoding and must not be renumbered;
/// files written by newer clients are read by older ones. Note that the
/// ordinal order is not the progression order: `AwaitingMark` was added
/// after `Superseded` and sits between `Bootstrapping` and `Complete`
/// semantically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionState {
    /// Exists only as an unpersisted draft held by a
    /// [`MutableSubscriptionSet`].
    Uncommitted,
    /// Persisted locally, not yet acknowledged by the server.
    Pending,
    /// The server is streaming the initial result set.
    Bootstrapping,
    /// Fully caught up; the active set being synchronized.
    Complete,
    /// The server rejected the set; see the recorded error string.
    Error,
    /// A newer version completed in this set's place. Terminal.
    Superseded,
    /// The final bootstrap message arrived; awaiting the download-complete
    /// mark.
    AwaitingMark,
}

impl SubscriptionState {
    /// Encodes the state as its persisted ordinal.
    #[must_use]
    pub fn to_ordinal(self) -> i64 {
        match self {
            SubscriptionState::Uncommitted => 0,
            SubscriptionState::Pending => 1,
            SubscriptionState::Bootstrapping => 2,
            SubscriptionState::Complete => 3,
            SubscriptionState::Error => 4,
            SubscriptionState::Superseded => 5,
            SubscriptionState::AwaitingMark => 6,
        }
    }

    /// Decodes a persisted ordinal.
    pub fn from_ordinal(ordinal: i64) -> SyncResult<Self> {
        match ordinal {
            0 => Ok(SubscriptionState::Uncommitted),
            1 => Ok(SubscriptionState::Pending),
            2 => Ok(SubscriptionState::Bootstrapping),
            3 => Ok(SubscriptionState::Complete),
            4 => Ok(SubscriptionState::Error),
            5 => Ok(SubscriptionState::Superseded),
            6 => Ok(SubscriptionState::AwaitingMark),
            _ => Err(SyncError::InvalidState { ordinal }),
        }
    }

    /// Position in the forward progression, or `None` for the terminal
    /// states that sit outside it.
    #[must_use]
    pub(crate) fn progress_rank(self) -> Option<u8> {
        match self {
            SubscriptionState::Uncommitted => Some(0),
            SubscriptionState::Pending => Some(1),
            SubscriptionState::Bootstrapping => Some(2),
            SubscriptionState::AwaitingMark => Some(3),
            SubscriptionState::Complete => Some(4),
            SubscriptionState::Error | SubscriptionState::Superseded => None,
        }
    }

    /// Whether the set is persisted but not yet fully synchronized.
    #[must_use]
    pub fn is_pending(self) -> bool {
        matches!(
            self,
            SubscriptionState::Pending
                | SubscriptionState::Bootstrapping
                | SubscriptionState::AwaitingMark
        )
    }

    /// Whether no further forward progress is possible.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, SubscriptionState::Error | SubscriptionState::Superseded)
    }
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SubscriptionState::Uncommitted => "Uncommitted",
            SubscriptionState::Pending => "Pending",
            SubscriptionState::Bootstrapping => "Bootstrapping",
            SubscriptionState::Complete => "Complete",
            SubscriptionState::Error => "Error",
            SubscriptionState::Superseded => "Superseded",
            SubscriptionState::AwaitingMark => "AwaitingMark",
        };
        f.write_str(name)
    }
}

/// A versioned, immutable snapshot of a set of subscriptions.
///
/// Snapshots are value-like: cheap to clone, safe to share across threads,
/// and never change underneath the holder. Call [`SubscriptionSet::refresh`]
/// to re-read the persisted state, or obtain a fresh snapshot from the
/// store.
#[derive(Debug, Clone)]
pub struct SubscriptionSet {
    pub(crate) store: Weak<SubscriptionStore>,
    pub(crate) version: i64,
    pub(crate) state: SubscriptionState,
    pub(crate) error_str: Option<String>,
    pub(crate) snapshot_version: i64,
    pub(crate) subs: Vec<Subscription>,
    pub(crate) row: Option<RowKey>,
}

impl SubscriptionSet {
    /// The snapshot version a set carries while uncommitted.
    pub const EMPTY_VERSION: i64 = -1;

    pub(crate) fn new(
        store: Weak<SubscriptionStore>,
        version: i64,
        state: SubscriptionState,
        error_str: Option<String>,
        snapshot_version: i64,
        subs: Vec<Subscription>,
        row: Option<RowKey>,
    ) -> Self {
        Self {
            store,
            version,
            state,
            error_str,
            snapshot_version,
            subs,
            row,
        }
    }

    /// A synthetic empty set used when no persisted set matches a query.
    pub(crate) fn empty(
        store: Weak<SubscriptionStore>,
        version: i64,
        state: SubscriptionState,
    ) -> Self {
        Self::new(store, version, state, None, 0, Vec::new(), None)
    }

    /// The version number identifying this set to the server.
    #[must_use]
    pub fn version(&self) -> i64 {
        self.version
    }

    /// The backend commit version this set was persisted at, or
    /// [`Self::EMPTY_VERSION`] while uncommitted.
    #[must_use]
    pub fn snapshot_version(&self) -> i64 {
        self.snapshot_version
    }

    /// The current lifecycle state, as of when this snapshot was taken.
    #[must_use]
    pub fn state(&self) -> SubscriptionState {
        self.state
    }

    /// The server's error string; present only in the `Error` state.
    #[must_use]
    pub fn error_str(&self) -> Option<&str> {
        self.error_str.as_deref()
    }

    /// The number of subscriptions in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subs.len()
    }

    /// Whether the set has no subscriptions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subs.is_empty()
    }

    /// Iterates the subscriptions in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Subscription> {
        self.subs.iter()
    }

    /// Returns the subscription at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range, like slice indexing.
    #[must_use]
    pub fn at(&self, index: usize) -> &Subscription {
        &self.subs[index]
    }

    /// Finds a subscription by name.
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<&Subscription> {
        self.subs.iter().find(|s| s.name() == Some(name))
    }

    /// Finds a subscription matching the query's class and predicate.
    #[must_use]
    pub fn find_by_query(&self, query: &Query) -> Option<&Subscription> {
        self.subs.iter().find(|s| s.matches(query))
    }

    /// Renders the set as the JSON document sent to the server: queries
    /// grouped by class, joined with ` OR ` in insertion order, classes in
    /// lexicographic order.
    #[must_use]
    pub fn to_ext_json(&self) -> String {
        let mut by_class: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for sub in &self.subs {
            by_class
                .entry(sub.object_class_name())
                .or_default()
                .push(sub.query_string());
        }
        let map: serde_json::Map<String, serde_json::Value> = by_class
            .into_iter()
            .map(|(class, queries)| {
                (
                    class.to_string(),
                    serde_json::Value::String(queries.join(" OR ")),
                )
            })
            .collect();
        serde_json::Value::Object(map).to_string()
    }

    /// Makes an editable draft of this set.
    ///
    /// The draft holds the backend's write lock until committed or dropped,
    /// so at most one draft exists at a time.
    pub fn make_mutable_copy(&self) -> SyncResult<MutableSubscriptionSet> {
        let store = self.upgrade_store()?;
        store.make_mutable_copy(self)
    }

    /// Returns a handle resolved when this set reaches `notify_when` or any
    /// later state, or with an error if it errors out or is superseded
    /// first. If the state has already been passed, the handle is resolved
    /// immediately.
    #[must_use]
    pub fn get_state_change_notification(
        &self,
        notify_when: SubscriptionState,
    ) -> StateNotification {
        match self.upgrade_store() {
            Ok(store) => store.get_state_change_notification(self.version, notify_when),
            Err(err) => StateNotification::resolved(Err(err)),
        }
    }

    /// Re-reads this set's persisted state from the latest snapshot.
    ///
    /// A set whose row was trimmed after supersession refreshes to the
    /// `Superseded` state with an empty subscription list.
    pub fn refresh(&mut self) -> SyncResult<()> {
        let store = self.upgrade_store()?;
        *self = store.get_refreshed(self.version)?;
        Ok(())
    }

    fn upgrade_store(&self) -> SyncResult<std::sync::Arc<SubscriptionStore>> {
        self.store
            .upgrade()
            .ok_or_else(|| SyncError::logic("the subscription store has been closed"))
    }
}

impl<'a> IntoIterator for &'a SubscriptionSet {
    type Item = &'a Subscription;
    type IntoIter = std::slice::Iter<'a, Subscription>;

    fn into_iter(self) -> Self::IntoIter {
        self.subs.iter()
    }
}
