//! Editable subscription-set drafts.

use crate::error::{SyncError, SyncResult};
use crate::query::Query;
use crate::set::{SubscriptionSet, SubscriptionState};
use crate::store::SubscriptionStore;
use crate::subscription::Subscription;
use std::sync::Arc;
use tidedb_storage::{ObjectId, WriteTransaction};

/// An editable draft of a subscription set, scoped to one write transaction.
///
/// The draft owns the backend's exclusive write transaction for its entire
/// lifetime; [`MutableSubscriptionSet::commit`] consumes the draft, persists
/// it as the next version, and releases the transaction. Dropping the draft
/// without committing rolls the transaction back and consumes no version.
///
/// All mutators require the draft to still be in the `Uncommitted` state and
/// return a logic error otherwise.
pub struct MutableSubscriptionSet {
    store: Arc<SubscriptionStore>,
    tr: WriteTransaction,
    state: SubscriptionState,
    subs: Vec<Subscription>,
}

impl MutableSubscriptionSet {
    pub(crate) fn new(
        store: Arc<SubscriptionStore>,
        tr: WriteTransaction,
        subs: Vec<Subscription>,
    ) -> Self {
        Self {
            store,
            tr,
            state: SubscriptionState::Uncommitted,
            subs,
        }
    }

    /// The draft's lifecycle state; `Uncommitted` unless overridden with
    /// [`MutableSubscriptionSet::set_state`].
    #[must_use]
    pub fn state(&self) -> SubscriptionState {
        self.state
    }

    /// The number of subscriptions in the draft.
    #[must_use]
    pub fn len(&self) -> usize {
        self.subs.len()
    }

    /// Whether the draft has no subscriptions.
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

    fn check_is_mutable(&self) -> SyncResult<()> {
        if self.state == SubscriptionState::Uncommitted {
            Ok(())
        } else {
            Err(SyncError::logic(format!(
                "subscription set can only be modified while Uncommitted, not {}",
                self.state
            )))
        }
    }

    /// Inserts a named subscription, or replaces the query of the existing
    /// one with this name.
    ///
    /// Returns the subscription's position and whether a new subscription
    /// was created. On replacement the subscription keeps its ID and
    /// `created_at`, and `updated_at` is refreshed.
    pub fn insert_or_assign(&mut self, name: &str, query: &Query) -> SyncResult<(usize, bool)> {
        self.check_is_mutable()?;
        if let Some(index) = self.subs.iter().position(|s| s.name() == Some(name)) {
            self.subs[index].assign(query);
            return Ok((index, false));
        }
        self.subs
            .push(Subscription::new(Some(name.to_string()), query));
        Ok((self.subs.len() - 1, true))
    }

    /// Inserts an anonymous subscription keyed on the query itself, or
    /// refreshes the existing one matching it.
    pub fn insert_or_assign_query(&mut self, query: &Query) -> SyncResult<(usize, bool)> {
        self.check_is_mutable()?;
        if let Some(index) = self
            .subs
            .iter()
            .position(|s| s.name().is_none() && s.matches(query))
        {
            self.subs[index].assign(query);
            return Ok((index, false));
        }
        self.subs.push(Subscription::new(None, query));
        Ok((self.subs.len() - 1, true))
    }

    /// Erases the subscription at `index`.
    pub fn erase_at(&mut self, index: usize) -> SyncResult<()> {
        self.check_is_mutable()?;
        if index >= self.subs.len() {
            return Err(SyncError::logic(format!(
                "subscription index {index} out of range ({} subscriptions)",
                self.subs.len()
            )));
        }
        self.subs.remove(index);
        Ok(())
    }

    /// Erases the subscription with the given name. Returns true if one was
    /// removed.
    pub fn erase(&mut self, name: &str) -> SyncResult<bool> {
        self.check_is_mutable()?;
        let before = self.subs.len();
        self.subs.retain(|s| s.name() != Some(name));
        Ok(self.subs.len() != before)
    }

    /// Erases the subscription matching the query. Returns true if one was
    /// removed.
    pub fn erase_query(&mut self, query: &Query) -> SyncResult<bool> {
        self.check_is_mutable()?;
        match self.subs.iter().position(|s| s.matches(query)) {
            Some(index) => {
                self.subs.remove(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Erases every subscription over the given object class. Returns true
    /// if any were removed.
    pub fn erase_by_class_name(&mut self, object_class_name: &str) -> SyncResult<bool> {
        self.check_is_mutable()?;
        let before = self.subs.len();
        self.subs
            .retain(|s| s.object_class_name() != object_class_name);
        Ok(self.subs.len() != before)
    }

    /// Erases the subscription with the given ID. Returns true if one was
    /// removed.
    pub fn erase_by_id(&mut self, id: ObjectId) -> SyncResult<bool> {
        self.check_is_mutable()?;
        let before = self.subs.len();
        self.subs.retain(|s| s.id() != id);
        Ok(self.subs.len() != before)
    }

    /// Removes all subscriptions.
    pub fn clear(&mut self) -> SyncResult<()> {
        self.check_is_mutable()?;
        self.subs.clear();
        Ok(())
    }

    /// Replaces the draft's contents with a copy of another set's
    /// subscription list. The draft's own version and state metadata are
    /// untouched.
    pub fn import(&mut self, other: &SubscriptionSet) -> SyncResult<()> {
        self.check_is_mutable()?;
        self.subs = other.iter().cloned().collect();
        Ok(())
    }

    /// Persists the draft as the next subscription-set version and returns
    /// the committed, immutable view.
    ///
    /// The new version is `max existing version + 1`, its state is
    /// `Pending`, and its snapshot version is the backend commit version of
    /// this draft's transaction. Consuming `self` makes any further use a
    /// compile error rather than a runtime one.
    pub fn commit(self) -> SyncResult<SubscriptionSet> {
        self.check_is_mutable()?;
        let Self {
            store, tr, subs, ..
        } = self;
        store.commit_draft(tr, subs)
    }

    /// Overrides the draft's state, bypassing the state machine.
    ///
    /// For testing and internal use only; a draft whose state is not
    /// `Uncommitted` rejects all further mutation.
    pub fn set_state(&mut self, state: SubscriptionState) {
        self.state = state;
    }

    /// Discards the draft, rolling back its write transaction.
    ///
    /// Equivalent to dropping it; provided for call sites where the
    /// rollback should be explicit.
    pub fn rollback(self) {
        self.tr.rollback();
    }
}

impl std::fmt::Debug for MutableSubscriptionSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutableSubscriptionSet")
            .field("state", &self.state)
            .field("len", &self.subs.len())
            .finish()
    }
}
