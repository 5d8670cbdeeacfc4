//! Individual query subscriptions.

use crate::query::Query;
use rand::Rng;
use tidedb_storage::{ObjectId, Timestamp};

/// Generates a fresh subscription ID: a 4-byte big-endian seconds timestamp
/// followed by 8 random bytes.
pub(crate) fn new_subscription_id() -> ObjectId {
    let secs = (Timestamp::now().as_millis() / 1000) as u32;
    let mut bytes = [0u8; 12];
    bytes[..4].copy_from_slice(&secs.to_be_bytes());
    rand::thread_rng().fill(&mut bytes[4..]);
    ObjectId::from_bytes(bytes)
}

/// One named (or anonymous) query a client keeps synchronized.
///
/// Subscriptions are immutable after construction; `insert_or_assign`
/// replaces the query portion by writing a new record with the same ID and
/// a fresh `updated_at`. Two subscriptions are equal iff their IDs match.
#[derive(Debug, Clone)]
pub struct Subscription {
    id: ObjectId,
    created_at: Timestamp,
    updated_at: Timestamp,
    name: Option<String>,
    object_class_name: String,
    query_string: String,
}

impl Subscription {
    /// Creates a fresh subscription with a newly generated ID.
    pub(crate) fn new(name: Option<String>, query: &Query) -> Self {
        let now = Timestamp::now();
        Self {
            id: new_subscription_id(),
            created_at: now,
            updated_at: now,
            name,
            object_class_name: query.class_name().to_string(),
            query_string: query.predicate().to_string(),
        }
    }

    /// Reconstructs a subscription from persisted fields.
    pub(crate) fn from_storage(
        id: ObjectId,
        created_at: Timestamp,
        updated_at: Timestamp,
        name: Option<String>,
        object_class_name: String,
        query_string: String,
    ) -> Self {
        Self {
            id,
            created_at,
            updated_at,
            name,
            object_class_name,
            query_string,
        }
    }

    /// Replaces the query portion, refreshing `updated_at`.
    pub(crate) fn assign(&mut self, query: &Query) {
        self.object_class_name = query.class_name().to_string();
        self.query_string = query.predicate().to_string();
        self.updated_at = Timestamp::now();
    }

    /// The globally unique subscription ID.
    #[must_use]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// When this subscription was first created.
    #[must_use]
    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// When the query portion was last replaced.
    #[must_use]
    pub fn updated_at(&self) -> Timestamp {
        self.updated_at
    }

    /// The subscription's name, if it was created with one.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The object class the query runs against.
    #[must_use]
    pub fn object_class_name(&self) -> &str {
        &self.object_class_name
    }

    /// The canonical textual form of the query.
    #[must_use]
    pub fn query_string(&self) -> &str {
        &self.query_string
    }

    /// Whether this subscription matches the given query's class and
    /// predicate.
    #[must_use]
    pub fn matches(&self, query: &Query) -> bool {
        self.object_class_name == query.class_name() && self.query_string == query.predicate()
    }
}

impl PartialEq for Subscription {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Subscription {}
