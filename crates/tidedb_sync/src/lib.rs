//! # TideDB Sync
//!
//! Flexible-sync subscription store for TideDB.
//!
//! This crate provides:
//! - [`Query`] and [`Subscription`] for describing server-evaluated queries
//! - [`SubscriptionSet`], a versioned immutable snapshot of subscriptions
//! - [`MutableSubscriptionSet`], a write-transaction-scoped editable draft
//! - [`SubscriptionStore`], the process-wide coordinator owning persistence,
//!   versioning, state transitions, and notification dispatch
//!
//! Subscription sets move through a persisted state machine as the server
//! acknowledges and bootstraps them; [`StateNotification`] handles let
//! callers block until a set reaches a state of interest.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod mutable;
mod notification;
mod query;
mod set;
mod store;
mod subscription;

pub use error::{SyncError, SyncResult};
pub use mutable::MutableSubscriptionSet;
pub use notification::StateNotification;
pub use query::Query;
pub use set::{SubscriptionSet, SubscriptionState};
pub use store::{PendingSubscription, SubscriptionStore, VersionInfo};
pub use subscription::Subscription;
