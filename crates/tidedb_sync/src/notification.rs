//! State-change notification handles.

use crate::error::{SyncError, SyncResult};
use crate::set::SubscriptionState;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::time::Duration;

/// What a notification delivers: the state the set actually reached, or an
/// error resolution.
pub(crate) type Resolution = Result<SubscriptionState, SyncError>;

/// A one-shot handle resolved when a subscription set reaches an awaited
/// state.
///
/// The handle resolves exactly once, either with the state the set actually
/// reached (which may be past the awaited one, since sets can skip states)
/// or with an error when the set errors out or is superseded first.
#[derive(Debug)]
pub struct StateNotification {
    rx: Receiver<Resolution>,
}

impl StateNotification {
    /// Creates a handle plus the sender that will resolve it.
    pub(crate) fn channel() -> (Sender<Resolution>, Self) {
        let (tx, rx) = mpsc::channel();
        (tx, Self { rx })
    }

    /// Creates a handle that is already resolved.
    pub(crate) fn resolved(resolution: Resolution) -> Self {
        let (tx, handle) = Self::channel();
        // The receiver is alive, so the send cannot fail.
        let _ = tx.send(resolution);
        handle
    }

    /// Blocks until the notification resolves.
    pub fn wait(self) -> SyncResult<SubscriptionState> {
        match self.rx.recv() {
            Ok(resolution) => resolution,
            Err(_) => Err(SyncError::cancelled("subscription store was dropped")),
        }
    }

    /// Blocks until the notification resolves or the timeout elapses.
    ///
    /// Returns `None` on timeout; the handle stays valid.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<SyncResult<SubscriptionState>> {
        match self.rx.recv_timeout(timeout) {
            Ok(resolution) => Some(resolution),
            Err(mpsc::RecvTimeoutError::Timeout) => None,
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Some(Err(SyncError::cancelled("subscription store was dropped")))
            }
        }
    }

    /// Returns the resolution if it has already arrived.
    pub fn try_wait(&self) -> Option<SyncResult<SubscriptionState>> {
        match self.rx.try_recv() {
            Ok(resolution) => Some(resolution),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                Some(Err(SyncError::cancelled("subscription store was dropped")))
            }
        }
    }
}

/// An outstanding request parked in the store until its set progresses.
pub(crate) struct NotificationRequest {
    pub version: i64,
    pub notify_when: SubscriptionState,
    pub tx: Sender<Resolution>,
}

/// Decides how a request resolves given the set's current state, or `None`
/// if it keeps waiting.
///
/// `Error` always resolves as an error carrying the server's message.
/// `Superseded` resolves successfully only when it was itself the awaited
/// state; otherwise the set was superseded before reaching the target and
/// the request resolves with an error. All other states resolve by semantic
/// progression order, which is not the persisted ordinal order.
pub(crate) fn resolution_for(
    version: i64,
    state: SubscriptionState,
    error_str: Option<&str>,
    notify_when: SubscriptionState,
) -> Option<Resolution> {
    match state {
        SubscriptionState::Error => Some(Err(SyncError::SubscriptionError {
            message: error_str.unwrap_or_default().to_string(),
        })),
        SubscriptionState::Superseded => {
            if notify_when == SubscriptionState::Superseded {
                Some(Ok(SubscriptionState::Superseded))
            } else {
                Some(Err(SyncError::Superseded { version }))
            }
        }
        _ => match (state.progress_rank(), notify_when.progress_rank()) {
            (Some(reached), Some(target)) if reached >= target => Some(Ok(state)),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolved_handle_returns_immediately() {
        let handle = StateNotification::resolved(Ok(SubscriptionState::Complete));
        assert_eq!(handle.try_wait(), Some(Ok(SubscriptionState::Complete)));
    }

    #[test]
    fn pending_handle_reports_nothing() {
        let (_tx, handle) = StateNotification::channel();
        assert_eq!(handle.try_wait(), None);
        assert_eq!(handle.wait_timeout(Duration::from_millis(10)), None);
    }

    #[test]
    fn dropped_sender_resolves_as_cancelled() {
        let (tx, handle) = StateNotification::channel();
        drop(tx);
        assert!(matches!(handle.wait(), Err(SyncError::Cancelled { .. })));
    }

    #[test]
    fn progression_resolves_at_or_past_target() {
        use SubscriptionState::*;
        assert_eq!(resolution_for(1, Pending, None, Complete), None);
        assert_eq!(resolution_for(1, Bootstrapping, None, Complete), None);
        assert_eq!(
            resolution_for(1, Complete, None, Bootstrapping),
            Some(Ok(Complete))
        );
        assert_eq!(resolution_for(1, Complete, None, Complete), Some(Ok(Complete)));
        // AwaitingMark sits between Bootstrapping and Complete despite its
        // larger persisted ordinal.
        assert_eq!(
            resolution_for(1, AwaitingMark, None, Bootstrapping),
            Some(Ok(AwaitingMark))
        );
        assert_eq!(resolution_for(1, AwaitingMark, None, Complete), None);
    }

    #[test]
    fn error_and_supersession_resolve_as_errors() {
        use SubscriptionState::*;
        assert_eq!(
            resolution_for(3, Error, Some("boom"), Complete),
            Some(Err(SyncError::SubscriptionError {
                message: "boom".into()
            }))
        );
        assert_eq!(
            resolution_for(3, Superseded, None, Complete),
            Some(Err(SyncError::Superseded { version: 3 }))
        );
        assert_eq!(
            resolution_for(3, Superseded, None, Superseded),
            Some(Ok(Superseded))
        );
    }
}
