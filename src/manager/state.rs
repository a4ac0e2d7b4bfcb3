//! Collection state machine
//!
//! `Idle → Loading → Idle` for loads, `Idle → Mutating → Idle` for writes.
//! Only one operation runs per collection at a time; a second one is
//! rejected instead of racing the first.

use std::fmt;

use serde::Serialize;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionState {
    Idle,
    Loading,
    Mutating,
}

impl fmt::Display for CollectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CollectionState::Idle => "idle",
            CollectionState::Loading => "load",
            CollectionState::Mutating => "write",
        };
        f.write_str(s)
    }
}

/// Holds the collection out of `Idle`; returns it there when dropped,
/// including when the operation's future is abandoned.
pub(crate) struct BusyGuard<'a> {
    state: &'a watch::Sender<CollectionState>,
}

impl<'a> BusyGuard<'a> {
    /// Move from `Idle` to `next`, or report the state that blocks it
    pub(crate) fn acquire(
        state: &'a watch::Sender<CollectionState>,
        next: CollectionState,
    ) -> Result<Self, CollectionState> {
        let mut blocking = CollectionState::Idle;
        let acquired = state.send_if_modified(|current| {
            if *current == CollectionState::Idle {
                *current = next;
                true
            } else {
                blocking = *current;
                false
            }
        });
        if acquired {
            Ok(Self { state })
        } else {
            Err(blocking)
        }
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.state.send_replace(CollectionState::Idle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_is_rejected() {
        let (tx, _rx) = watch::channel(CollectionState::Idle);
        let guard = BusyGuard::acquire(&tx, CollectionState::Mutating).unwrap();
        assert_eq!(*tx.borrow(), CollectionState::Mutating);

        let blocked = BusyGuard::acquire(&tx, CollectionState::Loading).err();
        assert_eq!(blocked, Some(CollectionState::Mutating));

        drop(guard);
        assert_eq!(*tx.borrow(), CollectionState::Idle);
        assert!(BusyGuard::acquire(&tx, CollectionState::Loading).is_ok());
    }

    #[test]
    fn test_acquire_without_receivers() {
        let (tx, rx) = watch::channel(CollectionState::Idle);
        drop(rx);
        let _guard = BusyGuard::acquire(&tx, CollectionState::Loading).unwrap();
        assert_eq!(*tx.borrow(), CollectionState::Loading);
    }
}
