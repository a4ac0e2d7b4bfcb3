//! User-facing notifications
//!
//! Remote failures never escape an operation unannounced: each one becomes a
//! [`Notification`] naming the attempted action, handed to a [`Notifier`].

use std::fmt;

use serde::Serialize;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Success,
    Warning,
    Error,
}

/// The operation a notification is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Load,
    Add,
    Move,
    Reorder,
    Delete,
    Edit,
}

impl Action {
    pub fn verb(&self) -> &'static str {
        match self {
            Action::Load => "load",
            Action::Add => "add",
            Action::Move => "move",
            Action::Reorder => "reorder",
            Action::Delete => "delete",
            Action::Edit => "edit",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub level: Level,
    pub action: Action,
    /// Scope key the action ran against
    pub scope: String,
    pub message: String,
}

impl Notification {
    pub fn success(action: Action, scope: &str, message: impl Into<String>) -> Self {
        Self {
            level: Level::Success,
            action,
            scope: scope.to_string(),
            message: message.into(),
        }
    }

    pub fn warning(action: Action, scope: &str, message: impl Into<String>) -> Self {
        Self {
            level: Level::Warning,
            action,
            scope: scope.to_string(),
            message: message.into(),
        }
    }

    /// Failure of `action`, e.g. "Failed to delete in grid_images: Not found: ..."
    pub fn failure(action: Action, scope: &str, err: &impl fmt::Display) -> Self {
        Self {
            level: Level::Error,
            action,
            scope: scope.to_string(),
            message: format!("Failed to {} in {}: {}", action.verb(), scope, err),
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.level {
            Level::Success => "ok",
            Level::Warning => "warning",
            Level::Error => "error",
        };
        write!(f, "[{}] {}", tag, self.message)
    }
}

/// Sink for notifications (toast area, console, test recorder)
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Forwards notifications to a channel; the receiver renders them.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, n: Notification) {
        if let Err(e) = self.tx.send(n) {
            log::debug!("Notification dropped, receiver gone: {}", e.0);
        }
    }
}
