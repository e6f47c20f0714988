//! Discard action and confirmation-dialog contracts.

use std::fmt;

use super::inventory::Item;

/// Error type for discard action requests.
#[derive(Debug, Clone)]
pub enum GameActionError {
    /// The client refused the action (wrong state, item locked).
    Rejected(String),
    /// Unexpected error from the underlying client.
    Backend(String),
}

impl fmt::Display for GameActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameActionError::Rejected(msg) => write!(f, "discard rejected: {msg}"),
            GameActionError::Backend(msg) => write!(f, "action error: {msg}"),
        }
    }
}

impl std::error::Error for GameActionError {}

/// Issues disposal actions against the game client.
///
/// `request_discard` is side-effecting and not idempotent; once dispatched
/// it cannot be recalled. The pipeline issues at most one outstanding
/// request at a time.
pub trait GameActionExecutor: Send + Sync {
    /// Request disposal of the item in the given slot.
    fn request_discard(&self, item: &Item) -> Result<(), GameActionError>;
}

/// Opaque handle to a visible game dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialogHandle {
    /// Client-assigned window identifier.
    pub id: u64,
}

/// Error type for dialog confirmation attempts.
#[derive(Debug, Clone)]
pub enum DialogError {
    /// The dialog is visible but its confirm control cannot be clicked yet.
    ControlNotReady,
    /// Unexpected error from the underlying client.
    Backend(String),
}

impl fmt::Display for DialogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DialogError::ControlNotReady => write!(f, "confirm control not ready"),
            DialogError::Backend(msg) => write!(f, "dialog error: {msg}"),
        }
    }
}

impl std::error::Error for DialogError {}

/// Polls for the confirmation dialog the game may present before a discard
/// completes.
///
/// This is a pure polling contract: retry and timeout policy belong to the
/// discard pipeline, not to implementations.
pub trait DialogObserver: Send + Sync {
    /// Find a visible confirmation dialog whose text matches `text_pattern`.
    fn find_confirmation_dialog(&self, text_pattern: &str) -> Option<DialogHandle>;

    /// Activate the dialog's confirm control.
    fn confirm(&self, handle: &DialogHandle) -> Result<(), DialogError>;

    /// Whether the dialog is still on screen.
    fn is_visible(&self, handle: &DialogHandle) -> bool;
}
