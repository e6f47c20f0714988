//! In-memory mock implementations of the game collaborator traits.
//!
//! These are used exclusively in tests to exercise the engine without a
//! running game client. The dialog mock is scripted: it can delay the
//! dialog's appearance, hold the confirm control unready for a number of
//! attempts, and keep the dialog visible for a number of dismissal polls.

use std::sync::Mutex;

use super::action::{DialogError, DialogHandle, DialogObserver, GameActionError, GameActionExecutor};
use super::inventory::{InventoryError, InventorySnapshotProvider, Item, ItemId};
use super::probe::PlayerStateProbe;

// ─── MockInventory ────────────────────────────────────────────────────────────

/// An in-memory inventory snapshot provider.
#[derive(Default)]
pub struct MockInventory {
    items: Mutex<Vec<Item>>,
    snapshot_calls: Mutex<u32>,
}

impl MockInventory {
    /// Create a mock inventory seeded with `items`.
    pub fn new(items: Vec<Item>) -> Self {
        Self {
            items: Mutex::new(items),
            snapshot_calls: Mutex::new(0),
        }
    }

    /// Replace the snapshot contents.
    pub fn set_items(&self, items: Vec<Item>) {
        *self.items.lock().unwrap_or_else(|e| e.into_inner()) = items;
    }

    /// Number of snapshot reads taken so far.
    pub fn snapshot_calls(&self) -> u32 {
        *self.snapshot_calls.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl InventorySnapshotProvider for MockInventory {
    fn items(&self, _include_equipped: bool) -> Result<Vec<Item>, InventoryError> {
        *self.snapshot_calls.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        Ok(self.items.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }
}

// ─── MockGameActions ──────────────────────────────────────────────────────────

/// Records discard requests in order; can be told to reject specific items.
#[derive(Default)]
pub struct MockGameActions {
    discarded: Mutex<Vec<ItemId>>,
    reject: Mutex<Vec<ItemId>>,
    attempts: Mutex<u32>,
}

impl MockGameActions {
    /// Create a mock executor that accepts every request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `request_discard` fail for the given item id.
    pub fn reject_item(&self, id: ItemId) {
        self.reject.lock().unwrap_or_else(|e| e.into_inner()).push(id);
    }

    /// Item ids discarded so far, in request order.
    pub fn discard_order(&self) -> Vec<ItemId> {
        self.discarded.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Total `request_discard` calls, rejected ones included.
    pub fn attempts(&self) -> u32 {
        *self.attempts.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl GameActionExecutor for MockGameActions {
    fn request_discard(&self, item: &Item) -> Result<(), GameActionError> {
        *self.attempts.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        if self
            .reject
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&item.id)
        {
            return Err(GameActionError::Rejected(format!(
                "item {} is locked",
                item.id
            )));
        }
        self.discarded
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(item.id);
        Ok(())
    }
}

// ─── MockDialogs ──────────────────────────────────────────────────────────────

struct DialogScript {
    /// `find` polls returning `None` before the dialog appears (per item).
    appear_after: u32,
    /// `confirm` attempts answered `ControlNotReady` (per item).
    not_ready: u32,
    /// `is_visible` polls answered `true` after a confirm (per item).
    dismiss_polls: u32,
}

struct DialogState {
    polls_remaining: u32,
    not_ready_remaining: u32,
    visible_remaining: u32,
    current_handle: u64,
    find_calls: u32,
    confirm_calls: u32,
}

/// A scripted confirmation-dialog observer.
///
/// The same script replays for each item: after a successful confirm the
/// appearance and readiness counters rearm for the next dialog.
pub struct MockDialogs {
    script: DialogScript,
    state: Mutex<DialogState>,
}

impl MockDialogs {
    /// Dialog appears after `appear_after` missed polls, confirm is
    /// immediately actionable, and the dialog dismisses instantly.
    pub fn appearing_after(appear_after: u32) -> Self {
        Self::scripted(appear_after, 0, 0)
    }

    /// A dialog that never appears.
    pub fn never() -> Self {
        Self::scripted(u32::MAX, 0, 0)
    }

    /// Full script: appearance delay, unready confirm attempts, dismissal polls.
    pub fn scripted(appear_after: u32, not_ready: u32, dismiss_polls: u32) -> Self {
        Self {
            script: DialogScript {
                appear_after,
                not_ready,
                dismiss_polls,
            },
            state: Mutex::new(DialogState {
                polls_remaining: appear_after,
                not_ready_remaining: not_ready,
                visible_remaining: 0,
                current_handle: 1,
                find_calls: 0,
                confirm_calls: 0,
            }),
        }
    }

    /// Total `find_confirmation_dialog` calls observed.
    pub fn find_calls(&self) -> u32 {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).find_calls
    }

    /// Total `confirm` calls observed.
    pub fn confirm_calls(&self) -> u32 {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).confirm_calls
    }
}

impl DialogObserver for MockDialogs {
    fn find_confirmation_dialog(&self, _text_pattern: &str) -> Option<DialogHandle> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.find_calls += 1;

        if self.script.appear_after == u32::MAX {
            return None;
        }
        if state.polls_remaining > 0 {
            state.polls_remaining -= 1;
            return None;
        }
        Some(DialogHandle {
            id: state.current_handle,
        })
    }

    fn confirm(&self, _handle: &DialogHandle) -> Result<(), DialogError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.confirm_calls += 1;

        if state.not_ready_remaining > 0 {
            state.not_ready_remaining -= 1;
            return Err(DialogError::ControlNotReady);
        }

        // Confirmed: rearm the script for the next item's dialog.
        state.visible_remaining = self.script.dismiss_polls;
        state.polls_remaining = self.script.appear_after;
        state.not_ready_remaining = self.script.not_ready;
        state.current_handle += 1;
        Ok(())
    }

    fn is_visible(&self, _handle: &DialogHandle) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.visible_remaining > 0 {
            state.visible_remaining -= 1;
            return true;
        }
        false
    }
}

// ─── MockProbe ────────────────────────────────────────────────────────────────

/// A settable busy/zone probe.
pub struct MockProbe {
    busy: Mutex<bool>,
    zone: Mutex<u32>,
}

impl MockProbe {
    /// Create a probe reporting idle in `zone`.
    pub fn idle_in(zone: u32) -> Self {
        Self {
            busy: Mutex::new(false),
            zone: Mutex::new(zone),
        }
    }

    /// Set the busy flag.
    pub fn set_busy(&self, busy: bool) {
        *self.busy.lock().unwrap_or_else(|e| e.into_inner()) = busy;
    }

    /// Move the player to another zone.
    pub fn set_zone(&self, zone: u32) {
        *self.zone.lock().unwrap_or_else(|e| e.into_inner()) = zone;
    }
}

impl PlayerStateProbe for MockProbe {
    fn is_busy(&self) -> bool {
        *self.busy.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn current_zone_id(&self) -> u32 {
        *self.zone.lock().unwrap_or_else(|e| e.into_inner())
    }
}
