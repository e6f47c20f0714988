//! Collaborator boundary to the running game client.
//!
//! The engine never talks to the game directly; it goes through the
//! object-safe traits defined here:
//!
//! - [`InventorySnapshotProvider`]: synchronous inventory reads
//! - [`GameActionExecutor`]: issuing (irreversible) discard actions
//! - [`DialogObserver`]: polling the confirmation dialog the game may show
//! - [`PlayerStateProbe`]: busy/zone signals for passive gating
//!
//! Production implementations live with the host integration; tests use the
//! in-memory mocks in [`mock`].

pub mod action;
pub mod inventory;
pub mod mock;
pub mod probe;

pub use action::{DialogError, DialogHandle, DialogObserver, GameActionError, GameActionExecutor};
pub use inventory::{InventoryError, InventorySnapshotProvider, Item, ItemId};
pub use probe::PlayerStateProbe;
