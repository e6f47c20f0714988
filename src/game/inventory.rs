//! Inventory snapshot contract and item metadata.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Numeric item identifier as used by the game's static data.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ItemId(pub u32);

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One occupied inventory slot.
///
/// A snapshot copy; mutating it has no effect on the game. Multiple slots
/// may carry the same [`ItemId`]; grouping/deduplication is the filter
/// module's concern.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    /// Item identifier.
    pub id: ItemId,
    /// Display name.
    pub name: String,
    /// Stack quantity in this slot.
    pub quantity: u32,
    /// Container the slot belongs to.
    pub container: u32,
    /// Slot index within the container.
    pub slot: u32,
    /// Whether the item can be traded on the market.
    pub tradeable: bool,
    /// Whether the game allows discarding this item at all.
    pub discardable: bool,
    /// High-quality flag.
    pub high_quality: bool,
    /// Collectable flag.
    pub collectable: bool,
    /// Spiritbond percentage (0.0–100.0).
    pub spiritbond: f32,
    /// Item level.
    pub item_level: u32,
    /// Unique flag (at most one may be held).
    pub unique: bool,
    /// UI category identifier.
    pub category: u32,
    /// Whether any saved gearset references this item.
    pub in_gearset: bool,
}

impl Item {
    /// Create a plain, tradeable, discardable item with neutral attributes.
    ///
    /// Callers populating real snapshots set the remaining fields directly.
    pub fn new(id: ItemId, name: impl Into<String>, quantity: u32) -> Self {
        Self {
            id,
            name: name.into(),
            quantity,
            container: 0,
            slot: 0,
            tradeable: true,
            discardable: true,
            high_quality: false,
            collectable: false,
            spiritbond: 0.0,
            item_level: 0,
            unique: false,
            category: 0,
            in_gearset: false,
        }
    }
}

/// Error type for inventory snapshot reads.
#[derive(Debug, Clone)]
pub enum InventoryError {
    /// The inventory is not readable right now (loading, zoning).
    Unavailable(String),
    /// Unexpected error from the underlying client.
    Backend(String),
}

impl fmt::Display for InventoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InventoryError::Unavailable(msg) => write!(f, "inventory unavailable: {msg}"),
            InventoryError::Backend(msg) => write!(f, "inventory error: {msg}"),
        }
    }
}

impl std::error::Error for InventoryError {}

/// Synchronous inventory reads.
///
/// A snapshot may be expensive to take; callers cache results for short
/// windows rather than calling on every tick.
pub trait InventorySnapshotProvider: Send + Sync {
    /// Return a snapshot of all occupied slots.
    ///
    /// `include_equipped` extends the scan to equipped gear containers.
    fn items(&self, include_equipped: bool) -> Result<Vec<Item>, InventoryError>;
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn item_new_is_plain_and_discardable() {
        let item = Item::new(ItemId(4551), "Rusty Dagger", 3);
        assert_eq!(item.id, ItemId(4551));
        assert_eq!(item.quantity, 3);
        assert!(item.tradeable);
        assert!(item.discardable);
        assert!(!item.unique);
        assert!(!item.in_gearset);
    }

    #[test]
    fn item_id_display_and_serde() {
        let id = ItemId(27);
        assert_eq!(id.to_string(), "#27");

        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "27");
        let restored: ItemId = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, id);
    }
}
