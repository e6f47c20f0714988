//! Player state probe for passive-trigger gating.

/// Cheap, synchronous player-state signals.
///
/// `is_busy` folds together every condition that must suppress automation:
/// combat, cutscenes, crafting/gathering, duties, trading, occupied UI
/// windows, and zone transitions. The probe decides the membership; the
/// passive engine only consumes the boolean.
pub trait PlayerStateProbe: Send + Sync {
    /// Whether the player is currently occupied.
    fn is_busy(&self) -> bool;

    /// Identifier of the zone the player is in.
    fn current_zone_id(&self) -> u32;
}
