//! Safety filter pipeline.
//!
//! Pure classification of inventory items as protected or eligible for
//! disposal. A [`SafetyFilterConfig`] is a set of independent protection
//! rules; an item is eligible iff no enabled rule flags it and it is not on
//! the user blacklist. [`protect_reason`] reports the first matching rule
//! for UI explanation; the blacklist is always checked first and overrides
//! everything, including membership in the auto-discard list.
//!
//! No I/O, no locking: both the manual-selection path and the automatic
//! discard path call into this module.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::game::{Item, ItemId};

/// Irreplaceable reward items that must never be discarded.
///
/// Hand-maintained alongside game data updates.
const SPECIAL_ITEM_IDS: &[u32] = &[
    10_155, 15_462, 16_039, 21_197, 23_043, 24_589, 30_268, 33_648,
];

/// Crystals, shards, and clusters occupy this id range.
const CRYSTAL_ID_RANGE: std::ops::RangeInclusive<u32> = 2..=19;

/// Currencies (gil included) live below this id.
const CURRENCY_ID_MAX: u32 = 99;

/// Protection rule toggles plus the user blacklist and auto-discard list.
///
/// Every toggle defaults to on; disabling one can only widen eligibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyFilterConfig {
    /// Protect the hand-maintained special/ultimate reward set.
    pub protect_special: bool,
    /// Protect currencies (low-id range).
    pub protect_currency: bool,
    /// Protect crystals, shards, and clusters.
    pub protect_crystals: bool,
    /// Protect items referenced by a saved gearset.
    pub protect_gearset: bool,
    /// Protect items the game flags as not discardable.
    pub protect_indisposable: bool,
    /// Protect gear above [`Self::item_level_ceiling`].
    pub protect_high_level_gear: bool,
    /// Highest item level still considered disposable.
    pub item_level_ceiling: u32,
    /// Protect unique items that cannot be traded back.
    pub protect_unique_untradeable: bool,
    /// Protect high-quality items.
    pub protect_high_quality: bool,
    /// Protect collectables.
    pub protect_collectable: bool,
    /// Protect items whose spiritbond exceeds [`Self::spiritbond_threshold`].
    pub protect_spiritbond: bool,
    /// Spiritbond percentage above which an item is protected.
    pub spiritbond_threshold: f32,
    /// Item ids that may never be discarded, regardless of any other rule.
    pub blacklist: BTreeSet<ItemId>,
    /// Item ids the passive engine may discard autonomously.
    pub auto_discard: BTreeSet<ItemId>,
}

impl Default for SafetyFilterConfig {
    fn default() -> Self {
        Self {
            protect_special: true,
            protect_currency: true,
            protect_crystals: true,
            protect_gearset: true,
            protect_indisposable: true,
            protect_high_level_gear: true,
            item_level_ceiling: 45,
            protect_unique_untradeable: true,
            protect_high_quality: true,
            protect_collectable: true,
            protect_spiritbond: true,
            spiritbond_threshold: 0.0,
            blacklist: BTreeSet::new(),
            auto_discard: BTreeSet::new(),
        }
    }
}

/// Why an item is protected from disposal. Reported for UI explanation;
/// the first matching rule wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectReason {
    /// On the user blacklist.
    Blacklisted,
    /// Member of the hand-maintained special reward set.
    SpecialItem,
    /// A currency.
    Currency,
    /// A crystal, shard, or cluster.
    Crystal,
    /// Referenced by a saved gearset.
    InGearset,
    /// The game does not allow discarding it.
    Indisposable,
    /// Gear above the configured item-level ceiling.
    HighLevelGear,
    /// Unique and untradeable.
    UniqueUntradeable,
    /// High quality.
    HighQuality,
    /// A collectable.
    Collectable,
    /// Spiritbond progress above the configured threshold.
    Spiritbond,
}

impl fmt::Display for ProtectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ProtectReason::Blacklisted => "on the blacklist",
            ProtectReason::SpecialItem => "irreplaceable special item",
            ProtectReason::Currency => "currency",
            ProtectReason::Crystal => "crystal or shard",
            ProtectReason::InGearset => "part of a gearset",
            ProtectReason::Indisposable => "cannot be discarded",
            ProtectReason::HighLevelGear => "gear above the item-level ceiling",
            ProtectReason::UniqueUntradeable => "unique and untradeable",
            ProtectReason::HighQuality => "high quality",
            ProtectReason::Collectable => "collectable",
            ProtectReason::Spiritbond => "spiritbond in progress",
        };
        f.write_str(text)
    }
}

/// Return the first protection rule matching `item`, or `None` when the
/// item is eligible for disposal.
pub fn protect_reason(item: &Item, config: &SafetyFilterConfig) -> Option<ProtectReason> {
    if config.blacklist.contains(&item.id) {
        return Some(ProtectReason::Blacklisted);
    }
    if config.protect_special && SPECIAL_ITEM_IDS.contains(&item.id.0) {
        return Some(ProtectReason::SpecialItem);
    }
    if config.protect_currency
        && item.id.0 <= CURRENCY_ID_MAX
        && !CRYSTAL_ID_RANGE.contains(&item.id.0)
    {
        return Some(ProtectReason::Currency);
    }
    if config.protect_crystals && CRYSTAL_ID_RANGE.contains(&item.id.0) {
        return Some(ProtectReason::Crystal);
    }
    if config.protect_gearset && item.in_gearset {
        return Some(ProtectReason::InGearset);
    }
    if config.protect_indisposable && !item.discardable {
        return Some(ProtectReason::Indisposable);
    }
    if config.protect_high_level_gear && item.item_level > config.item_level_ceiling {
        return Some(ProtectReason::HighLevelGear);
    }
    if config.protect_unique_untradeable && item.unique && !item.tradeable {
        return Some(ProtectReason::UniqueUntradeable);
    }
    if config.protect_high_quality && item.high_quality {
        return Some(ProtectReason::HighQuality);
    }
    if config.protect_collectable && item.collectable {
        return Some(ProtectReason::Collectable);
    }
    if config.protect_spiritbond && item.spiritbond > config.spiritbond_threshold {
        return Some(ProtectReason::Spiritbond);
    }
    None
}

/// Whether `item` may be considered for disposal under `config`.
pub fn is_eligible(item: &Item, config: &SafetyFilterConfig) -> bool {
    protect_reason(item, config).is_none()
}

/// The subset of `items` the passive engine may discard: present in the
/// auto-discard list and passing every protection rule. Blacklist membership
/// overrides auto-discard membership.
pub fn eligible_auto_discards(items: &[Item], config: &SafetyFilterConfig) -> Vec<Item> {
    items
        .iter()
        .filter(|item| config.auto_discard.contains(&item.id) && is_eligible(item, config))
        .cloned()
        .collect()
}

/// One deduplicated item row within a category group.
#[derive(Debug, Clone)]
pub struct GroupedItem {
    /// Representative record; first-seen slot's metadata wins.
    pub item: Item,
    /// Total quantity across all slots holding this item id.
    pub total_quantity: u64,
}

/// Items of one UI category, in first-seen order.
#[derive(Debug, Clone)]
pub struct CategoryGroup {
    /// UI category identifier.
    pub category: u32,
    /// Deduplicated items of this category.
    pub entries: Vec<GroupedItem>,
}

/// Aggregate `items` into category groups for presentation.
///
/// Groups are ordered by ascending category id. Within a group, slots are
/// deduplicated by item id with quantities summed; the first-seen slot's
/// metadata is kept. Pure aggregation; eligibility is not consulted.
pub fn group_by_category(items: &[Item]) -> Vec<CategoryGroup> {
    let mut groups: std::collections::BTreeMap<u32, Vec<GroupedItem>> =
        std::collections::BTreeMap::new();

    for item in items {
        let entries = groups.entry(item.category).or_default();
        match entries.iter_mut().find(|entry| entry.item.id == item.id) {
            Some(entry) => entry.total_quantity += u64::from(item.quantity),
            None => entries.push(GroupedItem {
                item: item.clone(),
                total_quantity: u64::from(item.quantity),
            }),
        }
    }

    groups
        .into_iter()
        .map(|(category, entries)| CategoryGroup { category, entries })
        .collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    /// Config with every protection rule disabled and empty lists.
    fn permissive() -> SafetyFilterConfig {
        SafetyFilterConfig {
            protect_special: false,
            protect_currency: false,
            protect_crystals: false,
            protect_gearset: false,
            protect_indisposable: false,
            protect_high_level_gear: false,
            item_level_ceiling: 45,
            protect_unique_untradeable: false,
            protect_high_quality: false,
            protect_collectable: false,
            protect_spiritbond: false,
            spiritbond_threshold: 0.0,
            blacklist: BTreeSet::new(),
            auto_discard: BTreeSet::new(),
        }
    }

    fn plain_item(id: u32) -> Item {
        Item::new(ItemId(id), format!("Item {id}"), 1)
    }

    #[test]
    fn everything_eligible_with_all_rules_disabled() {
        let config = permissive();
        let mut odd = plain_item(33_648);
        odd.high_quality = true;
        odd.collectable = true;
        odd.spiritbond = 57.0;
        odd.unique = true;
        odd.tradeable = false;
        odd.in_gearset = true;

        assert!(is_eligible(&plain_item(500), &config));
        assert!(is_eligible(&odd, &config));
    }

    #[test]
    fn blacklist_overrides_everything() {
        let mut config = permissive();
        config.blacklist.insert(ItemId(500));
        config.auto_discard.insert(ItemId(500));

        let item = plain_item(500);
        assert_eq!(protect_reason(&item, &config), Some(ProtectReason::Blacklisted));
        assert!(!is_eligible(&item, &config));
        assert!(eligible_auto_discards(&[item], &config).is_empty());
    }

    #[test]
    fn blacklist_reason_wins_over_other_matching_rules() {
        let mut config = SafetyFilterConfig::default();
        config.blacklist.insert(ItemId(33_648));

        // Also a special item, but the blacklist is still the reported reason.
        let item = plain_item(33_648);
        assert_eq!(protect_reason(&item, &config), Some(ProtectReason::Blacklisted));
    }

    #[test]
    fn special_item_rule() {
        let mut config = permissive();
        config.protect_special = true;
        assert_eq!(
            protect_reason(&plain_item(16_039), &config),
            Some(ProtectReason::SpecialItem)
        );
        assert!(is_eligible(&plain_item(16_038), &config));
    }

    #[test]
    fn currency_and_crystal_rules_split_the_low_id_range() {
        let mut config = permissive();
        config.protect_currency = true;
        config.protect_crystals = true;

        assert_eq!(protect_reason(&plain_item(1), &config), Some(ProtectReason::Currency));
        assert_eq!(protect_reason(&plain_item(8), &config), Some(ProtectReason::Crystal));
        assert_eq!(protect_reason(&plain_item(19), &config), Some(ProtectReason::Crystal));
        assert_eq!(protect_reason(&plain_item(20), &config), Some(ProtectReason::Currency));
        assert_eq!(protect_reason(&plain_item(99), &config), Some(ProtectReason::Currency));
        assert!(is_eligible(&plain_item(100), &config));
    }

    #[test]
    fn crystals_still_protected_when_currency_rule_is_off() {
        let mut config = permissive();
        config.protect_crystals = true;
        assert_eq!(protect_reason(&plain_item(8), &config), Some(ProtectReason::Crystal));
        assert!(is_eligible(&plain_item(50), &config));
    }

    #[test]
    fn gearset_rule() {
        let mut config = permissive();
        config.protect_gearset = true;
        let mut item = plain_item(4000);
        item.in_gearset = true;
        assert_eq!(protect_reason(&item, &config), Some(ProtectReason::InGearset));
    }

    #[test]
    fn indisposable_rule() {
        let mut config = permissive();
        config.protect_indisposable = true;
        let mut item = plain_item(4000);
        item.discardable = false;
        assert_eq!(protect_reason(&item, &config), Some(ProtectReason::Indisposable));
    }

    #[test]
    fn high_level_gear_rule_uses_the_ceiling() {
        let mut config = permissive();
        config.protect_high_level_gear = true;
        config.item_level_ceiling = 45;

        let mut at_ceiling = plain_item(4000);
        at_ceiling.item_level = 45;
        assert!(is_eligible(&at_ceiling, &config));

        let mut above = plain_item(4001);
        above.item_level = 46;
        assert_eq!(protect_reason(&above, &config), Some(ProtectReason::HighLevelGear));
    }

    #[test]
    fn unique_untradeable_requires_both_flags() {
        let mut config = permissive();
        config.protect_unique_untradeable = true;

        let mut unique_tradeable = plain_item(4000);
        unique_tradeable.unique = true;
        assert!(is_eligible(&unique_tradeable, &config));

        let mut both = plain_item(4001);
        both.unique = true;
        both.tradeable = false;
        assert_eq!(
            protect_reason(&both, &config),
            Some(ProtectReason::UniqueUntradeable)
        );
    }

    #[test]
    fn quality_collectable_and_spiritbond_rules() {
        let mut config = permissive();
        config.protect_high_quality = true;
        config.protect_collectable = true;
        config.protect_spiritbond = true;
        config.spiritbond_threshold = 0.0;

        let mut hq = plain_item(4000);
        hq.high_quality = true;
        assert_eq!(protect_reason(&hq, &config), Some(ProtectReason::HighQuality));

        let mut collectable = plain_item(4001);
        collectable.collectable = true;
        assert_eq!(
            protect_reason(&collectable, &config),
            Some(ProtectReason::Collectable)
        );

        let mut bonded = plain_item(4002);
        bonded.spiritbond = 0.5;
        assert_eq!(protect_reason(&bonded, &config), Some(ProtectReason::Spiritbond));

        let untouched = plain_item(4003);
        assert!(is_eligible(&untouched, &config));
    }

    #[test]
    fn enabling_a_rule_never_widens_eligibility() {
        let base = permissive();
        let items: Vec<Item> = (0..200u32)
            .map(|n| {
                let mut item = plain_item(n * 37 + 1);
                item.high_quality = n % 3 == 0;
                item.collectable = n % 5 == 0;
                item.unique = n % 7 == 0;
                item.tradeable = n % 2 == 0;
                item.item_level = n;
                item.spiritbond = (n % 11) as f32;
                item.in_gearset = n % 13 == 0;
                item.discardable = n % 17 != 0;
                item
            })
            .collect();

        let toggles: Vec<fn(&mut SafetyFilterConfig)> = vec![
            |c| c.protect_special = true,
            |c| c.protect_currency = true,
            |c| c.protect_crystals = true,
            |c| c.protect_gearset = true,
            |c| c.protect_indisposable = true,
            |c| c.protect_high_level_gear = true,
            |c| c.protect_unique_untradeable = true,
            |c| c.protect_high_quality = true,
            |c| c.protect_collectable = true,
            |c| c.protect_spiritbond = true,
        ];

        for toggle in toggles {
            let mut stricter = base.clone();
            toggle(&mut stricter);
            for item in &items {
                if is_eligible(item, &stricter) {
                    assert!(
                        is_eligible(item, &base),
                        "enabling a rule made {} eligible",
                        item.id
                    );
                }
            }
        }
    }

    #[test]
    fn auto_discard_list_intersects_with_eligibility() {
        let mut config = permissive();
        config.protect_high_quality = true;
        config.auto_discard.insert(ItemId(600));
        config.auto_discard.insert(ItemId(601));

        let mut hq = plain_item(600);
        hq.high_quality = true;
        let listed = plain_item(601);
        let unlisted = plain_item(602);

        let eligible = eligible_auto_discards(&[hq, listed, unlisted], &config);
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].id, ItemId(601));
    }

    #[test]
    fn grouping_orders_dedupes_and_sums() {
        let mut sword_a = plain_item(700);
        sword_a.category = 10;
        sword_a.quantity = 2;
        sword_a.high_quality = true; // first-seen metadata should win

        let mut potion = plain_item(701);
        potion.category = 5;
        potion.quantity = 9;

        let mut sword_b = plain_item(700);
        sword_b.category = 10;
        sword_b.quantity = 3;
        sword_b.high_quality = false;

        let groups = group_by_category(&[sword_a, potion, sword_b]);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].category, 5);
        assert_eq!(groups[1].category, 10);

        let swords = &groups[1].entries;
        assert_eq!(swords.len(), 1);
        assert_eq!(swords[0].total_quantity, 5);
        assert!(swords[0].item.high_quality, "first-seen metadata must win");
    }

    #[test]
    fn grouping_is_pure_presentation_and_ignores_eligibility() {
        let mut config = SafetyFilterConfig::default();
        config.blacklist.insert(ItemId(700));

        let mut item = plain_item(700);
        item.category = 3;

        // Blacklisted items still show up in presentation groups.
        let groups = group_by_category(std::slice::from_ref(&item));
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].entries[0].item.id, ItemId(700));
    }

    #[test]
    fn config_toml_round_trip() {
        let mut config = SafetyFilterConfig::default();
        config.blacklist.insert(ItemId(123));
        config.auto_discard.insert(ItemId(456));
        config.item_level_ceiling = 520;

        let text = toml::to_string(&config).unwrap();
        let restored: SafetyFilterConfig = toml::from_str(&text).unwrap();

        assert!(restored.blacklist.contains(&ItemId(123)));
        assert!(restored.auto_discard.contains(&ItemId(456)));
        assert_eq!(restored.item_level_ceiling, 520);
    }
}
