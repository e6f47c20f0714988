//! Engine facade.
//!
//! Owns the shared task queue, the discard pipeline, the price cache
//! manager, the passive trigger engine, and the mutable safety-filter
//! rules, and exposes the whole engine behind one handle. The host calls
//! [`DisposalCoordinator::tick`] once per frame/interval; everything else
//! is non-blocking command and copy-out status methods, safe to call from a
//! draw loop.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::config::MiddenConfig;
use crate::discard::{DiscardPipeline, DiscardRunRecord, DiscardStatus};
use crate::error::{MiddenError, Result};
use crate::filter::{self, ProtectReason, SafetyFilterConfig};
use crate::game::{
    DialogObserver, GameActionExecutor, InventorySnapshotProvider, Item, ItemId, PlayerStateProbe,
};
use crate::market::{MarketPriceProvider, PriceCacheManager, PriceStatus};
use crate::passive::{PassiveEngine, PassiveStatus};
use crate::queue::TaskQueue;

/// Interval between stuck-fetch reclamation sweeps.
const RECLAIM_INTERVAL: Duration = Duration::from_secs(5);

/// One handle over the whole disposal engine.
pub struct DisposalCoordinator {
    config: MiddenConfig,
    queue: Arc<TaskQueue>,
    pipeline: DiscardPipeline,
    market: PriceCacheManager,
    passive: PassiveEngine,
    filter: Mutex<SafetyFilterConfig>,
    last_passive_cycle: Mutex<Option<Instant>>,
    last_reclaim: Mutex<Option<Instant>>,
}

impl DisposalCoordinator {
    /// Wire the engine over the given collaborators.
    pub fn new(
        config: MiddenConfig,
        inventory: Arc<dyn InventorySnapshotProvider>,
        actions: Arc<dyn GameActionExecutor>,
        dialogs: Arc<dyn DialogObserver>,
        probe: Arc<dyn PlayerStateProbe>,
        prices: Arc<dyn MarketPriceProvider>,
    ) -> Self {
        let queue = Arc::new(TaskQueue::new());
        let pipeline = DiscardPipeline::new(
            Arc::clone(&queue),
            actions,
            dialogs,
            config.discard.clone(),
        );
        let market = PriceCacheManager::new(prices, config.market.clone());
        let passive = PassiveEngine::new(
            probe,
            inventory,
            pipeline.clone(),
            config.passive.clone(),
        );
        let filter = Mutex::new(config.filter.clone());

        Self {
            config,
            queue,
            pipeline,
            market,
            passive,
            filter,
            last_passive_cycle: Mutex::new(None),
            last_reclaim: Mutex::new(None),
        }
    }

    /// Persist discard run history to `path`, loading whatever is there.
    pub fn with_history_path(mut self, path: PathBuf) -> Self {
        self.pipeline = self.pipeline.clone().with_history_path(path);
        self
    }

    // ─── Tick ─────────────────────────────────────────────────────────────────

    /// Step the engine at `now`: run due queue work, the periodic passive
    /// cycle, fetch dispatch, and stuck-fetch reclamation.
    ///
    /// Price fetch dispatch spawns background tasks, so ticks must run
    /// inside a tokio runtime when price lookups are in use.
    pub fn tick_at(&self, now: Instant) {
        self.queue.tick_at(now);

        if self.interval_elapsed(&self.last_passive_cycle, self.config.passive.cycle_interval(), now)
        {
            let rules = self.filter.lock().unwrap_or_else(|e| e.into_inner()).clone();
            self.passive.cycle_at(&rules, now);
        }

        self.market.dispatch_pending_at(now);

        if self.interval_elapsed(&self.last_reclaim, RECLAIM_INTERVAL, now) {
            self.market.reclaim_stuck_at(now);
        }
    }

    /// Step the engine against the wall clock.
    pub fn tick(&self) {
        self.tick_at(Instant::now());
    }

    fn interval_elapsed(&self, slot: &Mutex<Option<Instant>>, interval: Duration, now: Instant) -> bool {
        let mut last = slot.lock().unwrap_or_else(|e| e.into_inner());
        match *last {
            Some(at) if now.duration_since(at) < interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }

    // ─── Discard ──────────────────────────────────────────────────────────────

    /// Start a discard job over `selection`, applying the safety filter
    /// first. Returns the number of items actually handed to the pipeline.
    ///
    /// # Errors
    ///
    /// Rejects an empty or fully-protected selection, and rejects starting
    /// while another job is active.
    pub fn start_discard(&self, selection: Vec<Item>) -> Result<usize> {
        let rules = self.filter.lock().unwrap_or_else(|e| e.into_inner()).clone();
        let eligible: Vec<Item> = selection
            .iter()
            .filter(|item| filter::is_eligible(item, &rules))
            .cloned()
            .collect();

        if !selection.is_empty() && eligible.is_empty() {
            return Err(MiddenError::Discard(
                "no eligible items in selection: every item is protected".to_owned(),
            ));
        }

        let count = eligible.len();
        self.pipeline.start(eligible)?;
        Ok(count)
    }

    /// Cancel the active discard job, if any.
    pub fn cancel_discard(&self) -> bool {
        self.pipeline.cancel()
    }

    /// Copy-out discard pipeline status.
    pub fn discard_status(&self) -> DiscardStatus {
        self.pipeline.status()
    }

    /// Finished discard runs, oldest first.
    pub fn discard_history(&self) -> Vec<DiscardRunRecord> {
        self.pipeline.history()
    }

    // ─── Prices ───────────────────────────────────────────────────────────────

    /// Queue a market lookup for `item` unless one is unnecessary.
    pub fn request_price(&self, item: &Item) -> bool {
        self.market.request_fetch(item)
    }

    /// Freshness read against the price cache. Never blocks, never fetches.
    pub fn try_get_fresh_price(&self, id: ItemId) -> PriceStatus {
        self.market.try_get_fresh(id)
    }

    /// Drop every cached price after a market context (world) change.
    pub fn invalidate_prices(&self) {
        self.market.invalidate_all();
    }

    // ─── Safety filter ────────────────────────────────────────────────────────

    /// Current safety-filter rules (copy).
    pub fn filter_config(&self) -> SafetyFilterConfig {
        self.filter.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Replace the safety-filter rules.
    pub fn set_filter_config(&self, rules: SafetyFilterConfig) {
        *self.filter.lock().unwrap_or_else(|e| e.into_inner()) = rules;
    }

    /// Add an item to the blacklist. Returns whether it was newly added.
    pub fn blacklist_add(&self, id: ItemId) -> bool {
        self.filter
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .blacklist
            .insert(id)
    }

    /// Remove an item from the blacklist. Returns whether it was present.
    pub fn blacklist_remove(&self, id: ItemId) -> bool {
        self.filter
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .blacklist
            .remove(&id)
    }

    /// Add an item to the auto-discard list. Returns whether it was newly
    /// added.
    pub fn auto_discard_add(&self, id: ItemId) -> bool {
        self.filter
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .auto_discard
            .insert(id)
    }

    /// Remove an item from the auto-discard list. Returns whether it was
    /// present.
    pub fn auto_discard_remove(&self, id: ItemId) -> bool {
        self.filter
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .auto_discard
            .remove(&id)
    }

    /// Why `item` is protected, or `None` when it is eligible.
    pub fn protect_reason(&self, item: &Item) -> Option<ProtectReason> {
        let rules = self.filter.lock().unwrap_or_else(|e| e.into_inner()).clone();
        filter::protect_reason(item, &rules)
    }

    /// The eligible subset of `items` under the current rules.
    pub fn eligible_items(&self, items: &[Item]) -> Vec<Item> {
        let rules = self.filter.lock().unwrap_or_else(|e| e.into_inner()).clone();
        items
            .iter()
            .filter(|item| filter::is_eligible(item, &rules))
            .cloned()
            .collect()
    }

    // ─── Passive ──────────────────────────────────────────────────────────────

    /// Verdict of the most recent passive cycle.
    pub fn passive_status(&self) -> PassiveStatus {
        self.passive.status()
    }

    /// Switch passive discarding on or off.
    pub fn set_passive_enabled(&self, enabled: bool) {
        self.passive.set_enabled(enabled);
    }

    /// Change the idle time required before a passive trigger.
    pub fn set_idle_threshold(&self, threshold: Duration) {
        self.passive.set_idle_threshold(threshold);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::config::{DiscardConfig, PassiveConfig};
    use crate::game::mock::{MockDialogs, MockGameActions, MockInventory, MockProbe};
    use crate::market::StaticPriceProvider;

    const SAFE_ZONE: u32 = 128;

    struct Rig {
        inventory: Arc<MockInventory>,
        actions: Arc<MockGameActions>,
        probe: Arc<MockProbe>,
        provider: Arc<StaticPriceProvider>,
        coordinator: DisposalCoordinator,
    }

    fn test_config() -> MiddenConfig {
        let mut config = MiddenConfig::default();
        config.discard = DiscardConfig {
            poll_interval_ms: 100,
            ..DiscardConfig::default()
        };
        config.passive = PassiveConfig {
            enabled: false,
            idle_threshold_secs: 30,
            cooldown_secs: 300,
            cycle_secs: 5,
            snapshot_ttl_secs: 10,
            allowed_zones: vec![SAFE_ZONE],
        };
        config
    }

    fn rig_with(config: MiddenConfig, items: Vec<Item>) -> Rig {
        let inventory = Arc::new(MockInventory::new(items));
        let actions = Arc::new(MockGameActions::new());
        let probe = Arc::new(MockProbe::idle_in(SAFE_ZONE));
        let provider = Arc::new(StaticPriceProvider::new());
        let coordinator = DisposalCoordinator::new(
            config,
            inventory.clone(),
            actions.clone(),
            Arc::new(MockDialogs::appearing_after(0)),
            probe.clone(),
            provider.clone(),
        );
        Rig {
            inventory,
            actions,
            probe,
            provider,
            coordinator,
        }
    }

    fn plain(id: u32) -> Item {
        Item::new(ItemId(id), format!("Item {id}"), 1)
    }

    /// Route engine logs to the test harness (`RUST_LOG=debug` to see them).
    fn init_logging() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    /// Tick on a logical clock until the discard pipeline leaves the
    /// running state or `max_steps` pass.
    fn drive_discard(rig: &Rig, start: Instant, step: Duration, max_steps: usize) {
        let mut now = start;
        for _ in 0..max_steps {
            rig.coordinator.tick_at(now);
            if !matches!(rig.coordinator.discard_status(), DiscardStatus::Running { .. }) {
                break;
            }
            now += step;
        }
    }

    #[test]
    fn manual_discard_applies_the_safety_filter_first() {
        let rig = rig_with(test_config(), Vec::new());

        let mut protected = plain(900);
        protected.high_quality = true;
        let selection = vec![plain(901), protected, plain(902)];

        let started = rig.coordinator.start_discard(selection).unwrap();
        assert_eq!(started, 2);

        drive_discard(&rig, Instant::now(), Duration::from_millis(100), 200);

        assert_eq!(rig.actions.discard_order(), vec![ItemId(901), ItemId(902)]);
        assert_eq!(
            rig.coordinator.discard_status(),
            DiscardStatus::Completed { discarded: 2 }
        );
    }

    #[test]
    fn fully_protected_selection_is_rejected() {
        let rig = rig_with(test_config(), Vec::new());
        let mut protected = plain(900);
        protected.high_quality = true;

        let result = rig.coordinator.start_discard(vec![protected]);
        assert!(matches!(
            result,
            Err(MiddenError::Discard(ref msg)) if msg.contains("protected")
        ));
        assert_eq!(rig.coordinator.discard_status(), DiscardStatus::Idle);
    }

    #[test]
    fn blacklist_mutations_take_effect_immediately() {
        let rig = rig_with(test_config(), Vec::new());

        assert!(rig.coordinator.blacklist_add(ItemId(901)));
        assert!(!rig.coordinator.blacklist_add(ItemId(901)), "double add");
        assert_eq!(
            rig.coordinator.protect_reason(&plain(901)),
            Some(ProtectReason::Blacklisted)
        );

        let eligible = rig.coordinator.eligible_items(&[plain(901), plain(902)]);
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].id, ItemId(902));

        assert!(rig.coordinator.blacklist_remove(ItemId(901)));
        assert_eq!(rig.coordinator.protect_reason(&plain(901)), None);
    }

    #[test]
    fn passive_flow_triggers_and_completes_through_ticks() {
        init_logging();
        let mut config = test_config();
        config.passive.enabled = true;
        config.filter.auto_discard.insert(ItemId(500));
        config.filter.auto_discard.insert(ItemId(501));

        let rig = rig_with(config, vec![plain(500), plain(501)]);

        let t0 = Instant::now();
        let mut now = t0;
        // Two minutes of one-second ticks: idle threshold passes at 30 s,
        // then the triggered job runs to completion through the same ticks.
        for _ in 0..120 {
            rig.coordinator.tick_at(now);
            now += Duration::from_secs(1);
        }

        assert_eq!(
            rig.coordinator.discard_status(),
            DiscardStatus::Completed { discarded: 2 }
        );
        assert_eq!(rig.actions.discard_order(), vec![ItemId(500), ItemId(501)]);

        // Cooldown holds after the run.
        assert!(matches!(
            rig.coordinator.passive_status(),
            PassiveStatus::Cooldown { .. } | PassiveStatus::WaitingForIdle { .. }
        ));
    }

    #[test]
    fn passive_stays_quiet_while_busy_or_disabled() {
        let mut config = test_config();
        config.passive.enabled = true;
        config.filter.auto_discard.insert(ItemId(500));
        let rig = rig_with(config, vec![plain(500)]);

        rig.probe.set_busy(true);
        let mut now = Instant::now();
        for _ in 0..20 {
            rig.coordinator.tick_at(now);
            now += Duration::from_secs(5);
        }
        assert_eq!(rig.coordinator.passive_status(), PassiveStatus::PlayerBusy);
        assert_eq!(rig.actions.attempts(), 0);

        rig.coordinator.set_passive_enabled(false);
        rig.probe.set_busy(false);
        for _ in 0..20 {
            rig.coordinator.tick_at(now);
            now += Duration::from_secs(5);
        }
        assert_eq!(rig.coordinator.passive_status(), PassiveStatus::Disabled);
        assert_eq!(rig.actions.attempts(), 0);
    }

    #[tokio::test]
    async fn price_requests_flow_through_the_tick() {
        let rig = rig_with(test_config(), Vec::new());
        rig.provider.insert(ItemId(700), false, 12_345);

        let item = plain(700);
        assert_eq!(
            rig.coordinator.try_get_fresh_price(item.id),
            PriceStatus::NotRequested
        );
        assert!(rig.coordinator.request_price(&item));

        rig.coordinator.tick_at(Instant::now());
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(
            rig.coordinator.try_get_fresh_price(item.id),
            PriceStatus::Fresh(12_345)
        );

        // World change drops the cache.
        rig.coordinator.invalidate_prices();
        assert_eq!(
            rig.coordinator.try_get_fresh_price(item.id),
            PriceStatus::NotRequested
        );
    }

    #[test]
    fn idle_threshold_setter_reaches_the_passive_engine() {
        let mut config = test_config();
        config.passive.enabled = true;
        config.filter.auto_discard.insert(ItemId(500));
        let rig = rig_with(config, vec![plain(500)]);

        rig.coordinator.set_idle_threshold(Duration::from_secs(5));

        let t0 = Instant::now();
        rig.coordinator.tick_at(t0);
        rig.coordinator.tick_at(t0 + Duration::from_secs(6));

        assert!(matches!(
            rig.coordinator.discard_status(),
            DiscardStatus::Running { .. }
        ));
    }

    #[test]
    fn inventory_snapshot_is_cached_between_passive_cycles() {
        let mut config = test_config();
        config.passive.enabled = true;
        config.filter.auto_discard.insert(ItemId(500));
        let rig = rig_with(config, vec![plain(500)]);

        let t0 = Instant::now();
        rig.coordinator.tick_at(t0);
        rig.coordinator.tick_at(t0 + Duration::from_secs(5));
        assert_eq!(rig.inventory.snapshot_calls(), 1);
    }
}
