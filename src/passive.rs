//! Passive trigger engine.
//!
//! Watches player-busy/zone signals and autonomously starts the discard
//! pipeline once the player has been idle long enough in an allowed zone,
//! with a cooldown between automatic runs. A pure gating state machine: the
//! only I/O is the probe, the short-TTL inventory snapshot, and the pipeline
//! invocation itself.
//!
//! Gate order per cycle: enabled → eligible items present → player idle →
//! allowed zone → idle threshold → cooldown → trigger. An active discard
//! job counts as busy.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::config::PassiveConfig;
use crate::discard::DiscardPipeline;
use crate::filter::{self, SafetyFilterConfig};
use crate::game::{InventorySnapshotProvider, Item, PlayerStateProbe};

/// Copy-out gating verdict of one passive cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum PassiveStatus {
    /// Passive discarding is switched off.
    Disabled,
    /// No eligible auto-discard items are present.
    NoItems,
    /// The player (or an active discard job) is busy.
    PlayerBusy,
    /// The current zone is not on the allow-list.
    NotInAllowedZone,
    /// Idle, but not long enough yet.
    WaitingForIdle {
        /// Time idle so far.
        elapsed: Duration,
        /// Idle time required before a trigger.
        required: Duration,
    },
    /// All gates passed, but the cooldown since the last automatic trigger
    /// has not elapsed.
    Cooldown {
        /// Time left on the cooldown.
        remaining: Duration,
    },
    /// The discard pipeline was started this cycle.
    Triggered {
        /// Items handed to the pipeline.
        items: usize,
    },
}

struct EligibleSnapshot {
    items: Vec<Item>,
    taken_at: Instant,
}

struct PassiveState {
    enabled: bool,
    idle_threshold: Duration,
    idle_since: Option<Instant>,
    busy: bool,
    last_trigger: Option<Instant>,
    snapshot: Option<EligibleSnapshot>,
    last_status: PassiveStatus,
}

/// The passive trigger engine.
pub struct PassiveEngine {
    probe: Arc<dyn PlayerStateProbe>,
    inventory: Arc<dyn InventorySnapshotProvider>,
    pipeline: DiscardPipeline,
    config: PassiveConfig,
    state: Mutex<PassiveState>,
}

impl PassiveEngine {
    /// Create an engine gating `pipeline` behind the given policy.
    pub fn new(
        probe: Arc<dyn PlayerStateProbe>,
        inventory: Arc<dyn InventorySnapshotProvider>,
        pipeline: DiscardPipeline,
        config: PassiveConfig,
    ) -> Self {
        let state = PassiveState {
            enabled: config.enabled,
            idle_threshold: config.idle_threshold(),
            idle_since: None,
            busy: false,
            last_trigger: None,
            snapshot: None,
            last_status: PassiveStatus::Disabled,
        };
        Self {
            probe,
            inventory,
            pipeline,
            config,
            state: Mutex::new(state),
        }
    }

    /// Switch passive discarding on or off.
    ///
    /// Turning it on restarts the idle clock: the first enabled cycle
    /// counts as the start of the idle period.
    pub fn set_enabled(&self, enabled: bool) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if enabled && !state.enabled {
            state.idle_since = None;
            state.busy = false;
        }
        if state.enabled != enabled {
            info!("passive discarding {}", if enabled { "enabled" } else { "disabled" });
        }
        state.enabled = enabled;
    }

    /// Whether passive discarding is currently enabled.
    pub fn enabled(&self) -> bool {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).enabled
    }

    /// Change the required idle time before a trigger.
    pub fn set_idle_threshold(&self, threshold: Duration) {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .idle_threshold = threshold;
    }

    /// Verdict of the most recent cycle.
    pub fn status(&self) -> PassiveStatus {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last_status
            .clone()
    }

    /// Run one gating cycle at `now` under the current filter rules.
    pub fn cycle_at(&self, filter: &SafetyFilterConfig, now: Instant) -> PassiveStatus {
        let (enabled, cached) = {
            let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            let cached = state.snapshot.as_ref().and_then(|snapshot| {
                if now.duration_since(snapshot.taken_at) < self.config.snapshot_ttl() {
                    Some(snapshot.items.clone())
                } else {
                    None
                }
            });
            (state.enabled, cached)
        };

        if !enabled {
            return self.set_status(PassiveStatus::Disabled);
        }

        let eligible = match cached {
            Some(items) => items,
            None => {
                let items = match self.inventory.items(false) {
                    Ok(items) => items,
                    Err(e) => {
                        warn!("passive cycle cannot read inventory: {e}");
                        Vec::new()
                    }
                };
                let eligible = filter::eligible_auto_discards(&items, filter);
                let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
                state.snapshot = Some(EligibleSnapshot {
                    items: eligible.clone(),
                    taken_at: now,
                });
                eligible
            }
        };

        if eligible.is_empty() {
            return self.set_status(PassiveStatus::NoItems);
        }

        let busy = self.probe.is_busy() || self.pipeline.is_active();
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if busy {
                state.busy = true;
                drop(state);
                return self.set_status(PassiveStatus::PlayerBusy);
            }
            // A busy→idle transition (or the first idle cycle) restarts the
            // idle clock.
            if state.busy || state.idle_since.is_none() {
                state.idle_since = Some(now);
            }
            state.busy = false;
        }

        let zone = self.probe.current_zone_id();
        if !self.config.allowed_zones.contains(&zone) {
            return self.set_status(PassiveStatus::NotInAllowedZone);
        }

        let (idle_since, threshold, last_trigger) = {
            let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            (
                state.idle_since.unwrap_or(now),
                state.idle_threshold,
                state.last_trigger,
            )
        };

        let elapsed = now.duration_since(idle_since);
        if elapsed < threshold {
            return self.set_status(PassiveStatus::WaitingForIdle {
                elapsed,
                required: threshold,
            });
        }

        if let Some(last) = last_trigger {
            let since = now.duration_since(last);
            if since < self.config.cooldown() {
                return self.set_status(PassiveStatus::Cooldown {
                    remaining: self.config.cooldown() - since,
                });
            }
        }

        let count = eligible.len();
        match self.pipeline.start(eligible) {
            Ok(()) => {
                self.state
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .last_trigger = Some(now);
                info!("passive trigger: discarding {count} items");
                self.set_status(PassiveStatus::Triggered { items: count })
            }
            Err(e) => {
                warn!("passive trigger could not start a discard job: {e}");
                self.set_status(PassiveStatus::PlayerBusy)
            }
        }
    }

    fn set_status(&self, status: PassiveStatus) -> PassiveStatus {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last_status = status.clone();
        status
    }
}
