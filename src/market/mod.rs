//! Market price cache manager.
//!
//! A TTL cache of item price lookups with in-flight deduplication, rate
//! limited dispatch, and stuck-fetch reclamation. Reads never block and
//! never trigger a fetch; fetches are short-lived background tasks against
//! the external [`MarketPriceProvider`], dispatched in bounded batches from
//! the engine tick.
//!
//! The cache and the fetch registry are guarded by independent locks; no
//! critical section performs I/O or takes the other lock.

pub mod provider;

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::MarketConfig;
use crate::game::{Item, ItemId};

pub use provider::{MarketError, MarketPriceProvider, StaticPriceProvider};

/// Result of a freshness read against the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceStatus {
    /// A fresh price in gil.
    Fresh(u64),
    /// A fresh "looked up, nothing there / lookup failed" marker.
    Failed,
    /// Never looked up, or the entry has expired.
    NotRequested,
}

#[derive(Debug, Clone, Copy)]
enum LookupResult {
    Priced(u64),
    NoData,
}

struct PriceEntry {
    result: LookupResult,
    fetched_at: Instant,
}

/// Book-keeping for lookups that are queued or in flight.
#[derive(Default)]
struct FetchRegistry {
    /// Fetch start time per in-flight item id.
    in_flight: HashMap<ItemId, Instant>,
    /// Items awaiting dispatch, oldest first.
    pending: VecDeque<(ItemId, bool)>,
    /// Dedup set mirroring `pending`.
    pending_ids: HashSet<ItemId>,
    /// Last dispatch cycle that sent requests.
    last_dispatch: Option<Instant>,
    /// Market context generation; bumped on world change.
    generation: u64,
}

/// TTL price cache with deduplicating, rate-limited background fetches.
///
/// Cheap to clone; clones share the same cache and registry.
#[derive(Clone)]
pub struct PriceCacheManager {
    provider: Arc<dyn MarketPriceProvider>,
    config: MarketConfig,
    prices: Arc<Mutex<HashMap<ItemId, PriceEntry>>>,
    registry: Arc<Mutex<FetchRegistry>>,
}

impl PriceCacheManager {
    /// Create a manager over `provider` with the given policy.
    pub fn new(provider: Arc<dyn MarketPriceProvider>, config: MarketConfig) -> Self {
        Self {
            provider,
            config,
            prices: Arc::new(Mutex::new(HashMap::new())),
            registry: Arc::new(Mutex::new(FetchRegistry::default())),
        }
    }

    /// Freshness read at `now`. Never blocks, never fetches.
    ///
    /// Expired entries read as [`PriceStatus::NotRequested`]; they are
    /// overwritten in place by the next fetch rather than deleted.
    pub fn try_get_fresh_at(&self, id: ItemId, now: Instant) -> PriceStatus {
        let prices = self.prices.lock().unwrap_or_else(|e| e.into_inner());
        match prices.get(&id) {
            Some(entry) if now.duration_since(entry.fetched_at) < self.config.price_ttl() => {
                match entry.result {
                    LookupResult::Priced(gil) => PriceStatus::Fresh(gil),
                    LookupResult::NoData => PriceStatus::Failed,
                }
            }
            _ => PriceStatus::NotRequested,
        }
    }

    /// Freshness read against the wall clock.
    pub fn try_get_fresh(&self, id: ItemId) -> PriceStatus {
        self.try_get_fresh_at(id, Instant::now())
    }

    /// Queue a lookup for `item` unless one is unnecessary.
    ///
    /// No-op when the item is untradeable, the cache entry is still fresh,
    /// or a lookup is already queued or in flight: at most one fetch per
    /// item id is ever outstanding. Returns whether the item was queued.
    pub fn request_fetch_at(&self, item: &Item, now: Instant) -> bool {
        if !item.tradeable {
            return false;
        }
        if self.try_get_fresh_at(item.id, now) != PriceStatus::NotRequested {
            return false;
        }

        let mut registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        if registry.in_flight.contains_key(&item.id) || registry.pending_ids.contains(&item.id) {
            return false;
        }
        registry.pending.push_back((item.id, item.high_quality));
        registry.pending_ids.insert(item.id);
        debug!("queued market lookup for {} ({})", item.name, item.id);
        true
    }

    /// Queue a lookup against the wall clock.
    pub fn request_fetch(&self, item: &Item) -> bool {
        self.request_fetch_at(item, Instant::now())
    }

    /// Dispatch queued lookups, bounded by the rate-limit policy.
    ///
    /// At most `dispatch_batch` requests leave per cycle, and cycles are
    /// spaced at least `dispatch_interval` apart; overflow stays queued for
    /// subsequent cycles. Returns the number of requests dispatched. Must
    /// run inside a tokio runtime.
    pub fn dispatch_pending_at(&self, now: Instant) -> usize {
        let jobs = {
            let mut registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
            if registry.pending.is_empty() {
                return 0;
            }
            if let Some(last) = registry.last_dispatch {
                if now.duration_since(last) < self.config.dispatch_interval() {
                    return 0;
                }
            }

            let mut jobs = Vec::new();
            while jobs.len() < self.config.dispatch_batch {
                let Some((id, high_quality)) = registry.pending.pop_front() else {
                    break;
                };
                registry.pending_ids.remove(&id);
                registry.in_flight.insert(id, now);
                jobs.push((id, high_quality, registry.generation));
            }
            registry.last_dispatch = Some(now);
            jobs
        };

        let dispatched = jobs.len();
        for (id, high_quality, generation) in jobs {
            let manager = self.clone();
            tokio::spawn(async move {
                let outcome = manager.provider.fetch_price(id, high_quality).await;
                manager.record_result_at(id, generation, outcome, Instant::now());
            });
        }

        if dispatched > 0 {
            debug!("dispatched {dispatched} market lookups");
        }
        dispatched
    }

    /// Write a completed lookup into the cache and clear its registry entry.
    ///
    /// Results from a previous market context (older `generation`) are
    /// discarded. Provider errors become failed entries; they are logged
    /// here and never surfaced to callers.
    fn record_result_at(
        &self,
        id: ItemId,
        generation: u64,
        outcome: Result<Option<u64>, MarketError>,
        now: Instant,
    ) {
        {
            let mut registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
            registry.in_flight.remove(&id);
            if registry.generation != generation {
                debug!("dropping market result for {id} from a stale context");
                return;
            }
        }

        let result = match outcome {
            Ok(Some(gil)) => LookupResult::Priced(gil),
            Ok(None) => {
                debug!("no market listings for {id}");
                LookupResult::NoData
            }
            Err(e) => {
                warn!("market lookup for {id} failed: {e}");
                LookupResult::NoData
            }
        };

        self.prices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(
                id,
                PriceEntry {
                    result,
                    fetched_at: now,
                },
            );
    }

    /// Convert fetches older than the fetch timeout into failed entries.
    ///
    /// Guarantees the registry cannot leak entries even if the provider
    /// never responds. Returns the number of reclaimed fetches.
    pub fn reclaim_stuck_at(&self, now: Instant) -> usize {
        let stuck: Vec<ItemId> = {
            let mut registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
            let timeout = self.config.fetch_timeout();
            let expired: Vec<ItemId> = registry
                .in_flight
                .iter()
                .filter(|(_, started)| now.duration_since(**started) >= timeout)
                .map(|(id, _)| *id)
                .collect();
            for id in &expired {
                registry.in_flight.remove(id);
            }
            expired
        };

        if stuck.is_empty() {
            return 0;
        }

        warn!("reclaiming {} stuck market lookups", stuck.len());
        let mut prices = self.prices.lock().unwrap_or_else(|e| e.into_inner());
        let count = stuck.len();
        for id in stuck {
            prices.insert(
                id,
                PriceEntry {
                    result: LookupResult::NoData,
                    fetched_at: now,
                },
            );
        }
        count
    }

    /// Invalidate the whole cache after a market context (world) change.
    ///
    /// In-flight fetches from the old context are left to complete; their
    /// results are discarded by the generation check. Queued lookups are
    /// dropped; stale reads re-request them under the new context.
    pub fn invalidate_all(&self) {
        {
            let mut registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
            registry.generation += 1;
            registry.pending.clear();
            registry.pending_ids.clear();
        }
        let mut prices = self.prices.lock().unwrap_or_else(|e| e.into_inner());
        let dropped = prices.len();
        prices.clear();
        info!("market context changed; dropped {dropped} cached prices");
    }

    /// Number of lookups currently in flight.
    pub fn in_flight_count(&self) -> usize {
        self.registry
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .in_flight
            .len()
    }

    /// Number of lookups queued for dispatch.
    pub fn pending_count(&self) -> usize {
        self.registry
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pending
            .len()
    }
}
