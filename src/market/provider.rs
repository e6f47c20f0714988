//! Market price provider contract.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::game::ItemId;

/// Error type for market price lookups.
#[derive(Debug, Clone)]
pub enum MarketError {
    /// The provider is unreachable or rate-limited upstream.
    Unavailable(String),
    /// Unexpected error from the provider.
    Backend(String),
}

impl fmt::Display for MarketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketError::Unavailable(msg) => write!(f, "market unavailable: {msg}"),
            MarketError::Backend(msg) => write!(f, "market error: {msg}"),
        }
    }
}

impl std::error::Error for MarketError {}

/// Asynchronous market price lookups.
///
/// The cache manager absorbs failures into failed cache entries; provider
/// errors never reach engine callers.
#[async_trait]
pub trait MarketPriceProvider: Send + Sync {
    /// Lowest listed unit price in gil, or `None` when nothing is listed.
    async fn fetch_price(&self, id: ItemId, high_quality: bool) -> Result<Option<u64>, MarketError>;
}

/// A table-backed provider for tests and offline operation.
///
/// Optionally sleeps before answering to simulate lookup latency, and can
/// be told to fail for specific item ids.
#[derive(Default)]
pub struct StaticPriceProvider {
    prices: Mutex<HashMap<(ItemId, bool), u64>>,
    failing: Mutex<Vec<ItemId>>,
    calls: Mutex<Vec<ItemId>>,
    latency: Option<Duration>,
}

impl StaticPriceProvider {
    /// Create an empty provider (every lookup reports no listings).
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a provider that sleeps for `latency` before each answer.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// Set the price for an item/quality pair.
    pub fn insert(&self, id: ItemId, high_quality: bool, price: u64) {
        self.prices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert((id, high_quality), price);
    }

    /// Make lookups for `id` fail with a backend error.
    pub fn fail_item(&self, id: ItemId) {
        self.failing.lock().unwrap_or_else(|e| e.into_inner()).push(id);
    }

    /// Item ids fetched so far, in request order.
    pub fn fetch_calls(&self) -> Vec<ItemId> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl MarketPriceProvider for StaticPriceProvider {
    async fn fetch_price(&self, id: ItemId, high_quality: bool) -> Result<Option<u64>, MarketError> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).push(id);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        if self
            .failing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&id)
        {
            return Err(MarketError::Backend(format!("no data source for {id}")));
        }

        Ok(self
            .prices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(id, high_quality))
            .copied())
    }
}
