//! Midden: safety-gated bulk inventory disposal engine.
//!
//! Automates bulk disposal of items from a slot-based inventory, gated by
//! layered safety rules, with live market-value information on the side.
//!
//! # Architecture
//!
//! The engine is a set of components stepped by one cooperative tick:
//! - **Task queue**: FIFO closures plus delay gates; the only place
//!   sequencing decisions are made for the pipelines
//! - **Safety filter**: pure rules deciding, per item, whether it may ever
//!   be considered for disposal
//! - **Price cache**: TTL cache over an external market provider, with
//!   in-flight deduplication, rate-limited dispatch, and stuck-fetch
//!   reclamation
//! - **Discard pipeline**: per-item state machine driving the game's
//!   confirmation dialog with bounded retries and a hard timeout
//! - **Passive engine**: idle/zone/cooldown gating that re-arms the discard
//!   pipeline autonomously
//!
//! The game client itself sits behind the collaborator traits in [`game`];
//! [`coordinator::DisposalCoordinator`] wires everything together behind
//! one handle.

pub mod config;
pub mod coordinator;
pub mod discard;
pub mod error;
pub mod filter;
pub mod game;
pub mod market;
pub mod passive;
pub mod queue;

pub use config::MiddenConfig;
pub use coordinator::DisposalCoordinator;
pub use discard::{DiscardPipeline, DiscardRunRecord, DiscardStatus, RunOutcome};
pub use error::{MiddenError, Result};
pub use filter::{ProtectReason, SafetyFilterConfig};
pub use game::{Item, ItemId};
pub use market::{MarketPriceProvider, PriceCacheManager, PriceStatus};
pub use passive::{PassiveEngine, PassiveStatus};
pub use queue::TaskQueue;
