//! Shopcore - credit ledger and deferred reward settlement
//!
//! Game-server shop modules award and deduct credits through this crate. It
//! records every balance-affecting event in an append-only ledger, batches
//! rewards queued during play into one balance mutation per player on a short
//! periodic cycle, and keeps scheduled work from outliving a reload.

pub mod clock;
pub mod config;
pub mod cooldown;
pub mod economy;
pub mod engine;
pub mod epoch;
pub mod errors;
pub mod interval_rewards;
pub mod ledger;
pub mod metrics;
pub mod notify;
pub mod rewards;
pub mod scheduler;
pub mod storage;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigLoader, LedgerBackend, ShopConfig};
pub use cooldown::{CooldownGate, CooldownOutcome};
pub use economy::{EconomyMutator, InMemoryEconomy, MutationError, PlayerDirectory, StaticDirectory};
pub use engine::ShopEngine;
pub use epoch::{Epoch, EpochGuard, EpochTicket, LifecycleEpoch};
pub use errors::{ShopError, ShopResult};
pub use interval_rewards::IntervalRewardTracker;
pub use ledger::LedgerStore;
pub use metrics::ShopMetrics;
pub use notify::{CollectingNotifier, LogNotifier, Notice, NotificationSink};
pub use rewards::{Collaborators, DirectChange, FlushReport, RewardAggregator};
pub use scheduler::Scheduler;
pub use types::{CauseKind, Credits, Identity, ItemInfo, LedgerAction, LedgerEntry, NewLedgerEntry};
