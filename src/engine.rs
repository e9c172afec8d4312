//! Engine façade owning the ledger, aggregator, cooldowns and scheduler
//!
//! Lifecycle: `new` → `start` → (`reload`)* → `unload`. Every reload and the
//! unload bump the lifecycle epoch, which retires all previously scheduled
//! work, including tasks collaborators registered through
//! [`ShopEngine::schedule_recurring`]. Collaborators re-register after reload.
//!
//! Scheduled actions receive an [`EpochTicket`] and should hold its guard only
//! around in-memory work. Calling `reload` or `unload` while holding the guard
//! deadlocks.

use crate::{
    config::{LedgerBackend, LedgerConfig, ShopConfig},
    cooldown::{CooldownGate, CooldownOutcome},
    epoch::{Epoch, EpochTicket, LifecycleEpoch},
    errors::ShopResult,
    ledger::LedgerStore,
    metrics::ShopMetrics,
    rewards::{Collaborators, DirectChange, FlushReport, RewardAggregator},
    scheduler::Scheduler,
    types::{CauseKind, Credits, Identity, LedgerEntry},
};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, PoisonError, RwLock,
    },
    time::Duration,
};
use tracing::{info, warn};

const FLUSH_TASK: &str = "reward-flush";

pub struct ShopEngine {
    config: RwLock<ShopConfig>,
    scheduler: Scheduler,
    aggregator: Arc<RewardAggregator>,
    cooldowns: CooldownGate,
    metrics: ShopMetrics,
    running: AtomicBool,
}

/// Whether switching from `old` to `new` needs a different store instance.
///
/// Tuning knobs on an unchanged RocksDB path apply on the next restart; the
/// open database holds the directory lock.
fn needs_reopen(old: &LedgerConfig, new: &LedgerConfig) -> bool {
    match (old.backend, new.backend) {
        (LedgerBackend::InMemory, LedgerBackend::InMemory) => old.in_memory_capacity != new.in_memory_capacity,
        (LedgerBackend::RocksDb, LedgerBackend::RocksDb) => old.data_directory != new.data_directory,
        _ => true,
    }
}

impl ShopEngine {
    pub fn new(config: ShopConfig, collaborators: Collaborators) -> ShopResult<Self> {
        config.validate()?;

        let metrics = ShopMetrics::new();
        let ledger = Arc::new(LedgerStore::open(&config.ledger, metrics.clone())?);
        let epoch = Arc::new(LifecycleEpoch::new());
        let cooldowns = CooldownGate::new(collaborators.clock.clone());
        let aggregator = Arc::new(RewardAggregator::new(ledger, collaborators, metrics.clone()));

        Ok(Self {
            config: RwLock::new(config),
            scheduler: Scheduler::new(epoch),
            aggregator,
            cooldowns,
            metrics,
            running: AtomicBool::new(false),
        })
    }

    /// Begin the recurring flush. Returns false if already running or if no
    /// Tokio runtime is available.
    pub fn start(&self) -> bool {
        if self.running.swap(true, Ordering::SeqCst) {
            return false;
        }

        let started = self.schedule_flush();
        if !started {
            self.running.store(false, Ordering::SeqCst);
        }
        started
    }

    fn schedule_flush(&self) -> bool {
        let interval = self.config().flush_interval();
        let aggregator = self.aggregator.clone();

        let scheduled = self.scheduler.schedule_repeating(FLUSH_TASK, interval, move |ticket| {
            aggregator.flush_guarded(ticket);
        });
        if scheduled {
            info!("Reward flush every {:?}, ledger {}", interval, self.ledger_mode());
        }
        scheduled
    }

    /// Apply a new configuration. Pending rewards survive; scheduled work
    /// does not.
    pub fn reload(&self, config: ShopConfig) -> ShopResult<()> {
        config.validate()?;

        let old_ledger = self.config().ledger;
        let replacement = if needs_reopen(&old_ledger, &config.ledger) {
            Some(Arc::new(LedgerStore::open(&config.ledger, self.metrics.clone())?))
        } else {
            if old_ledger != config.ledger {
                info!("Ledger tuning changes take effect after restart");
            }
            None
        };

        let cancelled = self.scheduler.cancel_all();

        if let Some(ledger) = replacement {
            info!("Switching ledger from {} to {}", self.ledger_mode(), ledger.mode());
            self.aggregator.replace_ledger(ledger);
        }
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;

        info!("Reloaded, cancelled {} scheduled task(s)", cancelled);
        if self.running.load(Ordering::SeqCst) && !self.schedule_flush() {
            self.running.store(false, Ordering::SeqCst);
        }
        Ok(())
    }

    /// Stop all scheduled work and drop everything not yet settled
    pub fn unload(&self) {
        self.running.store(false, Ordering::SeqCst);
        let cancelled = self.scheduler.cancel_all();
        let discarded = self.aggregator.discard_all();
        self.cooldowns.clear();

        info!(
            "Unloaded: cancelled {} task(s), discarded rewards for {} identities",
            cancelled, discarded
        );
    }

    pub fn on_disconnect(&self, identity: Identity) {
        self.cooldowns.purge(identity);
        let discarded = self.aggregator.forget(identity);
        if discarded.is_positive() {
            warn!("{} disconnected with {} credits unflushed", identity, discarded);
        }
    }

    pub fn queue_reward(&self, identity: Identity, cause: impl Into<CauseKind>, amount: Credits) -> bool {
        self.aggregator.queue_reward(identity, cause.into(), amount)
    }

    pub fn record_direct(&self, change: DirectChange) -> ShopResult<Credits> {
        self.aggregator.record_direct(change)
    }

    /// Settle pending rewards now instead of waiting for the next tick
    pub fn flush_now(&self) -> FlushReport {
        self.aggregator.flush()
    }

    pub fn get_recent(&self, max_entries: usize) -> Vec<LedgerEntry> {
        self.aggregator.ledger().get_recent(max_entries)
    }

    pub fn get_recent_for_identity(&self, identity: Identity, max_entries: usize) -> Vec<LedgerEntry> {
        self.aggregator.ledger().get_recent_for_identity(identity, max_entries)
    }

    pub fn try_consume_cooldown(&self, identity: Identity, window_secs: u64) -> CooldownOutcome {
        self.cooldowns.try_consume(identity, window_secs)
    }

    /// Register collaborator work under the current epoch
    pub fn schedule_recurring<F>(&self, name: impl Into<String>, interval: Duration, action: F) -> bool
    where
        F: Fn(&EpochTicket) + Send + Sync + 'static,
    {
        self.scheduler.schedule_repeating(name, interval, action)
    }

    pub fn schedule_once<F>(&self, name: impl Into<String>, delay: Duration, action: F) -> bool
    where
        F: FnOnce(&EpochTicket) + Send + 'static,
    {
        self.scheduler.schedule_once(name, delay, action)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn current_epoch(&self) -> Epoch {
        self.scheduler.epoch().current()
    }

    pub fn scheduled_tasks(&self) -> usize {
        self.scheduler.active()
    }

    pub fn config(&self) -> ShopConfig {
        self.config.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn ledger_mode(&self) -> String {
        self.aggregator.ledger().mode()
    }

    pub fn aggregator(&self) -> &Arc<RewardAggregator> {
        &self.aggregator
    }

    pub fn cooldowns(&self) -> &CooldownGate {
        &self.cooldowns
    }

    pub fn metrics(&self) -> &ShopMetrics {
        &self.metrics
    }
}
