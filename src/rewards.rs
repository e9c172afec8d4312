//! Deferred reward settlement
//!
//! Collaborators queue rewards per identity and cause without blocking. A
//! periodic flush swaps the pending map out under its lock, then settles each
//! identity with a single balance mutation and writes one ledger entry per
//! cause. A failed mutation drops that identity's bucket for the cycle and
//! reports every cause as failed; nothing is retried.

use crate::{
    clock::{Clock, SystemClock},
    economy::{EconomyMutator, PlayerDirectory},
    epoch::EpochTicket,
    errors::{RewardError, ShopResult},
    ledger::LedgerStore,
    metrics::ShopMetrics,
    notify::{Notice, NotificationSink},
    types::{CauseKind, Credits, Identity, ItemInfo, LedgerAction, NewLedgerEntry},
};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError, RwLock},
};
use tracing::{debug, warn};

/// External services the settlement engine calls out to
#[derive(Clone)]
pub struct Collaborators {
    pub economy: Arc<dyn EconomyMutator>,
    pub notifier: Arc<dyn NotificationSink>,
    pub directory: Arc<dyn PlayerDirectory>,
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    pub fn new(
        economy: Arc<dyn EconomyMutator>,
        notifier: Arc<dyn NotificationSink>,
        directory: Arc<dyn PlayerDirectory>,
    ) -> Self {
        Self {
            economy,
            notifier,
            directory,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Immediate, non-batched balance change such as a purchase or a sale
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectChange {
    pub identity: Identity,
    pub action: LedgerAction,
    /// Magnitude; the direction comes from `action`
    pub amount: Credits,
    pub item: Option<ItemInfo>,
}

impl DirectChange {
    pub fn new(identity: Identity, action: LedgerAction, amount: Credits) -> Self {
        Self {
            identity,
            action,
            amount,
            item: None,
        }
    }

    pub fn with_item(mut self, item: ItemInfo) -> Self {
        self.item = Some(item);
        self
    }
}

/// Outcome of one flush cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub identities_settled: usize,
    pub identities_failed: usize,
    pub entries_written: usize,
    pub credits_paid: Credits,
}

impl FlushReport {
    pub fn is_empty(&self) -> bool {
        self.identities_settled == 0 && self.identities_failed == 0
    }
}

/// Causes for one identity, in first-seen order
#[derive(Debug, Default)]
struct PendingBucket {
    causes: Vec<(CauseKind, Credits)>,
}

impl PendingBucket {
    fn add(&mut self, cause: CauseKind, amount: Credits) {
        match self.causes.iter_mut().find(|(existing, _)| *existing == cause) {
            Some((_, total)) => *total += amount,
            None => self.causes.push((cause, amount)),
        }
    }

    fn total(&self) -> Credits {
        self.causes.iter().map(|(_, amount)| *amount).sum()
    }
}

pub struct RewardAggregator {
    pending: Mutex<HashMap<Identity, PendingBucket>>,
    ledger: RwLock<Arc<LedgerStore>>,
    collaborators: Collaborators,
    metrics: ShopMetrics,
}

impl RewardAggregator {
    pub fn new(ledger: Arc<LedgerStore>, collaborators: Collaborators, metrics: ShopMetrics) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            ledger: RwLock::new(ledger),
            collaborators,
            metrics,
        }
    }

    pub fn ledger(&self) -> Arc<LedgerStore> {
        self.ledger.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Point future flushes and direct records at another ledger
    pub fn replace_ledger(&self, ledger: Arc<LedgerStore>) {
        *self.ledger.write().unwrap_or_else(PoisonError::into_inner) = ledger;
    }

    fn validate(identity: Identity, cause: &CauseKind, amount: Credits) -> Result<(), RewardError> {
        if !identity.is_valid() {
            return Err(RewardError::InvalidIdentity(identity));
        }
        if cause.is_empty() {
            return Err(RewardError::EmptyCause);
        }
        if !amount.is_positive() {
            return Err(RewardError::NonPositiveAmount(amount.to_string()));
        }
        Ok(())
    }

    /// Add `amount` to the pending bucket for `identity` under `cause`.
    ///
    /// Never blocks on I/O. Invalid input is logged and dropped, returning false.
    pub fn queue_reward(&self, identity: Identity, cause: CauseKind, amount: Credits) -> bool {
        if let Err(e) = Self::validate(identity, &cause, amount) {
            self.metrics.rewards_rejected.inc();
            warn!("Rejected reward '{}' for {}: {}", cause, identity, e);
            return false;
        }

        {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            pending.entry(identity).or_default().add(cause, amount);
            self.metrics.pending_identities.set(pending.len() as i64);
        }

        self.metrics.rewards_queued.inc();
        true
    }

    fn drain(&self) -> HashMap<Identity, PendingBucket> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        self.metrics.pending_identities.set(0);
        std::mem::take(&mut *pending)
    }

    /// Drain every pending bucket and settle it
    pub fn flush(&self) -> FlushReport {
        let drained = self.drain();
        self.settle_all(drained)
    }

    /// Scheduled flush: the drain happens under the ticket's guard, settlement
    /// after it is released. `None` when the ticket is stale.
    pub fn flush_guarded(&self, ticket: &EpochTicket) -> Option<FlushReport> {
        let drained = ticket.run(|| self.drain())?;
        Some(self.settle_all(drained))
    }

    fn settle_all(&self, drained: HashMap<Identity, PendingBucket>) -> FlushReport {
        let mut report = FlushReport::default();
        if drained.is_empty() {
            return report;
        }

        self.metrics.flush_cycles.inc();
        let ledger = self.ledger();

        for (identity, bucket) in drained {
            self.settle(&ledger, identity, bucket, &mut report);
        }

        debug!(
            "Flush settled {} identities ({} failed), {} entries, {} credits",
            report.identities_settled, report.identities_failed, report.entries_written, report.credits_paid
        );
        report
    }

    fn settle(&self, ledger: &LedgerStore, identity: Identity, bucket: PendingBucket, report: &mut FlushReport) {
        let Collaborators {
            economy,
            notifier,
            directory,
            clock,
        } = &self.collaborators;

        let total = bucket.total();
        let balance_before = economy.get_credits(identity);

        if let Err(e) = economy.add_credits(identity, total) {
            warn!(
                "Reward mutation of {} for {} failed, dropping {} cause(s): {}",
                total,
                identity,
                bucket.causes.len(),
                e
            );
            self.metrics.mutation_failures.inc();
            report.identities_failed += 1;
            for (cause, amount) in bucket.causes {
                notifier.notify(identity, Notice::RewardFailed { cause, amount });
            }
            return;
        }

        self.metrics.identities_settled.inc();
        report.identities_settled += 1;
        report.credits_paid += total;

        let display_name = directory.name_or_placeholder(identity);
        let timestamp = clock.unix_seconds();
        let mut balance = balance_before;

        for (cause, amount) in bucket.causes {
            balance += amount;
            let written = ledger.record(NewLedgerEntry {
                timestamp,
                identity,
                display_name: display_name.clone(),
                action: LedgerAction::Reward,
                amount,
                balance_after: balance,
                item_id: Some(cause.as_str().to_string()),
                item_display_name: None,
            });
            if written.is_some() {
                report.entries_written += 1;
            }
            notifier.notify(
                identity,
                Notice::RewardGranted {
                    cause,
                    amount,
                    balance_after: balance,
                },
            );
        }
    }

    /// Apply a single change immediately and record it; returns the new balance
    pub fn record_direct(&self, change: DirectChange) -> ShopResult<Credits> {
        let DirectChange {
            identity,
            action,
            amount,
            item,
        } = change;

        if !identity.is_valid() {
            return Err(RewardError::InvalidIdentity(identity).into());
        }
        if !amount.is_positive() {
            return Err(RewardError::NonPositiveAmount(amount.to_string()).into());
        }

        let Collaborators {
            economy,
            notifier,
            directory,
            clock,
        } = &self.collaborators;

        let delta = action.signed(amount);
        if let Err(e) = economy.add_credits(identity, delta) {
            self.metrics.mutation_failures.inc();
            warn!("Direct {} of {} for {} failed: {}", action, delta, identity, e);
            return Err(RewardError::MutationFailed {
                identity,
                reason: e.to_string(),
            }
            .into());
        }

        let balance_after = economy.get_credits(identity);
        let (item_id, item_display_name) = match item {
            Some(item) => (Some(item.id), item.display_name),
            None => (None, None),
        };

        self.ledger().record(NewLedgerEntry {
            timestamp: clock.unix_seconds(),
            identity,
            display_name: directory.name_or_placeholder(identity),
            action,
            amount: delta,
            balance_after,
            item_id,
            item_display_name,
        });
        self.metrics.direct_records.inc();

        notifier.notify(
            identity,
            Notice::BalanceChanged {
                action,
                amount: delta,
                balance_after,
            },
        );

        Ok(balance_after)
    }

    /// Drop the pending bucket for a departed identity; returns what was discarded
    pub fn forget(&self, identity: Identity) -> Credits {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let discarded = pending.remove(&identity).map(|b| b.total()).unwrap_or_default();
        self.metrics.pending_identities.set(pending.len() as i64);
        discarded
    }

    /// Drop every unflushed bucket; returns how many identities lost rewards
    pub fn discard_all(&self) -> usize {
        let dropped = self.drain();

        if !dropped.is_empty() {
            warn!("Discarded unflushed rewards for {} identities", dropped.len());
        }
        dropped.len()
    }

    pub fn pending_identities(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }

    pub fn pending_total(&self, identity: Identity) -> Credits {
        self.pending
            .lock()
            .ok()
            .and_then(|p| p.get(&identity).map(PendingBucket::total))
            .unwrap_or_default()
    }
}
