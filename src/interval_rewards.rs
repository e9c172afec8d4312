//! Presence-based periodic rewards (playtime, name bonus)
//!
//! Ticked once per minute by a scheduled task. Every present identity
//! accumulates minutes; on reaching the threshold the counter resets and, if
//! the identity qualifies at that moment, one reward is queued.

use crate::{
    rewards::RewardAggregator,
    types::{CauseKind, Credits, Identity},
};
use std::{
    collections::{HashMap, HashSet},
    sync::{Mutex, PoisonError},
};

pub struct IntervalRewardTracker {
    cause: CauseKind,
    credits_per_award: Credits,
    minutes_per_award: u32,
    min_present: usize,
    minutes: Mutex<HashMap<Identity, u32>>,
}

impl IntervalRewardTracker {
    pub fn new(cause: CauseKind, credits_per_award: Credits, minutes_per_award: u32) -> Self {
        Self {
            cause,
            credits_per_award,
            minutes_per_award,
            min_present: 0,
            minutes: Mutex::new(HashMap::new()),
        }
    }

    /// Skip ticks while fewer than `count` identities are present
    pub fn with_min_present(mut self, count: usize) -> Self {
        self.min_present = count;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.credits_per_award.is_positive() && self.minutes_per_award > 0
    }

    pub fn cause(&self) -> &CauseKind {
        &self.cause
    }

    pub fn tick(&self, aggregator: &RewardAggregator, present: &HashSet<Identity>) -> usize {
        self.tick_with(aggregator, present, |_| true)
    }

    /// Advance every present identity by one minute.
    ///
    /// `qualifies` is consulted only when an identity reaches the threshold.
    /// Returns the number of rewards queued.
    pub fn tick_with<F>(&self, aggregator: &RewardAggregator, present: &HashSet<Identity>, qualifies: F) -> usize
    where
        F: Fn(Identity) -> bool,
    {
        if !self.is_enabled() || present.len() < self.min_present {
            return 0;
        }

        let due: Vec<Identity> = {
            let mut minutes = self.minutes.lock().unwrap_or_else(PoisonError::into_inner);
            minutes.retain(|identity, _| present.contains(identity));

            let mut due = Vec::new();
            for &identity in present.iter().filter(|id| id.is_valid()) {
                let counter = minutes.entry(identity).or_insert(0);
                *counter += 1;
                if *counter >= self.minutes_per_award {
                    *counter = 0;
                    due.push(identity);
                }
            }
            due
        };

        due.into_iter()
            .filter(|&identity| qualifies(identity))
            .filter(|&identity| aggregator.queue_reward(identity, self.cause.clone(), self.credits_per_award))
            .count()
    }

    pub fn forget(&self, identity: Identity) {
        self.minutes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&identity);
    }

    pub fn clear(&self) {
        self.minutes.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    pub fn minutes_for(&self, identity: Identity) -> u32 {
        self.minutes
            .lock()
            .map(|m| m.get(&identity).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn tracked(&self) -> usize {
        self.minutes.lock().map(|m| m.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        economy::{InMemoryEconomy, StaticDirectory},
        ledger::LedgerStore,
        metrics::ShopMetrics,
        notify::CollectingNotifier,
        rewards::Collaborators,
    };
    use std::sync::Arc;

    fn aggregator() -> RewardAggregator {
        let collaborators = Collaborators::new(
            Arc::new(InMemoryEconomy::new()),
            Arc::new(CollectingNotifier::new()),
            Arc::new(StaticDirectory::new()),
        );
        RewardAggregator::new(Arc::new(LedgerStore::in_memory(50)), collaborators, ShopMetrics::new())
    }

    fn present(ids: &[u64]) -> HashSet<Identity> {
        ids.iter().map(|&id| Identity(id)).collect()
    }

    #[test]
    fn test_awards_every_n_ticks() {
        let aggregator = aggregator();
        let tracker = IntervalRewardTracker::new(CauseKind::playtime(), Credits::from_whole(100), 3);
        let online = present(&[1, 2]);

        assert_eq!(tracker.tick(&aggregator, &online), 0);
        assert_eq!(tracker.tick(&aggregator, &online), 0);
        assert_eq!(tracker.tick(&aggregator, &online), 2);
        assert_eq!(tracker.minutes_for(Identity(1)), 0);
        assert_eq!(aggregator.pending_total(Identity(2)), Credits::from_whole(100));
    }

    #[test]
    fn test_departed_identities_forgotten() {
        let aggregator = aggregator();
        let tracker = IntervalRewardTracker::new(CauseKind::playtime(), Credits::from_whole(1), 5);

        tracker.tick(&aggregator, &present(&[1, 2]));
        tracker.tick(&aggregator, &present(&[1]));
        assert_eq!(tracker.tracked(), 1);
        assert_eq!(tracker.minutes_for(Identity(1)), 2);

        tracker.tick(&aggregator, &present(&[1, 2]));
        assert_eq!(tracker.minutes_for(Identity(2)), 1);
    }

    #[test]
    fn test_unqualified_identity_resets_without_award() {
        let aggregator = aggregator();
        let tracker = IntervalRewardTracker::new(CauseKind::name_bonus(), Credits::from_whole(5), 1);
        let online = present(&[1, 2]);

        let queued = tracker.tick_with(&aggregator, &online, |id| id == Identity(2));
        assert_eq!(queued, 1);
        assert_eq!(aggregator.pending_total(Identity(1)), Credits::ZERO);
        assert_eq!(tracker.minutes_for(Identity(1)), 0);
    }

    #[test]
    fn test_disabled_and_min_present() {
        let aggregator = aggregator();
        let disabled = IntervalRewardTracker::new(CauseKind::playtime(), Credits::ZERO, 1);
        assert!(!disabled.is_enabled());
        assert_eq!(disabled.tick(&aggregator, &present(&[1])), 0);

        let crowded = IntervalRewardTracker::new(CauseKind::playtime(), Credits::from_whole(1), 1).with_min_present(3);
        assert_eq!(crowded.tick(&aggregator, &present(&[1, 2])), 0);
        assert_eq!(crowded.tracked(), 0);
        assert_eq!(crowded.tick(&aggregator, &present(&[1, 2, 3])), 3);
    }
}
