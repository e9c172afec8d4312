//! Outbound collaborators: the balance store and the player directory

use crate::types::{Credits, Identity};
use dashmap::{DashMap, DashSet};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MutationError {
    #[error("Identity {0} is not known to the economy")]
    UnknownIdentity(Identity),

    #[error("Mutation rejected: {0}")]
    Rejected(String),

    #[error("Insufficient funds: balance {balance}, delta {delta}")]
    InsufficientFunds { balance: Credits, delta: Credits },
}

/// External store of player balances
pub trait EconomyMutator: Send + Sync {
    /// Apply a signed delta to the balance
    fn add_credits(&self, identity: Identity, delta: Credits) -> Result<(), MutationError>;

    fn get_credits(&self, identity: Identity) -> Credits;
}

/// Live player names, used for the ledger's display-name snapshot
pub trait PlayerDirectory: Send + Sync {
    fn display_name(&self, identity: Identity) -> Option<String>;

    fn name_or_placeholder(&self, identity: Identity) -> String {
        self.display_name(identity)
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| identity.placeholder_name())
    }
}

/// Balance store kept in process memory.
///
/// Records every `add_credits` call so that callers can assert on exactly
/// what was applied.
#[derive(Debug)]
pub struct InMemoryEconomy {
    balances: DashMap<Identity, Credits>,
    rejected: DashSet<Identity>,
    allow_negative: bool,
    calls: Mutex<Vec<(Identity, Credits)>>,
}

impl InMemoryEconomy {
    pub fn new() -> Self {
        Self {
            balances: DashMap::new(),
            rejected: DashSet::new(),
            allow_negative: true,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Refuse mutations that would take a balance below zero
    pub fn without_overdraft(mut self) -> Self {
        self.allow_negative = false;
        self
    }

    pub fn set_balance(&self, identity: Identity, balance: Credits) {
        self.balances.insert(identity, balance);
    }

    /// Make every future mutation for `identity` fail
    pub fn reject(&self, identity: Identity) {
        self.rejected.insert(identity);
    }

    pub fn accept(&self, identity: Identity) {
        self.rejected.remove(&identity);
    }

    /// `add_credits` calls seen so far, successful or not
    pub fn calls(&self) -> Vec<(Identity, Credits)> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    pub fn calls_for(&self, identity: Identity) -> Vec<Credits> {
        self.calls()
            .into_iter()
            .filter(|(id, _)| *id == identity)
            .map(|(_, delta)| delta)
            .collect()
    }
}

impl Default for InMemoryEconomy {
    fn default() -> Self {
        Self::new()
    }
}

impl EconomyMutator for InMemoryEconomy {
    fn add_credits(&self, identity: Identity, delta: Credits) -> Result<(), MutationError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((identity, delta));
        }

        if !identity.is_valid() {
            return Err(MutationError::UnknownIdentity(identity));
        }
        if self.rejected.contains(&identity) {
            return Err(MutationError::Rejected(format!("economy refused {}", identity)));
        }

        let mut balance = self.balances.entry(identity).or_insert(Credits::ZERO);
        let updated = *balance + delta;
        if !self.allow_negative && updated.is_negative() {
            return Err(MutationError::InsufficientFunds {
                balance: *balance,
                delta,
            });
        }
        *balance = updated;
        Ok(())
    }

    fn get_credits(&self, identity: Identity) -> Credits {
        self.balances.get(&identity).map(|b| *b).unwrap_or(Credits::ZERO)
    }
}

/// Fixed name table
#[derive(Debug, Default)]
pub struct StaticDirectory {
    names: DashMap<Identity, String>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, identity: Identity, name: impl Into<String>) {
        self.names.insert(identity, name.into());
    }

    pub fn remove(&self, identity: Identity) {
        self.names.remove(&identity);
    }
}

impl<N: Into<String>> FromIterator<(Identity, N)> for StaticDirectory {
    fn from_iter<T: IntoIterator<Item = (Identity, N)>>(iter: T) -> Self {
        let directory = StaticDirectory::new();
        for (identity, name) in iter {
            directory.insert(identity, name);
        }
        directory
    }
}

impl PlayerDirectory for StaticDirectory {
    fn display_name(&self, identity: Identity) -> Option<String> {
        self.names.get(&identity).map(|name| name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_read_credits() {
        let economy = InMemoryEconomy::new();
        let player = Identity(1);

        economy.add_credits(player, Credits::from_whole(8)).unwrap();
        economy.add_credits(player, Credits::from_hundredths(-250)).unwrap();

        assert_eq!(economy.get_credits(player), Credits::from_hundredths(550));
        assert_eq!(economy.calls_for(player).len(), 2);
    }

    #[test]
    fn test_rejection_leaves_balance_untouched() {
        let economy = InMemoryEconomy::new();
        let player = Identity(2);
        economy.set_balance(player, Credits::from_whole(10));
        economy.reject(player);

        assert!(economy.add_credits(player, Credits::from_whole(5)).is_err());
        assert_eq!(economy.get_credits(player), Credits::from_whole(10));

        economy.accept(player);
        assert!(economy.add_credits(player, Credits::from_whole(5)).is_ok());
    }

    #[test]
    fn test_overdraft_refused() {
        let economy = InMemoryEconomy::new().without_overdraft();
        let player = Identity(3);
        economy.set_balance(player, Credits::from_whole(4));

        let err = economy.add_credits(player, Credits::from_whole(-5)).unwrap_err();
        assert!(matches!(err, MutationError::InsufficientFunds { .. }));
        assert_eq!(economy.get_credits(player), Credits::from_whole(4));
    }

    #[test]
    fn test_directory_placeholder() {
        let directory: StaticDirectory = [(Identity(1), "alice"), (Identity(2), "  ")].into_iter().collect();

        assert_eq!(directory.name_or_placeholder(Identity(1)), "alice");
        assert_eq!(directory.name_or_placeholder(Identity(2)), "#2");
        assert_eq!(directory.name_or_placeholder(Identity(3)), "#3");
    }
}
