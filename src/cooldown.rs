//! Per-identity "once every N seconds" throttle

use crate::{clock::Clock, types::Identity};
use chrono::{DateTime, Utc};
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownOutcome {
    /// The window was consumed and a new deadline recorded
    Ready,
    /// Still cooling down
    Active { remaining_secs: u64 },
}

impl CooldownOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, CooldownOutcome::Ready)
    }

    /// `(allowed, remaining seconds)` pair
    pub fn as_pair(&self) -> (bool, u64) {
        match self {
            CooldownOutcome::Ready => (true, 0),
            CooldownOutcome::Active { remaining_secs } => (false, *remaining_secs),
        }
    }
}

pub struct CooldownGate {
    clock: Arc<dyn Clock>,
    deadlines: Mutex<HashMap<Identity, DateTime<Utc>>>,
}

fn remaining_secs(deadline: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let millis = (deadline - now).num_milliseconds().max(0) as u64;
    millis.div_ceil(1_000)
}

impl CooldownGate {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            deadlines: Mutex::new(HashMap::new()),
        }
    }

    /// Consume the window for `identity` if it is not cooling down
    pub fn try_consume(&self, identity: Identity, window_secs: u64) -> CooldownOutcome {
        if window_secs == 0 || !identity.is_valid() {
            return CooldownOutcome::Ready;
        }

        let now = self.clock.now();
        let Ok(mut deadlines) = self.deadlines.lock() else {
            tracing::warn!("Cooldown map lock poisoned; allowing {}", identity);
            return CooldownOutcome::Ready;
        };

        if let Some(&deadline) = deadlines.get(&identity) {
            if deadline > now {
                return CooldownOutcome::Active {
                    remaining_secs: remaining_secs(deadline, now),
                };
            }
        }

        let secs = i64::try_from(window_secs).unwrap_or(i64::MAX).min(i64::MAX / 1_000);
        let deadline = now
            .checked_add_signed(chrono::Duration::seconds(secs))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        deadlines.insert(identity, deadline);
        CooldownOutcome::Ready
    }

    /// Seconds left without consuming; expired records are dropped
    pub fn remaining(&self, identity: Identity) -> u64 {
        let now = self.clock.now();
        let Ok(mut deadlines) = self.deadlines.lock() else {
            return 0;
        };

        match deadlines.get(&identity).copied() {
            Some(deadline) if deadline > now => remaining_secs(deadline, now),
            Some(_) => {
                deadlines.remove(&identity);
                0
            }
            None => 0,
        }
    }

    pub fn purge(&self, identity: Identity) -> bool {
        self.deadlines
            .lock()
            .map(|mut deadlines| deadlines.remove(&identity).is_some())
            .unwrap_or(false)
    }

    /// Drop records for identities not in `connected`, plus any expired ones
    pub fn retain_connected(&self, connected: &HashSet<Identity>) -> usize {
        let now = self.clock.now();
        let Ok(mut deadlines) = self.deadlines.lock() else {
            return 0;
        };

        let before = deadlines.len();
        deadlines.retain(|identity, deadline| connected.contains(identity) && *deadline > now);
        before - deadlines.len()
    }

    pub fn clear(&self) {
        if let Ok(mut deadlines) = self.deadlines.lock() {
            deadlines.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.deadlines.lock().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
