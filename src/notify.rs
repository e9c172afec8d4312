//! Per-player notices emitted after settlement

use crate::types::{CauseKind, Credits, Identity, LedgerAction};
use serde::Serialize;
use std::{fmt, sync::Mutex};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    RewardGranted {
        cause: CauseKind,
        amount: Credits,
        balance_after: Credits,
    },
    RewardFailed {
        cause: CauseKind,
        amount: Credits,
    },
    BalanceChanged {
        action: LedgerAction,
        amount: Credits,
        balance_after: Credits,
    },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::RewardGranted {
                cause,
                amount,
                balance_after,
            } => write!(f, "+{} credits ({}), balance {}", amount, cause, balance_after),
            Notice::RewardFailed { cause, amount } => {
                write!(f, "Reward of {} credits ({}) could not be paid", amount, cause)
            }
            Notice::BalanceChanged {
                action,
                amount,
                balance_after,
            } => write!(f, "{} {} credits, balance {}", action, amount, balance_after),
        }
    }
}

/// Delivery of player-facing messages; localization happens behind this
pub trait NotificationSink: Send + Sync {
    fn notify(&self, identity: Identity, notice: Notice);
}

/// Writes every notice to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn notify(&self, identity: Identity, notice: Notice) {
        match notice {
            Notice::RewardFailed { .. } => tracing::warn!("[{}] {}", identity, notice),
            _ => tracing::info!("[{}] {}", identity, notice),
        }
    }
}

/// Keeps notices in memory, in delivery order
#[derive(Debug, Default)]
pub struct CollectingNotifier {
    notices: Mutex<Vec<(Identity, Notice)>>,
}

impl CollectingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<(Identity, Notice)> {
        self.notices.lock().map(|n| n.clone()).unwrap_or_default()
    }

    pub fn for_identity(&self, identity: Identity) -> Vec<Notice> {
        self.notices()
            .into_iter()
            .filter(|(id, _)| *id == identity)
            .map(|(_, notice)| notice)
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut notices) = self.notices.lock() {
            notices.clear();
        }
    }
}

impl NotificationSink for CollectingNotifier {
    fn notify(&self, identity: Identity, notice: Notice) {
        if let Ok(mut notices) = self.notices.lock() {
            notices.push((identity, notice));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notice_text() {
        let granted = Notice::RewardGranted {
            cause: CauseKind::headshot(),
            amount: Credits::from_whole(3),
            balance_after: Credits::from_whole(8),
        };
        assert_eq!(granted.to_string(), "+3.00 credits (headshot), balance 8.00");

        let json = serde_json::to_value(&granted).unwrap();
        assert_eq!(json["kind"], "reward_granted");
        assert_eq!(json["cause"], "headshot");
    }

    #[test]
    fn test_collecting_notifier_filters() {
        let sink = CollectingNotifier::new();
        let failed = Notice::RewardFailed {
            cause: CauseKind::kill(),
            amount: Credits::from_whole(5),
        };
        sink.notify(Identity(1), failed.clone());
        sink.notify(Identity(2), failed.clone());

        assert_eq!(sink.for_identity(Identity(1)), vec![failed]);
        assert_eq!(sink.notices().len(), 2);
        sink.clear();
        assert!(sink.notices().is_empty());
    }
}
