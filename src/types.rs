//! Core data types shared by the ledger, the reward aggregator and collaborators

use serde::{Deserialize, Serialize};
use std::{
    cmp::Ordering,
    fmt,
    iter::Sum,
    ops::{Add, AddAssign, Neg, Sub},
    str::FromStr,
};

/// Stable numeric player key. Zero is reserved as the invalid identity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct Identity(pub u64);

impl Identity {
    pub const INVALID: Identity = Identity(0);

    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }

    /// Fallback display name used when no live name is known
    pub fn placeholder_name(&self) -> String {
        format!("#{}", self.0)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Identity {
    fn from(value: u64) -> Self {
        Identity(value)
    }
}

/// Fixed-point credit amount with two fractional digits.
///
/// Stored as a signed count of hundredths so that balance arithmetic is exact.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct Credits(i64);

impl Credits {
    pub const ZERO: Credits = Credits(0);
    pub const SCALE: i64 = 100;

    pub const fn from_hundredths(hundredths: i64) -> Self {
        Credits(hundredths)
    }

    pub const fn from_whole(whole: i64) -> Self {
        Credits(whole.saturating_mul(Self::SCALE))
    }

    pub const fn hundredths(&self) -> i64 {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub fn abs(&self) -> Credits {
        Credits(self.0.saturating_abs())
    }

    pub fn checked_add(self, other: Credits) -> Option<Credits> {
        self.0.checked_add(other.0).map(Credits)
    }

    pub fn saturating_add(self, other: Credits) -> Credits {
        Credits(self.0.saturating_add(other.0))
    }
}

impl Add for Credits {
    type Output = Credits;

    fn add(self, rhs: Credits) -> Credits {
        self.saturating_add(rhs)
    }
}

impl AddAssign for Credits {
    fn add_assign(&mut self, rhs: Credits) {
        *self = self.saturating_add(rhs);
    }
}

impl Sub for Credits {
    type Output = Credits;

    fn sub(self, rhs: Credits) -> Credits {
        Credits(self.0.saturating_sub(rhs.0))
    }
}

impl Neg for Credits {
    type Output = Credits;

    fn neg(self) -> Credits {
        Credits(self.0.saturating_neg())
    }
}

impl Sum for Credits {
    fn sum<I: Iterator<Item = Credits>>(iter: I) -> Credits {
        iter.fold(Credits::ZERO, |acc, c| acc + c)
    }
}

impl fmt::Display for Credits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let magnitude = self.0.unsigned_abs();
        let scale = Self::SCALE as u64;
        write!(f, "{}{}.{:02}", sign, magnitude / scale, magnitude % scale)
    }
}

impl FromStr for Credits {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (negative, digits) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };

        let (whole, fraction) = match digits.split_once('.') {
            Some((w, f)) => (w, f),
            None => (digits, ""),
        };

        let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if whole.is_empty() || fraction.len() > 2 || !all_digits(whole) || !all_digits(fraction) {
            return Err(format!("invalid credit amount '{}'", s));
        }

        let whole: i64 = whole
            .parse()
            .map_err(|_| format!("invalid credit amount '{}'", s))?;
        let fraction: i64 = match fraction.len() {
            0 => 0,
            1 => fraction.parse::<i64>().map_err(|_| format!("invalid credit amount '{}'", s))? * 10,
            _ => fraction.parse().map_err(|_| format!("invalid credit amount '{}'", s))?,
        };

        let hundredths = whole
            .checked_mul(Self::SCALE)
            .and_then(|w| w.checked_add(fraction))
            .ok_or_else(|| format!("credit amount '{}' out of range", s))?;

        Ok(Credits(if negative { -hundredths } else { hundredths }))
    }
}

/// Kind of credit-affecting event recorded in the ledger.
///
/// The string form is the persisted representation and must stay stable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LedgerAction {
    Credit,
    Debit,
    Purchase,
    Sale,
    Expiry,
    Refund,
    /// Batched reward settled by the aggregator; the cause is in the item id
    Reward,
}

impl LedgerAction {
    pub const ALL: [LedgerAction; 7] = [
        LedgerAction::Credit,
        LedgerAction::Debit,
        LedgerAction::Purchase,
        LedgerAction::Sale,
        LedgerAction::Expiry,
        LedgerAction::Refund,
        LedgerAction::Reward,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerAction::Credit => "credit",
            LedgerAction::Debit => "debit",
            LedgerAction::Purchase => "purchase",
            LedgerAction::Sale => "sale",
            LedgerAction::Expiry => "expiry",
            LedgerAction::Refund => "refund",
            LedgerAction::Reward => "reward",
        }
    }

    /// Whether this action increases the player's balance
    pub fn adds_credits(&self) -> bool {
        matches!(
            self,
            LedgerAction::Credit | LedgerAction::Sale | LedgerAction::Refund | LedgerAction::Reward
        )
    }

    /// Turn a magnitude into the signed balance delta for this action
    pub fn signed(&self, magnitude: Credits) -> Credits {
        let magnitude = magnitude.abs();
        if self.adds_credits() {
            magnitude
        } else {
            -magnitude
        }
    }
}

impl fmt::Display for LedgerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LedgerAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LedgerAction::ALL
            .iter()
            .copied()
            .find(|action| action.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown ledger action '{}'", s))
    }
}

/// Reason contributing to a batched reward, e.g. `kill` or `headshot`.
///
/// Each collaborator brings its own vocabulary; names are normalized to
/// trimmed lowercase so the same cause always lands in the same slot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct CauseKind(String);

impl CauseKind {
    pub fn new(name: impl AsRef<str>) -> Self {
        CauseKind(name.as_ref().trim().to_ascii_lowercase())
    }

    pub fn kill() -> Self {
        Self::new("kill")
    }

    pub fn headshot() -> Self {
        Self::new("headshot")
    }

    pub fn assist() -> Self {
        Self::new("assist")
    }

    pub fn quiz() -> Self {
        Self::new("quiz")
    }

    pub fn playtime() -> Self {
        Self::new("playtime")
    }

    pub fn name_bonus() -> Self {
        Self::new("name_bonus")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for CauseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CauseKind {
    fn from(value: &str) -> Self {
        CauseKind::new(value)
    }
}

/// Item attached to a purchase, sale or other direct change
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ItemInfo {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl ItemInfo {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// Entry as handed to the ledger, before a sequence id is assigned
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewLedgerEntry {
    pub timestamp: i64,
    pub identity: Identity,
    pub display_name: String,
    pub action: LedgerAction,
    /// Signed balance delta of this event
    pub amount: Credits,
    pub balance_after: Credits,
    pub item_id: Option<String>,
    pub item_display_name: Option<String>,
}

impl NewLedgerEntry {
    pub fn with_sequence(self, sequence_id: u64) -> LedgerEntry {
        LedgerEntry {
            sequence_id,
            timestamp: self.timestamp,
            identity: self.identity,
            display_name: self.display_name,
            action: self.action,
            amount: self.amount,
            balance_after: self.balance_after,
            item_id: self.item_id,
            item_display_name: self.item_display_name,
        }
    }
}

/// Immutable ledger record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerEntry {
    pub sequence_id: u64,
    /// Unix timestamp, second resolution
    pub timestamp: i64,
    pub identity: Identity,
    /// Name as it was when the entry was written
    pub display_name: String,
    pub action: LedgerAction,
    pub amount: Credits,
    pub balance_after: Credits,
    pub item_id: Option<String>,
    pub item_display_name: Option<String>,
}

impl LedgerEntry {
    /// Newest-first ordering: timestamp descending, then sequence id descending
    pub fn newest_first(a: &LedgerEntry, b: &LedgerEntry) -> Ordering {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| b.sequence_id.cmp(&a.sequence_id))
    }
}
