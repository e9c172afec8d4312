//! Error types for the shop ledger and reward settlement engine
//!
//! Every failure is contained inside the engine: storage errors degrade to
//! no-ops or empty reads, invalid input is rejected at the boundary, and
//! economy failures are reported per cause through the notification sink.

use crate::types::Identity;
use thiserror::Error;

/// Root error type for all shopcore operations
#[derive(Debug, Error)]
pub enum ShopError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// Ledger backend errors
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Reward queueing and balance mutation errors
    #[error("Reward error: {0}")]
    Reward(#[from] RewardError),
}

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Missing required field: {0}")]
    MissingRequired(String),

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),
}

/// Ledger backend errors. These never reach callers of the ledger; the
/// store logs them and degrades to a no-op or an empty result.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database open failed: {0}")]
    DatabaseOpenFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Corrupted data: {0}")]
    CorruptedData(String),

    #[error("Schema mismatch: expected version {expected}, found {found:?}")]
    SchemaMismatch { expected: u32, found: Option<u32> },

    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}

/// Reward and balance mutation errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RewardError {
    #[error("Invalid identity: {0}")]
    InvalidIdentity(Identity),

    #[error("Amount must be positive, got {0}")]
    NonPositiveAmount(String),

    #[error("Cause kind must not be empty")]
    EmptyCause,

    #[error("Economy mutation failed for {identity}: {reason}")]
    MutationFailed { identity: Identity, reason: String },
}

// External error conversions
impl From<rocksdb::Error> for ShopError {
    fn from(e: rocksdb::Error) -> Self {
        ShopError::Storage(StorageError::WriteFailed(e.to_string()))
    }
}

impl From<bincode::Error> for ShopError {
    fn from(e: bincode::Error) -> Self {
        ShopError::Storage(StorageError::CorruptedData(e.to_string()))
    }
}

impl From<std::io::Error> for ShopError {
    fn from(e: std::io::Error) -> Self {
        ShopError::Configuration(ConfigurationError::LoadFailed(e.to_string()))
    }
}

impl From<toml::de::Error> for ShopError {
    fn from(e: toml::de::Error) -> Self {
        ShopError::Configuration(ConfigurationError::LoadFailed(format!(
            "Failed to parse TOML: {}",
            e
        )))
    }
}

/// Convenience type alias for Results
pub type ShopResult<T> = Result<T, ShopError>;
