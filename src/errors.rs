//! Error types for the fairbet core
//!
//! Every fallible operation returns [`CasinoResult`]. Declines a player can act on
//! (insufficient funds, stake limits, credit refusals) are ordinary variants; storage
//! and configuration failures are nested categories converted with `?`.

use crate::common::types::{Cents, UserId};
use crate::models::CreditTier;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// Crate-wide result alias
pub type CasinoResult<T> = Result<T, CasinoError>;

/// Root error type for all fairbet operations
#[derive(Debug, Error)]
pub enum CasinoError {
    #[error("insufficient funds: needed {needed}, available {available}")]
    InsufficientFunds { needed: Cents, available: Cents },

    #[error("stake {stake} outside allowed range {min}..={max}")]
    InvalidStake { stake: Cents, min: Cents, max: Cents },

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("bet {0} not found")]
    BetNotFound(Uuid),

    #[error("bet {0} already completed")]
    AlreadyCompleted(Uuid),

    #[error("credit unavailable: {0}")]
    CreditUnavailable(CreditRefusal),

    #[error("credit {0} not found")]
    CreditNotFound(Uuid),

    #[error("reward {0} not found")]
    RewardNotFound(Uuid),

    #[error("reward {0} already claimed")]
    RewardAlreadyClaimed(Uuid),

    #[error("user {0} not found")]
    UserNotFound(UserId),

    #[error("user {0} is banned")]
    UserBanned(UserId),

    #[error("{action} on cooldown for another {remaining_secs}s")]
    Cooldown { action: &'static str, remaining_secs: i64 },

    #[error("game session {0} not found")]
    SessionNotFound(Uuid),

    #[error("invalid move: {0}")]
    InvalidMove(String),

    #[error("seed material rejected: {0}")]
    SeedRejected(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

/// Why a credit draw was declined
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CreditRefusal {
    #[error("credit is available to VIP users only")]
    NotVip,

    #[error("an outstanding loan {0} must be repaid first")]
    OutstandingLoan(Uuid),

    #[error("tier {tier} available again at {available_at}")]
    TierCooldown { tier: CreditTier, available_at: DateTime<Utc> },
}

/// Storage system errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to open database: {0}")]
    DatabaseOpenFailed(String),

    #[error("read failed: {0}")]
    ReadFailed(String),

    #[error("write failed: {0}")]
    WriteFailed(String),

    #[error("corrupted data: {0}")]
    CorruptedData(String),

    #[error("lock not held for {0}")]
    LockNotHeld(String),
}

/// Configuration and validation errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("invalid value '{value}' for {field}: {reason}")]
    InvalidValue { field: String, value: String, reason: String },

    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("failed to save configuration: {0}")]
    SaveFailed(String),
}

impl From<rocksdb::Error> for StorageError {
    fn from(err: rocksdb::Error) -> Self {
        StorageError::WriteFailed(err.to_string())
    }
}

impl CasinoError {
    /// Declines the caller can recover from without operator help.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CasinoError::InsufficientFunds { .. }
                | CasinoError::InvalidStake { .. }
                | CasinoError::InvalidAmount(_)
                | CasinoError::CreditUnavailable(_)
                | CasinoError::Cooldown { .. }
                | CasinoError::InvalidMove(_)
                | CasinoError::RewardAlreadyClaimed(_)
        )
    }

    /// Player-facing explanation. Never includes row ids or storage detail.
    pub fn user_message(&self) -> String {
        match self {
            CasinoError::InsufficientFunds { needed, available } => format!(
                "Not enough balance: this needs {} but you have {}.",
                format_cents(*needed),
                format_cents(*available)
            ),
            CasinoError::InvalidStake { min, max, .. } => format!(
                "Stakes must be between {} and {}.",
                format_cents(*min),
                format_cents(*max)
            ),
            CasinoError::InvalidAmount(reason) => format!("Invalid amount: {}.", reason),
            CasinoError::CreditUnavailable(CreditRefusal::NotVip) => {
                "Credit is available to VIP players only.".to_string()
            }
            CasinoError::CreditUnavailable(CreditRefusal::OutstandingLoan(_)) => {
                "You already have a loan. Repay it before taking another.".to_string()
            }
            CasinoError::CreditUnavailable(CreditRefusal::TierCooldown { available_at, .. }) => {
                format!(
                    "This credit tier is on cooldown until {}.",
                    available_at.format("%Y-%m-%d %H:%M UTC")
                )
            }
            CasinoError::UserBanned(_) => "Your account is blocked.".to_string(),
            CasinoError::Cooldown { remaining_secs, .. } => {
                let hours = remaining_secs / 3600;
                let minutes = (remaining_secs % 3600) / 60;
                format!("Try again in {}h {}m.", hours, minutes)
            }
            CasinoError::InvalidMove(reason) => format!("That move is not allowed: {}.", reason),
            CasinoError::RewardAlreadyClaimed(_) => "That reward was already claimed.".to_string(),
            CasinoError::BetNotFound(_)
            | CasinoError::SessionNotFound(_)
            | CasinoError::CreditNotFound(_)
            | CasinoError::RewardNotFound(_) => "Nothing to act on here anymore.".to_string(),
            CasinoError::UserNotFound(_) => "Start the bot first to open an account.".to_string(),
            CasinoError::AlreadyCompleted(_) => "This game is already over.".to_string(),
            CasinoError::Storage(_) | CasinoError::Configuration(_) | CasinoError::SeedRejected(_) => {
                "Something went wrong. Please try again later.".to_string()
            }
        }
    }
}

/// Renders cents as currency units, e.g. `12345` -> `$123.45`.
pub fn format_cents(cents: Cents) -> String {
    format!("${}.{:02}", cents / 100, cents % 100)
}
