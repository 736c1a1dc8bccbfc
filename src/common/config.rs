//! Configuration management for the fairbet core
//!
//! Configuration is a TOML document with one section per subsystem. Every field has a
//! default so an empty file (or no file at all) yields a working setup; `FAIRBET_*`
//! environment variables override individual values.

use crate::common::types::Cents;
use crate::errors::{CasinoResult, ConfigurationError};
use crate::models::RatingPeriod;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::str::FromStr;

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CasinoConfig {
    pub betting: BettingConfig,
    pub wallet: WalletConfig,
    pub credit: CreditConfig,
    pub rewards: RewardConfig,
    pub vip: VipConfig,
    pub bonus: BonusConfig,
    pub heist: HeistConfig,
    pub crash: CrashConfig,
    pub storage: StorageConfig,
    pub scheduler: SchedulerConfig,
}

/// Stake limits, in cents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BettingConfig {
    pub min_bet: Cents,
    pub max_bet: Cents,
}

impl Default for BettingConfig {
    fn default() -> Self {
        Self { min_bet: 100, max_bet: 100_000 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    /// Credited once when an account is created
    pub starter_bonus: Cents,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self { starter_bonus: 10_000 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreditConfig {
    /// Repayment as a percentage of the borrowed amount (110 = 1.1x)
    pub interest_percent: u32,
    pub term_days: i64,
}

impl Default for CreditConfig {
    fn default() -> Self {
        Self { interest_percent: 110, term_days: 7 }
    }
}

/// Top-3 leaderboard payouts per period, in cents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    pub daily: [Cents; 3],
    pub weekly: [Cents; 3],
    pub monthly: [Cents; 3],
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            daily: [150_000, 70_000, 40_000],
            weekly: [500_000, 250_000, 100_000],
            monthly: [1_500_000, 700_000, 300_000],
        }
    }
}

impl RewardConfig {
    pub fn amounts(&self, period: RatingPeriod) -> &[Cents; 3] {
        match period {
            RatingPeriod::Daily => &self.daily,
            RatingPeriod::Weekly => &self.weekly,
            RatingPeriod::Monthly => &self.monthly,
        }
    }
}

/// Defaults applied when a user is promoted to VIP
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VipConfig {
    pub multiplier_percent: u32,
    pub cashback_percent: u32,
}

impl Default for VipConfig {
    fn default() -> Self {
        Self { multiplier_percent: 130, cashback_percent: 10 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BonusConfig {
    pub cooldown_hours: i64,
    pub min_amount: Cents,
    pub max_amount: Cents,
    /// Extra percent per consecutive day
    pub streak_step_percent: u32,
    pub max_streak_steps: u32,
}

impl Default for BonusConfig {
    fn default() -> Self {
        Self {
            cooldown_hours: 24,
            min_amount: 1_000,
            max_amount: 9_999,
            streak_step_percent: 10,
            max_streak_steps: 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeistConfig {
    pub cooldown_hours: i64,
    pub min_robber_balance: Cents,
    pub min_target_balance: Cents,
    pub success_percent: u32,
    pub steal_percent: u32,
    pub penalty_percent: u32,
}

impl Default for HeistConfig {
    fn default() -> Self {
        Self {
            cooldown_hours: 24,
            min_robber_balance: 1_000,
            min_target_balance: 100,
            success_percent: 25,
            steal_percent: 30,
            penalty_percent: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrashConfig {
    pub tick_interval_ms: u64,
}

impl Default for CrashConfig {
    fn default() -> Self {
        Self { tick_interval_ms: 100 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    RocksDb,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(StorageBackend::Memory),
            "rocksdb" => Ok(StorageBackend::RocksDb),
            other => Err(format!("unknown storage backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub data_dir: String,
    pub sync_writes: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::RocksDb,
            data_dir: "./fairbet_data".to_string(),
            sync_writes: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub rewards_interval_secs: u64,
    pub overdue_interval_secs: u64,
    /// Mines rounds untouched this long are closed by the sweep
    pub mines_idle_secs: u64,
    pub mines_sweep_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            rewards_interval_secs: 3_600,
            overdue_interval_secs: 900,
            mines_idle_secs: 600,
            mines_sweep_interval_secs: 60,
        }
    }
}

/// Configuration loader with environment variable support
#[derive(Debug, Default)]
pub struct ConfigLoader {
    config_path: Option<String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Set the configuration file path
    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Load configuration from file and environment variables, then validate
    pub fn load(&self) -> CasinoResult<CasinoConfig> {
        let mut config = match self.config_path {
            Some(ref path) => Self::load_from_file(path)?,
            None => CasinoConfig::default(),
        };

        Self::apply_env_overrides(&mut config)?;
        validate(&config)?;

        tracing::debug!(path = ?self.config_path, "configuration loaded");
        Ok(config)
    }

    /// Write configuration as TOML
    pub fn save<P: AsRef<Path>>(config: &CasinoConfig, path: P) -> CasinoResult<()> {
        let content = toml::to_string_pretty(config)
            .map_err(|e| ConfigurationError::SaveFailed(format!("Failed to serialize: {}", e)))?;
        std::fs::write(path.as_ref(), content).map_err(|e| {
            ConfigurationError::SaveFailed(format!(
                "Failed to write {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Ok(())
    }

    fn load_from_file(path: &str) -> CasinoResult<CasinoConfig> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to read {}: {}", path, e)))?;

        toml::from_str(&content)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to parse TOML: {}", e)).into())
    }

    fn apply_env_overrides(config: &mut CasinoConfig) -> CasinoResult<()> {
        if let Some(min_bet) = env_parse("FAIRBET_MIN_BET")? {
            config.betting.min_bet = min_bet;
        }
        if let Some(max_bet) = env_parse("FAIRBET_MAX_BET")? {
            config.betting.max_bet = max_bet;
        }
        if let Some(bonus) = env_parse("FAIRBET_STARTER_BONUS")? {
            config.wallet.starter_bonus = bonus;
        }
        if let Some(backend) = env_parse("FAIRBET_STORAGE_BACKEND")? {
            config.storage.backend = backend;
        }
        if let Ok(data_dir) = env::var("FAIRBET_DATA_DIR") {
            config.storage.data_dir = data_dir;
        }
        if let Some(idle) = env_parse("FAIRBET_MINES_IDLE_SECS")? {
            config.scheduler.mines_idle_secs = idle;
        }
        if let Some(tick) = env_parse("FAIRBET_CRASH_TICK_MS")? {
            config.crash.tick_interval_ms = tick;
        }
        Ok(())
    }
}

fn env_parse<T: FromStr>(name: &str) -> CasinoResult<Option<T>> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map(Some).map_err(|_| {
            ConfigurationError::InvalidValue {
                field: name.to_string(),
                value: raw,
                reason: "could not be parsed".to_string(),
            }
            .into()
        }),
        Err(_) => Ok(None),
    }
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> ConfigurationError {
    ConfigurationError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Validate configuration values
pub fn validate(config: &CasinoConfig) -> CasinoResult<()> {
    let betting = &config.betting;
    if betting.min_bet == 0 {
        return Err(invalid("betting.min_bet", 0, "minimum stake must be positive").into());
    }
    if betting.min_bet > betting.max_bet {
        return Err(invalid("betting.max_bet", betting.max_bet, "must not be below min_bet").into());
    }
    if config.credit.interest_percent < 100 {
        return Err(invalid(
            "credit.interest_percent",
            config.credit.interest_percent,
            "repayment cannot be less than the loan",
        )
        .into());
    }
    if config.credit.term_days <= 0 {
        return Err(invalid("credit.term_days", config.credit.term_days, "must be positive").into());
    }
    if config.vip.multiplier_percent < 100 {
        return Err(invalid(
            "vip.multiplier_percent",
            config.vip.multiplier_percent,
            "a multiplier below 100 would shrink wins",
        )
        .into());
    }
    if config.vip.cashback_percent > 100 {
        return Err(invalid("vip.cashback_percent", config.vip.cashback_percent, "must be at most 100").into());
    }
    let bonus = &config.bonus;
    if bonus.min_amount == 0 || bonus.min_amount > bonus.max_amount {
        return Err(invalid("bonus.min_amount", bonus.min_amount, "must be positive and not above max_amount").into());
    }
    let heist = &config.heist;
    for (field, value) in [
        ("heist.success_percent", heist.success_percent),
        ("heist.steal_percent", heist.steal_percent),
        ("heist.penalty_percent", heist.penalty_percent),
    ] {
        if value > 100 {
            return Err(invalid(field, value, "must be at most 100").into());
        }
    }
    if config.crash.tick_interval_ms == 0 {
        return Err(invalid("crash.tick_interval_ms", 0, "must be positive").into());
    }
    let scheduler = &config.scheduler;
    if scheduler.rewards_interval_secs == 0
        || scheduler.overdue_interval_secs == 0
        || scheduler.mines_sweep_interval_secs == 0
    {
        return Err(invalid("scheduler", 0, "job intervals must be positive").into());
    }
    if scheduler.mines_idle_secs == 0 {
        return Err(invalid("scheduler.mines_idle_secs", 0, "must be positive").into());
    }
    Ok(())
}

/// Fluent builder, mostly for tests and the CLI
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: CasinoConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self { config: CasinoConfig::default() }
    }

    pub fn stake_limits(mut self, min_bet: Cents, max_bet: Cents) -> Self {
        self.config.betting = BettingConfig { min_bet, max_bet };
        self
    }

    pub fn starter_bonus(mut self, amount: Cents) -> Self {
        self.config.wallet.starter_bonus = amount;
        self
    }

    pub fn crash_tick_ms(mut self, tick_interval_ms: u64) -> Self {
        self.config.crash.tick_interval_ms = tick_interval_ms;
        self
    }

    pub fn mines_idle_secs(mut self, secs: u64) -> Self {
        self.config.scheduler.mines_idle_secs = secs;
        self
    }

    pub fn in_memory(mut self) -> Self {
        self.config.storage.backend = StorageBackend::Memory;
        self
    }

    pub fn data_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config.storage.backend = StorageBackend::RocksDb;
        self.config.storage.data_dir = path.as_ref().to_string_lossy().to_string();
        self
    }

    pub fn build(self) -> CasinoResult<CasinoConfig> {
        validate(&self.config)?;
        Ok(self.config)
    }
}
