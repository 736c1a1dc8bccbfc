//! Persistent data model: users, wallets, the transaction log, bets, ratings,
//! leaderboard rewards and credit.

use crate::common::types::{Cents, UserId};
use crate::games::types::GameType;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Tone the chat layer uses when talking to a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Personality {
    #[default]
    Playful,
    Neutral,
    Formal,
    Freak,
}

impl FromStr for Personality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "playful" => Ok(Personality::Playful),
            "neutral" => Ok(Personality::Neutral),
            "formal" => Ok(Personality::Formal),
            "freak" => Ok(Personality::Freak),
            other => Err(format!("unknown personality '{}'", other)),
        }
    }
}

/// Monotonic per-game counters mixed into seeds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameNonces {
    pub dice: u64,
    pub wheel: u64,
    pub slots: u64,
    pub mines: u64,
    pub crash: u64,
}

impl GameNonces {
    /// Advances the counter for `game` and returns the new value.
    pub fn advance(&mut self, game: GameType) -> u64 {
        let counter = match game {
            GameType::Dice => &mut self.dice,
            GameType::Wheel => &mut self.wheel,
            GameType::Slots => &mut self.slots,
            GameType::Mines => &mut self.mines,
            GameType::Crash => &mut self.crash,
        };
        *counter += 1;
        *counter
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub display_name: String,
    pub is_vip: bool,
    pub vip_multiplier_enabled: bool,
    /// 130 means wins are paid at 1.3x
    pub vip_multiplier_percent: u32,
    pub vip_cashback_enabled: bool,
    pub vip_cashback_percent: u32,
    pub is_banned: bool,
    pub personality: Personality,
    pub force_win_until: Option<DateTime<Utc>>,
    pub force_loss_until: Option<DateTime<Utc>>,
    pub nonces: GameNonces,
    pub bonus_streak: u32,
    pub last_bonus_at: Option<DateTime<Utc>>,
    pub last_heist_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(id: UserId, display_name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            is_vip: false,
            vip_multiplier_enabled: false,
            vip_multiplier_percent: 100,
            vip_cashback_enabled: false,
            vip_cashback_percent: 0,
            is_banned: false,
            personality: Personality::default(),
            force_win_until: None,
            force_loss_until: None,
            nonces: GameNonces::default(),
            bonus_streak: 0,
            last_bonus_at: None,
            last_heist_at: None,
            created_at: now,
        }
    }

    pub fn vip_multiplier_active(&self) -> bool {
        self.is_vip && self.vip_multiplier_enabled && self.vip_multiplier_percent > 100
    }

    pub fn vip_cashback_active(&self) -> bool {
        self.is_vip && self.vip_cashback_enabled && self.vip_cashback_percent > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub user_id: UserId,
    pub balance: Cents,
    /// Number of transactions recorded so far; orders the log.
    pub sequence: u64,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn empty(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self { user_id, balance: 0, sequence: 0, updated_at: now }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Credit,
    Debit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Completed,
}

/// Immutable ledger entry. `amount` is always positive; `direction` carries the sign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: UserId,
    pub sequence: u64,
    pub direction: Direction,
    pub amount: Cents,
    pub reason: String,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub fn signed_amount(&self) -> i128 {
        match self.direction {
            Direction::Credit => self.amount as i128,
            Direction::Debit => -(self.amount as i128),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BetStatus {
    Pending,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bet {
    pub id: Uuid,
    pub user_id: UserId,
    /// Originating chat or conversation reference
    pub context: String,
    pub game: GameType,
    pub stake: Cents,
    pub payout: Cents,
    pub outcome: Option<String>,
    pub status: BetStatus,
    pub server_seed: Option<String>,
    pub nonce: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Seed material recorded on a bet for later verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FairnessProof {
    pub server_seed: String,
    pub nonce: u64,
}

/// Running per-user totals over all completed bets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStats {
    pub user_id: UserId,
    pub total_bets: u64,
    pub total_wagered: Cents,
    pub total_won: Cents,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RatingPeriod {
    Daily,
    Weekly,
    Monthly,
}

impl RatingPeriod {
    pub const ALL: [RatingPeriod; 3] = [RatingPeriod::Daily, RatingPeriod::Weekly, RatingPeriod::Monthly];

    pub fn as_str(&self) -> &'static str {
        match self {
            RatingPeriod::Daily => "daily",
            RatingPeriod::Weekly => "weekly",
            RatingPeriod::Monthly => "monthly",
        }
    }
}

impl fmt::Display for RatingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RatingPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" | "day" => Ok(RatingPeriod::Daily),
            "weekly" | "week" => Ok(RatingPeriod::Weekly),
            "monthly" | "month" => Ok(RatingPeriod::Monthly),
            other => Err(format!("unknown rating period '{}'", other)),
        }
    }
}

/// Aggregate for one user in one period bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRating {
    pub user_id: UserId,
    pub period: RatingPeriod,
    pub period_start: DateTime<Utc>,
    pub total_bets: u64,
    pub wins: u64,
    pub losses: u64,
    pub total_wagered: Cents,
    pub total_winnings: Cents,
    pub updated_at: DateTime<Utc>,
}

impl UserRating {
    pub fn empty(user_id: UserId, period: RatingPeriod, period_start: DateTime<Utc>) -> Self {
        Self {
            user_id,
            period,
            period_start,
            total_bets: 0,
            wins: 0,
            losses: 0,
            total_wagered: 0,
            total_winnings: 0,
            updated_at: period_start,
        }
    }

    pub fn win_rate_percent(&self) -> f64 {
        if self.total_bets == 0 {
            return 0.0;
        }
        self.wins as f64 * 100.0 / self.total_bets as f64
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardReward {
    pub id: Uuid,
    pub user_id: UserId,
    /// 1-based rank
    pub position: u8,
    pub period: RatingPeriod,
    pub amount: Cents,
    pub reward_date: NaiveDate,
    pub claimed: bool,
    pub created_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
}

/// Fixed loan configurations a VIP user may draw against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CreditTier {
    #[serde(rename = "daily_1k")]
    Daily1k,
    #[serde(rename = "weekly_5k")]
    Weekly5k,
    #[serde(rename = "monthly_15k")]
    Monthly15k,
}

impl CreditTier {
    pub const ALL: [CreditTier; 3] = [CreditTier::Daily1k, CreditTier::Weekly5k, CreditTier::Monthly15k];

    pub fn amount(&self) -> Cents {
        match self {
            CreditTier::Daily1k => 100_000,
            CreditTier::Weekly5k => 500_000,
            CreditTier::Monthly15k => 1_500_000,
        }
    }

    pub fn cooldown(&self) -> Duration {
        match self {
            CreditTier::Daily1k => Duration::days(1),
            CreditTier::Weekly5k => Duration::days(7),
            CreditTier::Monthly15k => Duration::days(30),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CreditTier::Daily1k => "daily_1k",
            CreditTier::Weekly5k => "weekly_5k",
            CreditTier::Monthly15k => "monthly_15k",
        }
    }
}

impl fmt::Display for CreditTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CreditTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CreditTier::ALL
            .into_iter()
            .find(|tier| tier.as_str() == s.trim())
            .ok_or_else(|| format!("unknown credit tier '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreditStatus {
    Active,
    Overdue,
    Paid,
}

impl CreditStatus {
    /// Active and overdue loans still owe money.
    pub fn is_outstanding(&self) -> bool {
        matches!(self, CreditStatus::Active | CreditStatus::Overdue)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCredit {
    pub id: Uuid,
    pub user_id: UserId,
    pub tier: CreditTier,
    pub amount: Cents,
    pub interest_percent: u32,
    pub amount_to_repay: Cents,
    pub issued_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub status: CreditStatus,
    pub paid_at: Option<DateTime<Utc>>,
}

/// Per-user, per-tier cooldown tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditLimit {
    pub user_id: UserId,
    pub tier: CreditTier,
    pub last_used_at: Option<DateTime<Utc>>,
    pub usage_count: u32,
}

impl CreditLimit {
    pub fn available_at(&self) -> Option<DateTime<Utc>> {
        self.last_used_at.map(|at| at + self.tier.cooldown())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nonce_advance_is_per_game() {
        let mut nonces = GameNonces::default();
        assert_eq!(nonces.advance(GameType::Slots), 1);
        assert_eq!(nonces.advance(GameType::Slots), 2);
        assert_eq!(nonces.advance(GameType::Dice), 1);
        assert_eq!(nonces.mines, 0);
    }

    #[test]
    fn test_credit_tier_names() {
        assert_eq!(serde_json::to_string(&CreditTier::Daily1k).unwrap(), "\"daily_1k\"");
        assert_eq!("monthly_15k".parse::<CreditTier>().unwrap(), CreditTier::Monthly15k);
        assert!("yearly".parse::<CreditTier>().is_err());
    }

    #[test]
    fn test_personality_parse_and_default() {
        assert_eq!(Personality::default(), Personality::Playful);
        assert_eq!("Formal".parse::<Personality>().unwrap(), Personality::Formal);
        assert!("grumpy".parse::<Personality>().is_err());
    }

    #[test]
    fn test_vip_hooks_need_vip_flag() {
        let mut user = User::new(7, "seven", Utc::now());
        user.vip_multiplier_enabled = true;
        user.vip_multiplier_percent = 130;
        assert!(!user.vip_multiplier_active());
        user.is_vip = true;
        assert!(user.vip_multiplier_active());
    }
}
