//! Bet lifecycle: `pending` (stake captured) to `completed` (payout settled)
//!
//! Completion is a guarded transition. The bet row is re-read under the owner's lock
//! and only a `Pending` bet can move on, so a second completion is rejected with
//! [`CasinoError::AlreadyCompleted`] instead of paying twice.
//!
//! On a nonzero payout the hooks run in a fixed order: VIP bonus, credit auto-repay,
//! then the remainder to the wallet. A zero payout may earn VIP cashback instead.

use crate::common::config::{BettingConfig, CasinoConfig};
use crate::common::traits::Clock;
use crate::common::types::{percent_of, scale, Cents, UserId};
use crate::credit;
use crate::errors::{CasinoError, CasinoResult};
use crate::games::GameType;
use crate::ledger;
use crate::metrics::CasinoMetrics;
use crate::models::{Bet, BetStatus, FairnessProof, RatingPeriod, UserStats};
use crate::rating;
use crate::records;
use crate::unit_of_work::{Store, UnitOfWork};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Everything needed to open a bet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBet {
    pub user_id: UserId,
    pub context: String,
    pub game: GameType,
    pub stake: Cents,
    pub proof: Option<FairnessProof>,
}

/// How the money of a completed bet was distributed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub bet: Bet,
    /// Payout chosen by the game, before VIP adjustments
    pub base_payout: Cents,
    pub vip_bonus: Cents,
    /// Part of the win used to pay down credit
    pub credit_repaid: Cents,
    /// Part of the win paid into the wallet
    pub credited: Cents,
    pub cashback: Cents,
    pub refunded: bool,
}

impl Settlement {
    /// Win after VIP adjustments; what ratings and stats count.
    pub fn total_win(&self) -> Cents {
        self.base_payout + self.vip_bonus
    }

    /// Wallet change over the whole bet, stake included.
    pub fn net(&self) -> i128 {
        (self.credited + self.cashback) as i128 - self.bet.stake as i128
    }
}

pub fn check_stake(limits: &BettingConfig, stake: Cents) -> CasinoResult<()> {
    if stake < limits.min_bet || stake > limits.max_bet {
        return Err(CasinoError::InvalidStake { stake, min: limits.min_bet, max: limits.max_bet });
    }
    Ok(())
}

#[derive(Clone)]
pub struct BetManager {
    store: Store,
    config: Arc<CasinoConfig>,
    clock: Arc<dyn Clock>,
    metrics: Arc<CasinoMetrics>,
}

impl BetManager {
    pub fn new(store: Store, config: Arc<CasinoConfig>, clock: Arc<dyn Clock>, metrics: Arc<CasinoMetrics>) -> Self {
        Self { store, config, clock, metrics }
    }

    /// Validates the stake, debits it and inserts the bet as `Pending`, all in `uow`.
    pub fn create_bet_in(&self, uow: &mut UnitOfWork, request: NewBet, now: DateTime<Utc>) -> CasinoResult<Bet> {
        check_stake(&self.config.betting, request.stake)?;
        if let Some(user) = records::load_user(uow, request.user_id)? {
            if user.is_banned {
                return Err(CasinoError::UserBanned(request.user_id));
            }
        }

        let id = Uuid::new_v4();
        ledger::debit_in(uow, request.user_id, request.stake, &format!("bet:{}:{}", request.game, id), now)?;
        let (server_seed, nonce) = match request.proof {
            Some(proof) => (Some(proof.server_seed), Some(proof.nonce)),
            None => (None, None),
        };
        let bet = Bet {
            id,
            user_id: request.user_id,
            context: request.context,
            game: request.game,
            stake: request.stake,
            payout: 0,
            outcome: None,
            status: BetStatus::Pending,
            server_seed,
            nonce,
            created_at: now,
            completed_at: None,
        };
        records::store_bet(uow, &bet)?;
        Ok(bet)
    }

    pub async fn create_bet(&self, user: UserId, context: &str, game: GameType, stake: Cents) -> CasinoResult<Bet> {
        let mut uow = self.store.begin(&[user]).await;
        let request = NewBet { user_id: user, context: context.to_string(), game, stake, proof: None };
        let bet = match self.create_bet_in(&mut uow, request, self.clock.now()) {
            Ok(bet) => bet,
            Err(e) => {
                if e.is_recoverable() {
                    self.metrics.record_declined();
                }
                return Err(e);
            }
        };
        uow.commit()?;
        self.metrics.record_bet_created(stake);
        tracing::info!(user_id = user, bet_id = %bet.id, game = %game, stake, "bet created");
        Ok(bet)
    }

    fn pending_in(&self, uow: &UnitOfWork, bet_id: Uuid) -> CasinoResult<Bet> {
        let bet = records::load_bet(uow, bet_id)?.ok_or(CasinoError::BetNotFound(bet_id))?;
        uow.require_lock(bet.user_id)?;
        if bet.status == BetStatus::Completed {
            tracing::warn!(bet_id = %bet_id, user_id = bet.user_id, "completion attempted on a settled bet");
            return Err(CasinoError::AlreadyCompleted(bet_id));
        }
        Ok(bet)
    }

    fn finish_in(
        &self,
        uow: &mut UnitOfWork,
        mut bet: Bet,
        outcome: &str,
        payout: Cents,
        now: DateTime<Utc>,
    ) -> CasinoResult<Bet> {
        bet.outcome = Some(outcome.to_string());
        bet.payout = payout;
        bet.status = BetStatus::Completed;
        bet.completed_at = Some(now);
        records::store_bet(uow, &bet)?;
        Ok(bet)
    }

    /// Settles a pending bet with the game's `payout`. Requires the owner's lock in `uow`.
    pub fn complete_bet_in(
        &self,
        uow: &mut UnitOfWork,
        bet_id: Uuid,
        outcome: &str,
        payout: Cents,
        now: DateTime<Utc>,
    ) -> CasinoResult<Settlement> {
        let bet = self.pending_in(uow, bet_id)?;
        let user_id = bet.user_id;
        let user = records::load_user(uow, user_id)?;

        let mut vip_bonus = 0;
        let mut credit_repaid = 0;
        let mut credited = 0;
        let mut cashback = 0;
        if payout > 0 {
            if let Some(user) = user.as_ref().filter(|u| u.vip_multiplier_active()) {
                vip_bonus = scale(payout, (user.vip_multiplier_percent - 100) as u64, 100);
            }
            let total = payout + vip_bonus;
            credit_repaid = credit::auto_repay_in(uow, user_id, total, now)?;
            credited = total - credit_repaid;
            if credited > 0 {
                ledger::credit_in(uow, user_id, credited, &format!("win:{}:{}", bet.game, bet.id), now)?;
            }
        } else if let Some(user) = user.as_ref().filter(|u| u.vip_cashback_active()) {
            cashback = percent_of(bet.stake, user.vip_cashback_percent);
            if cashback > 0 {
                ledger::credit_in(uow, user_id, cashback, &format!("vip_cashback:{}", bet.id), now)?;
            }
        }

        let win = payout + vip_bonus;
        for period in RatingPeriod::ALL {
            rating::update_user_rating_in(uow, user_id, bet.stake, win, period, now)?;
        }
        let mut stats = records::load_stats(uow, user_id)?
            .unwrap_or(UserStats { user_id, ..UserStats::default() });
        stats.total_bets += 1;
        stats.total_wagered = stats.total_wagered.saturating_add(bet.stake);
        stats.total_won = stats.total_won.saturating_add(win);
        records::store_stats(uow, &stats)?;

        let bet = self.finish_in(uow, bet, outcome, payout, now)?;
        Ok(Settlement {
            bet,
            base_payout: payout,
            vip_bonus,
            credit_repaid,
            credited,
            cashback,
            refunded: false,
        })
    }

    /// Completes the bet exactly once. A second call fails with `AlreadyCompleted`.
    pub async fn complete_bet(&self, bet_id: Uuid, outcome: &str, payout: Cents) -> CasinoResult<Settlement> {
        let owner = records::load_bet(&self.store.reader(), bet_id)?
            .ok_or(CasinoError::BetNotFound(bet_id))?
            .user_id;
        let mut uow = self.store.begin(&[owner]).await;
        let settlement = self.complete_bet_in(&mut uow, bet_id, outcome, payout, self.clock.now())?;
        uow.commit()?;

        self.metrics.record_bet_completed(settlement.credited + settlement.credit_repaid + settlement.cashback);
        tracing::info!(
            user_id = owner,
            bet_id = %bet_id,
            outcome,
            payout,
            vip_bonus = settlement.vip_bonus,
            credit_repaid = settlement.credit_repaid,
            cashback = settlement.cashback,
            "bet completed"
        );
        Ok(settlement)
    }

    /// Returns the stake and closes the bet without touching ratings, VIP hooks or credit.
    pub fn refund_bet_in(
        &self,
        uow: &mut UnitOfWork,
        bet_id: Uuid,
        outcome: &str,
        now: DateTime<Utc>,
    ) -> CasinoResult<Settlement> {
        let bet = self.pending_in(uow, bet_id)?;
        ledger::credit_in(uow, bet.user_id, bet.stake, &format!("refund:{}", bet.id), now)?;
        let stake = bet.stake;
        let bet = self.finish_in(uow, bet, outcome, stake, now)?;
        Ok(Settlement {
            bet,
            base_payout: stake,
            vip_bonus: 0,
            credit_repaid: 0,
            credited: stake,
            cashback: 0,
            refunded: true,
        })
    }

    pub async fn refund_bet(&self, bet_id: Uuid, outcome: &str) -> CasinoResult<Settlement> {
        let owner = records::load_bet(&self.store.reader(), bet_id)?
            .ok_or(CasinoError::BetNotFound(bet_id))?
            .user_id;
        let mut uow = self.store.begin(&[owner]).await;
        let settlement = self.refund_bet_in(&mut uow, bet_id, outcome, self.clock.now())?;
        uow.commit()?;
        self.metrics.record_bet_completed(settlement.credited);
        tracing::info!(user_id = owner, bet_id = %bet_id, stake = settlement.credited, "bet refunded");
        Ok(settlement)
    }

    pub async fn get_bet(&self, bet_id: Uuid) -> CasinoResult<Bet> {
        records::load_bet(&self.store.reader(), bet_id)?.ok_or(CasinoError::BetNotFound(bet_id))
    }

    /// Bets whose stake was taken but that were never settled, oldest first.
    pub async fn pending_bets(&self) -> CasinoResult<Vec<Bet>> {
        let reader = self.store.reader();
        let mut bets = Vec::new();
        for id in records::load_pending_bet_ids(&reader)? {
            if let Some(bet) = records::load_bet(&reader, id)? {
                bets.push(bet);
            }
        }
        bets.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(bets)
    }

    /// Refunds every bet left pending before `older_than`. Returns how many were refunded.
    pub async fn refund_stranded(&self, older_than: DateTime<Utc>) -> CasinoResult<usize> {
        let mut refunded = 0;
        for bet in self.pending_bets().await? {
            if bet.created_at >= older_than {
                continue;
            }
            match self.refund_bet(bet.id, "stranded").await {
                Ok(_) => refunded += 1,
                // settled between the scan and the lock
                Err(CasinoError::AlreadyCompleted(_)) => {}
                Err(e) => return Err(e),
            }
        }
        if refunded > 0 {
            tracing::warn!(refunded, "stranded bets refunded");
        }
        Ok(refunded)
    }

    pub async fn user_stats(&self, user: UserId) -> CasinoResult<UserStats> {
        Ok(records::load_stats(&self.store.reader(), user)?
            .unwrap_or(UserStats { user_id: user, ..UserStats::default() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::{CreditStatus, CreditTier, User, UserCredit};
    use chrono::{Duration, TimeZone};

    struct Fixture {
        store: Store,
        bets: BetManager,
        ledger: ledger::Ledger,
    }

    async fn fixture(user: User, balance: Cents) -> Fixture {
        let store = Store::in_memory();
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()));
        let mut uow = store.begin(&[user.id]).await;
        records::store_user(&mut uow, &user).unwrap();
        uow.commit().unwrap();
        let ledger = ledger::Ledger::new(store.clone(), clock.clone());
        if balance > 0 {
            ledger.credit(user.id, balance, "seed").await.unwrap();
        }
        let bets = BetManager::new(
            store.clone(),
            Arc::new(CasinoConfig::default()),
            clock,
            Arc::new(CasinoMetrics::new()),
        );
        Fixture { store, bets, ledger }
    }

    fn player(id: UserId) -> User {
        User::new(id, "player", Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
    }

    #[tokio::test]
    async fn test_create_bet_captures_stake() {
        let f = fixture(player(1), 10_000).await;
        let bet = f.bets.create_bet(1, "chat:1", GameType::Dice, 2_000).await.unwrap();
        assert_eq!(bet.status, BetStatus::Pending);
        assert_eq!(f.ledger.get_balance(1).await.unwrap(), 8_000);
        assert_eq!(f.bets.pending_bets().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stake_limits_mutate_nothing() {
        let f = fixture(player(1), 10_000).await;
        let err = f.bets.create_bet(1, "c", GameType::Dice, 99).await.unwrap_err();
        assert!(matches!(err, CasinoError::InvalidStake { stake: 99, min: 100, max: 100_000 }));
        let err = f.bets.create_bet(1, "c", GameType::Dice, 100_001).await.unwrap_err();
        assert!(matches!(err, CasinoError::InvalidStake { .. }));
        assert_eq!(f.ledger.get_balance(1).await.unwrap(), 10_000);
        assert!(f.bets.pending_bets().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_bet_without_funds() {
        let f = fixture(player(1), 500).await;
        let err = f.bets.create_bet(1, "c", GameType::Wheel, 1_000).await.unwrap_err();
        assert!(matches!(err, CasinoError::InsufficientFunds { needed: 1_000, available: 500 }));
        assert!(f.bets.pending_bets().await.unwrap().is_empty());
        assert_eq!(f.bets.metrics.snapshot().stakes_declined, 1);
    }

    #[tokio::test]
    async fn test_complete_twice_rejected() {
        let f = fixture(player(1), 10_000).await;
        let bet = f.bets.create_bet(1, "c", GameType::Dice, 2_000).await.unwrap();
        f.bets.complete_bet(bet.id, "dice:6:3", 2_600).await.unwrap();
        let err = f.bets.complete_bet(bet.id, "dice:6:3", 2_600).await.unwrap_err();
        assert!(matches!(err, CasinoError::AlreadyCompleted(id) if id == bet.id));
        assert_eq!(f.ledger.get_balance(1).await.unwrap(), 10_600);
    }

    #[tokio::test]
    async fn test_unknown_bet() {
        let f = fixture(player(1), 0).await;
        let id = Uuid::new_v4();
        assert!(matches!(f.bets.complete_bet(id, "x", 0).await, Err(CasinoError::BetNotFound(b)) if b == id));
    }

    #[tokio::test]
    async fn test_vip_multiplier_on_win() {
        let mut user = player(1);
        user.is_vip = true;
        user.vip_multiplier_enabled = true;
        user.vip_multiplier_percent = 130;
        let f = fixture(user, 10_000).await;
        let bet = f.bets.create_bet(1, "c", GameType::Dice, 2_000).await.unwrap();
        let settlement = f.bets.complete_bet(bet.id, "dice:6:3", 2_600).await.unwrap();
        assert_eq!(settlement.vip_bonus, 780);
        assert_eq!(settlement.credited, 3_380);
        assert_eq!(f.ledger.get_balance(1).await.unwrap(), 11_380);
        assert_eq!(f.bets.user_stats(1).await.unwrap().total_won, 3_380);
    }

    #[tokio::test]
    async fn test_vip_cashback_on_loss_only_for_vip() {
        let mut user = player(1);
        user.vip_cashback_enabled = true;
        user.vip_cashback_percent = 10;
        let f = fixture(user.clone(), 10_000).await;
        let bet = f.bets.create_bet(1, "c", GameType::Wheel, 1_000).await.unwrap();
        let settlement = f.bets.complete_bet(bet.id, "wheel:red:4", 0).await.unwrap();
        assert_eq!(settlement.cashback, 0);

        user.is_vip = true;
        let f = fixture(user, 10_000).await;
        let bet = f.bets.create_bet(1, "c", GameType::Wheel, 1_000).await.unwrap();
        let settlement = f.bets.complete_bet(bet.id, "wheel:red:4", 0).await.unwrap();
        assert_eq!(settlement.cashback, 100);
        assert_eq!(f.ledger.get_balance(1).await.unwrap(), 9_100);
    }

    #[tokio::test]
    async fn test_win_repays_credit_first() {
        let f = fixture(player(1), 10_000).await;
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let mut uow = f.store.begin(&[1]).await;
        records::store_credit(
            &mut uow,
            &UserCredit {
                id: Uuid::new_v4(),
                user_id: 1,
                tier: CreditTier::Daily1k,
                amount: 1_000,
                interest_percent: 110,
                amount_to_repay: 1_100,
                issued_at: now,
                due_at: now + Duration::days(7),
                status: CreditStatus::Active,
                paid_at: None,
            },
        )
        .unwrap();
        uow.commit().unwrap();

        let bet = f.bets.create_bet(1, "c", GameType::Dice, 2_000).await.unwrap();
        let settlement = f.bets.complete_bet(bet.id, "dice:6:3", 2_600).await.unwrap();
        assert_eq!(settlement.credit_repaid, 1_100);
        assert_eq!(settlement.credited, 1_500);
        assert_eq!(f.ledger.get_balance(1).await.unwrap(), 9_500);
    }

    #[tokio::test]
    async fn test_refund_returns_stake_without_rating() {
        let f = fixture(player(1), 10_000).await;
        let bet = f.bets.create_bet(1, "c", GameType::Mines, 2_000).await.unwrap();
        let settlement = f.bets.refund_bet(bet.id, "mines:0:cancel").await.unwrap();
        assert!(settlement.refunded);
        assert_eq!(f.ledger.get_balance(1).await.unwrap(), 10_000);
        assert_eq!(f.bets.user_stats(1).await.unwrap().total_bets, 0);
        assert!(matches!(
            f.bets.complete_bet(bet.id, "x", 5_000).await,
            Err(CasinoError::AlreadyCompleted(_))
        ));
    }

    #[tokio::test]
    async fn test_refund_stranded_bets() {
        let f = fixture(player(1), 10_000).await;
        f.bets.create_bet(1, "c", GameType::Crash, 1_000).await.unwrap();
        let later = Utc.with_ymd_and_hms(2024, 3, 1, 13, 0, 0).unwrap();
        assert_eq!(f.bets.refund_stranded(later).await.unwrap(), 1);
        assert!(f.bets.pending_bets().await.unwrap().is_empty());
        assert_eq!(f.ledger.get_balance(1).await.unwrap(), 10_000);
    }
}
