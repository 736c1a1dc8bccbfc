//! Short-term credit for VIP users
//!
//! A user holds at most one outstanding loan (active or overdue). Each tier has its own
//! cooldown measured from its last draw. Manual repayment is all-or-nothing; winnings
//! repay automatically, oldest due date first, possibly in several partial steps.

use crate::common::config::CreditConfig;
use crate::common::traits::Clock;
use crate::common::types::{scale, Cents, UserId};
use crate::errors::{CasinoError, CasinoResult, CreditRefusal};
use crate::ledger;
use crate::models::{CreditLimit, CreditStatus, CreditTier, UserCredit};
use crate::records;
use crate::unit_of_work::{Store, UnitOfWork};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

fn outstanding_in(uow: &UnitOfWork, user: UserId) -> CasinoResult<Vec<UserCredit>> {
    let mut credits: Vec<UserCredit> = records::load_credits(uow, user)?
        .into_iter()
        .filter(|c| c.status.is_outstanding())
        .collect();
    credits.sort_by(|a, b| a.due_at.cmp(&b.due_at).then(a.issued_at.cmp(&b.issued_at)));
    Ok(credits)
}

/// Checks whether `tier` may be drawn right now.
pub fn can_take_credit_in(
    uow: &UnitOfWork,
    user: UserId,
    tier: CreditTier,
    now: DateTime<Utc>,
) -> CasinoResult<()> {
    let account = records::load_user(uow, user)?.ok_or(CasinoError::UserNotFound(user))?;
    if account.is_banned {
        return Err(CasinoError::UserBanned(user));
    }
    if !account.is_vip {
        return Err(CasinoError::CreditUnavailable(CreditRefusal::NotVip));
    }
    if let Some(loan) = outstanding_in(uow, user)?.first() {
        return Err(CasinoError::CreditUnavailable(CreditRefusal::OutstandingLoan(loan.id)));
    }
    if let Some(available_at) = records::load_credit_limit(uow, user, tier)?.and_then(|l| l.available_at()) {
        if now < available_at {
            return Err(CasinoError::CreditUnavailable(CreditRefusal::TierCooldown { tier, available_at }));
        }
    }
    Ok(())
}

/// Skims winnings into outstanding loans, oldest due date first. Returns the amount
/// used for repayment; the caller credits the rest.
pub fn auto_repay_in(
    uow: &mut UnitOfWork,
    user: UserId,
    winnings: Cents,
    now: DateTime<Utc>,
) -> CasinoResult<Cents> {
    uow.require_lock(user)?;
    let mut remaining = winnings;
    for mut credit in outstanding_in(uow, user)? {
        if remaining == 0 {
            break;
        }
        let portion = remaining.min(credit.amount_to_repay);
        credit.amount_to_repay -= portion;
        remaining -= portion;
        if credit.amount_to_repay == 0 {
            credit.status = CreditStatus::Paid;
            credit.paid_at = Some(now);
            tracing::info!(user_id = user, credit_id = %credit.id, "credit repaid from winnings");
        } else {
            tracing::debug!(user_id = user, credit_id = %credit.id, portion, left = credit.amount_to_repay, "credit partially repaid");
        }
        records::store_credit(uow, &credit)?;
    }
    Ok(winnings - remaining)
}

/// Draw state of one tier for a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierAvailability {
    pub tier: CreditTier,
    pub amount: Cents,
    pub amount_to_repay: Cents,
    /// `None` when the tier can be drawn now
    pub available_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct CreditService {
    store: Store,
    clock: Arc<dyn Clock>,
    config: CreditConfig,
}

impl CreditService {
    pub fn new(store: Store, clock: Arc<dyn Clock>, config: CreditConfig) -> Self {
        Self { store, clock, config }
    }

    pub async fn can_take_credit(&self, user: UserId, tier: CreditTier) -> CasinoResult<()> {
        can_take_credit_in(&self.store.reader(), user, tier, self.clock.now())
    }

    /// Issues a loan of the tier's amount and pays it into the wallet.
    pub async fn take_credit(&self, user: UserId, tier: CreditTier) -> CasinoResult<UserCredit> {
        let mut uow = self.store.begin(&[user]).await;
        let now = self.clock.now();
        can_take_credit_in(&uow, user, tier, now)?;

        let amount = tier.amount();
        let credit = UserCredit {
            id: Uuid::new_v4(),
            user_id: user,
            tier,
            amount,
            interest_percent: self.config.interest_percent,
            amount_to_repay: scale(amount, self.config.interest_percent as u64, 100),
            issued_at: now,
            due_at: now + Duration::days(self.config.term_days),
            status: CreditStatus::Active,
            paid_at: None,
        };
        records::store_credit(&mut uow, &credit)?;

        let mut limit = records::load_credit_limit(&uow, user, tier)?.unwrap_or(CreditLimit {
            user_id: user,
            tier,
            last_used_at: None,
            usage_count: 0,
        });
        limit.last_used_at = Some(now);
        limit.usage_count += 1;
        records::store_credit_limit(&mut uow, &limit)?;

        ledger::credit_in(&mut uow, user, amount, &format!("credit:{}", tier), now)?;
        uow.commit()?;

        tracing::info!(user_id = user, tier = %tier, amount, due_at = %credit.due_at, "credit issued");
        Ok(credit)
    }

    /// Repays the whole remaining amount from the wallet, or nothing at all.
    pub async fn repay_credit(&self, user: UserId, credit_id: Uuid) -> CasinoResult<UserCredit> {
        let mut uow = self.store.begin(&[user]).await;
        let now = self.clock.now();
        let mut credit = records::load_credits(&uow, user)?
            .into_iter()
            .find(|c| c.id == credit_id)
            .ok_or(CasinoError::CreditNotFound(credit_id))?;
        if !credit.status.is_outstanding() {
            return Err(CasinoError::InvalidAmount("this credit is already repaid".into()));
        }

        ledger::debit_in(&mut uow, user, credit.amount_to_repay, &format!("credit_repay:{}", credit.tier), now)?;
        credit.amount_to_repay = 0;
        credit.status = CreditStatus::Paid;
        credit.paid_at = Some(now);
        records::store_credit(&mut uow, &credit)?;
        uow.commit()?;

        tracing::info!(user_id = user, credit_id = %credit_id, "credit repaid");
        Ok(credit)
    }

    /// All loans of a user, newest first.
    pub async fn get_user_credits(&self, user: UserId) -> CasinoResult<Vec<UserCredit>> {
        let mut credits = records::load_credits(&self.store.reader(), user)?;
        credits.sort_by(|a, b| b.issued_at.cmp(&a.issued_at));
        Ok(credits)
    }

    pub async fn available_tiers(&self, user: UserId) -> CasinoResult<Vec<TierAvailability>> {
        let reader = self.store.reader();
        let now = self.clock.now();
        let mut tiers = Vec::with_capacity(CreditTier::ALL.len());
        for tier in CreditTier::ALL {
            let available_at = records::load_credit_limit(&reader, user, tier)?
                .and_then(|l| l.available_at())
                .filter(|at| *at > now);
            tiers.push(TierAvailability {
                tier,
                amount: tier.amount(),
                amount_to_repay: scale(tier.amount(), self.config.interest_percent as u64, 100),
                available_at,
            });
        }
        Ok(tiers)
    }

    /// Flips every active loan past its due date to overdue. Returns how many changed.
    pub async fn mark_overdue(&self) -> CasinoResult<usize> {
        let now = self.clock.now();
        let candidates: Vec<UserCredit> = records::load_all_credits(&self.store.reader())?
            .into_iter()
            .filter(|c| c.status == CreditStatus::Active && c.due_at < now)
            .collect();

        let mut flipped = 0;
        for candidate in candidates {
            let mut uow = self.store.begin(&[candidate.user_id]).await;
            // re-read under the lock; a win may have paid it meanwhile
            let Some(mut credit) = records::load_credits(&uow, candidate.user_id)?
                .into_iter()
                .find(|c| c.id == candidate.id)
            else {
                continue;
            };
            if credit.status != CreditStatus::Active || credit.due_at >= now {
                continue;
            }
            credit.status = CreditStatus::Overdue;
            records::store_credit(&mut uow, &credit)?;
            uow.commit()?;
            flipped += 1;
            tracing::warn!(user_id = credit.user_id, credit_id = %credit.id, "credit overdue");
        }
        Ok(flipped)
    }
}
