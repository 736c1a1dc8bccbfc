//! Accounts: creation, VIP and moderation flags, override windows, the daily bonus
//! and heists.

use crate::common::config::{BonusConfig, HeistConfig, VipConfig, WalletConfig};
use crate::common::traits::Clock;
use crate::common::types::{percent_of, scale, Cents, SharedRng, UserId};
use crate::errors::{CasinoError, CasinoResult};
use crate::games::{FairnessOverride, GameType};
use crate::ledger;
use crate::models::{Personality, User};
use crate::records;
use crate::unit_of_work::{Store, UnitOfWork};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Streak continues when the previous claim is at most this old.
const BONUS_STREAK_WINDOW_HOURS: i64 = 48;

/// Loads the user or fails with `UserNotFound`, also refusing banned users.
pub fn active_user_in(uow: &UnitOfWork, user: UserId) -> CasinoResult<User> {
    let account = records::load_user(uow, user)?.ok_or(CasinoError::UserNotFound(user))?;
    if account.is_banned {
        return Err(CasinoError::UserBanned(user));
    }
    Ok(account)
}

/// Override in force for `user` right now. Expired windows are cleared on the way.
/// Force-win wins when both windows are open.
pub fn resolve_override_in(uow: &mut UnitOfWork, user: UserId, now: DateTime<Utc>) -> CasinoResult<FairnessOverride> {
    uow.require_lock(user)?;
    let Some(mut account) = records::load_user(uow, user)? else {
        return Ok(FairnessOverride::None);
    };

    let mut expired = false;
    if account.force_win_until.is_some_and(|until| now > until) {
        account.force_win_until = None;
        expired = true;
    }
    if account.force_loss_until.is_some_and(|until| now > until) {
        account.force_loss_until = None;
        expired = true;
    }
    if expired {
        records::store_user(uow, &account)?;
        tracing::debug!(user_id = user, "expired override window cleared");
    }

    Ok(if account.force_win_until.is_some() {
        FairnessOverride::ForceWin
    } else if account.force_loss_until.is_some() {
        FairnessOverride::ForceLoss
    } else {
        FairnessOverride::None
    })
}

/// Advances and returns the user's nonce for `game`.
pub fn next_nonce_in(uow: &mut UnitOfWork, user: UserId, game: GameType) -> CasinoResult<u64> {
    uow.require_lock(user)?;
    let mut account = records::load_user(uow, user)?.ok_or(CasinoError::UserNotFound(user))?;
    let nonce = account.nonces.advance(game);
    records::store_user(uow, &account)?;
    Ok(nonce)
}

/// Per-user VIP knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VipOptions {
    pub multiplier_enabled: bool,
    pub multiplier_percent: u32,
    pub cashback_enabled: bool,
    pub cashback_percent: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BonusClaim {
    pub amount: Cents,
    pub streak: u32,
    pub next_claim_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum HeistOutcome {
    Success { stolen: Cents },
    Caught { penalty: Cents },
}

/// Settings the account service needs from the configuration.
#[derive(Debug, Clone, Default)]
pub struct AccountSettings {
    pub wallet: WalletConfig,
    pub vip: VipConfig,
    pub bonus: BonusConfig,
    pub heist: HeistConfig,
}

#[derive(Clone)]
pub struct AccountService {
    store: Store,
    clock: Arc<dyn Clock>,
    settings: AccountSettings,
    rng: SharedRng,
}

impl AccountService {
    pub fn new(store: Store, clock: Arc<dyn Clock>, settings: AccountSettings, rng: SharedRng) -> Self {
        Self { store, clock, settings, rng }
    }

    /// Creates the account with its starter bonus inside `uow` if it does not exist yet.
    pub fn ensure_user_in(
        &self,
        uow: &mut UnitOfWork,
        user: UserId,
        display_name: &str,
        now: DateTime<Utc>,
    ) -> CasinoResult<User> {
        if let Some(existing) = records::load_user(uow, user)? {
            return Ok(existing);
        }
        uow.require_lock(user)?;
        let account = User::new(user, display_name, now);
        records::store_user(uow, &account)?;
        if self.settings.wallet.starter_bonus > 0 {
            ledger::credit_in(uow, user, self.settings.wallet.starter_bonus, "starter_bonus", now)?;
        }
        tracing::info!(user_id = user, display_name, "account created");
        Ok(account)
    }

    pub async fn get_or_create(&self, user: UserId, display_name: &str) -> CasinoResult<User> {
        let mut uow = self.store.begin(&[user]).await;
        let account = self.ensure_user_in(&mut uow, user, display_name, self.clock.now())?;
        uow.commit()?;
        Ok(account)
    }

    pub async fn get_user(&self, user: UserId) -> CasinoResult<User> {
        records::load_user(&self.store.reader(), user)?.ok_or(CasinoError::UserNotFound(user))
    }

    async fn update(&self, user: UserId, change: impl FnOnce(&mut User)) -> CasinoResult<User> {
        let mut uow = self.store.begin(&[user]).await;
        let mut account = records::load_user(&uow, user)?.ok_or(CasinoError::UserNotFound(user))?;
        change(&mut account);
        records::store_user(&mut uow, &account)?;
        uow.commit()?;
        Ok(account)
    }

    /// Grants or revokes VIP. Granting switches both hooks on at the configured rates.
    pub async fn set_vip(&self, user: UserId, vip: bool) -> CasinoResult<User> {
        let defaults = self.settings.vip.clone();
        let account = self
            .update(user, |u| {
                u.is_vip = vip;
                if vip {
                    u.vip_multiplier_enabled = true;
                    u.vip_multiplier_percent = defaults.multiplier_percent;
                    u.vip_cashback_enabled = true;
                    u.vip_cashback_percent = defaults.cashback_percent;
                }
            })
            .await?;
        tracing::info!(user_id = user, vip, "vip status changed");
        Ok(account)
    }

    pub async fn set_vip_options(&self, user: UserId, options: VipOptions) -> CasinoResult<User> {
        if options.multiplier_percent < 100 {
            return Err(CasinoError::InvalidAmount("multiplier must be at least 100%".into()));
        }
        if options.cashback_percent > 100 {
            return Err(CasinoError::InvalidAmount("cashback cannot exceed 100%".into()));
        }
        self.update(user, |u| {
            u.vip_multiplier_enabled = options.multiplier_enabled;
            u.vip_multiplier_percent = options.multiplier_percent;
            u.vip_cashback_enabled = options.cashback_enabled;
            u.vip_cashback_percent = options.cashback_percent;
        })
        .await
    }

    pub async fn set_banned(&self, user: UserId, banned: bool) -> CasinoResult<User> {
        let account = self.update(user, |u| u.is_banned = banned).await?;
        tracing::warn!(user_id = user, banned, "ban flag changed");
        Ok(account)
    }

    pub async fn set_personality(&self, user: UserId, personality: Personality) -> CasinoResult<User> {
        self.update(user, |u| u.personality = personality).await
    }

    /// Opens a force-win window until `until`.
    pub async fn set_force_win(&self, user: UserId, until: DateTime<Utc>) -> CasinoResult<User> {
        let account = self.update(user, |u| u.force_win_until = Some(until)).await?;
        tracing::info!(user_id = user, until = %until, "force-win window set");
        Ok(account)
    }

    /// Opens a force-loss window until `until`.
    pub async fn set_force_loss(&self, user: UserId, until: DateTime<Utc>) -> CasinoResult<User> {
        let account = self.update(user, |u| u.force_loss_until = Some(until)).await?;
        tracing::info!(user_id = user, until = %until, "force-loss window set");
        Ok(account)
    }

    pub async fn clear_overrides(&self, user: UserId) -> CasinoResult<User> {
        let account = self
            .update(user, |u| {
                u.force_win_until = None;
                u.force_loss_until = None;
            })
            .await?;
        tracing::info!(user_id = user, "override windows cleared");
        Ok(account)
    }

    pub async fn current_override(&self, user: UserId) -> CasinoResult<FairnessOverride> {
        let mut uow = self.store.begin(&[user]).await;
        let fairness = resolve_override_in(&mut uow, user, self.clock.now())?;
        uow.commit()?;
        Ok(fairness)
    }

    pub async fn claim_daily_bonus(&self, user: UserId) -> CasinoResult<BonusClaim> {
        let config = &self.settings.bonus;
        let mut uow = self.store.begin(&[user]).await;
        let now = self.clock.now();
        let mut account = active_user_in(&uow, user)?;
        let cooldown = Duration::hours(config.cooldown_hours);

        account.bonus_streak = match account.last_bonus_at {
            Some(last) if now < last + cooldown => {
                return Err(CasinoError::Cooldown {
                    action: "daily_bonus",
                    remaining_secs: (last + cooldown - now).num_seconds(),
                });
            }
            Some(last) if now - last <= Duration::hours(BONUS_STREAK_WINDOW_HOURS) => account.bonus_streak + 1,
            _ => 1,
        };

        let base = self.rng.with(|rng| rng.gen_range(config.min_amount..=config.max_amount));
        let steps = (account.bonus_streak - 1).min(config.max_streak_steps);
        let amount = scale(base, 100 + (steps * config.streak_step_percent) as u64, 100);

        account.last_bonus_at = Some(now);
        records::store_user(&mut uow, &account)?;
        ledger::credit_in(&mut uow, user, amount, "daily_bonus", now)?;
        uow.commit()?;

        tracing::info!(user_id = user, amount, streak = account.bonus_streak, "daily bonus claimed");
        Ok(BonusClaim { amount, streak: account.bonus_streak, next_claim_at: now + cooldown })
    }

    /// Tries to rob `target`. Success takes a share of the target's balance; failure
    /// costs the robber a penalty that leaves circulation.
    pub async fn heist(&self, robber: UserId, target: UserId) -> CasinoResult<HeistOutcome> {
        if robber == target {
            return Err(CasinoError::InvalidMove("cannot rob yourself".into()));
        }
        let config = &self.settings.heist;
        let mut uow = self.store.begin(&[robber, target]).await;
        let now = self.clock.now();

        let mut account = active_user_in(&uow, robber)?;
        if records::load_user(&uow, target)?.is_none() {
            return Err(CasinoError::UserNotFound(target));
        }
        let cooldown = Duration::hours(config.cooldown_hours);
        if let Some(last) = account.last_heist_at {
            if now < last + cooldown {
                return Err(CasinoError::Cooldown {
                    action: "heist",
                    remaining_secs: (last + cooldown - now).num_seconds(),
                });
            }
        }

        let robber_balance = ledger::balance_in(&uow, robber)?;
        if robber_balance < config.min_robber_balance {
            return Err(CasinoError::InsufficientFunds {
                needed: config.min_robber_balance,
                available: robber_balance,
            });
        }
        let target_balance = ledger::balance_in(&uow, target)?;
        if target_balance < config.min_target_balance {
            return Err(CasinoError::InvalidMove("target is too poor to rob".into()));
        }

        let succeeded = self.rng.with(|rng| rng.gen_range(0..100u32) < config.success_percent);
        let outcome = if succeeded {
            let stolen = percent_of(target_balance, config.steal_percent);
            if stolen > 0 {
                ledger::debit_in(&mut uow, target, stolen, &format!("heist_victim:{}", robber), now)?;
                ledger::credit_in(&mut uow, robber, stolen, &format!("heist_loot:{}", target), now)?;
            }
            HeistOutcome::Success { stolen }
        } else {
            let penalty = percent_of(robber_balance, config.penalty_percent);
            if penalty > 0 {
                ledger::debit_in(&mut uow, robber, penalty, "heist_penalty", now)?;
            }
            HeistOutcome::Caught { penalty }
        };

        account.last_heist_at = Some(now);
        records::store_user(&mut uow, &account)?;
        uow.commit()?;

        tracing::info!(robber, target, outcome = ?outcome, "heist resolved");
        Ok(outcome)
    }
}
