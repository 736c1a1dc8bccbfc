//! Period leaderboards and their rewards.

use crate::common::config::RewardConfig;
use crate::common::traits::Clock;
use crate::common::types::{Cents, UserId};
use crate::errors::{CasinoError, CasinoResult};
use crate::ledger;
use crate::models::{LeaderboardReward, RatingPeriod, UserRating};
use crate::records;
use crate::unit_of_work::{LockKey, Store, UnitOfWork};
use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

const REWARD_POSITIONS: usize = 3;

/// Start of the bucket containing `now`: midnight UTC, Monday midnight, or the 1st.
pub fn period_start(period: RatingPeriod, now: DateTime<Utc>) -> DateTime<Utc> {
    let today = now.date_naive();
    let day = match period {
        RatingPeriod::Daily => today,
        RatingPeriod::Weekly => today - Duration::days(today.weekday().num_days_from_monday() as i64),
        RatingPeriod::Monthly => today.with_day(1).unwrap_or(today),
    };
    Utc.from_utc_datetime(&day.and_time(NaiveTime::MIN))
}

/// Adds one completed bet to the user's row for the current `period` bucket.
pub fn update_user_rating_in(
    uow: &mut UnitOfWork,
    user: UserId,
    stake: Cents,
    win_amount: Cents,
    period: RatingPeriod,
    now: DateTime<Utc>,
) -> CasinoResult<UserRating> {
    uow.require_lock(user)?;
    let start = period_start(period, now);
    let mut rating = records::load_rating(uow, user, period, start)?
        .unwrap_or_else(|| UserRating::empty(user, period, start));

    rating.total_bets += 1;
    rating.total_wagered = rating.total_wagered.saturating_add(stake);
    if win_amount > 0 {
        rating.wins += 1;
        rating.total_winnings = rating.total_winnings.saturating_add(win_amount);
    } else {
        rating.losses += 1;
    }
    rating.updated_at = now;
    records::store_rating(uow, &rating)?;
    Ok(rating)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub user_id: UserId,
    pub display_name: String,
    pub total_winnings: Cents,
    pub total_bets: u64,
    pub wins: u64,
    pub losses: u64,
    pub win_rate_percent: f64,
}

fn ranked(uow: &UnitOfWork, period: RatingPeriod, now: DateTime<Utc>, limit: usize) -> CasinoResult<Vec<LeaderboardEntry>> {
    let mut rows: Vec<UserRating> = records::load_bucket(uow, period, period_start(period, now))?
        .into_iter()
        .filter(|r| r.total_winnings > 0)
        .collect();
    rows.sort_by(|a, b| b.total_winnings.cmp(&a.total_winnings).then(a.user_id.cmp(&b.user_id)));
    rows.truncate(limit);

    let mut entries = Vec::with_capacity(rows.len());
    for (index, rating) in rows.into_iter().enumerate() {
        let display_name = records::load_user(uow, rating.user_id)?
            .map(|u| u.display_name)
            .unwrap_or_else(|| rating.user_id.to_string());
        entries.push(LeaderboardEntry {
            rank: index + 1,
            user_id: rating.user_id,
            display_name,
            total_winnings: rating.total_winnings,
            total_bets: rating.total_bets,
            wins: rating.wins,
            losses: rating.losses,
            win_rate_percent: rating.win_rate_percent(),
        });
    }
    Ok(entries)
}

#[derive(Clone)]
pub struct RatingService {
    store: Store,
    clock: Arc<dyn Clock>,
    rewards: RewardConfig,
}

impl RatingService {
    pub fn new(store: Store, clock: Arc<dyn Clock>, rewards: RewardConfig) -> Self {
        Self { store, clock, rewards }
    }

    /// Current bucket ranked by winnings, users without winnings left out.
    pub async fn get_leaderboard(&self, period: RatingPeriod, limit: usize) -> CasinoResult<Vec<LeaderboardEntry>> {
        ranked(&self.store.reader(), period, self.clock.now(), limit)
    }

    pub async fn get_user_rating(&self, user: UserId, period: RatingPeriod) -> CasinoResult<Option<UserRating>> {
        let start = period_start(period, self.clock.now());
        records::load_rating(&self.store.reader(), user, period, start)
    }

    /// Creates top-3 rewards for the current bucket of `period`. Re-running on the same
    /// calendar day creates nothing new.
    pub async fn calculate_rewards(&self, period: RatingPeriod) -> CasinoResult<Vec<LeaderboardReward>> {
        let mut uow = self.store.begin_with([LockKey::Job("rewards")]).await;
        let now = self.clock.now();
        let today = now.date_naive();
        let amounts = self.rewards.amounts(period);

        let mut created = Vec::new();
        for entry in ranked(&uow, period, now, REWARD_POSITIONS)? {
            let position = entry.rank as u8;
            if records::reward_exists(&uow, period, today, position, entry.user_id)? {
                continue;
            }
            let reward = LeaderboardReward {
                id: Uuid::new_v4(),
                user_id: entry.user_id,
                position,
                period,
                amount: amounts[entry.rank - 1],
                reward_date: today,
                claimed: false,
                created_at: now,
                claimed_at: None,
            };
            records::store_reward(&mut uow, &reward)?;
            created.push(reward);
        }
        uow.commit()?;

        tracing::info!(period = %period, created = created.len(), "leaderboard rewards calculated");
        Ok(created)
    }

    pub async fn claim_reward(&self, user: UserId, reward_id: Uuid) -> CasinoResult<LeaderboardReward> {
        let mut uow = self.store.begin(&[user]).await;
        let now = self.clock.now();
        let mut reward = records::load_reward(&uow, reward_id)?
            .filter(|r| r.user_id == user)
            .ok_or(CasinoError::RewardNotFound(reward_id))?;
        if reward.claimed {
            return Err(CasinoError::RewardAlreadyClaimed(reward_id));
        }

        reward.claimed = true;
        reward.claimed_at = Some(now);
        records::store_reward(&mut uow, &reward)?;
        ledger::credit_in(
            &mut uow,
            user,
            reward.amount,
            &format!("leaderboard_reward:{}", reward.period),
            now,
        )?;
        uow.commit()?;

        tracing::info!(user_id = user, reward_id = %reward_id, amount = reward.amount, "reward claimed");
        Ok(reward)
    }

    pub async fn get_user_rewards(&self, user: UserId, unclaimed_only: bool) -> CasinoResult<Vec<LeaderboardReward>> {
        let mut rewards = records::load_user_rewards(&self.store.reader(), user)?;
        if unclaimed_only {
            rewards.retain(|r| !r.claimed);
        }
        rewards.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rewards)
    }
}
