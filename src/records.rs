//! Typed records stored as JSON under string key prefixes.

use crate::common::types::{sortable_millis, UserId};
use crate::errors::{CasinoError, CasinoResult, StorageError};
use crate::models::{
    Bet, BetStatus, CreditLimit, CreditTier, LeaderboardReward, RatingPeriod, Transaction, User, UserCredit,
    UserRating, UserStats, Wallet,
};
use crate::unit_of_work::UnitOfWork;
use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

const USER_PREFIX: &str = "user:";
const WALLET_PREFIX: &str = "wallet:";
const TX_PREFIX: &str = "tx:";
const BET_PREFIX: &str = "bet:";
const PENDING_BET_PREFIX: &str = "bet:pending:";
const STATS_PREFIX: &str = "stats:";
const RATING_PREFIX: &str = "rating:";
const REWARD_PREFIX: &str = "reward:";
const REWARD_USER_PREFIX: &str = "reward:user:";
const REWARD_DEDUPE_PREFIX: &str = "reward:dedupe:";
const CREDIT_PREFIX: &str = "credit:";
const CREDIT_LIMIT_PREFIX: &str = "credit_limit:";

fn user_key(id: UserId) -> String {
    format!("{}{}", USER_PREFIX, id)
}

fn wallet_key(id: UserId) -> String {
    format!("{}{}", WALLET_PREFIX, id)
}

fn tx_user_prefix(id: UserId) -> String {
    format!("{}{}:", TX_PREFIX, id)
}

fn tx_key(tx: &Transaction) -> String {
    format!("{}{:020}", tx_user_prefix(tx.user_id), tx.sequence)
}

fn bet_key(id: Uuid) -> String {
    format!("{}{}", BET_PREFIX, id)
}

fn pending_bet_key(id: Uuid) -> String {
    format!("{}{}", PENDING_BET_PREFIX, id)
}

fn stats_key(id: UserId) -> String {
    format!("{}{}", STATS_PREFIX, id)
}

fn rating_bucket_prefix(period: RatingPeriod, start: DateTime<Utc>) -> String {
    format!("{}{}:{}:", RATING_PREFIX, period, sortable_millis(start))
}

fn rating_key(user: UserId, period: RatingPeriod, start: DateTime<Utc>) -> String {
    format!("{}{}", rating_bucket_prefix(period, start), user)
}

fn reward_key(id: Uuid) -> String {
    format!("{}{}", REWARD_PREFIX, id)
}

fn reward_user_prefix(user: UserId) -> String {
    format!("{}{}:", REWARD_USER_PREFIX, user)
}

fn reward_dedupe_key(period: RatingPeriod, date: NaiveDate, position: u8, user: UserId) -> String {
    format!("{}{}:{}:{}:{}", REWARD_DEDUPE_PREFIX, period, date, position, user)
}

fn credit_user_prefix(user: UserId) -> String {
    format!("{}{}:", CREDIT_PREFIX, user)
}

fn credit_key(user: UserId, id: Uuid) -> String {
    format!("{}{}", credit_user_prefix(user), id)
}

fn credit_limit_key(user: UserId, tier: CreditTier) -> String {
    format!("{}{}:{}", CREDIT_LIMIT_PREFIX, user, tier)
}

fn load<T: DeserializeOwned>(uow: &UnitOfWork, key: &str) -> CasinoResult<Option<T>> {
    let Some(bytes) = uow.get(key.as_bytes())? else {
        return Ok(None);
    };
    let value = serde_json::from_slice(&bytes).map_err(|e| {
        StorageError::CorruptedData(format!("Failed to decode {}: {}", key, e))
    })?;
    Ok(Some(value))
}

fn load_prefix<T: DeserializeOwned>(uow: &UnitOfWork, prefix: &str) -> CasinoResult<Vec<T>> {
    uow.scan_prefix(prefix.as_bytes())?
        .into_iter()
        .map(|(key, bytes)| {
            serde_json::from_slice(&bytes).map_err(|e| {
                CasinoError::from(StorageError::CorruptedData(format!(
                    "Failed to decode {}: {}",
                    String::from_utf8_lossy(&key),
                    e
                )))
            })
        })
        .collect()
}

fn store<T: Serialize>(uow: &mut UnitOfWork, key: String, value: &T) -> CasinoResult<()> {
    let bytes = serde_json::to_vec(value)
        .map_err(|e| StorageError::WriteFailed(format!("Failed to encode {}: {}", key, e)))?;
    uow.put(key.into_bytes(), bytes);
    Ok(())
}

pub fn load_user(uow: &UnitOfWork, id: UserId) -> CasinoResult<Option<User>> {
    load(uow, &user_key(id))
}

pub fn store_user(uow: &mut UnitOfWork, user: &User) -> CasinoResult<()> {
    store(uow, user_key(user.id), user)
}

pub fn load_wallet(uow: &UnitOfWork, id: UserId) -> CasinoResult<Option<Wallet>> {
    load(uow, &wallet_key(id))
}

pub fn store_wallet(uow: &mut UnitOfWork, wallet: &Wallet) -> CasinoResult<()> {
    store(uow, wallet_key(wallet.user_id), wallet)
}

pub fn store_transaction(uow: &mut UnitOfWork, tx: &Transaction) -> CasinoResult<()> {
    store(uow, tx_key(tx), tx)
}

/// Every transaction of a user, oldest first.
pub fn load_transactions(uow: &UnitOfWork, user: UserId) -> CasinoResult<Vec<Transaction>> {
    load_prefix(uow, &tx_user_prefix(user))
}

pub fn load_bet(uow: &UnitOfWork, id: Uuid) -> CasinoResult<Option<Bet>> {
    load(uow, &bet_key(id))
}

/// Stores a bet and keeps the pending index in step with its status.
pub fn store_bet(uow: &mut UnitOfWork, bet: &Bet) -> CasinoResult<()> {
    store(uow, bet_key(bet.id), bet)?;
    match bet.status {
        BetStatus::Pending => {
            uow.put(pending_bet_key(bet.id).into_bytes(), bet.user_id.to_string().into_bytes())
        }
        BetStatus::Completed => uow.delete(pending_bet_key(bet.id).into_bytes()),
    }
    Ok(())
}

pub fn load_pending_bet_ids(uow: &UnitOfWork) -> CasinoResult<Vec<Uuid>> {
    uow.scan_prefix(PENDING_BET_PREFIX.as_bytes())?
        .into_iter()
        .map(|(key, _)| {
            let raw = String::from_utf8_lossy(&key[PENDING_BET_PREFIX.len()..]).to_string();
            Uuid::parse_str(&raw).map_err(|e| {
                CasinoError::from(StorageError::CorruptedData(format!("Bad pending bet key {}: {}", raw, e)))
            })
        })
        .collect()
}

pub fn load_stats(uow: &UnitOfWork, user: UserId) -> CasinoResult<Option<UserStats>> {
    load(uow, &stats_key(user))
}

pub fn store_stats(uow: &mut UnitOfWork, stats: &UserStats) -> CasinoResult<()> {
    store(uow, stats_key(stats.user_id), stats)
}

pub fn load_rating(
    uow: &UnitOfWork,
    user: UserId,
    period: RatingPeriod,
    start: DateTime<Utc>,
) -> CasinoResult<Option<UserRating>> {
    load(uow, &rating_key(user, period, start))
}

pub fn store_rating(uow: &mut UnitOfWork, rating: &UserRating) -> CasinoResult<()> {
    store(uow, rating_key(rating.user_id, rating.period, rating.period_start), rating)
}

/// All ratings in one period bucket.
pub fn load_bucket(uow: &UnitOfWork, period: RatingPeriod, start: DateTime<Utc>) -> CasinoResult<Vec<UserRating>> {
    load_prefix(uow, &rating_bucket_prefix(period, start))
}

pub fn load_reward(uow: &UnitOfWork, id: Uuid) -> CasinoResult<Option<LeaderboardReward>> {
    load(uow, &reward_key(id))
}

pub fn store_reward(uow: &mut UnitOfWork, reward: &LeaderboardReward) -> CasinoResult<()> {
    store(uow, reward_key(reward.id), reward)?;
    uow.put(
        format!("{}{}", reward_user_prefix(reward.user_id), reward.id).into_bytes(),
        Vec::new(),
    );
    uow.put(
        reward_dedupe_key(reward.period, reward.reward_date, reward.position, reward.user_id).into_bytes(),
        reward.id.to_string().into_bytes(),
    );
    Ok(())
}

pub fn reward_exists(
    uow: &UnitOfWork,
    period: RatingPeriod,
    date: NaiveDate,
    position: u8,
    user: UserId,
) -> CasinoResult<bool> {
    Ok(uow.get(reward_dedupe_key(period, date, position, user).as_bytes())?.is_some())
}

pub fn load_user_rewards(uow: &UnitOfWork, user: UserId) -> CasinoResult<Vec<LeaderboardReward>> {
    let prefix = reward_user_prefix(user);
    let mut rewards = Vec::new();
    for (key, _) in uow.scan_prefix(prefix.as_bytes())? {
        let raw = String::from_utf8_lossy(&key[prefix.len()..]).to_string();
        let id = Uuid::parse_str(&raw)
            .map_err(|e| StorageError::CorruptedData(format!("Bad reward index key {}: {}", raw, e)))?;
        if let Some(reward) = load_reward(uow, id)? {
            rewards.push(reward);
        }
    }
    Ok(rewards)
}

pub fn load_credits(uow: &UnitOfWork, user: UserId) -> CasinoResult<Vec<UserCredit>> {
    load_prefix(uow, &credit_user_prefix(user))
}

/// Credits of every user. Used by the overdue sweep.
pub fn load_all_credits(uow: &UnitOfWork) -> CasinoResult<Vec<UserCredit>> {
    load_prefix(uow, CREDIT_PREFIX)
}

pub fn store_credit(uow: &mut UnitOfWork, credit: &UserCredit) -> CasinoResult<()> {
    store(uow, credit_key(credit.user_id, credit.id), credit)
}

pub fn load_credit_limit(uow: &UnitOfWork, user: UserId, tier: CreditTier) -> CasinoResult<Option<CreditLimit>> {
    load(uow, &credit_limit_key(user, tier))
}

pub fn store_credit_limit(uow: &mut UnitOfWork, limit: &CreditLimit) -> CasinoResult<()> {
    store(uow, credit_limit_key(limit.user_id, limit.tier), limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit_of_work::Store;

    #[tokio::test]
    async fn test_wallet_prefixes_do_not_collide() {
        let store = Store::in_memory();
        let now = Utc::now();
        let mut uow = store.begin(&[1, 12]).await;
        store_wallet(&mut uow, &Wallet { balance: 5, ..Wallet::empty(1, now) }).unwrap();
        store_wallet(&mut uow, &Wallet { balance: 7, ..Wallet::empty(12, now) }).unwrap();
        uow.commit().unwrap();

        let reader = store.reader();
        assert_eq!(load_wallet(&reader, 1).unwrap().unwrap().balance, 5);
        assert_eq!(load_wallet(&reader, 12).unwrap().unwrap().balance, 7);
        assert!(load_transactions(&reader, 1).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corrupted_row_is_reported() {
        let store = Store::in_memory();
        let mut uow = store.begin(&[3]).await;
        uow.put(user_key(3).into_bytes(), b"{not json".to_vec());
        uow.commit().unwrap();

        let err = load_user(&store.reader(), 3).unwrap_err();
        assert!(err.to_string().contains("user:3"));
    }

    #[tokio::test]
    async fn test_credit_prefix_excludes_limits() {
        let store = Store::in_memory();
        let mut uow = store.begin(&[4]).await;
        store_credit_limit(
            &mut uow,
            &CreditLimit { user_id: 4, tier: CreditTier::Daily1k, last_used_at: None, usage_count: 0 },
        )
        .unwrap();
        uow.commit().unwrap();

        assert!(load_all_credits(&store.reader()).unwrap().is_empty());
    }
}
