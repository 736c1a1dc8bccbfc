//! Leaderboards, rewards and VIP credit across simulated days

use chrono::{Duration, TimeZone, Utc};
use fairbet::credit::TierAvailability;
use fairbet::errors::CreditRefusal;
use fairbet::games::GameType;
use fairbet::models::{CreditStatus, CreditTier, RatingPeriod};
use fairbet::scheduler::{run_once, OverdueSweepJob, RewardJob, ScheduledJob};
use fairbet::{Casino, CasinoError, ConfigBuilder, ManualClock, MemoryStorage, SharedRng};
use std::sync::Arc;

fn casino() -> (Casino, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 9, 10, 8, 0, 0).unwrap()));
    let config = ConfigBuilder::new().in_memory().build().unwrap();
    let casino = Casino::new(config, Arc::new(MemoryStorage::new()), clock.clone(), SharedRng::seeded(11));
    (casino, clock)
}

async fn settle(casino: &Casino, user: i64, stake: u64, payout: u64) {
    let bet = casino.bets().create_bet(user, "chat", GameType::Dice, stake).await.unwrap();
    casino.bets().complete_bet(bet.id, "scripted", payout).await.unwrap();
}

#[tokio::test]
async fn test_daily_leaderboard_and_rewards() {
    let (casino, clock) = casino();
    for user in 1..=4 {
        casino.accounts().get_or_create(user, &format!("player{}", user)).await.unwrap();
    }
    settle(&casino, 1, 1_000, 1_300).await;
    settle(&casino, 2, 1_000, 2_600).await;
    settle(&casino, 2, 1_000, 0).await;
    settle(&casino, 3, 1_000, 1_500).await;
    // user 4 only loses and stays off the board
    settle(&casino, 4, 1_000, 0).await;

    let board = casino.ratings().get_leaderboard(RatingPeriod::Daily, 10).await.unwrap();
    let order: Vec<i64> = board.iter().map(|entry| entry.user_id).collect();
    assert_eq!(order, vec![2, 3, 1]);
    assert_eq!(board[0].wins, 1);
    assert_eq!(board[0].losses, 1);
    assert_eq!(board[0].display_name, "player2");

    let job = RewardJob::new(casino.ratings().clone());
    assert!(run_once(&job, casino.metrics()).await);
    let daily: Vec<_> = casino
        .ratings()
        .get_user_rewards(2, true)
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.period == RatingPeriod::Daily)
        .collect();
    assert_eq!(daily.len(), 1);
    assert_eq!(daily[0].position, 1);
    assert_eq!(daily[0].amount, 150_000);

    // same day, nothing new
    assert_eq!(job.run().await.unwrap(), 0);

    let before = casino.ledger().get_balance(2).await.unwrap();
    casino.ratings().claim_reward(2, daily[0].id).await.unwrap();
    assert_eq!(casino.ledger().get_balance(2).await.unwrap(), before + 150_000);
    assert!(matches!(
        casino.ratings().claim_reward(2, daily[0].id).await,
        Err(CasinoError::RewardAlreadyClaimed(_))
    ));
    assert!(matches!(
        casino.ratings().claim_reward(3, daily[0].id).await,
        Err(CasinoError::RewardNotFound(_))
    ));

    // a new day opens an empty daily bucket
    clock.advance(Duration::days(1));
    assert!(casino.ratings().get_leaderboard(RatingPeriod::Daily, 10).await.unwrap().is_empty());
    assert!(!casino.ratings().get_leaderboard(RatingPeriod::Monthly, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_credit_lifecycle() {
    let (casino, clock) = casino();
    casino.accounts().get_or_create(7, "vip").await.unwrap();
    assert!(matches!(
        casino.credit().take_credit(7, CreditTier::Daily1k).await,
        Err(CasinoError::CreditUnavailable(CreditRefusal::NotVip))
    ));

    casino.accounts().set_vip(7, true).await.unwrap();
    let loan = casino.credit().take_credit(7, CreditTier::Weekly5k).await.unwrap();
    assert_eq!(loan.amount_to_repay, 550_000);
    assert!(matches!(
        casino.credit().take_credit(7, CreditTier::Daily1k).await,
        Err(CasinoError::CreditUnavailable(CreditRefusal::OutstandingLoan(id))) if id == loan.id
    ));

    // past due, the sweep flags the loan
    clock.advance(Duration::days(8));
    let sweep = OverdueSweepJob::new(casino.credit().clone());
    assert_eq!(sweep.run().await.unwrap(), 1);
    assert_eq!(sweep.run().await.unwrap(), 0);
    let credits = casino.credit().get_user_credits(7).await.unwrap();
    assert_eq!(credits[0].status, CreditStatus::Overdue);

    // short of the interest, nothing is taken
    assert!(matches!(
        casino.credit().repay_credit(7, loan.id).await,
        Err(CasinoError::InsufficientFunds { .. })
    ));
    assert_eq!(casino.ledger().get_balance(7).await.unwrap(), 510_000);

    casino.ledger().credit(7, 50_000, "top_up").await.unwrap();
    let repaid = casino.credit().repay_credit(7, loan.id).await.unwrap();
    assert_eq!(repaid.status, CreditStatus::Paid);
    assert_eq!(casino.ledger().get_balance(7).await.unwrap(), 10_000);
    assert!(casino.ledger().audit(7).await.unwrap().consistent);

    // weekly tier is off cooldown after 8 days; daily is free again
    let tiers: Vec<TierAvailability> = casino.credit().available_tiers(7).await.unwrap();
    assert_eq!(tiers.len(), 3);
    assert!(tiers.iter().all(|t| t.available_at.is_none()));
}
