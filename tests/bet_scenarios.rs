//! End-to-end bet flows against an in-memory store

use chrono::{Duration, TimeZone, Utc};
use fairbet::casino::MinesMove;
use fairbet::common::traits::Clock;
use fairbet::games::dice::DiceRoll;
use fairbet::games::wheel::WheelBet;
use fairbet::games::{payout, FairnessOverride, GameType};
use fairbet::models::{BetStatus, CreditStatus, CreditTier};
use fairbet::users::VipOptions;
use fairbet::{Casino, CasinoError, ConfigBuilder, ManualClock, MemoryStorage, PlayRequest, SharedRng};
use std::sync::Arc;

fn casino() -> (Casino, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap()));
    let config = ConfigBuilder::new().in_memory().crash_tick_ms(1).build().unwrap();
    let casino = Casino::new(config, Arc::new(MemoryStorage::new()), clock.clone(), SharedRng::seeded(7));
    (casino, clock)
}

fn request(user: i64, stake: u64) -> PlayRequest {
    PlayRequest { user_id: user, display_name: format!("player{}", user), context: "group:42".into(), stake }
}

#[tokio::test]
async fn test_dice_win_pays_one_point_three() {
    let (casino, _) = casino();
    casino.accounts().get_or_create(1, "ann").await.unwrap();

    let bet = casino.bets().create_bet(1, "group:42", GameType::Dice, 2_000).await.unwrap();
    assert_eq!(casino.ledger().get_balance(1).await.unwrap(), 8_000);

    let won = payout::dice_payout(bet.stake, &DiceRoll { player: 6, house: 3 });
    assert_eq!(won, 2_600);
    let settlement = casino.bets().complete_bet(bet.id, "6 vs 3", won).await.unwrap();
    assert_eq!(settlement.credited, 2_600);
    assert_eq!(casino.ledger().get_balance(1).await.unwrap(), 10_600);
}

#[tokio::test]
async fn test_wheel_loss_keeps_stake() {
    let (casino, _) = casino();
    casino.accounts().get_or_create(2, "bo").await.unwrap();

    let bet = casino.bets().create_bet(2, "group:42", GameType::Wheel, 1_000).await.unwrap();
    let lost = payout::wheel_payout(bet.stake, WheelBet::Red, 4);
    assert_eq!(lost, 0);
    let settlement = casino.bets().complete_bet(bet.id, "red -> 4", lost).await.unwrap();
    assert_eq!(settlement.net(), -1_000);
    assert_eq!(casino.ledger().get_balance(2).await.unwrap(), 9_000);

    let stored = casino.bets().get_bet(bet.id).await.unwrap();
    assert_eq!(stored.status, BetStatus::Completed);
    assert_eq!(stored.payout, 0);
}

#[tokio::test]
async fn test_forced_mines_cash_out_after_five() {
    let (casino, clock) = casino();
    casino.accounts().get_or_create(3, "cy").await.unwrap();
    casino.accounts().set_force_win(3, clock.now() + Duration::hours(1)).await.unwrap();

    let status = casino.start_mines(&request(3, 2_000)).await.unwrap();
    for col in 0..5 {
        let step = casino.reveal_mine(3, status.session_id, 0, col).await.unwrap();
        assert!(matches!(step, MinesMove::Safe(s) if s.moves == col as u32 + 1));
    }
    let result = casino.cash_out_mines(3, status.session_id).await.unwrap();
    assert_eq!(result.settlement.base_payout, 5_600);
    assert_eq!(casino.ledger().get_balance(3).await.unwrap(), 13_600);
    assert!(casino.open_mines_sessions(3).is_empty());
}

#[tokio::test]
async fn test_win_repays_daily_credit_first() {
    let (casino, _) = casino();
    casino.accounts().get_or_create(4, "dee").await.unwrap();
    casino.accounts().set_vip(4, true).await.unwrap();
    casino
        .accounts()
        .set_vip_options(
            4,
            VipOptions {
                multiplier_enabled: false,
                multiplier_percent: 100,
                cashback_enabled: false,
                cashback_percent: 0,
            },
        )
        .await
        .unwrap();

    let loan = casino.credit().take_credit(4, CreditTier::Daily1k).await.unwrap();
    assert_eq!(loan.amount_to_repay, 110_000);
    assert_eq!(casino.ledger().get_balance(4).await.unwrap(), 110_000);

    let bet = casino.bets().create_bet(4, "group:42", GameType::Dice, 2_000).await.unwrap();
    let settlement = casino.bets().complete_bet(bet.id, "big win", 150_000).await.unwrap();
    assert_eq!(settlement.credit_repaid, 110_000);
    assert_eq!(settlement.credited, 40_000);
    assert_eq!(casino.ledger().get_balance(4).await.unwrap(), 148_000);

    let credits = casino.credit().get_user_credits(4).await.unwrap();
    assert_eq!(credits[0].status, CreditStatus::Paid);
    assert!(credits[0].paid_at.is_some());
}

#[tokio::test]
async fn test_override_window_expires() {
    let (casino, clock) = casino();
    casino.accounts().get_or_create(5, "eve").await.unwrap();
    casino.accounts().set_force_loss(5, clock.now() + Duration::minutes(10)).await.unwrap();
    assert_eq!(casino.accounts().current_override(5).await.unwrap(), FairnessOverride::ForceLoss);

    let lost = casino.play_dice(&request(5, 1_000)).await.unwrap();
    assert_eq!(lost.settlement.base_payout, 0);

    clock.advance(Duration::minutes(11));
    assert_eq!(casino.accounts().current_override(5).await.unwrap(), FairnessOverride::None);
    assert!(casino.accounts().get_user(5).await.unwrap().force_loss_until.is_none());
}

#[tokio::test]
async fn test_bet_completes_exactly_once() {
    let (casino, _) = casino();
    casino.accounts().get_or_create(6, "fay").await.unwrap();
    let bet = casino.bets().create_bet(6, "group:42", GameType::Slots, 500).await.unwrap();

    casino.bets().complete_bet(bet.id, "cherries", 1_000).await.unwrap();
    let again = casino.bets().complete_bet(bet.id, "cherries", 1_000).await;
    assert!(matches!(again, Err(CasinoError::AlreadyCompleted(id)) if id == bet.id));
    assert_eq!(casino.ledger().get_balance(6).await.unwrap(), 10_500);
    assert!(casino.ledger().audit(6).await.unwrap().consistent);
}

#[tokio::test]
async fn test_declined_first_bet_leaves_no_account() {
    let (casino, _) = casino();
    let declined = casino.play_dice(&request(7, 50_000)).await;
    assert!(matches!(declined, Err(CasinoError::InsufficientFunds { .. })));
    assert!(matches!(casino.accounts().get_user(7).await, Err(CasinoError::UserNotFound(7))));
    assert_eq!(casino.metrics().snapshot().stakes_declined, 1);
}

#[tokio::test]
async fn test_forced_loss_crash_settles_without_cash_out() {
    let (casino, clock) = casino();
    casino.accounts().get_or_create(8, "gus").await.unwrap();
    casino.accounts().set_force_loss(8, clock.now() + Duration::hours(1)).await.unwrap();

    let start = casino.start_crash(&request(8, 1_000)).await.unwrap();
    for _ in 0..400 {
        if casino.open_crash_rounds() == 0 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    assert_eq!(casino.open_crash_rounds(), 0);

    let bet = casino.bets().get_bet(start.bet_id).await.unwrap();
    assert_eq!(bet.status, BetStatus::Completed);
    assert_eq!(bet.payout, 0);
    assert!(casino.cash_out_crash(8, start.round_id).await.is_err());
    assert_eq!(casino.ledger().get_balance(8).await.unwrap(), 9_000);
}
