//! Every cent on a wallet is accounted for by its transaction log

use chrono::{TimeZone, Utc};
use fairbet::games::wheel::WheelBet;
use fairbet::{Casino, CasinoError, ConfigBuilder, ManualClock, MemoryStorage, PlayRequest, SharedRng};
use std::collections::HashMap;
use std::sync::Arc;

fn casino() -> Casino {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 7, 1, 9, 0, 0).unwrap()));
    let config = ConfigBuilder::new().in_memory().build().unwrap();
    Casino::new(config, Arc::new(MemoryStorage::new()), clock, SharedRng::seeded(99))
}

#[tokio::test]
async fn test_balances_match_settlements() {
    let casino = casino();
    let mut expected: HashMap<i64, i128> = HashMap::new();

    for round in 0..300u64 {
        let user = (round % 5) as i64 + 1;
        let request = PlayRequest {
            user_id: user,
            display_name: format!("p{}", user),
            context: "chat:conservation".into(),
            stake: 100 + (round % 7) * 150,
        };
        let played = match round % 3 {
            0 => casino.play_dice(&request).await,
            1 => casino.play_wheel(&request, WheelBet::Black).await,
            _ => casino.play_slots(&request).await,
        };
        let entry = expected.entry(user).or_insert(10_000);
        match played {
            Ok(result) => *entry += result.settlement.net(),
            // a broke player is declined without touching the wallet
            Err(CasinoError::InsufficientFunds { .. }) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    for (user, balance) in expected {
        let audit = casino.ledger().audit(user).await.unwrap();
        assert!(audit.consistent, "user {} log does not match wallet", user);
        assert_eq!(audit.balance as i128, balance);
    }
    assert!(casino.bets().pending_bets().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_transfers_conserve_money() {
    let casino = casino();
    for user in 1..=3 {
        casino.accounts().get_or_create(user, "peer").await.unwrap();
    }
    casino.ledger().transfer(1, 2, 2_500).await.unwrap();
    casino.ledger().transfer(2, 3, 7_000).await.unwrap();
    casino.ledger().transfer(3, 1, 1_234).await.unwrap();
    assert!(casino.ledger().transfer(1, 2, 1_000_000).await.is_err());

    let mut total = 0;
    for user in 1..=3 {
        let audit = casino.ledger().audit(user).await.unwrap();
        assert!(audit.consistent);
        total += audit.balance;
    }
    assert_eq!(total, 30_000);
}

#[tokio::test]
async fn test_admin_balance_reset_is_logged() {
    let casino = casino();
    casino.accounts().get_or_create(9, "admin-target").await.unwrap();

    let tx = casino.ledger().set_balance(9, 2_500).await.unwrap().unwrap();
    assert_eq!(tx.amount, 7_500);
    assert_eq!(tx.reason, "admin_set_balance");
    assert!(casino.ledger().set_balance(9, 2_500).await.unwrap().is_none());

    let audit = casino.ledger().audit(9).await.unwrap();
    assert!(audit.consistent);
    assert_eq!(audit.balance, 2_500);
    assert_eq!(audit.transaction_count, 2);
}
