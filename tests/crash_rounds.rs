//! Live crash rounds: cash-outs, the ticker and the race between them

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use fairbet::common::traits::{Clock, RoundObserver};
use fairbet::games::crash::Multiplier;
use fairbet::games::{payout, RoundOutcome};
use fairbet::{Casino, CasinoError, ConfigBuilder, ManualClock, MemoryStorage, PlayRequest, Settlement, SharedRng};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

#[derive(Default)]
struct Recorder {
    ticks: AtomicUsize,
    settled: Mutex<HashMap<Uuid, Vec<Settlement>>>,
}

impl Recorder {
    fn ticks(&self) -> usize {
        self.ticks.load(Ordering::SeqCst)
    }

    fn settled(&self) -> HashMap<Uuid, Vec<Settlement>> {
        self.settled.lock().unwrap().clone()
    }
}

#[async_trait]
impl RoundObserver for Recorder {
    async fn on_tick(&self, _round_id: Uuid, _multiplier: Multiplier) {
        self.ticks.fetch_add(1, Ordering::SeqCst);
    }

    async fn on_settled(&self, round_id: Uuid, settlement: &Settlement) {
        self.settled.lock().unwrap().entry(round_id).or_default().push(settlement.clone());
    }
}

fn casino(tick_ms: u64) -> (Arc<Casino>, Arc<ManualClock>, Arc<Recorder>) {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 7, 14, 21, 0, 0).unwrap()));
    let config = ConfigBuilder::new().in_memory().crash_tick_ms(tick_ms).build().unwrap();
    let recorder = Arc::new(Recorder::default());
    let casino = Casino::new(config, Arc::new(MemoryStorage::new()), clock.clone(), SharedRng::seeded(21))
        .with_observer(recorder.clone());
    (Arc::new(casino), clock, recorder)
}

fn request(user: i64, stake: u64) -> PlayRequest {
    PlayRequest { user_id: user, display_name: "pilot".into(), context: "chat:crash".into(), stake }
}

async fn wait_until(mut done: impl FnMut() -> bool) {
    for _ in 0..1_000 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn test_cash_out_pays_the_current_multiplier() {
    let (casino, clock, recorder) = casino(5);
    casino.accounts().get_or_create(1, "pilot").await.unwrap();
    casino.accounts().set_force_win(1, clock.now() + ChronoDuration::hours(1)).await.unwrap();

    let start = casino.start_crash(&request(1, 1_000)).await.unwrap();
    assert_eq!(casino.ledger().get_balance(1).await.unwrap(), 9_000);
    wait_until(|| recorder.ticks() >= 3).await;

    let result = casino.cash_out_crash(1, start.round_id).await.unwrap();
    let RoundOutcome::Crash { crash_point, cashed_out_at: Some(at) } = result.outcome else {
        panic!("expected a cash-out, got {:?}", result.outcome);
    };
    assert_eq!(crash_point, Multiplier::MAX);
    assert!(at > Multiplier::START);
    assert!(at < crash_point);
    assert_eq!(result.settlement.base_payout, payout::crash_payout(1_000, at));
    assert!(result.settlement.base_payout > 1_000);

    let balance = casino.ledger().get_balance(1).await.unwrap();
    assert_eq!(balance, 9_000 + result.settlement.base_payout);
    assert!(casino.ledger().audit(1).await.unwrap().consistent);

    // the ticker stops once the round is closed
    tokio::time::sleep(Duration::from_millis(20)).await;
    let ticks = recorder.ticks();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(recorder.ticks(), ticks);

    let settled = recorder.settled();
    assert_eq!(settled.len(), 1);
    assert_eq!(settled[&start.round_id].len(), 1);
    assert_eq!(casino.open_crash_rounds(), 0);

    assert!(matches!(
        casino.cash_out_crash(1, start.round_id).await,
        Err(CasinoError::SessionNotFound(_))
    ));
    assert_eq!(casino.ledger().get_balance(1).await.unwrap(), balance);
    assert_eq!(casino.bets().user_stats(1).await.unwrap().total_bets, 1);
}

#[tokio::test]
async fn test_round_is_only_visible_to_its_owner() {
    let (casino, _, _) = casino(5);
    let start = casino.start_crash(&request(2, 500)).await.unwrap();
    assert!(matches!(
        casino.cash_out_crash(3, start.round_id).await,
        Err(CasinoError::SessionNotFound(_))
    ));
    wait_until(|| casino.open_crash_rounds() == 0).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cash_out_racing_the_ticker_settles_each_round_once() {
    let (casino, _, recorder) = casino(1);
    casino.accounts().get_or_create(5, "racer").await.unwrap();

    let handles: Vec<_> = (0..20u64)
        .map(|i| {
            let casino = casino.clone();
            tokio::spawn(async move {
                let start = casino.start_crash(&request(5, 100)).await.unwrap();
                tokio::time::sleep(Duration::from_millis(i % 7)).await;
                (start, casino.cash_out_crash(5, start.round_id).await)
            })
        })
        .collect();

    let mut rounds = Vec::new();
    for handle in handles {
        let (start, cashed) = handle.await.unwrap();
        match cashed {
            Ok(result) => {
                if let RoundOutcome::Crash { cashed_out_at: Some(at), .. } = result.outcome {
                    assert_eq!(result.settlement.base_payout, payout::crash_payout(100, at));
                } else {
                    assert_eq!(result.settlement.base_payout, 0);
                }
            }
            Err(CasinoError::SessionNotFound(_)) | Err(CasinoError::AlreadyCompleted(_)) => {}
            Err(e) => panic!("unexpected error: {}", e),
        }
        rounds.push(start.round_id);
    }

    wait_until(|| casino.open_crash_rounds() == 0 && recorder.settled().len() == 20).await;
    let settled = recorder.settled();
    for round_id in &rounds {
        assert_eq!(settled[round_id].len(), 1, "round {} settled more than once", round_id);
    }

    let net: i128 = settled.values().flatten().map(|s| s.net()).sum();
    let audit = casino.ledger().audit(5).await.unwrap();
    assert!(audit.consistent);
    assert_eq!(audit.balance as i128, 10_000 + net);
    assert_eq!(casino.bets().user_stats(5).await.unwrap().total_bets, 20);
    assert!(casino.bets().pending_bets().await.unwrap().is_empty());
}
