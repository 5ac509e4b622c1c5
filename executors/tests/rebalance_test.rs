use fixtures::*;

use alloy::primitives::U256;
use farm_core::transaction::{Direction, FeeSource};
use farm_executors::{
    price::FixedPrice,
    wrap::{CycleError, FailureClass, RebalanceLoop, Resolution, WrapSettings},
};

fn settings() -> WrapSettings {
    WrapSettings {
        score_target: 8,
        ..Default::default()
    }
}

fn resolutions(summary: &farm_executors::wrap::LoopSummary) -> Vec<Resolution> {
    summary.cycles.iter().map(|c| c.resolution).collect()
}

fn kinds(ledger: &ScriptedLedger) -> Vec<SentKind> {
    ledger.sent().into_iter().map(|tx| tx.kind).collect()
}

#[tokio::test(start_paused = true)]
async fn deposits_then_withdraws_once_target_is_reached() {
    setup_tracing();
    let ledger = ScriptedLedger::new();
    ledger.fund(ether("0.002"), U256::ZERO);
    let account = account();
    let settings = settings();
    let prices = FixedPrice(3000.0);

    let summary = RebalanceLoop::new(&ledger, &account, &settings, &prices)
        .run()
        .await
        .unwrap();

    // floor(1.5 * 3000 * 0.0018)
    assert_eq!(summary.score, 8);
    assert_eq!(summary.total_fee, 600_000);
    assert_eq!(summary.attempts_succeeded, 2);
    assert_eq!(
        resolutions(&summary),
        vec![Resolution::Confirmed, Resolution::Confirmed]
    );

    let deposit = &summary.cycles[0];
    assert_eq!(deposit.direction, Direction::Deposit);
    assert_eq!(deposit.fee, Some(FeeSource::Realized { amount: 300_000 }));
    assert_eq!(deposit.score, 8);
    assert!((deposit.amount_moved - 0.0018).abs() < 1e-12);

    let withdraw = &summary.cycles[1];
    assert_eq!(withdraw.direction, Direction::Withdraw);
    assert_eq!(withdraw.score, 0);

    assert_eq!(
        kinds(&ledger),
        vec![
            SentKind::Deposit(ether("0.0018")),
            SentKind::Withdraw(ether("0.0016")),
        ]
    );
    let nonces: Vec<u64> = ledger.sent().iter().map(|tx| tx.nonce).collect();
    assert_eq!(nonces, vec![0, 1]);
    assert_eq!(ledger.balances(), (ether("0.0018"), ether("0.0002")));
}

#[tokio::test(start_paused = true)]
async fn starts_with_withdraw_when_funds_are_wrapped() {
    setup_tracing();
    let ledger = ScriptedLedger::new();
    ledger.fund(ether("0.0002"), ether("0.002"));
    let account = account();
    let settings = settings();
    let prices = FixedPrice(3000.0);

    let summary = RebalanceLoop::new(&ledger, &account, &settings, &prices)
        .run()
        .await
        .unwrap();

    assert_eq!(summary.cycles[0].direction, Direction::Withdraw);
    assert_eq!(summary.cycles[1].direction, Direction::Deposit);
    assert!(summary.score >= 8);
}

#[tokio::test(start_paused = true)]
async fn advanced_nonce_counts_as_success_without_receipt() {
    setup_tracing();
    let ledger = ScriptedLedger::new();
    ledger.fund(ether("0.002"), U256::ZERO);
    ledger.script_sends([SendBehavior::MineSilently]);
    let account = account();
    let settings = settings();
    let prices = FixedPrice(3000.0);

    let summary = RebalanceLoop::new(&ledger, &account, &settings, &prices)
        .run()
        .await
        .unwrap();

    assert_eq!(
        resolutions(&summary),
        vec![Resolution::InferredFromNonce, Resolution::Confirmed]
    );
    let inferred = &summary.cycles[0];
    assert!(inferred.success);
    assert_eq!(inferred.score, 8);
    assert_eq!(
        inferred.fee,
        Some(FeeSource::Predicted {
            amount: 100_000 * 100_000
        })
    );
    assert_eq!(summary.total_fee, 100_000 * 100_000 + 300_000);
    assert!(!kinds(&ledger).contains(&SentKind::Cancel));
}

#[tokio::test(start_paused = true)]
async fn five_unresolved_attempts_issue_exactly_one_cancellation() {
    setup_tracing();
    let ledger = ScriptedLedger::new();
    ledger.fund(ether("0.002"), U256::ZERO);
    ledger.script_sends([
        SendBehavior::Hang,
        SendBehavior::Hang,
        SendBehavior::Hang,
        SendBehavior::Hang,
        SendBehavior::Hang,
    ]);
    let account = account();
    let settings = settings();
    let prices = FixedPrice(3000.0);

    let summary = RebalanceLoop::new(&ledger, &account, &settings, &prices)
        .run()
        .await
        .unwrap();

    assert_eq!(
        resolutions(&summary),
        vec![
            Resolution::Failed,
            Resolution::Failed,
            Resolution::Failed,
            Resolution::Failed,
            Resolution::Cancelled,
            Resolution::Confirmed,
            Resolution::Confirmed,
        ]
    );

    let cancels: Vec<_> = ledger
        .sent()
        .into_iter()
        .filter(|tx| tx.kind == SentKind::Cancel)
        .collect();
    assert_eq!(cancels.len(), 1);
    assert_eq!(cancels[0].nonce, 0);
    assert_eq!(cancels[0].gas_price, Some(150_000_000));

    // cancel fee, deposit fee, withdraw fee
    assert_eq!(summary.total_fee, 42_000 + 300_000 + 300_000);
    assert_eq!(summary.attempts_succeeded, 3);
    assert_eq!(summary.score, 8);
}

#[tokio::test(start_paused = true)]
async fn reverted_receipt_spends_slot_without_flipping() {
    setup_tracing();
    let ledger = ScriptedLedger::new();
    ledger.fund(ether("0.002"), U256::ZERO);
    ledger.script_sends([SendBehavior::Revert]);
    let account = account();
    let settings = settings();
    let prices = FixedPrice(3000.0);

    let summary = RebalanceLoop::new(&ledger, &account, &settings, &prices)
        .run()
        .await
        .unwrap();

    assert_eq!(
        resolutions(&summary),
        vec![
            Resolution::Reverted,
            Resolution::Confirmed,
            Resolution::Confirmed
        ]
    );
    assert_eq!(summary.cycles[0].direction, Direction::Deposit);
    assert_eq!(summary.cycles[1].direction, Direction::Deposit);
    assert_eq!(summary.cycles[0].score, 0);
    assert_eq!(summary.attempts_succeeded, 3);
}

#[tokio::test(start_paused = true)]
async fn accumulated_fee_covers_every_reported_fee() {
    setup_tracing();
    let ledger = ScriptedLedger::new();
    ledger.fund(ether("0.002"), U256::ZERO);
    ledger.script_sends([SendBehavior::Revert, SendBehavior::MineSilently]);
    let account = account();
    let settings = settings();
    let prices = FixedPrice(3000.0);

    let summary = RebalanceLoop::new(&ledger, &account, &settings, &prices)
        .run()
        .await
        .unwrap();

    let reported: u128 = summary
        .cycles
        .iter()
        .filter_map(|c| c.fee.map(|fee| fee.amount()))
        .sum();
    assert_eq!(summary.total_fee, reported);
    assert!(summary.cycles.iter().all(|c| c.finished_at <= chrono::Utc::now()));
}

#[tokio::test(start_paused = true)]
async fn estimate_failures_never_cancel() {
    setup_tracing();
    let ledger = ScriptedLedger::new();
    ledger.fund(ether("0.002"), U256::ZERO);
    ledger.fail_estimates(7);
    let account = account();
    let settings = settings();
    let prices = FixedPrice(3000.0);

    let summary = RebalanceLoop::new(&ledger, &account, &settings, &prices)
        .run()
        .await
        .unwrap();

    let mut expected = vec![Resolution::Failed; 7];
    expected.extend([Resolution::Confirmed, Resolution::Confirmed]);
    assert_eq!(resolutions(&summary), expected);
    assert_eq!(
        kinds(&ledger),
        vec![
            SentKind::Deposit(ether("0.0018")),
            SentKind::Withdraw(ether("0.0016")),
        ]
    );
    assert_eq!(summary.total_fee, 600_000);
    assert_eq!(summary.attempts_succeeded, 2);
}

#[tokio::test(start_paused = true)]
async fn persistent_estimate_failure_ends_loop_without_sending() {
    setup_tracing();
    let ledger = ScriptedLedger::new();
    ledger.fund(ether("0.002"), U256::ZERO);
    ledger.set_estimate_error(node_error("execution reverted"));
    let account = account();
    let settings = settings();
    let prices = FixedPrice(3000.0);

    let summary = RebalanceLoop::new(&ledger, &account, &settings, &prices)
        .run()
        .await
        .unwrap();

    assert_eq!(
        resolutions(&summary),
        vec![Resolution::Failed; settings.max_unsent_cycles as usize]
    );
    assert!(ledger.sent().is_empty());
    assert_eq!(ledger.nonce(), 0);
    assert_eq!(summary.score, 0);
    assert_eq!(summary.total_fee, 0);
}

#[tokio::test(start_paused = true)]
async fn rejected_sends_never_cancel() {
    setup_tracing();
    let ledger = ScriptedLedger::new();
    ledger.fund(ether("0.002"), U256::ZERO);
    ledger.script_sends(
        std::iter::repeat_n(SendBehavior::Reject("insufficient funds for gas".to_string()), 6),
    );
    let account = account();
    let settings = settings();
    let prices = FixedPrice(3000.0);

    let summary = RebalanceLoop::new(&ledger, &account, &settings, &prices)
        .run()
        .await
        .unwrap();

    let mut expected = vec![Resolution::Failed; 6];
    expected.extend([Resolution::Confirmed, Resolution::Confirmed]);
    assert_eq!(resolutions(&summary), expected);
    assert!(!kinds(&ledger).contains(&SentKind::Cancel));
}

#[tokio::test(start_paused = true)]
async fn nonce_jump_past_attempt_realigns_without_credit() {
    setup_tracing();
    let ledger = ScriptedLedger::new();
    ledger.fund(ether("0.002"), U256::ZERO);
    ledger.script_sends([SendBehavior::Outrun(2), SendBehavior::MineSilently]);
    let account = account();
    let settings = settings();
    let prices = FixedPrice(3000.0);

    let summary = RebalanceLoop::new(&ledger, &account, &settings, &prices)
        .run()
        .await
        .unwrap();

    assert_eq!(
        resolutions(&summary),
        vec![
            Resolution::Failed,
            Resolution::InferredFromNonce,
            Resolution::Confirmed
        ]
    );
    let skipped = &summary.cycles[0];
    assert_eq!(skipped.direction, Direction::Deposit);
    assert_eq!(skipped.score, 0);
    assert_eq!(skipped.fee, None);

    // Slots 0 and 1 went elsewhere, so the retry lands on 2 and is inferred at 3
    let inferred = &summary.cycles[1];
    assert_eq!(inferred.direction, Direction::Deposit);
    assert_eq!(inferred.score, 8);

    let nonces: Vec<u64> = ledger.sent().iter().map(|tx| tx.nonce).collect();
    assert_eq!(nonces, vec![0, 2, 3]);
    assert_eq!(summary.attempts_succeeded, ledger.nonce());
    assert_eq!(summary.score, 8);
}

#[tokio::test(start_paused = true)]
async fn receipt_without_block_is_resolved_by_nonce() {
    setup_tracing();
    let ledger = ScriptedLedger::new();
    ledger.fund(ether("0.002"), U256::ZERO);
    ledger.script_sends([SendBehavior::PartialReceipt]);
    let account = account();
    let settings = settings();
    let prices = FixedPrice(3000.0);

    let summary = RebalanceLoop::new(&ledger, &account, &settings, &prices)
        .run()
        .await
        .unwrap();

    assert_eq!(
        resolutions(&summary),
        vec![Resolution::InferredFromNonce, Resolution::Confirmed]
    );
    assert_eq!(
        summary.cycles[0].fee,
        Some(FeeSource::Predicted {
            amount: 100_000 * 100_000
        })
    );
    assert_eq!(summary.cycles[0].score, 8);
    assert!(!kinds(&ledger).contains(&SentKind::Cancel));
}

#[tokio::test(start_paused = true)]
async fn stalled_head_is_resolved_by_nonce() {
    setup_tracing();
    let ledger = ScriptedLedger::new();
    ledger.fund(ether("0.002"), U256::ZERO);
    ledger.freeze_head();
    let account = account();
    let settings = settings();
    let prices = FixedPrice(3000.0);

    let summary = RebalanceLoop::new(&ledger, &account, &settings, &prices)
        .run()
        .await
        .unwrap();

    assert_eq!(
        resolutions(&summary),
        vec![Resolution::InferredFromNonce, Resolution::InferredFromNonce]
    );
    assert_eq!(summary.cycles[0].direction, Direction::Deposit);
    assert_eq!(summary.cycles[1].direction, Direction::Withdraw);
    assert!(summary.cycles.iter().all(|c| matches!(
        c.fee,
        Some(FeeSource::Predicted { amount: 10_000_000_000 })
    )));
    assert_eq!(summary.score, 8);
    assert_eq!(summary.total_fee, 2 * 10_000_000_000);
}

#[tokio::test(start_paused = true)]
async fn underfunded_account_fails_preflight() {
    setup_tracing();
    let ledger = ScriptedLedger::new();
    ledger.fund(ether("0.0001"), ether("0.0001"));
    let account = account();
    let settings = settings();
    let prices = FixedPrice(3000.0);

    let error = RebalanceLoop::new(&ledger, &account, &settings, &prices)
        .run()
        .await
        .unwrap_err();

    assert!(matches!(error, CycleError::InsufficientBalance { .. }));
    assert_eq!(error.class(), FailureClass::Fatal);
    assert!(ledger.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn unreadable_starting_nonce_stops_the_account() {
    setup_tracing();
    let ledger = ScriptedLedger::new();
    ledger.fund(ether("0.002"), U256::ZERO);
    ledger.fail_nonce_reads(100);
    let account = account();
    let settings = settings();
    let prices = FixedPrice(3000.0);

    let error = RebalanceLoop::new(&ledger, &account, &settings, &prices)
        .run()
        .await
        .unwrap_err();

    assert!(matches!(error, CycleError::NotSubmitted { .. }));
    assert!(ledger.sent().is_empty());
}
