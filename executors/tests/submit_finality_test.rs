use fixtures::*;

use alloy::primitives::U256;
use farm_core::{signer::AccountSigner, transaction::Direction};
use farm_executors::wrap::{
    CycleError, FailureClass, WrapSettings,
    builder::{BuiltTransaction, TransactionBuilder},
    finality::FinalityWatcher,
    submit::Submitter,
};
use tokio::time::{Duration, Instant};

async fn build_deposit(ledger: &ScriptedLedger, settings: &WrapSettings) -> BuiltTransaction {
    ledger.fund(ether("0.002"), U256::ZERO);
    TransactionBuilder::new(ledger, &account(), settings)
        .build(Direction::Deposit, None)
        .await
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn mined_transaction_yields_receipt_and_final_fee() {
    setup_tracing();
    let ledger = ScriptedLedger::new();
    let settings = WrapSettings::default();
    let built = build_deposit(&ledger, &settings).await;
    let context = built.context();
    let hash = *built.signed.hash();

    let receipt = Submitter::new(&ledger, &settings)
        .submit(built.signed, context.clone())
        .await
        .unwrap();
    assert_eq!(receipt.transaction_hash, Some(hash));

    let finalized = FinalityWatcher::new(&ledger, &settings)
        .await_finality(&receipt, &context)
        .await
        .unwrap();
    assert_eq!(finalized.fee, 300_000);
    assert!(finalized.succeeded);
    assert_eq!(ledger.sent()[0].kind, SentKind::Deposit(ether("0.0018")));
}

#[tokio::test(start_paused = true)]
async fn rejected_send_is_reported_with_context() {
    setup_tracing();
    let ledger = ScriptedLedger::new();
    ledger.script_sends([SendBehavior::Reject(
        "insufficient funds for gas * price + value".to_string(),
    )]);
    let settings = WrapSettings::default();
    let built = build_deposit(&ledger, &settings).await;
    let hash = *built.signed.hash();

    let context = built.context();

    let error = Submitter::new(&ledger, &settings)
        .submit(built.signed, context)
        .await
        .unwrap_err();

    match &error {
        CycleError::SubmissionRejected { context, .. } => {
            assert_eq!(context.transaction_hash, Some(hash));
            assert_eq!(context.nonce, Some(0));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(error.class(), FailureClass::NotSubmitted);
    assert_eq!(ledger.nonce(), 0);
}

#[tokio::test(start_paused = true)]
async fn possibly_sent_error_keeps_polling_for_receipt() {
    setup_tracing();
    let ledger = ScriptedLedger::new();
    ledger.script_sends([SendBehavior::FailAfterMining(
        "connection closed before message completed".to_string(),
    )]);
    let settings = WrapSettings::default();
    let built = build_deposit(&ledger, &settings).await;
    let hash = *built.signed.hash();

    let context = built.context();

    let receipt = Submitter::new(&ledger, &settings)
        .submit(built.signed, context)
        .await
        .unwrap();

    assert_eq!(receipt.transaction_hash, Some(hash));
    assert_eq!(receipt.status, Some(true));
}

#[tokio::test(start_paused = true)]
async fn dropped_transaction_times_out() {
    setup_tracing();
    let ledger = ScriptedLedger::new();
    ledger.script_sends([SendBehavior::Hang]);
    let settings = WrapSettings::default();
    let built = build_deposit(&ledger, &settings).await;
    let predicted_fee = built.predicted_fee;

    let started = Instant::now();
    let context = built.context();
    let error = Submitter::new(&ledger, &settings)
        .submit(built.signed, context)
        .await
        .unwrap_err();

    match &error {
        CycleError::SubmissionTimeout {
            timeout_secs,
            context,
        } => {
            assert_eq!(*timeout_secs, 180);
            assert_eq!(context.predicted_fee, predicted_fee);
            assert_eq!(context.realized_fee, None);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(180));
    assert!(elapsed < Duration::from_secs(182));
}

#[tokio::test(start_paused = true)]
async fn receipt_without_block_is_invalid() {
    setup_tracing();
    let ledger = ScriptedLedger::new();
    ledger.script_sends([SendBehavior::PartialReceipt]);
    let settings = WrapSettings::default();
    let built = build_deposit(&ledger, &settings).await;
    let context = built.context();

    let receipt = Submitter::new(&ledger, &settings)
        .submit(built.signed, context.clone())
        .await
        .unwrap();
    let error = FinalityWatcher::new(&ledger, &settings)
        .await_finality(&receipt, &context)
        .await
        .unwrap_err();

    assert!(matches!(error, CycleError::InvalidReceipt { .. }));
    assert_eq!(error.class(), FailureClass::Ambiguous);
}

#[tokio::test(start_paused = true)]
async fn stale_fee_reads_are_polled_through() {
    setup_tracing();
    let ledger = ScriptedLedger::new();
    ledger.script_sends([SendBehavior::MineStale(3)]);
    let settings = WrapSettings::default();
    let built = build_deposit(&ledger, &settings).await;
    let context = built.context();

    let receipt = Submitter::new(&ledger, &settings)
        .submit(built.signed, context.clone())
        .await
        .unwrap();
    assert_eq!(receipt.realized_fee(), None);

    let finalized = FinalityWatcher::new(&ledger, &settings)
        .await_finality(&receipt, &context)
        .await
        .unwrap();
    assert_eq!(finalized.fee, 300_000);
}

#[tokio::test(start_paused = true)]
async fn frozen_head_exhausts_finality_polls() {
    setup_tracing();
    let ledger = ScriptedLedger::new();
    ledger.freeze_head();
    let settings = WrapSettings::default();
    let built = build_deposit(&ledger, &settings).await;
    let context = built.context();

    let receipt = Submitter::new(&ledger, &settings)
        .submit(built.signed, context.clone())
        .await
        .unwrap();

    let started = Instant::now();
    let error = FinalityWatcher::new(&ledger, &settings)
        .await_finality(&receipt, &context)
        .await
        .unwrap_err();

    assert!(matches!(error, CycleError::FinalityTimeout { polls: 20, .. }));
    assert!(started.elapsed() >= Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn settlement_times_out_when_destination_never_credits() {
    setup_tracing();
    let ledger = ScriptedLedger::new();
    let settings = WrapSettings::default();
    let account = account();

    let started = Instant::now();
    let error = FinalityWatcher::new(&ledger, &settings)
        .await_settlement(
            account.address(),
            Direction::Deposit,
            ether("0.001"),
            &Default::default(),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        CycleError::SettlementTimeout {
            timeout_secs: 120,
            ..
        }
    ));
    assert!(started.elapsed() <= Duration::from_secs(120));
}
