use fixtures::*;

use alloy::{consensus::Transaction, primitives::U256};
use farm_core::{transaction::Direction, wrapped::decode_withdraw};
use farm_executors::wrap::{
    CycleError, FailureClass, WrapSettings, builder::TransactionBuilder,
};
use tokio::time::{Duration, Instant};

#[tokio::test(start_paused = true)]
async fn deposit_moves_native_balance_minus_reserve() {
    setup_tracing();
    let ledger = ScriptedLedger::new();
    ledger.fund(ether("0.002"), U256::ZERO);
    ledger.set_nonce(4);
    let account = account();
    let settings = WrapSettings::default();

    let built = TransactionBuilder::new(&ledger, &account, &settings)
        .build(Direction::Deposit, None)
        .await
        .unwrap();

    assert_eq!(built.intent.amount, ether("0.0018"));
    assert_eq!(built.intent.value, ether("0.0018"));
    assert_eq!(built.intent.nonce, 4);
    assert_eq!(built.intent.to_contract, TEST_TOKEN);
    assert_eq!(built.intent.estimated_gas, 100_000);
    assert_eq!(built.intent.gas_limit, 150_000);
    assert_eq!(built.intent.max_fee, settings.fee_ceiling);
    assert_eq!(built.intent.max_priority_fee, settings.max_priority_fee);
    assert_eq!(built.predicted_fee, 100_000 * 100_000);

    let tx = built.signed.tx();
    assert_eq!(tx.nonce(), 4);
    assert_eq!(tx.gas_limit(), 150_000);
    assert_eq!(tx.max_fee_per_gas(), 200_000_002);
    assert_eq!(tx.chain_id(), Some(TEST_CHAIN_ID));
    assert_eq!(built.context().transaction_hash, Some(*built.signed.hash()));
}

#[tokio::test(start_paused = true)]
async fn withdraw_encodes_amount_in_calldata() {
    setup_tracing();
    let ledger = ScriptedLedger::new();
    ledger.fund(ether("0.0002"), ether("0.001"));
    let account = account();
    let settings = WrapSettings::default();

    let built = TransactionBuilder::new(&ledger, &account, &settings)
        .build(Direction::Withdraw, None)
        .await
        .unwrap();

    assert_eq!(built.intent.amount, ether("0.0008"));
    assert_eq!(built.intent.value, U256::ZERO);
    assert_eq!(decode_withdraw(&built.intent.call_data), Some(ether("0.0008")));
}

#[tokio::test(start_paused = true)]
async fn amount_hint_caps_the_move() {
    setup_tracing();
    let ledger = ScriptedLedger::new();
    ledger.fund(ether("0.01"), U256::ZERO);
    let account = account();
    let settings = WrapSettings::default();

    let built = TransactionBuilder::new(&ledger, &account, &settings)
        .build(Direction::Deposit, Some(ether("0.0005")))
        .await
        .unwrap();

    assert_eq!(built.intent.amount, ether("0.0005"));
}

#[tokio::test(start_paused = true)]
async fn priority_fee_above_ceiling_is_fatal() {
    setup_tracing();
    let ledger = ScriptedLedger::new();
    ledger.fund(ether("0.01"), U256::ZERO);
    let account = account();
    let settings = WrapSettings {
        max_priority_fee: 300_000_000,
        ..Default::default()
    };

    let error = TransactionBuilder::new(&ledger, &account, &settings)
        .build(Direction::Deposit, None)
        .await
        .unwrap_err();

    assert!(matches!(error, CycleError::Configuration { .. }));
    assert_eq!(error.class(), FailureClass::Fatal);
    assert!(ledger.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn low_balance_fails_after_retries() {
    setup_tracing();
    let ledger = ScriptedLedger::new();
    ledger.fund(ether("0.0005"), U256::ZERO);
    let account = account();
    let settings = WrapSettings::default();

    let started = Instant::now();
    let error = TransactionBuilder::new(&ledger, &account, &settings)
        .build(Direction::Deposit, None)
        .await
        .unwrap_err();

    match error {
        CycleError::InsufficientBalance {
            direction,
            available,
            required,
        } => {
            assert_eq!(direction, Direction::Deposit);
            assert_eq!(available, ether("0.0003"));
            assert_eq!(required, ether("0.0004"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(started.elapsed() >= Duration::from_secs(15));
}

#[tokio::test(start_paused = true)]
async fn reverting_estimate_is_not_submitted() {
    setup_tracing();
    let ledger = ScriptedLedger::new();
    ledger.fund(ether("0.01"), U256::ZERO);
    ledger.set_estimate_error(node_error("execution reverted"));
    let account = account();
    let settings = WrapSettings::default();

    let error = TransactionBuilder::new(&ledger, &account, &settings)
        .build(Direction::Deposit, None)
        .await
        .unwrap_err();

    match &error {
        CycleError::NotSubmitted { message, context, .. } => {
            assert!(message.contains("reverted"));
            assert_eq!(context.direction, Some(Direction::Deposit));
            assert_eq!(context.nonce, None);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(error.class(), FailureClass::NotSubmitted);
}

#[tokio::test(start_paused = true)]
async fn predicted_fee_saturates_on_absurd_estimate() {
    setup_tracing();
    let ledger = ScriptedLedger::new();
    ledger.fund(ether("0.002"), U256::ZERO);
    ledger.set_estimate(u64::MAX);
    let account = account();
    let settings = WrapSettings {
        fee_ceiling: u128::MAX,
        max_priority_fee: u128::MAX,
        ..Default::default()
    };

    let built = TransactionBuilder::new(&ledger, &account, &settings)
        .build(Direction::Deposit, None)
        .await
        .unwrap();

    assert_eq!(built.predicted_fee, u128::MAX);
    assert_eq!(built.intent.gas_limit, u64::MAX);
}
