use alloy::primitives::U256;
use chrono::{DateTime, Utc};
use farm_core::{
    ledger::{Ledger, NonceTag},
    signer::AccountSigner,
    transaction::{Direction, FeeSource},
    units::{fee_to_ether, wei_to_ether},
};
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use tokio::time::sleep;
use uuid::Uuid;

use super::{
    cancel::CancellationIssuer,
    cycle::WrapCycle,
    error::{CycleError, FailureClass},
    gas::GasPriceSampler,
    settings::WrapSettings,
};
use crate::price::{PriceSource, usd_price_or};

/// Per-account progress. Only mutated through the `record_*` transitions.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopState {
    /// Next direction to attempt; `None` until the first decision
    pub direction: Option<Direction>,
    pub score_accumulated: u64,
    #[serde_as(as = "DisplayFromStr")]
    pub fee_accumulated: u128,
    /// Nonce slots this loop has consumed since `starting_nonce`
    pub attempts_succeeded: u64,
    pub consecutive_failures: u32,
    /// Cycles in a row that failed before reaching the mempool
    pub consecutive_unsent: u32,
    pub starting_nonce: u64,
    /// Direction of the last move that actually happened
    pub last_completed: Option<Direction>,
    #[serde_as(as = "DisplayFromStr")]
    pub last_known_price: u128,
}

impl LoopState {
    pub fn new(starting_nonce: u64) -> Self {
        Self {
            direction: None,
            score_accumulated: 0,
            fee_accumulated: 0,
            attempts_succeeded: 0,
            consecutive_failures: 0,
            consecutive_unsent: 0,
            starting_nonce,
            last_completed: None,
            last_known_price: 0,
        }
    }

    /// The nonce the account reaches once the attempt in flight is mined.
    pub fn expected_nonce_after_attempt(&self) -> u64 {
        self.starting_nonce + self.attempts_succeeded + 1
    }

    pub fn infers_success(&self, observed_nonce: u64) -> bool {
        observed_nonce == self.expected_nonce_after_attempt()
    }

    /// Confirmed or inferred success: the direction flips.
    pub fn record_success(&mut self, direction: Direction, fee: FeeSource, score: u64) {
        self.attempts_succeeded += 1;
        self.consecutive_failures = 0;
        self.consecutive_unsent = 0;
        self.fee_accumulated = self.fee_accumulated.saturating_add(fee.amount());
        self.score_accumulated = self.score_accumulated.saturating_add(score);
        self.last_completed = Some(direction);
        self.direction = Some(direction.complement());
    }

    /// Mined but reverted: the slot and fee are spent, nothing moved.
    pub fn record_reverted(&mut self, fee: FeeSource) {
        self.attempts_succeeded += 1;
        self.consecutive_failures = 0;
        self.consecutive_unsent = 0;
        self.fee_accumulated = self.fee_accumulated.saturating_add(fee.amount());
    }

    pub fn record_failure(&mut self) {
        self.consecutive_failures += 1;
        self.consecutive_unsent = 0;
    }

    /// Nothing was broadcast, so the cancellation streak is left alone.
    pub fn record_unsent(&mut self) {
        self.consecutive_unsent += 1;
    }

    pub fn record_cancellation(&mut self, fee: Option<u128>) {
        self.attempts_succeeded += 1;
        self.consecutive_failures = 0;
        self.consecutive_unsent = 0;
        self.fee_accumulated = self.fee_accumulated.saturating_add(fee.unwrap_or(0));
    }

    /// Re-anchors slot accounting after the nonce moved further than one attempt.
    pub fn realign(&mut self, observed_nonce: u64) {
        self.attempts_succeeded = observed_nonce.saturating_sub(self.starting_nonce);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopDecision {
    Continue,
    /// Target reached but funds are still wrapped
    ForceWithdraw,
    Stop,
}

/// Stop rule, evaluated before each attempt. Balances are `None` when unread.
pub fn evaluate_stop(
    state: &LoopState,
    settings: &WrapSettings,
    native: Option<U256>,
    wrapped: Option<U256>,
) -> StopDecision {
    if state.score_accumulated < settings.score_target {
        return StopDecision::Continue;
    }

    let min_balance = U256::from(settings.min_balance);
    let Some(native) = native else {
        return StopDecision::Continue;
    };
    if state.last_completed == Some(Direction::Withdraw) && native > min_balance {
        return StopDecision::Stop;
    }

    match wrapped {
        None => StopDecision::Continue,
        Some(wrapped) if is_movable(wrapped, settings) => StopDecision::ForceWithdraw,
        Some(_) => StopDecision::Stop,
    }
}

/// Whether `balance` minus the reserve reaches the minimum move size.
pub fn is_movable(balance: U256, settings: &WrapSettings) -> bool {
    balance.saturating_sub(U256::from(settings.reserve())) >= U256::from(settings.min_balance)
}

/// `floor(multiplier * usd * amount)` for deposits; withdrawals score nothing.
pub fn score_for(direction: Direction, amount: U256, usd_price: f64, multiplier: f64) -> u64 {
    match direction {
        Direction::Deposit => {
            let score = (multiplier * usd_price * wei_to_ether(amount)).floor();
            if score.is_finite() && score > 0.0 {
                score as u64
            } else {
                0
            }
        }
        Direction::Withdraw => 0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Resolution {
    Confirmed,
    /// Outcome unknown, success inferred from the nonce
    InferredFromNonce,
    Reverted,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub direction: Direction,
    pub resolution: Resolution,
    pub success: bool,
    pub fee: Option<FeeSource>,
    pub amount_moved: f64,
    pub score: u64,
    pub finished_at: DateTime<Utc>,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopSummary {
    pub run_id: Uuid,
    pub score: u64,
    #[serde_as(as = "DisplayFromStr")]
    pub total_fee: u128,
    pub attempts_succeeded: u64,
    pub cycles: Vec<CycleReport>,
}

/// Drives one account through alternating deposit and withdraw cycles.
pub struct RebalanceLoop<'a, L, S, P> {
    ledger: &'a L,
    account: &'a S,
    settings: &'a WrapSettings,
    prices: &'a P,
}

impl<'a, L, S, P> RebalanceLoop<'a, L, S, P>
where
    L: Ledger,
    S: AccountSigner,
    P: PriceSource,
{
    pub fn new(ledger: &'a L, account: &'a S, settings: &'a WrapSettings, prices: &'a P) -> Self {
        Self {
            ledger,
            account,
            settings,
            prices,
        }
    }

    #[tracing::instrument(skip_all, fields(account = %self.account.address(), run_id = tracing::field::Empty))]
    pub async fn run(&self) -> Result<LoopSummary, CycleError> {
        let run_id = Uuid::new_v4();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));

        self.settings.validate().map_err(CycleError::configuration)?;

        let starting_nonce = self.preflight().await?;
        let mut state = LoopState::new(starting_nonce);
        let mut cycles = Vec::new();

        tracing::info!(
            starting_nonce = starting_nonce,
            score_target = self.settings.score_target,
            "Starting rebalance loop"
        );

        loop {
            match self.stop_decision(&state).await {
                StopDecision::Stop => break,
                StopDecision::ForceWithdraw => {
                    tracing::info!(score = state.score_accumulated, "Target reached, withdrawing remaining wrapped balance");
                    state.direction = Some(Direction::Withdraw);
                }
                StopDecision::Continue => {}
            }

            let quote = GasPriceSampler::new(self.ledger, self.settings).quote().await;
            state.last_known_price = quote.price;

            let direction = match state.direction {
                Some(direction) => direction,
                None => {
                    let direction = self.initial_direction().await;
                    state.direction = Some(direction);
                    direction
                }
            };

            tracing::info!(
                direction = %direction,
                gas_price = quote.price,
                attempt = state.attempts_succeeded + 1,
                "Starting cycle"
            );
            sleep(self.settings.cycle_pause).await;

            let report = match WrapCycle::new(self.ledger, self.account, self.settings)
                .execute(direction)
                .await
            {
                Ok(outcome) => {
                    let score = self.score(direction, outcome.amount).await;
                    state.record_success(direction, outcome.fee, score);
                    tracing::info!(
                        direction = %direction,
                        fee = fee_to_ether(outcome.fee.amount()),
                        score = state.score_accumulated,
                        total_fee = fee_to_ether(state.fee_accumulated),
                        "Cycle confirmed"
                    );
                    CycleReport {
                        direction,
                        resolution: Resolution::Confirmed,
                        success: true,
                        fee: Some(outcome.fee),
                        amount_moved: wei_to_ether(outcome.amount),
                        score,
                        finished_at: Utc::now(),
                    }
                }
                Err(error) => {
                    tracing::warn!(
                        error = %error,
                        score = state.score_accumulated,
                        total_fee = fee_to_ether(state.fee_accumulated),
                        consecutive_failures = state.consecutive_failures,
                        "Cycle failed"
                    );
                    match error.class() {
                        FailureClass::Fatal => return Err(error),
                        FailureClass::Reverted => {
                            let fee = error.context().map(|c| c.known_fee());
                            if let Some(fee) = fee {
                                state.record_reverted(fee);
                            }
                            CycleReport {
                                direction,
                                resolution: Resolution::Reverted,
                                success: false,
                                fee,
                                amount_moved: 0.0,
                                score: 0,
                                finished_at: Utc::now(),
                            }
                        }
                        FailureClass::NotSubmitted => {
                            state.record_unsent();
                            if state.consecutive_unsent >= self.settings.max_unsent_cycles {
                                tracing::error!(
                                    error = %error,
                                    consecutive_unsent = state.consecutive_unsent,
                                    score = state.score_accumulated,
                                    total_fee = fee_to_ether(state.fee_accumulated),
                                    "Nothing could be submitted, ending loop"
                                );
                                cycles.push(self.failed_report(direction));
                                break;
                            }
                            sleep(self.settings.unsent_retry_interval).await;
                            self.failed_report(direction)
                        }
                        FailureClass::Ambiguous => {
                            self.resolve_ambiguous(&mut state, direction, &error).await
                        }
                    }
                }
            };
            cycles.push(report);
        }

        tracing::info!(
            score = state.score_accumulated,
            total_fee = fee_to_ether(state.fee_accumulated),
            cycles = cycles.len(),
            "Rebalance loop finished"
        );

        Ok(LoopSummary {
            run_id,
            score: state.score_accumulated,
            total_fee: state.fee_accumulated,
            attempts_succeeded: state.attempts_succeeded,
            cycles,
        })
    }

    /// Waits for the account to hold at least the minimum balance across both
    /// sides, then reads the starting nonce.
    async fn preflight(&self) -> Result<u64, CycleError> {
        let owner = self.account.address();
        let required = U256::from(self.settings.min_balance);
        let mut available = U256::ZERO;
        let mut funded = false;

        for attempt in 1..=self.settings.preflight_attempts.max(1) {
            let native = self.ledger.native_balance(owner).await;
            let wrapped = self
                .ledger
                .wrapped_balance(self.ledger.wrapped_token(), owner)
                .await;
            match (native, wrapped) {
                (Ok(native), Ok(wrapped)) => {
                    available = native.saturating_add(wrapped);
                    if available >= required {
                        funded = true;
                        break;
                    }
                    tracing::warn!(
                        attempt = attempt,
                        total = wei_to_ether(available),
                        "Total balance below minimum"
                    );
                }
                (Err(e), _) | (_, Err(e)) => {
                    tracing::warn!(attempt = attempt, error = %e, "Balance check failed");
                }
            }
            if attempt < self.settings.preflight_attempts {
                sleep(self.settings.preflight_interval).await;
            }
        }

        if !funded {
            return Err(CycleError::InsufficientBalance {
                direction: Direction::Deposit,
                available,
                required,
            });
        }

        let mut last_error = None;
        for attempt in 0..=self.settings.balance_retry_attempts {
            if attempt > 0 {
                sleep(self.settings.balance_retry_interval).await;
            }
            match self.ledger.transaction_count(owner, NonceTag::Latest).await {
                Ok(nonce) => return Ok(nonce),
                Err(e) => last_error = Some(e),
            }
        }

        Err(CycleError::NotSubmitted {
            message: "Could not read starting nonce".to_string(),
            inner_error: last_error,
            context: Default::default(),
        })
    }

    async fn initial_direction(&self) -> Direction {
        match self.ledger.native_balance(self.account.address()).await {
            Ok(native) if is_movable(native, self.settings) => Direction::Deposit,
            Ok(_) => Direction::Withdraw,
            Err(e) => {
                tracing::warn!(error = %e, "Native balance unreadable, starting with withdraw");
                Direction::Withdraw
            }
        }
    }

    async fn stop_decision(&self, state: &LoopState) -> StopDecision {
        if state.score_accumulated < self.settings.score_target {
            return StopDecision::Continue;
        }

        let owner = self.account.address();
        let native = self.ledger.native_balance(owner).await.ok();
        let wrapped = self
            .ledger
            .wrapped_balance(self.ledger.wrapped_token(), owner)
            .await
            .ok();

        evaluate_stop(state, self.settings, native, wrapped)
    }

    async fn score(&self, direction: Direction, amount: U256) -> u64 {
        if direction == Direction::Withdraw {
            return 0;
        }
        let usd = usd_price_or(self.prices, self.settings.fallback_usd_price).await;
        score_for(direction, amount, usd, self.settings.score_multiplier)
    }

    /// Grace wait, then read the nonce to decide whether the attempt landed.
    async fn resolve_ambiguous(
        &self,
        state: &mut LoopState,
        direction: Direction,
        error: &CycleError,
    ) -> CycleReport {
        sleep(self.settings.ambiguity_grace).await;

        let observed = match self
            .ledger
            .transaction_count(self.account.address(), NonceTag::Latest)
            .await
        {
            Ok(nonce) => Some(nonce),
            Err(e) => {
                tracing::warn!(error = %e, "Nonce read failed during inference");
                None
            }
        };

        if let Some(nonce) = observed.filter(|nonce| state.infers_success(*nonce)) {
            let context = error.context().cloned().unwrap_or_default();
            let fee = context.known_fee();
            let score = self.score(direction, context.amount).await;
            state.record_success(direction, fee, score);

            tracing::info!(
                nonce = nonce,
                fee = ?fee,
                score = state.score_accumulated,
                total_fee = fee_to_ether(state.fee_accumulated),
                "Nonce advanced, treating attempt as successful"
            );

            return CycleReport {
                direction,
                resolution: Resolution::InferredFromNonce,
                success: true,
                fee: Some(fee),
                amount_moved: wei_to_ether(context.amount),
                score,
                finished_at: Utc::now(),
            };
        }

        if let Some(nonce) = observed.filter(|n| *n > state.expected_nonce_after_attempt()) {
            tracing::warn!(
                observed = nonce,
                expected = state.expected_nonce_after_attempt(),
                "Nonce moved past this attempt, re-anchoring slot count"
            );
            state.realign(nonce);
        }

        state.record_failure();
        tracing::warn!(
            consecutive_failures = state.consecutive_failures,
            threshold = self.settings.cancel_after_failures,
            "Attempt unresolved"
        );

        if state.consecutive_failures < self.settings.cancel_after_failures {
            return self.failed_report(direction);
        }

        let issuer = CancellationIssuer::new(self.ledger, self.account, self.settings);
        match issuer.cancel(state.last_known_price).await {
            Ok(cancellation) => {
                state.record_cancellation(cancellation.fee);
                tracing::info!(
                    nonce = cancellation.nonce,
                    gas_price = cancellation.gas_price,
                    total_fee = fee_to_ether(state.fee_accumulated),
                    "Stuck nonce cleared by cancellation"
                );
                CycleReport {
                    direction,
                    resolution: Resolution::Cancelled,
                    success: false,
                    fee: cancellation.fee.map(|amount| FeeSource::Realized { amount }),
                    amount_moved: 0.0,
                    score: 0,
                    finished_at: Utc::now(),
                }
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    score = state.score_accumulated,
                    total_fee = fee_to_ether(state.fee_accumulated),
                    "Cancellation failed"
                );
                self.failed_report(direction)
            }
        }
    }

    fn failed_report(&self, direction: Direction) -> CycleReport {
        CycleReport {
            direction,
            resolution: Resolution::Failed,
            success: false,
            fee: None,
            amount_moved: 0.0,
            score: 0,
            finished_at: Utc::now(),
        }
    }
}
