use std::time::Duration;

use alloy::{
    network::TransactionBuilder,
    primitives::Address,
    rpc::types::TransactionRequest,
    sol,
    sol_types::SolCall,
};
use farm_core::{
    constants::WEI_PER_GWEI,
    ledger::{Ledger, NonceTag},
    signer::AccountSigner,
    units::fee_to_ether,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, DurationSecondsWithFrac, PickFirst, serde_as};
use tokio::time::sleep;

use crate::wrap::{
    error::{AttemptContext, CycleError},
    settings::WrapSettings,
    submit::Submitter,
};

sol! {
    interface IVoting {
        function vote() external;
    }
}

/// Which accounts take part in voting, decided from the account address alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteEligibility {
    suffixes: Vec<String>,
}

impl VoteEligibility {
    pub fn new<I, T>(suffixes: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        Self {
            suffixes: suffixes
                .into_iter()
                .map(|s| s.as_ref().trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    pub fn is_eligible(&self, address: &Address) -> bool {
        let address = address.to_string().to_lowercase();
        self.suffixes.iter().any(|suffix| address.ends_with(suffix))
    }
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoteSettings {
    /// Voting contract; voting is skipped when unset
    pub contract: Option<Address>,
    pub eligible_suffixes: Vec<String>,
    pub score_target: u64,
    /// Points earned per 0.1 gwei of gas spent
    pub points_divisor: f64,
    pub gas_per_vote: u64,
    /// Skip a round when one vote would cost more than this
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub max_cost_per_vote: u128,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub max_fee: u128,
    pub batch_min: u32,
    pub batch_max: u32,
    pub gas_limit_multiplier: u64,
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub busy_retry_delay: Duration,
    pub max_busy_rounds: u32,
    pub max_consecutive_failures: u32,
}

impl Default for VoteSettings {
    fn default() -> Self {
        Self {
            contract: None,
            eligible_suffixes: vec!["8F3".to_string(), "400".to_string(), "C1D".to_string()],
            score_target: 0,
            points_divisor: 2.12,
            gas_per_vote: 21_116,
            max_cost_per_vote: 4_500_000_000_000,
            max_fee: 250_000_000,
            batch_min: 13,
            batch_max: 15,
            gas_limit_multiplier: 2,
            busy_retry_delay: Duration::from_secs(5),
            max_busy_rounds: 24,
            max_consecutive_failures: 3,
        }
    }
}

impl VoteSettings {
    pub fn eligibility(&self) -> VoteEligibility {
        VoteEligibility::new(&self.eligible_suffixes)
    }

    /// Gas budget in wei that earns `points`: `ceil(points / divisor * 10)` gwei.
    pub fn budget_for(&self, points: u64) -> u128 {
        if self.points_divisor <= 0.0 {
            return 0;
        }
        let gwei = (points as f64 / self.points_divisor * 10.0).ceil();
        gwei as u128 * WEI_PER_GWEI
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteBatch {
    pub size: u32,
    pub bump_percent: u32,
    /// Cost of one vote after the bump
    pub cost_per_vote: u128,
}

/// Sizes the next batch of votes against what is left of the budget. `None`
/// when gas is too expensive to vote right now.
pub fn plan_vote_batch<R: Rng + ?Sized>(
    remaining: u128,
    gas_price: u128,
    settings: &VoteSettings,
    rng: &mut R,
) -> Option<VoteBatch> {
    let cost = gas_price.checked_mul(settings.gas_per_vote as u128)?;
    if cost == 0 || cost > settings.max_cost_per_vote || remaining == 0 {
        return None;
    }

    let headroom = (settings.max_cost_per_vote - cost) as f64 / cost as f64;
    let bump_percent = (headroom * 100.0).round().max(0.0) as u32;
    let cost_per_vote = cost.saturating_mul(100 + bump_percent as u128) / 100;

    let needed = remaining.div_ceil(cost_per_vote);
    let (low, high) = (
        settings.batch_min.min(settings.batch_max),
        settings.batch_min.max(settings.batch_max),
    );
    let size = (rng.random_range(low..=high) as u128).min(needed) as u32;

    Some(VoteBatch {
        size,
        bump_percent,
        cost_per_vote,
    })
}

#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteSummary {
    pub votes_cast: u64,
    #[serde_as(as = "DisplayFromStr")]
    pub fee_spent: u128,
    #[serde_as(as = "DisplayFromStr")]
    pub budget: u128,
    pub points: u64,
}

/// Spends a gas budget on votes, one transaction in flight at a time.
pub struct VoteRunner<'a, L, S> {
    ledger: &'a L,
    account: &'a S,
    settings: &'a WrapSettings,
    vote: &'a VoteSettings,
}

impl<'a, L: Ledger, S: AccountSigner> VoteRunner<'a, L, S> {
    pub fn new(
        ledger: &'a L,
        account: &'a S,
        settings: &'a WrapSettings,
        vote: &'a VoteSettings,
    ) -> Self {
        Self {
            ledger,
            account,
            settings,
            vote,
        }
    }

    #[tracing::instrument(skip_all, fields(account = %self.account.address()))]
    pub async fn run(&self) -> Result<VoteSummary, CycleError> {
        let Some(contract) = self.vote.contract else {
            return Err(CycleError::Configuration {
                message: "voting contract is not configured".to_string(),
                inner_error: None,
            });
        };

        let budget = self.vote.budget_for(self.vote.score_target);
        let mut summary = VoteSummary {
            budget,
            ..Default::default()
        };
        let mut busy_rounds = 0;
        let mut failures = 0;

        tracing::info!(
            points = self.vote.score_target,
            budget = fee_to_ether(budget),
            "Starting votes"
        );

        'rounds: while summary.fee_spent < budget {
            let batch = match self.ledger.gas_price().await {
                Ok(price) => {
                    let mut rng = rand::rng();
                    plan_vote_batch(budget - summary.fee_spent, price, self.vote, &mut rng)
                        .map(|batch| (price, batch))
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Gas price read failed");
                    None
                }
            };

            let Some((price, batch)) = batch else {
                busy_rounds += 1;
                if busy_rounds > self.vote.max_busy_rounds {
                    tracing::warn!(busy_rounds = busy_rounds, "Gas stayed too expensive, giving up on votes");
                    break;
                }
                sleep(self.vote.busy_retry_delay).await;
                continue;
            };
            busy_rounds = 0;

            tracing::debug!(
                size = batch.size,
                bump_percent = batch.bump_percent,
                gas_price = price,
                "Sending vote batch"
            );

            for _ in 0..batch.size {
                match self.cast_vote(contract, price, batch.bump_percent).await {
                    Ok(fee) => {
                        summary.votes_cast += 1;
                        summary.fee_spent = summary.fee_spent.saturating_add(fee);
                        failures = 0;
                    }
                    Err(e) => {
                        failures += 1;
                        tracing::warn!(error = %e, failures = failures, "Vote failed");
                        if failures >= self.vote.max_consecutive_failures {
                            break 'rounds;
                        }
                        break;
                    }
                }
                if summary.fee_spent >= budget {
                    break;
                }
            }
        }

        summary.points = if budget == 0 || summary.fee_spent >= budget {
            self.vote.score_target
        } else {
            (self.vote.score_target as f64 * summary.fee_spent as f64 / budget as f64).floor()
                as u64
        };

        tracing::info!(
            votes = summary.votes_cast,
            fee = fee_to_ether(summary.fee_spent),
            points = summary.points,
            "Votes finished"
        );
        Ok(summary)
    }

    async fn cast_vote(
        &self,
        contract: Address,
        gas_price: u128,
        bump_percent: u32,
    ) -> Result<u128, CycleError> {
        let owner = self.account.address();
        let request = TransactionRequest::default()
            .with_from(owner)
            .with_to(contract)
            .with_input(IVoting::voteCall {}.abi_encode())
            .with_chain_id(self.ledger.chain_id());

        let estimated_gas = self.ledger.estimate_gas(&request).await.map_err(|e| {
            CycleError::NotSubmitted {
                message: format!("Vote gas estimation failed: {e}"),
                inner_error: Some(e),
                context: AttemptContext::default(),
            }
        })?;
        let nonce = self
            .ledger
            .transaction_count(owner, NonceTag::Pending)
            .await
            .map_err(|e| CycleError::NotSubmitted {
                message: format!("Failed to read pending nonce: {e}"),
                inner_error: Some(e),
                context: AttemptContext::default(),
            })?;

        let max_priority_fee =
            (gas_price.saturating_mul(100 + bump_percent as u128) / 100).min(self.vote.max_fee);

        let typed = request
            .with_nonce(nonce)
            .with_gas_limit(estimated_gas.saturating_mul(self.vote.gas_limit_multiplier))
            .with_max_fee_per_gas(self.vote.max_fee)
            .with_max_priority_fee_per_gas(max_priority_fee)
            .build_typed_tx()
            .map_err(|e| CycleError::Configuration {
                message: format!("Failed to build vote transaction: {e:?}"),
                inner_error: None,
            })?;
        let signed = self
            .account
            .sign_transaction(typed)
            .await
            .map_err(CycleError::configuration)?;

        let predicted_fee = max_priority_fee.saturating_mul(estimated_gas as u128);
        let context = AttemptContext {
            nonce: Some(nonce),
            transaction_hash: Some(*signed.hash()),
            predicted_fee,
            ..Default::default()
        };

        let receipt = Submitter::new(self.ledger, self.settings)
            .submit(signed, context)
            .await?;

        Ok(receipt.realized_fee().unwrap_or(predicted_fee))
    }
}
