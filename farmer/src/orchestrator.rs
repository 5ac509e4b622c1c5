use std::time::Duration;

use alloy::primitives::{Address, U256};
use farm_core::{
    ledger::Ledger,
    signer::{AccountSigner, short_address},
    units::{fee_to_ether, wei_to_ether},
};
use farm_executors::{
    price::PriceSource,
    vote::{VoteRunner, VoteSettings, VoteSummary},
    wrap::{FailureClass, RebalanceLoop, WrapSettings},
};
use futures::future::join_all;
use tokio::time::Instant;

/// Outcome of one account's turn.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountRun {
    pub address: Address,
    pub score: u64,
    pub fee: u128,
    pub vote: Option<VoteSummary>,
    pub elapsed: Duration,
}

impl AccountRun {
    /// `{short} - {fee} FeeW - {points} P_W - {vote points} P_V - {vote fee} FeeV - {h}h{m}m`
    pub fn summary_line(&self) -> String {
        let (vote_points, vote_fee) = self
            .vote
            .as_ref()
            .map(|v| (v.points, v.fee_spent))
            .unwrap_or_default();
        let minutes = self.elapsed.as_secs() / 60;
        format!(
            "{} - {:.8} FeeW - {} P_W - {} P_V - {:.8} FeeV - {}h{}m",
            short_address(&self.address),
            fee_to_ether(self.fee),
            self.score,
            vote_points,
            fee_to_ether(vote_fee),
            minutes / 60,
            minutes % 60,
        )
    }
}

/// Orders accounts richest first. Ties keep their configured order.
pub fn order_by_balance<S>(mut accounts: Vec<(S, U256)>) -> Vec<(S, U256)> {
    accounts.sort_by(|a, b| b.1.cmp(&a.1));
    accounts
}

pub struct Orchestrator<'a, L, P> {
    ledger: &'a L,
    settings: &'a WrapSettings,
    vote: &'a VoteSettings,
    prices: &'a P,
}

impl<'a, L: Ledger, P: PriceSource> Orchestrator<'a, L, P> {
    pub fn new(
        ledger: &'a L,
        settings: &'a WrapSettings,
        vote: &'a VoteSettings,
        prices: &'a P,
    ) -> Self {
        Self {
            ledger,
            settings,
            vote,
            prices,
        }
    }

    async fn total_balance(&self, owner: Address) -> U256 {
        let native = self.ledger.native_balance(owner).await;
        let wrapped = self
            .ledger
            .wrapped_balance(self.ledger.wrapped_token(), owner)
            .await;
        match (native, wrapped) {
            (Ok(native), Ok(wrapped)) => native.saturating_add(wrapped),
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!(account = %owner, error = %e, "Balance read failed, ranking last");
                U256::ZERO
            }
        }
    }

    /// Processes every account in turn. Stops at the first fatal loop error.
    pub async fn run<S: AccountSigner>(&self, accounts: Vec<S>) -> anyhow::Result<Vec<AccountRun>> {
        let totals = join_all(
            accounts
                .iter()
                .map(|account| self.total_balance(account.address())),
        )
        .await;
        let ordered = order_by_balance(accounts.into_iter().zip(totals).collect());

        let Some((richest, richest_total)) = ordered.first() else {
            anyhow::bail!("No accounts to process");
        };
        if *richest_total < U256::from(self.settings.min_balance) {
            anyhow::bail!(
                "Richest account {} holds {} ETH, below the minimum of {} ETH",
                short_address(&richest.address()),
                wei_to_ether(*richest_total),
                wei_to_ether(U256::from(self.settings.min_balance)),
            );
        }

        let eligibility = self.vote.eligibility();
        let mut runs = Vec::with_capacity(ordered.len());

        for (account, total) in &ordered {
            let started = Instant::now();
            let address = account.address();
            tracing::info!(
                account = %short_address(&address),
                total = wei_to_ether(*total),
                "Processing account"
            );

            let (score, fee) = match RebalanceLoop::new(self.ledger, account, self.settings, self.prices)
                .run()
                .await
            {
                Ok(summary) => (summary.score, summary.total_fee),
                Err(e) if e.class() == FailureClass::Fatal => {
                    tracing::error!(account = %short_address(&address), error = %e, "Fatal error, stopping run");
                    return Err(e.into());
                }
                Err(e) => {
                    tracing::error!(account = %short_address(&address), error = %e, "Account loop aborted");
                    (0, 0)
                }
            };

            let vote = if self.vote.contract.is_some()
                && self.vote.score_target > 0
                && eligibility.is_eligible(&address)
            {
                match VoteRunner::new(self.ledger, account, self.settings, self.vote)
                    .run()
                    .await
                {
                    Ok(summary) => Some(summary),
                    Err(e) => {
                        tracing::warn!(account = %short_address(&address), error = %e, "Voting failed");
                        None
                    }
                }
            } else {
                None
            };

            let run = AccountRun {
                address,
                score,
                fee,
                vote,
                elapsed: started.elapsed(),
            };
            tracing::info!("{}", run.summary_line());
            runs.push(run);
        }

        Ok(runs)
    }
}
