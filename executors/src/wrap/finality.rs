use alloy::primitives::{Address, U256};
use farm_core::{ledger::Ledger, transaction::{Direction, LedgerReceipt}};
use tokio::time::{Instant, sleep};

use super::{
    error::{AttemptContext, CycleError},
    settings::WrapSettings,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Finalized {
    pub block_number: u64,
    /// `gasUsed * effectiveGasPrice` from the re-read receipt
    pub fee: u128,
    pub succeeded: bool,
}

pub struct FinalityWatcher<'a, L> {
    ledger: &'a L,
    settings: &'a WrapSettings,
}

impl<'a, L: Ledger> FinalityWatcher<'a, L> {
    pub fn new(ledger: &'a L, settings: &'a WrapSettings) -> Self {
        Self { ledger, settings }
    }

    /// Waits for the head to reach the receipt's block, then re-reads the receipt
    /// until it reports a non-zero fee.
    #[tracing::instrument(skip_all, fields(block = ?receipt.block_number))]
    pub async fn await_finality(
        &self,
        receipt: &LedgerReceipt,
        context: &AttemptContext,
    ) -> Result<Finalized, CycleError> {
        let (Some(hash), Some(block_number)) = (receipt.transaction_hash, receipt.block_number)
        else {
            return Err(CycleError::InvalidReceipt {
                message: format!(
                    "receipt is missing {}",
                    if receipt.transaction_hash.is_none() {
                        "transaction hash"
                    } else {
                        "block number"
                    }
                ),
                context: context.clone(),
            });
        };

        for poll in 1..=self.settings.finality_max_polls {
            match self.ledger.block_number().await {
                Ok(head) if head >= block_number => match self.ledger.transaction_receipt(hash).await {
                    Ok(Some(latest)) => match latest.realized_fee() {
                        Some(fee) => {
                            tracing::debug!(poll = poll, head = head, fee = fee, "Transaction final");
                            return Ok(Finalized {
                                block_number: latest.block_number.unwrap_or(block_number),
                                fee,
                                succeeded: !latest.reverted(),
                            });
                        }
                        None => tracing::debug!(poll = poll, "Receipt fee not yet available"),
                    },
                    Ok(None) => tracing::warn!(poll = poll, "Receipt disappeared after mining"),
                    Err(e) => tracing::debug!(poll = poll, error = %e, "Receipt read failed"),
                },
                Ok(head) => tracing::trace!(poll = poll, head = head, "Head behind receipt block"),
                Err(e) => tracing::debug!(poll = poll, error = %e, "Block number read failed"),
            }

            sleep(self.settings.finality_poll_interval).await;
        }

        Err(CycleError::FinalityTimeout {
            polls: self.settings.finality_max_polls,
            context: context.clone(),
        })
    }

    /// Waits for the destination side of a move to show at least `amount`.
    pub async fn await_settlement(
        &self,
        owner: Address,
        direction: Direction,
        amount: U256,
        context: &AttemptContext,
    ) -> Result<(), CycleError> {
        let deadline = Instant::now() + self.settings.settle_timeout;

        loop {
            let balance = match direction {
                Direction::Deposit => {
                    self.ledger
                        .wrapped_balance(self.ledger.wrapped_token(), owner)
                        .await
                }
                Direction::Withdraw => self.ledger.native_balance(owner).await,
            };

            match balance {
                Ok(balance) if balance >= amount => return Ok(()),
                Ok(balance) => {
                    tracing::trace!(balance = %balance, amount = %amount, "Balance not settled")
                }
                Err(e) => tracing::debug!(error = %e, "Settlement balance read failed"),
            }

            if Instant::now() + self.settings.settle_poll_interval > deadline {
                return Err(CycleError::SettlementTimeout {
                    timeout_secs: self.settings.settle_timeout.as_secs(),
                    context: context.clone(),
                });
            }
            sleep(self.settings.settle_poll_interval).await;
        }
    }
}
