use alloy::primitives::{B256, U256};
use farm_core::{
    ledger::Ledger,
    signer::AccountSigner,
    transaction::{Direction, FeeSource},
};

use super::{
    builder::TransactionBuilder, error::CycleError, finality::FinalityWatcher,
    settings::WrapSettings, submit::Submitter,
};

/// A move that was mined, finalized and settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleOutcome {
    pub direction: Direction,
    pub nonce: u64,
    pub transaction_hash: B256,
    pub amount: U256,
    pub fee: FeeSource,
}

/// One build, submit, confirm pass for a single direction.
pub struct WrapCycle<'a, L, S> {
    ledger: &'a L,
    account: &'a S,
    settings: &'a WrapSettings,
}

impl<'a, L: Ledger, S: AccountSigner> WrapCycle<'a, L, S> {
    pub fn new(ledger: &'a L, account: &'a S, settings: &'a WrapSettings) -> Self {
        Self {
            ledger,
            account,
            settings,
        }
    }

    #[tracing::instrument(skip_all, fields(direction = %direction))]
    pub async fn execute(&self, direction: Direction) -> Result<CycleOutcome, CycleError> {
        let built = TransactionBuilder::new(self.ledger, self.account, self.settings)
            .build(direction, None)
            .await?;

        let mut context = built.context();
        let nonce = built.intent.nonce;
        let amount = built.intent.amount;
        let transaction_hash = *built.signed.hash();

        let receipt = Submitter::new(self.ledger, self.settings)
            .submit(built.signed, context.clone())
            .await?;

        let watcher = FinalityWatcher::new(self.ledger, self.settings);
        let finalized = watcher.await_finality(&receipt, &context).await?;
        context.realized_fee = Some(finalized.fee);

        if !finalized.succeeded {
            tracing::warn!(fee = finalized.fee, "Transaction reverted");
            return Err(CycleError::Reverted { context });
        }

        watcher
            .await_settlement(self.account.address(), direction, amount, &context)
            .await?;

        Ok(CycleOutcome {
            direction,
            nonce,
            transaction_hash,
            amount,
            fee: FeeSource::Realized {
                amount: finalized.fee,
            },
        })
    }
}
