use alloy::{
    network::TransactionBuilder,
    primitives::{B256, Bytes, U256},
    rpc::types::TransactionRequest,
};
use farm_core::{
    ledger::{Ledger, NonceTag},
    signer::AccountSigner,
};

use super::{
    error::{AttemptContext, CycleError},
    settings::WrapSettings,
    submit::Submitter,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cancellation {
    pub nonce: u64,
    pub gas_price: u128,
    pub transaction_hash: B256,
    pub fee: Option<u128>,
}

/// Replaces whatever occupies the account's lowest unconfirmed nonce with a
/// zero-value self-transfer priced above the last known gas price.
pub struct CancellationIssuer<'a, L, S> {
    ledger: &'a L,
    account: &'a S,
    settings: &'a WrapSettings,
}

impl<'a, L: Ledger, S: AccountSigner> CancellationIssuer<'a, L, S> {
    pub fn new(ledger: &'a L, account: &'a S, settings: &'a WrapSettings) -> Self {
        Self {
            ledger,
            account,
            settings,
        }
    }

    pub fn replacement_price(&self, last_known_price: u128) -> u128 {
        last_known_price.saturating_mul(self.settings.cancel_markup_percent) / 100
    }

    /// Signs at the *latest* (confirmed) nonce, not the pending one. The pending
    /// count already includes the stuck transaction.
    #[tracing::instrument(skip_all, fields(last_known_price = last_known_price))]
    pub async fn cancel(&self, last_known_price: u128) -> Result<Cancellation, CycleError> {
        let owner = self.account.address();

        // The confirmed count is the index of the first slot still in the mempool.
        let nonce = self
            .ledger
            .transaction_count(owner, NonceTag::Latest)
            .await
            .map_err(|e| CycleError::CancellationFailed {
                message: format!("Failed to read nonce for cancellation: {e}"),
                inner_error: Some(e),
            })?;

        let gas_price = self.replacement_price(last_known_price);

        let typed = TransactionRequest::default()
            .with_from(owner)
            .with_to(owner)
            .with_value(U256::ZERO)
            .with_input(Bytes::new())
            .with_chain_id(self.ledger.chain_id())
            .with_nonce(nonce)
            .with_gas_limit(self.settings.cancel_gas_limit)
            .with_gas_price(gas_price)
            .build_typed_tx()
            .map_err(|e| CycleError::CancellationFailed {
                message: format!("Failed to build cancellation: {e:?}"),
                inner_error: None,
            })?;

        let signed = self.account.sign_transaction(typed).await.map_err(|e| {
            CycleError::CancellationFailed {
                message: format!("Failed to sign cancellation: {e}"),
                inner_error: Some(e),
            }
        })?;
        let transaction_hash = *signed.hash();

        tracing::info!(
            nonce = nonce,
            gas_price = gas_price,
            tx_hash = %transaction_hash,
            "Issuing cancellation"
        );

        let context = AttemptContext {
            nonce: Some(nonce),
            transaction_hash: Some(transaction_hash),
            ..Default::default()
        };

        let receipt = Submitter::new(self.ledger, self.settings)
            .submit(signed, context)
            .await
            .map_err(|e| CycleError::CancellationFailed {
                message: e.to_string(),
                inner_error: None,
            })?;

        Ok(Cancellation {
            nonce,
            gas_price,
            transaction_hash,
            fee: receipt.realized_fee(),
        })
    }
}
