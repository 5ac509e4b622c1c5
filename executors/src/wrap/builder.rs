use alloy::{
    consensus::{Signed, TypedTransaction},
    network::TransactionBuilder as _,
    primitives::U256,
    rpc::types::TransactionRequest,
};
use farm_core::{
    error::EngineError,
    ledger::{Ledger, NonceTag},
    signer::AccountSigner,
    transaction::{Direction, TransactionIntent},
    wrapped,
};
use tokio::time::sleep;

use super::{
    error::{AttemptContext, CycleError},
    settings::WrapSettings,
};

/// A signed wrap transaction plus what went into it.
#[derive(Debug, Clone)]
pub struct BuiltTransaction {
    pub intent: TransactionIntent,
    /// `maxPriorityFee * estimatedGas`, credited when the realized fee is unknown
    pub predicted_fee: u128,
    pub signed: Signed<TypedTransaction>,
}

impl BuiltTransaction {
    pub fn context(&self) -> AttemptContext {
        AttemptContext {
            direction: Some(self.intent.direction),
            nonce: Some(self.intent.nonce),
            transaction_hash: Some(*self.signed.hash()),
            amount: self.intent.amount,
            predicted_fee: self.predicted_fee,
            realized_fee: None,
        }
    }
}

pub struct TransactionBuilder<'a, L, S> {
    ledger: &'a L,
    account: &'a S,
    settings: &'a WrapSettings,
}

impl<'a, L: Ledger, S: AccountSigner> TransactionBuilder<'a, L, S> {
    pub fn new(ledger: &'a L, account: &'a S, settings: &'a WrapSettings) -> Self {
        Self {
            ledger,
            account,
            settings,
        }
    }

    /// Builds and signs the next wrap transaction. `amount_hint` caps the amount
    /// derived from the source balance.
    pub async fn build(
        &self,
        direction: Direction,
        amount_hint: Option<U256>,
    ) -> Result<BuiltTransaction, CycleError> {
        self.settings.validate().map_err(CycleError::configuration)?;

        let mut amount = self.movable_amount(direction).await?;
        if let Some(hint) = amount_hint {
            amount = amount.min(hint);
        }

        let owner = self.account.address();
        let (call_data, value) = wrapped::encode_call(direction, amount);
        let request = TransactionRequest::default()
            .with_from(owner)
            .with_to(self.ledger.wrapped_token())
            .with_value(value)
            .with_input(call_data.clone())
            .with_chain_id(self.ledger.chain_id());

        let not_submitted = |message: String, inner_error: Option<EngineError>| {
            CycleError::NotSubmitted {
                message,
                inner_error,
                context: AttemptContext {
                    direction: Some(direction),
                    amount,
                    ..Default::default()
                },
            }
        };

        let estimated_gas = match self.ledger.estimate_gas(&request).await {
            Ok(gas) => gas,
            Err(e) => {
                let reverted = e
                    .error_response()
                    .is_some_and(|resp| resp.data.is_some() || resp.message.to_lowercase().contains("revert"));
                let message = if reverted {
                    format!("{direction} reverted during gas estimation: {e}")
                } else {
                    format!("Gas estimation failed: {e}")
                };
                return Err(not_submitted(message, Some(e)));
            }
        };
        let gas_limit =
            u64::try_from(estimated_gas as u128 * self.settings.gas_limit_percent as u128 / 100)
                .unwrap_or(u64::MAX);

        let nonce = self
            .ledger
            .transaction_count(owner, NonceTag::Pending)
            .await
            .map_err(|e| not_submitted(format!("Failed to read pending nonce: {e}"), Some(e)))?;

        let max_priority_fee = self.settings.max_priority_fee;
        let max_fee = self.settings.fee_ceiling;

        let typed = request
            .with_nonce(nonce)
            .with_gas_limit(gas_limit)
            .with_max_fee_per_gas(max_fee)
            .with_max_priority_fee_per_gas(max_priority_fee)
            .build_typed_tx()
            .map_err(|e| CycleError::Configuration {
                message: format!("Failed to build typed transaction: {e:?}"),
                inner_error: None,
            })?;

        let signed = self
            .account
            .sign_transaction(typed)
            .await
            .map_err(CycleError::configuration)?;

        let predicted_fee = max_priority_fee.saturating_mul(estimated_gas as u128);

        tracing::debug!(
            direction = %direction,
            nonce = nonce,
            amount = %amount,
            gas_limit = gas_limit,
            predicted_fee = predicted_fee,
            "Built wrap transaction"
        );

        Ok(BuiltTransaction {
            intent: TransactionIntent {
                direction,
                nonce,
                to_contract: self.ledger.wrapped_token(),
                value,
                call_data,
                amount,
                max_priority_fee,
                max_fee,
                gas_limit,
                estimated_gas,
                chain_id: self.ledger.chain_id(),
            },
            predicted_fee,
            signed,
        })
    }

    /// Source balance minus the reserve, retried until it reaches the minimum.
    async fn movable_amount(&self, direction: Direction) -> Result<U256, CycleError> {
        let owner = self.account.address();
        let required = U256::from(self.settings.min_balance);
        let reserve = U256::from(self.settings.reserve());
        let mut last_read: Result<U256, EngineError> = Ok(U256::ZERO);

        for attempt in 0..=self.settings.balance_retry_attempts {
            if attempt > 0 {
                sleep(self.settings.balance_retry_interval).await;
            }

            last_read = match direction {
                Direction::Deposit => self.ledger.native_balance(owner).await,
                Direction::Withdraw => {
                    self.ledger
                        .wrapped_balance(self.ledger.wrapped_token(), owner)
                        .await
                }
            };

            match &last_read {
                Ok(balance) => {
                    let movable = balance.saturating_sub(reserve);
                    if movable >= required {
                        return Ok(movable);
                    }
                    tracing::debug!(
                        attempt = attempt,
                        direction = %direction,
                        balance = %balance,
                        "Source balance below minimum, retrying"
                    );
                }
                Err(e) => {
                    tracing::debug!(attempt = attempt, error = %e, "Balance read failed, retrying");
                }
            }
        }

        match last_read {
            Ok(balance) => Err(CycleError::InsufficientBalance {
                direction,
                available: balance.saturating_sub(reserve),
                required,
            }),
            Err(e) => Err(CycleError::NotSubmitted {
                message: format!("Could not read {direction} source balance: {e}"),
                inner_error: Some(e),
                context: AttemptContext {
                    direction: Some(direction),
                    ..Default::default()
                },
            }),
        }
    }
}
