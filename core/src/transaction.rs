use alloy::primitives::{Address, Bytes, TxHash, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};

/// Which way value moves through the wrapping contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    /// Native balance into the wrapped token
    Deposit,
    /// Wrapped token back into native balance
    Withdraw,
}

impl Direction {
    pub fn complement(self) -> Self {
        match self {
            Direction::Deposit => Direction::Withdraw,
            Direction::Withdraw => Direction::Deposit,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Deposit => write!(f, "deposit"),
            Direction::Withdraw => write!(f, "withdraw"),
        }
    }
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasQuote {
    #[serde_as(as = "DisplayFromStr")]
    pub price: u128,
    pub sampled_at: DateTime<Utc>,
}

impl GasQuote {
    pub fn new(price: u128) -> Self {
        Self {
            price,
            sampled_at: Utc::now(),
        }
    }
}

/// A priced, not yet signed, state-changing call against the wrapping contract.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionIntent {
    pub direction: Direction,
    pub nonce: u64,
    pub to_contract: Address,
    /// Native value attached to the call; zero for withdrawals
    pub value: U256,
    pub call_data: Bytes,
    /// Amount of value this intent moves, whichever side it is carried on
    pub amount: U256,
    #[serde_as(as = "DisplayFromStr")]
    pub max_priority_fee: u128,
    #[serde_as(as = "DisplayFromStr")]
    pub max_fee: u128,
    pub gas_limit: u64,
    pub estimated_gas: u64,
    pub chain_id: u64,
}

/// A receipt as reported by the ledger. Every field is optional so that partial
/// data from a lagging node is visible to the caller instead of reading as zero.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerReceipt {
    pub transaction_hash: Option<TxHash>,
    pub block_number: Option<u64>,
    pub gas_used: Option<u64>,
    pub effective_gas_price: Option<u128>,
    pub status: Option<bool>,
}

impl LedgerReceipt {
    /// `gasUsed * effectiveGasPrice`, when both are present and non-zero.
    pub fn realized_fee(&self) -> Option<u128> {
        match (self.gas_used, self.effective_gas_price) {
            (Some(gas_used), Some(price)) if gas_used > 0 && price > 0 => {
                Some((gas_used as u128).saturating_mul(price))
            }
            _ => None,
        }
    }

    pub fn reverted(&self) -> bool {
        self.status == Some(false)
    }
}

/// Where a credited fee came from.
#[serde_as]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "source")]
pub enum FeeSource {
    /// Read from a finalized receipt
    Realized {
        #[serde_as(as = "DisplayFromStr")]
        amount: u128,
    },
    /// Pre-submission upper bound, used when the receipt could not be read
    Predicted {
        #[serde_as(as = "DisplayFromStr")]
        amount: u128,
    },
}

impl FeeSource {
    pub fn amount(&self) -> u128 {
        match self {
            FeeSource::Realized { amount } | FeeSource::Predicted { amount } => *amount,
        }
    }
}
