use alloy::primitives::{TxHash, U256};
use farm_core::{
    error::{EngineError, RpcErrorKind},
    transaction::{Direction, FeeSource},
};
use serde::{Deserialize, Serialize};

/// What was known about an attempt when it stopped making progress.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AttemptContext {
    pub direction: Option<Direction>,
    pub nonce: Option<u64>,
    pub transaction_hash: Option<TxHash>,
    pub amount: U256,
    pub predicted_fee: u128,
    pub realized_fee: Option<u128>,
}

impl AttemptContext {
    /// The best fee figure available: realized if the receipt gave one, else predicted.
    pub fn known_fee(&self) -> FeeSource {
        match self.realized_fee {
            Some(amount) => FeeSource::Realized { amount },
            None => FeeSource::Predicted {
                amount: self.predicted_fee,
            },
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, thiserror::Error, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "errorCode")]
pub enum CycleError {
    #[error("Insufficient {direction} balance: {available} < {required} wei")]
    InsufficientBalance {
        direction: Direction,
        available: U256,
        required: U256,
    },

    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        inner_error: Option<EngineError>,
    },

    #[error("Transaction was not submitted: {message}")]
    NotSubmitted {
        message: String,
        inner_error: Option<EngineError>,
        context: AttemptContext,
    },

    #[error("Node rejected transaction: {message}")]
    SubmissionRejected {
        message: String,
        inner_error: EngineError,
        context: AttemptContext,
    },

    #[error("No receipt within {timeout_secs}s of submission")]
    SubmissionTimeout {
        timeout_secs: u64,
        context: AttemptContext,
    },

    #[error("Invalid receipt: {message}")]
    InvalidReceipt {
        message: String,
        context: AttemptContext,
    },

    #[error("Finality not observed after {polls} polls")]
    FinalityTimeout { polls: u32, context: AttemptContext },

    #[error("Destination balance did not settle within {timeout_secs}s")]
    SettlementTimeout {
        timeout_secs: u64,
        context: AttemptContext,
    },

    #[error("Transaction reverted on chain")]
    Reverted { context: AttemptContext },

    #[error("Cancellation failed: {message}")]
    CancellationFailed {
        message: String,
        inner_error: Option<EngineError>,
    },
}

/// How the rebalance loop must react to a failed cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Outcome unknown; resolved by reading the nonce
    Ambiguous,
    /// Nothing reached the mempool; retried after a backoff
    NotSubmitted,
    /// Nonce slot and fee were consumed, nothing moved
    Reverted,
    /// Halts the account's loop
    Fatal,
}

impl CycleError {
    pub fn class(&self) -> FailureClass {
        match self {
            CycleError::InsufficientBalance { .. } | CycleError::Configuration { .. } => {
                FailureClass::Fatal
            }
            CycleError::Reverted { .. } => FailureClass::Reverted,
            CycleError::NotSubmitted { .. }
            | CycleError::SubmissionRejected { .. }
            | CycleError::CancellationFailed { .. } => FailureClass::NotSubmitted,
            CycleError::SubmissionTimeout { .. }
            | CycleError::InvalidReceipt { .. }
            | CycleError::FinalityTimeout { .. }
            | CycleError::SettlementTimeout { .. } => FailureClass::Ambiguous,
        }
    }

    pub fn context(&self) -> Option<&AttemptContext> {
        match self {
            CycleError::NotSubmitted { context, .. }
            | CycleError::SubmissionRejected { context, .. }
            | CycleError::SubmissionTimeout { context, .. }
            | CycleError::InvalidReceipt { context, .. }
            | CycleError::FinalityTimeout { context, .. }
            | CycleError::SettlementTimeout { context, .. }
            | CycleError::Reverted { context } => Some(context),
            _ => None,
        }
    }

    pub fn configuration(error: EngineError) -> Self {
        CycleError::Configuration {
            message: error.to_string(),
            inner_error: Some(error),
        }
    }
}

// ========== SEND ERROR CLASSIFICATION ==========
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendErrorClassification {
    PossiblySent,         // "nonce too low", "already known" etc
    DeterministicFailure, // invalid signature, insufficient funds etc
}

/// Decides whether a failed broadcast may still have reached the mempool.
#[tracing::instrument(skip_all, fields(error = %error))]
pub fn classify_send_error(error: &EngineError) -> SendErrorClassification {
    let Some(response) = error.error_response() else {
        return match error.rpc_kind() {
            // The request may have been delivered before the connection dropped
            Some(RpcErrorKind::OtherTransportError { .. }) | Some(RpcErrorKind::NullResp) => {
                SendErrorClassification::PossiblySent
            }
            _ => SendErrorClassification::DeterministicFailure,
        };
    };

    let message = response.message.to_lowercase();

    if message.contains("invalid signature")
        || message.contains("insufficient funds")
        || message.contains("nonce too high")
        || message.contains("invalid transaction format")
    {
        return SendErrorClassification::DeterministicFailure;
    }

    if message.contains("nonce too low")
        || message.contains("already known")
        || message.contains("replacement transaction underpriced")
        || message.contains("transaction already imported")
    {
        return SendErrorClassification::PossiblySent;
    }

    if message.contains("malformed")
        || message.contains("gas limit")
        || message.contains("intrinsic gas too low")
        || message.contains("oversized")
        || message.contains("max fee per gas less than block base fee")
    {
        return SendErrorClassification::DeterministicFailure;
    }

    tracing::warn!(message = %message, "Unclassified send error, assuming possibly sent");
    SendErrorClassification::PossiblySent
}
