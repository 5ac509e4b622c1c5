use std::time::Duration;

use farm_core::{constants::TRANSFER_GAS_LIMIT, error::EngineError};
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, DurationSecondsWithFrac, PickFirst, serde_as};

/// Every tunable the engine reads. Passed explicitly into each component.
///
/// Amounts are in wei. Durations are fractional seconds when deserialised.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WrapSettings {
    /// Hard cap on `maxFeePerGas`, and the threshold the sampler tries to get under
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub fee_ceiling: u128,
    /// Fixed tip attached to every wrap transaction
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub max_priority_fee: u128,
    /// Floor applied to the sampled price
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub min_gas_price: u128,
    /// Substituted when the sampler has nothing usable
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub fallback_gas_price: u128,

    /// Minimum native balance the account should hold; half of it is always reserved
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub min_balance: u128,

    /// Gas limit as a percentage of the node's estimate
    pub gas_limit_percent: u64,

    pub cancel_markup_percent: u128,
    pub cancel_gas_limit: u64,
    /// Consecutive unresolved failures before a cancellation is issued
    pub cancel_after_failures: u32,
    /// Consecutive cycles that never reached the mempool before the loop gives up
    pub max_unsent_cycles: u32,

    /// Score at which the loop starts looking for a clean exit
    pub score_target: u64,
    pub score_multiplier: f64,
    pub fallback_usd_price: f64,

    pub balance_retry_attempts: u32,
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub balance_retry_interval: Duration,

    pub preflight_attempts: u32,
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub preflight_interval: Duration,

    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub sample_interval: Duration,
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub sample_window: Duration,

    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub submission_timeout: Duration,
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub receipt_poll_interval: Duration,

    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub finality_poll_interval: Duration,
    pub finality_max_polls: u32,

    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub settle_poll_interval: Duration,
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub settle_timeout: Duration,

    /// Wait before re-reading the nonce after an ambiguous outcome
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub ambiguity_grace: Duration,
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub unsent_retry_interval: Duration,
    /// Pause between deciding a direction and building the transaction
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub cycle_pause: Duration,
}

impl Default for WrapSettings {
    fn default() -> Self {
        Self {
            fee_ceiling: 200_000_002,
            max_priority_fee: 100_000,
            min_gas_price: 20_000_000,
            fallback_gas_price: 20_000_002,
            min_balance: 400_000_000_000_000,
            gas_limit_percent: 150,
            cancel_markup_percent: 150,
            cancel_gas_limit: TRANSFER_GAS_LIMIT,
            cancel_after_failures: 5,
            max_unsent_cycles: 10,
            score_target: 0,
            score_multiplier: 1.5,
            fallback_usd_price: 3000.0,
            balance_retry_attempts: 5,
            balance_retry_interval: Duration::from_secs(3),
            preflight_attempts: 5,
            preflight_interval: Duration::from_secs(10),
            sample_interval: Duration::from_millis(700),
            sample_window: Duration::from_secs(10),
            submission_timeout: Duration::from_secs(180),
            receipt_poll_interval: Duration::from_secs(1),
            finality_poll_interval: Duration::from_secs(3),
            finality_max_polls: 20,
            settle_poll_interval: Duration::from_millis(1500),
            settle_timeout: Duration::from_secs(120),
            ambiguity_grace: Duration::from_secs(10),
            unsent_retry_interval: Duration::from_secs(10),
            cycle_pause: Duration::from_secs(5),
        }
    }
}

impl WrapSettings {
    /// Half of the minimum balance stays behind on every move.
    pub fn reserve(&self) -> u128 {
        self.min_balance / 2
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.max_priority_fee > self.fee_ceiling {
            return Err(EngineError::ValidationError {
                message: format!(
                    "max priority fee {} exceeds fee ceiling {}",
                    self.max_priority_fee, self.fee_ceiling
                ),
            });
        }
        if self.gas_limit_percent < 100 {
            return Err(EngineError::ValidationError {
                message: format!(
                    "gas limit percent {} would undercut the estimate",
                    self.gas_limit_percent
                ),
            });
        }
        if self.sample_interval.is_zero()
            || self.receipt_poll_interval.is_zero()
            || self.finality_poll_interval.is_zero()
            || self.settle_poll_interval.is_zero()
        {
            return Err(EngineError::ValidationError {
                message: "polling intervals must be non-zero".to_string(),
            });
        }
        Ok(())
    }
}
