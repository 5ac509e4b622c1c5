use alloy::primitives::{
    U256,
    utils::{format_ether, format_units, parse_ether},
};

use crate::{constants::WEI_PER_GWEI, error::EngineError};

/// Lossy conversion for display and score arithmetic only.
pub fn wei_to_ether(amount: U256) -> f64 {
    format_ether(amount).parse::<f64>().unwrap_or(0.0)
}

pub fn fee_to_ether(fee: u128) -> f64 {
    wei_to_ether(U256::from(fee))
}

pub fn wei_to_gwei(amount: u128) -> f64 {
    format_units(U256::from(amount), "gwei")
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.0)
}

pub fn gwei_to_wei(gwei: f64) -> u128 {
    if !gwei.is_finite() || gwei <= 0.0 {
        return 0;
    }
    (gwei * WEI_PER_GWEI as f64).round() as u128
}

pub fn parse_ether_amount(value: &str) -> Result<U256, EngineError> {
    parse_ether(value).map_err(|e| EngineError::ValidationError {
        message: format!("Invalid ether amount {value}: {e}"),
    })
}
