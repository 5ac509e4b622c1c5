use farm_core::{ledger::Ledger, transaction::GasQuote};
use tokio::time::{Instant, sleep};

use super::settings::WrapSettings;

/// Lowest and second-lowest prices seen during a sampling window.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PriceWindow {
    lowest: Option<u128>,
    second_lowest: Option<u128>,
}

impl PriceWindow {
    pub fn observe(&mut self, price: u128) {
        match self.lowest {
            None => self.lowest = Some(price),
            Some(lowest) if price < lowest => {
                self.second_lowest = Some(lowest);
                self.lowest = Some(price);
            }
            Some(_) => {
                if self.second_lowest.is_none_or(|second| price < second) {
                    self.second_lowest = Some(price);
                }
            }
        }
    }

    /// Midpoint between the two lowest observations. With a single observation
    /// that observation is returned as is.
    pub fn estimate(&self) -> Option<u128> {
        let lowest = self.lowest?;
        let second = self.second_lowest.unwrap_or(lowest);
        Some(lowest + (second - lowest) / 2)
    }
}

pub struct GasPriceSampler<'a, L> {
    ledger: &'a L,
    settings: &'a WrapSettings,
}

impl<'a, L: Ledger> GasPriceSampler<'a, L> {
    pub fn new(ledger: &'a L, settings: &'a WrapSettings) -> Self {
        Self { ledger, settings }
    }

    /// Polls the node's gas price until one is at or below `ceiling`, or the
    /// window closes. `None` means every read failed.
    pub async fn sample(&self, ceiling: u128) -> Option<u128> {
        let deadline = Instant::now() + self.settings.sample_window;
        let mut window = PriceWindow::default();

        loop {
            match self.ledger.gas_price().await {
                Ok(price) if price <= ceiling => {
                    tracing::debug!(price = price, ceiling = ceiling, "Gas price under ceiling");
                    return Some(price);
                }
                Ok(price) => window.observe(price),
                Err(e) => tracing::debug!(error = %e, "Gas price read failed, skipping sample"),
            }

            if Instant::now() + self.settings.sample_interval > deadline {
                break;
            }
            sleep(self.settings.sample_interval).await;
        }

        let estimate = window.estimate();
        tracing::debug!(
            estimate = ?estimate,
            ceiling = ceiling,
            "Gas price never reached ceiling during window"
        );
        estimate
    }

    /// Samples against the configured ceiling and applies the fallback and floor.
    pub async fn quote(&self) -> GasQuote {
        let sampled = self.sample(self.settings.fee_ceiling).await;
        GasQuote::new(resolve_price(sampled, self.settings))
    }
}

/// A null or zero sample is unknown; substitute the fallback, then apply the floor.
pub fn resolve_price(sampled: Option<u128>, settings: &WrapSettings) -> u128 {
    let price = match sampled {
        Some(price) if price > 0 => price,
        _ => settings.fallback_gas_price,
    };
    price.max(settings.min_gas_price)
}
