use std::{collections::HashMap, future::Future, time::Duration};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "errorCode")]
pub enum PriceError {
    #[error("Price request failed: {message}")]
    Http {
        message: String,
        status: Option<u16>,
    },

    #[error("Price response could not be decoded: {message}")]
    Decode { message: String },

    #[error("No USD quote for {asset}")]
    MissingQuote { asset: String },
}

/// Reference USD price of the native asset, used for scoring.
pub trait PriceSource: Send + Sync {
    fn usd_price(&self) -> impl Future<Output = Result<f64, PriceError>> + Send;
}

/// Always answers with the same price.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedPrice(pub f64);

impl PriceSource for FixedPrice {
    async fn usd_price(&self) -> Result<f64, PriceError> {
        Ok(self.0)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CoingeckoConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_asset_id")]
    pub asset_id: String,
    /// Sent as `x-cg-demo-api-key` when present
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.coingecko.com/api/v3".to_string()
}

fn default_asset_id() -> String {
    "ethereum".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for CoingeckoConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            asset_id: default_asset_id(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CoingeckoPriceSource {
    client: reqwest::Client,
    config: CoingeckoConfig,
}

impl CoingeckoPriceSource {
    pub fn new(config: CoingeckoConfig) -> Result<Self, PriceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PriceError::Http {
                message: format!("Failed to build HTTP client: {e}"),
                status: None,
            })?;
        Ok(Self { client, config })
    }
}

/// `{"ethereum": {"usd": 3012.4}}`
type SimplePriceResponse = HashMap<String, HashMap<String, f64>>;

fn extract_usd(response: &SimplePriceResponse, asset: &str) -> Result<f64, PriceError> {
    response
        .get(asset)
        .and_then(|quotes| quotes.get("usd"))
        .copied()
        .filter(|price| price.is_finite() && *price > 0.0)
        .ok_or_else(|| PriceError::MissingQuote {
            asset: asset.to_string(),
        })
}

impl PriceSource for CoingeckoPriceSource {
    async fn usd_price(&self) -> Result<f64, PriceError> {
        let url = format!("{}/simple/price", self.config.base_url.trim_end_matches('/'));

        let mut request = self
            .client
            .get(url)
            .query(&[("ids", self.config.asset_id.as_str()), ("vs_currencies", "usd")])
            .header("accept", "application/json");
        if let Some(key) = &self.config.api_key {
            request = request.header("x-cg-demo-api-key", key);
        }

        let response = request.send().await.map_err(|e| PriceError::Http {
            message: e.to_string(),
            status: e.status().map(|s| s.as_u16()),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PriceError::Http {
                message: format!("unexpected status {status}"),
                status: Some(status.as_u16()),
            });
        }

        let body: SimplePriceResponse = response.json().await.map_err(|e| PriceError::Decode {
            message: e.to_string(),
        })?;

        extract_usd(&body, &self.config.asset_id)
    }
}

/// Fetches the price, logging and substituting `fallback` on any failure.
pub async fn usd_price_or<P: PriceSource>(source: &P, fallback: f64) -> f64 {
    match source.usd_price().await {
        Ok(price) => price,
        Err(e) => {
            tracing::warn!(error = %e, fallback = fallback, "Using fallback USD price");
            fallback
        }
    }
}
