use alloy::{
    primitives::Address,
    providers::{ProviderBuilder, RootProvider},
    transports::http::reqwest::Url,
};
use serde::{Deserialize, Serialize};

use crate::{
    constants::{
        DEFAULT_RPC_URL, MAINNET_CHAIN_ID, MAINNET_WRAPPED_TOKEN, TESTNET_CHAIN_ID,
        TESTNET_URL_MARKERS, TESTNET_WRAPPED_TOKEN,
    },
    error::EngineError,
};

pub trait Chain: Send + Sync {
    fn chain_id(&self) -> u64;
    fn rpc_url(&self) -> Url;

    /// Address of the wrapping contract that backs deposit and withdraw.
    fn wrapped_token(&self) -> Address;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
}

impl Network {
    pub fn detect(rpc_url: &str) -> Self {
        let lowered = rpc_url.to_lowercase();
        if TESTNET_URL_MARKERS
            .iter()
            .any(|marker| lowered.contains(marker))
        {
            Network::Testnet
        } else {
            Network::Mainnet
        }
    }

    pub fn chain_id(&self) -> u64 {
        match self {
            Network::Mainnet => MAINNET_CHAIN_ID,
            Network::Testnet => TESTNET_CHAIN_ID,
        }
    }

    pub fn wrapped_token(&self) -> Address {
        match self {
            Network::Mainnet => MAINNET_WRAPPED_TOKEN,
            Network::Testnet => TESTNET_WRAPPED_TOKEN,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FarmChainConfig {
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// Overrides the chain id inferred from the RPC URL
    #[serde(default)]
    pub chain_id: Option<u64>,

    /// Overrides the wrapped token inferred from the RPC URL
    #[serde(default)]
    pub wrapped_token: Option<Address>,
}

fn default_rpc_url() -> String {
    DEFAULT_RPC_URL.to_string()
}

impl Default for FarmChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            chain_id: None,
            wrapped_token: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct FarmChain {
    chain_id: u64,
    rpc_url: Url,
    wrapped_token: Address,
    network: Network,

    pub provider: RootProvider,
}

impl FarmChain {
    pub fn provider(&self) -> &RootProvider {
        &self.provider
    }

    pub fn network(&self) -> Network {
        self.network
    }
}

impl Chain for FarmChain {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn rpc_url(&self) -> Url {
        self.rpc_url.clone()
    }

    fn wrapped_token(&self) -> Address {
        self.wrapped_token
    }
}

impl FarmChainConfig {
    pub fn to_chain(&self) -> Result<FarmChain, EngineError> {
        let rpc_url = Url::parse(&self.rpc_url).map_err(|e| EngineError::RpcConfigError {
            message: format!("Failed to parse RPC URL {}: {e}", self.rpc_url),
        })?;

        let network = Network::detect(&self.rpc_url);
        let chain_id = self.chain_id.unwrap_or_else(|| network.chain_id());
        let wrapped_token = self
            .wrapped_token
            .unwrap_or_else(|| network.wrapped_token());

        tracing::debug!(
            chain_id = chain_id,
            network = ?network,
            wrapped_token = %wrapped_token,
            "Resolved chain configuration"
        );

        Ok(FarmChain {
            chain_id,
            wrapped_token,
            network,
            provider: ProviderBuilder::new()
                .disable_recommended_fillers()
                .connect_http(rpc_url.clone()),
            rpc_url,
        })
    }
}
