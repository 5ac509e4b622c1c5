use std::{env, path::Path};

use anyhow::Context;
use config::{Config, File};
use farm_core::chain::FarmChainConfig;
use farm_executors::{price::CoingeckoConfig, vote::VoteSettings, wrap::WrapSettings};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct FarmerConfig {
    #[serde(default)]
    pub chain: FarmChainConfig,
    #[serde(default)]
    pub wrap: WrapSettings,
    #[serde(default)]
    pub vote: VoteSettings,
    #[serde(default)]
    pub price: CoingeckoConfig,
    pub wallet: WalletConfig,
    #[serde(default)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WalletConfig {
    /// Hex secp256k1 keys, processed richest account first
    #[serde(default)]
    pub private_keys: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

pub fn get_config() -> anyhow::Result<FarmerConfig> {
    let base_path = env::current_dir().context("Failed to determine the current directory")?;
    let configuration_directory = base_path.join("configuration");

    // Detect the running environment
    let environment: Environment = env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(anyhow::Error::msg)?;

    load_config(&configuration_directory, environment)
}

/// Base file, then the environment file, then `APP__*` variables.
pub fn load_config(directory: &Path, environment: Environment) -> anyhow::Result<FarmerConfig> {
    let environment_filename = format!("farmer_{}.yaml", environment.as_str());

    let config = Config::builder()
        .add_source(File::from(directory.join("farmer_base.yaml")))
        .add_source(File::from(directory.join(environment_filename)).required(false))
        .add_source(
            config::Environment::with_prefix("app")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("wallet.private_keys")
                .with_list_parse_key("vote.eligible_suffixes")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    config.try_deserialize::<FarmerConfig>().context(
        "Failed to deserialize configuration; check the configuration files and APP__ variables",
    )
}

/// The possible runtime environment for our application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Local,
    Development,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "development" => Ok(Self::Development),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `local`, `development`, or `production`.",
                other
            )),
        }
    }
}
