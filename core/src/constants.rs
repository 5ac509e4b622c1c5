use alloy::primitives::{Address, address};

pub const MAINNET_CHAIN_ID: u64 = 167000;
pub const TESTNET_CHAIN_ID: u64 = 167009;

pub const MAINNET_WRAPPED_TOKEN: Address = address!("0xA51894664A773981C6C112C43ce576f315d5b1B6");

pub const TESTNET_WRAPPED_TOKEN: Address = address!("0xae2C46ddb314B9Ba743C6dEE4878F151881333D9");

pub const DEFAULT_RPC_URL: &str = "https://rpc.hekla.taiko.xyz";

/// Substrings of an RPC URL that mark it as a testnet endpoint.
pub const TESTNET_URL_MARKERS: [&str; 2] = ["hekla", "testnet"];

/// Gas consumed by a plain value transfer with no calldata.
pub const TRANSFER_GAS_LIMIT: u64 = 21_000;

pub const WEI_PER_GWEI: u128 = 1_000_000_000;
