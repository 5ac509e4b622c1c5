use alloy::{
    primitives::Address,
    transports::{RpcError as AlloyRpcError, TransportErrorKind},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chain::Chain;

#[derive(Debug, Error, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RpcErrorKind {
    /// Server returned an error response.
    #[error("server returned an error response: {}", .0.as_display())]
    ErrorResp(RpcErrorResponse),

    /// Server returned a null response when a non-null response was expected.
    #[error("server returned a null response when a non-null response was expected")]
    NullResp,

    #[error("unsupported feature: {message}")]
    UnsupportedFeature { message: String },

    /// A local pre-processing step failed before anything was sent.
    #[error("local usage error: {message}")]
    InternalError { message: String },

    #[error("serialization error: {message}")]
    SerError { message: String },

    #[error("deserialization error: {message}, text: {text}")]
    DeserError { message: String, text: String },

    #[error("HTTP error {status}")]
    TransportHttpError { status: u16, body: String },

    #[error("Other transport error: {message}")]
    OtherTransportError { message: String },
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RpcErrorResponse {
    pub code: i64,
    pub message: String,
    pub data: Option<String>,
}

impl RpcErrorResponse {
    pub fn as_display(&self) -> String {
        format!(
            "code {}: {}{}",
            self.code,
            self.message,
            self.data
                .as_ref()
                .map(|data| format!(", data: {data}"))
                .unwrap_or_default()
        )
    }
}

#[derive(Debug, Error, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContractInteractionErrorKind {
    #[error("unknown function: function {function_name} does not exist")]
    UnknownFunction {
        #[serde(rename = "functionName")]
        function_name: String,
    },

    #[error("unknown function: function with selector {function_selector} does not exist")]
    UnknownSelector {
        #[serde(rename = "functionSelector")]
        function_selector: String,
    },

    #[error("transaction is not a deployment transaction")]
    NotADeploymentTransaction,

    #[error("missing `contractAddress` from deployment transaction receipt")]
    ContractNotDeployed,

    /// The contract returned no data.
    #[error(
        "contract call to `{function}` returned no data (\"0x\"); the called address might not be a contract"
    )]
    ZeroData { function: String, message: String },

    #[error("ABI error: {message}")]
    AbiError { message: String },

    #[error("transport error: {message}")]
    TransportError { message: String },

    #[error("pending transaction error: {message}")]
    PendingTransactionError { message: String },
}

#[derive(Error, Debug, Serialize, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "type")]
pub enum EngineError {
    #[error("RPC error on chain {chain_id} at {rpc_url}: {message}")]
    RpcError {
        chain_id: u64,
        rpc_url: String,
        message: String,
        kind: RpcErrorKind,
    },

    #[error("Bad RPC configuration: {message}")]
    RpcConfigError { message: String },

    #[error("Contract interaction error: {message}")]
    #[serde(rename_all = "camelCase")]
    ContractInteractionError {
        contract_address: Option<Address>,
        chain_id: u64,
        message: String,
        kind: ContractInteractionErrorKind,
    },

    #[error("Validation error: {message}")]
    ValidationError { message: String },

    #[error("Signing error: {message}")]
    SigningError { message: String },
}

impl EngineError {
    /// The JSON-RPC error payload returned by the node, if this error carries one.
    pub fn error_response(&self) -> Option<&RpcErrorResponse> {
        match self {
            EngineError::RpcError {
                kind: RpcErrorKind::ErrorResp(resp),
                ..
            } => Some(resp),
            _ => None,
        }
    }

    pub fn rpc_kind(&self) -> Option<&RpcErrorKind> {
        match self {
            EngineError::RpcError { kind, .. } => Some(kind),
            _ => None,
        }
    }
}

pub trait AlloyRpcErrorToEngineError {
    fn to_engine_error(&self, chain: &impl Chain) -> EngineError;
}

fn to_engine_rpc_error_kind(err: &AlloyRpcError<TransportErrorKind>) -> RpcErrorKind {
    match err {
        AlloyRpcError::ErrorResp(err) => RpcErrorKind::ErrorResp(RpcErrorResponse {
            code: err.code,
            message: err.message.to_string(),
            data: err.data.as_ref().map(|data| data.to_string()),
        }),
        AlloyRpcError::NullResp => RpcErrorKind::NullResp,
        AlloyRpcError::UnsupportedFeature(feature) => RpcErrorKind::UnsupportedFeature {
            message: feature.to_string(),
        },
        AlloyRpcError::LocalUsageError(err) => RpcErrorKind::InternalError {
            message: err.to_string(),
        },
        AlloyRpcError::SerError(err) => RpcErrorKind::SerError {
            message: err.to_string(),
        },
        AlloyRpcError::DeserError { err, text } => RpcErrorKind::DeserError {
            message: err.to_string(),
            text: text.to_string(),
        },
        AlloyRpcError::Transport(err) => match err {
            TransportErrorKind::HttpError(err) => RpcErrorKind::TransportHttpError {
                status: err.status,
                body: err.body.to_string(),
            },
            _ => RpcErrorKind::OtherTransportError {
                message: err.to_string(),
            },
        },
    }
}

impl AlloyRpcErrorToEngineError for AlloyRpcError<TransportErrorKind> {
    fn to_engine_error(&self, chain: &impl Chain) -> EngineError {
        EngineError::RpcError {
            chain_id: chain.chain_id(),
            rpc_url: chain.rpc_url().to_string(),
            message: self.to_string(),
            kind: to_engine_rpc_error_kind(self),
        }
    }
}

pub trait ContractErrorToEngineError {
    fn to_engine_error(self, chain_id: u64, contract_address: Option<Address>) -> EngineError;
}

impl ContractErrorToEngineError for alloy::contract::Error {
    fn to_engine_error(self, chain_id: u64, contract_address: Option<Address>) -> EngineError {
        let (message, kind) = match self {
            alloy::contract::Error::UnknownFunction(name) => (
                format!("Unknown function: {name}"),
                ContractInteractionErrorKind::UnknownFunction {
                    function_name: name,
                },
            ),
            alloy::contract::Error::UnknownSelector(selector) => (
                format!("Unknown selector: {selector:?}"),
                ContractInteractionErrorKind::UnknownSelector {
                    function_selector: format!("{selector:?}"),
                },
            ),
            alloy::contract::Error::NotADeploymentTransaction => (
                "Transaction is not a deployment transaction".to_string(),
                ContractInteractionErrorKind::NotADeploymentTransaction,
            ),
            alloy::contract::Error::ContractNotDeployed => (
                "Contract not deployed - missing contractAddress in receipt".to_string(),
                ContractInteractionErrorKind::ContractNotDeployed,
            ),
            alloy::contract::Error::ZeroData(function, err) => (
                format!("Zero data returned from contract call to {function}"),
                ContractInteractionErrorKind::ZeroData {
                    function,
                    message: err.to_string(),
                },
            ),
            alloy::contract::Error::AbiError(err) => (
                format!("ABI error: {err}"),
                ContractInteractionErrorKind::AbiError {
                    message: err.to_string(),
                },
            ),
            alloy::contract::Error::TransportError(err) => (
                format!("Transport error: {err}"),
                ContractInteractionErrorKind::TransportError {
                    message: err.to_string(),
                },
            ),
            alloy::contract::Error::PendingTransactionError(err) => (
                format!("Pending transaction error: {err}"),
                ContractInteractionErrorKind::PendingTransactionError {
                    message: err.to_string(),
                },
            ),
        };

        EngineError::ContractInteractionError {
            contract_address,
            chain_id,
            message,
            kind,
        }
    }
}
