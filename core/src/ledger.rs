use std::future::Future;

use alloy::{
    consensus::TxEnvelope,
    network::ReceiptResponse,
    primitives::{Address, TxHash, U256},
    providers::Provider,
    rpc::types::TransactionRequest,
};
use serde::{Deserialize, Serialize};

use crate::{
    chain::{Chain, FarmChain},
    error::{AlloyRpcErrorToEngineError, ContractErrorToEngineError, EngineError},
    transaction::LedgerReceipt,
    wrapped::IWrappedNative,
};

/// Which view of the account nonce to read.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NonceTag {
    /// Count of confirmed transactions
    Latest,
    /// Count including transactions still sitting in the mempool
    Pending,
}

/// Everything the engine needs from the node. All calls are read-only except
/// `send_transaction`.
pub trait Ledger: Chain {
    fn native_balance(
        &self,
        owner: Address,
    ) -> impl Future<Output = Result<U256, EngineError>> + Send;

    fn wrapped_balance(
        &self,
        token: Address,
        owner: Address,
    ) -> impl Future<Output = Result<U256, EngineError>> + Send;

    fn transaction_count(
        &self,
        owner: Address,
        tag: NonceTag,
    ) -> impl Future<Output = Result<u64, EngineError>> + Send;

    fn gas_price(&self) -> impl Future<Output = Result<u128, EngineError>> + Send;

    fn block_number(&self) -> impl Future<Output = Result<u64, EngineError>> + Send;

    fn estimate_gas(
        &self,
        request: &TransactionRequest,
    ) -> impl Future<Output = Result<u64, EngineError>> + Send;

    fn send_transaction(
        &self,
        envelope: TxEnvelope,
    ) -> impl Future<Output = Result<TxHash, EngineError>> + Send;

    fn transaction_receipt(
        &self,
        hash: TxHash,
    ) -> impl Future<Output = Result<Option<LedgerReceipt>, EngineError>> + Send;
}

impl Ledger for FarmChain {
    async fn native_balance(&self, owner: Address) -> Result<U256, EngineError> {
        self.provider()
            .get_balance(owner)
            .await
            .map_err(|e| e.to_engine_error(self))
    }

    async fn wrapped_balance(&self, token: Address, owner: Address) -> Result<U256, EngineError> {
        IWrappedNative::new(token, self.provider().clone())
            .balanceOf(owner)
            .call()
            .await
            .map_err(|e| e.to_engine_error(self.chain_id(), Some(token)))
    }

    async fn transaction_count(&self, owner: Address, tag: NonceTag) -> Result<u64, EngineError> {
        let request = self.provider().get_transaction_count(owner);
        let result = match tag {
            NonceTag::Latest => request.latest().await,
            NonceTag::Pending => request.pending().await,
        };
        result.map_err(|e| e.to_engine_error(self))
    }

    async fn gas_price(&self) -> Result<u128, EngineError> {
        self.provider()
            .get_gas_price()
            .await
            .map_err(|e| e.to_engine_error(self))
    }

    async fn block_number(&self) -> Result<u64, EngineError> {
        self.provider()
            .get_block_number()
            .await
            .map_err(|e| e.to_engine_error(self))
    }

    async fn estimate_gas(&self, request: &TransactionRequest) -> Result<u64, EngineError> {
        self.provider()
            .estimate_gas(request.clone())
            .await
            .map_err(|e| e.to_engine_error(self))
    }

    async fn send_transaction(&self, envelope: TxEnvelope) -> Result<TxHash, EngineError> {
        self.provider()
            .send_tx_envelope(envelope)
            .await
            .map(|pending| *pending.tx_hash())
            .map_err(|e| e.to_engine_error(self))
    }

    async fn transaction_receipt(&self, hash: TxHash) -> Result<Option<LedgerReceipt>, EngineError> {
        let receipt = self
            .provider()
            .get_transaction_receipt(hash)
            .await
            .map_err(|e| e.to_engine_error(self))?;

        Ok(receipt.map(|receipt| LedgerReceipt {
            transaction_hash: Some(receipt.transaction_hash()),
            block_number: receipt.block_number(),
            gas_used: Some(receipt.gas_used()),
            effective_gas_price: Some(receipt.effective_gas_price()),
            status: Some(receipt.status()),
        }))
    }
}
