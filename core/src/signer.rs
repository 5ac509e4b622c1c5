use alloy::{
    consensus::{SignableTransaction, Signed, TypedTransaction},
    primitives::Address,
    signers::{Signer, local::PrivateKeySigner},
};

use crate::error::EngineError;

/// An account the engine can act for: an address plus the capability to sign.
pub trait AccountSigner: Send + Sync {
    fn address(&self) -> Address;

    fn sign_transaction(
        &self,
        transaction: TypedTransaction,
    ) -> impl std::future::Future<Output = Result<Signed<TypedTransaction>, EngineError>> + Send;
}

/// Signs with a secp256k1 key held in process memory.
#[derive(Clone, Debug)]
pub struct LocalAccount {
    inner: PrivateKeySigner,
}

impl LocalAccount {
    pub fn new(inner: PrivateKeySigner) -> Self {
        Self { inner }
    }

    pub fn from_private_key(private_key: &str) -> Result<Self, EngineError> {
        let inner = private_key
            .trim()
            .parse::<PrivateKeySigner>()
            .map_err(|e| EngineError::SigningError {
                message: format!("Failed to parse private key: {e}"),
            })?;
        Ok(Self { inner })
    }

    /// First and last four hex characters of the address, for log lines.
    pub fn short_address(&self) -> String {
        short_address(&self.address())
    }
}

impl AccountSigner for LocalAccount {
    fn address(&self) -> Address {
        self.inner.address()
    }

    async fn sign_transaction(
        &self,
        transaction: TypedTransaction,
    ) -> Result<Signed<TypedTransaction>, EngineError> {
        let signature = self
            .inner
            .sign_hash(&transaction.signature_hash())
            .await
            .map_err(|e| EngineError::SigningError {
                message: format!("Failed to sign transaction: {e}"),
            })?;

        Ok(transaction.into_signed(signature))
    }
}

pub fn short_address(address: &Address) -> String {
    let full = address.to_checksum(None);
    format!("{}...{}", &full[..6], &full[full.len() - 4..])
}
