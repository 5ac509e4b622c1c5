use alloy::{
    consensus::{Signed, TxEnvelope, TypedTransaction},
    primitives::TxHash,
};
use farm_core::{error::EngineError, ledger::Ledger, transaction::LedgerReceipt};
use tokio::time::{sleep, timeout};

use super::{
    error::{AttemptContext, CycleError, SendErrorClassification, classify_send_error},
    settings::WrapSettings,
};

/// Broadcasts a signed transaction and waits, under a hard deadline, for the
/// node to report a receipt for it.
pub struct Submitter<'a, L> {
    ledger: &'a L,
    settings: &'a WrapSettings,
}

impl<'a, L: Ledger> Submitter<'a, L> {
    pub fn new(ledger: &'a L, settings: &'a WrapSettings) -> Self {
        Self { ledger, settings }
    }

    /// On `SubmissionTimeout` the transaction may still be pending or mined later.
    #[tracing::instrument(skip_all, fields(nonce = ?context.nonce, tx_hash = tracing::field::Empty))]
    pub async fn submit(
        &self,
        signed: Signed<TypedTransaction>,
        mut context: AttemptContext,
    ) -> Result<LedgerReceipt, CycleError> {
        let hash = *signed.hash();
        context.transaction_hash = Some(hash);
        tracing::Span::current().record("tx_hash", tracing::field::display(hash));

        let envelope: TxEnvelope = signed.into();

        match timeout(
            self.settings.submission_timeout,
            self.broadcast_and_wait(envelope, hash),
        )
        .await
        {
            Ok(Ok(receipt)) => Ok(receipt),
            Ok(Err(e)) => Err(CycleError::SubmissionRejected {
                message: e.to_string(),
                inner_error: e,
                context,
            }),
            Err(_) => {
                tracing::warn!(
                    timeout_secs = self.settings.submission_timeout.as_secs(),
                    "No receipt before submission deadline"
                );
                Err(CycleError::SubmissionTimeout {
                    timeout_secs: self.settings.submission_timeout.as_secs(),
                    context,
                })
            }
        }
    }

    async fn broadcast_and_wait(
        &self,
        envelope: TxEnvelope,
        hash: TxHash,
    ) -> Result<LedgerReceipt, EngineError> {
        match self.ledger.send_transaction(envelope).await {
            Ok(sent) => {
                if sent != hash {
                    tracing::warn!(sent = %sent, expected = %hash, "Node returned unexpected hash");
                }
                tracing::info!("Transaction broadcast");
            }
            Err(e) => match classify_send_error(&e) {
                SendErrorClassification::DeterministicFailure => return Err(e),
                SendErrorClassification::PossiblySent => {
                    tracing::warn!(error = %e, "Send failed but transaction may be in mempool");
                }
            },
        }

        loop {
            match self.ledger.transaction_receipt(hash).await {
                Ok(Some(receipt)) => return Ok(receipt),
                Ok(None) => {}
                Err(e) => tracing::debug!(error = %e, "Receipt read failed"),
            }
            sleep(self.settings.receipt_poll_interval).await;
        }
    }
}
