//! Compiles a request under a validity window and collects every signature

use solana_sdk::{
    message::{Message, VersionedMessage},
    transaction::VersionedTransaction,
};
use tracing::debug;

use super::classifier::RawFailure;
use super::request::TransactionRequest;
use crate::types::ValidityWindow;
use crate::wallet::SignerError;

/// Build a freshly signed transaction for `window`.
///
/// Signatures are never carried over between windows: the message is
/// recompiled with the new recency token and every required signer signs it
/// again. A signer missing for a required key rejects the request.
pub async fn sign_transaction(
    request: &TransactionRequest,
    window: &ValidityWindow,
) -> Result<VersionedTransaction, RawFailure> {
    let fee_payer = request.fee_payer();
    let message = Message::new_with_blockhash(request.instructions(), Some(&fee_payer), &window.blockhash);
    let required = message.header.num_required_signatures as usize;
    let signer_keys = message.account_keys[..required].to_vec();

    let message = VersionedMessage::Legacy(message);
    let bytes = message.serialize();

    let mut signatures = Vec::with_capacity(required);
    for key in &signer_keys {
        let provider = request
            .provider_for(key)
            .ok_or_else(|| RawFailure::Invalid(format!("no signer supplied for required key {key}")))?;

        let signature = provider.sign_message(&bytes).await.map_err(RawFailure::Signer)?;
        if !signature.verify(key.as_ref(), &bytes) {
            return Err(RawFailure::Signer(SignerError::Failed(format!(
                "signature from {key} does not verify"
            ))));
        }
        signatures.push(signature);
    }

    debug!(
        signers = required,
        window = %window,
        "Transaction signed"
    );

    Ok(VersionedTransaction { signatures, message })
}
