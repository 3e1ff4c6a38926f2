//! Ethereum signer
//!
//! Every operation computes a digest, asks the oracle for a signature and
//! resolves the recovery bit against the signer's own address.

pub mod transaction;
pub mod typed_data;

use std::collections::BTreeMap;

use alloy_primitives::{eip191_hash_message, Address};
use alloy_sol_types::Eip712Domain;
use custody_core::{
    recover_public_key, IdentityCheck, KeyHandle, MessageDigest, RemoteKey, Signature,
};
use tracing::info;

use crate::error::{ChainError, Result};
use crate::signer::SignerContext;

pub use transaction::{
    eip155_v, AccessListItem, SignedTransaction, TransactionDefaults, TransactionRequest,
    TransactionType, UnsignedTransaction,
};
pub use typed_data::{typed_data_hash, TypedDataField, TypedDataRequest};

use transaction::{record_address, recovered_address};

/// Offset added to the recovery bit in message signatures
const MESSAGE_V_OFFSET: u8 = 27;

/// Signer for Ethereum and EVM-compatible chains
#[derive(Clone)]
pub struct EthereumSigner {
    key: RemoteKey,
    defaults: TransactionDefaults,
}

impl EthereumSigner {
    pub fn new(handle: KeyHandle, context: &SignerContext, defaults: TransactionDefaults) -> Self {
        Self {
            key: context.remote_key(handle),
            defaults,
        }
    }

    pub fn key(&self) -> &RemoteKey {
        &self.key
    }

    pub fn defaults(&self) -> &TransactionDefaults {
        &self.defaults
    }

    /// Checksummed address of the oracle key
    pub async fn address(&self) -> Result<Address> {
        let public_key = self.key.public_key().await?;
        Ok(record_address(&public_key))
    }

    /// EIP-191 personal message signature
    ///
    /// Returns `0x`-prefixed `r || s || v` with `v = 27 + bit`.
    pub async fn sign_message(&self, message: impl AsRef<[u8]>) -> Result<String> {
        let hash = eip191_hash_message(message);
        let signature = self.sign_hash(hash.0).await?;
        info!(key = %self.key.handle(), "Signed Ethereum message");
        Ok(serialize_signature(&signature))
    }

    /// EIP-712 structured data signature, same layout as [`Self::sign_message`]
    pub async fn sign_typed_data(
        &self,
        domain: &Eip712Domain,
        types: &BTreeMap<String, Vec<TypedDataField>>,
        value: &serde_json::Value,
    ) -> Result<String> {
        let hash = typed_data_hash(domain, types, value)?;
        let signature = self.sign_hash(hash.0).await?;
        info!(key = %self.key.handle(), "Signed Ethereum typed data");
        Ok(serialize_signature(&signature))
    }

    /// Populate, sign and serialize a transaction
    pub async fn sign_transaction(&self, request: &TransactionRequest) -> Result<SignedTransaction> {
        let unsigned = request.populate(&self.defaults)?;
        let signing_hash = unsigned.signing_hash();

        let signature = self.sign_hash(signing_hash.0).await?;
        let signed = unsigned.into_signed(signature)?;

        info!(
            key = %self.key.handle(),
            tx_type = ?signed.tx_type,
            v = signed.v,
            hash = %signed.hash,
            "Signed Ethereum transaction"
        );
        Ok(signed)
    }

    async fn sign_hash(&self, hash: [u8; 32]) -> Result<Signature> {
        let digest = MessageDigest::new(hash);
        Ok(self.key.sign_digest(&digest, IdentityCheck::Address).await?)
    }
}

/// `0x` hex of `r || s || (27 + bit)`
pub fn serialize_signature(signature: &Signature) -> String {
    format!(
        "0x{}",
        hex::encode(signature.to_bytes_with_v(MESSAGE_V_OFFSET + signature.v))
    )
}

/// Decode `0x`-optional hex into a 65-byte `r || s || v` signature
pub fn parse_signature_hex(signature_hex: &str) -> Result<Signature> {
    let stripped = signature_hex.strip_prefix("0x").unwrap_or(signature_hex);
    let bytes = hex::decode(stripped).map_err(|e| ChainError::InvalidSignatureHex(e.to_string()))?;
    Ok(Signature::from_rsv(&bytes)?)
}

/// Address that produced an EIP-191 message signature
pub fn recover_message_signer(message: impl AsRef<[u8]>, signature_hex: &str) -> Result<Address> {
    let signature = parse_signature_hex(signature_hex)?;
    let digest = MessageDigest::new(eip191_hash_message(message).0);
    let point = recover_public_key(&digest, &signature.raw(), signature.v)?;
    Ok(recovered_address(point))
}

/// Address that produced an EIP-712 signature
pub fn recover_typed_data_signer(
    domain: &Eip712Domain,
    types: &BTreeMap<String, Vec<TypedDataField>>,
    value: &serde_json::Value,
    signature_hex: &str,
) -> Result<Address> {
    let signature = parse_signature_hex(signature_hex)?;
    let digest = MessageDigest::new(typed_data_hash(domain, types, value)?.0);
    let point = recover_public_key(&digest, &signature.raw(), signature.v)?;
    Ok(recovered_address(point))
}
