//! Tron signer
//!
//! Tron reuses secp256k1 and Keccak-256 account ids but signs the
//! transaction id directly and emits `r || s || v` with the raw recovery bit.
//! Recovery bits are checked against the full public key.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{error, info};

use custody_core::address::ethereum_address_bytes;
use custody_core::{
    derive_address, keccak256, recover_public_key, Chain, IdentityCheck, KeyHandle, MessageDigest,
    RemoteKey, TronAddress,
};

use crate::error::{ChainError, Result};
use crate::signer::SignerContext;

/// TIP-191 message prefix, followed by the decimal message length
pub const TRON_MESSAGE_PREFIX: &str = "\x19TRON Signed Message:\n";

/// Transaction in the JSON shape produced by TronWeb
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TronTransaction {
    #[serde(rename = "txID")]
    pub tx_id: String,
    #[serde(default)]
    pub raw_data: serde_json::Value,
    #[serde(default)]
    pub raw_data_hex: String,
    #[serde(default)]
    pub visible: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signature: Vec<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TronTransaction {
    /// The 32-byte id that gets signed
    ///
    /// When `raw_data_hex` is present the id must be its SHA-256.
    pub fn digest(&self) -> Result<MessageDigest> {
        let digest = MessageDigest::from_hex(&self.tx_id)
            .map_err(|e| ChainError::InvalidTransaction(format!("txID: {e}")))?;

        if !self.raw_data_hex.is_empty() {
            let raw = hex::decode(&self.raw_data_hex)
                .map_err(|e| ChainError::InvalidTransaction(format!("raw_data_hex: {e}")))?;
            let expected: [u8; 32] = Sha256::digest(&raw).into();
            if &expected != digest.as_bytes() {
                return Err(ChainError::InvalidTransaction(
                    "txID is not the SHA-256 of raw_data_hex".into(),
                ));
            }
        }

        Ok(digest)
    }
}

/// `keccak256(prefix || len(message) || message)`
pub fn tron_message_digest(message: &[u8]) -> MessageDigest {
    let mut prefixed = Vec::with_capacity(TRON_MESSAGE_PREFIX.len() + 20 + message.len());
    prefixed.extend_from_slice(TRON_MESSAGE_PREFIX.as_bytes());
    prefixed.extend_from_slice(message.len().to_string().as_bytes());
    prefixed.extend_from_slice(message);
    MessageDigest::new(keccak256(&prefixed))
}

/// Recover the Tron address behind a TIP-191 signature
///
/// The signature must be 65 bytes of hex, optionally `0x`-prefixed, with `v`
/// as 0/1 or 27/28. Nothing is hashed before the length check passes.
pub fn recover_message_signer_v2(message: &[u8], signature_hex: &str) -> Result<TronAddress> {
    let stripped = signature_hex.strip_prefix("0x").unwrap_or(signature_hex);
    let bytes = hex::decode(stripped).map_err(|e| ChainError::InvalidSignatureHex(e.to_string()))?;
    let signature = custody_core::Signature::from_rsv(&bytes)?;

    let digest = tron_message_digest(message);
    let point = recover_public_key(&digest, &signature.raw(), signature.v)?;
    Ok(TronAddress::from_account_bytes(ethereum_address_bytes(&point[1..])))
}

/// Signer for the Tron network
#[derive(Clone)]
pub struct TronSigner {
    key: RemoteKey,
}

impl TronSigner {
    pub fn new(handle: KeyHandle, context: &SignerContext) -> Self {
        Self {
            key: context.remote_key(handle),
        }
    }

    pub fn key(&self) -> &RemoteKey {
        &self.key
    }

    /// Base58check address of the oracle key
    pub async fn address(&self) -> Result<TronAddress> {
        let public_key = self.key.public_key().await?;
        let account = derive_address(&public_key, Chain::Tron).account_bytes();
        Ok(TronAddress::from_account_bytes(account))
    }

    /// Sign `txID` and attach the signature
    ///
    /// Any existing signatures are replaced by the single new one.
    pub async fn sign_transaction(&self, transaction: &TronTransaction) -> Result<TronTransaction> {
        self.sign_transaction_inner(transaction)
            .await
            .inspect_err(|e| error!(key = %self.key.handle(), error = %e, "Failed to sign Tron transaction"))
    }

    async fn sign_transaction_inner(&self, transaction: &TronTransaction) -> Result<TronTransaction> {
        let digest = transaction.digest()?;
        let signature = self.key.sign_digest(&digest, IdentityCheck::PublicKey).await?;

        let mut signed = transaction.clone();
        signed.signature = vec![signature.to_hex()];

        info!(key = %self.key.handle(), tx_id = %transaction.tx_id, "Signed Tron transaction");
        Ok(signed)
    }

    /// Same as [`Self::sign_message_v2`]
    pub async fn sign_message(&self, message: impl AsRef<[u8]>) -> Result<String> {
        self.sign_message_v2(message).await
    }

    /// TIP-191 message signature as 130 lowercase hex characters
    pub async fn sign_message_v2(&self, message: impl AsRef<[u8]>) -> Result<String> {
        let digest = tron_message_digest(message.as_ref());

        let signature = self
            .key
            .sign_digest(&digest, IdentityCheck::PublicKey)
            .await
            .inspect_err(|e| error!(key = %self.key.handle(), error = %e, "Failed to sign Tron message"))?;

        info!(key = %self.key.handle(), "Signed Tron message");
        Ok(signature.to_hex())
    }

    /// Recover the address that signed `message`
    ///
    /// The result is not compared with this signer's own address.
    pub fn verify_message_v2(&self, message: impl AsRef<[u8]>, signature_hex: &str) -> Result<TronAddress> {
        recover_message_signer_v2(message.as_ref(), signature_hex)
            .inspect_err(|e| error!(error = %e, "Failed to verify Tron message signature"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custody_core::{CustodyError, SoftwareOracle};
    use k256::ecdsa::SigningKey;
    use std::sync::Arc;

    fn signer() -> TronSigner {
        let key = SigningKey::from_bytes((&[0x71u8; 32]).into()).unwrap();
        let context = SignerContext::new(Arc::new(SoftwareOracle::new().with_key("tron", key)));
        TronSigner::new("tron".into(), &context)
    }

    fn transaction(tx_id: String, raw_data_hex: String) -> TronTransaction {
        TronTransaction {
            tx_id,
            raw_data: serde_json::json!({ "expiration": 1 }),
            raw_data_hex,
            visible: false,
            signature: Vec::new(),
            extra: serde_json::Map::new(),
        }
    }

    #[test]
    fn test_empty_message_digest() {
        assert_eq!(
            tron_message_digest(b"").to_hex(),
            "5beedb3d65d99ecaf9857d8695e750cc56278093f4ccbd1cc4e561fc82b1d189"
        );
    }

    #[tokio::test]
    async fn test_sign_and_verify_messages() {
        let signer = signer();
        let address = signer.address().await.unwrap();

        for message in ["Hello, Tron!", "Test message", "0x1234", ""] {
            let signature = signer.sign_message_v2(message).await.unwrap();
            assert_eq!(signature.len(), 130);
            assert!(signature.ends_with("00") || signature.ends_with("01"));
            assert_eq!(signer.verify_message_v2(message, &signature).unwrap(), address);
        }

        let bytes = [1u8, 2, 3, 4, 5];
        let signature = signer.sign_message(bytes).await.unwrap();
        assert_eq!(signer.verify_message_v2(bytes, &signature).unwrap(), address);
    }

    #[tokio::test]
    async fn test_verify_accepts_27_offset_and_prefix() {
        let signer = signer();
        let signature = signer.sign_message_v2("offset").await.unwrap();

        let mut bytes = hex::decode(&signature).unwrap();
        bytes[64] += 27;
        let shifted = format!("0x{}", hex::encode(bytes));

        assert_eq!(
            signer.verify_message_v2("offset", &shifted).unwrap(),
            signer.address().await.unwrap()
        );
    }

    #[test]
    fn test_verify_rejects_wrong_length() {
        let err = recover_message_signer_v2(b"x", &"00".repeat(64)).unwrap_err();
        assert!(matches!(
            err.custody(),
            Some(CustodyError::InvalidSignatureLength { expected: 65, actual: 64 })
        ));

        let err = recover_message_signer_v2(b"x", &"00".repeat(66)).unwrap_err();
        assert!(matches!(
            err.custody(),
            Some(CustodyError::InvalidSignatureLength { expected: 65, actual: 66 })
        ));
    }

    #[tokio::test]
    async fn test_sign_transaction() {
        let signer = signer();
        let raw_data_hex = "0a02".to_string() + &"ab".repeat(20);
        let tx_id = hex::encode(Sha256::digest(hex::decode(&raw_data_hex).unwrap()));

        let mut tx = transaction(tx_id.clone(), raw_data_hex);
        tx.signature = vec!["stale".into()];

        let signed = signer.sign_transaction(&tx).await.unwrap();
        assert_eq!(signed.signature.len(), 1);
        assert_eq!(signed.signature[0].len(), 130);
        assert_eq!(signed.tx_id, tx_id);

        let signature = custody_core::Signature::from_rsv(&hex::decode(&signed.signature[0]).unwrap()).unwrap();
        let point = recover_public_key(&tx.digest().unwrap(), &signature.raw(), signature.v).unwrap();
        let public_key = signer.key().public_key().await.unwrap();
        assert_eq!(&point, public_key.uncompressed());
    }

    #[tokio::test]
    async fn test_tx_id_must_match_raw_data() {
        let tx = transaction("11".repeat(32), "0a02abcd".into());
        let err = signer().sign_transaction(&tx).await.unwrap_err();
        assert!(matches!(err, ChainError::InvalidTransaction(_)));
    }

    #[tokio::test]
    async fn test_short_tx_id_is_rejected() {
        let tx = transaction("abcd".into(), String::new());
        let err = signer().sign_transaction(&tx).await.unwrap_err();
        assert!(matches!(err, ChainError::InvalidTransaction(_)));
    }

    #[test]
    fn test_transaction_json_roundtrip_keeps_extra_fields() {
        let json = serde_json::json!({
            "txID": "11".repeat(32),
            "raw_data": { "contract": [] },
            "raw_data_hex": "",
            "visible": false,
            "ret": [{ "contractRet": "SUCCESS" }]
        });

        let tx: TronTransaction = serde_json::from_value(json).unwrap();
        assert!(tx.extra.contains_key("ret"));

        let back = serde_json::to_value(&tx).unwrap();
        assert_eq!(back["txID"], "11".repeat(32));
        assert!(back.get("signature").is_none());
    }
}
