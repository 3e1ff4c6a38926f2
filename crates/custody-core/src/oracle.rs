//! Signing oracle abstraction
//!
//! A signing oracle holds private keys we never see. It signs 32-byte digests
//! (`ECDSA_SHA_256` in digest mode, the message is not hashed again) and
//! returns DER signatures. It hands out public keys as DER
//! `SubjectPublicKeyInfo`. Signatures may come back with a high `s` and
//! never carry a recovery bit.

use std::collections::HashMap;

use async_trait::async_trait;
use k256::ecdsa::{signature::hazmat::PrehashSigner, RecoveryId, Signature as K256Signature};
use k256::ecdsa::{SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::pkcs8::der::{asn1::BitStringRef, Decode, Encode};
use k256::pkcs8::spki::SubjectPublicKeyInfoRef;
use k256::pkcs8::EncodePublicKey;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CustodyError, Result};
use crate::types::{KeyHandle, MessageDigest};

/// Signing algorithm requested from the oracle
pub const SIGNING_ALGORITHM: &str = "ECDSA_SHA_256";

/// Remote signer holding secp256k1 private keys
#[async_trait]
pub trait SigningOracle: Send + Sync {
    /// Sign a pre-hashed 32-byte digest
    ///
    /// Returns a DER `ECDSA-Sig-Value`. Unreachable or refusing oracles
    /// report [`CustodyError::RemoteUnavailable`].
    async fn sign(&self, key: &KeyHandle, digest: &MessageDigest) -> Result<Vec<u8>>;

    /// Fetch the key's DER `SubjectPublicKeyInfo`
    async fn get_public_key(&self, key: &KeyHandle) -> Result<Vec<u8>>;

    /// Short backend name for logs
    fn backend(&self) -> &'static str;
}

/// How [`SoftwareOracle`] presents public keys inside its SPKI documents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublicKeyEncoding {
    /// 65 bytes, `0x04 || X || Y`
    #[default]
    Uncompressed,
    /// 33 bytes, `0x02/0x03 || X`
    Compressed,
    /// 64 bytes, `X || Y` with no tag
    RawXy,
}

/// In-process oracle backed by local keys
///
/// Behaves like a remote KMS: digests whose first byte is odd get a high-`s`
/// signature, so callers must canonicalize.
pub struct SoftwareOracle {
    keys: HashMap<KeyHandle, SigningKey>,
    encoding: PublicKeyEncoding,
}

impl SoftwareOracle {
    pub fn new() -> Self {
        Self {
            keys: HashMap::new(),
            encoding: PublicKeyEncoding::default(),
        }
    }

    pub fn with_key(mut self, handle: impl Into<KeyHandle>, key: SigningKey) -> Self {
        self.insert_key(handle, key);
        self
    }

    pub fn with_public_key_encoding(mut self, encoding: PublicKeyEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn insert_key(&mut self, handle: impl Into<KeyHandle>, key: SigningKey) {
        self.keys.insert(handle.into(), key);
    }

    /// Create a fresh random key under `handle`
    pub fn generate(&mut self, handle: impl Into<KeyHandle>) -> VerifyingKey {
        let key = SigningKey::random(&mut OsRng);
        let verifying = *key.verifying_key();
        self.insert_key(handle, key);
        verifying
    }

    /// Register a key given as 32 bytes of hex, with or without `0x`
    pub fn from_secret_hex(handle: impl Into<KeyHandle>, secret_hex: &str) -> Result<Self> {
        let stripped = secret_hex.strip_prefix("0x").unwrap_or(secret_hex);
        let bytes = hex::decode(stripped)
            .map_err(|e| CustodyError::RemoteUnavailable(format!("invalid secret key hex: {e}")))?;
        let key = SigningKey::from_slice(&bytes)
            .map_err(|e| CustodyError::RemoteUnavailable(format!("invalid secret key: {e}")))?;
        Ok(Self::new().with_key(handle, key))
    }

    pub fn verifying_key(&self, handle: &KeyHandle) -> Option<VerifyingKey> {
        self.keys.get(handle).map(|key| *key.verifying_key())
    }

    fn key(&self, handle: &KeyHandle) -> Result<&SigningKey> {
        self.keys
            .get(handle)
            .ok_or_else(|| CustodyError::RemoteUnavailable(format!("unknown key: {handle}")))
    }

    fn encode_spki(&self, verifying: &VerifyingKey) -> Result<Vec<u8>> {
        let document = verifying
            .to_public_key_der()
            .map_err(|e| CustodyError::MalformedPublicKey(e.to_string()))?;

        let key_bytes = match self.encoding {
            PublicKeyEncoding::Uncompressed => return Ok(document.as_bytes().to_vec()),
            PublicKeyEncoding::Compressed => verifying.to_encoded_point(true).as_bytes().to_vec(),
            PublicKeyEncoding::RawXy => verifying.to_encoded_point(false).as_bytes()[1..].to_vec(),
        };

        let spki = SubjectPublicKeyInfoRef::from_der(document.as_bytes())
            .map_err(|e| CustodyError::MalformedPublicKey(e.to_string()))?;
        let reencoded = SubjectPublicKeyInfoRef {
            algorithm: spki.algorithm,
            subject_public_key: BitStringRef::from_bytes(&key_bytes)
                .map_err(|e| CustodyError::MalformedPublicKey(e.to_string()))?,
        };

        reencoded
            .to_der()
            .map_err(|e| CustodyError::MalformedPublicKey(e.to_string()))
    }
}

impl Default for SoftwareOracle {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SigningOracle for SoftwareOracle {
    async fn sign(&self, key: &KeyHandle, digest: &MessageDigest) -> Result<Vec<u8>> {
        debug!(key = %key, algorithm = SIGNING_ALGORITHM, "Software oracle signing digest");

        let (signature, _): (K256Signature, RecoveryId) = self
            .key(key)?
            .sign_prehash(digest.as_bytes())
            .map_err(|e| CustodyError::RemoteUnavailable(e.to_string()))?;

        let signature = if digest.as_bytes()[0] & 1 == 1 {
            let (r, s) = signature.split_scalars();
            K256Signature::from_scalars(r.to_bytes(), (-*s).to_bytes())
                .map_err(|e| CustodyError::RemoteUnavailable(e.to_string()))?
        } else {
            signature
        };

        Ok(signature.to_der().as_bytes().to_vec())
    }

    async fn get_public_key(&self, key: &KeyHandle) -> Result<Vec<u8>> {
        let verifying = *self.key(key)?.verifying_key();
        self.encode_spki(&verifying)
    }

    fn backend(&self) -> &'static str {
        "software"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::is_low_s;

    fn oracle() -> SoftwareOracle {
        let key = SigningKey::from_bytes((&[0x21u8; 32]).into()).unwrap();
        SoftwareOracle::new().with_key("test", key)
    }

    #[tokio::test]
    async fn test_odd_digest_yields_high_s() {
        let oracle = oracle();
        let der = oracle
            .sign(&"test".into(), &MessageDigest::new([0x01; 32]))
            .await
            .unwrap();

        let signature = K256Signature::from_der(&der).unwrap();
        let s: [u8; 32] = signature.split_bytes().1.into();
        assert!(!is_low_s(&s));
    }

    #[tokio::test]
    async fn test_even_digest_yields_low_s() {
        let oracle = oracle();
        let der = oracle
            .sign(&"test".into(), &MessageDigest::new([0x02; 32]))
            .await
            .unwrap();

        let signature = K256Signature::from_der(&der).unwrap();
        let s: [u8; 32] = signature.split_bytes().1.into();
        assert!(is_low_s(&s));
    }

    #[tokio::test]
    async fn test_unknown_key_is_unavailable() {
        let err = oracle()
            .sign(&"missing".into(), &MessageDigest::new([0; 32]))
            .await
            .unwrap_err();
        assert!(matches!(err, CustodyError::RemoteUnavailable(_)));

        let err = oracle().get_public_key(&"missing".into()).await.unwrap_err();
        assert!(matches!(err, CustodyError::RemoteUnavailable(_)));
    }

    #[tokio::test]
    async fn test_public_key_encodings() {
        for (encoding, len) in [
            (PublicKeyEncoding::Uncompressed, 65),
            (PublicKeyEncoding::Compressed, 33),
            (PublicKeyEncoding::RawXy, 64),
        ] {
            let oracle = oracle().with_public_key_encoding(encoding);
            let der = oracle.get_public_key(&"test".into()).await.unwrap();

            let spki = SubjectPublicKeyInfoRef::from_der(&der).unwrap();
            let key = spki.subject_public_key.as_bytes().unwrap();
            assert_eq!(key.len(), len, "{encoding:?}");
        }
    }

    #[test]
    fn test_from_secret_hex() {
        let secret = format!("0x{}", "00".repeat(31) + "01");
        let oracle = SoftwareOracle::from_secret_hex("one", &secret).unwrap();
        assert!(oracle.verifying_key(&"one".into()).is_some());

        assert!(SoftwareOracle::from_secret_hex("bad", "zz").is_err());
        assert!(SoftwareOracle::from_secret_hex("zero", &"00".repeat(32)).is_err());
    }
}
