//! Public key resolution with a per-handle cache
//!
//! Keys arrive from the oracle as DER `SubjectPublicKeyInfo`. The inner key
//! bytes are normalized to the uncompressed SEC1 point before anything else
//! sees them. Each handle is fetched from the oracle at most once per
//! process, even under concurrent first use.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::pkcs8::der::Decode;
use k256::pkcs8::spki::SubjectPublicKeyInfoRef;
use tokio::sync::{Mutex, OnceCell};
use tracing::debug;

use crate::error::{CustodyError, Result};
use crate::oracle::SigningOracle;
use crate::types::{KeyHandle, PublicKeyRecord};

/// Pull the raw key bytes out of a DER `SubjectPublicKeyInfo`
pub fn extract_spki_key(der: &[u8]) -> Result<Vec<u8>> {
    let spki = SubjectPublicKeyInfoRef::from_der(der)
        .map_err(|e| CustodyError::MalformedPublicKey(format!("invalid SPKI: {e}")))?;

    spki.subject_public_key
        .as_bytes()
        .map(<[u8]>::to_vec)
        .ok_or_else(|| CustodyError::MalformedPublicKey("key bit string is not byte aligned".into()))
}

/// Normalize raw key bytes to `0x04 || X || Y`
///
/// * 64 bytes: bare `X || Y`, the tag is prepended
/// * 65 bytes: must already carry the `0x04` tag
/// * 33 bytes: compressed, decompressed on the curve
///
/// Every result is checked to be a point on secp256k1.
pub fn normalize_public_key(raw: &[u8]) -> Result<PublicKeyRecord> {
    let mut point = [0u8; 65];

    match raw.len() {
        64 => {
            point[0] = 0x04;
            point[1..].copy_from_slice(raw);
        }
        65 if raw[0] == 0x04 => point.copy_from_slice(raw),
        33 => {
            if raw[0] != 0x02 && raw[0] != 0x03 {
                return Err(CustodyError::MalformedPublicKey(format!(
                    "bad compressed key prefix 0x{:02x}",
                    raw[0]
                )));
            }
            let key = k256::PublicKey::from_sec1_bytes(raw)
                .map_err(|_| CustodyError::MalformedPublicKey("point is not on the curve".into()))?;
            point.copy_from_slice(key.to_encoded_point(false).as_bytes());
        }
        len => return Err(CustodyError::UnsupportedPublicKeyFormat(len)),
    }

    k256::PublicKey::from_sec1_bytes(&point)
        .map_err(|_| CustodyError::MalformedPublicKey("point is not on the curve".into()))?;

    Ok(PublicKeyRecord::new(raw.len(), point))
}

/// Process-wide cache of normalized public keys
///
/// Entries live until explicitly invalidated.
#[derive(Default)]
pub struct PublicKeyCache {
    entries: Mutex<HashMap<KeyHandle, Arc<OnceCell<PublicKeyRecord>>>>,
}

impl PublicKeyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached record for `key`, if one has been stored
    pub async fn get(&self, key: &KeyHandle) -> Option<PublicKeyRecord> {
        let entries = self.entries.lock().await;
        entries.get(key).and_then(|cell| cell.get().copied())
    }

    /// Return the cached record or run `fetch` to fill it
    ///
    /// Concurrent callers for the same handle share a single `fetch`. A
    /// failed fetch leaves the slot empty so the next caller retries.
    pub async fn get_or_fetch<F, Fut>(&self, key: &KeyHandle, fetch: F) -> Result<PublicKeyRecord>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<PublicKeyRecord>>,
    {
        let cell = {
            let mut entries = self.entries.lock().await;
            entries.entry(key.clone()).or_default().clone()
        };

        if let Some(record) = cell.get() {
            debug!(key = %key, "Public key cache hit");
            return Ok(*record);
        }

        cell.get_or_try_init(fetch).await.copied()
    }

    /// Drop the entry for `key`, forcing the next lookup to refetch
    pub async fn invalidate(&self, key: &KeyHandle) -> bool {
        self.entries.lock().await.remove(key).is_some()
    }

    /// Number of resolved entries
    pub async fn len(&self) -> usize {
        let entries = self.entries.lock().await;
        entries.values().filter(|cell| cell.initialized()).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Fetches, normalizes and caches oracle public keys
#[derive(Clone)]
pub struct PublicKeyResolver {
    oracle: Arc<dyn SigningOracle>,
    cache: Arc<PublicKeyCache>,
}

impl PublicKeyResolver {
    pub fn new(oracle: Arc<dyn SigningOracle>, cache: Arc<PublicKeyCache>) -> Self {
        Self { oracle, cache }
    }

    pub fn cache(&self) -> &Arc<PublicKeyCache> {
        &self.cache
    }

    /// Resolve the normalized public key for `key`
    pub async fn resolve(&self, key: &KeyHandle) -> Result<PublicKeyRecord> {
        self.cache
            .get_or_fetch(key, || async {
                debug!(key = %key, backend = self.oracle.backend(), "Fetching public key from oracle");
                let der = self.oracle.get_public_key(key).await?;
                let raw = extract_spki_key(&der)?;
                let record = normalize_public_key(&raw)?;
                debug!(key = %key, raw_len = record.raw_encoding_len(), "Public key normalized");
                Ok(record)
            })
            .await
    }
}
