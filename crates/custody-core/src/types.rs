//! Core newtypes shared by the codec, resolver and chain adapters

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CustodyError, Result};

/// Opaque identifier of a key held by the signing oracle
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyHandle(String);

impl KeyHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for KeyHandle {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for KeyHandle {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// 32-byte hash handed to the oracle for signing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageDigest(pub [u8; 32]);

impl MessageDigest {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Build a digest from a slice that must be exactly 32 bytes long
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CustodyError::InvalidDigest(bytes.len()))?;
        Ok(Self(array))
    }

    /// Parse hex with or without a `0x` prefix
    pub fn from_hex(s: &str) -> Result<Self> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(stripped).map_err(|_| CustodyError::InvalidDigest(s.len() / 2))?;
        Self::from_slice(&bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl AsRef<[u8]> for MessageDigest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for MessageDigest {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

/// A public key normalized to the uncompressed SEC1 form
///
/// Only [`crate::pubkey::normalize_public_key`] produces these, so the
/// point always starts with `0x04` and lies on the curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicKeyRecord {
    raw_encoding_len: usize,
    point: [u8; 65],
}

impl PublicKeyRecord {
    pub(crate) fn new(raw_encoding_len: usize, point: [u8; 65]) -> Self {
        Self {
            raw_encoding_len,
            point,
        }
    }

    /// Length of the key bytes as the oracle delivered them (33, 64 or 65)
    pub fn raw_encoding_len(&self) -> usize {
        self.raw_encoding_len
    }

    /// `0x04 || X || Y`
    pub fn uncompressed(&self) -> &[u8; 65] {
        &self.point
    }

    /// `X || Y` without the SEC1 tag, the input to address hashing
    pub fn xy(&self) -> &[u8] {
        &self.point[1..]
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.point)
    }
}

/// Fixed-width `(r, s)` pair decoded from the oracle, already in low-s form
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSignature {
    pub r: [u8; 32],
    pub s: [u8; 32],
}

impl RawSignature {
    pub fn new(r: [u8; 32], s: [u8; 32]) -> Self {
        Self { r, s }
    }

    /// `r || s`
    pub fn to_bytes(&self) -> [u8; 64] {
        let mut bytes = [0u8; 64];
        bytes[..32].copy_from_slice(&self.r);
        bytes[32..].copy_from_slice(&self.s);
        bytes
    }
}

/// Recoverable secp256k1 signature with its resolved recovery bit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub r: [u8; 32],
    pub s: [u8; 32],
    /// Recovery bit, always 0 or 1
    pub v: u8,
}

impl Signature {
    pub fn new(raw: RawSignature, v: u8) -> Self {
        Self {
            r: raw.r,
            s: raw.s,
            v,
        }
    }

    /// Parse a 65-byte `r || s || v`
    ///
    /// `v` may be the raw bit or the `27 + bit` form. The length is checked
    /// before anything else.
    pub fn from_rsv(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 65 {
            return Err(CustodyError::InvalidSignatureLength {
                expected: 65,
                actual: bytes.len(),
            });
        }

        let v = match bytes[64] {
            v @ (0 | 1) => v,
            v @ (27 | 28) => v - 27,
            _ => return Err(CustodyError::RecoveryIdNotFound),
        };

        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..64]);
        Ok(Self { r, s, v })
    }

    pub fn raw(&self) -> RawSignature {
        RawSignature::new(self.r, self.s)
    }

    /// `r || s || v` with the raw recovery bit
    pub fn to_bytes(&self) -> [u8; 65] {
        self.to_bytes_with_v(self.v)
    }

    /// `r || s || v` with a caller-chosen `v` byte (e.g. `27 + bit`)
    pub fn to_bytes_with_v(&self, v: u8) -> [u8; 65] {
        let mut bytes = [0u8; 65];
        bytes[..32].copy_from_slice(&self.r);
        bytes[32..64].copy_from_slice(&self.s);
        bytes[64] = v;
        bytes
    }

    /// Lowercase hex of `r || s || v`, no prefix
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }
}
