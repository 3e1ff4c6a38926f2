//! DER signature decoding and low-s canonicalization
//!
//! The oracle answers with an ASN.1 `ECDSA-Sig-Value`. This module turns it
//! into fixed-width big-endian `(r, s)` with `s <= n/2`.
//!
//! Canonicalization replaces `s` with `n - s` without adjusting any recovery
//! bit. The recovery bit is resolved afterwards by
//! [`crate::recovery::resolve_recovery_id`], which tries both candidates
//! against the already-canonical pair. Keep that order.

use k256::{
    ecdsa::Signature as K256Signature,
    elliptic_curve::{scalar::IsHigh, PrimeField},
    Scalar,
};

use crate::error::{CustodyError, Result};
use crate::types::RawSignature;

/// secp256k1 group order `n` (big-endian)
pub const CURVE_ORDER: [u8; 32] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFE,
    0xBA, 0xAE, 0xDC, 0xE6, 0xAF, 0x48, 0xA0, 0x3B, 0xBF, 0xD2, 0x5E, 0x8C, 0xD0, 0x36, 0x41, 0x41,
];

/// `n / 2` rounded down (big-endian)
pub const HALF_ORDER: [u8; 32] = [
    0x7F, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0x5D, 0x57, 0x6E, 0x73, 0x57, 0xA4, 0x50, 0x1D, 0xDF, 0xE9, 0x2F, 0x46, 0x68, 0x1B, 0x20, 0xA0,
];

/// Decode a DER `ECDSA-Sig-Value` into canonical fixed-width `(r, s)`
///
/// `r` and `s` come back left-padded to 32 bytes. Values outside `[1, n)`
/// are rejected along with any malformed ASN.1.
pub fn decode_der_signature(der: &[u8]) -> Result<RawSignature> {
    let signature = K256Signature::from_der(der)
        .map_err(|e| CustodyError::InvalidDerSignature(e.to_string()))?;

    let (r, s) = signature.split_bytes();
    let s = canonicalize_s(&s.into())?;

    Ok(RawSignature::new(r.into(), s))
}

/// Re-encode a pair as DER
pub fn encode_der(signature: &RawSignature) -> Result<Vec<u8>> {
    let signature = K256Signature::from_scalars(signature.r, signature.s)
        .map_err(|e| CustodyError::InvalidDerSignature(e.to_string()))?;
    Ok(signature.to_der().as_bytes().to_vec())
}

/// Map `s` to `min(s, n - s)`
///
/// Idempotent: an already-low `s` is returned unchanged.
pub fn canonicalize_s(s: &[u8; 32]) -> Result<[u8; 32]> {
    let scalar = Option::<Scalar>::from(Scalar::from_repr((*s).into())).ok_or_else(|| {
        CustodyError::InvalidDerSignature("s is not below the curve order".to_string())
    })?;

    let low = if bool::from(scalar.is_high()) {
        -scalar
    } else {
        scalar
    };

    Ok(low.to_bytes().into())
}

/// Whether `s <= n/2`
pub fn is_low_s(s: &[u8; 32]) -> bool {
    // Big-endian arrays of equal length compare like the integers they hold
    s <= &HALF_ORDER
}
