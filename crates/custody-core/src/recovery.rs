//! Recovery bit resolution
//!
//! The oracle never reports which of the two candidate points produced a
//! signature. Both bits are tried against the canonical `(r, s)` and the one
//! whose recovered key matches the expected signer wins.

use k256::ecdsa::{RecoveryId, Signature as K256Signature, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use tracing::debug;

use crate::address::ethereum_address_bytes;
use crate::error::{CustodyError, Result};
use crate::types::{MessageDigest, RawSignature};

/// What a recovered key must match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedSigner {
    /// Uncompressed SEC1 point `0x04 || X || Y`
    PublicKey([u8; 65]),
    /// 20-byte Keccak account id
    Address([u8; 20]),
}

impl ExpectedSigner {
    fn matches(&self, recovered: &[u8; 65]) -> bool {
        match self {
            ExpectedSigner::PublicKey(expected) => expected == recovered,
            ExpectedSigner::Address(expected) => {
                &ethereum_address_bytes(&recovered[1..]) == expected
            }
        }
    }
}

/// Recover the uncompressed public key for one candidate bit
pub fn recover_public_key(
    digest: &MessageDigest,
    signature: &RawSignature,
    v: u8,
) -> Result<[u8; 65]> {
    let recovery_id = RecoveryId::from_byte(v).ok_or(CustodyError::RecoveryIdNotFound)?;
    let signature = K256Signature::from_scalars(signature.r, signature.s)
        .map_err(|e| CustodyError::InvalidDerSignature(e.to_string()))?;

    let key = VerifyingKey::recover_from_prehash(digest.as_bytes(), &signature, recovery_id)
        .map_err(|_| CustodyError::RecoveryIdNotFound)?;

    let point = key.to_encoded_point(false);
    point
        .as_bytes()
        .try_into()
        .map_err(|_| CustodyError::RecoveryIdNotFound)
}

/// Find the bit in `{0, 1}` under which `signature` recovers to `expected`
///
/// A candidate that fails to recover at all is skipped, not reported.
pub fn resolve_recovery_id(
    digest: &MessageDigest,
    signature: &RawSignature,
    expected: &ExpectedSigner,
) -> Result<u8> {
    for v in [0u8, 1u8] {
        match recover_public_key(digest, signature, v) {
            Ok(recovered) if expected.matches(&recovered) => return Ok(v),
            Ok(_) => debug!(v, "Recovered key does not match expected signer"),
            Err(e) => debug!(v, error = %e, "Recovery candidate failed"),
        }
    }

    Err(CustodyError::RecoveryIdNotFound)
}
