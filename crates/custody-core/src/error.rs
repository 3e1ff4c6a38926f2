//! Error types for remote-custody signing

use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CustodyError>;

/// Errors that can occur while turning an oracle signature into a chain signature
///
/// None of these are retried locally. Every variant reaches the immediate
/// caller unchanged.
#[derive(Debug, Error)]
pub enum CustodyError {
    /// The signing oracle could not be reached or refused the request
    #[error("Signing oracle unavailable: {0}")]
    RemoteUnavailable(String),

    /// The oracle returned a key that does not describe a secp256k1 point
    #[error("Malformed public key: {0}")]
    MalformedPublicKey(String),

    /// The raw key bytes have a length this system cannot normalize
    #[error("Unsupported public key format: {0} bytes")]
    UnsupportedPublicKeyFormat(usize),

    /// The oracle signature is not a DER `ECDSA-Sig-Value`
    #[error("Invalid DER signature: {0}")]
    InvalidDerSignature(String),

    /// Neither recovery bit reproduces the expected signer
    #[error("Could not determine ECDSA recovery ID from signature and public key")]
    RecoveryIdNotFound,

    /// A caller-supplied signature has the wrong size
    #[error("Invalid signature length: expected {expected} bytes, got {actual}")]
    InvalidSignatureLength { expected: usize, actual: usize },

    /// A chain-id-dependent encoding was requested without a chain id
    #[error("Chain ID must be defined for this transaction type")]
    ChainIdRequired,

    /// An address string failed to decode
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// A digest was not exactly 32 bytes
    #[error("Invalid digest: expected 32 bytes, got {0}")]
    InvalidDigest(usize),
}
