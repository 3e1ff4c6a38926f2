//! Custody Core - remote-custody ECDSA signing primitives
//!
//! This crate turns a signing oracle that only returns DER signatures into a
//! signer producing recoverable secp256k1 signatures:
//!
//! - [`codec`]: DER decoding and low-s canonicalization
//! - [`pubkey`]: SPKI extraction, key normalization and the per-handle cache
//! - [`recovery`]: recovery bit resolution
//! - [`address`]: Ethereum and Tron address derivation
//! - [`oracle`]: the oracle trait and an in-process implementation
//! - [`remote`]: a handle bound to its oracle and cache

pub mod address;
pub mod codec;
pub mod error;
pub mod oracle;
pub mod pubkey;
pub mod recovery;
pub mod remote;
pub mod types;

pub use address::{derive_address, keccak256, Address, Chain, TronAddress};
pub use codec::{canonicalize_s, decode_der_signature, encode_der, is_low_s};
pub use error::{CustodyError, Result};
pub use oracle::{PublicKeyEncoding, SigningOracle, SoftwareOracle};
pub use pubkey::{normalize_public_key, PublicKeyCache, PublicKeyResolver};
pub use recovery::{recover_public_key, resolve_recovery_id, ExpectedSigner};
pub use remote::{IdentityCheck, RemoteKey};
pub use types::{KeyHandle, MessageDigest, PublicKeyRecord, RawSignature, Signature};
