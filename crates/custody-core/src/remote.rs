//! A single oracle-held key, exposed as a recoverable secp256k1 signer

use std::sync::Arc;

use tracing::{debug, info};

use crate::address::{derive_address, Address, Chain};
use crate::codec::decode_der_signature;
use crate::error::Result;
use crate::oracle::SigningOracle;
use crate::pubkey::{PublicKeyCache, PublicKeyResolver};
use crate::recovery::{resolve_recovery_id, ExpectedSigner};
use crate::types::{KeyHandle, MessageDigest, PublicKeyRecord, RawSignature, Signature};

/// How the recovery bit is checked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityCheck {
    /// Compare recovered points against the cached public key
    PublicKey,
    /// Compare the Keccak address of recovered points
    Address,
}

/// Key handle bound to an oracle and its public key cache
#[derive(Clone)]
pub struct RemoteKey {
    handle: KeyHandle,
    oracle: Arc<dyn SigningOracle>,
    resolver: PublicKeyResolver,
}

impl RemoteKey {
    pub fn new(
        handle: KeyHandle,
        oracle: Arc<dyn SigningOracle>,
        cache: Arc<PublicKeyCache>,
    ) -> Self {
        let resolver = PublicKeyResolver::new(oracle.clone(), cache);
        Self {
            handle,
            oracle,
            resolver,
        }
    }

    pub fn handle(&self) -> &KeyHandle {
        &self.handle
    }

    pub async fn public_key(&self) -> Result<PublicKeyRecord> {
        self.resolver.resolve(&self.handle).await
    }

    pub async fn address(&self, chain: Chain) -> Result<Address> {
        let public_key = self.public_key().await?;
        Ok(derive_address(&public_key, chain))
    }

    /// Ask the oracle to sign and decode the canonical `(r, s)`
    pub async fn sign_raw(&self, digest: &MessageDigest) -> Result<RawSignature> {
        debug!(
            key = %self.handle,
            backend = self.oracle.backend(),
            digest = %digest.to_hex(),
            "Requesting oracle signature"
        );
        let der = self.oracle.sign(&self.handle, digest).await?;
        decode_der_signature(&der)
    }

    /// Sign a digest and resolve its recovery bit
    pub async fn sign_digest(
        &self,
        digest: &MessageDigest,
        check: IdentityCheck,
    ) -> Result<Signature> {
        let raw = self.sign_raw(digest).await?;
        let public_key = self.public_key().await?;

        let expected = match check {
            IdentityCheck::PublicKey => ExpectedSigner::PublicKey(*public_key.uncompressed()),
            IdentityCheck::Address => {
                ExpectedSigner::Address(derive_address(&public_key, Chain::Ethereum).account_bytes())
            }
        };

        let v = resolve_recovery_id(digest, &raw, &expected)?;
        info!(key = %self.handle, v, "Digest signed");

        Ok(Signature::new(raw, v))
    }
}
