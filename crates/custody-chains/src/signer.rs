//! Signer construction and the closed set of chain signers

use std::sync::Arc;

use custody_core::{Address, Chain, KeyHandle, PublicKeyCache, RemoteKey, SigningOracle};

use crate::error::Result;
use crate::ethereum::{EthereumSigner, TransactionDefaults};
use crate::tron::TronSigner;

/// Oracle plus the public key cache shared by every signer built from it
///
/// Separate contexts never share cached keys.
#[derive(Clone)]
pub struct SignerContext {
    oracle: Arc<dyn SigningOracle>,
    cache: Arc<PublicKeyCache>,
}

impl SignerContext {
    pub fn new(oracle: Arc<dyn SigningOracle>) -> Self {
        Self::with_cache(oracle, Arc::new(PublicKeyCache::new()))
    }

    pub fn with_cache(oracle: Arc<dyn SigningOracle>, cache: Arc<PublicKeyCache>) -> Self {
        Self { oracle, cache }
    }

    pub fn oracle(&self) -> &Arc<dyn SigningOracle> {
        &self.oracle
    }

    pub fn cache(&self) -> &Arc<PublicKeyCache> {
        &self.cache
    }

    pub fn remote_key(&self, handle: KeyHandle) -> RemoteKey {
        RemoteKey::new(handle, self.oracle.clone(), self.cache.clone())
    }

    pub fn ethereum(&self, handle: KeyHandle, defaults: TransactionDefaults) -> EthereumSigner {
        EthereumSigner::new(handle, self, defaults)
    }

    pub fn tron(&self, handle: KeyHandle) -> TronSigner {
        TronSigner::new(handle, self)
    }

    /// Build the signer for `chain`
    pub fn signer(&self, chain: Chain, handle: KeyHandle, defaults: TransactionDefaults) -> ChainSigner {
        match chain {
            Chain::Ethereum => ChainSigner::Ethereum(self.ethereum(handle, defaults)),
            Chain::Tron => ChainSigner::Tron(self.tron(handle)),
        }
    }
}

/// A signer for one of the supported chains
#[derive(Clone)]
pub enum ChainSigner {
    Ethereum(EthereumSigner),
    Tron(TronSigner),
}

impl ChainSigner {
    pub fn chain(&self) -> Chain {
        match self {
            ChainSigner::Ethereum(_) => Chain::Ethereum,
            ChainSigner::Tron(_) => Chain::Tron,
        }
    }

    pub fn handle(&self) -> &KeyHandle {
        match self {
            ChainSigner::Ethereum(signer) => signer.key().handle(),
            ChainSigner::Tron(signer) => signer.key().handle(),
        }
    }

    pub async fn address(&self) -> Result<Address> {
        match self {
            ChainSigner::Ethereum(signer) => Ok(Address::Ethereum(signer.address().await?)),
            ChainSigner::Tron(signer) => Ok(Address::Tron(signer.address().await?)),
        }
    }

    /// Chain-native personal message signature
    ///
    /// Ethereum returns `0x` hex with `v = 27 + bit`, Tron returns bare hex
    /// with the raw bit.
    pub async fn sign_message(&self, message: &[u8]) -> Result<String> {
        match self {
            ChainSigner::Ethereum(signer) => signer.sign_message(message).await,
            ChainSigner::Tron(signer) => signer.sign_message_v2(message).await,
        }
    }

    pub fn as_ethereum(&self) -> Option<&EthereumSigner> {
        match self {
            ChainSigner::Ethereum(signer) => Some(signer),
            ChainSigner::Tron(_) => None,
        }
    }

    pub fn as_tron(&self) -> Option<&TronSigner> {
        match self {
            ChainSigner::Tron(signer) => Some(signer),
            ChainSigner::Ethereum(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custody_core::SoftwareOracle;
    use k256::ecdsa::SigningKey;

    fn context() -> SignerContext {
        let key = SigningKey::from_bytes((&[0x81u8; 32]).into()).unwrap();
        SignerContext::new(Arc::new(SoftwareOracle::new().with_key("shared", key)))
    }

    #[tokio::test]
    async fn test_signers_share_account_and_cache() {
        let context = context();
        let eth = context.signer(Chain::Ethereum, "shared".into(), TransactionDefaults::default());
        let tron = context.signer(Chain::Tron, "shared".into(), TransactionDefaults::default());

        let eth_address = eth.address().await.unwrap();
        let tron_address = tron.address().await.unwrap();

        assert_eq!(eth_address.account_bytes(), tron_address.account_bytes());
        assert_eq!(eth.chain(), Chain::Ethereum);
        assert_eq!(tron.chain(), Chain::Tron);
        assert_eq!(context.cache().len().await, 1);
    }

    #[tokio::test]
    async fn test_contexts_are_isolated() {
        let first = context();
        let second = context();

        first.tron("shared".into()).address().await.unwrap();
        assert_eq!(first.cache().len().await, 1);
        assert!(second.cache().is_empty().await);
    }

    #[tokio::test]
    async fn test_sign_message_dispatch() {
        let context = context();
        let eth = context.signer(Chain::Ethereum, "shared".into(), TransactionDefaults::default());
        let tron = context.signer(Chain::Tron, "shared".into(), TransactionDefaults::default());

        let eth_sig = eth.sign_message(b"dispatch").await.unwrap();
        let tron_sig = tron.sign_message(b"dispatch").await.unwrap();

        assert!(eth_sig.starts_with("0x"));
        assert_eq!(eth_sig.len(), 132);
        assert_eq!(tron_sig.len(), 130);
        assert!(eth.as_ethereum().is_some());
        assert!(tron.as_tron().is_some());
        assert!(tron.as_ethereum().is_none());
    }
}
