//! Chain address derivation from normalized public keys
//!
//! Both supported chains hash `X || Y` with Keccak-256 and keep the last 20
//! bytes. Ethereum shows them as checksummed hex, Tron prefixes `0x41` and
//! base58check-encodes the result.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

use crate::error::{CustodyError, Result};
use crate::types::PublicKeyRecord;

/// Version byte of Tron mainnet addresses
pub const TRON_ADDRESS_PREFIX: u8 = 0x41;

/// Supported chains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Ethereum,
    Tron,
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Chain::Ethereum => f.write_str("ethereum"),
            Chain::Tron => f.write_str("tron"),
        }
    }
}

impl FromStr for Chain {
    type Err = CustodyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ethereum" | "eth" | "evm" => Ok(Chain::Ethereum),
            "tron" | "trx" => Ok(Chain::Tron),
            other => Err(CustodyError::InvalidAddress(format!("unknown chain: {other}"))),
        }
    }
}

/// Keccak-256
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// Last 20 bytes of `keccak256(X || Y)`
pub fn ethereum_address_bytes(xy: &[u8]) -> [u8; 20] {
    let hash = keccak256(xy);
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    address
}

/// Tron address: version byte followed by the 20-byte account id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TronAddress([u8; 21]);

impl TronAddress {
    pub fn from_account_bytes(account: [u8; 20]) -> Self {
        let mut bytes = [0u8; 21];
        bytes[0] = TRON_ADDRESS_PREFIX;
        bytes[1..].copy_from_slice(&account);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 21] {
        &self.0
    }

    /// The 20 bytes shared with the equivalent Ethereum address
    pub fn account_bytes(&self) -> [u8; 20] {
        let mut account = [0u8; 20];
        account.copy_from_slice(&self.0[1..]);
        account
    }

    /// `41...` hex form used by Tron node APIs
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for TronAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).with_check().into_string())
    }
}

impl FromStr for TronAddress {
    type Err = CustodyError;

    fn from_str(s: &str) -> Result<Self> {
        let decoded = bs58::decode(s)
            .with_check(None)
            .into_vec()
            .map_err(|e| CustodyError::InvalidAddress(format!("{s}: {e}")))?;

        let bytes: [u8; 21] = decoded.as_slice().try_into().map_err(|_| {
            CustodyError::InvalidAddress(format!(
                "{s}: expected 21 payload bytes, got {}",
                decoded.len()
            ))
        })?;

        if bytes[0] != TRON_ADDRESS_PREFIX {
            return Err(CustodyError::InvalidAddress(format!(
                "{s}: unexpected version byte 0x{:02x}",
                bytes[0]
            )));
        }

        Ok(Self(bytes))
    }
}

/// A chain-tagged address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Address {
    Ethereum(alloy_primitives::Address),
    Tron(TronAddress),
}

impl Address {
    pub fn chain(&self) -> Chain {
        match self {
            Address::Ethereum(_) => Chain::Ethereum,
            Address::Tron(_) => Chain::Tron,
        }
    }

    /// The Keccak-derived 20 bytes, identical for both chains
    pub fn account_bytes(&self) -> [u8; 20] {
        match self {
            Address::Ethereum(address) => address.into_array(),
            Address::Tron(address) => address.account_bytes(),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // alloy renders EIP-55 checksummed hex
            Address::Ethereum(address) => write!(f, "{address}"),
            Address::Tron(address) => write!(f, "{address}"),
        }
    }
}

/// Derive the address of `public_key` on `chain`
pub fn derive_address(public_key: &PublicKeyRecord, chain: Chain) -> Address {
    let account = ethereum_address_bytes(public_key.xy());
    match chain {
        Chain::Ethereum => Address::Ethereum(alloy_primitives::Address::from(account)),
        Chain::Tron => Address::Tron(TronAddress::from_account_bytes(account)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pubkey::normalize_public_key;

    const XY_HEX: &str = "8c9689879c1f670be3f1bddb4381988a4a834cb5d6523321905b3d9468f637d0\
                          75ef3a37ee9e0f4b2f7dac38a8d101cb69da6ca34aed4c90d2212456f4c74ea8";

    fn test_record() -> PublicKeyRecord {
        normalize_public_key(&hex::decode(XY_HEX).unwrap()).unwrap()
    }

    #[test]
    fn test_keccak_empty() {
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_ethereum_address() {
        let address = derive_address(&test_record(), Chain::Ethereum);
        assert_eq!(
            address.to_string().to_lowercase(),
            "0xeeb8861f51b3f3f2204d64bbf7a7eb25e1b4d6cd"
        );
        assert_eq!(address.chain(), Chain::Ethereum);
    }

    #[test]
    fn test_tron_address() {
        let address = derive_address(&test_record(), Chain::Tron);
        assert_eq!(address.to_string(), "TXjSsfJ1sEJUDvkJFQG1BX8e7KEy2kYyXq");

        let Address::Tron(tron) = address else {
            panic!("expected tron address");
        };
        assert_eq!(tron.as_bytes()[0], TRON_ADDRESS_PREFIX);
        assert!(tron.to_hex().starts_with("41eeb8861f"));
    }

    #[test]
    fn test_both_chains_share_account_bytes() {
        let record = test_record();
        assert_eq!(
            derive_address(&record, Chain::Ethereum).account_bytes(),
            derive_address(&record, Chain::Tron).account_bytes()
        );
    }

    #[test]
    fn test_tron_address_parse_roundtrip() {
        let parsed: TronAddress = "TXjSsfJ1sEJUDvkJFQG1BX8e7KEy2kYyXq".parse().unwrap();
        assert_eq!(parsed.to_string(), "TXjSsfJ1sEJUDvkJFQG1BX8e7KEy2kYyXq");
    }

    #[test]
    fn test_tron_address_rejects_bad_checksum() {
        let err = "TXjSsfJ1sEJUDvkJFQG1BX8e7KEy2kYyXr"
            .parse::<TronAddress>()
            .unwrap_err();
        assert!(matches!(err, CustodyError::InvalidAddress(_)));
    }

    #[test]
    fn test_tron_address_rejects_wrong_version() {
        let mut payload = vec![0x00];
        payload.extend_from_slice(&[0x11; 20]);
        let encoded = bs58::encode(payload).with_check().into_string();

        let err = encoded.parse::<TronAddress>().unwrap_err();
        assert!(matches!(err, CustodyError::InvalidAddress(_)));
    }

    #[test]
    fn test_chain_from_str() {
        assert_eq!("ETH".parse::<Chain>().unwrap(), Chain::Ethereum);
        assert_eq!("tron".parse::<Chain>().unwrap(), Chain::Tron);
        assert!("solana".parse::<Chain>().is_err());
    }
}
