//! Ethereum transaction population and RLP encoding
//!
//! Two layouts are supported:
//!
//! - Legacy (`tx_type = legacy`): `rlp([nonce, gasPrice, gas, to, value, data])`,
//!   replay protected with EIP-155 when a chain id is present. The signing
//!   payload then appends `chainId, 0, 0` and `v = 35 + 2 * chainId + bit`.
//!   Without a chain id `v = 27 + bit`.
//! - EIP-1559 (`tx_type = eip1559`): `0x02 || rlp([chainId, nonce,
//!   maxPriorityFeePerGas, maxFeePerGas, gas, to, value, data, accessList])`
//!   with the raw recovery bit as `yParity`. A chain id is mandatory.

use alloy_primitives::{keccak256, Address, Bytes, TxKind, B256, U256};
use alloy_rlp::{BufMut, Encodable, Header, RlpEncodable};
use custody_core::{
    derive_address, recover_public_key, Chain, CustodyError, MessageDigest, PublicKeyRecord,
    Signature,
};
use serde::{Deserialize, Serialize};

use crate::error::{ChainError, Result};

/// Gas for a plain value transfer
pub const DEFAULT_GAS_LIMIT: u64 = 21_000;

/// 1 gwei
pub const DEFAULT_GAS_PRICE: u128 = 1_000_000_000;

pub const DEFAULT_MAX_PRIORITY_FEE_PER_GAS: u128 = 1_000_000_000;

pub const DEFAULT_MAX_FEE_PER_GAS: u128 = 2_000_000_000;

/// EIP-2718 type byte of dynamic-fee transactions
pub const EIP1559_TX_TYPE: u8 = 0x02;

/// Transaction layout
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    #[default]
    Legacy,
    Eip1559,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, RlpEncodable)]
#[serde(rename_all = "camelCase")]
pub struct AccessListItem {
    pub address: Address,
    pub storage_keys: Vec<B256>,
}

/// Values used for fields a request leaves empty
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TransactionDefaults {
    pub chain_id: Option<u64>,
    pub gas_limit: u64,
    pub gas_price: u128,
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

impl Default for TransactionDefaults {
    fn default() -> Self {
        Self {
            chain_id: None,
            gas_limit: DEFAULT_GAS_LIMIT,
            gas_price: DEFAULT_GAS_PRICE,
            max_fee_per_gas: DEFAULT_MAX_FEE_PER_GAS,
            max_priority_fee_per_gas: DEFAULT_MAX_PRIORITY_FEE_PER_GAS,
        }
    }
}

/// A transaction as the caller describes it, any field may be left out
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TransactionRequest {
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    pub chain_id: Option<u64>,
    pub nonce: Option<u64>,
    pub to: Option<Address>,
    pub value: Option<U256>,
    pub data: Option<Bytes>,
    pub gas_limit: Option<u64>,
    pub gas_price: Option<u128>,
    pub max_fee_per_gas: Option<u128>,
    pub max_priority_fee_per_gas: Option<u128>,
    pub access_list: Vec<AccessListItem>,
}

impl TransactionRequest {
    pub fn legacy() -> Self {
        Self::default()
    }

    pub fn eip1559() -> Self {
        Self {
            tx_type: TransactionType::Eip1559,
            ..Self::default()
        }
    }

    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = Some(chain_id);
        self
    }

    pub fn with_to(mut self, to: Address) -> Self {
        self.to = Some(to);
        self
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = Some(nonce);
        self
    }

    pub fn with_data(mut self, data: impl Into<Bytes>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Fill every missing field
    ///
    /// A zero chain id counts as absent. EIP-1559 requests without any chain
    /// id fail with [`CustodyError::ChainIdRequired`].
    pub fn populate(&self, defaults: &TransactionDefaults) -> Result<UnsignedTransaction> {
        let chain_id = self.chain_id.or(defaults.chain_id).filter(|id| *id > 0);
        let to = TxKind::from(self.to);
        let value = self.value.unwrap_or_default();
        let input = self.data.clone().unwrap_or_default();
        let nonce = self.nonce.unwrap_or_default();
        let gas_limit = self.gas_limit.unwrap_or(defaults.gas_limit);

        match self.tx_type {
            TransactionType::Legacy => Ok(UnsignedTransaction::Legacy(LegacyTransaction {
                chain_id,
                nonce,
                gas_price: self.gas_price.unwrap_or(defaults.gas_price),
                gas_limit,
                to,
                value,
                input,
            })),
            TransactionType::Eip1559 => {
                let chain_id = chain_id.ok_or(CustodyError::ChainIdRequired)?;
                let max_fee_per_gas = self.max_fee_per_gas.unwrap_or(defaults.max_fee_per_gas);
                let max_priority_fee_per_gas = self
                    .max_priority_fee_per_gas
                    .unwrap_or(defaults.max_priority_fee_per_gas);

                if max_priority_fee_per_gas > max_fee_per_gas {
                    return Err(ChainError::InvalidTransaction(format!(
                        "maxPriorityFeePerGas {max_priority_fee_per_gas} exceeds maxFeePerGas {max_fee_per_gas}"
                    )));
                }

                Ok(UnsignedTransaction::Eip1559(Eip1559Transaction {
                    chain_id,
                    nonce,
                    max_priority_fee_per_gas,
                    max_fee_per_gas,
                    gas_limit,
                    to,
                    value,
                    input,
                    access_list: self.access_list.clone(),
                }))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTransaction {
    pub chain_id: Option<u64>,
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub to: TxKind,
    pub value: U256,
    pub input: Bytes,
}

impl LegacyTransaction {
    fn encode_common(&self, out: &mut dyn BufMut) {
        self.nonce.encode(out);
        self.gas_price.encode(out);
        self.gas_limit.encode(out);
        self.to.encode(out);
        self.value.encode(out);
        self.input.encode(out);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eip1559Transaction {
    pub chain_id: u64,
    pub nonce: u64,
    pub max_priority_fee_per_gas: u128,
    pub max_fee_per_gas: u128,
    pub gas_limit: u64,
    pub to: TxKind,
    pub value: U256,
    pub input: Bytes,
    pub access_list: Vec<AccessListItem>,
}

impl Eip1559Transaction {
    fn encode_common(&self, out: &mut dyn BufMut) {
        self.chain_id.encode(out);
        self.nonce.encode(out);
        self.max_priority_fee_per_gas.encode(out);
        self.max_fee_per_gas.encode(out);
        self.gas_limit.encode(out);
        self.to.encode(out);
        self.value.encode(out);
        self.input.encode(out);
        self.access_list.encode(out);
    }
}

/// A fully populated transaction ready for signing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnsignedTransaction {
    Legacy(LegacyTransaction),
    Eip1559(Eip1559Transaction),
}

impl UnsignedTransaction {
    pub fn tx_type(&self) -> TransactionType {
        match self {
            UnsignedTransaction::Legacy(_) => TransactionType::Legacy,
            UnsignedTransaction::Eip1559(_) => TransactionType::Eip1559,
        }
    }

    pub fn chain_id(&self) -> Option<u64> {
        match self {
            UnsignedTransaction::Legacy(tx) => tx.chain_id,
            UnsignedTransaction::Eip1559(tx) => Some(tx.chain_id),
        }
    }

    /// The unsigned serialization whose Keccak hash gets signed
    pub fn encode_for_signing(&self) -> Vec<u8> {
        match self {
            UnsignedTransaction::Legacy(tx) => rlp_list(|out| {
                tx.encode_common(out);
                if let Some(chain_id) = tx.chain_id {
                    chain_id.encode(out);
                    0u8.encode(out);
                    0u8.encode(out);
                }
            }),
            UnsignedTransaction::Eip1559(tx) => {
                let mut out = vec![EIP1559_TX_TYPE];
                out.extend(rlp_list(|out| tx.encode_common(out)));
                out
            }
        }
    }

    pub fn signing_hash(&self) -> B256 {
        keccak256(self.encode_for_signing())
    }

    /// The `v` carried on the wire for recovery bit `bit`
    pub fn v(&self, bit: u8) -> Result<u64> {
        match self {
            UnsignedTransaction::Legacy(tx) => eip155_v(tx.chain_id, bit),
            UnsignedTransaction::Eip1559(_) => Ok(u64::from(bit)),
        }
    }

    /// Attach a signature and serialize for broadcast
    pub fn into_signed(self, signature: Signature) -> Result<SignedTransaction> {
        let v = self.v(signature.v)?;
        let r = U256::from_be_bytes(signature.r);
        let s = U256::from_be_bytes(signature.s);

        let raw = match &self {
            UnsignedTransaction::Legacy(tx) => rlp_list(|out| {
                tx.encode_common(out);
                v.encode(out);
                r.encode(out);
                s.encode(out);
            }),
            UnsignedTransaction::Eip1559(tx) => {
                let mut raw = vec![EIP1559_TX_TYPE];
                raw.extend(rlp_list(|out| {
                    tx.encode_common(out);
                    signature.v.encode(out);
                    r.encode(out);
                    s.encode(out);
                }));
                raw
            }
        };

        Ok(SignedTransaction {
            hash: keccak256(&raw),
            signing_hash: self.signing_hash(),
            raw: raw.into(),
            tx_type: self.tx_type(),
            v,
            signature,
        })
    }
}

/// A signed, serialized transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub raw: Bytes,
    pub hash: B256,
    pub signing_hash: B256,
    pub tx_type: TransactionType,
    /// `v` as encoded on the wire
    pub v: u64,
    /// Canonical `(r, s)` with the raw recovery bit
    pub signature: Signature,
}

impl SignedTransaction {
    /// `0x`-prefixed raw transaction
    pub fn raw_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.raw))
    }

    /// Address recovered from the signature over the signing hash
    pub fn recover_signer(&self) -> Result<Address> {
        let digest = MessageDigest::new(self.signing_hash.0);
        let point = recover_public_key(&digest, &self.signature.raw(), self.signature.v)?;
        Ok(recovered_address(point))
    }
}

/// `35 + 2 * chainId + bit` with a chain id, `27 + bit` without
pub fn eip155_v(chain_id: Option<u64>, bit: u8) -> Result<u64> {
    match chain_id.filter(|id| *id > 0) {
        Some(chain_id) => chain_id
            .checked_mul(2)
            .and_then(|v| v.checked_add(35 + u64::from(bit)))
            .ok_or_else(|| {
                ChainError::InvalidTransaction(format!("chain id {chain_id} too large for EIP-155"))
            }),
        None => Ok(27 + u64::from(bit)),
    }
}

pub(crate) fn recovered_address(point: [u8; 65]) -> Address {
    let account = custody_core::address::ethereum_address_bytes(&point[1..]);
    Address::from(account)
}

pub(crate) fn record_address(public_key: &PublicKeyRecord) -> Address {
    Address::from(derive_address(public_key, Chain::Ethereum).account_bytes())
}

fn rlp_list(encode_fields: impl FnOnce(&mut dyn BufMut)) -> Vec<u8> {
    let mut payload = Vec::new();
    encode_fields(&mut payload);

    let header = Header {
        list: true,
        payload_length: payload.len(),
    };
    let mut out = Vec::with_capacity(header.length() + payload.len());
    header.encode(&mut out);
    out.extend_from_slice(&payload);
    out
}
