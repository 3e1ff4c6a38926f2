//! Custody Chains - Ethereum and Tron signers over remote-custody keys
//!
//! Each chain owns its digest computation and signature layout. The shared
//! steps (oracle signing, DER decoding, recovery bit search, key
//! normalization) live in `custody-core`.

pub mod error;
pub mod ethereum;
pub mod signer;
pub mod tron;

pub use error::{ChainError, Result};
pub use ethereum::{
    recover_message_signer, recover_typed_data_signer, EthereumSigner, SignedTransaction,
    TransactionDefaults, TransactionRequest, TransactionType, TypedDataField, TypedDataRequest,
};
pub use signer::{ChainSigner, SignerContext};
pub use tron::{recover_message_signer_v2, tron_message_digest, TronSigner, TronTransaction};
