//! Error types for chain adapters

use custody_core::CustodyError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ChainError>;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error(transparent)]
    Custody(#[from] CustodyError),

    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("Signature is not valid hex: {0}")]
    InvalidSignatureHex(String),

    #[error("Typed data error: {0}")]
    TypedData(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ChainError {
    /// The core error underneath, if any
    pub fn custody(&self) -> Option<&CustodyError> {
        match self {
            ChainError::Custody(e) => Some(e),
            _ => None,
        }
    }
}
