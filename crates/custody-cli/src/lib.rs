//! Custody Signer CLI library
//!
//! Configuration and command handling for the `custody-signer` binary.

pub mod commands;
pub mod config;

pub use commands::{Cli, Commands};
pub use config::{ConfigError, OracleConfig, SignerConfig};
