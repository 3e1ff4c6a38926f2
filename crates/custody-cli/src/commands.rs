//! CLI command implementations

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use custody_chains::{
    recover_message_signer, recover_message_signer_v2, SignerContext, TransactionRequest,
    TronTransaction, TypedDataRequest,
};
use custody_core::{Chain, KeyHandle};
use serde_json::json;
use tracing::info;

use crate::config::SignerConfig;

/// Custody Signer - Ethereum and Tron signing through a signing oracle
#[derive(Parser)]
#[command(name = "custody-signer")]
#[command(about = "Ethereum and Tron signing with keys held by a signing oracle")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the JSON config file
    #[arg(long, env = "CUSTODY_SIGNER_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Key handle, overriding the configured one
    #[arg(long, global = true)]
    pub key: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a config file with a new software key
    InitConfig {
        /// Replace an existing config
        #[arg(long)]
        force: bool,
    },

    /// Show the signer's address
    Address {
        #[arg(short, long, default_value = "ethereum")]
        chain: Chain,
    },

    /// Sign a personal message
    SignMessage {
        #[arg(short, long, default_value = "ethereum")]
        chain: Chain,

        /// UTF-8 message text
        #[arg(short, long, conflicts_with = "hex")]
        message: Option<String>,

        /// Message bytes as hex
        #[arg(long)]
        hex: Option<String>,
    },

    /// Sign EIP-712 typed data from a JSON file
    SignTypedData {
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Sign an Ethereum transaction request from a JSON file
    SignTx {
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Sign a TronWeb transaction from a JSON file
    SignTronTx {
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Recover the signer of an Ethereum personal message
    RecoverMessage {
        #[arg(short, long)]
        message: String,

        #[arg(short, long)]
        signature: String,
    },

    /// Recover the Tron address behind a TIP-191 signature
    VerifyTronMessage {
        #[arg(short, long)]
        message: String,

        #[arg(short, long)]
        signature: String,
    },
}

/// Run a command against a loaded config
pub async fn run(cli: Cli, config: SignerConfig, config_path: &Path) -> Result<()> {
    let handle = cli
        .key
        .map(KeyHandle::from)
        .unwrap_or_else(|| config.key_handle.clone());

    match cli.command {
        Commands::InitConfig { force } => {
            if !force {
                println!("Config already present at {}", config_path.display());
                println!("Use --force to replace it");
                return Ok(());
            }
            SignerConfig::generate().save(config_path)?;
            println!("Wrote new config to {}", config_path.display());
        }

        Commands::RecoverMessage { message, signature } => {
            let address = recover_message_signer(message.as_bytes(), &signature)?;
            println!("{address}");
        }

        Commands::VerifyTronMessage { message, signature } => {
            let address = recover_message_signer_v2(message.as_bytes(), &signature)?;
            println!("{address}");
        }

        command => {
            let oracle = config.oracle.build(&handle)?;
            info!(key = %handle, backend = oracle.backend(), "Signing oracle ready");
            let context = SignerContext::new(oracle);
            run_with_signer(command, &context, handle, &config).await?;
        }
    }

    Ok(())
}

async fn run_with_signer(
    command: Commands,
    context: &SignerContext,
    handle: KeyHandle,
    config: &SignerConfig,
) -> Result<()> {
    let signer_for =
        |chain: Chain| context.signer(chain, handle.clone(), config.ethereum.clone());

    match command {
        Commands::Address { chain } => {
            let address = signer_for(chain).address().await?;
            println!("{address}");
        }

        Commands::SignMessage {
            chain,
            message,
            hex: hex_message,
        } => {
            let bytes = match (message, hex_message) {
                (Some(text), None) => text.into_bytes(),
                (None, Some(encoded)) => {
                    hex::decode(encoded.trim_start_matches("0x")).context("invalid message hex")?
                }
                _ => return Err(anyhow!("provide exactly one of --message or --hex")),
            };
            let signature = signer_for(chain).sign_message(&bytes).await?;
            println!("{signature}");
        }

        Commands::SignTypedData { file } => {
            let request: TypedDataRequest = read_json(&file)?;
            let signer = context.ethereum(handle.clone(), config.ethereum.clone());
            let signature = signer
                .sign_typed_data(&request.domain, &request.types, &request.value)
                .await?;
            println!("{signature}");
        }

        Commands::SignTx { file } => {
            let request: TransactionRequest = read_json(&file)?;
            let signer = context.ethereum(handle.clone(), config.ethereum.clone());
            let signed = signer.sign_transaction(&request).await?;
            let output = json!({
                "raw": signed.raw_hex(),
                "hash": signed.hash.to_string(),
                "v": signed.v,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Commands::SignTronTx { file } => {
            let transaction: TronTransaction = read_json(&file)?;
            let signer = context.tron(handle.clone());
            let signed = signer.sign_transaction(&transaction).await?;
            println!("{}", serde_json::to_string_pretty(&signed)?);
        }

        Commands::InitConfig { .. }
        | Commands::RecoverMessage { .. }
        | Commands::VerifyTronMessage { .. } => {}
    }

    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use custody_core::PublicKeyEncoding;
    use tempfile::TempDir;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_sign_message() {
        let cli = Cli::try_parse_from([
            "custody-signer",
            "sign-message",
            "--chain",
            "tron",
            "--message",
            "hello",
            "--key",
            "alias/hot",
        ])
        .unwrap();

        assert_eq!(cli.key.as_deref(), Some("alias/hot"));
        match cli.command {
            Commands::SignMessage { chain, message, hex } => {
                assert_eq!(chain, Chain::Tron);
                assert_eq!(message.as_deref(), Some("hello"));
                assert!(hex.is_none());
            }
            _ => panic!("expected sign-message"),
        }
    }

    #[test]
    fn test_message_and_hex_conflict() {
        let result = Cli::try_parse_from([
            "custody-signer",
            "sign-message",
            "--message",
            "a",
            "--hex",
            "00",
        ]);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_sign_tx_from_file() {
        let dir = TempDir::new().unwrap();
        let tx_path = dir.path().join("tx.json");
        std::fs::write(
            &tx_path,
            r#"{ "type": "eip1559", "to": "0x1234567890123456789012345678901234567890" }"#,
        )
        .unwrap();

        let mut config = SignerConfig::generate();
        if let crate::config::OracleConfig::Software {
            public_key_encoding,
            ..
        } = &mut config.oracle
        {
            *public_key_encoding = PublicKeyEncoding::Compressed;
        }

        let cli = Cli::try_parse_from([
            "custody-signer",
            "sign-tx",
            "--file",
            tx_path.to_str().unwrap(),
        ])
        .unwrap();

        run(cli, config, &dir.path().join("config.json")).await.unwrap();
    }

    #[tokio::test]
    async fn test_recover_rejects_bad_signature() {
        let cli = Cli::try_parse_from([
            "custody-signer",
            "verify-tron-message",
            "--message",
            "hi",
            "--signature",
            "abcd",
        ])
        .unwrap();

        let result = run(cli, SignerConfig::default(), Path::new("unused.json")).await;
        assert!(result.is_err());
    }
}
