//! Custody Signer - Main entry point

use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use custody_cli::{commands, Cli, SignerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = SignerConfig::resolve_path(cli.config.as_deref());
    let (config, created) = SignerConfig::load_or_create(&config_path)?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if created {
        info!("Created default config at {:?}", config_path);
    }

    commands::run(cli, config, &config_path).await
}
