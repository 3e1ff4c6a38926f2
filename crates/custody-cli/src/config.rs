//! Signer configuration

use std::path::{Path, PathBuf};
use std::sync::Arc;

use custody_chains::TransactionDefaults;
use custody_core::{KeyHandle, PublicKeyEncoding, SigningOracle, SoftwareOracle};
use k256::ecdsa::SigningKey;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Overrides the config file location
pub const CONFIG_ENV: &str = "CUSTODY_SIGNER_CONFIG";

/// Overrides the software oracle secret
pub const SECRET_ENV: &str = "CUSTODY_SIGNER_SECRET";

pub const DEFAULT_LOG_FILTER: &str =
    "custody_signer=info,custody_cli=info,custody_core=info,custody_chains=info";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No secret key configured; set CUSTODY_SIGNER_SECRET or run init-config")]
    MissingSecret,

    #[error(transparent)]
    Oracle(#[from] custody_core::CustodyError),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Signing oracle selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum OracleConfig {
    /// In-process keys for development and testing
    Software {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        secret_key_hex: Option<String>,
        #[serde(default)]
        public_key_encoding: PublicKeyEncoding,
    },
}

impl Default for OracleConfig {
    fn default() -> Self {
        OracleConfig::Software {
            secret_key_hex: None,
            public_key_encoding: PublicKeyEncoding::default(),
        }
    }
}

impl OracleConfig {
    /// Build the oracle, preferring `$CUSTODY_SIGNER_SECRET` over the file
    pub fn build(&self, handle: &KeyHandle) -> Result<Arc<dyn SigningOracle>> {
        self.build_with_secret(handle, std::env::var(SECRET_ENV).ok())
    }

    pub fn build_with_secret(
        &self,
        handle: &KeyHandle,
        secret_override: Option<String>,
    ) -> Result<Arc<dyn SigningOracle>> {
        match self {
            OracleConfig::Software {
                secret_key_hex,
                public_key_encoding,
            } => {
                let secret = secret_override
                    .or_else(|| secret_key_hex.clone())
                    .ok_or(ConfigError::MissingSecret)?;
                let oracle = SoftwareOracle::from_secret_hex(handle.clone(), &secret)?
                    .with_public_key_encoding(*public_key_encoding);
                Ok(Arc::new(oracle))
            }
        }
    }
}

/// Signer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignerConfig {
    /// Key handle passed to the oracle
    pub key_handle: KeyHandle,

    /// Oracle backend
    pub oracle: OracleConfig,

    /// Defaults for Ethereum transaction population
    #[serde(default)]
    pub ethereum: TransactionDefaults,

    /// Used when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            key_handle: KeyHandle::new("default"),
            oracle: OracleConfig::default(),
            ethereum: TransactionDefaults {
                chain_id: Some(1),
                ..TransactionDefaults::default()
            },
            log_filter: default_log_filter(),
        }
    }
}

impl SignerConfig {
    /// Default configuration holding a freshly generated software key
    pub fn generate() -> Self {
        let secret = SigningKey::random(&mut OsRng).to_bytes();
        Self {
            oracle: OracleConfig::Software {
                secret_key_hex: Some(hex::encode(secret)),
                public_key_encoding: PublicKeyEncoding::default(),
            },
            ..Self::default()
        }
    }

    /// `--config`, then `$CUSTODY_SIGNER_CONFIG`, then the user config dir
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }

        std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::config_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("custody-signer")
                    .join("config.json")
            })
    }

    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to file
    ///
    /// On unix the file is readable by its owner only.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }

    /// Load `path`, writing a generated config there first if it is missing
    ///
    /// Returns the config and whether it was created.
    pub fn load_or_create(path: &Path) -> Result<(Self, bool)> {
        if path.exists() {
            return Ok((Self::load(path)?, false));
        }

        let config = Self::generate();
        config.save(path)?;
        Ok((config, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = SignerConfig::generate();
        config.save(&path).unwrap();

        let loaded = SignerConfig::load(&path).unwrap();
        assert_eq!(loaded.key_handle, config.key_handle);
        assert_eq!(loaded.oracle, config.oracle);
        assert_eq!(loaded.ethereum, config.ethereum);
    }

    #[test]
    fn test_load_or_create_writes_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");

        let (first, created) = SignerConfig::load_or_create(&path).unwrap();
        assert!(created);
        let (second, created) = SignerConfig::load_or_create(&path).unwrap();
        assert!(!created);
        assert_eq!(first.oracle, second.oracle);
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: SignerConfig = serde_json::from_str(
            r#"{ "key_handle": "alias/hot", "oracle": { "backend": "software" } }"#,
        )
        .unwrap();

        assert_eq!(config.key_handle.as_str(), "alias/hot");
        assert_eq!(config.log_filter, DEFAULT_LOG_FILTER);
        assert_eq!(config.ethereum, TransactionDefaults::default());
    }

    #[test]
    fn test_build_oracle() {
        let handle = KeyHandle::new("k");
        let missing = OracleConfig::default().build_with_secret(&handle, None);
        assert!(matches!(missing, Err(ConfigError::MissingSecret)));

        let secret = "00".repeat(31) + "01";
        let oracle = OracleConfig::default()
            .build_with_secret(&handle, Some(secret))
            .unwrap();
        assert_eq!(oracle.backend(), "software");
    }

    #[test]
    fn test_explicit_path_wins() {
        let path = SignerConfig::resolve_path(Some(Path::new("/tmp/explicit.json")));
        assert_eq!(path, PathBuf::from("/tmp/explicit.json"));
    }
}
