//! Network configuration from a TOML file.
//!
//! Each named network carries an RPC url, the confirmation depth the
//! deployer waits for and the environment variable holding the signing key.
//! A network may also name a block explorer.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crowdledger_core::{CoreError, Keypair};
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "crowdledger.toml";
pub const DEFAULT_NETWORK: &str = "localhost";
pub const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8545";
pub const DEFAULT_CONFIRMATIONS: u64 = 5;
pub const DEFAULT_KEY_ENV: &str = "PRIVATE_KEY";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("network {0:?} is not configured")]
    UnknownNetwork(String),
    #[error("environment variable {0} with the signing key is not set")]
    MissingKey(String),
    #[error("signing key in {var} is invalid: {source}")]
    InvalidKey { var: String, source: CoreError },
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub default_network: Option<String>,
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkConfig>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct NetworkConfig {
    pub url: String,
    #[serde(default)]
    pub chain_id: Option<u64>,
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,
    #[serde(default = "default_key_env")]
    pub private_key_env: String,
    #[serde(default)]
    pub explorer: Option<ExplorerConfig>,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct ExplorerConfig {
    pub api_url: String,
    #[serde(default)]
    pub browser_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_confirmations() -> u64 {
    DEFAULT_CONFIRMATIONS
}

fn default_key_env() -> String {
    DEFAULT_KEY_ENV.to_string()
}

impl Default for Config {
    fn default() -> Self {
        let mut networks = BTreeMap::new();
        networks.insert(
            DEFAULT_NETWORK.to_string(),
            NetworkConfig {
                url: DEFAULT_RPC_URL.to_string(),
                chain_id: None,
                confirmations: DEFAULT_CONFIRMATIONS,
                private_key_env: default_key_env(),
                explorer: None,
            },
        );
        Self {
            default_network: Some(DEFAULT_NETWORK.to_string()),
            networks,
        }
    }
}

impl Config {
    pub fn from_toml(path: &Path, text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(path, &text)
    }

    /// Load `path` if given, else the default file if present, else the
    /// built-in localhost network.
    pub fn discover(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.exists() {
                    Self::load(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Resolve a network by name, falling back to `default_network`.
    pub fn network(&self, name: Option<&str>) -> Result<(String, &NetworkConfig), ConfigError> {
        let name = name
            .or(self.default_network.as_deref())
            .unwrap_or(DEFAULT_NETWORK);
        self.networks
            .get(name)
            .map(|net| (name.to_string(), net))
            .ok_or_else(|| ConfigError::UnknownNetwork(name.to_string()))
    }
}

impl NetworkConfig {
    /// Signing key from the configured environment variable.
    pub fn signer(&self) -> Result<Keypair, ConfigError> {
        let value = std::env::var(&self.private_key_env)
            .map_err(|_| ConfigError::MissingKey(self.private_key_env.clone()))?;
        let value = value.trim();
        let value = value.strip_prefix("0x").unwrap_or(value);
        Keypair::from_hex(value).map_err(|source| ConfigError::InvalidKey {
            var: self.private_key_env.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
default_network = "testnet"

[networks.localhost]
url = "http://127.0.0.1:8545"
confirmations = 0

[networks.testnet]
url = "https://rpc.testnet.example"
chain_id = 168587773
private_key_env = "TESTNET_KEY"

[networks.testnet.explorer]
api_url = "https://api.explorer.example/api"
browser_url = "https://explorer.example"
api_key = "testnet"
"#;

    #[test]
    fn parses_networks_with_defaults() {
        let cfg = Config::from_toml(Path::new("sample.toml"), SAMPLE).unwrap();
        let (name, net) = cfg.network(None).unwrap();
        assert_eq!(name, "testnet");
        assert_eq!(net.chain_id, Some(168587773));
        assert_eq!(net.confirmations, DEFAULT_CONFIRMATIONS);
        assert_eq!(net.private_key_env, "TESTNET_KEY");
        assert_eq!(net.explorer.as_ref().unwrap().api_key.as_deref(), Some("testnet"));

        let (_, local) = cfg.network(Some("localhost")).unwrap();
        assert_eq!(local.confirmations, 0);
        assert_eq!(local.private_key_env, DEFAULT_KEY_ENV);
        assert!(local.explorer.is_none());
    }

    #[test]
    fn unknown_network_is_an_error() {
        let cfg = Config::default();
        assert!(matches!(
            cfg.network(Some("mainnet")),
            Err(ConfigError::UnknownNetwork(name)) if name == "mainnet"
        ));
        assert_eq!(cfg.network(None).unwrap().1.url, DEFAULT_RPC_URL);
    }

    #[test]
    fn malformed_toml_reports_path() {
        let err = Config::from_toml(Path::new("broken.toml"), "networks = 3").unwrap_err();
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn signer_reads_named_variable() {
        let key = Keypair::generate();
        let var = "CROWDLEDGER_TEST_SIGNER_KEY";
        std::env::set_var(var, format!("0x{}", key.secret_hex()));
        let net = NetworkConfig {
            url: DEFAULT_RPC_URL.into(),
            chain_id: None,
            confirmations: 0,
            private_key_env: var.into(),
            explorer: None,
        };
        assert_eq!(net.signer().unwrap().address(), key.address());
        std::env::remove_var(var);
        assert!(matches!(net.signer(), Err(ConfigError::MissingKey(_))));
    }
}
