// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 GigNova

//! # Runtime Configuration
//!
//! Environment variable names, defaults and loaders for the client pipeline
//! ([`ClientConfig`]) and the development network ([`DevnetConfig`]).
//!
//! ## Client
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `GIGNOVA_RPC_URL` | EVM JSON-RPC endpoint | `http://127.0.0.1:8545` |
//! | `GIGNOVA_CONTRACT` | Marketplace contract address | Required |
//! | `GIGNOVA_CHAIN_ID` | Expected chain id | Not checked |
//! | `GIGNOVA_CONFIRMATIONS` | Blocks a receipt must be buried under | `1` |
//! | `GIGNOVA_FINALITY_TIMEOUT_SECS` | Finality wait per transaction | `60` |
//! | `GIGNOVA_STORAGE_NODES` | Comma-separated storage node URLs | Required |
//! | `GIGNOVA_AGGREGATOR_URL` | Aggregator URL | Required |
//! | `GIGNOVA_KEY_SERVER_DIRECTORY` | URL of the key server listing | Required |
//! | `GIGNOVA_KEY_SERVER_THRESHOLD` | Key servers needed to decrypt | `2` |
//! | `GIGNOVA_EPOCHS` | Storage duration of published blobs | `5` |
//! | `GIGNOVA_PROPAGATION` | `poll` or `fixed` | `poll` |
//! | `GIGNOVA_PROPAGATION_DELAY_MS` | Delay of the `fixed` policy | `5000` |
//! | `GIGNOVA_POLL_INTERVAL_MS` | Interval of the `poll` policy | `250` |
//! | `GIGNOVA_POLL_TIMEOUT_MS` | Timeout of the `poll` policy | `30000` |
//! | `GIGNOVA_FETCH_TIMEOUT_SECS` | Aggregator request timeout | `30` |
//! | `GIGNOVA_MAX_FILE_SIZE` | Largest accepted deliverable in bytes | `104857600` |
//! | `GIGNOVA_WALLET_KEY` | Hex private key of the signing wallet | - |
//! | `GIGNOVA_WALLET_KEY_PATH` | PEM file with the signing key | - |
//!
//! ## Development network
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Bind address | `127.0.0.1` |
//! | `PORT` | Bind port | `8090` |
//! | `DEVNET_PUBLIC_URL` | Base URL recorded for key servers | `http://{HOST}:{PORT}` |
//! | `DEVNET_STORAGE_NODES` | Number of storage nodes | `4` |
//! | `DEVNET_KEY_SERVERS` | Number of key servers | `3` |
//! | `DEVNET_KEY_SEED` | Seed for key server secrets | `gignova-devnet` |
//! | `DEVNET_SWEEP_INTERVAL_SECS` | Blob expiry sweep interval | `60` |
//! | `GIGNOVA_RPC_URL`, `GIGNOVA_CONTRACT`, `GIGNOVA_CHAIN_ID` | Ledger the nodes observe | As above |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::Address;

use crate::ledger::{EvmLedgerConfig, Wallet};
use crate::pipeline::DEFAULT_MAX_FILE_SIZE;
use crate::storage::{
    PropagationPolicy, PublisherConfig, DEFAULT_EPOCHS, DEFAULT_FETCH_TIMEOUT, DEFAULT_FIXED_DELAY,
    DEFAULT_POLL_INTERVAL, DEFAULT_POLL_TIMEOUT,
};

pub const RPC_URL_ENV: &str = "GIGNOVA_RPC_URL";
pub const CONTRACT_ENV: &str = "GIGNOVA_CONTRACT";
pub const CHAIN_ID_ENV: &str = "GIGNOVA_CHAIN_ID";
pub const CONFIRMATIONS_ENV: &str = "GIGNOVA_CONFIRMATIONS";
pub const FINALITY_TIMEOUT_ENV: &str = "GIGNOVA_FINALITY_TIMEOUT_SECS";
pub const STORAGE_NODES_ENV: &str = "GIGNOVA_STORAGE_NODES";
pub const AGGREGATOR_URL_ENV: &str = "GIGNOVA_AGGREGATOR_URL";
pub const KEY_SERVER_DIRECTORY_ENV: &str = "GIGNOVA_KEY_SERVER_DIRECTORY";
pub const KEY_SERVER_THRESHOLD_ENV: &str = "GIGNOVA_KEY_SERVER_THRESHOLD";
pub const EPOCHS_ENV: &str = "GIGNOVA_EPOCHS";
pub const PROPAGATION_ENV: &str = "GIGNOVA_PROPAGATION";
pub const PROPAGATION_DELAY_ENV: &str = "GIGNOVA_PROPAGATION_DELAY_MS";
pub const POLL_INTERVAL_ENV: &str = "GIGNOVA_POLL_INTERVAL_MS";
pub const POLL_TIMEOUT_ENV: &str = "GIGNOVA_POLL_TIMEOUT_MS";
pub const FETCH_TIMEOUT_ENV: &str = "GIGNOVA_FETCH_TIMEOUT_SECS";
pub const MAX_FILE_SIZE_ENV: &str = "GIGNOVA_MAX_FILE_SIZE";
pub const WALLET_KEY_ENV: &str = "GIGNOVA_WALLET_KEY";
pub const WALLET_KEY_PATH_ENV: &str = "GIGNOVA_WALLET_KEY_PATH";

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const PUBLIC_URL_ENV: &str = "DEVNET_PUBLIC_URL";
pub const DEVNET_NODES_ENV: &str = "DEVNET_STORAGE_NODES";
pub const DEVNET_KEY_SERVERS_ENV: &str = "DEVNET_KEY_SERVERS";
pub const DEVNET_KEY_SEED_ENV: &str = "DEVNET_KEY_SEED";
pub const SWEEP_INTERVAL_ENV: &str = "DEVNET_SWEEP_INTERVAL_SECS";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8545";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8090;
const DEFAULT_KEY_SEED: &str = "gignova-devnet";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration missing: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Variable lookup; `std::env` in production, a map in tests.
struct Env<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Env<'_> {
    fn optional(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, name: &'static str) -> Result<String, ConfigError> {
        self.optional(name).ok_or(ConfigError::Missing(name))
    }

    fn or_default(&self, name: &str, default: &str) -> String {
        self.optional(name).unwrap_or_else(|| default.to_string())
    }

    fn parse<T>(&self, name: &'static str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.optional(name)
            .map(|raw| {
                raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
                    name,
                    reason: e.to_string(),
                })
            })
            .transpose()
    }

    fn parse_or<T>(&self, name: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        Ok(self.parse(name)?.unwrap_or(default))
    }

    fn millis(&self, name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
        Ok(self
            .parse::<u64>(name)?
            .map(Duration::from_millis)
            .unwrap_or(default))
    }

    fn secs(&self, name: &'static str, default: Duration) -> Result<Duration, ConfigError> {
        Ok(self
            .parse::<u64>(name)?
            .map(Duration::from_secs)
            .unwrap_or(default))
    }
}

fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Ledger endpoint settings shared by the client and the devnet.
fn ledger_config(env: &Env<'_>) -> Result<EvmLedgerConfig, ConfigError> {
    let rpc_url = env
        .or_default(RPC_URL_ENV, DEFAULT_RPC_URL)
        .parse::<url::Url>()
        .map_err(|e| ConfigError::Invalid {
            name: RPC_URL_ENV,
            reason: e.to_string(),
        })?;
    let contract = env
        .required(CONTRACT_ENV)?
        .parse::<Address>()
        .map_err(|e| ConfigError::Invalid {
            name: CONTRACT_ENV,
            reason: e.to_string(),
        })?;

    let mut config = EvmLedgerConfig::new(rpc_url, contract);
    config.chain_id = env.parse(CHAIN_ID_ENV)?;
    config.confirmations = env.parse_or(CONFIRMATIONS_ENV, config.confirmations)?;
    config.finality_timeout = env.secs(FINALITY_TIMEOUT_ENV, config.finality_timeout)?;
    Ok(config)
}

/// Configuration of the submission and retrieval pipeline.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub ledger: EvmLedgerConfig,
    pub storage_nodes: Vec<String>,
    pub aggregator_url: String,
    pub key_server_directory: String,
    pub key_server_threshold: u8,
    pub publisher: PublisherConfig,
    pub fetch_timeout: Duration,
    pub max_file_size: u64,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&process_env)
    }

    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(lookup);

        let storage_nodes: Vec<String> = env
            .required(STORAGE_NODES_ENV)?
            .split(',')
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .collect();
        if storage_nodes.is_empty() {
            return Err(ConfigError::Missing(STORAGE_NODES_ENV));
        }

        let key_server_threshold = env.parse_or(KEY_SERVER_THRESHOLD_ENV, 2u8)?;
        if key_server_threshold == 0 {
            return Err(ConfigError::Invalid {
                name: KEY_SERVER_THRESHOLD_ENV,
                reason: "must be at least 1".to_string(),
            });
        }

        let epochs = env.parse_or(EPOCHS_ENV, DEFAULT_EPOCHS)?;
        if epochs == 0 {
            return Err(ConfigError::Invalid {
                name: EPOCHS_ENV,
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            ledger: ledger_config(&env)?,
            storage_nodes,
            aggregator_url: env.required(AGGREGATOR_URL_ENV)?,
            key_server_directory: env.required(KEY_SERVER_DIRECTORY_ENV)?,
            key_server_threshold,
            publisher: PublisherConfig {
                epochs,
                propagation: propagation_policy(&env)?,
            },
            fetch_timeout: env.secs(FETCH_TIMEOUT_ENV, DEFAULT_FETCH_TIMEOUT)?,
            max_file_size: env.parse_or(MAX_FILE_SIZE_ENV, DEFAULT_MAX_FILE_SIZE)?,
        })
    }
}

fn propagation_policy(env: &Env<'_>) -> Result<PropagationPolicy, ConfigError> {
    match env.or_default(PROPAGATION_ENV, "poll").as_str() {
        "fixed" => Ok(PropagationPolicy::FixedDelay(
            env.millis(PROPAGATION_DELAY_ENV, DEFAULT_FIXED_DELAY)?,
        )),
        "poll" => Ok(PropagationPolicy::PollUntilVisible {
            interval: env.millis(POLL_INTERVAL_ENV, DEFAULT_POLL_INTERVAL)?,
            timeout: env.millis(POLL_TIMEOUT_ENV, DEFAULT_POLL_TIMEOUT)?,
        }),
        other => Err(ConfigError::Invalid {
            name: PROPAGATION_ENV,
            reason: format!("expected `poll` or `fixed`, got `{other}`"),
        }),
    }
}

/// Signing wallet from `GIGNOVA_WALLET_KEY` or the PEM file at
/// `GIGNOVA_WALLET_KEY_PATH`.
pub fn load_wallet() -> Result<Wallet, ConfigError> {
    load_wallet_from(&process_env)
}

fn load_wallet_from(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Wallet, ConfigError> {
    let env = Env(lookup);
    if let Some(hex) = env.optional(WALLET_KEY_ENV) {
        return Wallet::from_hex(&hex).map_err(|e| ConfigError::Invalid {
            name: WALLET_KEY_ENV,
            reason: e.to_string(),
        });
    }

    let path = env.required(WALLET_KEY_PATH_ENV)?;
    let pem = std::fs::read(&path).map_err(|e| ConfigError::Invalid {
        name: WALLET_KEY_PATH_ENV,
        reason: format!("failed to read {path}: {e}"),
    })?;
    Wallet::from_pem(&pem).map_err(|e| ConfigError::Invalid {
        name: WALLET_KEY_PATH_ENV,
        reason: e.to_string(),
    })
}

/// Configuration of the `gignova-devnet` binary.
#[derive(Debug, Clone)]
pub struct DevnetConfig {
    pub host: String,
    pub port: u16,
    pub public_url: String,
    pub storage_nodes: usize,
    pub key_servers: usize,
    pub key_seed: String,
    pub sweep_interval: Duration,
    pub ledger: EvmLedgerConfig,
    pub json_logs: bool,
}

impl DevnetConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&process_env)
    }

    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(lookup);
        let host = env.or_default(HOST_ENV, DEFAULT_HOST);
        let port = env.parse_or(PORT_ENV, DEFAULT_PORT)?;

        let storage_nodes = env.parse_or(DEVNET_NODES_ENV, 4usize)?;
        if storage_nodes == 0 {
            return Err(ConfigError::Invalid {
                name: DEVNET_NODES_ENV,
                reason: "at least one storage node is required".to_string(),
            });
        }
        let key_servers = env.parse_or(DEVNET_KEY_SERVERS_ENV, 3usize)?;
        if key_servers == 0 || key_servers > u8::MAX as usize {
            return Err(ConfigError::Invalid {
                name: DEVNET_KEY_SERVERS_ENV,
                reason: "must be between 1 and 255".to_string(),
            });
        }

        Ok(Self {
            public_url: env
                .optional(PUBLIC_URL_ENV)
                .unwrap_or_else(|| format!("http://{host}:{port}")),
            host,
            port,
            storage_nodes,
            key_servers,
            key_seed: env.or_default(DEVNET_KEY_SEED_ENV, DEFAULT_KEY_SEED),
            sweep_interval: env.secs(SWEEP_INTERVAL_ENV, crate::expiry::DEFAULT_SWEEP_INTERVAL)?,
            ledger: ledger_config(&env)?,
            json_logs: env.or_default(LOG_FORMAT_ENV, "pretty") == "json",
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const CONTRACT: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn client_vars() -> Vec<(&'static str, &'static str)> {
        vec![
            (CONTRACT_ENV, CONTRACT),
            (STORAGE_NODES_ENV, "http://n0/, http://n1"),
            (AGGREGATOR_URL_ENV, "http://agg"),
            (KEY_SERVER_DIRECTORY_ENV, "http://ks/key-servers"),
        ]
    }

    #[test]
    fn client_defaults() {
        let config = ClientConfig::from_lookup(&lookup(&client_vars())).unwrap();
        assert_eq!(config.storage_nodes, vec!["http://n0", "http://n1"]);
        assert_eq!(config.key_server_threshold, 2);
        assert_eq!(config.publisher.epochs, DEFAULT_EPOCHS);
        assert_eq!(config.publisher.propagation, PropagationPolicy::default());
        assert_eq!(config.fetch_timeout, Duration::from_secs(30));
        assert_eq!(config.max_file_size, 100 * 1024 * 1024);
        assert_eq!(config.ledger.rpc_url.as_str(), "http://127.0.0.1:8545/");
        assert_eq!(config.ledger.chain_id, None);
    }

    #[test]
    fn fixed_propagation_is_selectable() {
        let mut vars = client_vars();
        vars.push((PROPAGATION_ENV, "fixed"));
        let config = ClientConfig::from_lookup(&lookup(&vars)).unwrap();
        assert_eq!(
            config.publisher.propagation,
            PropagationPolicy::FixedDelay(Duration::from_secs(5))
        );

        vars.push((PROPAGATION_DELAY_ENV, "1500"));
        let config = ClientConfig::from_lookup(&lookup(&vars)).unwrap();
        assert_eq!(
            config.publisher.propagation,
            PropagationPolicy::FixedDelay(Duration::from_millis(1500))
        );
    }

    #[test]
    fn invalid_values_are_reported() {
        let mut vars = client_vars();
        vars.push((PROPAGATION_ENV, "sometimes"));
        assert!(matches!(
            ClientConfig::from_lookup(&lookup(&vars)),
            Err(ConfigError::Invalid { name: PROPAGATION_ENV, .. })
        ));

        let mut vars = client_vars();
        vars.push((EPOCHS_ENV, "0"));
        assert!(ClientConfig::from_lookup(&lookup(&vars)).is_err());

        let vars = vec![(CONTRACT_ENV, CONTRACT)];
        assert!(matches!(
            ClientConfig::from_lookup(&lookup(&vars)),
            Err(ConfigError::Missing(STORAGE_NODES_ENV))
        ));
    }

    #[test]
    fn devnet_defaults() {
        let config = DevnetConfig::from_lookup(&lookup(&[(CONTRACT_ENV, CONTRACT)])).unwrap();
        assert_eq!(config.bind_address(), "127.0.0.1:8090");
        assert_eq!(config.public_url, "http://127.0.0.1:8090");
        assert_eq!(config.storage_nodes, 4);
        assert_eq!(config.key_servers, 3);
        assert!(!config.json_logs);
    }

    #[test]
    fn wallet_from_pem_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wallet.pem");
        let secret = crate::ledger::signing::random_secret_key().unwrap();
        let pem = k256::pkcs8::EncodePrivateKey::to_pkcs8_pem(&secret, Default::default())
            .unwrap();
        std::fs::write(&path, pem.as_bytes()).unwrap();

        let path = path.to_string_lossy().into_owned();
        let wallet = load_wallet_from(&lookup(&[(WALLET_KEY_PATH_ENV, path.as_str())])).unwrap();
        let expected = Wallet::from_pem(pem.as_bytes()).unwrap();
        assert_eq!(wallet.address(), expected.address());

        assert!(matches!(
            load_wallet_from(&lookup(&[])),
            Err(ConfigError::Missing(WALLET_KEY_PATH_ENV))
        ));
    }
}
