// Raffle View - Configuration
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::error::{RaffleClientError, Result};
use crate::raffle_state::Address;

/// Endpoints, deployment addresses and tuning knobs for the client
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ClientConfig {
    /// Hosted indexer query endpoint
    pub indexer_url: String,
    /// JSON-RPC provider
    pub rpc_url: String,
    pub chain_id: u64,
    /// Raffle factory, also the registry of raffle addresses
    pub factory: Address,
    /// Deployer that current raffles report; must match `factory`
    pub deployer: Address,
    /// Stable token used for tickets and prizes
    pub usdc_token: Address,
    pub usdc_decimals: u8,
    pub indexer_timeout_ms: u64,
    pub rpc_timeout_ms: u64,
    /// Raffles read concurrently during the on-chain fallback
    pub rpc_batch_size: usize,
    /// Addresses per registry page
    pub registry_page_size: u64,
    /// Raffles requested per indexer page
    pub indexer_page_size: u32,
    /// Entries in the "Big prizes" and "Ending soon" lists
    pub list_limit: usize,
    pub tick_interval_ms: u64,
    /// Where the connector choice and disclaimer flag are kept
    pub preferences_path: PathBuf,
}

impl Default for ClientConfig {
    fn default() -> Self {
        // Deployment addresses have no sensible default and must be configured
        Self {
            indexer_url: "http://localhost:8000/subgraphs/name/raffles".to_string(),
            rpc_url: "http://localhost:8545".to_string(),
            chain_id: 31337,
            factory: Address::ZERO,
            deployer: Address::ZERO,
            usdc_token: Address::ZERO,
            usdc_decimals: 6,
            indexer_timeout_ms: 4_000,
            rpc_timeout_ms: 15_000,
            rpc_batch_size: 5,
            registry_page_size: 50,
            indexer_page_size: 500,
            list_limit: 6,
            tick_interval_ms: 1_000,
            preferences_path: PathBuf::from("raffle-view.prefs"),
        }
    }
}

fn env_var<T: FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|e| RaffleClientError::Config(format!("{}: {}", name, e))),
        Err(_) => Ok(None),
    }
}

impl ClientConfig {
    /// Defaults overlaid with `RAFFLE_*` environment variables, then validated
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(v) = env_var("RAFFLE_INDEXER_URL")? {
            config.indexer_url = v;
        }
        if let Some(v) = env_var("RAFFLE_RPC_URL")? {
            config.rpc_url = v;
        }
        if let Some(v) = env_var("RAFFLE_CHAIN_ID")? {
            config.chain_id = v;
        }
        if let Some(v) = env_var::<Address>("RAFFLE_FACTORY")? {
            config.factory = v;
            // The factory is the deployer unless told otherwise
            config.deployer = v;
        }
        if let Some(v) = env_var("RAFFLE_DEPLOYER")? {
            config.deployer = v;
        }
        if let Some(v) = env_var("RAFFLE_USDC")? {
            config.usdc_token = v;
        }
        if let Some(v) = env_var("RAFFLE_INDEXER_TIMEOUT_MS")? {
            config.indexer_timeout_ms = v;
        }
        if let Some(v) = env_var::<PathBuf>("RAFFLE_PREFERENCES_PATH")? {
            config.preferences_path = v;
        }
        config.validate()?;
        info!(factory = %config.factory, chain_id = config.chain_id, "loaded config from environment");
        Ok(config)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: ClientConfig = serde_json::from_str(text)
            .map_err(|e| RaffleClientError::Config(format!("invalid config JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.factory.is_zero() {
            return Err(RaffleClientError::Config("factory address is not set".to_string()));
        }
        if self.deployer != self.factory {
            return Err(RaffleClientError::Config(format!(
                "deployer filter {} does not match factory {}",
                self.deployer, self.factory
            )));
        }
        if self.usdc_token.is_zero() {
            return Err(RaffleClientError::Config("stable token address is not set".to_string()));
        }
        if self.usdc_decimals > 38 {
            return Err(RaffleClientError::Config("token decimals above 38".to_string()));
        }
        if self.rpc_batch_size == 0 || self.registry_page_size == 0 || self.indexer_page_size == 0 {
            return Err(RaffleClientError::Config("batch and page sizes must be positive".to_string()));
        }
        if self.indexer_timeout_ms == 0 || self.rpc_timeout_ms == 0 || self.tick_interval_ms == 0 {
            return Err(RaffleClientError::Config("timeouts and intervals must be positive".to_string()));
        }
        Ok(())
    }

    /// The one deployer every fetched raffle is filtered against
    pub fn current_deployer(&self) -> Address {
        self.deployer
    }

    pub fn indexer_timeout(&self) -> Duration {
        Duration::from_millis(self.indexer_timeout_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}
