use std::fmt;
use std::path::Path;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::ledger::models::AssetId;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

fn default_database_url() -> String {
    "sqlite://gateway.db".to_string()
}

fn default_source_native() -> String {
    "WAVES".to_string()
}

fn default_destination_native() -> String {
    "TN".to_string()
}

fn default_transfer_type() -> u8 {
    4
}

fn default_tx_fee() -> u64 {
    2_000_000
}

fn default_memo() -> String {
    "Thanks for using our service!".to_string()
}

fn default_poll_interval() -> u64 {
    1
}

/// Source network: where deposits to the gateway are observed
#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub node: String,
    /// Chain tag, also the key of this bridge's row in `heights`
    pub network: String,
    pub asset_id: String,
    #[serde(default = "default_source_native")]
    pub native_asset: String,
    pub decimals: u32,
    pub confirmations: u64,
    pub gateway_address: String,
    /// Cursor value used when no `heights` row exists yet
    #[serde(default)]
    pub start_height: u64,
    #[serde(default = "default_transfer_type")]
    pub transfer_type: u8,
}

impl SourceConfig {
    pub fn asset(&self) -> AssetId {
        AssetId::from_configured(&self.asset_id, &self.native_asset)
    }
}

/// Destination network: where payouts are issued from the gateway wallet
#[derive(Deserialize, Clone)]
pub struct DestinationConfig {
    pub node: String,
    pub network: String,
    pub asset_id: String,
    #[serde(default = "default_destination_native")]
    pub native_asset: String,
    pub decimals: u32,
    /// Payout sender, must be held by the node wallet behind `api_key`
    pub gateway_address: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Name of an environment variable holding the API key, wins over `api_key`
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Fixed fee in source-asset human units
    pub fee: Decimal,
    /// Network fee in destination smallest units
    #[serde(default = "default_tx_fee")]
    pub tx_fee: u64,
    #[serde(default = "default_memo")]
    pub memo: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

impl DestinationConfig {
    pub fn asset(&self) -> AssetId {
        AssetId::from_configured(&self.asset_id, &self.native_asset)
    }

    /// Resolve the signing credential, preferring the named environment variable
    pub fn credential(&self) -> AppResult<String> {
        if let Some(name) = &self.api_key_env {
            if let Ok(value) = std::env::var(name) {
                if !value.is_empty() {
                    return Ok(value);
                }
            }
        }

        self.api_key
            .clone()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                AppError::Config(format!(
                    "no signing credential for {}: set destination.api_key or {}",
                    self.network,
                    self.api_key_env.as_deref().unwrap_or("destination.api_key_env")
                ))
            })
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    pub source: SourceConfig,
    pub destination: DestinationConfig,
}

impl Config {
    /// Load from a config file layered with `GATEWAY__*` environment overrides
    pub fn load(path: impl AsRef<Path>) -> AppResult<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::File::from(path.as_ref()))
            .add_source(::config::Environment::with_prefix("GATEWAY").separator("__"))
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the path in `GATEWAY_CONFIG`, falling back to `config.toml`
    pub fn from_env() -> AppResult<Self> {
        let path = std::env::var("GATEWAY_CONFIG")
            .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load(path)
    }

    pub fn validate(&self) -> AppResult<()> {
        for (name, node, address, decimals) in [
            ("source", &self.source.node, &self.source.gateway_address, self.source.decimals),
            (
                "destination",
                &self.destination.node,
                &self.destination.gateway_address,
                self.destination.decimals,
            ),
        ] {
            if node.trim().is_empty() {
                return Err(AppError::Config(format!("{name}.node must not be empty")));
            }
            if address.trim().is_empty() {
                return Err(AppError::Config(format!("{name}.gateway_address must not be empty")));
            }
            // Decimal carries at most 28 fractional digits
            if decimals > 18 {
                return Err(AppError::Config(format!("{name}.decimals must be at most 18")));
            }
        }

        if self.destination.fee.is_sign_negative() {
            return Err(AppError::Config("destination.fee must not be negative".to_string()));
        }
        if self.destination.poll_interval_secs == 0 {
            return Err(AppError::Config(
                "destination.poll_interval_secs must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

impl fmt::Debug for DestinationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DestinationConfig")
            .field("node", &self.node)
            .field("network", &self.network)
            .field("asset_id", &self.asset_id)
            .field("decimals", &self.decimals)
            .field("gateway_address", &self.gateway_address)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_key_env", &self.api_key_env)
            .field("fee", &self.fee)
            .field("tx_fee", &self.tx_fee)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .finish()
    }
}
