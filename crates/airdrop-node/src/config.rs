//! Node configuration.
//!
//! [`NodeConfig`] holds the data directory, logging settings and the
//! campaign configuration. [`NodeConfig::load`] layers, in increasing
//! priority: built-in defaults, an optional TOML file, and `AIRDROP_*`
//! environment variables (nested fields use `__`, e.g.
//! `AIRDROP_CAMPAIGN__CLAIM_FEE=5`).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use airdrop_campaign::config::CampaignConfig;
use airdrop_core::error::ConfigError;

/// Configuration for a campaign node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Root directory for all persistent data.
    pub data_dir: PathBuf,
    /// Log level filter string (e.g. "info", "debug", "airdrop_campaign=trace").
    pub log_level: String,
    /// `"text"` or `"json"`.
    pub log_format: String,
    /// Campaign parameters.
    pub campaign: CampaignConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("airdrop");

        Self {
            data_dir,
            log_level: "info".to_string(),
            log_format: "text".to_string(),
            campaign: CampaignConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Load configuration from an optional file plus the environment.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(
                ::config::File::from(path)
                    .format(::config::FileFormat::Toml)
                    .required(true),
            );
        }
        builder = builder.add_source(
            ::config::Environment::with_prefix("AIRDROP")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let loaded: NodeConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| ConfigError::Source(e.to_string()))?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Check settings that would only fail later at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.log_format.as_str(), "text" | "json") {
            return Err(ConfigError::Source(format!(
                "log_format must be \"text\" or \"json\", got {:?}",
                self.log_format
            )));
        }
        self.campaign.validate().map(|_| ())
    }

    /// Path to the RocksDB campaign database.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("campaigndata")
    }
}
