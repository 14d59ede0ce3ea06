//! Configuration - Type-safe, validated config
//!
//! Loads from `config.toml` at the project root. Every section has defaults,
//! so a partial file is fine.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core::{Error, Result};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Application settings
    pub app: AppConfig,

    /// Settlement token
    pub token: TokenConfig,

    /// Escrow custody
    pub escrow: EscrowConfig,

    /// Options registry
    pub registry: RegistryConfig,

    /// Secondary market
    pub market: MarketConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Log level, used when RUST_LOG is unset
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Display symbol
    pub symbol: String,

    /// Decimal places of the smallest unit (USDC = 6)
    pub decimals: u32,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            symbol: "USDC".to_string(),
            decimals: 6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EscrowConfig {
    /// Account the engine holds in-transit funds under
    pub custody_account: String,
}

impl Default for EscrowConfig {
    fn default() -> Self {
        Self {
            custody_account: "exproduce:escrow".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Deployer allowed to authorize the market
    pub owner: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            owner: "exproduce:deployer".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    /// Principal the market acts as when calling back into the registry
    pub account: String,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            account: "exproduce:market".to_string(),
        }
    }
}

/// Token decimals above this cannot be rendered
const MAX_DECIMALS: u32 = 18;

impl Config {
    /// Load from TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config {}: {}", path.display(), e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// First default location (cwd, then project root) holding a valid config.
    ///
    /// Does not log, so it can run before a subscriber is installed.
    pub fn discover() -> Option<(Self, &'static str)> {
        let candidates = [
            "config.toml",
            concat!(env!("CARGO_MANIFEST_DIR"), "/config.toml"),
        ];

        candidates
            .into_iter()
            .find_map(|path| Self::load(Path::new(path)).ok().map(|cfg| (cfg, path)))
    }

    /// Load from the default location, falling back to defaults.
    pub fn load_default() -> Self {
        match Self::discover() {
            Some((cfg, path)) => {
                tracing::info!("Loaded config from {}", path);
                cfg
            }
            None => {
                tracing::warn!("No config.toml found, using defaults");
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.token.decimals > MAX_DECIMALS {
            return Err(Error::Config(format!(
                "token.decimals {} exceeds {}",
                self.token.decimals, MAX_DECIMALS
            )));
        }

        let accounts = [
            ("escrow.custody_account", &self.escrow.custody_account),
            ("registry.owner", &self.registry.owner),
            ("market.account", &self.market.account),
        ];
        for (name, value) in accounts {
            if value.trim().is_empty() {
                return Err(Error::Config(format!("{} must not be empty", name)));
            }
        }

        if self.escrow.custody_account == self.market.account {
            return Err(Error::Config(
                "escrow.custody_account and market.account must differ".to_string(),
            ));
        }

        Ok(())
    }
}
