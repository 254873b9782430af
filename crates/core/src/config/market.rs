//! Market configuration loading from TOML files.
//!
//! A market file lists the reserves of one lending pool deployment with
//! their risk parameters. Files live at `<CONFIG_DIR>/markets/<name>.toml`.

use alloy::primitives::{Address, U256};
use anyhow::{bail, Context, Result};
use looper_chain::ReserveData;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::model::SCALE;

/// Market configuration file structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Market identifier (e.g., "mode")
    pub market: String,
    /// Wrapped native token address (as hex string)
    pub wrapped_native: String,
    /// Listed reserves
    pub reserves: Vec<ReserveConfig>,
}

/// Individual reserve configuration (TOML-loadable).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReserveConfig {
    /// Asset symbol (e.g., "USDC")
    pub symbol: String,
    /// Token contract address (as hex string)
    pub address: String,
    /// Token decimals
    pub decimals: u8,
    /// Loan-to-value in basis points
    pub ltv_bps: u16,
    /// Liquidation threshold in basis points
    pub liquidation_threshold_bps: u16,
    /// Liquidation bonus in basis points (11500 = 15% bonus)
    pub liquidation_bonus_bps: u16,
    /// Share of interest kept by the protocol, in basis points
    #[serde(default)]
    pub reserve_factor_bps: u16,
    #[serde(default = "default_true")]
    pub borrowing_enabled: bool,
    #[serde(default = "default_true")]
    pub active: bool,
    /// Reference price in base currency, used when simulating
    #[serde(default = "default_price")]
    pub price: f64,
}

fn default_true() -> bool {
    true
}

fn default_price() -> f64 {
    1.0
}

impl ReserveConfig {
    /// Parse token address.
    pub fn token_address(&self) -> Result<Address> {
        self.address
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid token address '{}': {}", self.address, e))
    }

    /// Price with 8 decimals.
    pub fn price_e8(&self) -> U256 {
        if self.price <= 0.0 {
            return U256::ZERO;
        }
        U256::from((self.price * 1e8).round() as u128)
    }

    /// Convert to pool reserve data with unit indices and no liquidity.
    pub fn to_reserve_data(&self) -> Result<ReserveData> {
        let mut reserve = ReserveData::new(self.token_address()?, self.symbol.clone(), self.decimals)
            .with_risk(self.ltv_bps, self.liquidation_threshold_bps)
            .with_price(self.price_e8());
        reserve.liquidation_bonus_bps = self.liquidation_bonus_bps;
        reserve.active = self.active;
        reserve.borrowing_enabled = self.borrowing_enabled;
        Ok(reserve)
    }

    /// Parse `amount` in whole tokens (e.g. "1.5") into base units.
    pub fn parse_amount(&self, amount: &str) -> Result<U256> {
        let (whole, frac) = amount.split_once('.').unwrap_or((amount, ""));
        if frac.len() > self.decimals as usize {
            bail!(
                "{} has {} decimals, '{}' is too precise",
                self.symbol,
                self.decimals,
                amount
            );
        }
        let padded = format!("{}{:0<width$}", whole, frac, width = self.decimals as usize);
        U256::from_str_radix(&padded, 10)
            .with_context(|| format!("Invalid {} amount '{}'", self.symbol, amount))
    }
}

impl MarketConfig {
    /// Load and validate a market from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read market config {:?}", path))?;
        let config: MarketConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse market config {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `<config_dir>/markets/<name>.toml`.
    pub fn load(config_dir: impl AsRef<Path>, name: &str) -> Result<Self> {
        Self::from_file(Self::path(config_dir, name))
    }

    /// Load the market named by `MARKET` (default "mode") from `CONFIG_DIR`
    /// (default "./config").
    pub fn from_env() -> Result<Self> {
        let dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "./config".to_string());
        let name = std::env::var("MARKET").unwrap_or_else(|_| "mode".to_string());
        Self::load(dir, &name)
    }

    pub fn path(config_dir: impl AsRef<Path>, name: &str) -> PathBuf {
        config_dir
            .as_ref()
            .join("markets")
            .join(format!("{}.toml", name))
    }

    pub fn validate(&self) -> Result<()> {
        self.wrapped_native_address()?;

        let mut symbols = HashSet::new();
        let mut addresses = HashSet::new();
        for reserve in &self.reserves {
            let address = reserve.token_address()?;
            if reserve.ltv_bps as u64 >= SCALE {
                bail!("{}: ltv {} must be below {}", reserve.symbol, reserve.ltv_bps, SCALE);
            }
            if reserve.ltv_bps > reserve.liquidation_threshold_bps {
                bail!(
                    "{}: ltv {} exceeds liquidation threshold {}",
                    reserve.symbol,
                    reserve.ltv_bps,
                    reserve.liquidation_threshold_bps
                );
            }
            if !symbols.insert(reserve.symbol.to_uppercase()) {
                bail!("Duplicate reserve symbol {}", reserve.symbol);
            }
            if !addresses.insert(address) {
                bail!("Duplicate reserve address {}", address);
            }
        }
        Ok(())
    }

    /// Parse wrapped native address.
    pub fn wrapped_native_address(&self) -> Result<Address> {
        self.wrapped_native.parse().map_err(|e| {
            anyhow::anyhow!("Invalid wrapped native address '{}': {}", self.wrapped_native, e)
        })
    }

    /// Find a reserve by symbol (case-insensitive).
    pub fn reserve(&self, symbol: &str) -> Option<&ReserveConfig> {
        self.reserves
            .iter()
            .find(|r| r.symbol.eq_ignore_ascii_case(symbol))
    }

    /// Get active reserves only.
    pub fn active_reserves(&self) -> impl Iterator<Item = &ReserveConfig> {
        self.reserves.iter().filter(|r| r.active)
    }
}
