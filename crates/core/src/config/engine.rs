//! Engine configuration with profile support.
//!
//! Profiles (default, conservative, aggressive) tune solver bounds and the
//! guard's health factor floor. Configuration is only handed to the solver
//! and executor after [`EngineConfigBuilder::build`] validates it.

use serde::{Deserialize, Serialize};
use std::path::Path;

use anyhow::Context;

use crate::error::LoopError;
use crate::guard::{CollateralHealthGuard, GuardParams};
use crate::model::SCALE;
use crate::solver::{LeverageSolver, SolverParams};

/// Flash liquidity parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashConfig {
    /// Flat fee in basis points (9 = 0.09%)
    #[serde(default = "default_fee_bps")]
    pub fee_bps: u16,
}

fn default_fee_bps() -> u16 {
    9
}

impl Default for FlashConfig {
    fn default() -> Self {
        Self {
            fee_bps: default_fee_bps(),
        }
    }
}

/// Main engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Profile name (for logging/identification)
    #[serde(default = "default_profile_name")]
    pub profile: String,

    #[serde(default)]
    pub solver: SolverParams,

    #[serde(default)]
    pub flash: FlashConfig,

    #[serde(default)]
    pub guard: GuardParams,
}

fn default_profile_name() -> String {
    "default".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            profile: default_profile_name(),
            solver: SolverParams::default(),
            flash: FlashConfig::default(),
            guard: GuardParams::default(),
        }
    }
}

impl EngineConfig {
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Load and validate configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read engine config {:?}", path))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse engine config {:?}", path))?;
        Ok(EngineConfigBuilder::from(config).build()?)
    }

    /// Fewer loops and a health buffer above the liquidation boundary.
    fn conservative() -> Self {
        Self {
            profile: "conservative".to_string(),
            solver: SolverParams {
                max_loop_count: 10,
                epsilon: 50,
                ..SolverParams::default()
            },
            flash: FlashConfig::default(),
            guard: GuardParams {
                min_health_factor: 1.05,
            },
        }
    }

    /// Deep loops with a looser leverage tolerance.
    fn aggressive() -> Self {
        Self {
            profile: "aggressive".to_string(),
            solver: SolverParams {
                max_loop_count: 60,
                epsilon: 200,
                max_iterations: 200,
            },
            flash: FlashConfig::default(),
            guard: GuardParams::default(),
        }
    }

    /// Get profile from environment variable LOOPER_PROFILE, or default.
    /// Supported values: default, conservative, aggressive
    pub fn from_env() -> Result<Self, LoopError> {
        let profile = std::env::var("LOOPER_PROFILE").unwrap_or_else(|_| "default".to_string());
        Self::for_profile(&profile)
    }

    /// Named profile, validated by [`EngineConfigBuilder::build`].
    pub fn for_profile(profile: &str) -> Result<Self, LoopError> {
        let config = match profile.to_lowercase().as_str() {
            "conservative" | "safe" => Self::conservative(),
            "aggressive" | "aggro" => Self::aggressive(),
            _ => Self::default(),
        };
        EngineConfigBuilder::from(config).build()
    }

    pub fn solver(&self) -> LeverageSolver {
        LeverageSolver::new(self.solver)
    }

    pub fn guard(&self) -> CollateralHealthGuard {
        CollateralHealthGuard::from_params(&self.guard)
    }

    /// Log the current configuration.
    pub fn log_config(&self) {
        tracing::info!(profile = %self.profile, "Engine configuration loaded");
        tracing::info!(
            max_loop_count = self.solver.max_loop_count,
            epsilon = self.solver.epsilon,
            max_iterations = self.solver.max_iterations,
            "Solver bounds"
        );
        tracing::info!(
            flash_fee_bps = self.flash.fee_bps,
            min_health_factor = self.guard.min_health_factor,
            "Execution parameters"
        );
    }
}

/// Validating builder for [`EngineConfig`].
#[derive(Debug, Clone, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl From<EngineConfig> for EngineConfigBuilder {
    fn from(config: EngineConfig) -> Self {
        Self { config }
    }
}

impl EngineConfigBuilder {
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.config.profile = profile.into();
        self
    }

    pub fn max_loop_count(mut self, max_loop_count: u32) -> Self {
        self.config.solver.max_loop_count = max_loop_count;
        self
    }

    pub fn epsilon(mut self, epsilon: u64) -> Self {
        self.config.solver.epsilon = epsilon;
        self
    }

    pub fn max_iterations(mut self, max_iterations: u32) -> Self {
        self.config.solver.max_iterations = max_iterations;
        self
    }

    pub fn flash_fee_bps(mut self, fee_bps: u16) -> Self {
        self.config.flash.fee_bps = fee_bps;
        self
    }

    pub fn min_health_factor(mut self, min_health_factor: f64) -> Self {
        self.config.guard.min_health_factor = min_health_factor;
        self
    }

    pub fn build(self) -> Result<EngineConfig, LoopError> {
        let config = self.config;
        if config.solver.max_loop_count < 1 {
            return Err(LoopError::validation("max_loop_count must be at least 1"));
        }
        if config.solver.epsilon == 0 {
            return Err(LoopError::validation("epsilon must be positive"));
        }
        if config.solver.max_iterations < 1 {
            return Err(LoopError::validation("max_iterations must be at least 1"));
        }
        if config.flash.fee_bps as u64 >= SCALE {
            return Err(LoopError::validation(format!(
                "flash fee {} bps must be below {}",
                config.flash.fee_bps, SCALE
            )));
        }
        let min_hf = config.guard.min_health_factor;
        if min_hf.is_nan() || min_hf <= 0.0 {
            return Err(LoopError::validation("min_health_factor must be positive"));
        }
        Ok(config)
    }
}
