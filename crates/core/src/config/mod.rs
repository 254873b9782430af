//! Configuration for the looping engine.
//!
//! This module provides:
//! - Engine configuration (profiles, solver bounds, flash fee, guard floor)
//! - Market configuration (reserves and risk parameters per deployment)

mod engine;
mod market;

pub use engine::{EngineConfig, EngineConfigBuilder, FlashConfig};
pub use market::{MarketConfig, ReserveConfig};
