//! Leveraged looping engine.
//!
//! This crate provides:
//! - The geometric leverage model and its inverse solver
//! - Tranche schedules for ratio/loop-count and explicit-amount runs
//! - An account-wide collateral health guard
//! - The atomic loop executor driving pool and flash collaborators
//! - Engine and market configuration
//!
//! Pool access goes through the traits in `looper_chain`.

pub mod config;
mod error;
mod executor;
mod guard;
pub mod math;
mod model;
mod plan;
mod solver;

pub use config::{EngineConfig, EngineConfigBuilder, FlashConfig, MarketConfig, ReserveConfig};
pub use error::LoopError;
pub use executor::{LoopExecutor, LoopReceipt, LoopState, LoopStep};
pub use guard::{CollateralHealthGuard, GuardParams, HealthReport};
pub use model::{asymptotic_leverage, leverage, SCALE};
pub use plan::{LeverageRequest, LoopPlan, ReserveConstraint, Schedule};
pub use solver::{LeverageSolver, SolverParams};
