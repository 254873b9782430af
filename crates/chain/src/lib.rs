//! Lending pool collaborators for the looping engine.
//!
//! This crate provides:
//! - Traits for the lending pool, flash liquidity and native-coin gateway
//! - Reserve, position and account snapshot types shared with the engine
//! - An in-memory pool with per-account checkpoints for tests and simulation
//! - Calldata bindings for a deployed looping helper contract

mod contracts;
pub mod pool;

pub use contracts::{IDebtTokenDelegation, ILooping, LoopingCall};
pub use pool::{
    AccountSnapshot, CheckpointId, FlashLiquidityProvider, FlashTicket, LendingPool, MemoryPool,
    NativeGateway, PoolError, Position, ReserveData, ReservePosition, BPS, RAY,
};
